//! Message heads carried inside chunked payloads.
//!
//! A VST message is a self-describing head immediately followed by the raw
//! body bytes. Heads are bincode-encoded with the standard configuration;
//! decoding reports the consumed byte count, which is where the body begins.
//!
//! Three head shapes exist: request
//! (`[version, type, database, method code, path, query, headers]`), response
//! (`[version, type, response code, meta]`), and the authentication frame
//! sent once during connection initialisation. Both directions are provided
//! so test harnesses can stand in for a server.

use std::collections::HashMap;

use bincode::{Decode, Encode, config};
use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    codec::CodecError,
    config::Authentication,
    request::{Method, Request},
    response::Response,
};

/// Protocol version tag carried in every head (`1.1` as `11`).
pub const PROTOCOL_VERSION: u32 = 11;
/// Message type of a request head.
pub const MESSAGE_TYPE_REQUEST: u32 = 1;
/// Message type of a response head.
pub const MESSAGE_TYPE_RESPONSE: u32 = 2;
/// Message type of the authentication frame.
pub const MESSAGE_TYPE_AUTHENTICATION: u32 = 1000;

/// Head of a request message.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct RequestHead {
    /// Protocol version, [`PROTOCOL_VERSION`].
    pub version: u32,
    /// Message type, [`MESSAGE_TYPE_REQUEST`].
    pub message_type: u32,
    /// Target database.
    pub database: String,
    /// Numeric method code.
    pub method_code: u8,
    /// Request path.
    pub path: String,
    /// Query parameters.
    pub query_params: HashMap<String, Option<String>>,
    /// Header parameters.
    pub header_params: HashMap<String, String>,
}

impl RequestHead {
    /// The request method, when the wire code is known.
    #[must_use]
    pub const fn method(&self) -> Option<Method> { Method::from_code(self.method_code) }
}

/// Head of a response message.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct ResponseHead {
    /// Protocol version.
    pub version: u32,
    /// Message type, [`MESSAGE_TYPE_RESPONSE`].
    pub message_type: u32,
    /// HTTP-style status code.
    pub response_code: u16,
    /// Response metadata.
    pub meta: HashMap<String, String>,
}

/// Authentication frame sent after the protocol marker.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct AuthenticationHead {
    /// Protocol version.
    pub version: u32,
    /// Message type, [`MESSAGE_TYPE_AUTHENTICATION`].
    pub message_type: u32,
    /// Credential encoding: `plain` or `jwt`.
    pub encryption: String,
    /// User name, or the token for `jwt`.
    pub username: String,
    /// Password; empty for `jwt`.
    pub password: String,
}

fn head_probe_type(payload: &[u8]) -> Result<u32, CodecError> {
    #[derive(Decode)]
    struct Probe {
        _version: u32,
        message_type: u32,
    }
    let (probe, _) = bincode::decode_from_slice::<Probe, _>(payload, config::standard())
        .map_err(CodecError::HeadDecode)?;
    Ok(probe.message_type)
}

/// Peek the message type of an encoded payload without consuming it.
///
/// # Errors
///
/// Returns [`CodecError::HeadDecode`] when not even the two leading integers
/// can be decoded.
pub fn peek_message_type(payload: &[u8]) -> Result<u32, CodecError> { head_probe_type(payload) }

fn expect_message_type(payload: &[u8], expected: u32) -> Result<(), CodecError> {
    let found = head_probe_type(payload)?;
    if found == expected {
        Ok(())
    } else {
        Err(CodecError::UnexpectedMessageType { found, expected })
    }
}

/// Encode a request into a complete message payload (head plus body).
///
/// # Errors
///
/// Returns [`CodecError::HeadEncode`] if head serialisation fails.
pub fn encode_request(request: &Request) -> Result<Bytes, CodecError> {
    let head = RequestHead {
        version: PROTOCOL_VERSION,
        message_type: MESSAGE_TYPE_REQUEST,
        database: request.database().to_owned(),
        method_code: request.method().code(),
        path: request.path().to_owned(),
        query_params: request.query_params().clone(),
        header_params: request.header_params().clone(),
    };
    let encoded = bincode::encode_to_vec(&head, config::standard()).map_err(CodecError::HeadEncode)?;
    let mut payload = BytesMut::with_capacity(encoded.len() + request.body().len());
    payload.put_slice(&encoded);
    payload.put_slice(request.body());
    Ok(payload.freeze())
}

/// Decode a request payload into its head and body. Used by server-side
/// stand-ins.
///
/// # Errors
///
/// Returns [`CodecError::HeadDecode`] on malformed heads and
/// [`CodecError::UnexpectedMessageType`] when the payload is not a request.
pub fn decode_request(payload: &Bytes) -> Result<(RequestHead, Bytes), CodecError> {
    expect_message_type(payload, MESSAGE_TYPE_REQUEST)?;
    let (head, consumed) =
        bincode::decode_from_slice::<RequestHead, _>(payload, config::standard())
            .map_err(CodecError::HeadDecode)?;
    Ok((head, payload.slice(consumed..)))
}

/// Encode a response into a complete message payload (head plus body).
///
/// # Errors
///
/// Returns [`CodecError::HeadEncode`] if head serialisation fails.
pub fn encode_response(response: &Response) -> Result<Bytes, CodecError> {
    let head = ResponseHead {
        version: PROTOCOL_VERSION,
        message_type: MESSAGE_TYPE_RESPONSE,
        response_code: response.response_code(),
        meta: response.meta().clone(),
    };
    let encoded = bincode::encode_to_vec(&head, config::standard()).map_err(CodecError::HeadEncode)?;
    let mut payload = BytesMut::with_capacity(encoded.len() + response.body().len());
    payload.put_slice(&encoded);
    payload.put_slice(response.body());
    Ok(payload.freeze())
}

/// Decode a response payload into a [`Response`].
///
/// # Errors
///
/// Returns [`CodecError::HeadDecode`] on malformed heads and
/// [`CodecError::UnexpectedMessageType`] when the payload is not a response.
pub fn decode_response(payload: &Bytes) -> Result<Response, CodecError> {
    expect_message_type(payload, MESSAGE_TYPE_RESPONSE)?;
    let (head, consumed) =
        bincode::decode_from_slice::<ResponseHead, _>(payload, config::standard())
            .map_err(CodecError::HeadDecode)?;
    Ok(Response::new(head.response_code, head.meta, payload.slice(consumed..)))
}

/// Encode the authentication frame for the configured credentials.
///
/// Returns `None` for [`Authentication::None`] (no frame is sent; an
/// authenticated probe is issued instead) and for negotiated schemes, which
/// are rejected before any connection is opened.
///
/// # Errors
///
/// Returns [`CodecError::HeadEncode`] if head serialisation fails.
pub fn encode_authentication(auth: &Authentication) -> Result<Option<Bytes>, CodecError> {
    let head = match auth {
        Authentication::None | Authentication::Negotiate { .. } => return Ok(None),
        Authentication::Basic { username, password } => AuthenticationHead {
            version: PROTOCOL_VERSION,
            message_type: MESSAGE_TYPE_AUTHENTICATION,
            encryption: "plain".to_owned(),
            username: username.clone(),
            password: password.clone(),
        },
        Authentication::Jwt { token } => AuthenticationHead {
            version: PROTOCOL_VERSION,
            message_type: MESSAGE_TYPE_AUTHENTICATION,
            encryption: "jwt".to_owned(),
            username: token.clone(),
            password: String::new(),
        },
    };
    let encoded = bincode::encode_to_vec(&head, config::standard()).map_err(CodecError::HeadEncode)?;
    Ok(Some(Bytes::from(encoded)))
}

/// Decode an authentication frame. Used by server-side stand-ins.
///
/// # Errors
///
/// Returns [`CodecError::HeadDecode`] on malformed heads and
/// [`CodecError::UnexpectedMessageType`] for other message types.
pub fn decode_authentication(payload: &Bytes) -> Result<AuthenticationHead, CodecError> {
    expect_message_type(payload, MESSAGE_TYPE_AUTHENTICATION)?;
    let (head, _) =
        bincode::decode_from_slice::<AuthenticationHead, _>(payload, config::standard())
            .map_err(CodecError::HeadDecode)?;
    Ok(head)
}
