//! Response values produced once per request.

use std::collections::HashMap;

use bytes::Bytes;

/// One response: status code, metadata map, and opaque body bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    response_code: u16,
    meta: HashMap<String, String>,
    body: Bytes,
}

impl Response {
    /// Construct a response.
    #[must_use]
    pub fn new(response_code: u16, meta: HashMap<String, String>, body: impl Into<Bytes>) -> Self {
        Self {
            response_code,
            meta,
            body: body.into(),
        }
    }

    /// HTTP-style status code.
    #[must_use]
    pub const fn response_code(&self) -> u16 { self.response_code }

    /// Response metadata (header map for HTTP strategies).
    #[must_use]
    pub const fn meta(&self) -> &HashMap<String, String> { &self.meta }

    /// Opaque response body bytes.
    #[must_use]
    pub const fn body(&self) -> &Bytes { &self.body }

    /// Whether the status code is in the 2xx success range.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.response_code >= 200 && self.response_code < 300
    }

    /// Consume the response, returning the body.
    #[must_use]
    pub fn into_body(self) -> Bytes { self.body }
}
