//! HTTP/1.1 and HTTP/2 transport connections.
//!
//! The HTTP strategies map the request envelope onto an HTTP request line,
//! headers, and body with a `/_db/{database}{path}` URL shape; connection
//! concurrency is delegated to the underlying client's own pooling, so no
//! dedicated per-connection task is needed.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use base64::Engine as _;
use tracing::{debug, warn};
use url::Url;

use super::Connection;
use crate::{
    config::{Authentication, Protocol},
    error::TransportError,
    host::HostDescription,
    request::{Method, Request},
    response::Response,
};

/// Transport connection speaking HTTP/1.1 or HTTP/2.
pub struct HttpConnection {
    client: reqwest::Client,
    base: Url,
    authorization: Option<String>,
    connected: AtomicBool,
}

impl HttpConnection {
    /// Open a connection to `host` and verify it with an authenticated probe.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the client cannot be built, the
    /// probe fails at transport level, or the server rejects the probe.
    /// Partially built client state is dropped before the error surfaces.
    pub async fn open(
        host: &HostDescription,
        auth: &Authentication,
        protocol: Protocol,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder().timeout(timeout);
        if protocol == Protocol::Http2 {
            builder = builder.http2_prior_knowledge();
        }
        let client = builder.build()?;
        let base = Url::parse(&format!("http://{host}")).map_err(|err| {
            TransportError::InvalidEndpoint {
                endpoint: host.to_string(),
                reason: err.to_string(),
            }
        })?;
        let connection = Self {
            client,
            base,
            authorization: authorization_header(auth)?,
            connected: AtomicBool::new(false),
        };

        let probe = Request::builder("_system", Method::Get, "/_api/version").build();
        let response = connection.send(probe).await?;
        if !response.is_success() {
            return Err(TransportError::ConnectionFailed {
                reason: format!(
                    "probe rejected with status {}",
                    response.response_code()
                ),
            });
        }
        connection.connected.store(true, Ordering::Release);
        debug!(host = %host, "connected");
        Ok(connection)
    }

    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        let mut url = self.base.clone();
        url.set_path(&format!("/_db/{}{}", request.database(), request.path()));
        for (name, value) in request.query_params() {
            match value {
                Some(value) => {
                    url.query_pairs_mut().append_pair(name, value);
                }
                None => {
                    url.query_pairs_mut().append_key_only(name);
                }
            }
        }

        let mut builder = self.client.request(http_method(request.method()), url);
        if let Some(authorization) = &self.authorization {
            builder = builder.header(reqwest::header::AUTHORIZATION, authorization);
        }
        for (name, value) in request.header_params() {
            builder = builder.header(name, value);
        }
        if !request.body().is_empty() {
            builder = builder.body(request.body().clone());
        }

        let response = builder.send().await.inspect_err(|err| {
            warn!(error = %err, "HTTP request failed");
            self.connected.store(false, Ordering::Release);
        })?;

        let status = response.status().as_u16();
        let mut meta = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                meta.insert(name.as_str().to_owned(), value.to_owned());
            }
        }
        let body = response.bytes().await?;
        Ok(Response::new(status, meta, body))
    }
}

#[async_trait]
impl Connection for HttpConnection {
    async fn execute(&self, request: Request) -> Result<Response, TransportError> {
        self.send(request).await
    }

    fn is_connected(&self) -> bool { self.connected.load(Ordering::Acquire) }

    async fn close(&self) { self.connected.store(false, Ordering::Release); }
}

fn http_method(method: Method) -> reqwest::Method {
    match method {
        Method::Delete => reqwest::Method::DELETE,
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Head => reqwest::Method::HEAD,
        Method::Patch => reqwest::Method::PATCH,
        Method::Options => reqwest::Method::OPTIONS,
    }
}

/// Render the `Authorization` header for the configured credentials.
fn authorization_header(auth: &Authentication) -> Result<Option<String>, TransportError> {
    match auth {
        Authentication::None => Ok(None),
        Authentication::Basic { username, password } => {
            let encoded = base64::engine::general_purpose::STANDARD
                .encode(format!("{username}:{password}"));
            Ok(Some(format!("Basic {encoded}")))
        }
        Authentication::Jwt { token } => Ok(Some(format!("Bearer {token}"))),
        Authentication::Negotiate { scheme } => Err(TransportError::UnsupportedAuthentication {
            scheme: scheme.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_credentials_render_as_base64() {
        let auth = Authentication::Basic {
            username: "root".to_owned(),
            password: "secret".to_owned(),
        };
        let header = authorization_header(&auth).expect("supported scheme");
        assert_eq!(header.as_deref(), Some("Basic cm9vdDpzZWNyZXQ="));
    }

    #[test]
    fn negotiated_schemes_fail_loudly() {
        let auth = Authentication::Negotiate {
            scheme: "kerberos".to_owned(),
        };
        let err = authorization_header(&auth).expect_err("unsupported scheme rejected");
        assert!(matches!(err, TransportError::UnsupportedAuthentication { .. }));
    }
}
