//! Host identity values and endpoint-string parsing.
//!
//! A [`HostDescription`] is the immutable `(host, port)` pair used as the key
//! for connection pooling and routing. Cluster endpoint discovery returns
//! URL-shaped endpoint strings (`tcp://host:port`, bracketed for IPv6) which
//! are parsed into host descriptions here.

use std::fmt;

use url::Url;

use crate::error::TransportError;

/// Default port assumed when an endpoint string omits one.
pub const DEFAULT_PORT: u16 = 8529;

/// Identity of one database host.
///
/// Host descriptions are plain values: hashable, comparable, and never
/// mutated after construction.
///
/// # Examples
///
/// ```
/// use velostream::HostDescription;
///
/// let host = HostDescription::new("db1.example.com", 8529);
/// assert_eq!(host.to_string(), "db1.example.com:8529");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostDescription {
    host: String,
    port: u16,
}

impl HostDescription {
    /// Create a new host description.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Host name or address, without IPv6 brackets.
    #[must_use]
    pub fn host(&self) -> &str { &self.host }

    /// TCP port.
    #[must_use]
    pub const fn port(&self) -> u16 { self.port }

    /// Parse a URL-shaped endpoint string into a host description.
    ///
    /// Accepts the schemes emitted by cluster endpoint discovery (`tcp://`,
    /// `ssl://`) as well as plain `http://`/`https://` forms. IPv6 addresses
    /// must be bracketed, for example `tcp://[::1]:8529`. A missing port
    /// defaults to [`DEFAULT_PORT`].
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidEndpoint`] when the string cannot be
    /// parsed or carries no host component.
    ///
    /// # Examples
    ///
    /// ```
    /// use velostream::HostDescription;
    ///
    /// let host = HostDescription::from_endpoint("tcp://[::1]:8530")?;
    /// assert_eq!(host.host(), "::1");
    /// assert_eq!(host.port(), 8530);
    /// # Ok::<(), velostream::TransportError>(())
    /// ```
    pub fn from_endpoint(endpoint: &str) -> Result<Self, TransportError> {
        let normalised = normalise_scheme(endpoint);
        let url = Url::parse(&normalised).map_err(|err| TransportError::InvalidEndpoint {
            endpoint: endpoint.to_owned(),
            reason: err.to_string(),
        })?;
        let host = url
            .host_str()
            .ok_or_else(|| TransportError::InvalidEndpoint {
                endpoint: endpoint.to_owned(),
                reason: "no host component".to_owned(),
            })?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_owned();
        let port = url.port().unwrap_or(DEFAULT_PORT);
        Ok(Self { host, port })
    }
}

impl fmt::Display for HostDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Rewrite discovery schemes onto ones the URL parser treats as special.
///
/// `tcp`/`ssl` are not "special" schemes for the WHATWG parser, which would
/// otherwise refuse to expose a host/port split for them.
fn normalise_scheme(endpoint: &str) -> String {
    let lowered = endpoint.to_ascii_lowercase();
    if let Some(rest) = lowered.strip_prefix("tcp://") {
        format!("http://{rest}")
    } else if let Some(rest) = lowered.strip_prefix("ssl://") {
        format!("https://{rest}")
    } else {
        lowered
    }
}
