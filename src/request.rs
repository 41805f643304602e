//! Request values and wire method codes.

use std::collections::HashMap;

use bytes::Bytes;

/// Request method, carried on the wire as a numeric code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    /// DELETE, wire code 0.
    Delete,
    /// GET, wire code 1.
    Get,
    /// POST, wire code 2.
    Post,
    /// PUT, wire code 3.
    Put,
    /// HEAD, wire code 4.
    Head,
    /// PATCH, wire code 5.
    Patch,
    /// OPTIONS, wire code 6.
    Options,
}

impl Method {
    /// Numeric wire code for the binary protocol.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Delete => 0,
            Self::Get => 1,
            Self::Post => 2,
            Self::Put => 3,
            Self::Head => 4,
            Self::Patch => 5,
            Self::Options => 6,
        }
    }

    /// Decode a numeric wire code back into a method.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Delete),
            1 => Some(Self::Get),
            2 => Some(Self::Post),
            3 => Some(Self::Put),
            4 => Some(Self::Head),
            5 => Some(Self::Patch),
            6 => Some(Self::Options),
            _ => None,
        }
    }

    /// Standard HTTP verb for the HTTP protocol strategies.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Delete => "DELETE",
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Head => "HEAD",
            Self::Patch => "PATCH",
            Self::Options => "OPTIONS",
        }
    }

    /// Whether the method is a read with no expected side effects.
    ///
    /// Reads are eligible for dirty-read routing in active-failover
    /// deployments.
    #[must_use]
    pub const fn is_read(self) -> bool { matches!(self, Self::Get | Self::Head) }
}

/// One logical request: an opaque body plus the routing envelope.
///
/// Requests are built through [`RequestBuilder`] and immutable afterwards.
///
/// # Examples
///
/// ```
/// use velostream::{Method, Request};
///
/// let request = Request::builder("_system", Method::Get, "/_api/version")
///     .query("details", Some("true"))
///     .build();
/// assert_eq!(request.path(), "/_api/version");
/// ```
#[derive(Clone, Debug)]
pub struct Request {
    database: String,
    method: Method,
    path: String,
    query_params: HashMap<String, Option<String>>,
    header_params: HashMap<String, String>,
    body: Bytes,
}

impl Request {
    /// Start building a request against `database`.
    #[must_use]
    pub fn builder(database: impl Into<String>, method: Method, path: impl Into<String>) -> RequestBuilder {
        RequestBuilder {
            database: database.into(),
            method,
            path: path.into(),
            query_params: HashMap::new(),
            header_params: HashMap::new(),
            body: Bytes::new(),
        }
    }

    /// Target database name.
    #[must_use]
    pub fn database(&self) -> &str { &self.database }

    /// Request method.
    #[must_use]
    pub const fn method(&self) -> Method { self.method }

    /// Request path, relative to the database.
    #[must_use]
    pub fn path(&self) -> &str { &self.path }

    /// Query parameters; a `None` value renders as a bare key.
    #[must_use]
    pub const fn query_params(&self) -> &HashMap<String, Option<String>> { &self.query_params }

    /// Header parameters.
    #[must_use]
    pub const fn header_params(&self) -> &HashMap<String, String> { &self.header_params }

    /// Opaque request body bytes.
    #[must_use]
    pub const fn body(&self) -> &Bytes { &self.body }

    /// Return a copy of this request with one extra header set.
    ///
    /// Used by routing layers to stamp marker headers (for example the
    /// dirty-read marker) without mutating the caller's request.
    #[must_use]
    pub fn with_header(&self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let mut cloned = self.clone();
        cloned.header_params.insert(name.into(), value.into());
        cloned
    }
}

/// Builder for [`Request`].
#[derive(Debug)]
pub struct RequestBuilder {
    database: String,
    method: Method,
    path: String,
    query_params: HashMap<String, Option<String>>,
    header_params: HashMap<String, String>,
    body: Bytes,
}

impl RequestBuilder {
    /// Add a query parameter; pass `None` for a value-less key.
    #[must_use]
    pub fn query(mut self, name: impl Into<String>, value: Option<&str>) -> Self {
        self.query_params.insert(name.into(), value.map(str::to_owned));
        self
    }

    /// Add a header parameter.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.header_params.insert(name.into(), value.into());
        self
    }

    /// Set the request body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Finish building the request.
    #[must_use]
    pub fn build(self) -> Request {
        Request {
            database: self.database,
            method: self.method,
            path: self.path,
            query_params: self.query_params,
            header_params: self.header_params,
            body: self.body,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(Method::Delete, 0)]
    #[case(Method::Get, 1)]
    #[case(Method::Post, 2)]
    #[case(Method::Put, 3)]
    #[case(Method::Head, 4)]
    #[case(Method::Patch, 5)]
    #[case(Method::Options, 6)]
    fn method_codes_round_trip(#[case] method: Method, #[case] code: u8) {
        assert_eq!(method.code(), code);
        assert_eq!(Method::from_code(code), Some(method));
    }

    #[test]
    fn unknown_method_code_is_rejected() {
        assert_eq!(Method::from_code(7), None);
    }

    #[test]
    fn with_header_leaves_original_untouched() {
        let request = Request::builder("_system", Method::Get, "/_api/version").build();
        let stamped = request.with_header("x-marker", "true");
        assert!(request.header_params().is_empty());
        assert_eq!(stamped.header_params().get("x-marker").map(String::as_str), Some("true"));
    }
}
