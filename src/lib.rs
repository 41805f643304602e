//! Transport core for VelocyStream-speaking database clients.
//!
//! `velostream` maintains live connections to one or more database hosts,
//! routes each logical request to the correct host for the configured
//! deployment topology (single server, cluster, active failover), and speaks
//! the chunked binary VST wire protocol alongside HTTP/1.1 and HTTP/2
//! variants.
//!
//! The crate is organised leaf-first:
//!
//! - [`codec`] frames outbound messages into length-prefixed chunks and
//!   reassembles inbound chunks, correlated by per-connection message ids.
//! - [`connection`] owns one physical channel per host behind the
//!   [`Connection`](connection::Connection) trait, with VST, HTTP/1.1, and
//!   HTTP/2 strategies selected once at factory time.
//! - [`pool`] tracks connections per host, routes requests to random or
//!   specific hosts, and reconciles the host set against a target list. The
//!   active-failover specialisation additionally tracks the current leader.
//! - [`communication`] is the façade: it negotiates authentication, discovers
//!   and refreshes the live host set, resolves per-request host affinity
//!   ([`Conversation`]), applies the global timeout, and classifies server
//!   errors.
//!
//! This core delivers opaque request/response payloads; it does not implement
//! query planning, transactions, or schema validation.

pub mod codec;
pub mod communication;
pub mod config;
pub mod connection;
pub mod conversation;
pub mod error;
pub mod host;
pub mod message;
pub mod pool;
pub mod request;
pub mod response;

pub use communication::Communication;
pub use config::{Authentication, Protocol, Topology, TransportConfig};
pub use conversation::{Conversation, ConversationLevel};
pub use error::{ServerError, TransportError};
pub use host::HostDescription;
pub use request::{Method, Request};
pub use response::Response;
