//! Host-affinity values pinning a sequence of requests to one host.

use crate::host::HostDescription;

/// How strictly a [`Conversation`] binds requests to its host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConversationLevel {
    /// The pinned host must serve the request; its absence is fatal.
    Required,
    /// Prefer the pinned host but silently fall back to any host.
    Preferred,
}

/// An immutable `(host, affinity level)` pair.
///
/// A conversation scopes a unit of logical work to one host. It provides
/// host pinning only, never request ordering, and is a plain value shared by
/// reference among the operations it scopes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Conversation {
    host: HostDescription,
    level: ConversationLevel,
}

impl Conversation {
    /// Pin `host` at the given affinity level.
    #[must_use]
    pub const fn new(host: HostDescription, level: ConversationLevel) -> Self {
        Self { host, level }
    }

    /// The pinned host.
    #[must_use]
    pub const fn host(&self) -> &HostDescription { &self.host }

    /// The affinity level.
    #[must_use]
    pub const fn level(&self) -> ConversationLevel { self.level }
}
