//! Core type definitions for ormkit.

use std::fmt;
use uuid::Uuid;

/// Identifier of an entity manager session.
///
/// Attached to commit spans so interleaved logs from several managers can
/// be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Creates a new random session ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session:{}", self.0)
    }
}

/// Lifecycle state of an entity relative to a unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityState {
    /// Not yet persisted and not tracked.
    New,
    /// Tracked; changes are written on commit.
    Managed,
    /// Tracked and scheduled for deletion.
    Removed,
    /// Has a persistent identity but is not tracked.
    Detached,
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityState::New => "new",
            EntityState::Managed => "managed",
            EntityState::Removed => "removed",
            EntityState::Detached => "detached",
        };
        f.write_str(name)
    }
}
