//! Object identifier.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an entity handle.
///
/// Object IDs are:
/// - Minted once when an [`super::EntityRef`] is created
/// - Shared by every clone of that handle
/// - Monotonically increasing and never reused
///
/// They key all unit-of-work bookkeeping, so two handles are the same
/// entity exactly when their object IDs are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Mints the next object ID.
    #[must_use]
    pub(crate) fn next() -> Self {
        Self(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "oid:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic() {
        let a = ObjectId::next();
        let b = ObjectId::next();
        assert!(b > a);
    }

    #[test]
    fn display_format() {
        let id = ObjectId::next();
        assert_eq!(id.to_string(), format!("oid:{}", id.as_u64()));
    }
}
