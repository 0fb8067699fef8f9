//! Optimistic concurrency expectations for persisted rows.

use crate::error::{DomainError, DomainResult};

/// Version a writer expects a row to be at when its change is committed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking (seeding, migrations).
    Any,
    /// The row must not exist yet.
    NoRecord,
    /// Require the row to be at an exact version.
    Exact(u64),
}

impl ExpectedVersion {
    /// `actual` is `None` when no row exists.
    pub fn matches(self, actual: Option<u64>) -> bool {
        match (self, actual) {
            (ExpectedVersion::Any, _) => true,
            (ExpectedVersion::NoRecord, None) => true,
            (ExpectedVersion::NoRecord, Some(_)) => false,
            (ExpectedVersion::Exact(v), Some(a)) => v == a,
            (ExpectedVersion::Exact(_), None) => false,
        }
    }

    pub fn check(self, actual: Option<u64>) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "optimistic concurrency check failed (expected: {self:?}, actual: {actual:?})"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_requires_existing_row_at_same_version() {
        assert!(ExpectedVersion::Exact(3).matches(Some(3)));
        assert!(!ExpectedVersion::Exact(3).matches(Some(4)));
        assert!(!ExpectedVersion::Exact(3).matches(None));
    }

    #[test]
    fn no_record_rejects_existing_rows() {
        assert!(ExpectedVersion::NoRecord.matches(None));
        let err = ExpectedVersion::NoRecord.check(Some(1)).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn any_always_matches() {
        assert!(ExpectedVersion::Any.matches(None));
        assert!(ExpectedVersion::Any.matches(Some(42)));
    }
}
