//! Entity-level last-writer-wins merge rules.

use verdant_types::{Mutability, SyncEntity};

/// What to do with a remote row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeAction {
    /// No local counterpart: add the remote row.
    Insert,
    /// Replace the local row with the remote one.
    Overwrite,
    /// The local row is at least as new: leave it alone.
    KeepLocal,
}

/// Decides which version of an entity wins.
///
/// Catalog tables are server-owned, so the remote copy always overwrites.
/// Editable tables compare `UpdatedAt` and only overwrite when the remote copy
/// is strictly newer. Timestamps are trusted as sent by the server.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergePolicy;

impl MergePolicy {
    /// Resolve a remote row against its local counterpart, if any.
    pub fn resolve<T: SyncEntity>(remote: &T, local: Option<&T>) -> MergeAction {
        let Some(local) = local else {
            return MergeAction::Insert;
        };

        match T::MUTABILITY {
            Mutability::ReadOnly => MergeAction::Overwrite,
            Mutability::Editable => {
                if remote.updated_at() > local.updated_at() {
                    MergeAction::Overwrite
                } else {
                    MergeAction::KeepLocal
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use time::macros::datetime;
    use time::{Duration, OffsetDateTime};
    use uuid::Uuid;
    use verdant_types::{Device, Parameter};

    fn device(updated_at: OffsetDateTime) -> Device {
        Device {
            id: Uuid::nil(),
            serial_number: Uuid::nil(),
            name: "Bench".to_string(),
            location_id: Uuid::nil(),
            created_at: datetime!(2026-01-01 0:00 UTC),
            updated_at,
            deleted: false,
        }
    }

    fn parameter(name: &str) -> Parameter {
        Parameter {
            id: 1,
            name: name.to_string(),
            unit: "C".to_string(),
            created_at: datetime!(2026-01-01 0:00 UTC),
        }
    }

    #[test]
    fn test_insert_without_local() {
        let remote = device(datetime!(2026-01-02 0:00 UTC));
        assert_eq!(MergePolicy::resolve(&remote, None), MergeAction::Insert);
    }

    #[test]
    fn test_editable_newer_remote_overwrites() {
        let local = device(datetime!(2026-01-02 0:00 UTC));
        let remote = device(datetime!(2026-01-03 0:00 UTC));
        assert_eq!(
            MergePolicy::resolve(&remote, Some(&local)),
            MergeAction::Overwrite
        );
    }

    #[test]
    fn test_editable_equal_or_older_remote_keeps_local() {
        let local = device(datetime!(2026-01-02 0:00 UTC));
        assert_eq!(
            MergePolicy::resolve(&local.clone(), Some(&local)),
            MergeAction::KeepLocal
        );

        let older = device(datetime!(2026-01-01 0:00 UTC));
        assert_eq!(
            MergePolicy::resolve(&older, Some(&local)),
            MergeAction::KeepLocal
        );
    }

    #[test]
    fn test_read_only_always_overwrites() {
        let local = parameter("Temperature");
        let remote = parameter("Air temperature");
        assert_eq!(
            MergePolicy::resolve(&remote, Some(&local)),
            MergeAction::Overwrite
        );
    }

    proptest! {
        #[test]
        fn prop_last_writer_wins(local_secs in 0i64..1_000_000, remote_secs in 0i64..1_000_000) {
            let base = datetime!(2026-01-01 0:00 UTC);
            let local = device(base + Duration::seconds(local_secs));
            let remote = device(base + Duration::seconds(remote_secs));

            let action = MergePolicy::resolve(&remote, Some(&local));
            if remote_secs > local_secs {
                prop_assert_eq!(action, MergeAction::Overwrite);
            } else {
                prop_assert_eq!(action, MergeAction::KeepLocal);
            }
        }
    }
}
