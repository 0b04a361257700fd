//! Data models for stored data.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use verdant_types::SyncEntity;

use crate::error::{Error, Result};

/// API credentials persisted with the sync settings.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// User identifier issued by the API.
    pub user_id: String,
    /// Access token for that user.
    pub token: String,
}

impl Credentials {
    /// Create credentials from a user id and token.
    pub fn new(user_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user_id", &self.user_id)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Process-wide sync settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Stored credentials, if the user has signed in.
    pub credentials: Option<Credentials>,
    /// Start of the last fully successful reference-table pull.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_successful_general_db_get: Option<OffsetDateTime>,
    /// Start of the last fully successful reference-table push.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_successful_general_db_post: Option<OffsetDateTime>,
}

impl SyncSettings {
    /// The push watermark, or the epoch if nothing was ever pushed.
    pub fn last_post_or_epoch(&self) -> OffsetDateTime {
        self.last_successful_general_db_post
            .unwrap_or(OffsetDateTime::UNIX_EPOCH)
    }
}

/// A reference-table row ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedEntity {
    /// Table the row belongs to.
    pub table: &'static str,
    /// Identity of the row within its table.
    pub key: String,
    /// Creation time, unix milliseconds.
    pub created_at: i64,
    /// Last edit time, unix milliseconds.
    pub updated_at: Option<i64>,
    /// JSON body of the entity.
    pub body: String,
}

/// Reference-table rows staged for a single transactional save.
///
/// Staging the same row twice keeps the last version.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    entities: BTreeMap<(&'static str, String), StagedEntity>,
}

impl ChangeSet {
    /// Create an empty change set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage an insert or overwrite of `entity`.
    ///
    /// Fails if the entity's key does not follow its table's identity strategy.
    pub fn stage<T: SyncEntity>(&mut self, entity: &T) -> Result<()> {
        let key = entity.key();
        if key.strategy() != T::IDENTITY {
            return Err(Error::KeyStrategy {
                table: T::TABLE,
                expected: T::IDENTITY,
                found: key.strategy(),
            });
        }

        let staged = StagedEntity {
            table: T::TABLE,
            key: key.to_string(),
            created_at: unix_millis(entity.created_at()),
            updated_at: entity.updated_at().map(unix_millis),
            body: serde_json::to_string(entity)?,
        };

        self.entities
            .insert((staged.table, staged.key.clone()), staged);
        Ok(())
    }

    /// Move all rows of `other` into this change set.
    pub fn extend(&mut self, other: ChangeSet) {
        self.entities.extend(other.entities);
    }

    /// Staged rows, ordered by table and key.
    pub fn entities(&self) -> impl Iterator<Item = &StagedEntity> {
        self.entities.values()
    }

    /// Number of staged rows.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Summary of the local sensor history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryStats {
    /// Total number of day blocks.
    pub blocks: u64,
    /// Number of distinct sensors with history.
    pub sensors: u64,
    /// Blocks that were never uploaded.
    pub never_uploaded: u64,
    /// Blocks whose day had not ended when they were last uploaded.
    pub open_since_upload: u64,
}

/// Unix milliseconds of an instant, the precision of entity timestamps at rest.
pub fn unix_millis(instant: OffsetDateTime) -> i64 {
    (instant.unix_timestamp_nanos() / 1_000_000) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;
    use verdant_types::{CropType, EntityKey, IdentityStrategy, Mutability};

    fn crop(id: i64, name: &str) -> CropType {
        CropType {
            id,
            name: name.to_string(),
            variety: None,
            approved: false,
            created_by: None,
            created_at: datetime!(2026-01-01 0:00 UTC),
        }
    }

    #[test]
    fn test_change_set_keeps_last_version_of_a_row() {
        let mut changes = ChangeSet::new();
        changes.stage(&crop(1, "Basil")).unwrap();
        changes.stage(&crop(2, "Basil")).unwrap();
        changes.stage(&crop(3, "Lettuce")).unwrap();

        assert_eq!(changes.len(), 2);
        let basil = changes.entities().next().unwrap();
        assert_eq!(basil.key, "Basil");
        assert!(basil.body.contains("\"ID\":2"));
    }

    #[test]
    fn test_extend_replaces_rows_with_the_same_key() {
        let mut first = ChangeSet::new();
        first.stage(&crop(1, "Basil")).unwrap();
        first.stage(&crop(2, "Mint")).unwrap();

        let mut second = ChangeSet::new();
        second.stage(&crop(7, "Basil")).unwrap();
        first.extend(second);

        let bodies: Vec<&str> = first.entities().map(|e| e.body.as_str()).collect();
        assert_eq!(bodies.len(), 2);
        assert!(bodies[0].contains("\"ID\":7"));
        assert!(bodies[1].contains("\"Name\":\"Mint\""));
    }

    #[test]
    fn test_stage_rejects_key_of_the_wrong_strategy() {
        #[derive(Clone, Serialize, Deserialize)]
        struct Misdeclared {
            id: i64,
        }

        impl SyncEntity for Misdeclared {
            const TABLE: &'static str = "Misdeclared";
            const IDENTITY: IdentityStrategy = IdentityStrategy::Guid;
            const MUTABILITY: Mutability = Mutability::ReadOnly;

            fn key(&self) -> EntityKey {
                EntityKey::Numeric(self.id)
            }

            fn created_at(&self) -> OffsetDateTime {
                OffsetDateTime::UNIX_EPOCH
            }
        }

        let err = ChangeSet::new().stage(&Misdeclared { id: 1 }).unwrap_err();
        assert!(matches!(
            err,
            Error::KeyStrategy {
                expected: IdentityStrategy::Guid,
                found: IdentityStrategy::Numeric,
                ..
            }
        ));
    }

    #[test]
    fn test_credentials_debug_redacts_token() {
        let creds = Credentials::new("42", "secret-token");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("42"));
        assert!(!debug.contains("secret-token"));
    }

    #[test]
    fn test_unix_millis() {
        assert_eq!(unix_millis(datetime!(1970-01-01 0:00:01.5 UTC)), 1500);
    }
}
