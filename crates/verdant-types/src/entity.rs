//! Identity and mutability capabilities of synchronized entities.
//!
//! Every reference table row implements [`SyncEntity`]. The trait fixes, per
//! type and at compile time, how a remote row is matched against the local
//! table ([`IdentityStrategy`]) and whether local edits are allowed
//! ([`Mutability`]).

use core::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;
use time::OffsetDateTime;
use uuid::Uuid;

/// How a remote row is matched to its local counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityStrategy {
    /// Match on an integer surrogate id.
    Numeric,
    /// Match on a GUID surrogate id.
    Guid,
    /// Match on a unique name.
    Name,
}

/// Whether a table accepts local edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mutability {
    /// Server-owned catalog data. The remote copy always wins.
    ReadOnly,
    /// User-editable data, resolved by comparing `UpdatedAt`.
    Editable,
}

/// The identity of a single entity, tagged by strategy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityKey {
    /// Integer id.
    Numeric(i64),
    /// GUID id.
    Guid(Uuid),
    /// Unique name.
    Name(String),
}

impl EntityKey {
    /// The strategy this key belongs to.
    pub fn strategy(&self) -> IdentityStrategy {
        match self {
            EntityKey::Numeric(_) => IdentityStrategy::Numeric,
            EntityKey::Guid(_) => IdentityStrategy::Guid,
            EntityKey::Name(_) => IdentityStrategy::Name,
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKey::Numeric(id) => write!(f, "{id}"),
            EntityKey::Guid(id) => write!(f, "{}", id.hyphenated()),
            EntityKey::Name(name) => f.write_str(name),
        }
    }
}

/// A row of a synchronized reference table.
///
/// Implementors must return a [`key`](SyncEntity::key) whose strategy equals
/// [`IDENTITY`](SyncEntity::IDENTITY), and must return `Some` from
/// [`updated_at`](SyncEntity::updated_at) when they are
/// [`Mutability::Editable`].
pub trait SyncEntity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Table name, used both as the API path segment and as the local table tag.
    const TABLE: &'static str;
    /// How rows of this table are matched.
    const IDENTITY: IdentityStrategy;
    /// Whether local edits are allowed.
    const MUTABILITY: Mutability;

    /// The identity of this row.
    fn key(&self) -> EntityKey;

    /// When this row was created.
    fn created_at(&self) -> OffsetDateTime;

    /// When this row was last edited. `None` for read-only catalog rows.
    fn updated_at(&self) -> Option<OffsetDateTime> {
        None
    }
}
