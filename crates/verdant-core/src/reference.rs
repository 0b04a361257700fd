//! Download/merge and upload-if-changed for reference tables.
//!
//! Pulls run in two stages in dependency order. Each stage collects the staged
//! rows of all its tables and is saved in one transaction, only when every
//! table of the stage succeeded. A failing table does not stop its siblings.

use time::OffsetDateTime;
use tracing::{debug, error, info};

use verdant_store::{ChangeSet, Credentials, Store};
use verdant_types::{
    CropCycle, CropType, Device, Location, Mutability, Parameter, Person, Placement, Relay,
    RelayType, Sensor, SensorType, Subsystem, SyncEntity,
};

use crate::error::{Error, Result};
use crate::merge::{MergeAction, MergePolicy};
use crate::transport::Transport;

/// Merge counts for one pulled table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableStats {
    /// API table name.
    pub table: &'static str,
    /// Rows received from the server.
    pub received: usize,
    /// Rows that had no local counterpart.
    pub inserted: usize,
    /// Local rows replaced by the remote version.
    pub overwritten: usize,
    /// Local rows kept because they were at least as new.
    pub kept_local: usize,
}

/// Rows staged for one table, not yet saved.
#[derive(Debug, Clone, Default)]
pub struct StagedTable {
    /// Inserts and overwrites to save.
    pub changes: ChangeSet,
    /// What the merge decided.
    pub stats: TableStats,
}

/// Outcome of the reference pull phase.
#[derive(Debug, Default)]
pub struct ReferencePullReport {
    /// Per-table merge counts, in pull order.
    pub tables: Vec<TableStats>,
    /// Failures. Empty on success.
    pub errors: Vec<Error>,
}

/// Rows posted for one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TablePush {
    /// API table name.
    pub table: &'static str,
    /// Number of rows posted. Zero when nothing changed.
    pub rows: usize,
}

/// Outcome of the reference push phase.
#[derive(Debug, Default)]
pub struct ReferencePushReport {
    /// Per-table post counts, in push order.
    pub tables: Vec<TablePush>,
    /// Failures. Empty on success.
    pub errors: Vec<Error>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Auth {
    Anonymous,
    Required,
}

#[derive(Default)]
struct Stage {
    changes: ChangeSet,
    tables: Vec<TableStats>,
    errors: Vec<Error>,
}

/// Generic synchronization of reference and configuration tables.
///
/// Store handles are taken as `&mut` so the returned futures are `Send`;
/// `rusqlite::Connection` is not `Sync`.
pub struct ReferenceTableSyncer<'a> {
    transport: &'a dyn Transport,
}

impl<'a> ReferenceTableSyncer<'a> {
    /// Create a syncer over `transport`.
    pub fn new(transport: &'a dyn Transport) -> Self {
        Self { transport }
    }

    /// Download `T`'s table, decode it and stage the rows that win the merge.
    ///
    /// Nothing is written to `store`.
    pub async fn sync_table<T: SyncEntity>(
        &self,
        store: &mut Store,
        credentials: Option<&Credentials>,
    ) -> Result<StagedTable> {
        let body = self.transport.get(T::TABLE, credentials).await?;
        let remote: Vec<T> =
            serde_json::from_str(&body).map_err(|e| Error::decode(T::TABLE, e))?;

        let mut staged = StagedTable {
            changes: ChangeSet::new(),
            stats: TableStats {
                table: T::TABLE,
                received: remote.len(),
                ..Default::default()
            },
        };

        for item in &remote {
            let local = store.get_entity::<T>(&item.key())?;
            match MergePolicy::resolve(item, local.as_ref()) {
                MergeAction::Insert => {
                    staged.changes.stage(item)?;
                    staged.stats.inserted += 1;
                }
                MergeAction::Overwrite => {
                    staged.changes.stage(item)?;
                    staged.stats.overwritten += 1;
                }
                MergeAction::KeepLocal => staged.stats.kept_local += 1,
            }
        }

        debug!(
            table = T::TABLE,
            received = staged.stats.received,
            inserted = staged.stats.inserted,
            overwritten = staged.stats.overwritten,
            kept = staged.stats.kept_local,
            "Merged table"
        );
        Ok(staged)
    }

    /// Pull every reference table and save them stage by stage.
    ///
    /// `LastSuccessfulGeneralDbGet` advances to the instant the pull started,
    /// only when both stages succeed.
    pub async fn pull(&self, store: &mut Store) -> ReferencePullReport {
        let started = crate::now_utc();
        let credentials = match store.sync_settings() {
            Ok(settings) => settings.credentials,
            Err(e) => {
                return ReferencePullReport {
                    tables: Vec::new(),
                    errors: vec![e.into()],
                };
            }
        };
        let creds = credentials.as_ref();
        let mut report = ReferencePullReport::default();

        // Server-owned catalogs, no credentials.
        let mut stage = Stage::default();
        self.pull_table::<Parameter>(store, creds, Auth::Anonymous, &mut stage)
            .await;
        self.pull_table::<Placement>(store, creds, Auth::Anonymous, &mut stage)
            .await;
        self.pull_table::<Subsystem>(store, creds, Auth::Anonymous, &mut stage)
            .await;
        self.pull_table::<RelayType>(store, creds, Auth::Anonymous, &mut stage)
            .await;
        self.pull_table::<SensorType>(store, creds, Auth::Anonymous, &mut stage)
            .await;
        if !Self::commit(store, stage, &mut report) {
            return report;
        }

        // User tables. CropTypes are public.
        let mut stage = Stage::default();
        self.pull_table::<Person>(store, creds, Auth::Required, &mut stage)
            .await;
        self.pull_table::<CropType>(store, creds, Auth::Anonymous, &mut stage)
            .await;
        self.pull_table::<Location>(store, creds, Auth::Required, &mut stage)
            .await;
        self.pull_table::<CropCycle>(store, creds, Auth::Required, &mut stage)
            .await;
        self.pull_table::<Device>(store, creds, Auth::Required, &mut stage)
            .await;
        self.pull_table::<Relay>(store, creds, Auth::Required, &mut stage)
            .await;
        self.pull_table::<Sensor>(store, creds, Auth::Required, &mut stage)
            .await;
        if !Self::commit(store, stage, &mut report) {
            return report;
        }

        if let Err(e) = store.set_last_successful_get(started) {
            report.errors.push(e.into());
            return report;
        }

        info!(tables = report.tables.len(), "Reference tables pulled");
        report
    }

    async fn pull_table<T: SyncEntity>(
        &self,
        store: &mut Store,
        credentials: Option<&Credentials>,
        auth: Auth,
        stage: &mut Stage,
    ) {
        let credentials = match (auth, credentials) {
            (Auth::Anonymous, _) => None,
            (Auth::Required, Some(credentials)) => Some(credentials),
            (Auth::Required, None) => {
                error!(table = T::TABLE, "No credentials stored");
                stage.errors.push(Error::missing_credentials(T::TABLE));
                return;
            }
        };

        match self.sync_table::<T>(store, credentials).await {
            Ok(staged) => {
                stage.changes.extend(staged.changes);
                stage.tables.push(staged.stats);
            }
            Err(e) => {
                error!(table = T::TABLE, error = %e, "Failed to pull table");
                stage.errors.push(e);
            }
        }
    }

    fn commit(store: &mut Store, stage: Stage, report: &mut ReferencePullReport) -> bool {
        report.tables.extend(stage.tables);
        if !stage.errors.is_empty() {
            report.errors.extend(stage.errors);
            return false;
        }

        match store.save(&stage.changes) {
            Ok(saved) => {
                debug!("Saved {} staged reference rows", saved);
                true
            }
            Err(e) => {
                report.errors.push(e.into());
                false
            }
        }
    }

    /// Post the rows of `T` changed after `since`.
    ///
    /// Editable tables are selected by `UpdatedAt`. Read-only tables are
    /// immutable once created, so they are selected by `CreatedAt`. An empty
    /// selection posts nothing and returns 0.
    pub async fn post_table_where_updated<T: SyncEntity>(
        &self,
        store: &mut Store,
        since: OffsetDateTime,
        credentials: &Credentials,
    ) -> Result<usize> {
        let rows: Vec<T> = match T::MUTABILITY {
            Mutability::Editable => store.entities_updated_since(since)?,
            Mutability::ReadOnly => store.entities_created_since(since)?,
        };
        if rows.is_empty() {
            return Ok(0);
        }

        let payload = serde_json::to_string(&rows).map_err(verdant_store::Error::from)?;
        self.transport.post(T::TABLE, payload, credentials).await?;

        debug!(table = T::TABLE, rows = rows.len(), "Posted changed rows");
        Ok(rows.len())
    }

    /// Push every locally changed reference row.
    ///
    /// `LastSuccessfulGeneralDbPost` advances to the instant the push started,
    /// only when every table succeeded.
    pub async fn push(&self, store: &mut Store) -> ReferencePushReport {
        let started = crate::now_utc();
        let mut report = ReferencePushReport::default();

        let settings = match store.sync_settings() {
            Ok(settings) => settings,
            Err(e) => {
                report.errors.push(e.into());
                return report;
            }
        };
        let Some(credentials) = settings.credentials.as_ref() else {
            report.errors.push(Error::missing_credentials("reference push"));
            return report;
        };
        let since = settings.last_post_or_epoch();

        self.push_table::<Location>(store, since, credentials, &mut report)
            .await;
        self.push_table::<CropType>(store, since, credentials, &mut report)
            .await;
        self.push_table::<CropCycle>(store, since, credentials, &mut report)
            .await;
        self.push_table::<Device>(store, since, credentials, &mut report)
            .await;
        self.push_table::<Sensor>(store, since, credentials, &mut report)
            .await;
        self.push_table::<Relay>(store, since, credentials, &mut report)
            .await;

        if report.errors.is_empty() {
            if let Err(e) = store.set_last_successful_post(started) {
                report.errors.push(e.into());
            } else {
                let rows: usize = report.tables.iter().map(|t| t.rows).sum();
                info!(rows, "Reference tables pushed");
            }
        }
        report
    }

    async fn push_table<T: SyncEntity>(
        &self,
        store: &mut Store,
        since: OffsetDateTime,
        credentials: &Credentials,
        report: &mut ReferencePushReport,
    ) {
        match self
            .post_table_where_updated::<T>(store, since, credentials)
            .await
        {
            Ok(rows) => report.tables.push(TablePush {
                table: T::TABLE,
                rows,
            }),
            Err(e) => {
                error!(table = T::TABLE, error = %e, "Failed to push table");
                report.errors.push(e);
            }
        }
    }
}
