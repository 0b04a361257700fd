//! Status command implementation.

use std::fmt::Write as _;

use anyhow::Result;
use serde::Serialize;
use verdant_store::{HistoryStats, Store, SyncSettings};
use verdant_types::{
    CropCycle, CropType, Device, Location, Parameter, Person, Placement, Relay, RelayType,
    Sensor, SensorType, Subsystem, SyncEntity,
};

use super::CommandContext;
use crate::cli::OutputFormat;
use crate::style;
use crate::util::{format_instant, write_output};

/// Tables shown by `status`, in pull order.
const TABLES: [&str; 12] = [
    Parameter::TABLE,
    Placement::TABLE,
    Subsystem::TABLE,
    RelayType::TABLE,
    SensorType::TABLE,
    Person::TABLE,
    CropType::TABLE,
    Location::TABLE,
    CropCycle::TABLE,
    Device::TABLE,
    Relay::TABLE,
    Sensor::TABLE,
];

#[derive(Debug, Serialize)]
struct StatusSnapshot {
    database: String,
    user_id: Option<String>,
    last_successful_get: String,
    last_successful_post: String,
    tables: Vec<TableCount>,
    history: HistorySummary,
}

#[derive(Debug, Serialize)]
struct TableCount {
    table: &'static str,
    rows: u64,
}

#[derive(Debug, Serialize)]
struct HistorySummary {
    blocks: u64,
    sensors: u64,
    never_uploaded: u64,
    open_since_upload: u64,
}

impl From<HistoryStats> for HistorySummary {
    fn from(stats: HistoryStats) -> Self {
        Self {
            blocks: stats.blocks,
            sensors: stats.sensors,
            never_uploaded: stats.never_uploaded,
            open_since_upload: stats.open_since_upload,
        }
    }
}

/// Execute the status command.
pub async fn cmd_status(ctx: &CommandContext, format: OutputFormat) -> Result<()> {
    let handle = ctx.coordinator()?;
    let database = ctx.config.storage.path.display().to_string();

    let snapshot = handle
        .run(move |store| Ok(snapshot(store, database)?))
        .await?;
    handle.shutdown().await?;

    let content = match format {
        OutputFormat::Json => format!("{}\n", serde_json::to_string_pretty(&snapshot)?),
        OutputFormat::Text => format_status_text(&snapshot, ctx.no_color),
    };
    write_output(ctx.output.as_ref(), &content)
}

fn snapshot(store: &mut Store, database: String) -> verdant_store::Result<StatusSnapshot> {
    let SyncSettings {
        credentials,
        last_successful_general_db_get,
        last_successful_general_db_post,
    } = store.sync_settings()?;

    let mut tables = Vec::with_capacity(TABLES.len());
    for table in TABLES {
        tables.push(TableCount {
            table,
            rows: store.count_entities(table)?,
        });
    }

    Ok(StatusSnapshot {
        database,
        user_id: credentials.map(|c| c.user_id),
        last_successful_get: format_instant(last_successful_general_db_get),
        last_successful_post: format_instant(last_successful_general_db_post),
        tables,
        history: store.history_stats()?.into(),
    })
}

fn format_status_text(snapshot: &StatusSnapshot, no_color: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", style::format_title("Verdant sync status", no_color));
    let _ = writeln!(out, "Database: {}", snapshot.database);

    let _ = match &snapshot.user_id {
        Some(user) => writeln!(out, "{}", style::format_success(&format!("Signed in as {}", user), no_color)),
        None => writeln!(out, "{}", style::format_warning("No credentials stored", no_color)),
    };
    let _ = writeln!(out, "Last pull: {}", snapshot.last_successful_get);
    let _ = writeln!(out, "Last push: {}", snapshot.last_successful_post);

    let _ = writeln!(out);
    let _ = writeln!(out, "{}", style::format_title("Tables", no_color));
    for t in &snapshot.tables {
        let _ = writeln!(out, "  {:<12} {:>8}", t.table, t.rows);
    }

    let h = &snapshot.history;
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", style::format_title("History", no_color));
    let _ = writeln!(out, "  {} blocks across {} sensors", h.blocks, h.sensors);
    if h.never_uploaded + h.open_since_upload == 0 {
        let _ = writeln!(out, "{}", style::format_info("Nothing pending upload", no_color));
    } else {
        let _ = writeln!(
            out,
            "{}",
            style::format_warning(
                &format!(
                    "{} never uploaded, {} edited since upload",
                    h.never_uploaded, h.open_since_upload
                ),
                no_color
            )
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;
    use uuid::Uuid;
    use verdant_store::Credentials;
    use verdant_types::Sample;

    #[test]
    fn test_snapshot_of_fresh_store() {
        let mut store = Store::open_in_memory().unwrap();
        let snap = snapshot(&mut store, "mem".to_string()).unwrap();

        assert!(snap.user_id.is_none());
        assert_eq!(snap.last_successful_get, "never");
        assert_eq!(snap.tables.len(), 12);
        assert!(snap.tables.iter().all(|t| t.rows == 0));
        assert_eq!(snap.history.blocks, 0);
    }

    #[test]
    fn test_status_text_reports_pending_uploads() {
        let mut store = Store::open_in_memory().unwrap();
        store.set_credentials(&Credentials::new("17", "secret")).unwrap();
        store
            .record_samples(
                Uuid::new_v4(),
                Uuid::nil(),
                &[Sample::new(datetime!(2026-01-01 10:00 UTC), 1.0)],
            )
            .unwrap();

        let snap = snapshot(&mut store, "mem".to_string()).unwrap();
        let text = format_status_text(&snap, true);
        assert!(text.contains("[OK] Signed in as 17"));
        assert!(text.contains("1 blocks across 1 sensors"));
        assert!(text.contains("1 never uploaded, 0 edited since upload"));
        assert!(!text.contains("secret"));
    }
}
