//! Sync command - run the full pipeline once.

use std::fmt::Write as _;

use anyhow::{Context, Result, bail};
use time::format_description::well_known::Rfc3339;
use tracing::info;
use verdant_core::SyncReport;

use super::CommandContext;
use crate::cli::OutputFormat;
use crate::style;
use crate::util::write_output;

/// Execute the sync command.
pub async fn cmd_sync(ctx: &CommandContext, format: OutputFormat) -> Result<()> {
    let handle = ctx.coordinator()?;
    info!(url = %ctx.config.api.url, "Syncing");

    let spinner = (format == OutputFormat::Text && !ctx.quiet)
        .then(|| style::operation_spinner(&format!("Syncing with {}...", ctx.config.api.url)));
    let result = handle.sync().await;
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    let report = result.context("Sync could not start")?;
    handle.shutdown().await?;

    let content = match format {
        OutputFormat::Json => format_report_json(&report)?,
        OutputFormat::Text => format_report_text(&report, ctx.no_color),
    };
    write_output(ctx.output.as_ref(), &content)?;

    if let Some(failure) = &report.failure {
        bail!(
            "Sync failed during {} ({} errors)",
            failure.phase,
            failure.errors.len()
        );
    }
    Ok(())
}

fn format_report_text(report: &SyncReport, no_color: bool) -> String {
    let mut out = String::new();

    for phase in &report.completed {
        let _ = writeln!(out, "{}", style::format_success(&phase.to_string(), no_color));
    }
    if let Some(failure) = &report.failure {
        let _ = writeln!(
            out,
            "{}",
            style::format_failure(&failure.phase.to_string(), no_color)
        );
        for e in &failure.errors {
            let _ = writeln!(out, "       {}", e);
        }
    }

    let pulled: usize = report
        .reference_pull
        .iter()
        .map(|t| t.inserted + t.overwritten)
        .sum();
    let blocks: usize = report
        .history_pull
        .iter()
        .map(|d| d.inserted + d.updated)
        .sum();
    let pushed: usize = report.reference_push.iter().map(|t| t.rows).sum();

    let _ = writeln!(out);
    let _ = writeln!(out, "Reference rows merged: {}", pulled);
    let _ = writeln!(out, "History blocks merged: {}", blocks);
    let _ = writeln!(out, "Reference rows pushed: {}", pushed);
    let _ = writeln!(out, "History blocks uploaded: {}", report.blocks_uploaded);
    let _ = writeln!(out, "Edited blocks re-uploaded: {}", report.slices_reuploaded);
    out
}

fn format_report_json(report: &SyncReport) -> Result<String> {
    let history: Vec<serde_json::Value> = report
        .history_pull
        .iter()
        .map(|d| {
            serde_json::json!({
                "device": d.device_id,
                "pages": d.pages,
                "inserted": d.inserted,
                "updated": d.updated,
                "watermark": d.watermark.format(&Rfc3339).ok(),
            })
        })
        .collect();

    let value = serde_json::json!({
        "success": report.is_success(),
        "completed": report.completed.iter().map(|p| p.to_string()).collect::<Vec<_>>(),
        "failed_phase": report.failure.as_ref().map(|f| f.phase.to_string()),
        "errors": report.errors().iter().map(|e| e.to_string()).collect::<Vec<_>>(),
        "reference_pull": report.reference_pull.iter().map(|t| serde_json::json!({
            "table": t.table,
            "received": t.received,
            "inserted": t.inserted,
            "overwritten": t.overwritten,
            "kept_local": t.kept_local,
        })).collect::<Vec<_>>(),
        "history_pull": history,
        "reference_push": report.reference_push.iter().map(|t| serde_json::json!({
            "table": t.table,
            "rows": t.rows,
        })).collect::<Vec<_>>(),
        "blocks_uploaded": report.blocks_uploaded,
        "slices_reuploaded": report.slices_reuploaded,
    });

    Ok(format!("{}\n", serde_json::to_string_pretty(&value)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use verdant_core::{Error, PhaseFailure, SyncPhase, TablePush};

    fn failed_report() -> SyncReport {
        SyncReport {
            completed: vec![SyncPhase::PullReference],
            failure: Some(PhaseFailure {
                phase: SyncPhase::PullHistory,
                errors: vec![Error::transport("SensorsHistory/x/0/15", "bad gateway", Some(502))],
            }),
            reference_push: vec![TablePush {
                table: "Devices",
                rows: 2,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_text_report_lists_phases_and_errors() {
        let text = format_report_text(&failed_report(), true);
        assert!(text.contains("[OK] pull reference tables"));
        assert!(text.contains("[XX] pull sensor history"));
        assert!(text.contains("bad gateway"));
        assert!(text.contains("Reference rows pushed: 2"));
    }

    #[test]
    fn test_json_report() {
        let json = format_report_json(&failed_report()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["failed_phase"], "pull sensor history");
        assert_eq!(value["completed"][0], "pull reference tables");
        assert_eq!(value["reference_push"][0]["rows"], 2);
        assert_eq!(value["errors"].as_array().unwrap().len(), 1);
    }
}
