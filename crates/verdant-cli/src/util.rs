//! Shared helpers for commands.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Write output to a file, or to stdout when no path is given.
pub fn write_output(output: Option<&PathBuf>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write to {}", path.display()))?;
        }
        None => {
            print!("{}", content);
            io::stdout().flush()?;
        }
    }
    Ok(())
}

/// Parse an RFC3339 timestamp given on the command line.
pub fn parse_timestamp(input: &str) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(input.trim(), &Rfc3339)
        .with_context(|| format!("Invalid timestamp '{}': expected RFC3339, e.g. 2026-01-31T14:00:00Z", input))
}

/// Format an optional instant for display.
pub fn format_instant(instant: Option<OffsetDateTime>) -> String {
    instant
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_else(|| "never".to_string())
}
