//! Record command - add a sample to local history.
//!
//! Controllers normally write samples themselves; this is the manual path,
//! useful for back-filling and for exercising the upload flow.

use anyhow::{Result, bail};
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;
use verdant_types::Sample;

use super::CommandContext;
use crate::style;
use crate::util::parse_timestamp;

/// Arguments for the record command.
pub struct RecordArgs {
    pub sensor: Uuid,
    pub location: Uuid,
    pub value: f64,
    pub at: Option<String>,
}

impl RecordArgs {
    fn sample(&self) -> Result<Sample> {
        if !self.value.is_finite() {
            bail!("Sample value must be a finite number, got {}", self.value);
        }
        let at = match &self.at {
            Some(s) => parse_timestamp(s)?,
            None => OffsetDateTime::now_utc(),
        };
        // Stored samples have whole-second resolution.
        let at = at.replace_nanosecond(0).unwrap_or(at);
        Ok(Sample::new(at, self.value))
    }
}

/// Execute the record command.
pub async fn cmd_record(ctx: &CommandContext, args: RecordArgs) -> Result<()> {
    let sample = args.sample()?;
    let (sensor, location) = (args.sensor, args.location);
    debug!(%sensor, %location, value = sample.value, "Recording sample");

    let handle = ctx.coordinator()?;
    handle
        .run(move |store| Ok(store.record_samples(sensor, location, &[sample])?))
        .await?;
    handle.shutdown().await?;

    if !ctx.quiet {
        println!(
            "{}",
            style::format_success(
                &format!("Recorded {} for sensor {}", sample.value, sensor),
                ctx.no_color
            )
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn args(value: f64, at: Option<&str>) -> RecordArgs {
        RecordArgs {
            sensor: Uuid::new_v4(),
            location: Uuid::nil(),
            value,
            at: at.map(str::to_string),
        }
    }

    #[test]
    fn test_sample_with_explicit_time() {
        let sample = args(21.5, Some("2026-01-01T10:05:00Z")).sample().unwrap();
        assert_eq!(sample.time_stamp, datetime!(2026-01-01 10:05 UTC));
        assert_eq!(sample.value, 21.5);
    }

    #[test]
    fn test_sample_defaults_to_now_without_subseconds() {
        let sample = args(1.0, None).sample().unwrap();
        assert_eq!(sample.time_stamp.nanosecond(), 0);
    }

    #[test]
    fn test_non_finite_value_is_rejected() {
        assert!(args(f64::NAN, None).sample().is_err());
        assert!(args(f64::INFINITY, None).sample().is_err());
    }
}
