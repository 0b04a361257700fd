//! Device-scoped download of sensor history.
//!
//! History is pulled one device at a time in pages of whole days, starting
//! from the device's watermark. Each remote block is merged into the local
//! block of the same sensor and day. Blocks staged for a device are saved in
//! one transaction once its loop ends, including when it ends with an error.

use std::collections::HashMap;

use time::{Date, Duration, OffsetDateTime};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use verdant_store::{Credentials, Store};
use verdant_types::{
    Device, HistoryBlock, HistoryBlockWire, Payload, Sensor, encode_samples, merge_samples,
};

use crate::error::{Error, Result};
use crate::options::{HISTORY_TABLE, SyncOptions};
use crate::transport::Transport;

/// Outcome of pulling one device's history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHistoryReport {
    /// The device.
    pub device_id: Uuid,
    /// Pages requested, including the final empty one.
    pub pages: usize,
    /// Blocks created locally.
    pub inserted: usize,
    /// Existing local blocks that changed.
    pub updated: usize,
    /// Watermark after the last processed page.
    pub watermark: OffsetDateTime,
}

impl DeviceHistoryReport {
    fn new(device_id: Uuid, watermark: OffsetDateTime) -> Self {
        Self {
            device_id,
            pages: 0,
            inserted: 0,
            updated: 0,
            watermark,
        }
    }
}

/// Outcome of the history pull phase.
#[derive(Debug, Default)]
pub struct HistoryPullReport {
    /// One entry per device attempted.
    pub devices: Vec<DeviceHistoryReport>,
    /// Failures from all devices. Empty on success.
    pub errors: Vec<Error>,
}

struct StagedBlock {
    block: HistoryBlock,
    inserted: bool,
}

/// Blocks staged for one device, keyed by sensor and day.
type WorkingSet = HashMap<(Uuid, Date), StagedBlock>;

/// The resume point for `device_id`.
///
/// Taken from the newest uploaded block, by day, among the device's sensors:
/// its latest sample time, or its day marker minus one day if it holds no
/// samples. The epoch when no such block exists. Never-uploaded blocks are
/// ignored because they can be much newer than what the server still holds.
pub fn device_watermark(store: &Store, device_id: Uuid) -> Result<OffsetDateTime> {
    let sensors: Vec<Uuid> = store
        .list_entities::<Sensor>()?
        .into_iter()
        .filter(|s| s.device_id == device_id)
        .map(|s| s.id)
        .collect();

    let Some(block) = store.latest_uploaded_block(&sensors)? else {
        return Ok(OffsetDateTime::UNIX_EPOCH);
    };

    match block.latest_sample_time()? {
        Some(latest) => Ok(latest),
        None => {
            warn!(
                device = %device_id,
                sensor = %block.sensor_id,
                day = %block.day(),
                "Uploaded history block has no samples, resuming from the previous day"
            );
            Ok(block.time_stamp - Duration::days(1))
        }
    }
}

/// Pulls and merges sensor history.
pub struct TimeSeriesSyncer<'a> {
    transport: &'a dyn Transport,
    options: &'a SyncOptions,
}

impl<'a> TimeSeriesSyncer<'a> {
    /// Create a syncer over `transport`.
    pub fn new(transport: &'a dyn Transport, options: &'a SyncOptions) -> Self {
        Self { transport, options }
    }

    /// Pull history for every known device.
    ///
    /// A failing device does not stop the others.
    pub async fn pull(&self, store: &mut Store) -> HistoryPullReport {
        let mut report = HistoryPullReport::default();

        let credentials = match store.sync_settings() {
            Ok(settings) => settings.credentials,
            Err(e) => {
                report.errors.push(e.into());
                return report;
            }
        };
        let Some(credentials) = credentials else {
            report.errors.push(Error::missing_credentials(HISTORY_TABLE));
            return report;
        };

        let devices = match store.list_entities::<Device>() {
            Ok(devices) => devices,
            Err(e) => {
                report.errors.push(e.into());
                return report;
            }
        };

        for device in devices {
            let (device_report, result) =
                self.sync_device(store, device.id, &credentials).await;
            if let Err(e) = result {
                error!(device = %device.id, name = %device.name, error = %e, "History pull failed");
                report.errors.push(e);
            }
            report.devices.push(device_report);
        }

        let blocks: usize = report
            .devices
            .iter()
            .map(|d| d.inserted + d.updated)
            .sum();
        info!(devices = report.devices.len(), blocks, "History pulled");
        report
    }

    /// Pull one device's history until the server returns an empty page.
    ///
    /// Returns the device report together with the first error met, if any.
    /// Blocks staged before the error are still saved.
    pub async fn sync_device(
        &self,
        store: &mut Store,
        device_id: Uuid,
        credentials: &Credentials,
    ) -> (DeviceHistoryReport, Result<()>) {
        let pulled_at = crate::now_utc();
        let mut report = DeviceHistoryReport::new(device_id, OffsetDateTime::UNIX_EPOCH);
        let mut working = WorkingSet::new();

        let result = self
            .pull_pages(store, device_id, credentials, pulled_at, &mut working, &mut report)
            .await;

        let mut blocks = Vec::with_capacity(working.len());
        for staged in working.into_values() {
            if staged.inserted {
                report.inserted += 1;
            } else {
                report.updated += 1;
            }
            blocks.push(staged.block);
        }

        let saved = store.save_blocks(&blocks).map(|_| ()).map_err(Error::from);
        debug!(
            device = %device_id,
            pages = report.pages,
            inserted = report.inserted,
            updated = report.updated,
            "Saved device history"
        );

        (report, result.and(saved))
    }

    async fn pull_pages(
        &self,
        store: &mut Store,
        device_id: Uuid,
        credentials: &Credentials,
        pulled_at: OffsetDateTime,
        working: &mut WorkingSet,
        report: &mut DeviceHistoryReport,
    ) -> Result<()> {
        let mut watermark = device_watermark(store, device_id)?;
        report.watermark = watermark;

        loop {
            let path = format!(
                "{}/{}/{}/{}",
                HISTORY_TABLE,
                device_id.hyphenated(),
                watermark.unix_timestamp(),
                self.options.max_days_per_request
            );
            let body = self.transport.get(&path, Some(credentials)).await?;
            let page: Vec<HistoryBlockWire> =
                serde_json::from_str(&body).map_err(|e| Error::decode(&path, e))?;
            report.pages += 1;

            debug!(device = %device_id, blocks = page.len(), "Received history page");
            if page.is_empty() {
                break;
            }

            let mut page_latest: Option<OffsetDateTime> = None;
            for wire in page {
                let mut remote = HistoryBlock::from(wire);
                // Rows served by the API already exist remotely.
                if remote.uploaded_at.is_none() {
                    remote.uploaded_at = Some(pulled_at);
                }
                if let Some(latest) = remote.latest_sample_time()? {
                    page_latest = page_latest.max(Some(latest));
                }
                merge_block(store, remote, working)?;
            }

            match page_latest {
                Some(next) if next > watermark => {
                    watermark = next;
                    report.watermark = watermark;
                }
                _ => {
                    debug!(device = %device_id, "Page did not advance the watermark");
                    break;
                }
            }
        }

        Ok(())
    }
}

/// Merge `remote` into the working set.
///
/// The same-day block is looked up in the working set first, then in the
/// store. A merge that changes nothing stages nothing.
fn merge_block(store: &Store, remote: HistoryBlock, working: &mut WorkingSet) -> Result<()> {
    let key = (remote.sensor_id, remote.day());

    let (mut local, inserted) = match working.remove(&key) {
        Some(staged) => (staged.block, Some(staged.inserted)),
        None => match store.get_block(key.0, key.1)? {
            Some(block) => (block, None),
            None => {
                let mut block = remote;
                block.encode_in_place();
                working.insert(
                    key,
                    StagedBlock {
                        block,
                        inserted: true,
                    },
                );
                return Ok(());
            }
        },
    };

    let local_samples = local.samples()?.into_owned();
    let merged = merge_samples(&local_samples, &remote.samples()?);
    let changed = merged != local_samples || local.location_id != remote.location_id;

    if changed {
        local.location_id = remote.location_id;
        local.payload = Payload::Encoded(encode_samples(&merged));
    }

    match inserted {
        Some(inserted) => {
            working.insert(key, StagedBlock { block: local, inserted });
        }
        None if changed => {
            working.insert(
                key,
                StagedBlock {
                    block: local,
                    inserted: false,
                },
            );
        }
        None => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use time::macros::{date, datetime};
    use verdant_types::Sample;

    fn sensor(id: Uuid, device_id: Uuid) -> Sensor {
        Sensor {
            id,
            device_id,
            sensor_type_id: 1,
            enabled: true,
            alarmed: false,
            upper_limit: None,
            lower_limit: None,
            created_at: datetime!(2026-01-01 0:00 UTC),
            updated_at: datetime!(2026-01-01 0:00 UTC),
            deleted: false,
        }
    }

    fn block(sensor: Uuid, location: Uuid, day: Date, samples: &[(OffsetDateTime, f64)]) -> HistoryBlock {
        HistoryBlock::new(
            sensor,
            location,
            day,
            samples.iter().map(|(t, v)| Sample::new(*t, *v)).collect(),
        )
    }

    #[test]
    fn test_watermark_epoch_without_uploaded_blocks() {
        let mut store = Store::open_in_memory().unwrap();
        let device = Uuid::new_v4();
        let s = Uuid::new_v4();
        store.upsert_entity(&sensor(s, device)).unwrap();
        store
            .save_blocks(&[block(
                s,
                Uuid::nil(),
                date!(2026 - 01 - 05),
                &[(datetime!(2026-01-05 10:00 UTC), 1.0)],
            )])
            .unwrap();

        assert_eq!(
            device_watermark(&store, device).unwrap(),
            OffsetDateTime::UNIX_EPOCH
        );
    }

    #[test]
    fn test_watermark_uses_latest_sample_of_newest_uploaded_block() {
        let mut store = Store::open_in_memory().unwrap();
        let device = Uuid::new_v4();
        let (s1, s2) = (Uuid::new_v4(), Uuid::new_v4());
        store.upsert_entity(&sensor(s1, device)).unwrap();
        store.upsert_entity(&sensor(s2, device)).unwrap();

        let mut older = block(
            s1,
            Uuid::nil(),
            date!(2026 - 01 - 01),
            &[(datetime!(2026-01-01 20:00 UTC), 1.0)],
        );
        older.uploaded_at = Some(datetime!(2026-01-02 0:00 UTC));
        let mut newer = block(
            s2,
            Uuid::nil(),
            date!(2026 - 01 - 02),
            &[(datetime!(2026-01-02 08:30 UTC), 2.0)],
        );
        newer.uploaded_at = Some(datetime!(2026-01-02 09:00 UTC));
        store.save_blocks(&[older, newer]).unwrap();

        assert_eq!(
            device_watermark(&store, device).unwrap(),
            datetime!(2026-01-02 08:30 UTC)
        );
    }

    #[test]
    fn test_watermark_of_empty_uploaded_block() {
        let mut store = Store::open_in_memory().unwrap();
        let device = Uuid::new_v4();
        let s = Uuid::new_v4();
        store.upsert_entity(&sensor(s, device)).unwrap();

        let mut empty = block(s, Uuid::nil(), date!(2026 - 01 - 03), &[]);
        empty.uploaded_at = Some(datetime!(2026-01-04 0:00 UTC));
        store.save_blocks(&[empty]).unwrap();

        assert_eq!(
            device_watermark(&store, device).unwrap(),
            datetime!(2026-01-02 23:59:59 UTC)
        );
    }

    #[test]
    fn test_merge_block_unchanged_stages_nothing() {
        let mut store = Store::open_in_memory().unwrap();
        let s = Uuid::new_v4();
        let loc = Uuid::new_v4();
        let existing = block(
            s,
            loc,
            date!(2026 - 01 - 01),
            &[(datetime!(2026-01-01 10:00 UTC), 1.0)],
        );
        store.save_blocks(std::slice::from_ref(&existing)).unwrap();

        let mut working = WorkingSet::new();
        merge_block(&store, existing, &mut working).unwrap();
        assert!(working.is_empty());
    }

    #[test]
    fn test_merge_block_prefers_working_set() {
        let store = Store::open_in_memory().unwrap();
        let s = Uuid::new_v4();
        let loc = Uuid::new_v4();
        let day = date!(2026 - 01 - 01);

        let mut working = WorkingSet::new();
        merge_block(
            &store,
            block(s, loc, day, &[(datetime!(2026-01-01 10:00 UTC), 1.0)]),
            &mut working,
        )
        .unwrap();
        merge_block(
            &store,
            block(
                s,
                loc,
                day,
                &[
                    (datetime!(2026-01-01 10:00 UTC), 5.0),
                    (datetime!(2026-01-01 11:00 UTC), 2.0),
                ],
            ),
            &mut working,
        )
        .unwrap();

        assert_eq!(working.len(), 1);
        let staged = &working[&(s, day)];
        assert!(staged.inserted);
        let samples = staged.block.samples().unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].value, 5.0);
    }

    #[tokio::test]
    async fn test_sync_device_saves_staged_blocks_on_error() {
        let mock = MockTransport::new();
        let device = Uuid::new_v4();
        let s = Uuid::new_v4();
        let prefix = format!("{}/{}", HISTORY_TABLE, device.hyphenated());

        let page = vec![
            block(
                s,
                Uuid::nil(),
                date!(2026 - 01 - 01),
                &[(datetime!(2026-01-01 12:00 UTC), 1.0)],
            )
            .to_wire()
            .unwrap(),
        ];
        mock.push_page(&prefix, serde_json::to_string(&page).unwrap())
            .await;
        mock.push_failure(&prefix, 502).await;

        let mut store = Store::open_in_memory().unwrap();
        store.upsert_entity(&sensor(s, device)).unwrap();

        let options = SyncOptions::default();
        let syncer = TimeSeriesSyncer::new(&mock, &options);
        let (report, result) = syncer
            .sync_device(&mut store, device, &Credentials::new("1", "t"))
            .await;

        assert!(matches!(result, Err(Error::Transport { status: Some(502), .. })));
        assert_eq!(report.pages, 1);
        assert_eq!(report.inserted, 1);
        assert_eq!(report.watermark, datetime!(2026-01-01 12:00 UTC));
        assert_eq!(store.count_history(Some(s)).unwrap(), 1);

        let gets = mock.gets().await;
        assert_eq!(gets[0].path, format!("{prefix}/0/15"));
        assert_eq!(
            gets[1].path,
            format!(
                "{prefix}/{}/15",
                datetime!(2026-01-01 12:00 UTC).unix_timestamp()
            )
        );
    }
}
