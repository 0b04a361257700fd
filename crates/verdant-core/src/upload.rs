//! Outbound sensor history.
//!
//! Two passes, each all-or-nothing:
//!
//! 1. **Never uploaded**: every block without `UploadedAt` is posted in
//!    batches. Blocks are marked provisionally in memory; the marks are only
//!    persisted after the last batch succeeded.
//! 2. **Re-edited**: blocks whose day had not ended when they were uploaded may
//!    have gained samples since. The samples after `UploadedAt` are posted as
//!    slices in one request, and the new `UploadedAt` is persisted on success.

use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

use verdant_store::{Credentials, HistoryQuery, Store};
use verdant_types::HistoryBlockWire;

use crate::error::{Error, Result};
use crate::options::{HISTORY_TABLE, SyncOptions};
use crate::transport::Transport;

type UploadMark = (Uuid, time::Date, OffsetDateTime);

/// Outcome of the history push phase.
#[derive(Debug, Default)]
pub struct UploadReport {
    /// Never-uploaded blocks posted and committed.
    pub uploaded: usize,
    /// Requests made by the never-uploaded pass.
    pub batches: usize,
    /// Slices of re-edited blocks posted and committed.
    pub reuploaded: usize,
    /// Failures. Empty on success.
    pub errors: Vec<Error>,
}

/// Batches history blocks for upload and commits `UploadedAt` marks.
pub struct UploadBatcher<'a> {
    transport: &'a dyn Transport,
    options: &'a SyncOptions,
}

impl<'a> UploadBatcher<'a> {
    /// Create a batcher over `transport`.
    pub fn new(transport: &'a dyn Transport, options: &'a SyncOptions) -> Self {
        Self { transport, options }
    }

    /// Run both passes. The re-edited pass is skipped when the first fails.
    pub async fn push(&self, store: &mut Store) -> UploadReport {
        let mut report = UploadReport::default();

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

        match self.upload_never_uploaded(store, &credentials).await {
            Ok((uploaded, batches)) => {
                report.uploaded = uploaded;
                report.batches = batches;
            }
            Err(e) => {
                report.errors.push(e);
                return report;
            }
        }

        match self.upload_reedited(store, &credentials).await {
            Ok(reuploaded) => report.reuploaded = reuploaded,
            Err(e) => report.errors.push(e),
        }

        if report.errors.is_empty() {
            info!(
                uploaded = report.uploaded,
                batches = report.batches,
                reuploaded = report.reuploaded,
                "History pushed"
            );
        }
        report
    }

    /// Post every never-uploaded block.
    ///
    /// Returns `(blocks, batches)`. On any failure nothing is persisted.
    pub async fn upload_never_uploaded(
        &self,
        store: &mut Store,
        credentials: &Credentials,
    ) -> Result<(usize, usize)> {
        let uploaded_at = crate::now_utc();
        let mut pending = store.query_blocks(&HistoryQuery::new().never_uploaded().oldest_first())?;
        if pending.is_empty() {
            return Ok((0, 0));
        }

        let mut batches = 0;
        for batch in pending.chunks_mut(self.options.upload_batch_size) {
            let mut wire: Vec<HistoryBlockWire> = Vec::with_capacity(batch.len());
            for block in batch.iter_mut() {
                block.decode_in_place()?;
                block.uploaded_at = Some(uploaded_at);
                wire.push(block.to_wire()?);
            }

            let payload = serde_json::to_string(&wire).map_err(verdant_store::Error::from)?;
            self.transport
                .post(HISTORY_TABLE, payload, credentials)
                .await?;
            batches += 1;
            debug!(batch = batches, blocks = wire.len(), "Posted history batch");
        }

        let marks: Vec<UploadMark> = pending
            .iter()
            .map(|b| (b.sensor_id, b.day(), uploaded_at))
            .collect();
        store.mark_uploaded(&marks)?;

        Ok((pending.len(), batches))
    }

    /// Post the samples added to uploaded blocks after their upload.
    ///
    /// Returns the number of slices posted. When no block gained samples
    /// nothing is posted.
    pub async fn upload_reedited(
        &self,
        store: &mut Store,
        credentials: &Credentials,
    ) -> Result<usize> {
        let candidates = store.query_blocks(&HistoryQuery::new().open_since_upload().oldest_first())?;

        let now = crate::now_utc();
        let mut slices: Vec<HistoryBlockWire> = Vec::new();
        let mut marks: Vec<UploadMark> = Vec::new();
        for block in &candidates {
            let Some(previous) = block.uploaded_at else {
                continue;
            };

            let mut slice = block.slice_after(previous)?;
            if slice.samples()?.is_empty() {
                continue;
            }
            slice.uploaded_at = Some(now);
            slices.push(slice.to_wire()?);
            marks.push((block.sensor_id, block.day(), now));
        }

        if slices.is_empty() {
            debug!(
                candidates = candidates.len(),
                "No uploaded block gained samples"
            );
            return Ok(0);
        }

        let payload = serde_json::to_string(&slices).map_err(verdant_store::Error::from)?;
        if let Err(e) = self.transport.post(HISTORY_TABLE, payload, credentials).await {
            warn!(slices = slices.len(), "Re-upload of edited history failed");
            return Err(e);
        }

        store.mark_uploaded(&marks)?;
        Ok(slices.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use time::macros::{date, datetime};
    use verdant_types::{HistoryBlock, Sample};

    fn creds() -> Credentials {
        Credentials::new("1", "t")
    }

    fn pending_blocks(store: &mut Store, count: usize) -> Uuid {
        let sensor = Uuid::new_v4();
        let blocks: Vec<HistoryBlock> = (0..count)
            .map(|i| {
                let day = date!(2026 - 01 - 01) + time::Duration::days(i as i64);
                HistoryBlock::new(
                    sensor,
                    Uuid::nil(),
                    day,
                    vec![Sample::new(day.midnight().assume_utc(), i as f64)],
                )
            })
            .collect();
        store.save_blocks(&blocks).unwrap();
        sensor
    }

    #[tokio::test]
    async fn test_never_uploaded_pass_batches_and_commits() {
        let mock = MockTransport::new();
        let mut store = Store::open_in_memory().unwrap();
        pending_blocks(&mut store, 65);

        let options = SyncOptions::default();
        let (uploaded, batches) = UploadBatcher::new(&mock, &options)
            .upload_never_uploaded(&mut store, &creds())
            .await
            .unwrap();

        assert_eq!(uploaded, 65);
        assert_eq!(batches, 3);
        assert_eq!(store.history_stats().unwrap().never_uploaded, 0);

        let first: Vec<HistoryBlockWire> =
            serde_json::from_str(mock.posts().await[0].body.as_deref().unwrap()).unwrap();
        assert_eq!(first.len(), 30);
        assert!(first.iter().all(|b| b.uploaded_at.is_some()));
    }

    #[tokio::test]
    async fn test_never_uploaded_pass_is_atomic() {
        let mock = MockTransport::new();
        mock.fail_post_at(1, 500).await;
        let mut store = Store::open_in_memory().unwrap();
        pending_blocks(&mut store, 65);

        let options = SyncOptions::default();
        let result = UploadBatcher::new(&mock, &options)
            .upload_never_uploaded(&mut store, &creds())
            .await;

        assert!(result.is_err());
        assert_eq!(mock.post_count(), 2);
        assert_eq!(store.history_stats().unwrap().never_uploaded, 65);
    }

    #[tokio::test]
    async fn test_reedited_pass_posts_only_new_samples() {
        let mock = MockTransport::new();
        let mut store = Store::open_in_memory().unwrap();
        let sensor = Uuid::new_v4();
        let day = date!(2026 - 01 - 01);

        let mut block = HistoryBlock::new(
            sensor,
            Uuid::nil(),
            day,
            vec![
                Sample::new(datetime!(2026-01-01 09:55 UTC), 1.0),
                Sample::new(datetime!(2026-01-01 10:05 UTC), 2.0),
            ],
        );
        block.uploaded_at = Some(datetime!(2026-01-01 10:00 UTC));
        store.save_blocks(&[block]).unwrap();

        let options = SyncOptions::default();
        let posted = UploadBatcher::new(&mock, &options)
            .upload_reedited(&mut store, &creds())
            .await
            .unwrap();
        assert_eq!(posted, 1);

        let slices: Vec<HistoryBlockWire> =
            serde_json::from_str(mock.posts().await[0].body.as_deref().unwrap()).unwrap();
        assert_eq!(slices.len(), 1);
        assert_eq!(slices[0].data.len(), 1);
        assert_eq!(slices[0].data[0].time_stamp, datetime!(2026-01-01 10:05 UTC));

        let stored = store.get_block(sensor, day).unwrap().unwrap();
        assert!(stored.uploaded_at.unwrap() > datetime!(2026-01-01 10:00 UTC));
        assert_eq!(stored.samples().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_reedited_pass_without_new_samples_posts_nothing() {
        let mock = MockTransport::new();
        let mut store = Store::open_in_memory().unwrap();

        let mut block = HistoryBlock::new(
            Uuid::new_v4(),
            Uuid::nil(),
            date!(2026 - 01 - 01),
            vec![Sample::new(datetime!(2026-01-01 09:55 UTC), 1.0)],
        );
        block.uploaded_at = Some(datetime!(2026-01-01 10:00 UTC));
        store.save_blocks(&[block]).unwrap();

        let options = SyncOptions::default();
        let posted = UploadBatcher::new(&mock, &options)
            .upload_reedited(&mut store, &creds())
            .await
            .unwrap();
        assert_eq!(posted, 0);
        assert_eq!(mock.post_count(), 0);
    }

    #[tokio::test]
    async fn test_reedited_pass_failure_persists_nothing() {
        let mock = MockTransport::new();
        mock.fail_posts_to(HISTORY_TABLE).await;
        let mut store = Store::open_in_memory().unwrap();
        let sensor = Uuid::new_v4();
        let day = date!(2026 - 01 - 01);
        let uploaded = datetime!(2026-01-01 10:00 UTC);

        let mut block = HistoryBlock::new(
            sensor,
            Uuid::nil(),
            day,
            vec![Sample::new(datetime!(2026-01-01 10:05 UTC), 2.0)],
        );
        block.uploaded_at = Some(uploaded);
        store.save_blocks(&[block]).unwrap();

        let options = SyncOptions::default();
        assert!(
            UploadBatcher::new(&mock, &options)
                .upload_reedited(&mut store, &creds())
                .await
                .is_err()
        );
        assert_eq!(
            store.get_block(sensor, day).unwrap().unwrap().uploaded_at,
            Some(uploaded)
        );
    }
}
