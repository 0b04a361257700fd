//! Day-granular sensor history.
//!
//! A [`HistoryBlock`] holds one calendar day of samples for one sensor. At rest
//! the samples are kept in a compact binary encoding; on the wire they travel
//! as a decoded `Data` array. The two forms are modelled by [`Payload`], and
//! conversion between them only happens through explicit calls.
//!
//! # Encoding
//!
//! Each sample is a 16-byte little-endian record:
//!
//! | Offset | Type | Field |
//! |--------|------|-------|
//! | 0 | `i64` | unix timestamp (seconds) |
//! | 8 | `f64` | value |
//!
//! Records are stored in ascending timestamp order.

use std::borrow::Cow;
use std::collections::BTreeMap;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use time::macros::time;
use time::{Date, OffsetDateTime, UtcOffset};
use uuid::Uuid;

use crate::error::{PayloadError, PayloadResult};

/// Size in bytes of one encoded sample.
pub const SAMPLE_RECORD_LEN: usize = 16;

/// A single timestamped reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Sample {
    #[serde(with = "time::serde::rfc3339")]
    pub time_stamp: OffsetDateTime,
    pub value: f64,
}

impl Sample {
    /// Create a sample. The timestamp is truncated to whole seconds, the
    /// precision of the stored encoding.
    pub fn new(time_stamp: OffsetDateTime, value: f64) -> Self {
        let time_stamp = time_stamp
            .to_offset(UtcOffset::UTC)
            .replace_nanosecond(0)
            .unwrap_or(time_stamp);
        Self { time_stamp, value }
    }
}

/// Encode samples into the compact at-rest representation.
pub fn encode_samples(samples: &[Sample]) -> Bytes {
    let mut buf = BytesMut::with_capacity(samples.len() * SAMPLE_RECORD_LEN);
    for sample in samples {
        buf.put_i64_le(sample.time_stamp.unix_timestamp());
        buf.put_f64_le(sample.value);
    }
    buf.freeze()
}

/// Decode the compact at-rest representation.
pub fn decode_samples(mut raw: &[u8]) -> PayloadResult<Vec<Sample>> {
    if raw.len() % SAMPLE_RECORD_LEN != 0 {
        return Err(PayloadError::Truncated {
            len: raw.len(),
            record_len: SAMPLE_RECORD_LEN,
        });
    }

    let mut samples = Vec::with_capacity(raw.len() / SAMPLE_RECORD_LEN);
    while raw.has_remaining() {
        let secs = raw.get_i64_le();
        let value = raw.get_f64_le();
        let time_stamp = OffsetDateTime::from_unix_timestamp(secs)
            .map_err(|_| PayloadError::InvalidTimestamp(secs))?;
        samples.push(Sample { time_stamp, value });
    }
    Ok(samples)
}

/// Merge two sample sequences.
///
/// The result is the union of both, ordered by timestamp, with one sample per
/// timestamp. When both sides have a sample at the same second the `remote`
/// value is kept.
pub fn merge_samples(local: &[Sample], remote: &[Sample]) -> Vec<Sample> {
    let mut merged: BTreeMap<i64, Sample> = BTreeMap::new();
    for sample in local.iter().chain(remote) {
        let sample = Sample::new(sample.time_stamp, sample.value);
        merged.insert(sample.time_stamp.unix_timestamp(), sample);
    }
    merged.into_values().collect()
}

/// The two representations of a block's samples.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Compact bytes as stored locally.
    Encoded(Bytes),
    /// Ordered samples as exchanged with the API.
    Decoded(Vec<Sample>),
}

impl Payload {
    /// Borrow or decode the samples.
    pub fn samples(&self) -> PayloadResult<Cow<'_, [Sample]>> {
        match self {
            Payload::Encoded(raw) => decode_samples(raw).map(Cow::Owned),
            Payload::Decoded(samples) => Ok(Cow::Borrowed(samples)),
        }
    }

    /// Return the encoded bytes, encoding if needed.
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Payload::Encoded(raw) => raw.clone(),
            Payload::Decoded(samples) => encode_samples(samples),
        }
    }

    /// Whether the payload is currently held in decoded form.
    pub fn is_decoded(&self) -> bool {
        matches!(self, Payload::Decoded(_))
    }
}

impl Default for Payload {
    fn default() -> Self {
        Payload::Decoded(Vec::new())
    }
}

/// The end-of-day marker used as a block's `TimeStamp`.
pub fn end_of_day(day: Date) -> OffsetDateTime {
    day.with_time(time!(23:59:59)).assume_utc()
}

/// The calendar day (UTC) an instant falls on.
///
/// Days are always keyed in UTC, whatever offset the instant carries, so
/// `2026-01-02T00:30+02:00` belongs to January 1. Instants from a server that
/// reports local offsets are regrouped on UTC midnight rather than on the
/// server's own midnight. Block day markers ([`end_of_day`]) use the same UTC
/// convention.
pub fn day_of(instant: OffsetDateTime) -> Date {
    instant.to_offset(UtcOffset::UTC).date()
}

/// One day of samples for one sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryBlock {
    /// Sensor the samples belong to.
    pub sensor_id: Uuid,
    /// Location the sensor was at when the samples were taken.
    pub location_id: Uuid,
    /// End-of-day marker of the block's day.
    pub time_stamp: OffsetDateTime,
    /// When this block was last uploaded. `None` if it never was.
    pub uploaded_at: Option<OffsetDateTime>,
    /// The block's samples, encoded or decoded.
    pub payload: Payload,
}

impl HistoryBlock {
    /// Create a never-uploaded block for `day` holding `samples`.
    ///
    /// Samples are sorted and deduplicated by timestamp (last one wins).
    pub fn new(sensor_id: Uuid, location_id: Uuid, day: Date, samples: Vec<Sample>) -> Self {
        Self {
            sensor_id,
            location_id,
            time_stamp: end_of_day(day),
            uploaded_at: None,
            payload: Payload::Decoded(merge_samples(&[], &samples)),
        }
    }

    /// The calendar day this block covers.
    pub fn day(&self) -> Date {
        day_of(self.time_stamp)
    }

    /// Borrow or decode the samples.
    pub fn samples(&self) -> PayloadResult<Cow<'_, [Sample]>> {
        self.payload.samples()
    }

    /// Switch the payload to its decoded form.
    pub fn decode_in_place(&mut self) -> PayloadResult<()> {
        if let Payload::Encoded(raw) = &self.payload {
            self.payload = Payload::Decoded(decode_samples(raw)?);
        }
        Ok(())
    }

    /// Switch the payload to its encoded form.
    pub fn encode_in_place(&mut self) {
        if let Payload::Decoded(samples) = &self.payload {
            self.payload = Payload::Encoded(encode_samples(samples));
        }
    }

    /// The encoded payload, as stored at rest.
    pub fn raw_data(&self) -> Bytes {
        self.payload.to_bytes()
    }

    /// Timestamp of the newest sample, if any.
    pub fn latest_sample_time(&self) -> PayloadResult<Option<OffsetDateTime>> {
        Ok(self.samples()?.iter().map(|s| s.time_stamp).max())
    }

    /// A new block with the same sensor, location and day holding only the
    /// samples strictly after `after`.
    pub fn slice_after(&self, after: OffsetDateTime) -> PayloadResult<HistoryBlock> {
        let newer = self
            .samples()?
            .iter()
            .filter(|s| s.time_stamp > after)
            .copied()
            .collect();

        Ok(HistoryBlock {
            sensor_id: self.sensor_id,
            location_id: self.location_id,
            time_stamp: self.time_stamp,
            uploaded_at: self.uploaded_at,
            payload: Payload::Decoded(newer),
        })
    }

    /// Whether samples were added after the last upload.
    ///
    /// Only blocks whose day had not ended at upload time can have been
    /// extended afterwards.
    pub fn may_have_changed_since_upload(&self) -> bool {
        matches!(self.uploaded_at, Some(uploaded) if self.time_stamp > uploaded)
    }

    /// Build the wire form, decoding the payload if needed.
    pub fn to_wire(&self) -> PayloadResult<HistoryBlockWire> {
        Ok(HistoryBlockWire {
            sensor_id: self.sensor_id,
            location_id: self.location_id,
            time_stamp: self.time_stamp,
            uploaded_at: self.uploaded_at,
            data: self.samples()?.into_owned(),
        })
    }
}

/// JSON form of a [`HistoryBlock`] exchanged with the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HistoryBlockWire {
    #[serde(rename = "SensorID")]
    pub sensor_id: Uuid,
    #[serde(rename = "LocationID")]
    pub location_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub time_stamp: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub uploaded_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub data: Vec<Sample>,
}

impl From<HistoryBlockWire> for HistoryBlock {
    fn from(wire: HistoryBlockWire) -> Self {
        HistoryBlock {
            sensor_id: wire.sensor_id,
            location_id: wire.location_id,
            time_stamp: wire.time_stamp,
            uploaded_at: wire.uploaded_at,
            payload: Payload::Decoded(merge_samples(&[], &wire.data)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use time::Duration;
    use time::macros::{date, datetime};

    fn sample(ts: OffsetDateTime, value: f64) -> Sample {
        Sample::new(ts, value)
    }

    #[test]
    fn test_encode_decode_preserves_samples() {
        let samples = vec![
            sample(datetime!(2026-01-01 09:00 UTC), 21.5),
            sample(datetime!(2026-01-01 09:05 UTC), 21.75),
        ];

        let raw = encode_samples(&samples);
        assert_eq!(raw.len(), 2 * SAMPLE_RECORD_LEN);
        assert_eq!(decode_samples(&raw).unwrap(), samples);
    }

    #[test]
    fn test_decode_rejects_partial_record() {
        let raw = [0u8; SAMPLE_RECORD_LEN + 3];
        let err = decode_samples(&raw).unwrap_err();
        assert_eq!(
            err,
            PayloadError::Truncated {
                len: 19,
                record_len: 16
            }
        );
    }

    #[test]
    fn test_decode_empty_payload() {
        assert!(decode_samples(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_merge_remote_wins_on_collision() {
        let local = vec![
            sample(datetime!(2026-01-01 09:00 UTC), 1.0),
            sample(datetime!(2026-01-01 09:10 UTC), 2.0),
        ];
        let remote = vec![
            sample(datetime!(2026-01-01 09:05 UTC), 3.0),
            sample(datetime!(2026-01-01 09:10 UTC), 4.0),
        ];

        let merged = merge_samples(&local, &remote);
        let values: Vec<f64> = merged.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![1.0, 3.0, 4.0]);
        assert!(merged.windows(2).all(|w| w[0].time_stamp < w[1].time_stamp));
    }

    #[test]
    fn test_sample_truncates_to_seconds() {
        let s = Sample::new(datetime!(2026-01-01 09:00:00.750 UTC), 1.0);
        assert_eq!(s.time_stamp, datetime!(2026-01-01 09:00 UTC));
    }

    #[test]
    fn test_day_of_keys_by_utc_date() {
        assert_eq!(
            day_of(datetime!(2026-01-02 00:30 +02:00)),
            date!(2026 - 01 - 01)
        );
        assert_eq!(
            day_of(datetime!(2026-01-01 23:30 -03:00)),
            date!(2026 - 01 - 02)
        );
    }

    #[test]
    fn test_block_day_uses_end_of_day_marker() {
        let block = HistoryBlock::new(Uuid::nil(), Uuid::nil(), date!(2026 - 01 - 01), vec![]);
        assert_eq!(block.time_stamp, datetime!(2026-01-01 23:59:59 UTC));
        assert_eq!(block.day(), date!(2026 - 01 - 01));
        assert!(block.uploaded_at.is_none());
    }

    #[test]
    fn test_encode_and_decode_in_place() {
        let mut block = HistoryBlock::new(
            Uuid::nil(),
            Uuid::nil(),
            date!(2026 - 01 - 01),
            vec![sample(datetime!(2026-01-01 12:00 UTC), 5.0)],
        );

        block.encode_in_place();
        assert!(!block.payload.is_decoded());
        block.decode_in_place().unwrap();
        assert!(block.payload.is_decoded());
        assert_eq!(block.samples().unwrap().len(), 1);
    }

    #[test]
    fn test_slice_after_keeps_only_newer_samples() {
        let block = HistoryBlock::new(
            Uuid::nil(),
            Uuid::nil(),
            date!(2026 - 01 - 01),
            vec![
                sample(datetime!(2026-01-01 09:55 UTC), 1.0),
                sample(datetime!(2026-01-01 10:00 UTC), 2.0),
                sample(datetime!(2026-01-01 10:05 UTC), 3.0),
            ],
        );

        let slice = block.slice_after(datetime!(2026-01-01 10:00 UTC)).unwrap();
        let samples = slice.samples().unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].value, 3.0);
        assert_eq!(slice.time_stamp, block.time_stamp);
    }

    #[test]
    fn test_may_have_changed_since_upload() {
        let mut block = HistoryBlock::new(Uuid::nil(), Uuid::nil(), date!(2026 - 01 - 01), vec![]);
        assert!(!block.may_have_changed_since_upload());

        block.uploaded_at = Some(datetime!(2026-01-01 10:00 UTC));
        assert!(block.may_have_changed_since_upload());

        block.uploaded_at = Some(datetime!(2026-01-02 00:30 UTC));
        assert!(!block.may_have_changed_since_upload());
    }

    #[test]
    fn test_wire_round_trip_uses_api_field_names() {
        let json = r#"{
            "SensorID": "6f1c1c52-6a2e-4d59-9c1f-2b7d3c0e9a11",
            "LocationID": "0b7a36d0-3a7e-4c1b-8a57-2d3f1e4c5b6a",
            "TimeStamp": "2026-01-01T23:59:59Z",
            "UploadedAt": "2026-01-02T01:00:00Z",
            "Data": [
                {"TimeStamp": "2026-01-01T10:05:00Z", "Value": 2.0},
                {"TimeStamp": "2026-01-01T10:00:00Z", "Value": 1.0}
            ]
        }"#;

        let wire: HistoryBlockWire = serde_json::from_str(json).unwrap();
        let block = HistoryBlock::from(wire);
        let samples = block.samples().unwrap();
        assert_eq!(samples[0].value, 1.0);
        assert_eq!(samples[1].value, 2.0);
        assert_eq!(block.uploaded_at, Some(datetime!(2026-01-02 01:00 UTC)));
    }

    #[test]
    fn test_wire_without_uploaded_at() {
        let json = r#"{
            "SensorID": "6f1c1c52-6a2e-4d59-9c1f-2b7d3c0e9a11",
            "LocationID": "0b7a36d0-3a7e-4c1b-8a57-2d3f1e4c5b6a",
            "TimeStamp": "2026-01-01T23:59:59Z"
        }"#;

        let wire: HistoryBlockWire = serde_json::from_str(json).unwrap();
        assert!(wire.uploaded_at.is_none());
        assert!(wire.data.is_empty());
    }

    fn arb_samples() -> impl Strategy<Value = Vec<Sample>> {
        prop::collection::vec((0i64..86_400, -1000.0f64..1000.0), 0..40).prop_map(|v| {
            v.into_iter()
                .map(|(offset, value)| {
                    let ts = datetime!(2026-01-01 0:00 UTC) + Duration::seconds(offset);
                    Sample::new(ts, value)
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_merge_is_idempotent(local in arb_samples(), remote in arb_samples()) {
            let once = merge_samples(&local, &remote);
            let twice = merge_samples(&once, &remote);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_merge_is_sorted_and_unique(local in arb_samples(), remote in arb_samples()) {
            let merged = merge_samples(&local, &remote);
            prop_assert!(merged.windows(2).all(|w| w[0].time_stamp < w[1].time_stamp));
        }

        #[test]
        fn prop_encoding_is_stable(samples in arb_samples()) {
            let sorted = merge_samples(&[], &samples);
            let raw = encode_samples(&sorted);
            prop_assert_eq!(decode_samples(&raw).unwrap(), sorted);
        }
    }
}
