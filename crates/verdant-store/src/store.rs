//! Main store implementation.

use std::collections::BTreeMap;
use std::path::Path;

use bytes::Bytes;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};
use time::format_description::well_known::Rfc3339;
use time::{Date, OffsetDateTime};
use tracing::{debug, info};
use uuid::Uuid;

use verdant_types::{EntityKey, HistoryBlock, Payload, Sample, SyncEntity, day_of, merge_samples};

use crate::error::{Error, Result};
use crate::models::{ChangeSet, Credentials, HistoryStats, SyncSettings, unix_millis};
use crate::queries::HistoryQuery;
use crate::schema;

const KEY_CRED_USER_ID: &str = "CredUserId";
const KEY_CRED_TOKEN: &str = "CredToken";
const KEY_LAST_GET: &str = "LastSuccessfulGeneralDbGet";
const KEY_LAST_POST: &str = "LastSuccessfulGeneralDbPost";

/// SQLite-based store for greenhouse reference tables and sensor history.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        schema::initialize(&conn)?;

        Ok(Self { conn })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }
}

// Reference table operations
impl Store {
    /// Look up a row of `T` by its identity.
    pub fn get_entity<T: SyncEntity>(&self, key: &EntityKey) -> Result<Option<T>> {
        if key.strategy() != T::IDENTITY {
            return Err(Error::KeyStrategy {
                table: T::TABLE,
                expected: T::IDENTITY,
                found: key.strategy(),
            });
        }

        let body: Option<String> = self
            .conn
            .query_row(
                "SELECT body FROM entities WHERE table_name = ?1 AND key = ?2",
                rusqlite::params![T::TABLE, key.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        body.map(|b| serde_json::from_str(&b).map_err(Error::from))
            .transpose()
    }

    /// All rows of `T`, ordered by creation time.
    pub fn list_entities<T: SyncEntity>(&self) -> Result<Vec<T>> {
        self.select_entities::<T>(
            "SELECT body FROM entities WHERE table_name = ?1 ORDER BY created_at, key",
            None,
        )
    }

    /// Rows of `T` whose `UpdatedAt` is strictly after `since`.
    pub fn entities_updated_since<T: SyncEntity>(&self, since: OffsetDateTime) -> Result<Vec<T>> {
        self.select_entities::<T>(
            "SELECT body FROM entities
             WHERE table_name = ?1 AND updated_at IS NOT NULL AND updated_at > ?2
             ORDER BY updated_at, key",
            Some(unix_millis(since)),
        )
    }

    /// Rows of `T` whose `CreatedAt` is strictly after `since`.
    pub fn entities_created_since<T: SyncEntity>(&self, since: OffsetDateTime) -> Result<Vec<T>> {
        self.select_entities::<T>(
            "SELECT body FROM entities
             WHERE table_name = ?1 AND created_at > ?2
             ORDER BY created_at, key",
            Some(unix_millis(since)),
        )
    }

    fn select_entities<T: SyncEntity>(&self, sql: &str, since_ms: Option<i64>) -> Result<Vec<T>> {
        let mut stmt = self.conn.prepare(sql)?;
        let bodies = match since_ms {
            Some(ms) => stmt
                .query_map(rusqlite::params![T::TABLE, ms], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?,
            None => stmt
                .query_map([T::TABLE], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?,
        };

        bodies
            .iter()
            .map(|b| serde_json::from_str(b).map_err(Error::from))
            .collect()
    }

    /// Insert or replace a single row.
    ///
    /// Used for local edits. Sync phases go through [`Store::save`].
    pub fn upsert_entity<T: SyncEntity>(&mut self, entity: &T) -> Result<()> {
        let mut changes = ChangeSet::new();
        changes.stage(entity)?;
        self.save(&changes)?;
        Ok(())
    }

    /// Write every staged row in a single transaction.
    ///
    /// Returns the number of rows written.
    pub fn save(&mut self, changes: &ChangeSet) -> Result<usize> {
        if changes.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO entities (table_name, key, created_at, updated_at, body)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(table_name, key) DO UPDATE SET
                    created_at = excluded.created_at,
                    updated_at = excluded.updated_at,
                    body = excluded.body",
            )?;
            for staged in changes.entities() {
                stmt.execute(rusqlite::params![
                    staged.table,
                    staged.key,
                    staged.created_at,
                    staged.updated_at,
                    staged.body,
                ])?;
            }
        }
        tx.commit()?;

        debug!("Saved {} reference rows", changes.len());
        Ok(changes.len())
    }

    /// Number of rows stored for a table.
    pub fn count_entities(&self, table: &str) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM entities WHERE table_name = ?",
            [table],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

// History operations
impl Store {
    /// The block of `sensor_id` for `day`, if any.
    pub fn get_block(&self, sensor_id: Uuid, day: Date) -> Result<Option<HistoryBlock>> {
        let block = self
            .conn
            .query_row(
                "SELECT sensor_id, location_id, time_stamp, uploaded_at, raw_data
                 FROM history WHERE sensor_id = ?1 AND day = ?2",
                rusqlite::params![sensor_id.hyphenated().to_string(), day.to_julian_day()],
                block_from_row,
            )
            .optional()?;
        Ok(block)
    }

    /// Query history blocks with filters.
    ///
    /// Payloads are returned in their encoded form.
    pub fn query_blocks(&self, query: &HistoryQuery) -> Result<Vec<HistoryBlock>> {
        let sql = query.build_sql();
        let (_, params) = query.build_where();

        debug!("Executing query: {}", sql);

        let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let blocks = stmt
            .query_map(params_ref.as_slice(), block_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(blocks)
    }

    /// The newest uploaded block, by day, among `sensor_ids`.
    pub fn latest_uploaded_block(&self, sensor_ids: &[Uuid]) -> Result<Option<HistoryBlock>> {
        if sensor_ids.is_empty() {
            return Ok(None);
        }
        let query = HistoryQuery::new()
            .sensors(sensor_ids.iter().copied())
            .uploaded()
            .limit(1);
        Ok(self.query_blocks(&query)?.pop())
    }

    /// Insert or replace blocks in a single transaction.
    pub fn save_blocks(&mut self, blocks: &[HistoryBlock]) -> Result<usize> {
        if blocks.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO history (sensor_id, day, location_id, time_stamp, uploaded_at, raw_data)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(sensor_id, day) DO UPDATE SET
                    location_id = excluded.location_id,
                    time_stamp = excluded.time_stamp,
                    uploaded_at = excluded.uploaded_at,
                    raw_data = excluded.raw_data",
            )?;
            for block in blocks {
                let raw = block.raw_data();
                stmt.execute(rusqlite::params![
                    block.sensor_id.hyphenated().to_string(),
                    block.day().to_julian_day(),
                    block.location_id.hyphenated().to_string(),
                    block.time_stamp.unix_timestamp(),
                    block.uploaded_at.map(|t| t.unix_timestamp()),
                    raw.as_ref(),
                ])?;
            }
        }
        tx.commit()?;

        debug!("Saved {} history blocks", blocks.len());
        Ok(blocks.len())
    }

    /// Set `UploadedAt` on existing blocks, leaving their samples untouched.
    ///
    /// Each mark is `(sensor, day, uploaded_at)`. Returns the number of rows
    /// changed.
    pub fn mark_uploaded(&mut self, marks: &[(Uuid, Date, OffsetDateTime)]) -> Result<usize> {
        if marks.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.transaction()?;
        let mut changed = 0;
        {
            let mut stmt =
                tx.prepare("UPDATE history SET uploaded_at = ?3 WHERE sensor_id = ?1 AND day = ?2")?;
            for (sensor_id, day, uploaded_at) in marks {
                changed += stmt.execute(rusqlite::params![
                    sensor_id.hyphenated().to_string(),
                    day.to_julian_day(),
                    uploaded_at.unix_timestamp(),
                ])?;
            }
        }
        tx.commit()?;

        debug!("Marked {} history blocks as uploaded", changed);
        Ok(changed)
    }

    /// Append locally captured samples to their day blocks.
    ///
    /// Missing blocks are created as never uploaded. Existing blocks keep their
    /// `UploadedAt`, so extending an uploaded block makes it eligible for
    /// re-upload. Returns the number of blocks written.
    pub fn record_samples(
        &mut self,
        sensor_id: Uuid,
        location_id: Uuid,
        samples: &[Sample],
    ) -> Result<usize> {
        let mut by_day: BTreeMap<Date, Vec<Sample>> = BTreeMap::new();
        for sample in samples {
            by_day
                .entry(day_of(sample.time_stamp))
                .or_default()
                .push(*sample);
        }

        let mut blocks = Vec::with_capacity(by_day.len());
        for (day, fresh) in by_day {
            let block = match self.get_block(sensor_id, day)? {
                Some(mut existing) => {
                    let merged = merge_samples(&existing.samples()?, &fresh);
                    existing.location_id = location_id;
                    existing.payload = Payload::Decoded(merged);
                    existing
                }
                None => HistoryBlock::new(sensor_id, location_id, day, fresh),
            };
            blocks.push(block);
        }

        let written = self.save_blocks(&blocks)?;
        info!(
            "Recorded {} samples for sensor {} across {} blocks",
            samples.len(),
            sensor_id,
            written
        );
        Ok(written)
    }

    /// Count history blocks, optionally for a single sensor.
    pub fn count_history(&self, sensor_id: Option<Uuid>) -> Result<u64> {
        let count: i64 = match sensor_id {
            Some(id) => self.conn.query_row(
                "SELECT COUNT(*) FROM history WHERE sensor_id = ?",
                [id.hyphenated().to_string()],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM history", [], |row| row.get(0))?,
        };

        Ok(count as u64)
    }

    /// Summary counts over the whole history table.
    pub fn history_stats(&self) -> Result<HistoryStats> {
        let stats = self.conn.query_row(
            "SELECT COUNT(*),
                    COUNT(DISTINCT sensor_id),
                    COALESCE(SUM(uploaded_at IS NULL), 0),
                    COALESCE(SUM(uploaded_at IS NOT NULL AND time_stamp > uploaded_at), 0)
             FROM history",
            [],
            |row| {
                Ok(HistoryStats {
                    blocks: row.get::<_, i64>(0)? as u64,
                    sensors: row.get::<_, i64>(1)? as u64,
                    never_uploaded: row.get::<_, i64>(2)? as u64,
                    open_since_upload: row.get::<_, i64>(3)? as u64,
                })
            },
        )?;
        Ok(stats)
    }
}

// Sync settings operations
impl Store {
    /// Load the process-wide sync settings.
    pub fn sync_settings(&self) -> Result<SyncSettings> {
        let user_id = self.get_setting(KEY_CRED_USER_ID)?;
        let token = self.get_setting(KEY_CRED_TOKEN)?;
        let credentials = match (user_id, token) {
            (Some(user_id), Some(token)) => Some(Credentials { user_id, token }),
            _ => None,
        };

        Ok(SyncSettings {
            credentials,
            last_successful_general_db_get: self.get_instant(KEY_LAST_GET)?,
            last_successful_general_db_post: self.get_instant(KEY_LAST_POST)?,
        })
    }

    /// Persist API credentials.
    pub fn set_credentials(&self, credentials: &Credentials) -> Result<()> {
        self.set_setting(KEY_CRED_USER_ID, &credentials.user_id)?;
        self.set_setting(KEY_CRED_TOKEN, &credentials.token)?;
        info!("Stored credentials for user {}", credentials.user_id);
        Ok(())
    }

    /// Forget stored credentials.
    pub fn clear_credentials(&self) -> Result<()> {
        self.conn.execute(
            "DELETE FROM settings WHERE key IN (?1, ?2)",
            [KEY_CRED_USER_ID, KEY_CRED_TOKEN],
        )?;
        Ok(())
    }

    /// Advance the reference pull watermark.
    pub fn set_last_successful_get(&self, at: OffsetDateTime) -> Result<()> {
        self.set_instant(KEY_LAST_GET, at)
    }

    /// Advance the reference push watermark.
    pub fn set_last_successful_post(&self, at: OffsetDateTime) -> Result<()> {
        self.set_instant(KEY_LAST_POST, at)
    }

    fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM settings WHERE key = ?", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [key, value],
        )?;
        Ok(())
    }

    fn get_instant(&self, key: &str) -> Result<Option<OffsetDateTime>> {
        self.get_setting(key)?
            .map(|s| {
                OffsetDateTime::parse(&s, &Rfc3339)
                    .map_err(|e| Error::InvalidTimestamp(format!("{key}={s}: {e}")))
            })
            .transpose()
    }

    fn set_instant(&self, key: &str, at: OffsetDateTime) -> Result<()> {
        let value = at
            .format(&Rfc3339)
            .map_err(|e| Error::InvalidTimestamp(e.to_string()))?;
        self.set_setting(key, &value)
    }
}

fn block_from_row(row: &Row<'_>) -> rusqlite::Result<HistoryBlock> {
    let raw: Vec<u8> = row.get(4)?;
    Ok(HistoryBlock {
        sensor_id: uuid_column(row, 0)?,
        location_id: uuid_column(row, 1)?,
        time_stamp: instant_column(row, 2)?,
        uploaded_at: row
            .get::<_, Option<i64>>(3)?
            .map(|secs| instant_from_secs(3, secs))
            .transpose()?,
        payload: Payload::Encoded(Bytes::from(raw)),
    })
}

fn uuid_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let text: String = row.get(idx)?;
    Uuid::parse_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn instant_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<OffsetDateTime> {
    instant_from_secs(idx, row.get(idx)?)
}

fn instant_from_secs(idx: usize, secs: i64) -> rusqlite::Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(secs)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
}
