//! Script Store for Scriptbridge.
//!
//! Implements `ScriptStoreTrait`: persistence of script records backed by
//! SQLite via `rusqlite`. Each write touches exactly one row inside one
//! statement, so concurrent writers to different ids never interfere and
//! writers to the same id resolve as last-write-wins.

use rusqlite::{params, OptionalExtension};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;
use uuid::Uuid;

use crate::database::Database;
use crate::services::metadata_parser;
use crate::types::errors::StoreError;
use crate::types::script::{ScriptMetadata, ScriptRecord};

/// Trait defining script persistence operations.
pub trait ScriptStoreTrait: Send + Sync {
    /// All records, oldest first.
    fn list(&self) -> Result<Vec<ScriptRecord>, StoreError>;
    fn get(&self, id: &str) -> Result<ScriptRecord, StoreError>;
    /// Inserts or replaces a record. Assigns `id` and `added_at` when absent.
    fn upsert(&self, record: ScriptRecord) -> Result<ScriptRecord, StoreError>;
    fn remove(&self, id: &str) -> Result<(), StoreError>;
    /// Parses `content` and stores it as a new enabled record.
    fn add_script(&self, content: &str) -> Result<ScriptRecord, StoreError>;
    /// Replaces content and re-derives metadata; id, `added_at` and `enabled` are kept.
    fn update_content(&self, id: &str, content: &str) -> Result<ScriptRecord, StoreError>;
    fn set_enabled(&self, id: &str, enabled: bool) -> Result<(), StoreError>;
    /// Flips `enabled` and returns the new value.
    fn toggle(&self, id: &str) -> Result<bool, StoreError>;
}

/// Script store backed by the shared database.
pub struct ScriptStore {
    db: Arc<Database>,
}

impl ScriptStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Returns the current UNIX timestamp in seconds.
    fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<(ScriptRecord, String)> {
        let metadata_json: String = row.get(2)?;
        let enabled: i32 = row.get(3)?;
        Ok((
            ScriptRecord {
                id: row.get(0)?,
                content: row.get(1)?,
                metadata: ScriptMetadata::default(),
                enabled: enabled != 0,
                added_at: row.get(4)?,
            },
            metadata_json,
        ))
    }

    fn decode((mut record, metadata_json): (ScriptRecord, String)) -> Result<ScriptRecord, StoreError> {
        record.metadata = serde_json::from_str(&metadata_json)
            .map_err(|e| StoreError::SerializationError(format!("{}: {}", record.id, e)))?;
        Ok(record)
    }
}

/// Parses a header, falling back to default metadata when it is unusable.
pub fn metadata_or_fallback(content: &str) -> ScriptMetadata {
    match metadata_parser::parse_detailed(content) {
        Ok(metadata) => metadata,
        Err(e) => {
            warn!("script header unusable, storing with default metadata: {e}");
            ScriptMetadata::fallback()
        }
    }
}

impl ScriptStoreTrait for ScriptStore {
    fn list(&self) -> Result<Vec<ScriptRecord>, StoreError> {
        let conn = self.db.connection();
        let mut stmt = conn
            .prepare(
                "SELECT id, content, metadata, enabled, added_at FROM scripts ORDER BY added_at, rowid",
            )
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;
        let rows = stmt
            .query_map([], Self::row_to_record)
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;

        let mut records = Vec::new();
        for row in rows {
            let row = row.map_err(|e| StoreError::DatabaseError(e.to_string()))?;
            records.push(Self::decode(row)?);
        }
        Ok(records)
    }

    fn get(&self, id: &str) -> Result<ScriptRecord, StoreError> {
        let row = self
            .db
            .connection()
            .query_row(
                "SELECT id, content, metadata, enabled, added_at FROM scripts WHERE id = ?1",
                params![id],
                Self::row_to_record,
            )
            .optional()
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Self::decode(row)
    }

    fn upsert(&self, mut record: ScriptRecord) -> Result<ScriptRecord, StoreError> {
        let now = Self::now();
        if record.id.is_empty() {
            record.id = Uuid::new_v4().to_string();
        }
        if record.added_at == 0 {
            record.added_at = now;
        }
        let metadata_json = serde_json::to_string(&record.metadata)
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;

        // An existing row keeps its original added_at.
        record.added_at = self
            .db
            .connection()
            .query_row(
                "INSERT INTO scripts (id, content, metadata, enabled, added_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                     content = excluded.content,
                     metadata = excluded.metadata,
                     enabled = excluded.enabled,
                     updated_at = excluded.updated_at
                 RETURNING added_at",
                params![
                    record.id,
                    record.content,
                    metadata_json,
                    record.enabled as i32,
                    record.added_at,
                    now
                ],
                |row| row.get(0),
            )
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;

        Ok(record)
    }

    fn remove(&self, id: &str) -> Result<(), StoreError> {
        let affected = self
            .db
            .connection()
            .execute("DELETE FROM scripts WHERE id = ?1", params![id])
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;
        if affected == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn add_script(&self, content: &str) -> Result<ScriptRecord, StoreError> {
        let record = ScriptRecord::new(content, metadata_or_fallback(content));
        self.upsert(record)
    }

    fn update_content(&self, id: &str, content: &str) -> Result<ScriptRecord, StoreError> {
        let metadata_json = serde_json::to_string(&metadata_or_fallback(content))
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;

        // A plain UPDATE never resurrects a row removed in the meantime.
        let row = self
            .db
            .connection()
            .query_row(
                "UPDATE scripts SET content = ?1, metadata = ?2, updated_at = ?3 WHERE id = ?4
                 RETURNING id, content, metadata, enabled, added_at",
                params![content, metadata_json, Self::now(), id],
                Self::row_to_record,
            )
            .optional()
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Self::decode(row)
    }

    fn set_enabled(&self, id: &str, enabled: bool) -> Result<(), StoreError> {
        let affected = self
            .db
            .connection()
            .execute(
                "UPDATE scripts SET enabled = ?1, updated_at = ?2 WHERE id = ?3",
                params![enabled as i32, Self::now(), id],
            )
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;
        if affected == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn toggle(&self, id: &str) -> Result<bool, StoreError> {
        // One statement, no read-modify-write.
        let enabled: Option<i32> = self
            .db
            .connection()
            .query_row(
                "UPDATE scripts SET enabled = 1 - enabled, updated_at = ?1 WHERE id = ?2 RETURNING enabled",
                params![Self::now(), id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;
        enabled
            .map(|e| e != 0)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}
