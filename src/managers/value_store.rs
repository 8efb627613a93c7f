//! Per-script value storage behind `GM_getValue` / `GM_setValue`.

use rusqlite::{params, OptionalExtension};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::database::Database;
use crate::types::errors::StoreError;

pub trait ValueStoreTrait: Send + Sync {
    fn get_value(&self, script_id: &str, key: &str) -> Result<Option<Value>, StoreError>;
    fn set_value(&self, script_id: &str, key: &str, value: &Value) -> Result<(), StoreError>;
    /// Returns whether a value was present.
    fn delete_value(&self, script_id: &str, key: &str) -> Result<bool, StoreError>;
    fn list_keys(&self, script_id: &str) -> Result<Vec<String>, StoreError>;
    /// Every value of a script, used to seed the payload snapshot.
    fn snapshot(&self, script_id: &str) -> Result<Map<String, Value>, StoreError>;
}

pub struct ValueStore {
    db: Arc<Database>,
}

impl ValueStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64
    }

    fn decode(key: &str, raw: &str) -> Result<Value, StoreError> {
        serde_json::from_str(raw).map_err(|e| StoreError::SerializationError(format!("{key}: {e}")))
    }
}

impl ValueStoreTrait for ValueStore {
    fn get_value(&self, script_id: &str, key: &str) -> Result<Option<Value>, StoreError> {
        let raw: Option<String> = self
            .db
            .connection()
            .query_row(
                "SELECT value FROM script_values WHERE script_id = ?1 AND key = ?2",
                params![script_id, key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;
        raw.map(|r| Self::decode(key, &r)).transpose()
    }

    fn set_value(&self, script_id: &str, key: &str, value: &Value) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value).map_err(|e| StoreError::SerializationError(e.to_string()))?;
        self.db
            .connection()
            .execute(
                "INSERT INTO script_values (script_id, key, value, updated_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(script_id, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![script_id, key, raw, Self::now()],
            )
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;
        Ok(())
    }

    fn delete_value(&self, script_id: &str, key: &str) -> Result<bool, StoreError> {
        let affected = self
            .db
            .connection()
            .execute(
                "DELETE FROM script_values WHERE script_id = ?1 AND key = ?2",
                params![script_id, key],
            )
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;
        Ok(affected > 0)
    }

    fn list_keys(&self, script_id: &str) -> Result<Vec<String>, StoreError> {
        let conn = self.db.connection();
        let mut stmt = conn
            .prepare("SELECT key FROM script_values WHERE script_id = ?1 ORDER BY key")
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;
        let keys = stmt
            .query_map(params![script_id], |row| row.get(0))
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?
            .collect::<Result<Vec<String>, _>>()
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;
        Ok(keys)
    }

    fn snapshot(&self, script_id: &str) -> Result<Map<String, Value>, StoreError> {
        let conn = self.db.connection();
        let mut stmt = conn
            .prepare("SELECT key, value FROM script_values WHERE script_id = ?1 ORDER BY key")
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;
        let rows = stmt
            .query_map(params![script_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;

        let mut values = Map::new();
        for row in rows {
            let (key, raw) = row.map_err(|e| StoreError::DatabaseError(e.to_string()))?;
            let value = Self::decode(&key, &raw)?;
            values.insert(key, value);
        }
        Ok(values)
    }
}
