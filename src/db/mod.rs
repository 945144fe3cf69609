// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/hubalarm

//! Database module for persistent alarm state and the incident audit trail

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::alarm::IncidentRecord;
use crate::config::DatabaseConfig;
use crate::error::Result;

/// Durable key/value store backing every persisted alarm field.
pub trait AttributeStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<Value>>;

    fn persist(&self, key: &str, value: Value) -> Result<()>;

    /// Record a closed incident.
    fn append_incident(&self, record: &IncidentRecord) -> Result<()>;
}

/// Load and decode a stored value.
pub fn load_value<T: DeserializeOwned>(store: &dyn AttributeStore, key: &str) -> Result<Option<T>> {
    match store.load(key)? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Encode and store a value.
pub fn persist_value<T: Serialize + ?Sized>(store: &dyn AttributeStore, key: &str, value: &T) -> Result<()> {
    store.persist(key, serde_json::to_value(value)?)
}

/// Database manager
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database
    pub fn open(config: &DatabaseConfig) -> anyhow::Result<Self> {
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&config.path)?;

        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        "#,
        )?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.create_tables()?;

        info!("Database opened at {:?}", config.path);
        Ok(db)
    }

    /// Private in-memory database, used by tests and diskless runs.
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let db = Self {
            conn: Arc::new(Mutex::new(Connection::open_in_memory()?)),
        };
        db.create_tables()?;
        Ok(db)
    }

    fn create_tables(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            -- Persisted alarm attributes
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT DEFAULT CURRENT_TIMESTAMP
            );

            -- Closed incidents
            CREATE TABLE IF NOT EXISTS incidents (
                id TEXT PRIMARY KEY,
                started TEXT NOT NULL,
                ended TEXT NOT NULL,
                data TEXT NOT NULL,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_incidents_ended ON incidents(ended);
        "#,
        )?;

        Ok(())
    }

    /// Store a setting
    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            "INSERT OR REPLACE INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![key, value, Utc::now().to_rfc3339()],
        )?;

        Ok(())
    }

    /// Get a setting
    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();

        let value = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        Ok(value)
    }

    /// Most recently closed incidents, newest first
    pub fn query_incidents(&self, limit: usize) -> Result<Vec<IncidentRecord>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare("SELECT data FROM incidents ORDER BY ended DESC LIMIT ?1")?;
        let rows = stmt.query_map(params![limit as i64], |row| row.get::<_, String>(0))?;

        let mut results = Vec::new();
        for row in rows {
            results.push(serde_json::from_str(&row?)?);
        }

        Ok(results)
    }

    /// Drop incidents older than the retention period
    pub fn cleanup(&self, retention_days: u32) -> Result<usize> {
        let conn = self.conn.lock();

        let cutoff = Utc::now() - chrono::Duration::days(i64::from(retention_days));
        let deleted = conn.execute(
            "DELETE FROM incidents WHERE ended < ?1",
            params![cutoff.to_rfc3339()],
        )?;

        info!("Cleaned up {} incidents older than {} days", deleted, retention_days);
        Ok(deleted)
    }

    /// Get database statistics
    pub fn get_stats(&self) -> Result<DatabaseStats> {
        let conn = self.conn.lock();

        let setting_count: i64 = conn.query_row("SELECT COUNT(*) FROM settings", [], |row| row.get(0))?;
        let incident_count: i64 = conn.query_row("SELECT COUNT(*) FROM incidents", [], |row| row.get(0))?;

        Ok(DatabaseStats {
            setting_count: setting_count as usize,
            incident_count: incident_count as usize,
        })
    }
}

impl AttributeStore for Database {
    fn load(&self, key: &str) -> Result<Option<Value>> {
        match self.get_setting(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn persist(&self, key: &str, value: Value) -> Result<()> {
        debug!("persist {} = {}", key, value);
        self.set_setting(key, &value.to_string())
    }

    fn append_incident(&self, record: &IncidentRecord) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            "INSERT OR REPLACE INTO incidents (id, started, ended, data) VALUES (?1, ?2, ?3, ?4)",
            params![
                record.id.to_string(),
                record.started.to_rfc3339(),
                record.ended.to_rfc3339(),
                serde_json::to_string(record)?
            ],
        )?;

        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseStats {
    pub setting_count: usize,
    pub incident_count: usize,
}

/// Attribute store held in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
    incidents: Mutex<Vec<IncidentRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.lock().get(key).cloned()
    }

    pub fn incidents(&self) -> Vec<IncidentRecord> {
        self.incidents.lock().clone()
    }
}

impl AttributeStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.get(key))
    }

    fn persist(&self, key: &str, value: Value) -> Result<()> {
        self.values.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn append_incident(&self, record: &IncidentRecord) -> Result<()> {
        self.incidents.lock().push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::AlarmKind;
    use serde_json::json;
    use uuid::Uuid;

    fn record(ended_mins_ago: i64) -> IncidentRecord {
        let ended = Utc::now() - chrono::Duration::minutes(ended_mins_ago);
        IncidentRecord {
            id: Uuid::new_v4(),
            started: ended - chrono::Duration::minutes(1),
            ended,
            alarms: vec![AlarmKind::Security],
            triggers: Vec::new(),
        }
    }

    #[test]
    fn test_settings_round_trip() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.load("hubalarm:state").unwrap(), None);

        db.persist("hubalarm:state", json!("ACTIVE")).unwrap();
        db.persist("hubalarm:state", json!("SUSPENDED")).unwrap();

        assert_eq!(load_value::<String>(&db, "hubalarm:state").unwrap(), Some("SUSPENDED".to_string()));
        assert_eq!(db.get_stats().unwrap().setting_count, 1);
    }

    #[test]
    fn test_incidents_newest_first() {
        let db = Database::open_in_memory().unwrap();
        let old = record(30);
        let new = record(5);
        db.append_incident(&old).unwrap();
        db.append_incident(&new).unwrap();

        let found = db.query_incidents(10).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, new.id);
        assert_eq!(found[1].alarms, vec![AlarmKind::Security]);

        assert_eq!(db.query_incidents(1).unwrap().len(), 1);
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        persist_value(&store, "k", &42u32).unwrap();
        assert_eq!(load_value::<u32>(&store, "k").unwrap(), Some(42));

        store.append_incident(&record(1)).unwrap();
        assert_eq!(store.incidents().len(), 1);
    }
}
