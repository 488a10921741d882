use crate::errors::{AppError, AppResult};
use crate::models::AppSettings;
use crate::store::{CollectionBackend, Namespace, StoredCollection, COLLECTION_SCHEMA_VERSION};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const SCHEMA_SQL: &str = include_str!("schema.sql");
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl Database {
    pub fn new(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| AppError::Storage(err.to_string()))?;
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;

        let db = Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        };

        db.ensure_default_settings()?;

        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    pub fn get_settings(&self) -> AppResult<AppSettings> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                "SELECT value_json FROM settings WHERE key = 'app'",
                [],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        match raw {
            Some(raw) => serde_json::from_str::<AppSettings>(&raw)
                .map_err(|error| AppError::Config(format!("stored settings are unreadable: {}", error))),
            None => Ok(AppSettings::default()),
        }
    }

    pub fn update_settings(&self, update: serde_json::Value) -> AppResult<AppSettings> {
        let current = self.get_settings()?;
        let mut merged = serde_json::to_value(current)?;
        merge_json(&mut merged, update);
        let settings: AppSettings =
            serde_json::from_value(merged).map_err(|error| AppError::Config(error.to_string()))?;

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO settings (key, value_json, updated_at)
             VALUES ('app', ?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json, updated_at = excluded.updated_at",
            params![serde_json::to_string(&settings)?, Utc::now().to_rfc3339()],
        )?;

        Ok(settings)
    }

    fn ensure_default_settings(&self) -> AppResult<()> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(1) FROM settings WHERE key = 'app'", [], |row| row.get(0))?;
        if count == 0 {
            conn.execute(
                "INSERT INTO settings (key, value_json, updated_at) VALUES ('app', ?1, ?2)",
                params![
                    serde_json::to_string(&AppSettings::default())?,
                    Utc::now().to_rfc3339()
                ],
            )?;
        }
        Ok(())
    }

    fn conn(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))
    }
}

impl CollectionBackend for Database {
    fn read_collection(&self, namespace: Namespace) -> AppResult<Option<StoredCollection>> {
        let conn = self.conn()?;
        let stored = conn
            .query_row(
                "SELECT records_json, revision, schema_version FROM ledger_collections WHERE namespace = ?1",
                [namespace.as_str()],
                parse_collection_row,
            )
            .optional()?;
        Ok(stored)
    }

    fn seed_collection(&self, namespace: Namespace, records_json: &str) -> AppResult<StoredCollection> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO ledger_collections (namespace, schema_version, revision, records_json, updated_at)
             VALUES (?1, ?2, 1, ?3, ?4)
             ON CONFLICT(namespace) DO NOTHING",
            params![
                namespace.as_str(),
                COLLECTION_SCHEMA_VERSION,
                records_json,
                Utc::now().to_rfc3339()
            ],
        )?;

        let stored = conn.query_row(
            "SELECT records_json, revision, schema_version FROM ledger_collections WHERE namespace = ?1",
            [namespace.as_str()],
            parse_collection_row,
        )?;
        Ok(stored)
    }

    fn write_collection(
        &self,
        namespace: Namespace,
        records_json: &str,
        expected_revision: Option<i64>,
    ) -> AppResult<i64> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current_revision: i64 = tx
            .query_row(
                "SELECT revision FROM ledger_collections WHERE namespace = ?1",
                [namespace.as_str()],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0);

        if let Some(expected) = expected_revision {
            if expected != current_revision {
                return Err(AppError::Conflict(format!(
                    "{} changed since it was read (expected revision {}, found {})",
                    namespace, expected, current_revision
                )));
            }
        }

        let next_revision = current_revision + 1;
        tx.execute(
            "INSERT INTO ledger_collections (namespace, schema_version, revision, records_json, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(namespace) DO UPDATE SET
               schema_version = excluded.schema_version,
               revision = excluded.revision,
               records_json = excluded.records_json,
               updated_at = excluded.updated_at",
            params![
                namespace.as_str(),
                COLLECTION_SCHEMA_VERSION,
                next_revision,
                records_json,
                Utc::now().to_rfc3339()
            ],
        )?;
        tx.commit()?;

        Ok(next_revision)
    }
}

fn parse_collection_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredCollection> {
    Ok(StoredCollection {
        records_json: row.get(0)?,
        revision: row.get(1)?,
        schema_version: row.get(2)?,
    })
}

fn merge_json(target: &mut serde_json::Value, update: serde_json::Value) {
    match (target, update) {
        (serde_json::Value::Object(target_map), serde_json::Value::Object(update_map)) => {
            for (key, value) in update_map {
                merge_json(target_map.entry(key).or_insert(serde_json::Value::Null), value);
            }
        }
        (target, update) => {
            *target = update;
        }
    }
}
