//! SQLite-backed metric store

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::client::{OAuth1Token, OAuth2Token, SessionTokens};
use crate::error::{Result, SyncError};
use crate::metrics::{MetricRecord, MetricType};

use super::{HealthMetric, MetricStore, StoreOutcome, SyncStatus};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Single-connection store; the mutex serializes every write
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| SyncError::database("Failed to open database", e))?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| SyncError::database("Failed to open in-memory database", e))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| SyncError::Database("Connection lock poisoned".to_string()))
    }

    fn migrate(&self) -> Result<()> {
        self.conn()?
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS health_metric (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id TEXT NOT NULL,
                    metric_type TEXT NOT NULL,
                    value TEXT NOT NULL,
                    unit TEXT,
                    recorded_at TEXT NOT NULL,
                    recorded_date TEXT NOT NULL,
                    metadata TEXT,
                    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
                );

                CREATE UNIQUE INDEX IF NOT EXISTS idx_health_metric_identity
                ON health_metric(user_id, metric_type, recorded_date);

                CREATE INDEX IF NOT EXISTS idx_health_metric_user_id
                ON health_metric(user_id);

                CREATE TABLE IF NOT EXISTS garmin_connection (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id TEXT NOT NULL UNIQUE,
                    garmin_email TEXT NOT NULL,
                    oauth1_token TEXT,
                    oauth2_token TEXT,
                    is_active INTEGER NOT NULL DEFAULT 1,
                    last_sync_at TEXT,
                    last_sync_status TEXT,
                    last_sync_error TEXT,
                    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
                    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
                );
                "#,
            )
            .map_err(|e| SyncError::database("Failed to run migrations", e))
    }

    // =========================================================================
    // Connection row
    // =========================================================================

    /// Create the user's connection row, or refresh its email if it exists
    pub fn ensure_connection(&self, user_id: &str, email: &str) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO garmin_connection (user_id, garmin_email) VALUES (?1, ?2)
                 ON CONFLICT (user_id) DO UPDATE SET
                     garmin_email = excluded.garmin_email,
                     is_active = 1,
                     updated_at = ?3",
                params![user_id, email, timestamp(Utc::now())],
            )
            .map_err(|e| SyncError::database("Failed to upsert connection", e))?;
        Ok(())
    }

    /// Cached vendor tokens, if both halves are present
    pub fn load_tokens(&self, user_id: &str) -> Result<Option<SessionTokens>> {
        let row: Option<(Option<String>, Option<String>)> = self
            .conn()?
            .query_row(
                "SELECT oauth1_token, oauth2_token FROM garmin_connection WHERE user_id = ?1",
                params![user_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| SyncError::database("Failed to load tokens", e))?;

        match row {
            Some((Some(oauth1), Some(oauth2))) => Ok(Some(SessionTokens {
                oauth1: serde_json::from_str::<OAuth1Token>(&oauth1)?,
                oauth2: serde_json::from_str::<OAuth2Token>(&oauth2)?,
            })),
            _ => Ok(None),
        }
    }

    pub fn save_tokens(&self, user_id: &str, tokens: &SessionTokens) -> Result<()> {
        let updated = self
            .conn()?
            .execute(
                "UPDATE garmin_connection
                 SET oauth1_token = ?1, oauth2_token = ?2, updated_at = ?3
                 WHERE user_id = ?4",
                params![
                    serde_json::to_string(&tokens.oauth1)?,
                    serde_json::to_string(&tokens.oauth2)?,
                    timestamp(Utc::now()),
                    user_id,
                ],
            )
            .map_err(|e| SyncError::database("Failed to save tokens", e))?;

        if updated == 0 {
            return Err(missing_connection(user_id));
        }
        Ok(())
    }

    pub fn sync_status(&self, user_id: &str) -> Result<Option<SyncStatus>> {
        let row: Option<(Option<String>, Option<String>, Option<String>)> = self
            .conn()?
            .query_row(
                "SELECT last_sync_at, last_sync_status, last_sync_error
                 FROM garmin_connection WHERE user_id = ?1",
                params![user_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(|e| SyncError::database("Failed to load sync status", e))?;

        match row {
            Some((Some(at), Some(status), error)) => Ok(Some(SyncStatus {
                last_sync_at: parse_timestamp(&at)?,
                status: status.parse()?,
                error,
            })),
            _ => Ok(None),
        }
    }

    // =========================================================================
    // Metric reads
    // =========================================================================

    pub fn count_metrics(&self, user_id: &str) -> Result<u32> {
        self.conn()?
            .query_row(
                "SELECT COUNT(*) FROM health_metric WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .map_err(|e| SyncError::database("Failed to count metrics", e))
    }

    pub fn get_metric(
        &self,
        user_id: &str,
        metric_type: MetricType,
        date: NaiveDate,
    ) -> Result<Option<HealthMetric>> {
        self.conn()?
            .query_row(
                "SELECT id, user_id, metric_type, value, unit, recorded_at, recorded_date, metadata
                 FROM health_metric
                 WHERE user_id = ?1 AND metric_type = ?2 AND recorded_date = ?3",
                params![user_id, metric_type.as_str(), date.format(DATE_FORMAT).to_string()],
                map_metric,
            )
            .optional()
            .map_err(|e| SyncError::database("Failed to get metric", e))
    }

    /// All metrics for one day, ordered by type
    pub fn metrics_for_date(&self, user_id: &str, date: NaiveDate) -> Result<Vec<HealthMetric>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, metric_type, value, unit, recorded_at, recorded_date, metadata
                 FROM health_metric
                 WHERE user_id = ?1 AND recorded_date = ?2
                 ORDER BY metric_type",
            )
            .map_err(|e| SyncError::database("Failed to prepare query", e))?;

        let rows = stmt
            .query_map(
                params![user_id, date.format(DATE_FORMAT).to_string()],
                map_metric,
            )
            .map_err(|e| SyncError::database("Failed to query metrics", e))?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| SyncError::database("Failed to read metric row", e))
    }
}

impl MetricStore for SqliteStore {
    fn store(
        &self,
        user_id: &str,
        record: &MetricRecord,
        recorded_at: DateTime<Utc>,
        force: bool,
    ) -> Result<StoreOutcome> {
        let date = recorded_at.date_naive().format(DATE_FORMAT).to_string();
        let metric_type = record.metric_type.as_str();
        let recorded = timestamp(recorded_at);
        let insert_params = params![
            user_id,
            metric_type,
            record.value,
            record.unit,
            recorded,
            date,
            record.metadata,
        ];

        let mut conn = self.conn()?;
        // Dropping the transaction without commit rolls it back
        let tx = conn
            .transaction()
            .map_err(|e| SyncError::database("Failed to begin transaction", e))?;

        let outcome = if force {
            let deleted = tx
                .execute(
                    "DELETE FROM health_metric
                     WHERE user_id = ?1 AND metric_type = ?2 AND recorded_date = ?3",
                    params![user_id, metric_type, date],
                )
                .map_err(|e| SyncError::database("Failed to delete metric", e))?;

            tx.execute(
                "INSERT INTO health_metric
                     (user_id, metric_type, value, unit, recorded_at, recorded_date, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                insert_params,
            )
            .map_err(|e| SyncError::database("Failed to insert metric", e))?;

            if deleted > 0 {
                StoreOutcome::Replaced
            } else {
                StoreOutcome::Inserted
            }
        } else {
            let inserted = tx
                .execute(
                    "INSERT INTO health_metric
                         (user_id, metric_type, value, unit, recorded_at, recorded_date, metadata)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT (user_id, metric_type, recorded_date) DO NOTHING",
                    insert_params,
                )
                .map_err(|e| SyncError::database("Failed to insert metric", e))?;

            if inserted == 0 {
                StoreOutcome::Skipped
            } else {
                StoreOutcome::Inserted
            }
        };

        tx.commit()
            .map_err(|e| SyncError::database("Failed to commit metric", e))?;
        Ok(outcome)
    }

    fn record_sync_status(&self, user_id: &str, status: &SyncStatus) -> Result<()> {
        let updated = self
            .conn()?
            .execute(
                "UPDATE garmin_connection
                 SET last_sync_at = ?1,
                     last_sync_status = ?2,
                     last_sync_error = ?3,
                     updated_at = ?4
                 WHERE user_id = ?5",
                params![
                    timestamp(status.last_sync_at),
                    status.status.as_str(),
                    status.error,
                    timestamp(Utc::now()),
                    user_id,
                ],
            )
            .map_err(|e| SyncError::database("Failed to update sync status", e))?;

        if updated == 0 {
            return Err(missing_connection(user_id));
        }
        Ok(())
    }
}

fn missing_connection(user_id: &str) -> SyncError {
    SyncError::NotFound(format!("garmin_connection row for user {}", user_id))
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SyncError::Database(format!("Bad timestamp {:?}: {}", s, e)))
}

fn map_metric(row: &Row<'_>) -> rusqlite::Result<HealthMetric> {
    let recorded_at: String = row.get(5)?;
    let recorded_date: String = row.get(6)?;

    Ok(HealthMetric {
        id: row.get(0)?,
        user_id: row.get(1)?,
        metric_type: row.get(2)?,
        value: row.get(3)?,
        unit: row.get(4)?,
        recorded_at: DateTime::parse_from_rfc3339(&recorded_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
            })?,
        recorded_date: NaiveDate::parse_from_str(&recorded_date, DATE_FORMAT).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
        })?,
        metadata: row.get(7)?,
    })
}
