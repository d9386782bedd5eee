//! Persistence for synced metrics and per-user sync state
//!
//! ## Tables
//!
//! - `health_metric`: one row per `(user_id, metric_type, recorded_date)`,
//!   guarded by a unique index
//! - `garmin_connection`: one row per user holding cached vendor tokens and
//!   the outcome of the last sync
//!
//! ## Write contract
//!
//! [`MetricStore::store`] never updates in place. Without `force` an existing
//! row for the same day wins and the call is a no-op; with `force` the old row
//! is deleted and the new one inserted in a single transaction.

mod sqlite;

pub use sqlite::SqliteStore;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::{Result, SyncError};
use crate::metrics::MetricRecord;

/// Default database location: `<data_local_dir>/garmin-sync/health.db`
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(crate::config::APP_DIR_NAME)
        .join("health.db")
}

/// What a single [`MetricStore::store`] call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Inserted,
    /// A same-day row existed and was deleted first (force mode)
    Replaced,
    /// A same-day row existed and was left alone
    Skipped,
}

/// A stored `health_metric` row
#[derive(Debug, Clone, PartialEq)]
pub struct HealthMetric {
    pub id: i64,
    pub user_id: String,
    pub metric_type: String,
    pub value: String,
    pub unit: Option<String>,
    pub recorded_at: DateTime<Utc>,
    pub recorded_date: NaiveDate,
    pub metadata: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Success,
    Error,
}

impl SyncOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncOutcome {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "success" => Ok(Self::Success),
            "error" => Ok(Self::Error),
            other => Err(SyncError::invalid_param(format!("Unknown sync status: {}", other))),
        }
    }
}

/// Outcome of the most recent sync attempt for a user
#[derive(Debug, Clone, PartialEq)]
pub struct SyncStatus {
    pub last_sync_at: DateTime<Utc>,
    pub status: SyncOutcome,
    pub error: Option<String>,
}

impl SyncStatus {
    pub fn success(at: DateTime<Utc>) -> Self {
        Self {
            last_sync_at: at,
            status: SyncOutcome::Success,
            error: None,
        }
    }

    pub fn error(at: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self {
            last_sync_at: at,
            status: SyncOutcome::Error,
            error: Some(message.into()),
        }
    }
}

/// Write side used by the sync orchestrator
pub trait MetricStore {
    /// Persist one metric for the calendar date of `recorded_at`.
    ///
    /// On error nothing from this call is left behind.
    fn store(
        &self,
        user_id: &str,
        record: &MetricRecord,
        recorded_at: DateTime<Utc>,
        force: bool,
    ) -> Result<StoreOutcome>;

    /// Overwrite the user's last sync outcome
    fn record_sync_status(&self, user_id: &str, status: &SyncStatus) -> Result<()>;
}

impl<T: MetricStore + ?Sized> MetricStore for &T {
    fn store(
        &self,
        user_id: &str,
        record: &MetricRecord,
        recorded_at: DateTime<Utc>,
        force: bool,
    ) -> Result<StoreOutcome> {
        (**self).store(user_id, record, recorded_at, force)
    }

    fn record_sync_status(&self, user_id: &str, status: &SyncStatus) -> Result<()> {
        (**self).record_sync_status(user_id, status)
    }
}
