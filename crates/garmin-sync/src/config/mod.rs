//! Run configuration for a sync

use std::path::PathBuf;

use chrono::NaiveDate;

use crate::error::{Result, SyncError};

/// Directory name under the platform data dir
pub const APP_DIR_NAME: &str = "garmin-sync";

/// Days synced when the caller does not say otherwise
pub const DEFAULT_DAYS_BACK: u32 = 7;

/// Everything one `garmin-sync` invocation needs
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub user_id: String,
    pub email: String,
    pub password: String,
    pub days_back: u32,
    pub database: PathBuf,
    pub domain: String,
    /// Reference date; only this day is force-refreshed
    pub today: NaiveDate,
    /// Ignore tokens cached by a previous run
    pub fresh_login: bool,
}

impl SyncConfig {
    /// Reject configurations that cannot possibly log in
    pub fn validate(&self) -> Result<()> {
        if self.user_id.trim().is_empty() {
            return Err(SyncError::config("user id must not be empty"));
        }
        if self.email.trim().is_empty() {
            return Err(SyncError::config("email must not be empty"));
        }
        if self.password.is_empty() {
            return Err(SyncError::config("password must not be empty"));
        }
        if self.domain.trim().is_empty() {
            return Err(SyncError::config("domain must not be empty"));
        }
        Ok(())
    }
}

/// Parse a `YYYY-MM-DD` date
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| SyncError::InvalidDateFormat(s.to_string()))
}
