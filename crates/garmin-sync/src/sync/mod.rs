//! Sync orchestration
//!
//! Walks a window of calendar days from today backwards and, for each day,
//! pulls every [`Category`] from a [`HealthSource`] and writes the mapped
//! metrics through a [`MetricStore`].
//!
//! Only today is force-refreshed; earlier days keep whatever was stored first.
//! A failed category or metric is logged and counted, never fatal. Only a
//! failed login aborts the run.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use tracing::{error, info, warn};

use crate::error::Result;
use crate::metrics::{Category, IntoMetrics, MetricRecord};
use crate::models::{ActivitySummary, DailySummary, HeartRateDay, Payload, SleepData, StressDay};
use crate::storage::{MetricStore, StoreOutcome, SyncStatus};

/// Read-only vendor session, one fetch per category and day
#[async_trait]
pub trait HealthSource: Send {
    /// Establish the session. Failure aborts the sync run.
    async fn login(&mut self) -> Result<()>;

    async fn daily_summary(&mut self, date: NaiveDate) -> Result<Payload<DailySummary>>;

    async fn heart_rate(&mut self, date: NaiveDate) -> Result<Payload<HeartRateDay>>;

    async fn sleep(&mut self, date: NaiveDate) -> Result<Payload<SleepData>>;

    /// Activities that started on `date`
    async fn activities(&mut self, date: NaiveDate) -> Result<Vec<Payload<ActivitySummary>>>;

    async fn stress(&mut self, date: NaiveDate) -> Result<Payload<StressDay>>;
}

/// Counters for one sync run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncStats {
    /// Days walked
    pub dates: u32,
    pub inserted: u32,
    pub replaced: u32,
    /// Metrics left alone because the day already had a value
    pub skipped: u32,
    /// Metrics the store rejected
    pub failed_stores: u32,
    /// Category fetches or mappings that failed
    pub failed_categories: u32,
}

impl SyncStats {
    fn record(&mut self, outcome: StoreOutcome) {
        match outcome {
            StoreOutcome::Inserted => self.inserted += 1,
            StoreOutcome::Replaced => self.replaced += 1,
            StoreOutcome::Skipped => self.skipped += 1,
        }
    }

    /// Metrics written by the run
    pub fn stored(&self) -> u32 {
        self.inserted + self.replaced
    }

    pub fn has_failures(&self) -> bool {
        self.failed_stores > 0 || self.failed_categories > 0
    }
}

impl fmt::Display for SyncStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Days: {}, Inserted: {}, Replaced: {}, Skipped: {}",
            self.dates, self.inserted, self.replaced, self.skipped
        )?;
        if self.has_failures() {
            write!(
                f,
                ", Failed metrics: {}, Failed categories: {}",
                self.failed_stores, self.failed_categories
            )?;
        }
        Ok(())
    }
}

/// Days to sync, newest first: `today` back to `today - (days_back - 1)`.
///
/// A zero window still covers today.
pub fn date_range(today: NaiveDate, days_back: u32) -> Vec<NaiveDate> {
    (0..days_back.max(1))
        .map(|offset| today - Duration::days(i64::from(offset)))
        .collect()
}

/// Timestamp recorded for metrics of `date`
pub fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Drives one user's sync from a vendor session into a metric store
pub struct SyncOrchestrator<S, M> {
    source: S,
    store: M,
}

impl<S: HealthSource, M: MetricStore> SyncOrchestrator<S, M> {
    pub fn new(source: S, store: M) -> Self {
        Self { source, store }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn store(&self) -> &M {
        &self.store
    }

    pub fn into_parts(self) -> (S, M) {
        (self.source, self.store)
    }

    /// Log in, sync the window and record the outcome on the user's
    /// connection row.
    ///
    /// Returns the login error if the session could not be established; no
    /// day is touched in that case.
    pub async fn run(&mut self, user_id: &str, days_back: u32, today: NaiveDate) -> Result<SyncStats> {
        println!("Logging in to Garmin Connect...");
        if let Err(e) = self.source.login().await {
            error!(user_id, error = %e, "login failed");
            self.write_status(user_id, &SyncStatus::error(Utc::now(), e.to_string()));
            return Err(e);
        }

        let stats = self.sync_range(user_id, days_back, today).await;
        self.write_status(user_id, &SyncStatus::success(Utc::now()));

        println!("\nSync complete: {}", stats);
        Ok(stats)
    }

    /// Sync every category of every day in the window. Assumes a live
    /// session.
    pub async fn sync_range(&mut self, user_id: &str, days_back: u32, today: NaiveDate) -> SyncStats {
        let mut stats = SyncStats::default();
        let dates = date_range(today, days_back);
        let oldest = dates.last().copied().unwrap_or(today);
        info!(user_id, from = %oldest, to = %today, "starting sync");

        for date in dates {
            let force = date == today;
            println!("{}{}", date, if force { " (refresh)" } else { "" });

            for category in Category::ALL {
                match self.fetch_category(category, date).await {
                    Ok(records) => {
                        self.store_records(user_id, category, date, force, &records, &mut stats)
                    }
                    Err(e) => {
                        stats.failed_categories += 1;
                        warn!(%date, %category, error = %e, "category sync failed");
                        println!("  {:<13} failed: {}", category.label(), e);
                    }
                }
            }
            stats.dates += 1;
        }

        stats
    }

    async fn fetch_category(&mut self, category: Category, date: NaiveDate) -> Result<Vec<MetricRecord>> {
        match category {
            Category::Summary => mapped(category, self.source.daily_summary(date).await?),
            Category::HeartRate => mapped(category, self.source.heart_rate(date).await?),
            Category::Sleep => mapped(category, self.source.sleep(date).await?),
            Category::Stress => mapped(category, self.source.stress(date).await?),
            Category::Activities => {
                let mut records = Vec::new();
                for activity in self.source.activities(date).await? {
                    records.extend(activity.into_metrics()?);
                }
                Ok(records)
            }
        }
    }

    fn store_records(
        &self,
        user_id: &str,
        category: Category,
        date: NaiveDate,
        force: bool,
        records: &[MetricRecord],
        stats: &mut SyncStats,
    ) {
        let recorded_at = day_start(date);
        let mut stored = 0;
        let mut skipped = 0;

        for record in records {
            match self.store.store(user_id, record, recorded_at, force) {
                Ok(StoreOutcome::Skipped) => {
                    skipped += 1;
                    stats.record(StoreOutcome::Skipped);
                }
                Ok(outcome) => {
                    stored += 1;
                    stats.record(outcome);
                }
                Err(e) => {
                    stats.failed_stores += 1;
                    warn!(%date, metric = %record.metric_type, error = %e, "failed to store metric");
                }
            }
        }

        println!(
            "  {:<13} {} stored, {} unchanged",
            category.label(),
            stored,
            skipped
        );
    }

    fn write_status(&self, user_id: &str, status: &SyncStatus) {
        if let Err(e) = self.store.record_sync_status(user_id, status) {
            warn!(user_id, error = %e, "failed to record sync status");
        }
    }
}

/// Map a payload, flagging objects that yielded nothing we recognize
fn mapped<T>(category: Category, payload: Payload<T>) -> Result<Vec<MetricRecord>>
where
    Payload<T>: IntoMetrics,
{
    let records = payload.into_metrics()?;
    let has_content = payload.raw.as_object().is_some_and(|fields| !fields.is_empty());
    if records.is_empty() && has_content {
        warn!(%category, "response had none of the expected fields");
    }
    Ok(records)
}
