//! End-to-end sync runs against a scripted health source and SQLite

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use garmin_sync::error::{Result, SyncError};
use garmin_sync::metrics::{Category, MetricRecord, MetricType};
use garmin_sync::models::{
    ActivitySummary, DailySummary, HeartRateDay, Payload, SleepData, StressDay,
};
use garmin_sync::storage::{MetricStore, SqliteStore, StoreOutcome, SyncOutcome, SyncStatus};
use garmin_sync::sync::{HealthSource, SyncOrchestrator};
use serde_json::{json, Value};

const USER: &str = "user-1";

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

/// Health source serving canned responses per day
#[derive(Default)]
struct ScriptedSource {
    login_error: Option<String>,
    summaries: HashMap<NaiveDate, Value>,
    stress: HashMap<NaiveDate, Value>,
    activities: HashMap<NaiveDate, Vec<Value>>,
    failures: HashSet<(NaiveDate, Category)>,
    calls: Vec<(NaiveDate, Category)>,
}

impl ScriptedSource {
    fn with_summary(mut self, day: &str, body: Value) -> Self {
        self.summaries.insert(date(day), body);
        self
    }

    fn with_stress(mut self, day: &str, body: Value) -> Self {
        self.stress.insert(date(day), body);
        self
    }

    fn with_activities(mut self, day: &str, items: Vec<Value>) -> Self {
        self.activities.insert(date(day), items);
        self
    }

    fn failing(mut self, day: &str, category: Category) -> Self {
        self.failures.insert((date(day), category));
        self
    }

    fn failing_day(mut self, day: &str) -> Self {
        for category in Category::ALL {
            self.failures.insert((date(day), category));
        }
        self
    }

    fn login_fails(mut self, message: &str) -> Self {
        self.login_error = Some(message.to_string());
        self
    }

    fn respond<T>(&mut self, day: NaiveDate, category: Category, body: Option<&Value>) -> Result<Payload<T>>
    where
        T: serde::de::DeserializeOwned + Default,
    {
        self.calls.push((day, category));
        if self.failures.contains(&(day, category)) {
            return Err(SyncError::Api {
                status: 500,
                message: format!("{} unavailable", category),
            });
        }
        Payload::from_value(body.cloned().unwrap_or(Value::Null))
    }
}

#[async_trait]
impl HealthSource for ScriptedSource {
    async fn login(&mut self) -> Result<()> {
        match &self.login_error {
            Some(message) => Err(SyncError::auth(message.clone())),
            None => Ok(()),
        }
    }

    async fn daily_summary(&mut self, day: NaiveDate) -> Result<Payload<DailySummary>> {
        let body = self.summaries.get(&day).cloned();
        self.respond(day, Category::Summary, body.as_ref())
    }

    async fn heart_rate(&mut self, day: NaiveDate) -> Result<Payload<HeartRateDay>> {
        self.respond(day, Category::HeartRate, None)
    }

    async fn sleep(&mut self, day: NaiveDate) -> Result<Payload<SleepData>> {
        self.respond(day, Category::Sleep, None)
    }

    async fn activities(&mut self, day: NaiveDate) -> Result<Vec<Payload<ActivitySummary>>> {
        self.calls.push((day, Category::Activities));
        if self.failures.contains(&(day, Category::Activities)) {
            return Err(SyncError::RateLimited);
        }
        self.activities
            .get(&day)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(Payload::from_value)
            .collect()
    }

    async fn stress(&mut self, day: NaiveDate) -> Result<Payload<StressDay>> {
        let body = self.stress.get(&day).cloned();
        self.respond(day, Category::Stress, body.as_ref())
    }
}

fn store() -> SqliteStore {
    let store = SqliteStore::open_in_memory().unwrap();
    store.ensure_connection(USER, "runner@example.com").unwrap();
    store
}

fn value_of(store: &SqliteStore, metric: MetricType, day: &str) -> Option<String> {
    store
        .get_metric(USER, metric, date(day))
        .unwrap()
        .map(|m| m.value)
}

mod orchestration_tests {
    use super::*;

    #[tokio::test]
    async fn test_summary_for_past_day_writes_two_rows() {
        let store = store();
        let source = ScriptedSource::default()
            .with_summary("2024-01-01", json!({"totalSteps": 8123, "totalKilocalories": 2100}));

        let mut sync = SyncOrchestrator::new(source, &store);
        let stats = sync.sync_range(USER, 2, date("2024-01-02")).await;

        assert_eq!(stats.inserted, 2);
        assert_eq!(store.count_metrics(USER).unwrap(), 2);

        let rows = store.metrics_for_date(USER, date("2024-01-01")).unwrap();
        let rows: Vec<(&str, &str, Option<&str>)> = rows
            .iter()
            .map(|m| (m.metric_type.as_str(), m.value.as_str(), m.unit.as_deref()))
            .collect();
        assert_eq!(
            rows,
            vec![("calories", "2100", Some("kcal")), ("steps", "8123", Some("steps"))]
        );
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let store = store();
        let summary = json!({"totalSteps": 8123, "totalKilocalories": 2100});

        for _ in 0..2 {
            let source = ScriptedSource::default().with_summary("2024-01-01", summary.clone());
            let mut sync = SyncOrchestrator::new(source, &store);
            sync.sync_range(USER, 2, date("2024-01-02")).await;
        }

        let source = ScriptedSource::default().with_summary("2024-01-01", summary);
        let mut sync = SyncOrchestrator::new(source, &store);
        let stats = sync.sync_range(USER, 2, date("2024-01-02")).await;

        assert_eq!(stats.skipped, 2);
        assert_eq!(stats.inserted, 0);
        assert!(!stats.has_failures());
        assert_eq!(store.count_metrics(USER).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_failed_day_does_not_block_other_days() {
        let store = store();
        let source = ScriptedSource::default()
            .with_summary("2024-01-03", json!({"totalSteps": 300}))
            .with_summary("2024-01-01", json!({"totalSteps": 100}))
            .failing_day("2024-01-02");

        let mut sync = SyncOrchestrator::new(source, &store);
        let stats = sync.sync_range(USER, 3, date("2024-01-03")).await;

        assert_eq!(stats.dates, 3);
        assert_eq!(stats.failed_categories, 5);
        assert_eq!(value_of(&store, MetricType::Steps, "2024-01-03").as_deref(), Some("300"));
        assert_eq!(value_of(&store, MetricType::Steps, "2024-01-01").as_deref(), Some("100"));
        assert_eq!(store.metrics_for_date(USER, date("2024-01-02")).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_failed_category_does_not_block_the_rest_of_the_day() {
        let store = store();
        let source = ScriptedSource::default()
            .with_summary("2024-01-02", json!({"totalSteps": 200}))
            .with_stress("2024-01-02", json!({"avgStressLevel": 30, "maxStressLevel": 80}))
            .failing("2024-01-02", Category::Activities);

        let mut sync = SyncOrchestrator::new(source, &store);
        let stats = sync.sync_range(USER, 1, date("2024-01-02")).await;

        assert_eq!(stats.failed_categories, 1);
        assert_eq!(value_of(&store, MetricType::Steps, "2024-01-02").as_deref(), Some("200"));
        assert_eq!(value_of(&store, MetricType::StressMax, "2024-01-02").as_deref(), Some("80"));
    }

    #[tokio::test]
    async fn test_dates_descend_and_categories_keep_order() {
        let store = store();
        let mut sync = SyncOrchestrator::new(ScriptedSource::default(), &store);
        sync.sync_range(USER, 2, date("2024-01-02")).await;

        let expected: Vec<(NaiveDate, Category)> = [date("2024-01-02"), date("2024-01-01")]
            .into_iter()
            .flat_map(|day| Category::ALL.into_iter().map(move |c| (day, c)))
            .collect();
        assert_eq!(sync.source().calls, expected);
    }

    #[tokio::test]
    async fn test_zero_days_back_syncs_today() {
        let store = store();
        let mut sync = SyncOrchestrator::new(ScriptedSource::default(), &store);
        let stats = sync.sync_range(USER, 0, date("2024-01-02")).await;

        assert_eq!(stats.dates, 1);
        assert_eq!(sync.source().calls.len(), Category::ALL.len());
    }

    #[tokio::test]
    async fn test_past_days_are_never_rewritten() {
        let store = store();

        let first = ScriptedSource::default()
            .with_summary("2024-01-01", json!({"totalSteps": 1000}))
            .with_summary("2024-01-02", json!({"totalSteps": 1500}));
        SyncOrchestrator::new(first, &store)
            .sync_range(USER, 2, date("2024-01-02"))
            .await;

        let second = ScriptedSource::default()
            .with_summary("2024-01-01", json!({"totalSteps": 9999}))
            .with_summary("2024-01-02", json!({"totalSteps": 9999}))
            .with_summary("2024-01-03", json!({"totalSteps": 50}));
        let stats = SyncOrchestrator::new(second, &store)
            .sync_range(USER, 3, date("2024-01-03"))
            .await;

        assert_eq!(stats.skipped, 2);
        assert_eq!(value_of(&store, MetricType::Steps, "2024-01-01").as_deref(), Some("1000"));
        assert_eq!(value_of(&store, MetricType::Steps, "2024-01-02").as_deref(), Some("1500"));
        assert_eq!(value_of(&store, MetricType::Steps, "2024-01-03").as_deref(), Some("50"));
    }

    #[tokio::test]
    async fn test_today_is_refreshed() {
        let store = store();

        let morning = ScriptedSource::default().with_summary("2024-01-02", json!({"totalSteps": 1200}));
        SyncOrchestrator::new(morning, &store)
            .sync_range(USER, 1, date("2024-01-02"))
            .await;

        let evening = ScriptedSource::default().with_summary("2024-01-02", json!({"totalSteps": 9400}));
        let stats = SyncOrchestrator::new(evening, &store)
            .sync_range(USER, 1, date("2024-01-02"))
            .await;

        assert_eq!(stats.replaced, 1);
        assert_eq!(value_of(&store, MetricType::Steps, "2024-01-02").as_deref(), Some("9400"));
        assert_eq!(store.count_metrics(USER).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_activities_collapse_to_one_row_per_day() {
        let store = store();
        let run = json!({"activityId": 1, "activityName": "Run"});
        let walk = json!({"activityId": 2, "activityName": "Walk"});
        let source = ScriptedSource::default()
            .with_activities("2024-01-02", vec![run.clone(), walk.clone()])
            .with_activities("2024-01-01", vec![run, walk]);

        SyncOrchestrator::new(source, &store)
            .sync_range(USER, 2, date("2024-01-02"))
            .await;

        let today: Value =
            serde_json::from_str(&value_of(&store, MetricType::Activity, "2024-01-02").unwrap()).unwrap();
        let past: Value =
            serde_json::from_str(&value_of(&store, MetricType::Activity, "2024-01-01").unwrap()).unwrap();

        // Forced days keep the last activity, others the first
        assert_eq!(today["activityName"], "Walk");
        assert_eq!(past["activityName"], "Run");
    }
}

mod run_tests {
    use super::*;

    #[tokio::test]
    async fn test_login_failure_is_fatal() {
        let store = store();
        let source = ScriptedSource::default()
            .with_summary("2024-01-01", json!({"totalSteps": 8123}))
            .login_fails("invalid credentials");

        let mut sync = SyncOrchestrator::new(source, &store);
        let err = sync.run(USER, 7, date("2024-01-01")).await.unwrap_err();

        assert!(matches!(err, SyncError::Authentication(_)));
        assert!(sync.source().calls.is_empty());
        assert_eq!(store.count_metrics(USER).unwrap(), 0);

        let status = store.sync_status(USER).unwrap().unwrap();
        assert_eq!(status.status, SyncOutcome::Error);
        assert!(status.error.unwrap().contains("invalid credentials"));
    }

    #[tokio::test]
    async fn test_success_status_despite_category_errors() {
        let store = store();
        let source = ScriptedSource::default()
            .with_summary("2024-01-02", json!({"totalSteps": 10}))
            .failing_day("2024-01-01");

        let mut sync = SyncOrchestrator::new(source, &store);
        let stats = sync.run(USER, 2, date("2024-01-02")).await.unwrap();

        assert_eq!(stats.failed_categories, 5);
        let status = store.sync_status(USER).unwrap().unwrap();
        assert_eq!(status.status, SyncOutcome::Success);
        assert!(status.error.is_none());
    }

    #[tokio::test]
    async fn test_missing_connection_row_does_not_fail_run() {
        let store = SqliteStore::open_in_memory().unwrap();
        let source = ScriptedSource::default().with_summary("2024-01-01", json!({"totalSteps": 1}));

        let mut sync = SyncOrchestrator::new(source, &store);
        let stats = sync.run(USER, 1, date("2024-01-01")).await.unwrap();

        assert_eq!(stats.inserted, 1);
        assert!(store.sync_status(USER).unwrap().is_none());
    }
}

mod store_failure_tests {
    use super::*;

    /// Rejects one metric type, delegating everything else
    struct RejectingStore<'a> {
        inner: &'a SqliteStore,
        rejected: MetricType,
    }

    impl MetricStore for RejectingStore<'_> {
        fn store(
            &self,
            user_id: &str,
            record: &MetricRecord,
            recorded_at: DateTime<Utc>,
            force: bool,
        ) -> Result<StoreOutcome> {
            if record.metric_type == self.rejected {
                return Err(SyncError::Database("disk full".to_string()));
            }
            self.inner.store(user_id, record, recorded_at, force)
        }

        fn record_sync_status(&self, user_id: &str, status: &SyncStatus) -> Result<()> {
            self.inner.record_sync_status(user_id, status)
        }
    }

    #[tokio::test]
    async fn test_store_failure_skips_only_that_metric() {
        let sqlite = store();
        let rejecting = RejectingStore {
            inner: &sqlite,
            rejected: MetricType::Calories,
        };
        let source = ScriptedSource::default()
            .with_summary("2024-01-01", json!({"totalSteps": 8123, "totalKilocalories": 2100}));

        let mut sync = SyncOrchestrator::new(source, rejecting);
        let stats = sync.run(USER, 1, date("2024-01-01")).await.unwrap();

        assert_eq!(stats.failed_stores, 1);
        assert_eq!(stats.inserted, 1);
        assert_eq!(value_of(&sqlite, MetricType::Steps, "2024-01-01").as_deref(), Some("8123"));
        assert!(value_of(&sqlite, MetricType::Calories, "2024-01-01").is_none());
    }
}
