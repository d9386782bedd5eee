//! Flat metric records and the mapping from vendor payloads onto them

use std::fmt;
use std::str::FromStr;

use serde_json::Number;

use crate::error::{Result, SyncError};
use crate::models::{ActivitySummary, DailySummary, HeartRateDay, Payload, SleepData, StressDay};

/// Kind of measurement stored in `health_metric.metric_type`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricType {
    Steps,
    Calories,
    ActiveCalories,
    Distance,
    ActiveMinutes,
    VigorousMinutes,
    HeartRateDetailed,
    RestingHeartRate,
    MaxHeartRate,
    MinHeartRate,
    SleepDuration,
    DeepSleep,
    LightSleep,
    RemSleep,
    AwakeTime,
    Activity,
    StressAvg,
    StressMax,
}

impl MetricType {
    pub const ALL: [MetricType; 18] = [
        Self::Steps,
        Self::Calories,
        Self::ActiveCalories,
        Self::Distance,
        Self::ActiveMinutes,
        Self::VigorousMinutes,
        Self::HeartRateDetailed,
        Self::RestingHeartRate,
        Self::MaxHeartRate,
        Self::MinHeartRate,
        Self::SleepDuration,
        Self::DeepSleep,
        Self::LightSleep,
        Self::RemSleep,
        Self::AwakeTime,
        Self::Activity,
        Self::StressAvg,
        Self::StressMax,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Steps => "steps",
            Self::Calories => "calories",
            Self::ActiveCalories => "active_calories",
            Self::Distance => "distance",
            Self::ActiveMinutes => "active_minutes",
            Self::VigorousMinutes => "vigorous_minutes",
            Self::HeartRateDetailed => "heart_rate_detailed",
            Self::RestingHeartRate => "resting_heart_rate",
            Self::MaxHeartRate => "max_heart_rate",
            Self::MinHeartRate => "min_heart_rate",
            Self::SleepDuration => "sleep_duration",
            Self::DeepSleep => "deep_sleep",
            Self::LightSleep => "light_sleep",
            Self::RemSleep => "rem_sleep",
            Self::AwakeTime => "awake_time",
            Self::Activity => "activity",
            Self::StressAvg => "stress_avg",
            Self::StressMax => "stress_max",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Self::Steps => "steps",
            Self::Calories | Self::ActiveCalories => "kcal",
            Self::Distance => "meters",
            Self::ActiveMinutes
            | Self::VigorousMinutes
            | Self::SleepDuration
            | Self::DeepSleep
            | Self::LightSleep
            | Self::RemSleep
            | Self::AwakeTime => "minutes",
            Self::HeartRateDetailed
            | Self::RestingHeartRate
            | Self::MaxHeartRate
            | Self::MinHeartRate => "bpm",
            Self::Activity => "activity",
            Self::StressAvg | Self::StressMax => "level",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricType {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| SyncError::invalid_param(format!("Unknown metric type: {}", s)))
    }
}

/// Data domain fetched once per date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Summary,
    HeartRate,
    Sleep,
    Activities,
    Stress,
}

impl Category {
    /// Order in which categories are synced for each date
    pub const ALL: [Category; 5] = [
        Self::Summary,
        Self::HeartRate,
        Self::Sleep,
        Self::Activities,
        Self::Stress,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Summary => "daily summary",
            Self::HeartRate => "heart rate",
            Self::Sleep => "sleep",
            Self::Activities => "activities",
            Self::Stress => "stress",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One value ready to be written; the date comes from the sync loop
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    pub metric_type: MetricType,
    pub value: String,
    pub unit: Option<String>,
    pub metadata: Option<String>,
}

impl MetricRecord {
    pub fn new(metric_type: MetricType, value: impl Into<String>) -> Self {
        Self {
            metric_type,
            value: value.into(),
            unit: Some(metric_type.unit().to_string()),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }
}

fn number(metric_type: MetricType, value: &Option<Number>) -> Option<MetricRecord> {
    value
        .as_ref()
        .map(|n| MetricRecord::new(metric_type, n.to_string()))
}

fn seconds_as_minutes(metric_type: MetricType, seconds: Option<f64>) -> Option<MetricRecord> {
    seconds.map(|s| MetricRecord::new(metric_type, format_decimal(s / 60.0)))
}

/// Whole numbers render without a fraction (`135`), others keep it (`1.5`)
pub(crate) fn format_decimal(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Map a category payload onto metric records.
///
/// Absent fields produce no record.
pub trait IntoMetrics {
    fn into_metrics(&self) -> Result<Vec<MetricRecord>>;
}

impl IntoMetrics for Payload<DailySummary> {
    fn into_metrics(&self) -> Result<Vec<MetricRecord>> {
        let s = &self.data;
        Ok([
            number(MetricType::Steps, &s.total_steps),
            number(MetricType::Calories, &s.total_kilocalories),
            number(MetricType::ActiveCalories, &s.active_kilocalories),
            number(MetricType::Distance, &s.total_distance_meters),
            number(MetricType::ActiveMinutes, &s.moderate_intensity_minutes),
            number(MetricType::VigorousMinutes, &s.vigorous_intensity_minutes),
        ]
        .into_iter()
        .flatten()
        .collect())
    }
}

impl IntoMetrics for Payload<HeartRateDay> {
    fn into_metrics(&self) -> Result<Vec<MetricRecord>> {
        let hr = &self.data;
        let mut records = Vec::new();

        if let Some(samples) = &hr.heart_rate_values {
            records.push(
                MetricRecord::new(MetricType::HeartRateDetailed, serde_json::to_string(samples)?)
                    .with_metadata(serde_json::to_string(&self.raw)?),
            );
        }
        records.extend(
            [
                number(MetricType::RestingHeartRate, &hr.resting_heart_rate),
                number(MetricType::MaxHeartRate, &hr.max_heart_rate),
                number(MetricType::MinHeartRate, &hr.min_heart_rate),
            ]
            .into_iter()
            .flatten(),
        );
        Ok(records)
    }
}

impl IntoMetrics for Payload<SleepData> {
    fn into_metrics(&self) -> Result<Vec<MetricRecord>> {
        let Some(dto) = &self.data.daily_sleep_dto else {
            return Ok(Vec::new());
        };
        let mut records = Vec::new();

        if let Some(total) = seconds_as_minutes(MetricType::SleepDuration, dto.sleep_time_seconds) {
            let raw_dto = self.raw.get("dailySleepDTO").unwrap_or(&self.raw);
            records.push(total.with_metadata(serde_json::to_string(raw_dto)?));
        }
        records.extend(
            [
                seconds_as_minutes(MetricType::DeepSleep, dto.deep_sleep_seconds),
                seconds_as_minutes(MetricType::LightSleep, dto.light_sleep_seconds),
                seconds_as_minutes(MetricType::RemSleep, dto.rem_sleep_seconds),
                seconds_as_minutes(MetricType::AwakeTime, dto.awake_sleep_seconds),
            ]
            .into_iter()
            .flatten(),
        );
        Ok(records)
    }
}

impl IntoMetrics for Payload<StressDay> {
    fn into_metrics(&self) -> Result<Vec<MetricRecord>> {
        let stress = &self.data;
        let mut records = Vec::new();

        if let Some(avg) = number(MetricType::StressAvg, &stress.avg_stress_level) {
            records.push(avg.with_metadata(serde_json::to_string(&self.raw)?));
        }
        records.extend(number(MetricType::StressMax, &stress.max_stress_level));
        Ok(records)
    }
}

impl IntoMetrics for Payload<ActivitySummary> {
    fn into_metrics(&self) -> Result<Vec<MetricRecord>> {
        Ok(vec![MetricRecord::new(
            MetricType::Activity,
            serde_json::to_string(&self.raw)?,
        )
        .with_metadata(serde_json::to_string(&self.data.digest())?)])
    }
}
