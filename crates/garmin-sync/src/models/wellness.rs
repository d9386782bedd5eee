//! Daily wellness responses: summary, heart rate, sleep, stress

use serde::Deserialize;
use serde_json::Number;

/// `/usersummary-service/usersummary/daily/{displayName}`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySummary {
    #[serde(default)]
    pub total_steps: Option<Number>,
    #[serde(default)]
    pub total_kilocalories: Option<Number>,
    #[serde(default)]
    pub active_kilocalories: Option<Number>,
    #[serde(default)]
    pub total_distance_meters: Option<Number>,
    #[serde(default)]
    pub moderate_intensity_minutes: Option<Number>,
    #[serde(default)]
    pub vigorous_intensity_minutes: Option<Number>,
}

/// `/wellness-service/wellness/dailyHeartRate/{displayName}`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartRateDay {
    /// `[[timestamp_ms, bpm|null], ...]`
    #[serde(default)]
    pub heart_rate_values: Option<Vec<Vec<Option<Number>>>>,
    #[serde(default)]
    pub resting_heart_rate: Option<Number>,
    #[serde(default)]
    pub max_heart_rate: Option<Number>,
    #[serde(default)]
    pub min_heart_rate: Option<Number>,
}

/// `/wellness-service/wellness/dailySleepData/{displayName}`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SleepData {
    #[serde(default, rename = "dailySleepDTO")]
    pub daily_sleep_dto: Option<DailySleep>,
}

/// Stage durations are reported in seconds
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySleep {
    #[serde(default)]
    pub sleep_time_seconds: Option<f64>,
    #[serde(default)]
    pub deep_sleep_seconds: Option<f64>,
    #[serde(default)]
    pub light_sleep_seconds: Option<f64>,
    #[serde(default)]
    pub rem_sleep_seconds: Option<f64>,
    #[serde(default)]
    pub awake_sleep_seconds: Option<f64>,
}

/// `/wellness-service/wellness/dailyStress/{date}`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StressDay {
    #[serde(default)]
    pub avg_stress_level: Option<Number>,
    #[serde(default)]
    pub max_stress_level: Option<Number>,
}
