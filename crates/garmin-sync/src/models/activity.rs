//! Activity list entries from `/activitylist-service/activities/search/activities`

use serde::Deserialize;

/// Activity summary as returned by the activity search endpoint
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySummary {
    /// Unique activity identifier. Manual entries have been seen without one.
    #[serde(default)]
    pub activity_id: Option<u64>,

    #[serde(default)]
    pub activity_name: Option<String>,

    /// Start time in GMT (`YYYY-MM-DD HH:MM:SS`)
    #[serde(default)]
    pub start_time_gmt: Option<String>,

    #[serde(default)]
    pub activity_type: Option<ActivityType>,

    /// Meters
    #[serde(default)]
    pub distance: Option<f64>,

    /// Seconds
    #[serde(default)]
    pub duration: Option<f64>,

    #[serde(default)]
    pub calories: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityType {
    /// e.g. "running", "cycling", "walking"
    pub type_key: String,
}

impl ActivitySummary {
    pub fn display_name(&self) -> &str {
        self.activity_name.as_deref().unwrap_or("Unknown")
    }

    pub fn type_key(&self) -> Option<&str> {
        self.activity_type.as_ref().map(|t| t.type_key.as_str())
    }

    /// Compact description stored alongside the full activity JSON
    pub fn digest(&self) -> serde_json::Value {
        serde_json::json!({
            "activityId": self.activity_id,
            "activityName": self.display_name(),
            "activityType": self.type_key(),
            "duration": self.duration,
            "distance": self.distance,
            "calories": self.calories,
        })
    }
}
