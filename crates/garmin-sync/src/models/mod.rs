//! Typed Garmin Connect response schemas
//!
//! Only the fields the sync maps are modeled. Every response keeps its raw
//! JSON next to the typed view so it can be stored as audit metadata.

pub mod activity;
pub mod wellness;

pub use activity::{ActivitySummary, ActivityType};
pub use wellness::{DailySleep, DailySummary, HeartRateDay, SleepData, StressDay};

use serde::de::DeserializeOwned;

use crate::error::{Result, SyncError};

/// A typed vendor payload together with the JSON it was parsed from
#[derive(Debug, Clone)]
pub struct Payload<T> {
    pub data: T,
    pub raw: serde_json::Value,
}

impl<T: DeserializeOwned + Default> Payload<T> {
    /// Parse a raw response. `null` (Garmin's "no data for this day") yields
    /// the empty default; a field of the wrong type is an error.
    pub fn from_value(raw: serde_json::Value) -> Result<Self> {
        let data = if raw.is_null() {
            T::default()
        } else {
            serde_json::from_value(raw.clone()).map_err(|e| {
                SyncError::invalid_response(format!(
                    "{} did not match the expected schema: {}",
                    short_type_name::<T>(),
                    e
                ))
            })?
        };
        Ok(Self { data, raw })
    }
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_null_payload_is_empty() {
        let payload: Payload<DailySummary> = Payload::from_value(serde_json::Value::Null).unwrap();
        assert!(payload.data.total_steps.is_none());
        assert!(payload.raw.is_null());
    }

    #[test]
    fn test_wrong_type_is_visible() {
        let err = Payload::<DailySummary>::from_value(json!({"totalSteps": "lots"})).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("DailySummary"), "{}", msg);
    }

    #[test]
    fn test_raw_is_kept() {
        let raw = json!({"avgStressLevel": 30, "stressValuesArray": [[1, 2]]});
        let payload: Payload<StressDay> = Payload::from_value(raw.clone()).unwrap();
        assert_eq!(payload.raw, raw);
    }
}
