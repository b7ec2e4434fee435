use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::time::Duration;

/// Serializes Duration as seconds
pub fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    duration.as_secs_f64().serialize(serializer)
}

/// Deserializes Duration from seconds
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs).map_err(|e| {
        serde::de::Error::custom(format!("invalid duration: {} seconds ({})", secs, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, Deserialize)]
    struct Test {
        #[serde(serialize_with = "serialize_duration")]
        #[serde(deserialize_with = "deserialize_duration")]
        interval: Duration,
    }

    #[test]
    fn test_duration_serialization() {
        let original = Test {
            interval: Duration::from_millis(12_500),
        };

        let serialized = serde_json::to_string(&original).unwrap();
        assert_eq!(serialized, r#"{"interval":12.5}"#);

        let deserialized: Test = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized.interval, original.interval);
    }

    #[test]
    fn test_negative_duration_rejected() {
        let result: Result<Test, _> = serde_json::from_str(r#"{"interval":-1.0}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_oversized_duration_rejected() {
        let result: Result<Test, _> = serde_json::from_str(r#"{"interval":1e30}"#);
        let err = result.err().unwrap();
        assert!(err.to_string().contains("invalid duration"));

        let config: Result<crate::core::RouterConfig, _> = serde_json::from_str(
            r#"{"interfaces":1,"robustness":2,"query_interval":1e30,
                "query_response_interval":10.0,"group_membership_interval":260.0,
                "startup_query_interval":31.25,"startup_query_count":2,
                "last_member_query_interval":1.0,"last_member_query_count":2}"#,
        );
        assert!(config.is_err());
    }
}
