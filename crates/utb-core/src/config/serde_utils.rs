//! Serde helpers for configuration values

/// `Duration` as whole seconds, or as a `"<n>ms"`, `"<n>us"` or `"<n>s"` string
///
/// Whole-second durations are written as plain integers so that typical
/// config files stay readable. Other values use the coarsest of `ms` or `us`
/// that holds them exactly; anything below a microsecond is truncated.
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Config {
///     #[serde(with = "utb_core::config::serde_utils::duration_secs")]
///     timeout: Duration,
/// }
/// ```
pub mod duration_secs {
    use serde::{self, de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Secs(u64),
        Text(String),
    }

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_nanos() == 0 {
            serializer.serialize_u64(duration.as_secs())
        } else if duration.subsec_nanos() % 1_000_000 == 0 {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        } else {
            serializer.serialize_str(&format!("{}us", duration.as_micros()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Raw::deserialize(deserializer)? {
            Raw::Secs(secs) => Ok(Duration::from_secs(secs)),
            Raw::Text(text) => parse(&text).map_err(de::Error::custom),
        }
    }

    fn parse(text: &str) -> Result<Duration, String> {
        let text = text.trim();
        let (digits, to_duration): (&str, fn(u64) -> Duration) =
            if let Some(ms) = text.strip_suffix("ms") {
                (ms, Duration::from_millis)
            } else if let Some(us) = text.strip_suffix("us") {
                (us, Duration::from_micros)
            } else if let Some(s) = text.strip_suffix('s') {
                (s, Duration::from_secs)
            } else {
                (text, Duration::from_secs)
            };

        digits
            .trim()
            .parse::<u64>()
            .map(to_duration)
            .map_err(|_| format!("invalid duration: {:?}", text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct TestConfig {
        #[serde(with = "duration_secs")]
        timeout: Duration,
    }

    #[test]
    fn test_whole_seconds_serialize_as_integer() {
        let config = TestConfig {
            timeout: Duration::from_secs(30),
        };
        assert_eq!(serde_json::to_string(&config).unwrap(), r#"{"timeout":30}"#);
    }

    #[test]
    fn test_sub_second_serializes_as_millis() {
        let config = TestConfig {
            timeout: Duration::from_millis(250),
        };
        assert_eq!(
            serde_json::to_string(&config).unwrap(),
            r#"{"timeout":"250ms"}"#
        );
    }

    #[test]
    fn test_sub_millisecond_keeps_micros() {
        let config = TestConfig {
            timeout: Duration::from_micros(1500),
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(json, r#"{"timeout":"1500us"}"#);
        assert_eq!(serde_json::from_str::<TestConfig>(&json).unwrap(), config);
    }

    #[test]
    fn test_deserialize_forms() {
        let parse = |json: &str| serde_json::from_str::<TestConfig>(json).map(|c| c.timeout);

        assert_eq!(parse(r#"{"timeout":60}"#).unwrap(), Duration::from_secs(60));
        assert_eq!(parse(r#"{"timeout":"750ms"}"#).unwrap(), Duration::from_millis(750));
        assert_eq!(parse(r#"{"timeout":"2s"}"#).unwrap(), Duration::from_secs(2));
        assert!(parse(r#"{"timeout":"soon"}"#).is_err());
    }
}
