use gcs_s3_relay_core::error::RelayError;
use gcs_s3_relay_core::sweep::DEFAULT_AGE_THRESHOLD_MINUTES;

pub const DEFAULT_ROLE_SESSION_NAME: &str = "gcp-logging-to-s3-session";
/// One year; larger thresholds would never select anything useful.
const MAX_AGE_THRESHOLD_MINUTES: i64 = 366 * 24 * 60;

/// Process-wide settings, read once at startup and passed by reference into
/// every invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub staging_bucket: String,
    pub destination_bucket: String,
    pub destination_region: String,
    pub role_identifier: String,
    pub role_session_name: String,
    pub age_threshold_minutes: i64,
}

impl RelayConfig {
    pub fn from_env() -> Result<Self, RelayError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, RelayError> {
        let required = |name: &str| -> Result<String, RelayError> {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or_else(|| RelayError::config(format!("{name} must be configured")))
        };

        let age_threshold_minutes = match lookup("AGE_THRESHOLD_MINUTES") {
            Some(raw) if !raw.trim().is_empty() => parse_age_threshold(raw.trim())?,
            _ => DEFAULT_AGE_THRESHOLD_MINUTES,
        };

        Ok(Self {
            staging_bucket: required("TEMP_BUCKET")?,
            destination_bucket: required("TARGET_BUCKET")?,
            destination_region: required("AWS_REGION")?,
            role_identifier: required("AWS_ROLE_ARN")?,
            role_session_name: lookup("ROLE_SESSION_NAME")
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| DEFAULT_ROLE_SESSION_NAME.to_string()),
            age_threshold_minutes,
        })
    }
}

fn parse_age_threshold(raw: &str) -> Result<i64, RelayError> {
    let minutes = raw.parse::<i64>().map_err(|error| {
        RelayError::config(format!("AGE_THRESHOLD_MINUTES must be an integer: {error}"))
    })?;
    if !(0..=MAX_AGE_THRESHOLD_MINUTES).contains(&minutes) {
        return Err(RelayError::config(format!(
            "AGE_THRESHOLD_MINUTES must be between 0 and {MAX_AGE_THRESHOLD_MINUTES}"
        )));
    }
    Ok(minutes)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        move |name| values.get(name).cloned()
    }

    fn complete_env() -> Vec<(&'static str, &'static str)> {
        vec![
            ("TEMP_BUCKET", "staging"),
            ("TARGET_BUCKET", "archive"),
            ("AWS_REGION", "eu-west-1"),
            ("AWS_ROLE_ARN", "arn:aws:iam::123456789012:role/relay"),
        ]
    }

    #[test]
    fn applies_defaults() {
        let config = RelayConfig::from_lookup(lookup_from(&complete_env())).expect("config");

        assert_eq!(config.staging_bucket, "staging");
        assert_eq!(config.destination_bucket, "archive");
        assert_eq!(config.age_threshold_minutes, 60);
        assert_eq!(config.role_session_name, "gcp-logging-to-s3-session");
    }

    #[test]
    fn reads_optional_overrides() {
        let mut env = complete_env();
        env.push(("AGE_THRESHOLD_MINUTES", " 90 "));
        env.push(("ROLE_SESSION_NAME", "relay-session"));

        let config = RelayConfig::from_lookup(lookup_from(&env)).expect("config");
        assert_eq!(config.age_threshold_minutes, 90);
        assert_eq!(config.role_session_name, "relay-session");
    }

    #[test]
    fn missing_required_key_is_a_config_error() {
        let env: Vec<_> = complete_env()
            .into_iter()
            .filter(|(name, _)| *name != "TARGET_BUCKET")
            .collect();

        let error = RelayConfig::from_lookup(lookup_from(&env)).expect_err("config should fail");
        assert_eq!(error.code(), "config_error");
        assert!(error.to_string().contains("TARGET_BUCKET"));
    }

    #[test]
    fn blank_required_key_is_rejected() {
        let mut env = complete_env();
        env[0] = ("TEMP_BUCKET", "  ");

        let error = RelayConfig::from_lookup(lookup_from(&env)).expect_err("config should fail");
        assert!(error.to_string().contains("TEMP_BUCKET"));
    }

    #[test]
    fn rejects_invalid_thresholds() {
        for raw in ["sixty", "-5", "99999999"] {
            let mut env = complete_env();
            env.push(("AGE_THRESHOLD_MINUTES", raw));

            let error = RelayConfig::from_lookup(lookup_from(&env)).expect_err("threshold should fail");
            assert!(error.to_string().contains("AGE_THRESHOLD_MINUTES"), "{raw}");
        }
    }
}
