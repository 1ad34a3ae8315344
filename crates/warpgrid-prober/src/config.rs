//! Prober configuration.
//!
//! Durations are human strings ("500ms", "2s", "1m") so the config can
//! be embedded in TOML next to the rest of the control plane settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ProberError, ProberResult};

/// Tuning knobs for the probing manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProberConfig {
    /// First retry delay after a non-matching probe (e.g., "100ms").
    pub initial_backoff: String,
    /// Upper bound for the retry delay (e.g., "10s").
    pub max_backoff: String,
    /// Relative jitter applied to each delay, in `0.0..=1.0`.
    pub backoff_jitter: f64,
    /// Timeout for a single HTTP probe (e.g., "2s").
    pub request_timeout: String,
    /// How long a settled result is reused before re-probing. `None` keeps it
    /// until the target changes.
    pub settled_ttl: Option<String>,
}

impl Default for ProberConfig {
    fn default() -> Self {
        Self {
            initial_backoff: "100ms".to_string(),
            max_backoff: "10s".to_string(),
            backoff_jitter: 0.2,
            request_timeout: "2s".to_string(),
            settled_ttl: None,
        }
    }
}

impl ProberConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> ProberResult<Self> {
        let config: ProberConfig =
            toml::from_str(s).map_err(|e| ProberError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every duration parses and the backoff bounds are sane.
    pub fn validate(&self) -> ProberResult<()> {
        let initial = require_duration("initial_backoff", &self.initial_backoff)?;
        let max = require_duration("max_backoff", &self.max_backoff)?;
        require_duration("request_timeout", &self.request_timeout)?;
        if let Some(ttl) = &self.settled_ttl {
            require_duration("settled_ttl", ttl)?;
        }

        if initial.is_zero() {
            return Err(ProberError::Config("initial_backoff must be positive".to_string()));
        }
        if initial > max {
            return Err(ProberError::Config(format!(
                "initial_backoff ({initial:?}) exceeds max_backoff ({max:?})"
            )));
        }
        if !(0.0..=1.0).contains(&self.backoff_jitter) {
            return Err(ProberError::Config(format!(
                "backoff_jitter must be within 0.0..=1.0, got {}",
                self.backoff_jitter
            )));
        }
        Ok(())
    }

    pub fn initial_backoff(&self) -> Duration {
        parse_duration(&self.initial_backoff).unwrap_or(Duration::from_millis(100))
    }

    pub fn max_backoff(&self) -> Duration {
        parse_duration(&self.max_backoff).unwrap_or(Duration::from_secs(10))
    }

    pub fn request_timeout(&self) -> Duration {
        parse_duration(&self.request_timeout).unwrap_or(Duration::from_secs(2))
    }

    pub fn settled_ttl(&self) -> Option<Duration> {
        self.settled_ttl.as_deref().and_then(parse_duration)
    }
}

fn require_duration(field: &str, value: &str) -> ProberResult<Duration> {
    parse_duration(value)
        .ok_or_else(|| ProberError::Config(format!("{field}: invalid duration {value:?}")))
}

/// Parse a duration string like "5s", "500ms", "1m".
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ProberConfig::default();
        config.validate().unwrap();
        assert_eq!(config.initial_backoff(), Duration::from_millis(100));
        assert_eq!(config.max_backoff(), Duration::from_secs(10));
        assert_eq!(config.request_timeout(), Duration::from_secs(2));
        assert_eq!(config.settled_ttl(), None);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config = ProberConfig::from_toml_str(
            r#"
            max_backoff = "1m"
            settled_ttl = "30s"
            "#,
        )
        .unwrap();
        assert_eq!(config.max_backoff(), Duration::from_secs(60));
        assert_eq!(config.settled_ttl(), Some(Duration::from_secs(30)));
        assert_eq!(config.initial_backoff(), Duration::from_millis(100));
    }

    #[test]
    fn rejects_bad_duration() {
        let err = ProberConfig::from_toml_str(r#"request_timeout = "soon""#).unwrap_err();
        assert!(err.to_string().contains("request_timeout"));
    }

    #[test]
    fn rejects_inverted_backoff() {
        let config = ProberConfig {
            initial_backoff: "5s".to_string(),
            max_backoff: "1s".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ProberError::Config(_))));
    }

    #[test]
    fn rejects_out_of_range_jitter() {
        let config = ProberConfig {
            backoff_jitter: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ProberConfig {
            backoff_jitter: f64::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_backoff() {
        let config = ProberConfig {
            initial_backoff: "0ms".to_string(),
            max_backoff: "0ms".to_string(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("initial_backoff"));
    }

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("10"), Some(Duration::from_secs(10)));
        assert_eq!(parse_duration("fast"), None);
    }
}
