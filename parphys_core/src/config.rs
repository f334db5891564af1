//! Engine configuration surface.

use crate::batcher::BatchConstraints;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ============================================================================
// ENGINE CONFIGURATION
// ============================================================================

/// Tunables for one simulation run.
///
/// Missing fields in a JSON file take their default values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of long-lived workers and batches per frame (default: 4)
    pub worker_count: usize,

    /// Maximum objects per batch (default: none)
    pub max_batch_size: Option<usize>,

    /// Maximum predicted cost per batch (default: none)
    pub max_batch_cost: Option<f64>,

    /// Wall-clock budget for one frame (default: 2s, serialized as ms).
    /// A value too large to add to the current instant never expires.
    #[serde(with = "duration_ms", rename = "frame_deadline_ms")]
    pub frame_deadline: Duration,

    /// Use the trained cost model when one is supplied (default: true)
    pub predictor_enabled: bool,

    /// Consecutive update failures before an object is quarantined (default: 3)
    pub quarantine_after: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            max_batch_size: None,
            max_batch_cost: None,
            frame_deadline: Duration::from_secs(2),
            predictor_enabled: true,
            quarantine_after: Some(3),
        }
    }
}

impl EngineConfig {
    /// Loads and validates a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_workers(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_max_batch_size(mut self, max_objects: usize) -> Self {
        self.max_batch_size = Some(max_objects);
        self
    }

    pub fn with_max_batch_cost(mut self, max_cost: f64) -> Self {
        self.max_batch_cost = Some(max_cost);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.frame_deadline = deadline;
        self
    }

    pub fn with_predictor(mut self, enabled: bool) -> Self {
        self.predictor_enabled = enabled;
        self
    }

    pub fn with_quarantine_after(mut self, failures: Option<u32>) -> Self {
        self.quarantine_after = failures;
        self
    }

    /// Checks every field; the engine refuses to start on error.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if self.frame_deadline.is_zero() {
            return Err(ConfigError::ZeroDeadline);
        }
        self.constraints().validate()
    }

    /// Batch ceilings derived from this configuration.
    pub fn constraints(&self) -> BatchConstraints {
        BatchConstraints {
            max_objects: self.max_batch_size,
            max_cost: self.max_batch_cost,
        }
    }
}

/// Serializes a [`Duration`] as whole milliseconds.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.quarantine_after, Some(3));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            EngineConfig::default().with_workers(0).validate(),
            Err(ConfigError::ZeroWorkers)
        ));
        assert!(matches!(
            EngineConfig::default().with_deadline(Duration::ZERO).validate(),
            Err(ConfigError::ZeroDeadline)
        ));
        assert!(matches!(
            EngineConfig::default().with_max_batch_size(0).validate(),
            Err(ConfigError::ZeroBatchSize)
        ));
        assert!(matches!(
            EngineConfig::default().with_max_batch_cost(f64::NAN).validate(),
            Err(ConfigError::InvalidCostCeiling(_))
        ));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"worker_count": 8, "frame_deadline_ms": 250}"#).unwrap();
        assert_eq!(config.worker_count, 8);
        assert_eq!(config.frame_deadline, Duration::from_millis(250));
        assert!(config.predictor_enabled);
        assert_eq!(config.max_batch_size, None);
    }

    #[test]
    fn test_json_round_trip_keeps_deadline_in_ms() {
        let config = EngineConfig::default().with_deadline(Duration::from_millis(1500));
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["frame_deadline_ms"], 1500);
    }

    #[test]
    fn test_unbounded_deadline_saturates_in_json() {
        let config = EngineConfig::default().with_deadline(Duration::MAX);
        assert!(config.validate().is_ok());

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["frame_deadline_ms"], u64::MAX);
        let back: EngineConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back.frame_deadline, Duration::from_millis(u64::MAX));
    }

    #[test]
    fn test_from_json_file() {
        let path = std::env::temp_dir().join(format!("parphys-config-{}.json", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, r#"{{"worker_count": 2, "max_batch_size": 10}}"#).unwrap();
        drop(file);

        let config = EngineConfig::from_json_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(config.worker_count, 2);
        assert_eq!(config.max_batch_size, Some(10));

        assert!(matches!(
            EngineConfig::from_json_file("/nonexistent/parphys.json"),
            Err(ConfigError::Io { .. })
        ));
    }
}
