use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path, time::Duration};

use crate::{InterpreterError, InterpreterResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpreterConfig {
    /// Timeout handed to the collector when a field declares none.
    #[serde(default = "default_collect_timeout", with = "duration_ms")]
    pub collect_timeout: Duration,

    /// Upper bound on select/collect/process rounds within one dialog.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Throws nested inside handlers deeper than this fail the dialog.
    #[serde(default = "default_max_event_depth")]
    pub max_event_depth: usize,

    #[serde(default = "default_event_buffer_size")]
    pub event_buffer_size: usize,
}

fn default_collect_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_max_iterations() -> usize {
    1000
}

fn default_max_event_depth() -> usize {
    16
}

fn default_event_buffer_size() -> usize {
    16
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            collect_timeout: default_collect_timeout(),
            max_iterations: default_max_iterations(),
            max_event_depth: default_max_event_depth(),
            event_buffer_size: default_event_buffer_size(),
        }
    }
}

impl InterpreterConfig {
    /// Loads a JSON configuration file; absent keys take their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> InterpreterResult<Self> {
        let file = File::open(path.as_ref()).map_err(|e| {
            InterpreterError::Config(format!(
                "Failed to open config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader)
            .map_err(|e| InterpreterError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn from_json(s: &str) -> InterpreterResult<Self> {
        serde_json::from_str(s)
            .map_err(|e| InterpreterError::Config(format!("Failed to parse config: {}", e)))
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_fill_missing_keys() {
        let config = InterpreterConfig::from_json(r#"{ "collect_timeout": 1500 }"#).unwrap();
        assert_eq!(config.collect_timeout, Duration::from_millis(1500));
        assert_eq!(config.max_iterations, 1000);
        assert_eq!(config.max_event_depth, 16);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "max_iterations": 7, "event_buffer_size": 2 }}"#).unwrap();

        let config = InterpreterConfig::from_file(file.path()).unwrap();
        assert_eq!(config.max_iterations, 7);
        assert_eq!(config.event_buffer_size, 2);
        assert_eq!(config.collect_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_config_is_reported() {
        assert!(matches!(
            InterpreterConfig::from_json("{ not json"),
            Err(InterpreterError::Config(_))
        ));
        assert!(matches!(
            InterpreterConfig::from_file("/nonexistent/vxml.json"),
            Err(InterpreterError::Config(_))
        ));
    }
}
