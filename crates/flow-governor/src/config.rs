//! Governor tuning parameters.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

use crate::error::{GovernorError, GovernorResult};

/// Minimum number of observed packets before setting up a flow.
pub const FLOW_SETUP_THRESHOLD: u8 = 5;

/// Smallest hash table, in bytes.
pub const MIN_SIZE: usize = 16 * 1024;

/// Largest hash table, in bytes.
pub const MAX_SIZE: usize = 256 * 1024;

/// A generation that fills faster than this doubles the table.
pub const MIN_ELAPSED: Duration = Duration::from_millis(1000);

/// A generation that takes longer than this halves the table.
pub const MAX_ELAPSED: Duration = Duration::from_millis(5000);

/// Largest value a 4-bit counter can hold.
pub(crate) const COUNTER_MAX: u8 = 0x0f;

/// Governor configuration.
///
/// Defaults are the fixed contract values above. Deployments may override
/// them from a JSON file:
///
/// ```json
/// {
///   "flow_setup_threshold": 5,
///   "min_size": 16384,
///   "max_size": 262144,
///   "min_elapsed_ms": 1000,
///   "max_elapsed_ms": 5000
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    /// Packets a counter must accumulate before a flow is installed.
    pub flow_setup_threshold: u8,
    /// Minimum table size in bytes.
    pub min_size: usize,
    /// Maximum table size in bytes.
    pub max_size: usize,
    /// Generations shorter than this grow the table (milliseconds).
    pub min_elapsed_ms: u64,
    /// Generations longer than this shrink the table (milliseconds).
    pub max_elapsed_ms: u64,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            flow_setup_threshold: FLOW_SETUP_THRESHOLD,
            min_size: MIN_SIZE,
            max_size: MAX_SIZE,
            min_elapsed_ms: MIN_ELAPSED.as_millis() as u64,
            max_elapsed_ms: MAX_ELAPSED.as_millis() as u64,
        }
    }
}

impl GovernorConfig {
    /// Loads and validates a configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> GovernorResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| GovernorError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = serde_json::from_reader(BufReader::new(file)).map_err(|source| {
            GovernorError::ConfigParse {
                path: path.to_path_buf(),
                source,
            }
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Checks that the parameters describe a usable governor.
    pub fn validate(&self) -> GovernorResult<()> {
        if self.flow_setup_threshold <= 1 || self.flow_setup_threshold > COUNTER_MAX {
            return Err(GovernorError::InvalidThreshold {
                threshold: self.flow_setup_threshold,
            });
        }

        for size in [self.min_size, self.max_size] {
            if !size.is_power_of_two() {
                return Err(GovernorError::invalid_size(size, "not a power of two"));
            }
        }
        // size / 4 is the generation length; it must be at least one packet.
        if self.min_size < 4 {
            return Err(GovernorError::invalid_size(
                self.min_size,
                "minimum size must be at least 4 bytes",
            ));
        }
        // The generation tally is a u32; it has to be able to reach size / 4.
        if self.max_size / 4 > u32::MAX as usize {
            return Err(GovernorError::invalid_size(
                self.max_size,
                "generation length exceeds the 32-bit packet tally",
            ));
        }
        if self.min_size > self.max_size {
            return Err(GovernorError::invalid_size(
                self.min_size,
                format!("minimum size exceeds maximum size {}", self.max_size),
            ));
        }

        if self.min_elapsed_ms > self.max_elapsed_ms {
            return Err(GovernorError::InvalidElapsed {
                min_ms: self.min_elapsed_ms,
                max_ms: self.max_elapsed_ms,
            });
        }

        Ok(())
    }

    /// Generation length below which the table grows.
    pub fn min_elapsed(&self) -> Duration {
        Duration::from_millis(self.min_elapsed_ms)
    }

    /// Generation length above which the table shrinks.
    pub fn max_elapsed(&self) -> Duration {
        Duration::from_millis(self.max_elapsed_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_contract() {
        let config = GovernorConfig::default();
        assert_eq!(config.flow_setup_threshold, 5);
        assert_eq!(config.min_size, 16384);
        assert_eq!(config.max_size, 262144);
        assert_eq!(config.min_elapsed(), Duration::from_secs(1));
        assert_eq!(config.max_elapsed(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_threshold() {
        for threshold in [0, 1, 16, 200] {
            let config = GovernorConfig {
                flow_setup_threshold: threshold,
                ..Default::default()
            };
            assert!(matches!(
                config.validate(),
                Err(GovernorError::InvalidThreshold { .. })
            ));
        }

        let config = GovernorConfig {
            flow_setup_threshold: 15,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_sizes() {
        let config = GovernorConfig {
            min_size: 3000,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(GovernorError::InvalidTableSize { size: 3000, .. })
        ));

        let config = GovernorConfig {
            min_size: MAX_SIZE * 2,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = GovernorConfig {
            min_size: 2,
            max_size: 2,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_validate_rejects_untallyable_max_size() {
        // 16 GiB tables need 2^32 packets per generation.
        let config = GovernorConfig {
            max_size: 1 << 34,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(GovernorError::InvalidTableSize { size, .. }) if size == 1 << 34
        ));

        let config = GovernorConfig {
            max_size: 1 << 33,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_elapsed_window() {
        let config = GovernorConfig {
            min_elapsed_ms: 6000,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(GovernorError::InvalidElapsed {
                min_ms: 6000,
                max_ms: 5000
            })
        ));
    }

    #[test]
    fn test_from_file_partial_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "max_size": 65536, "max_elapsed_ms": 2000 }}"#).unwrap();

        let config = GovernorConfig::from_file(file.path()).unwrap();
        assert_eq!(config.max_size, 65536);
        assert_eq!(config.max_elapsed_ms, 2000);
        assert_eq!(config.min_size, MIN_SIZE);
        assert_eq!(config.flow_setup_threshold, FLOW_SETUP_THRESHOLD);
    }

    #[test]
    fn test_from_file_rejects_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "flow_setup_threshold": 1 }}"#).unwrap();
        assert!(matches!(
            GovernorConfig::from_file(file.path()),
            Err(GovernorError::InvalidThreshold { threshold: 1 })
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            GovernorConfig::from_file(file.path()),
            Err(GovernorError::ConfigParse { .. })
        ));
    }

    #[test]
    fn test_from_file_missing() {
        let err = GovernorConfig::from_file("/nonexistent/governor.json").unwrap_err();
        assert!(matches!(err, GovernorError::ConfigIo { .. }));
    }
}
