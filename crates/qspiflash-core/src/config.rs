//! Hardware tuning parameters
//!
//! These values were found empirically on real controllers and are kept
//! adjustable for other hardware revisions. With the `std` feature they can
//! be loaded from a TOML file:
//!
//! ```toml
//! poll_interval_us = 5
//! poll_timeout_us = 1000000
//! read_dummy_len = 4
//! write_max_len = 128
//! ```

use crate::poll::PollBudget;

/// Default busy-wait poll interval (5 us)
pub const DEFAULT_POLL_INTERVAL_US: u32 = 5;
/// Default busy-wait budget (1 s)
pub const DEFAULT_POLL_TIMEOUT_US: u32 = 1_000_000;
/// Dummy bytes clocked between a read header and its payload
pub const DEFAULT_READ_DUMMY_LEN: usize = 4;
/// Largest payload one program command may carry; larger bursts fail randomly
pub const DEFAULT_WRITE_MAX_LEN: usize = 128;
/// Byte pushed while probing the FIFO depth; zero upsets the controller
pub const DEFAULT_FIFO_FILLER: u8 = 0x01;

/// Adjustable timing and sizing constants for one controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(serde::Deserialize))]
#[cfg_attr(feature = "std", serde(default, deny_unknown_fields))]
pub struct Tuning {
    /// Delay between two polls of a busy condition, in microseconds
    pub poll_interval_us: u32,
    /// Total time a busy condition may take, in microseconds
    pub poll_timeout_us: u32,
    /// Dummy bytes that precede read data in the RX FIFO
    pub read_dummy_len: usize,
    /// Maximum payload of a single program command
    pub write_max_len: usize,
    /// Byte used to fill the TX FIFO while measuring its depth
    pub fifo_filler: u8,
    /// Pulse the soft reset register before initialising the controller
    pub soft_reset_on_attach: bool,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            poll_interval_us: DEFAULT_POLL_INTERVAL_US,
            poll_timeout_us: DEFAULT_POLL_TIMEOUT_US,
            read_dummy_len: DEFAULT_READ_DUMMY_LEN,
            write_max_len: DEFAULT_WRITE_MAX_LEN,
            fifo_filler: DEFAULT_FIFO_FILLER,
            soft_reset_on_attach: false,
        }
    }
}

impl Tuning {
    /// Busy-wait budget derived from the poll interval and timeout
    pub fn poll_budget(&self) -> PollBudget {
        PollBudget::new(self.poll_interval_us, self.poll_timeout_us)
    }
}

#[cfg(feature = "std")]
impl Tuning {
    /// Parse tuning values from TOML text; missing keys keep their defaults
    pub fn from_toml_str(text: &str) -> Result<Self, crate::error::ConfigError> {
        let tuning: Tuning = toml::from_str(text)?;
        tuning.validate()?;
        Ok(tuning)
    }

    /// Load tuning values from a TOML file
    pub fn load(path: &std::path::Path) -> Result<Self, crate::error::ConfigError> {
        let text =
            std::fs::read_to_string(path).map_err(|source| crate::error::ConfigError::Read {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<(), crate::error::ConfigError> {
        use crate::error::ConfigError;

        if self.poll_interval_us == 0 {
            return Err(ConfigError::Invalid {
                name: "poll_interval_us",
                message: "must be non-zero".to_string(),
            });
        }
        if self.poll_timeout_us < self.poll_interval_us {
            return Err(ConfigError::Invalid {
                name: "poll_timeout_us",
                message: format!("must be at least poll_interval_us ({})", self.poll_interval_us),
            });
        }
        if self.write_max_len == 0 {
            return Err(ConfigError::Invalid {
                name: "write_max_len",
                message: "must be non-zero".to_string(),
            });
        }
        if self.fifo_filler == 0 {
            return Err(ConfigError::Invalid {
                name: "fifo_filler",
                message: "a zero filler byte makes the controller flag an error".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::error::ConfigError;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let tuning = Tuning::from_toml_str("write_max_len = 64\n").unwrap();
        assert_eq!(tuning.write_max_len, 64);
        assert_eq!(tuning.read_dummy_len, DEFAULT_READ_DUMMY_LEN);
        assert_eq!(tuning.poll_interval_us, DEFAULT_POLL_INTERVAL_US);
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(Tuning::from_toml_str("").unwrap(), Tuning::default());
    }

    #[test]
    fn test_rejects_zero_filler() {
        let err = Tuning::from_toml_str("fifo_filler = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "fifo_filler", .. }));
    }

    #[test]
    fn test_rejects_unknown_key() {
        let err = Tuning::from_toml_str("fifo_depth = 64\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
