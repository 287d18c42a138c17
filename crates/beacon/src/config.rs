//! Beacon protocol configuration.
//!
//! All timing and sizing knobs for the per-epoch protocol live here,
//! loaded from the node's TOML configuration. Durations are expressed in
//! milliseconds in the file and exposed as [`Duration`] accessors.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading the configuration file failed.
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        /// Path that could not be read.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The eligibility ratio string is malformed or out of range.
    #[error("invalid eligibility ratio {0:?}: expected \"numerator/denominator\" with nonzero parts")]
    InvalidRatio(String),

    /// The protocol must run at least one following round.
    #[error("rounds_number must be at least 1")]
    ZeroRounds,

    /// The proposal intake queue must hold at least one message.
    #[error("proposal_chan_capacity must be at least 1")]
    ZeroCapacity,

    /// A phase duration is zero.
    #[error("{0} must be nonzero")]
    ZeroDuration(&'static str),
}

/// Configuration for the beacon protocol driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BeaconConfig {
    /// Eligibility ratio `q` as a `"numerator/denominator"` string. The
    /// proposal threshold for an epoch of total weight `W` is `ceil(W * q)`.
    pub q: String,

    /// Number of following voting rounds (`K`).
    pub rounds_number: u32,

    /// Length of the proposal phase in milliseconds.
    pub proposal_duration_ms: u64,

    /// Additional time after the proposal deadline during which late
    /// proposals are still accepted (and classified as potentially valid).
    pub grace_period_duration_ms: u64,

    /// Length of the first voting round in milliseconds.
    pub first_voting_round_duration_ms: u64,

    /// Length of each following voting round in milliseconds.
    pub voting_round_duration_ms: u64,

    /// Capacity of the inbound proposal queue. When the queue is full,
    /// newly arriving proposals are dropped.
    pub proposal_chan_capacity: usize,
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self {
            q: "1/3".into(),
            rounds_number: 300,
            proposal_duration_ms: 2 * 60 * 1000,
            grace_period_duration_ms: 10 * 1000,
            first_voting_round_duration_ms: 30 * 60 * 1000,
            voting_round_duration_ms: 30 * 60 * 1000,
            proposal_chan_capacity: 1024,
        }
    }
}

impl BeaconConfig {
    /// Loads configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        info!(path = %path.display(), "loading beacon configuration");

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content)?;
        config.validate()?;

        debug!(
            rounds = config.rounds_number,
            q = %config.q,
            "beacon configuration loaded"
        );
        Ok(config)
    }

    /// A configuration sized for unit tests: two following rounds and
    /// phase durations of tens of milliseconds.
    pub fn for_tests() -> Self {
        Self {
            q: "1/3".into(),
            rounds_number: 2,
            proposal_duration_ms: 20,
            grace_period_duration_ms: 10,
            first_voting_round_duration_ms: 20,
            voting_round_duration_ms: 20,
            proposal_chan_capacity: 100,
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        crate::checker::Ratio::parse(&self.q)
            .ok_or_else(|| ConfigError::InvalidRatio(self.q.clone()))?;
        if self.rounds_number == 0 {
            return Err(ConfigError::ZeroRounds);
        }
        if self.proposal_chan_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.proposal_duration_ms == 0 {
            return Err(ConfigError::ZeroDuration("proposal_duration_ms"));
        }
        if self.first_voting_round_duration_ms == 0 {
            return Err(ConfigError::ZeroDuration("first_voting_round_duration_ms"));
        }
        if self.voting_round_duration_ms == 0 {
            return Err(ConfigError::ZeroDuration("voting_round_duration_ms"));
        }
        Ok(())
    }

    /// Length of the proposal phase.
    pub fn proposal_duration(&self) -> Duration {
        Duration::from_millis(self.proposal_duration_ms)
    }

    /// Late-proposal grace period after the proposal deadline.
    pub fn grace_period_duration(&self) -> Duration {
        Duration::from_millis(self.grace_period_duration_ms)
    }

    /// Length of the first voting round.
    pub fn first_voting_round_duration(&self) -> Duration {
        Duration::from_millis(self.first_voting_round_duration_ms)
    }

    /// Length of each following voting round.
    pub fn voting_round_duration(&self) -> Duration {
        Duration::from_millis(self.voting_round_duration_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        assert!(BeaconConfig::default().validate().is_ok());
        assert!(BeaconConfig::for_tests().validate().is_ok());
    }

    #[test]
    fn rejects_zero_rounds() {
        let config = BeaconConfig {
            rounds_number: 0,
            ..BeaconConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroRounds)));
    }

    #[test]
    fn rejects_zero_capacity() {
        let config = BeaconConfig {
            proposal_chan_capacity: 0,
            ..BeaconConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroCapacity)));
    }

    #[test]
    fn rejects_malformed_ratio() {
        for q in ["", "0/3", "1/0", "a/b", "1/2/3"] {
            let config = BeaconConfig {
                q: q.into(),
                ..BeaconConfig::default()
            };
            assert!(
                matches!(config.validate(), Err(ConfigError::InvalidRatio(_))),
                "ratio {q:?} should be rejected"
            );
        }
    }

    #[test]
    fn loads_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "q = \"1/4\"\nrounds_number = 5\nproposal_duration_ms = 1000\n"
        )
        .unwrap();

        let config = BeaconConfig::load(file.path()).unwrap();
        assert_eq!(config.q, "1/4");
        assert_eq!(config.rounds_number, 5);
        assert_eq!(config.proposal_duration(), Duration::from_secs(1));
        // Unspecified fields fall back to defaults.
        assert_eq!(
            config.proposal_chan_capacity,
            BeaconConfig::default().proposal_chan_capacity
        );
    }

    #[test]
    fn load_rejects_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "rounds_number = 0\n").unwrap();
        assert!(matches!(
            BeaconConfig::load(file.path()),
            Err(ConfigError::ZeroRounds)
        ));
    }
}
