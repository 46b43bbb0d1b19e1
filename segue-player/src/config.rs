//! segue-player configuration
//!
//! Loaded from TOML (see `segue_common::config` for file discovery). Every
//! section is optional; missing keys take the compiled defaults below.
//!
//! ```toml
//! event_capacity = 256
//!
//! [scheduling]
//! immediate_playback_seconds = 5.0
//! deferred_playback_seconds = 10.0
//! work_queue_capacity = 16
//! max_consecutive_decode_errors = 3
//!
//! [gaps]
//! gap_between_tracks_seconds = 2.0
//!
//! [transcoding]
//! formats = ["wma", "ape"]
//!
//! [logging]
//! level = "info"
//! ```

use crate::error::{Error, Result};
use segue_common::time;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "SEGUE_CONFIG";

/// Application directory name under the platform config dir
pub const APP_NAME: &str = "segue";

/// Top-level player configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub scheduling: SchedulingConfig,
    pub gaps: GapsConfig,
    pub transcoding: TranscodingConfig,
    pub logging: LoggingConfig,
    /// Observer event channel capacity before slow subscribers lag
    pub event_capacity: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            scheduling: SchedulingConfig::default(),
            gaps: GapsConfig::default(),
            transcoding: TranscodingConfig::default(),
            logging: LoggingConfig::default(),
            event_capacity: 256,
        }
    }
}

/// Decode-ahead scheduling parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingConfig {
    /// Size of the buffer decoded synchronously when playback starts
    pub immediate_playback_seconds: f64,
    /// Size of each lookahead buffer decoded on the work queue
    pub deferred_playback_seconds: f64,
    /// Maximum number of pending decode jobs
    pub work_queue_capacity: usize,
    /// Decode failures in a row before the track is abandoned
    pub max_consecutive_decode_errors: u32,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            immediate_playback_seconds: 5.0,
            deferred_playback_seconds: 10.0,
            work_queue_capacity: 16,
            max_consecutive_decode_errors: 3,
        }
    }
}

impl SchedulingConfig {
    /// Number of frames covering `seconds` at `sample_rate`, never zero
    pub fn frames_for(seconds: f64, sample_rate: u32) -> usize {
        ((seconds * sample_rate as f64).round() as usize).max(1)
    }

    pub fn immediate_frames(&self, sample_rate: u32) -> usize {
        Self::frames_for(self.immediate_playback_seconds, sample_rate)
    }

    pub fn deferred_frames(&self, sample_rate: u32) -> usize {
        Self::frames_for(self.deferred_playback_seconds, sample_rate)
    }
}

/// Gap handling between tracks
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GapsConfig {
    /// Silence inserted after every track that has no explicit gap of its own
    pub gap_between_tracks_seconds: Option<f64>,
}

impl GapsConfig {
    pub fn gap_between_tracks(&self) -> Option<Duration> {
        self.gap_between_tracks_seconds
            .map(time::secs_to_duration)
            .filter(|d| !d.is_zero())
    }
}

/// Formats that cannot be decoded natively
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodingConfig {
    /// Lowercase file extensions requiring transcoding before playback
    pub formats: Vec<String>,
}

impl Default for TranscodingConfig {
    fn default() -> Self {
        Self {
            formats: ["wma", "ape", "mpc", "wv", "tta", "opus", "spx", "dsf", "dff", "ra", "rm"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl TranscodingConfig {
    pub fn needs_transcoding(&self, extension: &str) -> bool {
        self.formats
            .iter()
            .any(|format| format.eq_ignore_ascii_case(extension))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level when RUST_LOG is not set
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    /// EnvFilter directive covering both workspace crates
    pub fn filter_directive(&self) -> String {
        format!("segue_player={0},segue_common={0}", self.level)
    }
}

impl PlayerConfig {
    /// Load configuration following the standard discovery order, then validate
    ///
    /// An explicit path must exist and parse; a missing discovered file yields defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let config: PlayerConfig =
            segue_common::config::load_or_default(explicit, CONFIG_ENV_VAR, APP_NAME)?;
        config.validate()?;
        info!(
            immediate = config.scheduling.immediate_playback_seconds,
            deferred = config.scheduling.deferred_playback_seconds,
            "Player configuration loaded"
        );
        Ok(config)
    }

    /// Reject values the scheduler cannot work with
    pub fn validate(&self) -> Result<()> {
        let scheduling = &self.scheduling;
        if !is_positive(scheduling.immediate_playback_seconds) {
            return Err(Error::Config(
                "scheduling.immediate_playback_seconds must be positive".to_string(),
            ));
        }
        if !is_positive(scheduling.deferred_playback_seconds) {
            return Err(Error::Config(
                "scheduling.deferred_playback_seconds must be positive".to_string(),
            ));
        }
        if scheduling.work_queue_capacity == 0 {
            return Err(Error::Config(
                "scheduling.work_queue_capacity must be at least 1".to_string(),
            ));
        }
        if scheduling.max_consecutive_decode_errors == 0 {
            return Err(Error::Config(
                "scheduling.max_consecutive_decode_errors must be at least 1".to_string(),
            ));
        }
        if let Some(gap) = self.gaps.gap_between_tracks_seconds {
            if !gap.is_finite() || gap < 0.0 {
                return Err(Error::Config(format!(
                    "gaps.gap_between_tracks_seconds must be a non-negative number, got {}",
                    gap
                )));
            }
        }
        if self.event_capacity == 0 {
            return Err(Error::Config("event_capacity must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}
