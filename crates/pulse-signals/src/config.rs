use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use crate::buffer::Channel;
use crate::ica::{IcaConfig, SelectorKind};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Driver configuration for the heart-rate pipeline.
///
/// Every section falls back to its defaults, so a TOML file only needs the
/// keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PulseConfig {
    pub capture: CaptureConfig,
    pub band: BandConfig,
    pub separation: SeparationConfig,
    pub normalization: NormalizationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Sampling rate (frames per second)
    pub fps: f32,
    /// Length of the analysis window (seconds)
    pub buffer_duration_sec: f32,
    /// Window slide after each cycle (seconds)
    pub shift_duration_sec: f32,
    /// Frames discarded at start-up while the camera settles white balance (seconds)
    pub discard_duration_sec: f32,
    /// Channel analysed when source separation is off or cannot run
    pub channel_of_interest: Channel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandConfig {
    /// Lowest plausible heart rate (BPM)
    pub low_bpm: f32,
    /// Highest plausible heart rate (BPM)
    pub high_bpm: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SeparationConfig {
    /// Run FastICA over R, G, B instead of a single channel
    pub enabled: bool,
    /// Strategy picking the pulse component
    pub selector: SelectorKind,
    pub ica: IcaConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationConfig {
    /// Standard deviations below this are replaced by 1.0
    pub std_floor: f32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            fps: 15.0,
            buffer_duration_sec: 10.0,
            shift_duration_sec: 1.0,
            discard_duration_sec: 5.0,
            channel_of_interest: Channel::Green,
        }
    }
}

impl Default for BandConfig {
    fn default() -> Self {
        Self {
            low_bpm: 50.0,
            high_bpm: 150.0,
        }
    }
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self { std_floor: 1e-6 }
    }
}

impl PulseConfig {
    /// Samples per channel buffer: `round(fps * buffer_duration)`.
    pub fn buffer_capacity(&self) -> usize {
        seconds_to_frames(self.capture.fps, self.capture.buffer_duration_sec)
    }

    /// Samples evicted per shift: `round(fps * shift_duration)`.
    pub fn shift_samples(&self) -> usize {
        seconds_to_frames(self.capture.fps, self.capture.shift_duration_sec)
    }

    /// Frames dropped before buffering starts.
    pub fn discard_frames(&self) -> usize {
        seconds_to_frames(self.capture.fps, self.capture.discard_duration_sec)
    }

    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: PulseConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides
    /// Environment variables are prefixed with PULSE_
    /// Example: PULSE_FPS=30
    pub fn from_file_with_env<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. User config file (if exists)
    /// 3. Default config file
    /// 4. Built-in defaults (lowest priority)
    pub fn load_layered(
        default_path: Option<&Path>,
        user_path: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let mut config = PulseConfig::default();

        if let Some(path) = default_path {
            if path.exists() {
                config = Self::from_file(path)?;
            }
        }

        // A user file replaces the defaults wholesale; missing keys fall
        // back to built-in values, not to the default file.
        if let Some(path) = user_path {
            if path.exists() {
                config = Self::from_file(path)?;
            }
        }

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Apply `PULSE_*` environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup (the environment in
    /// production).
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        override_value(&lookup, "PULSE_FPS", &mut self.capture.fps)?;
        override_value(
            &lookup,
            "PULSE_BUFFER_DURATION_SEC",
            &mut self.capture.buffer_duration_sec,
        )?;
        override_value(
            &lookup,
            "PULSE_SHIFT_DURATION_SEC",
            &mut self.capture.shift_duration_sec,
        )?;
        override_value(
            &lookup,
            "PULSE_DISCARD_DURATION_SEC",
            &mut self.capture.discard_duration_sec,
        )?;
        override_value(&lookup, "PULSE_LOW_BPM", &mut self.band.low_bpm)?;
        override_value(&lookup, "PULSE_HIGH_BPM", &mut self.band.high_bpm)?;
        override_value(&lookup, "PULSE_USE_ICA", &mut self.separation.enabled)?;
        override_value(
            &lookup,
            "PULSE_ICA_ITERATIONS",
            &mut self.separation.ica.iterations,
        )?;

        if let Some(val) = lookup("PULSE_CHANNEL") {
            self.capture.channel_of_interest = match val.to_ascii_lowercase().as_str() {
                "red" | "r" => Channel::Red,
                "green" | "g" => Channel::Green,
                "blue" | "b" => Channel::Blue,
                _ => {
                    return Err(ConfigError::Validation(
                        "Invalid PULSE_CHANNEL".to_string(),
                    ))
                }
            };
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let capture = &self.capture;
        if !(capture.fps.is_finite() && capture.fps > 0.0) {
            return Err(ConfigError::Validation(
                "capture.fps must be positive".to_string(),
            ));
        }
        if !(capture.buffer_duration_sec > 0.0) {
            return Err(ConfigError::Validation(
                "capture.buffer_duration_sec must be positive".to_string(),
            ));
        }
        if self.buffer_capacity() < 2 {
            return Err(ConfigError::Validation(
                "capture buffer must hold at least 2 samples".to_string(),
            ));
        }
        let shift = self.shift_samples();
        if shift == 0 || shift > self.buffer_capacity() {
            return Err(ConfigError::Validation(
                "capture.shift_duration_sec must cover 1..=buffer samples".to_string(),
            ));
        }
        if !(capture.discard_duration_sec >= 0.0) {
            return Err(ConfigError::Validation(
                "capture.discard_duration_sec must be >= 0".to_string(),
            ));
        }

        if !(self.band.low_bpm > 0.0) || self.band.high_bpm <= self.band.low_bpm {
            return Err(ConfigError::Validation(
                "band must satisfy 0 < low_bpm < high_bpm".to_string(),
            ));
        }
        if self.band.high_bpm / 60.0 > capture.fps / 2.0 {
            return Err(ConfigError::Validation(
                "band.high_bpm exceeds the Nyquist limit of capture.fps".to_string(),
            ));
        }

        let ica = &self.separation.ica;
        if ica.min_samples < 3 {
            return Err(ConfigError::Validation(
                "separation.ica.min_samples must be >= 3".to_string(),
            ));
        }
        if !(ica.epsilon > 0.0) {
            return Err(ConfigError::Validation(
                "separation.ica.epsilon must be positive".to_string(),
            ));
        }

        if !(self.normalization.std_floor > 0.0) {
            return Err(ConfigError::Validation(
                "normalization.std_floor must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Serialize to TOML string
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

fn seconds_to_frames(fps: f32, seconds: f32) -> usize {
    let frames = (fps * seconds).round();
    if frames.is_finite() && frames > 0.0 {
        frames as usize
    } else {
        0
    }
}

fn override_value<T, F>(lookup: &F, key: &str, target: &mut T) -> Result<(), ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup(key) {
        *target = val
            .trim()
            .parse()
            .map_err(|_| ConfigError::Validation(format!("Invalid {}", key)))?;
    }
    Ok(())
}
