//! Heart-rate extraction from a power spectrum
//!
//! Band-limited peak search. The spectrum is read as one-sided: with `N`
//! bins covering `[0, fps/2)`, the resolution is `fps / (2N)` Hz per bin.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SignalError};

/// Heart-rate estimate for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeartRate {
    Bpm(i32),
    Unknown,
}

impl HeartRate {
    /// Sentinel reported for an unknown heart rate.
    pub const UNKNOWN_SENTINEL: i32 = -1;

    pub fn bpm(self) -> Option<i32> {
        match self {
            Self::Bpm(bpm) => Some(bpm),
            Self::Unknown => None,
        }
    }

    pub fn is_known(self) -> bool {
        matches!(self, Self::Bpm(_))
    }

    /// Integer form with `-1` standing for unknown.
    pub fn to_sentinel(self) -> i32 {
        self.bpm().unwrap_or(Self::UNKNOWN_SENTINEL)
    }
}

impl From<Option<i32>> for HeartRate {
    fn from(value: Option<i32>) -> Self {
        value.map_or(Self::Unknown, Self::Bpm)
    }
}

impl fmt::Display for HeartRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bpm(bpm) => write!(f, "{} bpm", bpm),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

/// Bin range `[low, high]` (inclusive) covering a BPM band.
///
/// Indices are truncated and clamped to `[0, N-1]`. Fails when the spectrum
/// is empty or the clamped range is empty or inverted.
pub fn band_indices(
    spectrum_len: usize,
    low_bpm: f32,
    high_bpm: f32,
    fps: f32,
) -> Result<(usize, usize)> {
    if spectrum_len == 0 {
        return Err(SignalError::InsufficientData("empty power spectrum".to_string()));
    }
    let resolution = fps / (2.0 * spectrum_len as f32);
    let last = spectrum_len - 1;
    let to_index = |bpm: f32| -> usize {
        let idx = (bpm / 60.0) / resolution;
        if idx.is_finite() && idx > 0.0 {
            (idx as usize).min(last)
        } else {
            0
        }
    };

    let (low, high) = (to_index(low_bpm), to_index(high_bpm));
    if low >= high {
        return Err(SignalError::InsufficientData(format!(
            "band {}-{} bpm maps to empty bin range {}..={}",
            low_bpm, high_bpm, low, high
        )));
    }
    Ok((low, high))
}

/// Peak-frequency heart rate, surfacing an unusable band as an error.
pub fn try_heart_rate(spectrum: &[f32], low_bpm: f32, high_bpm: f32, fps: f32) -> Result<i32> {
    let (low, high) = band_indices(spectrum.len(), low_bpm, high_bpm, fps)?;
    if let Some(offset) = spectrum[low..=high].iter().position(|v| !v.is_finite()) {
        return Err(SignalError::InsufficientData(format!(
            "non-finite power in bin {}",
            low + offset
        )));
    }

    let mut best = low;
    let mut best_value = spectrum[low];
    for (i, &value) in spectrum.iter().enumerate().take(high + 1).skip(low) {
        // Strict comparison keeps the lowest-frequency bin on ties
        if value > best_value {
            best_value = value;
            best = i;
        }
    }

    let resolution = fps / (2.0 * spectrum.len() as f32);
    Ok((best as f32 * resolution * 60.0).round() as i32)
}

/// Peak-frequency heart rate; an unusable band yields [`HeartRate::Unknown`].
pub fn compute_heart_rate(spectrum: &[f32], low_bpm: f32, high_bpm: f32, fps: f32) -> HeartRate {
    match try_heart_rate(spectrum, low_bpm, high_bpm, fps) {
        Ok(bpm) => HeartRate::Bpm(bpm),
        Err(e) => {
            log::trace!("Heart rate unavailable: {}", e);
            HeartRate::Unknown
        }
    }
}
