//! Pulse-component selection strategies
//!
//! FastICA returns its sources in arbitrary order, sign and scale. A
//! [`ComponentSelector`] decides which one carries the cardiac pulse.

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::dsp::fft::SpectralEngine;
use crate::dsp::heart_rate::band_indices;
use crate::dsp::stats::{stddev, z_score};

/// Picks the pulse-bearing component out of a separation result.
pub trait ComponentSelector: Send {
    /// Index (0..3) of the chosen component.
    fn select(&mut self, components: &[Array1<f32>; 3]) -> usize;

    fn name(&self) -> &'static str;
}

/// Selector kinds that can be named in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorKind {
    #[default]
    MaxVariance,
    SpectralPeak,
}

impl SelectorKind {
    /// Instantiate the selector. `fps` and the BPM band are only used by
    /// [`SpectralPeakSelector`].
    pub fn build(self, fps: f32, low_bpm: f32, high_bpm: f32) -> Box<dyn ComponentSelector> {
        match self {
            SelectorKind::MaxVariance => Box::new(MaxVarianceSelector),
            SelectorKind::SpectralPeak => {
                Box::new(SpectralPeakSelector::new(fps, low_bpm, high_bpm))
            }
        }
    }
}

/// Largest population standard deviation wins; ties go to the lower index.
///
/// This is the only rule applied: no confidence threshold and no secondary
/// tie-break. After whitening every component has near-unit variance, so
/// the choice is weakly determined.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxVarianceSelector;

impl ComponentSelector for MaxVarianceSelector {
    fn select(&mut self, components: &[Array1<f32>; 3]) -> usize {
        let mut best = 0;
        let mut max_std = 0.0f32;
        for (i, component) in components.iter().enumerate() {
            let std = stddev(component);
            if std > max_std {
                max_std = std;
                best = i;
            }
        }
        best
    }

    fn name(&self) -> &'static str {
        "max-variance"
    }
}

/// Sharpest spectral peak inside the cardiac band wins.
///
/// Score = power in the strongest in-band bin and its two neighbours,
/// divided by the total power of the one-sided spectrum. Slow drift keeps
/// its energy out of band and broadband noise spreads it, so both score low.
/// Components whose band is unusable score 0.
#[derive(Debug, Default)]
pub struct SpectralPeakSelector {
    fps: f32,
    low_bpm: f32,
    high_bpm: f32,
    engine: SpectralEngine,
}

impl SpectralPeakSelector {
    pub fn new(fps: f32, low_bpm: f32, high_bpm: f32) -> Self {
        Self {
            fps,
            low_bpm,
            high_bpm,
            engine: SpectralEngine::new(),
        }
    }

    /// Peak concentration of one component, 0.0..=1.0.
    pub fn score(&mut self, component: &Array1<f32>) -> f32 {
        let spectrum = match self.engine.compute_spectrum(&z_score(component)) {
            Ok(spectrum) => spectrum,
            Err(_) => return 0.0,
        };
        let power: Vec<f32> = spectrum
            .iter()
            .take(spectrum.len() / 2)
            .map(|m| m * m)
            .collect();
        let (low, high) = match band_indices(power.len(), self.low_bpm, self.high_bpm, self.fps) {
            Ok(range) => range,
            Err(_) => return 0.0,
        };

        let mut peak = low;
        for i in low..=high {
            if power[i] > power[peak] {
                peak = i;
            }
        }
        let lobe: f32 = power[peak.saturating_sub(1)..(peak + 2).min(power.len())]
            .iter()
            .sum();
        let total: f32 = power.iter().sum();
        if total > 0.0 {
            lobe / total
        } else {
            0.0
        }
    }
}

impl ComponentSelector for SpectralPeakSelector {
    fn select(&mut self, components: &[Array1<f32>; 3]) -> usize {
        let mut best = 0;
        let mut best_score = 0.0f32;
        for (i, component) in components.iter().enumerate() {
            let score = self.score(component);
            if score > best_score {
                best_score = score;
                best = i;
            }
        }
        best
    }

    fn name(&self) -> &'static str {
        "spectral-peak"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::f32::consts::PI;

    fn tone(n: usize, hz: f32, fps: f32, amp: f32) -> Array1<f32> {
        (0..n).map(|i| amp * (2.0 * PI * hz * i as f32 / fps).sin()).collect()
    }

    #[test]
    fn test_max_variance_picks_loudest() {
        let components = [
            tone(100, 1.0, 30.0, 1.0),
            tone(100, 1.0, 30.0, 3.0),
            tone(100, 2.0, 30.0, 2.0),
        ];
        assert_eq!(MaxVarianceSelector.select(&components), 1);
    }

    #[test]
    fn test_max_variance_ties_keep_first() {
        let c = tone(64, 1.0, 30.0, 1.0);
        let components = [c.clone(), c.clone(), c];
        assert_eq!(MaxVarianceSelector.select(&components), 0);
    }

    #[test]
    fn test_spectral_peak_prefers_in_band_tone() {
        let fps = 15.0;
        let n = 150;
        let mut rng = StdRng::seed_from_u64(3);
        // 0.2 Hz drift (12 bpm), broadband noise, 1.2 Hz pulse (72 bpm)
        let drift = tone(n, 0.2, fps, 2.0);
        let noise: Array1<f32> = (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let pulse = tone(n, 1.2, fps, 1.0);

        let mut selector = SpectralPeakSelector::new(fps, 50.0, 150.0);
        let components = [drift, noise, pulse];
        assert_eq!(selector.select(&components), 2);
        assert!(selector.score(&components[2]) > selector.score(&components[1]));
    }

    #[test]
    fn test_spectral_peak_flat_component_scores_zero() {
        let mut selector = SpectralPeakSelector::new(15.0, 50.0, 150.0);
        assert_eq!(selector.score(&Array1::zeros(128)), 0.0);
    }

    #[test]
    fn test_selector_kind_builds_named_strategy() {
        assert_eq!(SelectorKind::MaxVariance.build(15.0, 50.0, 150.0).name(), "max-variance");
        assert_eq!(SelectorKind::SpectralPeak.build(15.0, 50.0, 150.0).name(), "spectral-peak");
        assert_eq!(SelectorKind::default(), SelectorKind::MaxVariance);
    }
}
