//! DSP (Digital Signal Processing) module
//!
//! - `stats` - temporal mean/std and z-score normalization
//! - `fft` - radix-2 FFT engine with cached twiddle tables, padding, windowing
//! - `heart_rate` - band-limited spectral peak to BPM

pub mod fft;
pub mod heart_rate;
pub mod stats;

pub use fft::{
    frequency_axis, hann_window, pad, phase_spectrum, power_spectrum, reverse_bits,
    upper_power_of_two, ChannelSpectra, SpectralEngine, SpectralPair, TrigTables,
};
pub use heart_rate::{band_indices, compute_heart_rate, try_heart_rate, HeartRate};
pub use stats::{mean, normalize, normalize_with_floor, stddev, z_score, STD_FLOOR};
