//! Radix-2 spectral transform engine
//!
//! Iterative Cooley-Tukey FFT (decimation in time) over real input, plus the
//! pre/post steps the heart-rate path needs: zero padding to a power of two,
//! Hann windowing, power and phase spectra.
//!
//! The twiddle factors live in a [`TrigTables`] owned by the
//! [`SpectralEngine`]. The tables are only valid for the transform length they
//! were built for; padding can change that length between cycles, so every
//! call checks it and rebuilds on a mismatch.

use std::f64::consts::PI;

use log::debug;
use ndarray::{s, Array1};
use num_complex::Complex32;

use crate::error::{Result, SignalError};

/// Smallest power of two `>= v`, via bit smearing.
///
/// `upper_power_of_two(0)` is defined as 1.
pub fn upper_power_of_two(v: usize) -> usize {
    if v == 0 {
        return 1;
    }
    let mut v = v - 1;
    let mut shift = 1;
    while shift < usize::BITS {
        v |= v >> shift;
        shift <<= 1;
    }
    v.wrapping_add(1)
}

/// Reverse the low `bits` bits of `x`.
pub fn reverse_bits(mut x: usize, bits: u32) -> usize {
    let mut result = 0;
    for _ in 0..bits {
        result = (result << 1) | (x & 1);
        x >>= 1;
    }
    result
}

/// Zero-pad a signal up to the next power of two.
///
/// Power-of-two lengths come back unchanged. An empty signal becomes a
/// single zero sample.
pub fn pad(signal: &Array1<f32>) -> Array1<f32> {
    let n = signal.len();
    if n.is_power_of_two() {
        return signal.clone();
    }
    let mut padded = Array1::zeros(upper_power_of_two(n));
    padded.slice_mut(s![..n]).assign(signal);
    padded
}

/// Apply a Hann window `0.5 * (1 - cos(2πi / (n-1)))`.
///
/// The window is undefined for a single sample (`n - 1 == 0`); signals
/// shorter than two samples are returned unchanged.
pub fn hann_window(signal: &Array1<f32>) -> Array1<f32> {
    let n = signal.len();
    if n < 2 {
        return signal.clone();
    }
    let denom = (n - 1) as f64;
    signal
        .iter()
        .enumerate()
        .map(|(i, &x)| {
            let w = 0.5 * (1.0 - (2.0 * PI * i as f64 / denom).cos());
            (w * x as f64) as f32
        })
        .collect()
}

/// Elementwise magnitude `sqrt(re² + im²)`.
pub fn power_spectrum(real: &[f32], imag: &[f32]) -> Result<Array1<f32>> {
    check_shape(real, imag)?;
    Ok(real
        .iter()
        .zip(imag)
        .map(|(&re, &im)| (re * re + im * im).sqrt())
        .collect())
}

/// Elementwise angle `atan2(im, re)`.
pub fn phase_spectrum(real: &[f32], imag: &[f32]) -> Result<Array1<f32>> {
    check_shape(real, imag)?;
    Ok(real
        .iter()
        .zip(imag)
        .map(|(&re, &im)| im.atan2(re))
        .collect())
}

/// Frequency in Hz of each of the `n` bins: `k * fps / n`.
pub fn frequency_axis(n: usize, fps: f32) -> Array1<f32> {
    if n == 0 {
        return Array1::zeros(0);
    }
    (0..n).map(|k| k as f32 * fps / n as f32).collect()
}

fn check_shape(real: &[f32], imag: &[f32]) -> Result<()> {
    if real.len() != imag.len() {
        return Err(SignalError::ShapeMismatch {
            real: real.len(),
            imag: imag.len(),
        });
    }
    Ok(())
}

/// Cosine/sine twiddle tables for one transform length.
#[derive(Debug, Clone)]
pub struct TrigTables {
    transform_len: usize,
    cos: Vec<f64>,
    sin: Vec<f64>,
}

impl TrigTables {
    /// Build `n/2` entries of `cos(2πi/n)` and `sin(2πi/n)`.
    pub fn new(n: usize) -> Self {
        let half = n / 2;
        let step = if n == 0 { 0.0 } else { 2.0 * PI / n as f64 };
        Self {
            transform_len: n,
            cos: (0..half).map(|i| (step * i as f64).cos()).collect(),
            sin: (0..half).map(|i| (step * i as f64).sin()).collect(),
        }
    }

    /// Transform length these tables are valid for.
    pub fn transform_len(&self) -> usize {
        self.transform_len
    }

    pub fn cos(&self) -> &[f64] {
        &self.cos
    }

    pub fn sin(&self) -> &[f64] {
        &self.sin
    }
}

/// Real and imaginary FFT output of equal length.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralPair {
    pub real: Array1<f32>,
    pub imag: Array1<f32>,
}

impl SpectralPair {
    pub fn new(real: Array1<f32>, imag: Array1<f32>) -> Result<Self> {
        if real.len() != imag.len() {
            return Err(SignalError::ShapeMismatch {
                real: real.len(),
                imag: imag.len(),
            });
        }
        Ok(Self { real, imag })
    }

    pub fn len(&self) -> usize {
        self.real.len()
    }

    pub fn is_empty(&self) -> bool {
        self.real.is_empty()
    }

    /// Magnitude per bin.
    pub fn power_spectrum(&self) -> Array1<f32> {
        self.real
            .iter()
            .zip(self.imag.iter())
            .map(|(&re, &im)| (re * re + im * im).sqrt())
            .collect()
    }

    /// Angle per bin.
    pub fn phase_spectrum(&self) -> Array1<f32> {
        self.real
            .iter()
            .zip(self.imag.iter())
            .map(|(&re, &im)| im.atan2(re))
            .collect()
    }

    pub fn to_complex(&self) -> Vec<Complex32> {
        self.real
            .iter()
            .zip(self.imag.iter())
            .map(|(&re, &im)| Complex32::new(re, im))
            .collect()
    }
}

/// Power spectra of several equal-length signals with their shared
/// frequency axis.
#[derive(Debug, Clone)]
pub struct ChannelSpectra {
    /// Bin frequencies in Hz (length = padded transform length)
    pub frequencies: Array1<f32>,
    /// One power spectrum per input signal, in input order
    pub spectra: Vec<Array1<f32>>,
}

/// FFT engine owning the twiddle-table cache.
///
/// Transforms take `&mut self`: the cache is per-instance state, so an engine
/// shared across threads needs external synchronization.
#[derive(Debug, Default)]
pub struct SpectralEngine {
    tables: Option<TrigTables>,
    table_rebuilds: usize,
}

impl SpectralEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times the twiddle tables have been (re)built.
    pub fn table_rebuilds(&self) -> usize {
        self.table_rebuilds
    }

    /// Transform length of the currently cached tables, if any.
    pub fn cached_len(&self) -> Option<usize> {
        self.tables.as_ref().map(TrigTables::transform_len)
    }

    fn tables_for(&mut self, n: usize) -> &TrigTables {
        let stale = self
            .tables
            .as_ref()
            .map_or(true, |t| t.transform_len() != n);
        if stale {
            debug!(
                "Rebuilding trig tables: {:?} -> {} samples",
                self.cached_len(),
                n
            );
            self.tables = None;
            self.table_rebuilds += 1;
        }
        self.tables.get_or_insert_with(|| TrigTables::new(n))
    }

    /// In-place forward FFT of `real + i*imag`.
    ///
    /// # Errors
    /// * `ShapeMismatch` if the two arrays differ in length
    /// * `InvalidLength` if the length is not a power of two
    pub fn transform(&mut self, real: &mut [f32], imag: &mut [f32]) -> Result<()> {
        check_shape(real, imag)?;

        let n = real.len();
        let mut levels = 0u32;
        let mut temp = n;
        while temp > 1 {
            levels += 1;
            temp >>= 1;
        }
        if n == 0 || 1usize << levels != n {
            return Err(SignalError::InvalidLength(n));
        }

        let tables = self.tables_for(n);

        // Bit-reversed addressing permutation
        for i in 0..n {
            let j = reverse_bits(i, levels);
            if j > i {
                real.swap(i, j);
                imag.swap(i, j);
            }
        }

        let mut size = 2;
        while size <= n {
            let half = size / 2;
            let table_step = n / size;
            for start in (0..n).step_by(size) {
                for offset in 0..half {
                    let lo = start + offset;
                    let hi = lo + half;
                    let k = offset * table_step;
                    let (c, s) = (tables.cos[k], tables.sin[k]);

                    // Both outputs depend on the untouched inputs
                    let (re_hi, im_hi) = (real[hi] as f64, imag[hi] as f64);
                    let (re_lo, im_lo) = (real[lo] as f64, imag[lo] as f64);
                    let tpre = re_hi * c + im_hi * s;
                    let tpim = -re_hi * s + im_hi * c;

                    real[hi] = (re_lo - tpre) as f32;
                    imag[hi] = (im_lo - tpim) as f32;
                    real[lo] = (re_lo + tpre) as f32;
                    imag[lo] = (im_lo + tpim) as f32;
                }
            }
            if size == n {
                break;
            }
            size *= 2;
        }

        Ok(())
    }

    /// FFT of a real signal whose length is already a power of two.
    pub fn forward(&mut self, signal: &Array1<f32>) -> Result<SpectralPair> {
        let mut real = signal.to_vec();
        let mut imag = vec![0.0f32; real.len()];
        self.transform(&mut real, &mut imag)?;
        SpectralPair::new(Array1::from(real), Array1::from(imag))
    }

    /// Full spectral path: pad -> Hann window -> FFT -> power spectrum.
    ///
    /// The result has the padded length; bin `k` is `k * fps / len` Hz.
    pub fn compute_spectrum(&mut self, signal: &Array1<f32>) -> Result<Array1<f32>> {
        let windowed = hann_window(&pad(signal));
        Ok(self.forward(&windowed)?.power_spectrum())
    }

    /// Power spectra for several signals sharing one frequency axis.
    pub fn compute_channel_spectra(
        &mut self,
        signals: &[Array1<f32>],
        fps: f32,
    ) -> Result<ChannelSpectra> {
        let first = signals.first().ok_or_else(|| {
            SignalError::InsufficientData("no signals to transform".to_string())
        })?;
        let n = first.len();
        if let Some(other) = signals.iter().find(|s| s.len() != n) {
            return Err(SignalError::ShapeMismatch {
                real: n,
                imag: other.len(),
            });
        }

        let spectra = signals
            .iter()
            .map(|s| self.compute_spectrum(s))
            .collect::<Result<Vec<_>>>()?;

        Ok(ChannelSpectra {
            frequencies: frequency_axis(upper_power_of_two(n), fps),
            spectra,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rustfft::FftPlanner;

    #[test]
    fn test_upper_power_of_two() {
        assert_eq!(upper_power_of_two(0), 1);
        assert_eq!(upper_power_of_two(1), 1);
        assert_eq!(upper_power_of_two(2), 2);
        assert_eq!(upper_power_of_two(3), 4);
        assert_eq!(upper_power_of_two(5), 8);
        assert_eq!(upper_power_of_two(150), 256);
        assert_eq!(upper_power_of_two(256), 256);
        assert_eq!(upper_power_of_two(257), 512);
    }

    #[test]
    fn test_reverse_bits() {
        assert_eq!(reverse_bits(0b001, 3), 0b100);
        assert_eq!(reverse_bits(0b110, 3), 0b011);
        assert_eq!(reverse_bits(1, 0), 0);
        // Bits above the width are dropped
        assert_eq!(reverse_bits(0b1_0001, 4), 0b1000);
    }

    #[test]
    fn test_pad_non_power_of_two() {
        let signal = Array1::from(vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        let padded = pad(&signal);
        assert_eq!(padded.to_vec(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 0.0, 0.0, 0.0]);

        assert_eq!(pad(&Array1::zeros(0)).to_vec(), vec![0.0]);
    }

    #[test]
    fn test_hann_window_shape() {
        let ones = Array1::from(vec![1.0f32; 9]);
        let w = hann_window(&ones);
        assert_relative_eq!(w[0], 0.0, epsilon = 1e-6);
        assert_relative_eq!(w[8], 0.0, epsilon = 1e-6);
        assert_relative_eq!(w[4], 1.0, epsilon = 1e-6);
        assert_relative_eq!(w[2], 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_hann_window_degenerate_lengths() {
        assert_eq!(hann_window(&Array1::from(vec![3.5])).to_vec(), vec![3.5]);
        assert!(hann_window(&Array1::zeros(0)).is_empty());
    }

    #[test]
    fn test_known_dft_vector() {
        let mut engine = SpectralEngine::new();
        let pair = engine
            .forward(&Array1::from(vec![1.0, 0.0, -1.0, 0.0]))
            .unwrap();
        let power = pair.power_spectrum();
        for (got, want) in power.iter().zip([0.0, 2.0, 0.0, 2.0]) {
            assert_relative_eq!(*got, want, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_impulse_has_flat_spectrum() {
        let mut engine = SpectralEngine::new();
        let mut impulse = Array1::zeros(16);
        impulse[0] = 1.0;
        let pair = engine.forward(&impulse).unwrap();
        assert!(pair.power_spectrum().iter().all(|&m| (m - 1.0).abs() < 1e-6));
        assert!(pair.phase_spectrum().iter().all(|&p| p.abs() < 1e-6));
    }

    #[test]
    fn test_phase_of_shifted_impulse() {
        let mut engine = SpectralEngine::new();
        let pair = engine
            .forward(&Array1::from(vec![0.0, 1.0, 0.0, 0.0]))
            .unwrap();
        // X[k] = e^{-i 2πk/4}
        let phase = pair.phase_spectrum();
        assert_relative_eq!(phase[0], 0.0, epsilon = 1e-6);
        assert_relative_eq!(phase[1], -std::f32::consts::FRAC_PI_2, epsilon = 1e-6);
        assert_relative_eq!(phase[3], std::f32::consts::FRAC_PI_2, epsilon = 1e-6);
    }

    #[test]
    fn test_transform_rejects_bad_shapes() {
        let mut engine = SpectralEngine::new();

        let mut re = vec![0.0; 6];
        let mut im = vec![0.0; 6];
        assert_eq!(
            engine.transform(&mut re, &mut im),
            Err(SignalError::InvalidLength(6))
        );

        let mut re = vec![0.0; 4];
        let mut im = vec![0.0; 8];
        assert!(matches!(
            engine.transform(&mut re, &mut im),
            Err(SignalError::ShapeMismatch { real: 4, imag: 8 })
        ));

        assert_eq!(
            engine.transform(&mut [], &mut []),
            Err(SignalError::InvalidLength(0))
        );
    }

    #[test]
    fn test_single_sample_transform_is_identity() {
        let mut engine = SpectralEngine::new();
        let pair = engine.forward(&Array1::from(vec![2.5])).unwrap();
        assert_eq!(pair.real.to_vec(), vec![2.5]);
        assert_eq!(pair.imag.to_vec(), vec![0.0]);
    }

    #[test]
    fn test_tables_rebuilt_only_on_length_change() {
        let mut engine = SpectralEngine::new();
        assert_eq!(engine.cached_len(), None);

        engine.forward(&Array1::zeros(8)).unwrap();
        engine.forward(&Array1::ones(8)).unwrap();
        assert_eq!(engine.table_rebuilds(), 1);
        assert_eq!(engine.cached_len(), Some(8));

        engine.forward(&Array1::zeros(16)).unwrap();
        assert_eq!(engine.table_rebuilds(), 2);
        assert_eq!(engine.cached_len(), Some(16));

        // Going back must rebuild again, and the result must still be right
        let pair = engine
            .forward(&Array1::from(vec![1.0, 0.0, -1.0, 0.0, 1.0, 0.0, -1.0, 0.0]))
            .unwrap();
        assert_eq!(engine.table_rebuilds(), 3);
        let power = pair.power_spectrum();
        assert_relative_eq!(power[2], 4.0, epsilon = 1e-5);
        assert_relative_eq!(power[6], 4.0, epsilon = 1e-5);
        assert_relative_eq!(power[0], 0.0, epsilon = 1e-5);
    }

    #[test]
    fn test_matches_rustfft() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut engine = SpectralEngine::new();
        let mut planner = FftPlanner::<f32>::new();

        for &n in &[2usize, 8, 64, 512] {
            let signal: Array1<f32> = (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect();
            let ours = engine.forward(&signal).unwrap().to_complex();

            let mut reference: Vec<Complex32> =
                signal.iter().map(|&x| Complex32::new(x, 0.0)).collect();
            planner.plan_fft_forward(n).process(&mut reference);

            for (a, b) in ours.iter().zip(reference.iter()) {
                assert!((a - b).norm() < 1e-3, "n={}: {} vs {}", n, a, b);
            }
        }
    }

    #[test]
    fn test_power_and_phase_shape_checks() {
        assert!(power_spectrum(&[1.0, 2.0], &[0.0]).is_err());
        assert!(phase_spectrum(&[1.0], &[0.0, 1.0]).is_err());
        let p = power_spectrum(&[3.0], &[4.0]).unwrap();
        assert_relative_eq!(p[0], 5.0);
        assert!(SpectralPair::new(Array1::zeros(2), Array1::zeros(3)).is_err());
    }

    #[test]
    fn test_compute_spectrum_pads_to_power_of_two() {
        let mut engine = SpectralEngine::new();
        let signal: Array1<f32> = (0..150).map(|i| (i as f32 * 0.4).sin()).collect();
        let spectrum = engine.compute_spectrum(&signal).unwrap();
        assert_eq!(spectrum.len(), 256);
        assert!(spectrum.iter().all(|&m| m >= 0.0 && m.is_finite()));
    }

    #[test]
    fn test_frequency_axis() {
        let axis = frequency_axis(8, 16.0);
        assert_eq!(axis.to_vec(), vec![0.0, 2.0, 4.0, 6.0, 8.0, 10.0, 12.0, 14.0]);
        assert!(frequency_axis(0, 30.0).is_empty());
    }

    #[test]
    fn test_channel_spectra() {
        let mut engine = SpectralEngine::new();
        let signals = vec![
            Array1::from(vec![1.0f32; 100]),
            Array1::from(vec![0.0f32; 100]),
        ];
        let out = engine.compute_channel_spectra(&signals, 15.0).unwrap();
        assert_eq!(out.frequencies.len(), 128);
        assert_eq!(out.spectra.len(), 2);
        assert!(out.spectra[1].iter().all(|&m| m == 0.0));
        assert_relative_eq!(out.frequencies[1], 15.0 / 128.0);

        let uneven = vec![Array1::zeros(4), Array1::zeros(5)];
        assert!(engine.compute_channel_spectra(&uneven, 15.0).is_err());
        assert!(matches!(
            engine.compute_channel_spectra(&[], 15.0),
            Err(SignalError::InsufficientData(_))
        ));
    }
}
