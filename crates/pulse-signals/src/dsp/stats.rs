//! Temporal statistics and z-score normalization
//!
//! Whole-window statistics used once per processing cycle: the buffer is
//! reduced to its mean and population standard deviation, then normalized
//! so the spectral stage sees a zero-mean, unit-variance signal.

use ndarray::Array1;

/// Standard deviations below this floor are replaced by 1.0 in [`normalize`].
pub const STD_FLOOR: f32 = 1e-6;

/// Arithmetic mean. Returns 0 for an empty signal.
pub fn mean(signal: &Array1<f32>) -> f32 {
    if signal.is_empty() {
        return 0.0;
    }
    let sum: f64 = signal.iter().map(|&x| x as f64).sum();
    (sum / signal.len() as f64) as f32
}

/// Population standard deviation computed as `sqrt(E[x²] - E[x]²)`.
///
/// Returns 0 for an empty signal. Accumulation runs in f64; a slightly
/// negative variance left over from cancellation is clamped to 0.
pub fn stddev(signal: &Array1<f32>) -> f32 {
    if signal.is_empty() {
        return 0.0;
    }
    let n = signal.len() as f64;
    let avg = mean(signal) as f64;
    let sq_sum: f64 = signal.iter().map(|&x| (x as f64) * (x as f64)).sum();
    let variance = (sq_sum / n - avg * avg).max(0.0);
    variance.sqrt() as f32
}

/// Elementwise `(x - mean) / std`.
///
/// A `std` below [`STD_FLOOR`] is substituted by 1.0, so a flat signal comes
/// back merely centered instead of blowing up.
pub fn normalize(signal: &Array1<f32>, mean: f32, std: f32) -> Array1<f32> {
    normalize_with_floor(signal, mean, std, STD_FLOOR)
}

/// [`normalize`] with an explicit standard-deviation floor.
pub fn normalize_with_floor(signal: &Array1<f32>, mean: f32, std: f32, floor: f32) -> Array1<f32> {
    let std = if std < floor { 1.0 } else { std };
    signal.mapv(|x| (x - mean) / std)
}

/// Normalize a signal by its own mean and standard deviation.
pub fn z_score(signal: &Array1<f32>) -> Array1<f32> {
    normalize(signal, mean(signal), stddev(signal))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mean_and_std_known_values() {
        let signal = Array1::from(vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_relative_eq!(mean(&signal), 3.0, epsilon = 1e-6);
        // Population std of [1..5] is sqrt(2)
        assert_relative_eq!(stddev(&signal), std::f32::consts::SQRT_2, epsilon = 1e-5);
    }

    #[test]
    fn test_empty_signal_stats_are_zero() {
        let empty = Array1::<f32>::zeros(0);
        assert_eq!(mean(&empty), 0.0);
        assert_eq!(stddev(&empty), 0.0);
        assert!(normalize(&empty, 0.0, 0.0).is_empty());
    }

    #[test]
    fn test_constant_signal_std_is_zero_not_nan() {
        let signal = Array1::from(vec![128.33f32; 150]);
        let std = stddev(&signal);
        assert!(std.is_finite());
        assert!(std < 1e-3);
    }

    #[test]
    fn test_normalize_floors_small_std() {
        let signal = Array1::from(vec![5.0, 5.0, 5.0]);
        let out = normalize(&signal, 5.0, 1e-9);
        assert!(out.iter().all(|&x| x == 0.0));

        let shifted = normalize(&Array1::from(vec![6.0, 4.0]), 5.0, 0.0);
        assert_eq!(shifted.to_vec(), vec![1.0, -1.0]);
    }

    #[test]
    fn test_z_score_is_unit_variance() {
        let signal: Array1<f32> = (0..200)
            .map(|i| 100.0 + 3.0 * (i as f32 * 0.3).sin())
            .collect();
        let z = z_score(&signal);
        assert_relative_eq!(mean(&z), 0.0, epsilon = 1e-4);
        assert_relative_eq!(stddev(&z), 1.0, epsilon = 1e-3);
    }
}
