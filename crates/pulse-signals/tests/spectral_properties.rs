//! Property tests for the padding, bit-reversal and transform invariants.

use approx::assert_relative_eq;
use ndarray::Array1;
use proptest::prelude::*;
use pulse_signals::dsp::{hann_window, pad, reverse_bits, upper_power_of_two, SpectralEngine};

fn signal_strategy(max_len: usize) -> impl Strategy<Value = Vec<f32>> {
    prop::collection::vec(-100.0f32..100.0, 1..max_len)
}

proptest! {
    #[test]
    fn test_pad_is_identity_on_powers_of_two(exp in 0u32..10, seed in -10.0f32..10.0) {
        let n = 1usize << exp;
        let signal: Array1<f32> = (0..n).map(|i| seed + i as f32).collect();
        prop_assert_eq!(pad(&signal), signal);
    }

    #[test]
    fn test_pad_zero_fills_to_next_power(values in signal_strategy(600)) {
        let n = values.len();
        let signal = Array1::from(values.clone());
        let padded = pad(&signal);

        prop_assert!(padded.len().is_power_of_two());
        prop_assert!(padded.len() >= n);
        prop_assert!(padded.len() < 2 * n.max(1));
        prop_assert_eq!(padded.len(), upper_power_of_two(n));
        for (i, &v) in values.iter().enumerate() {
            prop_assert_eq!(padded[i], v);
        }
        prop_assert!(padded.iter().skip(n).all(|&v| v == 0.0));
    }

    #[test]
    fn test_reverse_bits_is_an_involution(bits in 1u32..16, raw in 0usize..65536) {
        let x = raw & ((1usize << bits) - 1);
        prop_assert_eq!(reverse_bits(reverse_bits(x, bits), bits), x);
    }

    #[test]
    fn test_zero_signal_transforms_to_zero(exp in 0u32..11) {
        let n = 1usize << exp;
        let mut real = vec![0.0f32; n];
        let mut imag = vec![0.0f32; n];
        SpectralEngine::new().transform(&mut real, &mut imag).unwrap();
        prop_assert!(real.iter().chain(imag.iter()).all(|&v| v == 0.0));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_parseval_energy(values in signal_strategy(300)) {
        let windowed = hann_window(&pad(&Array1::from(values)));
        let n = windowed.len() as f64;

        let time_energy: f64 = windowed.iter().map(|&x| (x as f64).powi(2)).sum();
        let mut engine = SpectralEngine::new();
        let magnitudes = engine.forward(&windowed).unwrap().power_spectrum();
        let freq_energy: f64 = magnitudes.iter().map(|&m| (m as f64).powi(2)).sum();

        let expected = n * time_energy;
        let tolerance = 1e-3 * expected.max(1.0);
        prop_assert!(
            (freq_energy - expected).abs() <= tolerance,
            "sum|X|^2 = {}, n * sum|x|^2 = {}",
            freq_energy,
            expected
        );
    }
}

#[test]
fn test_known_dft_vector() {
    let mut engine = SpectralEngine::new();
    let spectrum = engine
        .forward(&Array1::from(vec![1.0f32, 0.0, -1.0, 0.0]))
        .unwrap()
        .power_spectrum();
    let expected = [0.0f32, 2.0, 0.0, 2.0];
    for (got, want) in spectrum.iter().zip(expected) {
        assert_relative_eq!(*got, want, epsilon = 1e-5);
    }
}

#[test]
fn test_tables_follow_transform_length() {
    let mut engine = SpectralEngine::new();
    // 150 pads to 256, 100 pads to 128
    engine.compute_spectrum(&Array1::from(vec![1.0f32; 150])).unwrap();
    assert_eq!(engine.cached_len(), Some(256));
    engine.compute_spectrum(&Array1::from(vec![1.0f32; 200])).unwrap();
    assert_eq!(engine.table_rebuilds(), 1);
    engine.compute_spectrum(&Array1::from(vec![1.0f32; 100])).unwrap();
    assert_eq!(engine.cached_len(), Some(128));
    assert_eq!(engine.table_rebuilds(), 2);
}
