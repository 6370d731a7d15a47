//! FastICA over three colour channels
//!
//! Symmetric FastICA with a `tanh` contrast function:
//!
//! 1. Center each channel and whiten with `C^{-1/2}`, `C = XXᵗ/N`
//! 2. Start from `W = I` and run a fixed number of fixed-point updates
//!    `W⁺ = E{g(WX)Xᵗ} - diag(E{g'(WX)})·W`, each followed by symmetric
//!    decorrelation `W ← (W⁺W⁺ᵗ)^{-1/2}·W⁺`
//! 3. Recover `S = W·Xw`
//!
//! The iteration count bounds the per-cycle latency; there is no
//! convergence test, so `W` is an approximation rather than a fixed point.
//! State is rebuilt from identity on every call.

use log::trace;
use nalgebra::{Matrix3, Matrix3xX, SymmetricEigen, Vector3};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

use super::selector::ComponentSelector;
use crate::error::{Result, SignalError};

/// FastICA parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IcaConfig {
    /// Fixed number of fixed-point iterations per call
    pub iterations: usize,
    /// Added to eigenvalues before the inverse square root
    pub epsilon: f64,
    /// Inputs shorter than this are rejected
    pub min_samples: usize,
}

impl Default for IcaConfig {
    fn default() -> Self {
        Self {
            iterations: 200,
            epsilon: 1e-6,
            min_samples: 32,
        }
    }
}

/// Output of one separation run.
#[derive(Debug, Clone)]
pub struct Separation {
    /// The three recovered sources, each as long as the input
    pub components: [Array1<f32>; 3],
    /// Final unmixing matrix (applied to whitened data)
    pub unmixing: Matrix3<f64>,
    /// Index of the component chosen by the selector
    pub selected: usize,
}

impl Separation {
    pub fn selected_component(&self) -> &Array1<f32> {
        &self.components[self.selected]
    }

    pub fn into_selected(self) -> Array1<f32> {
        let [a, b, c] = self.components;
        match self.selected {
            0 => a,
            1 => b,
            _ => c,
        }
    }
}

/// Blind source separator for R, G, B traces.
#[derive(Debug, Clone, Default)]
pub struct FastIca {
    config: IcaConfig,
}

impl FastIca {
    pub fn new(config: IcaConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &IcaConfig {
        &self.config
    }

    /// Separate the channels and let `selector` pick the pulse component.
    pub fn separate(
        &self,
        r: &Array1<f32>,
        g: &Array1<f32>,
        b: &Array1<f32>,
        selector: &mut dyn ComponentSelector,
    ) -> Result<Separation> {
        let (sources, unmixing) = self.unmix(r, g, b)?;
        let components: [Array1<f32>; 3] = std::array::from_fn(|row| {
            sources.row(row).iter().map(|&v| v as f32).collect()
        });
        let selected = selector.select(&components).min(2);
        trace!(
            "FastICA selected component {} using {}",
            selected,
            selector.name()
        );
        Ok(Separation {
            components,
            unmixing,
            selected,
        })
    }

    /// Separate and return only the selected component.
    pub fn extract(
        &self,
        r: &Array1<f32>,
        g: &Array1<f32>,
        b: &Array1<f32>,
        selector: &mut dyn ComponentSelector,
    ) -> Result<Array1<f32>> {
        Ok(self.separate(r, g, b, selector)?.into_selected())
    }

    fn unmix(
        &self,
        r: &Array1<f32>,
        g: &Array1<f32>,
        b: &Array1<f32>,
    ) -> Result<(Matrix3xX<f64>, Matrix3<f64>)> {
        let n = r.len();
        for (name, len) in [("green", g.len()), ("blue", b.len())] {
            if len != n {
                return Err(SignalError::ChannelLengthMismatch {
                    channel: name,
                    len,
                    expected: n,
                });
            }
        }
        let min_samples = self.config.min_samples.max(3);
        if n < min_samples {
            return Err(SignalError::InsufficientData(format!(
                "source separation needs at least {} samples, got {}",
                min_samples, n
            )));
        }

        let eps = self.config.epsilon;
        let inv_n = 1.0 / n as f64;

        let mut x = Matrix3xX::from_fn(n, |row, col| {
            let v = match row {
                0 => r[col],
                1 => g[col],
                _ => b[col],
            };
            v as f64
        });
        center_rows(&mut x);

        let cov = (&x * x.transpose()) * inv_n;
        let xw = inverse_sqrt(cov, eps) * &x;

        let mut w = Matrix3::<f64>::identity();
        for _ in 0..self.config.iterations {
            let gwx = (w * &xw).map(f64::tanh);
            let mean_deriv = Vector3::from_fn(|row, _| {
                gwx.row(row).iter().map(|v| 1.0 - v * v).sum::<f64>() * inv_n
            });

            let w_new = (&gwx * xw.transpose()) * inv_n - Matrix3::from_diagonal(&mean_deriv) * w;
            w = inverse_sqrt(w_new * w_new.transpose(), eps) * w_new;
        }

        Ok((w * &xw, w))
    }
}

/// Subtract each row's mean.
fn center_rows(x: &mut Matrix3xX<f64>) {
    let n = x.ncols();
    if n == 0 {
        return;
    }
    for row in 0..3 {
        let mean = x.row(row).sum() / n as f64;
        for col in 0..n {
            x[(row, col)] -= mean;
        }
    }
}

/// `E·diag(1/√(λ+ε))·Eᵗ` for a symmetric 3×3 matrix.
///
/// Eigenvalues that came out slightly negative are clamped to zero first.
fn inverse_sqrt(m: Matrix3<f64>, eps: f64) -> Matrix3<f64> {
    let eigen = SymmetricEigen::new(m);
    let scale = eigen
        .eigenvalues
        .map(|lambda| 1.0 / (lambda.max(0.0) + eps).sqrt());
    eigen.eigenvectors * Matrix3::from_diagonal(&scale) * eigen.eigenvectors.transpose()
}
