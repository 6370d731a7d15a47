//! Blind source separation across colour channels
//!
//! - `FastIca` - symmetric FastICA (tanh) over the R, G, B traces
//! - `ComponentSelector` - strategy choosing the pulse-bearing source
//!   (`MaxVarianceSelector`, `SpectralPeakSelector`)

mod fastica;
mod selector;

pub use fastica::{FastIca, IcaConfig, Separation};
pub use selector::{ComponentSelector, MaxVarianceSelector, SelectorKind, SpectralPeakSelector};
