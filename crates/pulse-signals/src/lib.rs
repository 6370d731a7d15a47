//! # pulse-signals
//!
//! Remote photoplethysmography (rPPG) core: heart rate from the periodic
//! colour changes of facial skin.
//!
//! This crate provides:
//! - **Channel buffers**: sliding R, G, B windows with a fixed shift
//! - **Source separation**: FastICA over the three channels with pluggable
//!   pulse-component selection
//! - **DSP**: temporal normalization, a radix-2 FFT with cached twiddle
//!   tables, and band-limited peak-to-BPM extraction
//! - **Pipeline**: the per-cycle driver tying these together
//!
//! Frame capture and face detection are external; callers feed one mean
//! RGB triplet per frame (see [`roi`] for the reduction step).
//!
//! ## Example
//!
//! ```ignore
//! use pulse_signals::{PulseConfig, PulsePipeline};
//!
//! let mut pipeline = PulsePipeline::new(PulseConfig::default())?;
//!
//! for rgb in forehead_means {
//!     if let Some(cycle) = pipeline.ingest(rgb)? {
//!         println!("Heart rate: {}", cycle.heart_rate);
//!     }
//! }
//! ```

pub mod buffer;
pub mod config;
pub mod dsp;
pub mod error;
pub mod ica;
pub mod pipeline;
pub mod roi;

pub use buffer::{Channel, ChannelBuffers};
pub use config::{ConfigError, PulseConfig};
pub use dsp::{HeartRate, SpectralEngine};
pub use error::{Result, SignalError};
pub use ica::{ComponentSelector, FastIca, IcaConfig, SelectorKind};
pub use pipeline::{CycleOutput, FrameStatus, PulsePipeline, SignalSource};
pub use roi::{extract_roi_mean_rgb, forehead_roi, Rect};
