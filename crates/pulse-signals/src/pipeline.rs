//! Heart-rate pipeline driver
//!
//! Owns the channel buffers, the spectral engine and the source separator,
//! and runs one processing cycle per buffer-full event:
//!
//! ```text
//! R,G,B buffers -> [FastICA + selector | channel of interest] -> z-score
//!               -> pad -> Hann -> FFT -> power spectrum -> band peak -> BPM
//! ```
//!
//! A cycle reads the buffers completely before [`PulsePipeline::shift_buffers`]
//! mutates them; [`PulsePipeline::ingest`] enforces that order for callers
//! feeding frames one at a time.

use log::{debug, info, trace, warn};
use ndarray::Array1;

use crate::buffer::{Channel, ChannelBuffers};
use crate::config::PulseConfig;
use crate::dsp::fft::{frequency_axis, SpectralEngine};
use crate::dsp::heart_rate::{compute_heart_rate, HeartRate};
use crate::dsp::stats::{mean, normalize_with_floor, stddev};
use crate::error::{Result, SignalError};
use crate::ica::{ComponentSelector, FastIca};

/// Where the fused signal of a cycle came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalSource {
    /// Raw colour channel
    Channel(Channel),
    /// FastICA component with this index
    Separated(usize),
}

/// Everything a cycle produces for display and downstream use.
#[derive(Debug, Clone)]
pub struct CycleOutput {
    /// Power spectrum of the padded, windowed signal (all `n` bins)
    pub power_spectrum: Array1<f32>,
    /// Bin frequencies in Hz, same length as `power_spectrum`
    pub frequencies: Array1<f32>,
    pub heart_rate: HeartRate,
    pub source: SignalSource,
    /// Normalized signal the spectrum was computed from
    pub fused_signal: Array1<f32>,
}

impl CycleOutput {
    /// Output of a cycle that produced no estimate.
    pub fn unknown(source: SignalSource) -> Self {
        Self {
            power_spectrum: Array1::zeros(0),
            frequencies: Array1::zeros(0),
            heart_rate: HeartRate::Unknown,
            source,
            fused_signal: Array1::zeros(0),
        }
    }
}

/// Outcome of pushing one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameStatus {
    /// Dropped during the warm-up period; `remaining` frames still to drop
    Discarded { remaining: usize },
    /// Stored; buffer not yet full
    Buffered { fill: f32 },
    /// Stored; buffer full and ready for a cycle
    Ready,
}

/// Sliding-window heart-rate estimator.
pub struct PulsePipeline {
    config: PulseConfig,
    buffers: ChannelBuffers,
    engine: SpectralEngine,
    ica: FastIca,
    selector: Box<dyn ComponentSelector>,
    warmup_remaining: usize,
    last_heart_rate: HeartRate,
    cycles: usize,
}

impl PulsePipeline {
    /// Build a pipeline with the selector named in `config`.
    pub fn new(config: PulseConfig) -> Result<Self> {
        let selector = config.separation.selector.build(
            config.capture.fps,
            config.band.low_bpm,
            config.band.high_bpm,
        );
        Self::with_selector(config, selector)
    }

    /// Build a pipeline with a caller-provided component selector.
    pub fn with_selector(
        config: PulseConfig,
        selector: Box<dyn ComponentSelector>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| SignalError::InvalidConfig(e.to_string()))?;
        let buffers = ChannelBuffers::new(config.buffer_capacity(), config.shift_samples())?;
        debug!(
            "Pipeline: {} samples/window, shift {}, discard {} frames, selector {}",
            buffers.capacity(),
            buffers.shift_len(),
            config.discard_frames(),
            selector.name()
        );
        Ok(Self {
            ica: FastIca::new(config.separation.ica.clone()),
            warmup_remaining: config.discard_frames(),
            buffers,
            engine: SpectralEngine::new(),
            selector,
            last_heart_rate: HeartRate::Unknown,
            cycles: 0,
            config,
        })
    }

    pub fn config(&self) -> &PulseConfig {
        &self.config
    }

    pub fn buffers(&self) -> &ChannelBuffers {
        &self.buffers
    }

    pub fn engine(&self) -> &SpectralEngine {
        &self.engine
    }

    /// Replace the component-selection strategy.
    pub fn set_selector(&mut self, selector: Box<dyn ComponentSelector>) {
        self.selector = selector;
    }

    pub fn last_heart_rate(&self) -> HeartRate {
        self.last_heart_rate
    }

    /// Number of completed cycles.
    pub fn cycles(&self) -> usize {
        self.cycles
    }

    /// Frames still to be dropped before buffering starts.
    pub fn warmup_remaining(&self) -> usize {
        self.warmup_remaining
    }

    /// Append one sample to one channel, bypassing the warm-up discard.
    pub fn push_sample(&mut self, channel: Channel, value: f32) -> Result<()> {
        self.buffers.push(channel, value)
    }

    /// Append one frame's mean colour, dropping frames during warm-up.
    pub fn push_frame(&mut self, rgb: [f32; 3]) -> Result<FrameStatus> {
        if self.warmup_remaining > 0 {
            self.warmup_remaining -= 1;
            if self.warmup_remaining == 0 {
                debug!("Warm-up complete, buffering samples");
            }
            return Ok(FrameStatus::Discarded {
                remaining: self.warmup_remaining,
            });
        }
        self.buffers.push_rgb(rgb)?;
        if self.buffers.is_full() {
            Ok(FrameStatus::Ready)
        } else {
            Ok(FrameStatus::Buffered {
                fill: self.buffers.fill_ratio(),
            })
        }
    }

    pub fn is_ready(&self) -> bool {
        self.buffers.is_full()
    }

    /// Run one processing cycle over the current buffer contents.
    ///
    /// With `use_source_separation`, FastICA runs over all three channels and
    /// the selector picks the component. If separation reports too little
    /// data the cycle falls back to the channel of interest.
    pub fn process_cycle(&mut self, use_source_separation: bool) -> Result<CycleOutput> {
        self.buffers.validate()?;

        let (signal, source) = if use_source_separation {
            self.separated_signal()?
        } else {
            self.channel_signal()
        };

        let fused = normalize_with_floor(
            &signal,
            mean(&signal),
            stddev(&signal),
            self.config.normalization.std_floor,
        );
        let power_spectrum = self.engine.compute_spectrum(&fused)?;
        let n = power_spectrum.len();

        // The extractor reads a one-sided spectrum
        let one_sided: Vec<f32> = power_spectrum.iter().take(n / 2).copied().collect();
        let heart_rate = compute_heart_rate(
            &one_sided,
            self.config.band.low_bpm,
            self.config.band.high_bpm,
            self.config.capture.fps,
        );

        self.cycles += 1;
        self.last_heart_rate = heart_rate;
        trace!(
            "Cycle {}: {} samples -> {} bins, source {:?}, {}",
            self.cycles,
            signal.len(),
            n,
            source,
            heart_rate
        );

        Ok(CycleOutput {
            frequencies: frequency_axis(n, self.config.capture.fps),
            power_spectrum,
            heart_rate,
            source,
            fused_signal: fused,
        })
    }

    /// Slide the window: evict the oldest `shift` samples from every channel.
    pub fn shift_buffers(&mut self) -> usize {
        self.buffers.shift()
    }

    /// Feed one frame; when the window fills, run a cycle with the
    /// configured separation flag and slide the window.
    ///
    /// A failed cycle is logged and reported as an unknown heart rate; the
    /// next full window retries with fresh data. Only a rejected frame is
    /// returned as an error.
    pub fn ingest(&mut self, rgb: [f32; 3]) -> Result<Option<CycleOutput>> {
        if self.push_frame(rgb)? != FrameStatus::Ready {
            return Ok(None);
        }
        let output = self.process_cycle(self.config.separation.enabled);
        self.shift_buffers();
        let output = self.settle_cycle(output);
        if let HeartRate::Bpm(bpm) = output.heart_rate {
            info!("Heart rate: {} BPM (cycle {})", bpm, self.cycles);
        }
        Ok(Some(output))
    }

    fn settle_cycle(&mut self, output: Result<CycleOutput>) -> CycleOutput {
        match output {
            Ok(output) => output,
            Err(e) => {
                self.cycles += 1;
                self.last_heart_rate = HeartRate::Unknown;
                warn!("Cycle {} failed: {}", self.cycles, e);
                CycleOutput::unknown(SignalSource::Channel(
                    self.config.capture.channel_of_interest,
                ))
            }
        }
    }

    /// Drop all buffered samples and restart the warm-up period.
    pub fn reset(&mut self) {
        self.buffers.clear();
        self.warmup_remaining = self.config.discard_frames();
        self.last_heart_rate = HeartRate::Unknown;
        self.cycles = 0;
    }

    fn channel_signal(&self) -> (Array1<f32>, SignalSource) {
        let channel = self.config.capture.channel_of_interest;
        (self.buffers.to_array(channel), SignalSource::Channel(channel))
    }

    fn separated_signal(&mut self) -> Result<(Array1<f32>, SignalSource)> {
        let r = self.buffers.to_array(Channel::Red);
        let g = self.buffers.to_array(Channel::Green);
        let b = self.buffers.to_array(Channel::Blue);

        match self.ica.separate(&r, &g, &b, self.selector.as_mut()) {
            Ok(separation) => {
                let index = separation.selected;
                Ok((separation.into_selected(), SignalSource::Separated(index)))
            }
            Err(SignalError::InsufficientData(reason)) => {
                warn!(
                    "Source separation skipped ({}); using {} channel",
                    reason, self.config.capture.channel_of_interest
                );
                Ok(self.channel_signal())
            }
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Debug for PulsePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PulsePipeline")
            .field("buffered", &self.buffers.len())
            .field("capacity", &self.buffers.capacity())
            .field("selector", &self.selector.name())
            .field("warmup_remaining", &self.warmup_remaining)
            .field("cycles", &self.cycles)
            .finish()
    }
}
