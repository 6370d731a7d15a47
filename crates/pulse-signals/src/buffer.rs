//! Sliding per-channel sample buffers
//!
//! One bounded window per colour channel. Frames arrive one sample per
//! channel; when every channel reaches capacity the driver runs a cycle and
//! then calls [`ChannelBuffers::shift`], which drops the oldest samples from
//! all channels in lock-step.

use std::collections::VecDeque;
use std::fmt;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SignalError};

/// Colour channel of a region-of-interest sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Red,
    Green,
    Blue,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Red, Channel::Green, Channel::Blue];

    pub fn index(self) -> usize {
        match self {
            Channel::Red => 0,
            Channel::Green => 1,
            Channel::Blue => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Channel::Red => "red",
            Channel::Green => "green",
            Channel::Blue => "blue",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Three bounded sample windows (R, G, B) that always slide together.
#[derive(Debug, Clone)]
pub struct ChannelBuffers {
    capacity: usize,
    shift: usize,
    channels: [VecDeque<f32>; 3],
}

impl ChannelBuffers {
    /// Create buffers holding `capacity` samples per channel, sliding by
    /// `shift` samples.
    pub fn new(capacity: usize, shift: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(SignalError::InvalidConfig(
                "buffer capacity must be positive".to_string(),
            ));
        }
        if shift == 0 || shift > capacity {
            return Err(SignalError::InvalidConfig(format!(
                "shift must be in 1..={} samples, got {}",
                capacity, shift
            )));
        }
        Ok(Self {
            capacity,
            shift,
            channels: std::array::from_fn(|_| VecDeque::with_capacity(capacity)),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn shift_len(&self) -> usize {
        self.shift
    }

    /// Number of complete frames (length of the shortest channel).
    pub fn len(&self) -> usize {
        self.channels.iter().map(VecDeque::len).min().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.channels.iter().all(VecDeque::is_empty)
    }

    pub fn is_full(&self) -> bool {
        self.channels.iter().all(|c| c.len() >= self.capacity)
    }

    /// Fill level of complete frames, 0.0..=1.0.
    pub fn fill_ratio(&self) -> f32 {
        self.len() as f32 / self.capacity as f32
    }

    /// Append one sample to one channel.
    ///
    /// Fails if the value is not finite, if the channel already holds a
    /// sample for the current frame while another channel does not, or if
    /// the channel is at capacity.
    pub fn push(&mut self, channel: Channel, value: f32) -> Result<()> {
        check_finite(channel, value)?;
        let shortest = self.len();
        let target = &mut self.channels[channel.index()];
        if target.len() > shortest {
            return Err(SignalError::ChannelLengthMismatch {
                channel: channel.name(),
                len: target.len(),
                expected: shortest,
            });
        }
        if target.len() >= self.capacity {
            return Err(SignalError::BufferFull {
                capacity: self.capacity,
            });
        }
        target.push_back(value);
        Ok(())
    }

    /// Append one complete `[r, g, b]` frame. Nothing is written on error.
    pub fn push_rgb(&mut self, rgb: [f32; 3]) -> Result<()> {
        for (channel, value) in Channel::ALL.into_iter().zip(rgb) {
            check_finite(channel, value)?;
        }
        self.validate_lengths()?;
        if self.len() >= self.capacity {
            return Err(SignalError::BufferFull {
                capacity: self.capacity,
            });
        }
        for (buffer, value) in self.channels.iter_mut().zip(rgb) {
            buffer.push_back(value);
        }
        Ok(())
    }

    /// Drop the oldest `shift` samples (or everything, if fewer) from every
    /// channel. Returns the number of frames removed.
    pub fn shift(&mut self) -> usize {
        let removed = self.shift.min(self.len());
        for buffer in self.channels.iter_mut() {
            buffer.drain(..removed.min(buffer.len()));
        }
        removed
    }

    pub fn clear(&mut self) {
        for buffer in self.channels.iter_mut() {
            buffer.clear();
        }
    }

    pub fn channel(&self, channel: Channel) -> &VecDeque<f32> {
        &self.channels[channel.index()]
    }

    /// Copy one channel out as a contiguous signal.
    pub fn to_array(&self, channel: Channel) -> Array1<f32> {
        self.channel(channel).iter().copied().collect()
    }

    /// Check that the channels are non-empty and of equal length, the
    /// precondition for running a processing cycle.
    pub fn validate(&self) -> Result<usize> {
        self.validate_lengths()?;
        let len = self.len();
        if len == 0 {
            return Err(SignalError::InsufficientData(
                "channel buffers are empty".to_string(),
            ));
        }
        Ok(len)
    }

    fn validate_lengths(&self) -> Result<()> {
        let shortest = self.len();
        for channel in Channel::ALL {
            let len = self.channels[channel.index()].len();
            if len != shortest {
                return Err(SignalError::ChannelLengthMismatch {
                    channel: channel.name(),
                    len,
                    expected: shortest,
                });
            }
        }
        Ok(())
    }
}

fn check_finite(channel: Channel, value: f32) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(SignalError::InvalidFrame(format!(
            "non-finite {} sample {}",
            channel, value
        )))
    }
}
