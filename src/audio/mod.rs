//! Audio side of the synchronization layer
//!
//! The frame clock pushes stereo pairs into a lock-free ring buffer while an
//! audio device, running on its own real-time clock, pulls fixed-size blocks
//! out of it. The device itself sits behind the [`AudioBackend`] and
//! [`AudioOutput`] traits so each host (rodio, Web Audio, tests) supplies its own.

pub mod output;
pub mod ring_buffer;

pub use output::{AudioBackend, AudioOutput, OpenError};
pub use ring_buffer::{
    channel, AudioConsumer, AudioProducer, BufferStats, StereoSample, VolumeControl,
    MAX_CAPACITY,
};

use serde::{Deserialize, Serialize};

use crate::{Result, ShellError};

/// Default output sample rate (44.1 kHz)
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Frames requested by the audio device per pull
pub const DEFAULT_BLOCK_FRAMES: usize = 4096;

/// Ring buffer capacity in stereo pairs: two device blocks
pub const DEFAULT_RING_CAPACITY: usize = 2 * DEFAULT_BLOCK_FRAMES;

/// Audio pipeline configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate shared by the emulation core and the output device, in Hz
    pub sample_rate: u32,

    /// Frames per device pull
    /// Larger blocks = more latency but fewer callbacks
    pub block_frames: usize,

    /// Ring buffer size in stereo pairs (rounded up to a power of two)
    pub ring_capacity: usize,

    /// Initial output volume, 0.0 to 1.0
    pub volume: f32,

    /// Start muted
    pub muted: bool,
}

impl AudioConfig {
    /// Buffering latency of a full ring buffer in milliseconds
    pub fn latency_ms(&self) -> f32 {
        (self.ring_capacity.next_power_of_two() as f32 / self.sample_rate as f32) * 1000.0
    }

    /// Audio pairs the core produces per video frame at `frame_rate_hz`
    pub fn samples_per_frame(&self, frame_rate_hz: f64) -> f64 {
        f64::from(self.sample_rate) / frame_rate_hz
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if !(8_000..=192_000).contains(&self.sample_rate) {
            return Err(ShellError::Config(format!(
                "audio sample rate {} Hz is outside 8000..=192000",
                self.sample_rate
            )));
        }
        if self.block_frames == 0 {
            return Err(ShellError::Config(
                "audio block size must be greater than 0".into(),
            ));
        }
        if self.ring_capacity == 0 || self.ring_capacity > MAX_CAPACITY {
            return Err(ShellError::Config(format!(
                "audio ring capacity {} must be in 1..={MAX_CAPACITY}",
                self.ring_capacity
            )));
        }
        if !(0.0..=1.0).contains(&self.volume) {
            return Err(ShellError::Config(format!(
                "volume {} must be between 0.0 and 1.0",
                self.volume
            )));
        }
        Ok(())
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        AudioConfig {
            sample_rate: DEFAULT_SAMPLE_RATE,
            block_frames: DEFAULT_BLOCK_FRAMES,
            ring_capacity: DEFAULT_RING_CAPACITY,
            volume: 1.0,
            muted: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_latency() {
        let config = AudioConfig::default();
        let latency = config.latency_ms();
        assert!(latency > 185.0 && latency < 186.0, "latency {latency}");
    }

    #[test]
    fn test_samples_per_frame_at_60hz() {
        let config = AudioConfig::default();
        assert_eq!(config.samples_per_frame(60.0), 735.0);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AudioConfig::default();
        assert!(config.validate().is_ok());

        config.volume = 1.5;
        assert!(config.validate().is_err());

        config = AudioConfig {
            block_frames: 0,
            ..AudioConfig::default()
        };
        assert!(config.validate().is_err());

        config = AudioConfig {
            sample_rate: 1_000,
            ..AudioConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
