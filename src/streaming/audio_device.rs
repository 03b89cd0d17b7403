//! Audio device integration using rodio
//!
//! Provides playback of the ring buffer to the system audio device. The
//! rodio mixer thread pulls interleaved stereo blocks; volume and underrun
//! handling happen inside the ring buffer.

use rodio::{OutputStream, Sink, Source};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::audio::{AudioBackend, AudioConfig, AudioConsumer, AudioOutput, OpenError};
use crate::{Result, ShellError};

/// Output channels (interleaved left/right)
const CHANNELS: u16 = 2;

/// Audio source that reads from the ring buffer
struct RingBufferSource {
    consumer: AudioConsumer,
    sample_rate: u32,
    finished: Arc<AtomicBool>,
    /// One interleaved device block
    buffer: Vec<f32>,
    /// Current position in the block
    buffer_pos: usize,
}

impl RingBufferSource {
    fn new(
        consumer: AudioConsumer,
        sample_rate: u32,
        block_frames: usize,
        finished: Arc<AtomicBool>,
    ) -> Self {
        let len = block_frames.max(1) * CHANNELS as usize;
        RingBufferSource {
            consumer,
            sample_rate,
            finished,
            buffer: vec![0.0f32; len],
            buffer_pos: len, // Start by pulling a block
        }
    }
}

impl Source for RingBufferSource {
    fn current_frame_len(&self) -> Option<usize> {
        // Remaining samples of the current block; parameters never change
        match self.buffer.len() - self.buffer_pos {
            0 => Some(self.buffer.len()),
            remaining => Some(remaining),
        }
    }

    fn channels(&self) -> u16 {
        CHANNELS
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

impl Iterator for RingBufferSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.finished.load(Ordering::Relaxed) {
            return None;
        }

        if self.buffer_pos >= self.buffer.len() {
            // Short reads are zero-filled by the consumer
            self.consumer.pull_interleaved_into(&mut self.buffer);
            self.buffer_pos = 0;
        }

        let sample = self.buffer[self.buffer_pos];
        self.buffer_pos += 1;
        Some(sample)
    }
}

/// Audio playback device using rodio
pub struct AudioDevice {
    _stream: OutputStream,
    sink: Sink,
    playing: bool,
    finished: Arc<AtomicBool>,
}

impl AudioDevice {
    /// Open the default output device and start pulling from `consumer`.
    ///
    /// On failure the consumer is returned inside the error.
    pub fn open(
        consumer: AudioConsumer,
        config: &AudioConfig,
    ) -> std::result::Result<Self, OpenError> {
        let (stream, stream_handle) = match OutputStream::try_default() {
            Ok(pair) => pair,
            Err(e) => {
                return Err(OpenError::new(
                    format!("Failed to create audio stream: {e}"),
                    consumer,
                ))
            }
        };

        let sink = match Sink::try_new(&stream_handle) {
            Ok(sink) => sink,
            Err(e) => {
                return Err(OpenError::new(
                    format!("Failed to create audio sink: {e}"),
                    consumer,
                ))
            }
        };

        let finished = Arc::new(AtomicBool::new(false));
        let source = RingBufferSource::new(
            consumer,
            config.sample_rate,
            config.block_frames,
            Arc::clone(&finished),
        );
        sink.append(source);

        Ok(AudioDevice {
            _stream: stream,
            sink,
            playing: true,
            finished,
        })
    }

    /// Pause playback
    pub fn pause(&mut self) {
        self.sink.pause();
        self.playing = false;
    }

    /// Resume playback
    pub fn play(&mut self) {
        self.sink.play();
        self.playing = true;
    }

    /// Stop the source for good; the device plays nothing afterwards.
    pub fn finish(&self) {
        self.finished.store(true, Ordering::Relaxed);
    }
}

impl AudioOutput for AudioDevice {
    fn resume(&mut self) -> Result<()> {
        if self.finished.load(Ordering::Relaxed) {
            return Err(ShellError::DeviceUnavailable(
                "audio source already finished".into(),
            ));
        }
        self.play();
        Ok(())
    }

    fn suspend(&mut self) -> Result<()> {
        self.pause();
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.playing && !self.sink.is_paused()
    }
}

impl Drop for AudioDevice {
    fn drop(&mut self) {
        self.pause();
        self.finish();
        debug!("rodio output closed");
    }
}

/// [`AudioBackend`] that opens the system default output through rodio.
#[derive(Debug, Default, Clone, Copy)]
pub struct RodioBackend;

impl AudioBackend for RodioBackend {
    fn open(
        &mut self,
        consumer: AudioConsumer,
        config: &AudioConfig,
    ) -> std::result::Result<Box<dyn AudioOutput>, OpenError> {
        let device = AudioDevice::open(consumer, config)?;
        Ok(Box::new(device))
    }
}
