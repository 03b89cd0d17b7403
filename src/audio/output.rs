//! Audio output device abstraction
//!
//! A host provides an [`AudioBackend`] that knows how to open its output device
//! around an [`AudioConsumer`]. The opened [`AudioOutput`] then pulls blocks
//! from the consumer on the device's own schedule until it is dropped.
//!
//! Most hosts allow a device to be created only once per page or process, so
//! the lifecycle controller opens it at most once and afterwards only toggles
//! [`AudioOutput::suspend`] and [`AudioOutput::resume`].

use super::{AudioConfig, AudioConsumer};
use crate::Result;

/// A running (or suspended) output device.
pub trait AudioOutput {
    /// Start or continue pulling blocks.
    fn resume(&mut self) -> Result<()>;

    /// Stop pulling blocks. The device stays open.
    fn suspend(&mut self) -> Result<()>;

    /// Whether the device is currently pulling.
    fn is_running(&self) -> bool;
}

/// Factory for the host's output device.
pub trait AudioBackend {
    /// Open the output device, handing it the read end of the ring buffer.
    /// The returned device is already pulling.
    ///
    /// On failure the consumer is handed back inside [`OpenError`] so a later
    /// attempt can use it.
    fn open(
        &mut self,
        consumer: AudioConsumer,
        config: &AudioConfig,
    ) -> std::result::Result<Box<dyn AudioOutput>, OpenError>;
}

/// Failure to open an output device (autoplay policy, missing hardware, ...).
#[derive(thiserror::Error, Debug)]
#[error("{reason}")]
pub struct OpenError {
    /// Human-readable cause reported by the host
    pub reason: String,
    /// The ring buffer endpoint the device would have owned
    pub consumer: AudioConsumer,
}

impl OpenError {
    /// Wrap a failure reason together with the returned consumer.
    pub fn new(reason: impl Into<String>, consumer: AudioConsumer) -> Self {
        OpenError {
            reason: reason.into(),
            consumer,
        }
    }
}
