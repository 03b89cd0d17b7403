//! Native real-time audio output
//!
//! Plays the ring buffer through the system audio device with rodio. The
//! device thread owns the [`AudioConsumer`](crate::audio::AudioConsumer) and
//! pulls one block at a time; the frame clock keeps pushing from the host
//! thread without ever taking a lock.

pub mod audio_device;

pub use audio_device::{AudioDevice, RodioBackend};
