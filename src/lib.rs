//! Real-time shell for an NES emulation core
//!
//! Drives a frame-stepped emulation core from a host timer and keeps its three
//! output paths in step with wall-clock time:
//!
//! - a fixed-rate frame clock that advances the core one video frame per tick
//! - a video sink that converts the core's packed pixels into an RGBA image
//! - a lock-free single-producer/single-consumer audio ring buffer drained by
//!   the host's audio device on its own clock
//! - an input aggregator that merges keyboard, touch and gamepad sources into
//!   one controller state per virtual player
//! - a lifecycle controller that starts, suspends and stops all of the above
//!   together
//!
//! The emulation core, the display, the audio device, the tick timer and the
//! gamepad source are all traits, so the same session runs in a browser (see
//! the `nes-shell-wasm` crate), natively through rodio, or headless in tests.
//!
//! # Crate feature flags
//! - `streaming` (opt-in): native audio output through rodio and the
//!   `nes-shell-soak` binary
//!
//! # Quick start
//! ```no_run
//! use nes_shell::{HostBindings, Session, ShellConfig};
//! # fn host<C: nes_shell::EmulationCore>(core: C, host: HostBindings, rom: &[u8]) -> nes_shell::Result<()> {
//! let mut session = Session::new(core, ShellConfig::default(), host)?;
//! session.load_image(rom)?;
//! session.start()?;
//! // from the host timer:
//! session.on_timer(std::time::Duration::from_millis(17))?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod audio; // Ring buffer & output device seam
pub mod clock; // Frame clock, pacing, tick scheduling
pub mod config;
pub mod emulation; // Emulation core seam
pub mod input; // Input aggregation
pub mod lifecycle;
pub mod session;
#[cfg(feature = "streaming")]
pub mod streaming; // Native audio output
pub mod video;

/// Error types for shell operations
#[derive(thiserror::Error, Debug)]
pub enum ShellError {
    /// The core rejected an image, or no valid image is loaded
    #[error("Load failure: {0}")]
    LoadFailure(String),

    /// The core failed while advancing a frame
    #[error("Step failure at tick {tick}: {reason}")]
    StepFailure {
        /// Tick number (1-based) that failed
        tick: u64,
        /// Reason reported by the core
        reason: String,
    },

    /// The host refused to provide an audio device or timer
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Configuration could not be parsed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error from filesystem or device
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for shell operations
pub type Result<T> = std::result::Result<T, ShellError>;

// Public API exports
pub use audio::{AudioBackend, AudioConfig, AudioOutput, BufferStats, VolumeControl};
pub use clock::{FrameClock, ManualScheduler, TickReport, TickScheduler};
pub use config::ShellConfig;
pub use emulation::{CoreError, CoreOutput, EmulationCore};
pub use input::{Button, ControllerState, GamepadSnapshot, GamepadSource, InputAggregator, Player};
pub use lifecycle::{LifecycleController, PlaybackState};
pub use session::{HostBindings, Session, SessionStats};
#[cfg(feature = "streaming")]
pub use streaming::{AudioDevice, RodioBackend};
pub use video::{DisplaySurface, VideoSink, FRAME_HEIGHT, FRAME_WIDTH};
