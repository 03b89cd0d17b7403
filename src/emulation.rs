//! Seam to the frame-stepped emulation core
//!
//! The shell never emulates hardware itself. A core loads an image, accepts
//! button changes and advances one video frame at a time, reporting the frame
//! and the audio it produced through [`CoreOutput`] callbacks.

use crate::input::{Button, Player};

/// Failure reported by an emulation core.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// The image was not accepted (bad header, unsupported mapper, ...)
    #[error("image rejected: {0}")]
    Rejected(String),

    /// The core faulted while running
    #[error("core fault: {0}")]
    Fault(String),
}

/// Receiver for everything a core produces during one frame step.
pub trait CoreOutput {
    /// A complete video frame of packed `0x00BBGGRR` pixels.
    fn on_frame(&mut self, pixels: &[u32]);

    /// One stereo audio sample pair.
    fn on_sample(&mut self, left: f32, right: f32);
}

/// A frame-stepped emulation core.
pub trait EmulationCore {
    /// Load a program image, replacing any previous one.
    fn load_image(&mut self, image: &[u8]) -> Result<(), CoreError>;

    /// Press or release one button for one player.
    fn set_button(&mut self, player: Player, button: Button, pressed: bool);

    /// Run exactly one video frame, reporting output through `output`.
    fn advance_one_frame(&mut self, output: &mut dyn CoreOutput) -> Result<(), CoreError>;
}

impl<C: EmulationCore + ?Sized> EmulationCore for Box<C> {
    fn load_image(&mut self, image: &[u8]) -> Result<(), CoreError> {
        (**self).load_image(image)
    }

    fn set_button(&mut self, player: Player, button: Button, pressed: bool) {
        (**self).set_button(player, button, pressed)
    }

    fn advance_one_frame(&mut self, output: &mut dyn CoreOutput) -> Result<(), CoreError> {
        (**self).advance_one_frame(output)
    }
}
