//! Session configuration
//!
//! Everything is optional in JSON; missing fields fall back to the built-in
//! defaults. Values are validated when the configuration is loaded, not when
//! they are first used.
//!
//! ```json
//! {
//!   "frame_rate_hz": 60.0,
//!   "audio": { "sample_rate": 48000, "volume": 0.8 },
//!   "key_bindings": [{ "code": "Space", "player": 1, "button": "a" }],
//!   "gamepad": { "axis_threshold": 0.4 }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::audio::AudioConfig;
use crate::clock::pacer::{FRAME_RATE_RANGE, MAX_CATCH_UP_TICKS};
use crate::clock::DEFAULT_FRAME_RATE_HZ;
use crate::input::{default_bindings, GamepadLayout, KeyBinding, KeyMap};
use crate::{Result, ShellError};

/// Complete shell configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Frame clock rate in Hz
    pub frame_rate_hz: f64,
    /// Audio pipeline settings
    pub audio: AudioConfig,
    /// Keyboard bindings for both players
    pub key_bindings: Vec<KeyBinding>,
    /// Gamepad decoding
    pub gamepad: GamepadLayout,
}

impl Default for ShellConfig {
    fn default() -> Self {
        ShellConfig {
            frame_rate_hz: DEFAULT_FRAME_RATE_HZ,
            audio: AudioConfig::default(),
            key_bindings: default_bindings(),
            gamepad: GamepadLayout::default(),
        }
    }
}

impl ShellConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: ShellConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Serialize as pretty-printed JSON.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check every value range and the key bindings.
    pub fn validate(&self) -> Result<()> {
        if !FRAME_RATE_RANGE.contains(&self.frame_rate_hz) {
            return Err(ShellError::Config(format!(
                "frame rate {} Hz is outside {}..={}",
                self.frame_rate_hz,
                FRAME_RATE_RANGE.start(),
                FRAME_RATE_RANGE.end()
            )));
        }
        self.audio.validate()?;
        self.gamepad.validate()?;
        self.key_map()?;

        // One device block plus a catch-up burst must fit without dropping
        let burst = self.audio.samples_per_frame(self.frame_rate_hz) * f64::from(MAX_CATCH_UP_TICKS);
        let needed = self.audio.block_frames as f64 + burst;
        let capacity = self.audio.ring_capacity.next_power_of_two() as f64;
        if capacity < needed {
            return Err(ShellError::Config(format!(
                "audio ring capacity {} is smaller than {needed:.0} pairs (one {}-frame device block plus a {burst:.0}-pair catch-up burst)",
                self.audio.ring_capacity, self.audio.block_frames
            )));
        }
        Ok(())
    }

    /// Key map built from the bindings.
    pub fn key_map(&self) -> Result<KeyMap> {
        KeyMap::from_bindings(&self.key_bindings)
    }

    /// Set the frame rate.
    pub fn frame_rate(mut self, hz: f64) -> Self {
        self.frame_rate_hz = hz;
        self
    }

    /// Set the audio settings.
    pub fn audio(mut self, audio: AudioConfig) -> Self {
        self.audio = audio;
        self
    }

    /// Replace the key bindings.
    pub fn key_bindings(mut self, bindings: Vec<KeyBinding>) -> Self {
        self.key_bindings = bindings;
        self
    }

    /// Set the gamepad layout.
    pub fn gamepad(mut self, layout: GamepadLayout) -> Self {
        self.gamepad = layout;
        self
    }
}
