//! Gamepad polling and the standard button layout

use serde::{Deserialize, Serialize};

use super::{Button, ControllerState};
use crate::{Result, ShellError};

/// Stick deflection beyond which a direction counts as held (strict).
pub const DEFAULT_AXIS_THRESHOLD: f32 = 0.5;

/// State of one connected pad at poll time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GamepadSnapshot {
    /// Host-assigned pad index (0 drives player 1, 1 drives player 2)
    pub index: u32,
    /// Pressed flag per button index
    pub buttons: Vec<bool>,
    /// Axis values in -1.0..=1.0
    pub axes: Vec<f32>,
}

/// Level-triggered gamepad provider, polled once per tick.
pub trait GamepadSource {
    /// Snapshot every connected pad.
    fn poll(&mut self) -> Vec<GamepadSnapshot>;
}

/// Source for hosts without gamepad support.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoGamepads;

impl GamepadSource for NoGamepads {
    fn poll(&mut self) -> Vec<GamepadSnapshot> {
        Vec::new()
    }
}

/// Button indices and stick threshold used to decode a pad.
///
/// Defaults follow the W3C "standard" gamepad mapping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GamepadLayout {
    /// Button index for A
    pub a: usize,
    /// Button index for B
    pub b: usize,
    /// Button index for Select
    pub select: usize,
    /// Button index for Start
    pub start: usize,
    /// Button index for D-pad up
    pub up: usize,
    /// Button index for D-pad down
    pub down: usize,
    /// Button index for D-pad left
    pub left: usize,
    /// Button index for D-pad right
    pub right: usize,
    /// Horizontal stick axis (negative = left)
    pub axis_x: usize,
    /// Vertical stick axis (negative = up)
    pub axis_y: usize,
    /// Deflection beyond which a stick direction is held
    pub axis_threshold: f32,
}

impl Default for GamepadLayout {
    fn default() -> Self {
        GamepadLayout {
            a: 0,
            b: 2,
            select: 8,
            start: 9,
            up: 12,
            down: 13,
            left: 14,
            right: 15,
            axis_x: 0,
            axis_y: 1,
            axis_threshold: DEFAULT_AXIS_THRESHOLD,
        }
    }
}

impl GamepadLayout {
    fn button_index(&self, button: Button) -> usize {
        match button {
            Button::A => self.a,
            Button::B => self.b,
            Button::Select => self.select,
            Button::Start => self.start,
            Button::Up => self.up,
            Button::Down => self.down,
            Button::Left => self.left,
            Button::Right => self.right,
        }
    }

    /// Decode a snapshot into held buttons.
    ///
    /// Missing buttons or axes read as released/centered.
    pub fn decode(&self, pad: &GamepadSnapshot) -> ControllerState {
        let mut state = ControllerState::empty();
        for button in Button::ALL {
            if pad
                .buttons
                .get(self.button_index(button))
                .copied()
                .unwrap_or(false)
            {
                state |= button.flag();
            }
        }

        let axis = |i: usize| pad.axes.get(i).copied().filter(|v| !v.is_nan()).unwrap_or(0.0);
        let (x, y) = (axis(self.axis_x), axis(self.axis_y));
        if x < -self.axis_threshold {
            state |= ControllerState::LEFT;
        } else if x > self.axis_threshold {
            state |= ControllerState::RIGHT;
        }
        if y < -self.axis_threshold {
            state |= ControllerState::UP;
        } else if y > self.axis_threshold {
            state |= ControllerState::DOWN;
        }
        state
    }

    /// Check the threshold range.
    pub fn validate(&self) -> Result<()> {
        if !(self.axis_threshold > 0.0 && self.axis_threshold < 1.0) {
            return Err(ShellError::Config(format!(
                "axis threshold {} must be strictly between 0.0 and 1.0",
                self.axis_threshold
            )));
        }
        Ok(())
    }
}
