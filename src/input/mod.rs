//! Controller input handling
//!
//! Keyboard, touch and gamepad sources are merged per virtual player into one
//! [`ControllerState`]. The frame clock reads that state once per tick and
//! hands it to the emulation core.

pub mod aggregator;
pub mod gamepad;
pub mod keymap;

pub use aggregator::InputAggregator;
pub use gamepad::{GamepadLayout, GamepadSnapshot, GamepadSource, NoGamepads};
pub use keymap::{default_bindings, KeyBinding, KeyMap};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ShellError;

/// Number of virtual players
pub const PLAYER_COUNT: usize = 2;

bitflags! {
    /// Set of held logical buttons for one player.
    ///
    /// Bit positions match the core's button indices (see [`Button::index`]).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ControllerState: u8 {
        const A = 1 << 0;
        const B = 1 << 1;
        const SELECT = 1 << 2;
        const START = 1 << 3;
        const UP = 1 << 4;
        const DOWN = 1 << 5;
        const LEFT = 1 << 6;
        const RIGHT = 1 << 7;
    }
}

impl ControllerState {
    /// Whether `button` is held.
    pub fn is_held(self, button: Button) -> bool {
        self.contains(button.flag())
    }

    /// Buttons whose state differs between `self` and `other`.
    pub fn changed(self, other: ControllerState) -> impl Iterator<Item = Button> {
        let diff = self ^ other;
        Button::ALL.into_iter().filter(move |b| diff.contains(b.flag()))
    }
}

/// Logical controller button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Button {
    /// A
    A,
    /// B
    B,
    /// Select
    Select,
    /// Start
    Start,
    /// D-pad up
    Up,
    /// D-pad down
    Down,
    /// D-pad left
    Left,
    /// D-pad right
    Right,
}

impl Button {
    /// All buttons in core index order.
    pub const ALL: [Button; 8] = [
        Button::A,
        Button::B,
        Button::Select,
        Button::Start,
        Button::Up,
        Button::Down,
        Button::Left,
        Button::Right,
    ];

    /// Index understood by the emulation core (A=0 .. Right=7).
    pub fn index(self) -> u8 {
        self as u8
    }

    /// Single-button state set.
    pub fn flag(self) -> ControllerState {
        ControllerState::from_bits_retain(1 << self.index())
    }

    /// Lowercase name, as used in configuration files.
    pub fn name(self) -> &'static str {
        match self {
            Button::A => "a",
            Button::B => "b",
            Button::Select => "select",
            Button::Start => "start",
            Button::Up => "up",
            Button::Down => "down",
            Button::Left => "left",
            Button::Right => "right",
        }
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Button {
    type Err = ShellError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Button::ALL
            .into_iter()
            .find(|b| b.name().eq_ignore_ascii_case(value))
            .ok_or_else(|| ShellError::Config(format!("unknown button '{value}'")))
    }
}

/// Virtual player (1 or 2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Player {
    /// Player 1
    One,
    /// Player 2
    Two,
}

impl Player {
    /// Both players in order.
    pub const ALL: [Player; PLAYER_COUNT] = [Player::One, Player::Two];

    /// Zero-based slot.
    pub fn index(self) -> usize {
        match self {
            Player::One => 0,
            Player::Two => 1,
        }
    }

    /// One-based number, as the core and configuration files count players.
    pub fn number(self) -> u8 {
        self.index() as u8 + 1
    }

    /// Player for a zero-based slot, if any.
    pub fn from_index(index: usize) -> Option<Player> {
        Player::ALL.get(index).copied()
    }
}

impl TryFrom<u8> for Player {
    type Error = ShellError;

    fn try_from(number: u8) -> Result<Self, Self::Error> {
        match number {
            1 => Ok(Player::One),
            2 => Ok(Player::Two),
            _ => Err(ShellError::Config(format!(
                "player must be 1 or 2, got {number}"
            ))),
        }
    }
}

impl From<Player> for u8 {
    fn from(player: Player) -> u8 {
        player.number()
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.number())
    }
}
