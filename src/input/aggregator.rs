//! Merges every input source into one controller state per player

use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

use super::{Button, ControllerState, GamepadLayout, GamepadSnapshot, KeyMap, Player, PLAYER_COUNT};

/// Per-player logical controller state built from keyboard, touch and
/// gamepad sources.
///
/// Each source keeps its own record of what it holds; the visible state is
/// the union, so one source releasing a button never cancels another source
/// that still holds it. Keyboard and touch are edge-triggered and update on
/// every event, gamepads are level-triggered and replaced on every poll.
#[derive(Debug, Default)]
pub struct InputAggregator {
    keymap: KeyMap,
    layout: GamepadLayout,
    /// Held keys by physical code
    keys: HashMap<String, (Player, Button)>,
    /// Active touch points by host touch id
    touches: HashMap<i32, (Player, Button)>,
    /// Last polled gamepad state per player
    pads: [ControllerState; PLAYER_COUNT],
    connected: BTreeSet<u32>,
}

impl InputAggregator {
    /// Create an aggregator with the given key map and gamepad layout.
    pub fn new(keymap: KeyMap, layout: GamepadLayout) -> Self {
        InputAggregator {
            keymap,
            layout,
            ..Default::default()
        }
    }

    /// Record a press or release of a keyboard key already resolved to a
    /// player and button.
    pub fn set_key(&mut self, code: &str, player: Player, button: Button, pressed: bool) {
        if pressed {
            self.keys.insert(code.to_owned(), (player, button));
        } else {
            self.keys.remove(code);
        }
    }

    /// Resolve a raw key event through the key map.
    ///
    /// Returns `false` for unmapped codes so the host can leave the key alone.
    pub fn key_event(&mut self, code: &str, pressed: bool) -> bool {
        match self.keymap.get(code) {
            Some((player, button)) => {
                self.set_key(code, player, button, pressed);
                true
            }
            None => false,
        }
    }

    /// A touch point went down on an on-screen button.
    pub fn touch_start(&mut self, touch_id: i32, player: Player, button: Button) {
        self.touches.insert(touch_id, (player, button));
    }

    /// A touch point was lifted or cancelled.
    pub fn touch_end(&mut self, touch_id: i32) {
        self.touches.remove(&touch_id);
    }

    /// Register a newly connected pad.
    pub fn gamepad_connected(&mut self, index: u32) {
        if self.connected.insert(index) {
            info!(index, connected = self.connected.len(), "Gamepad connected");
        }
    }

    /// Forget a pad and whatever it was holding.
    pub fn gamepad_disconnected(&mut self, index: u32) {
        if self.connected.remove(&index) {
            info!(index, connected = self.connected.len(), "Gamepad disconnected");
        }
        if let Some(player) = Player::from_index(index as usize) {
            self.pads[player.index()] = ControllerState::empty();
        }
    }

    /// Number of pads currently registered as connected.
    pub fn connected_gamepads(&self) -> usize {
        self.connected.len()
    }

    /// Replace gamepad state from a poll and return the merged state of both
    /// players.
    ///
    /// Pad 0 drives player 1 and pad 1 drives player 2; other pads are
    /// ignored.
    pub fn poll_devices(&mut self, pads: &[GamepadSnapshot]) -> [ControllerState; PLAYER_COUNT] {
        self.pads = [ControllerState::empty(); PLAYER_COUNT];
        for pad in pads {
            if let Some(player) = Player::from_index(pad.index as usize) {
                self.pads[player.index()] |= self.layout.decode(pad);
            }
        }
        [
            self.current_state(Player::One),
            self.current_state(Player::Two),
        ]
    }

    /// Union of all sources for `player`.
    pub fn current_state(&self, player: Player) -> ControllerState {
        held_by(self.keys.values(), player)
            | held_by(self.touches.values(), player)
            | self.pads[player.index()]
    }

    /// Drop every held key, touch point and polled pad state.
    pub fn release_all(&mut self) {
        debug!(
            keys = self.keys.len(),
            touches = self.touches.len(),
            "Releasing all inputs"
        );
        self.keys.clear();
        self.touches.clear();
        self.pads = [ControllerState::empty(); PLAYER_COUNT];
    }
}

fn held_by<'a>(
    sources: impl Iterator<Item = &'a (Player, Button)>,
    player: Player,
) -> ControllerState {
    sources
        .filter(|(p, _)| *p == player)
        .fold(ControllerState::empty(), |acc, (_, b)| acc | b.flag())
}
