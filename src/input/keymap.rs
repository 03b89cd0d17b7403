//! Keyboard bindings
//!
//! Raw key codes are the host's layout-independent physical key names
//! (`KeyboardEvent.code` in browsers: `"ArrowUp"`, `"KeyX"`, ...).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{Button, Player};
use crate::{Result, ShellError};

/// One key binding as stored in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyBinding {
    /// Physical key code
    pub code: String,
    /// Player the key controls
    pub player: Player,
    /// Button the key asserts
    pub button: Button,
}

impl KeyBinding {
    /// Convenience constructor.
    pub fn new(code: impl Into<String>, player: Player, button: Button) -> Self {
        KeyBinding {
            code: code.into(),
            player,
            button,
        }
    }
}

/// Maps physical key codes to (player, button).
#[derive(Debug, Clone, Default)]
pub struct KeyMap {
    map: HashMap<String, (Player, Button)>,
}

impl KeyMap {
    /// Build a map from bindings.
    ///
    /// Fails on empty codes and on a code bound twice, so each key drives
    /// exactly one player and the players' key sets stay disjoint.
    pub fn from_bindings(bindings: &[KeyBinding]) -> Result<Self> {
        let mut map = HashMap::with_capacity(bindings.len());
        for binding in bindings {
            if binding.code.trim().is_empty() {
                return Err(ShellError::Config("empty key code in bindings".into()));
            }
            if let Some((player, button)) =
                map.insert(binding.code.clone(), (binding.player, binding.button))
            {
                return Err(ShellError::Config(format!(
                    "key '{}' bound twice ({player} {button} and {} {})",
                    binding.code, binding.player, binding.button
                )));
            }
        }
        Ok(KeyMap { map })
    }

    /// Look up the binding for a key code.
    pub fn get(&self, code: &str) -> Option<(Player, Button)> {
        self.map.get(code).copied()
    }

    /// Number of bound keys.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether no key is bound.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Built-in bindings: arrows/X/Z/Enter/Right Shift for player 1 and
/// WASD/K/J/H/G for player 2.
pub fn default_bindings() -> Vec<KeyBinding> {
    use Button::*;
    use Player::*;

    [
        // Player 1
        ("ArrowUp", One, Up),
        ("ArrowDown", One, Down),
        ("ArrowLeft", One, Left),
        ("ArrowRight", One, Right),
        ("KeyX", One, A),
        ("KeyZ", One, B),
        ("Enter", One, Start),
        ("ShiftRight", One, Select),
        // Player 2
        ("KeyW", Two, Up),
        ("KeyS", Two, Down),
        ("KeyA", Two, Left),
        ("KeyD", Two, Right),
        ("KeyK", Two, A),
        ("KeyJ", Two, B),
        ("KeyH", Two, Start),
        ("KeyG", Two, Select),
    ]
    .into_iter()
    .map(|(code, player, button)| KeyBinding::new(code, player, button))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_default_bindings_cover_both_players() {
        let map = KeyMap::from_bindings(&default_bindings()).unwrap();
        assert_eq!(map.len(), 16);
        for player in Player::ALL {
            let buttons: HashSet<Button> = default_bindings()
                .into_iter()
                .filter(|b| b.player == player)
                .map(|b| b.button)
                .collect();
            assert_eq!(buttons.len(), Button::ALL.len(), "{player}");
        }
        assert_eq!(map.get("KeyX"), Some((Player::One, Button::A)));
        assert_eq!(map.get("KeyW"), Some((Player::Two, Button::Up)));
        assert_eq!(map.get("Space"), None);
    }

    #[test]
    fn test_duplicate_code_rejected() {
        let bindings = vec![
            KeyBinding::new("KeyX", Player::One, Button::A),
            KeyBinding::new("KeyX", Player::Two, Button::A),
        ];
        let err = KeyMap::from_bindings(&bindings).unwrap_err();
        assert!(matches!(err, ShellError::Config(_)));
    }

    #[test]
    fn test_empty_code_rejected() {
        let bindings = vec![KeyBinding::new(" ", Player::One, Button::A)];
        assert!(KeyMap::from_bindings(&bindings).is_err());
    }

    #[test]
    fn test_binding_json_shape() {
        let binding: KeyBinding =
            serde_json::from_str(r#"{"code":"KeyQ","player":2,"button":"select"}"#).unwrap();
        assert_eq!(binding, KeyBinding::new("KeyQ", Player::Two, Button::Select));
        assert!(
            serde_json::from_str::<KeyBinding>(r#"{"code":"KeyQ","player":3,"button":"a"}"#)
                .is_err()
        );
    }
}
