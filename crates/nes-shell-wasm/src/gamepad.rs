//! Gamepad polling through `navigator.getGamepads()`

use nes_shell::{GamepadSnapshot, GamepadSource};
use wasm_bindgen::JsCast;
use web_sys::{Gamepad, GamepadButton, Navigator};

/// Reads every connected pad once per tick.
pub(crate) struct NavigatorGamepads {
    navigator: Navigator,
}

impl NavigatorGamepads {
    pub(crate) fn new(navigator: Navigator) -> Self {
        NavigatorGamepads { navigator }
    }
}

fn snapshot(pad: &Gamepad) -> GamepadSnapshot {
    let buttons = pad
        .buttons()
        .iter()
        .map(|button| {
            button
                .dyn_into::<GamepadButton>()
                .map(|b| b.pressed())
                .unwrap_or(false)
        })
        .collect();
    let axes = pad
        .axes()
        .iter()
        .map(|axis| axis.as_f64().unwrap_or(0.0) as f32)
        .collect();

    GamepadSnapshot {
        index: pad.index(),
        buttons,
        axes,
    }
}

impl GamepadSource for NavigatorGamepads {
    fn poll(&mut self) -> Vec<GamepadSnapshot> {
        // Unsupported or blocked (insecure context): no pads
        let Ok(pads) = self.navigator.get_gamepads() else {
            return Vec::new();
        };
        pads.iter()
            .filter_map(|entry| entry.dyn_into::<Gamepad>().ok())
            .filter(|pad| pad.connected())
            .map(|pad| snapshot(&pad))
            .collect()
    }
}
