//! WebAssembly bindings for nes-shell
//!
//! Runs the jsnes emulation core in the browser behind the nes-shell
//! synchronization layer: a `setInterval` tick timer, canvas video, a Web
//! Audio script processor pulling the ring buffer, keyboard and gamepad
//! input, and suspend/resume on tab visibility.
//!
//! `jsnes` must be loaded as a global (`window.jsnes`) before the shell is
//! created.
//!
//! # Example Usage (JavaScript)
//!
//! ```javascript
//! import init, { NesShell } from './nes_shell_wasm.js';
//!
//! async function boot(romBytes) {
//!     await init();
//!
//!     const shell = new NesShell('screen', null);
//!     shell.load_rom(romBytes);
//!
//!     button.addEventListener('touchstart', (e) =>
//!         shell.touch_start(e.changedTouches[0].identifier, 1, 'a'));
//! }
//! ```

#![warn(missing_docs)]

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use nes_shell::{
    Button, HostBindings, Player, Session, ShellConfig, ShellError, FRAME_HEIGHT, FRAME_WIDTH,
};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

mod canvas;
mod events;
mod gamepad;
mod jsnes;
mod timer;
mod web_audio;

use canvas::CanvasSurface;
use events::Listeners;
use gamepad::NavigatorGamepads;
use jsnes::JsNesCore;
use timer::IntervalScheduler;
use web_audio::WebAudioBackend;

/// Session shared between the exported handle and browser callbacks.
pub(crate) type SharedSession = Rc<RefCell<Session<JsNesCore>>>;

/// Filled once the session exists; callbacks created before that see nothing.
pub(crate) type SessionSlot = Rc<RefCell<Weak<RefCell<Session<JsNesCore>>>>>;

/// Set panic hook for better error messages in the browser console
#[wasm_bindgen(start)]
pub fn init_panic_hook() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// Log to browser console
macro_rules! console_log {
    ($($t:tt)*) => {
        web_sys::console::log_1(&format!($($t)*).into());
    }
}

/// Warn in the browser console
macro_rules! console_warn {
    ($($t:tt)*) => {
        web_sys::console::warn_1(&format!($($t)*).into());
    }
}

pub(crate) use console_log;
pub(crate) use console_warn;

/// Errors raised while wiring the shell into the page.
#[derive(Debug, thiserror::Error)]
pub(crate) enum WebError {
    #[error("{0} is not available")]
    Missing(&'static str),

    #[error("no element with id '{0}'")]
    NoElement(String),

    #[error("{context}: {message}")]
    Js {
        context: &'static str,
        message: String,
    },

    #[error(transparent)]
    Shell(#[from] ShellError),
}

impl WebError {
    pub(crate) fn js(context: &'static str, value: &JsValue) -> Self {
        WebError::Js {
            context,
            message: js_error_message(value),
        }
    }
}

impl From<WebError> for JsValue {
    fn from(err: WebError) -> Self {
        JsValue::from_str(&err.to_string())
    }
}

/// Best-effort text of a thrown JS value.
pub(crate) fn js_error_message(value: &JsValue) -> String {
    if let Some(text) = value.as_string() {
        return text;
    }
    if let Some(err) = value.dyn_ref::<js_sys::Error>() {
        return String::from(err.message());
    }
    format!("{value:?}")
}

fn to_js(err: ShellError) -> JsValue {
    JsValue::from_str(&err.to_string())
}

fn parse_player(number: u8) -> Result<Player, JsValue> {
    Player::try_from(number).map_err(to_js)
}

fn parse_button(name: &str) -> Result<Button, JsValue> {
    name.parse::<Button>().map_err(to_js)
}

/// NES shell bound to a canvas on the page.
#[wasm_bindgen]
pub struct NesShell {
    session: SharedSession,
    listeners: Listeners,
}

#[wasm_bindgen]
impl NesShell {
    /// Create a shell drawing into the canvas with id `canvas_id`.
    ///
    /// `config_json` is an optional JSON configuration; missing fields keep
    /// their defaults.
    #[wasm_bindgen(constructor)]
    pub fn new(canvas_id: &str, config_json: Option<String>) -> Result<NesShell, JsValue> {
        Ok(Self::build(canvas_id, config_json.as_deref())?)
    }

    /// Load a ROM image and start playing it.
    ///
    /// A rejected image leaves whatever was running untouched. Audio trouble
    /// is only logged; video keeps going.
    pub fn load_rom(&self, data: &[u8]) -> Result<(), JsValue> {
        let mut session = self.session.borrow_mut();
        session.load_image(data).map_err(to_js)?;
        session.start().map_err(to_js)
    }

    /// Start (or restart) ticking the loaded image.
    pub fn start(&self) -> Result<(), JsValue> {
        self.session.borrow_mut().start().map_err(to_js)
    }

    /// Resume after [`suspend`](Self::suspend).
    pub fn resume(&self) -> Result<(), JsValue> {
        self.session.borrow_mut().resume().map_err(to_js)
    }

    /// Pause ticking and audio.
    pub fn suspend(&self) {
        self.session.borrow_mut().suspend();
    }

    /// Stop ticking and audio, keeping the ROM.
    pub fn stop(&self) {
        self.session.borrow_mut().stop();
    }

    /// Stop and forget the ROM.
    pub fn eject(&self) {
        self.session.borrow_mut().eject();
    }

    /// Tear down: stop, release the audio device and detach page listeners.
    pub fn dispose(&mut self) {
        self.listeners.remove();
        self.session.borrow_mut().dispose();
    }

    /// Keyboard event by `KeyboardEvent.code`; returns whether it is bound.
    ///
    /// Page keyboard events are already handled; this is for synthetic input.
    pub fn key(&self, code: &str, pressed: bool) -> bool {
        self.session.borrow_mut().key_event(code, pressed)
    }

    /// On-screen button pressed. `player` is 1 or 2, `button` one of
    /// `a`, `b`, `select`, `start`, `up`, `down`, `left`, `right`.
    pub fn touch_start(&self, touch_id: i32, player: u8, button: &str) -> Result<(), JsValue> {
        let player = parse_player(player)?;
        let button = parse_button(button)?;
        self.session
            .borrow_mut()
            .touch_start(touch_id, player, button);
        Ok(())
    }

    /// On-screen button released.
    pub fn touch_end(&self, touch_id: i32) {
        self.session.borrow_mut().touch_end(touch_id);
    }

    /// Set output volume (0.0 to 1.0)
    pub fn set_volume(&self, volume: f32) {
        self.session.borrow_mut().set_volume(volume);
    }

    /// Get output volume
    pub fn volume(&self) -> f32 {
        self.session.borrow().volume_control().volume()
    }

    /// Mute or unmute
    pub fn set_muted(&self, muted: bool) {
        self.session.borrow_mut().set_muted(muted);
    }

    /// Playback state: "stopped", "running" or "suspended"
    pub fn state(&self) -> String {
        self.session.borrow().state().to_string()
    }

    /// Whether a ROM is loaded
    pub fn has_rom(&self) -> bool {
        self.session.borrow().has_image()
    }

    /// Number of connected gamepads
    pub fn connected_gamepads(&self) -> u32 {
        self.session.borrow().stats().connected_gamepads as u32
    }

    /// Diagnostics snapshot as a plain JS object
    pub fn stats(&self) -> Result<JsValue, JsValue> {
        let stats = self.session.borrow().stats();
        serde_wasm_bindgen::to_value(&stats).map_err(|e| JsValue::from_str(&e.to_string()))
    }
}

impl NesShell {
    fn build(canvas_id: &str, config_json: Option<&str>) -> Result<NesShell, WebError> {
        let window = web_sys::window().ok_or(WebError::Missing("window"))?;
        let document = window.document().ok_or(WebError::Missing("document"))?;

        let config = match config_json {
            Some(json) => ShellConfig::from_json_str(json)?,
            None => ShellConfig::default(),
        };

        let canvas = document
            .get_element_by_id(canvas_id)
            .ok_or_else(|| WebError::NoElement(canvas_id.to_string()))?
            .dyn_into::<web_sys::HtmlCanvasElement>()
            .map_err(|el| WebError::js("element is not a canvas", &el))?;
        canvas.set_width(FRAME_WIDTH as u32);
        canvas.set_height(FRAME_HEIGHT as u32);
        let display = CanvasSurface::new(&canvas)?;

        let core = JsNesCore::new(config.audio.sample_rate)?;

        let slot: SessionSlot = Rc::new(RefCell::new(Weak::new()));
        let host = HostBindings {
            scheduler: Box::new(IntervalScheduler::new(window.clone(), Rc::clone(&slot))),
            audio_backend: Box::new(WebAudioBackend),
            display: Box::new(display),
            gamepads: Box::new(NavigatorGamepads::new(window.navigator())),
        };

        let session: SharedSession = Rc::new(RefCell::new(Session::new(core, config, host)?));
        *slot.borrow_mut() = Rc::downgrade(&session);
        session.borrow_mut().paint();

        let listeners = Listeners::install(&window, &document, &session)?;

        console_log!("nes-shell ready");
        Ok(NesShell { session, listeners })
    }
}

impl Drop for NesShell {
    fn drop(&mut self) {
        self.listeners.remove();
    }
}
