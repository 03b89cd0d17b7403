//! jsnes as an [`EmulationCore`]
//!
//! jsnes reports output through callbacks invoked synchronously from
//! `frame()`. They write into a shared tap that is drained into the
//! [`CoreOutput`] once the frame returns.

use std::cell::RefCell;
use std::rc::Rc;

use nes_shell::{Button, CoreError, CoreOutput, EmulationCore, Player};
use wasm_bindgen::prelude::*;

use crate::{console_log, js_error_message, WebError};

#[wasm_bindgen(js_namespace = jsnes)]
extern "C" {
    #[wasm_bindgen(js_name = NES)]
    type Nes;

    #[wasm_bindgen(constructor, js_class = "NES", catch)]
    fn new(options: &js_sys::Object) -> Result<Nes, JsValue>;

    #[wasm_bindgen(method, catch, js_name = loadROM)]
    fn load_rom(this: &Nes, data: &str) -> Result<(), JsValue>;

    #[wasm_bindgen(method, catch)]
    fn frame(this: &Nes) -> Result<(), JsValue>;

    #[wasm_bindgen(method, js_name = buttonDown)]
    fn button_down(this: &Nes, controller: u8, button: u8);

    #[wasm_bindgen(method, js_name = buttonUp)]
    fn button_up(this: &Nes, controller: u8, button: u8);
}

/// Output collected during one `frame()` call.
#[derive(Default)]
struct Tap {
    pixels: Vec<u32>,
    frame_ready: bool,
    samples: Vec<(f32, f32)>,
}

/// jsnes instance plus the callbacks it holds on to.
pub(crate) struct JsNesCore {
    nes: Nes,
    tap: Rc<RefCell<Tap>>,
    _on_frame: Closure<dyn FnMut(JsValue)>,
    _on_audio_sample: Closure<dyn FnMut(f32, f32)>,
    _on_status_update: Closure<dyn FnMut(JsValue)>,
}

impl JsNesCore {
    pub(crate) fn new(sample_rate: u32) -> Result<Self, WebError> {
        let tap = Rc::new(RefCell::new(Tap::default()));

        let frame_tap = Rc::clone(&tap);
        let on_frame = Closure::wrap(Box::new(move |buffer: JsValue| {
            let mut tap = frame_tap.borrow_mut();
            tap.pixels = js_sys::Uint32Array::new(&buffer).to_vec();
            tap.frame_ready = true;
        }) as Box<dyn FnMut(JsValue)>);

        let audio_tap = Rc::clone(&tap);
        let on_audio_sample = Closure::wrap(Box::new(move |left: f32, right: f32| {
            audio_tap.borrow_mut().samples.push((left, right));
        }) as Box<dyn FnMut(f32, f32)>);

        let on_status_update = Closure::wrap(Box::new(|status: JsValue| {
            console_log!("jsnes: {}", js_error_message(&status));
        }) as Box<dyn FnMut(JsValue)>);

        let options = js_sys::Object::new();
        let set = |key: &str, value: &JsValue| {
            js_sys::Reflect::set(&options, &JsValue::from_str(key), value)
                .map(|_| ())
                .map_err(|e| WebError::js("building jsnes options", &e))
        };
        set("onFrame", on_frame.as_ref())?;
        set("onAudioSample", on_audio_sample.as_ref())?;
        set("onStatusUpdate", on_status_update.as_ref())?;
        set("sampleRate", &JsValue::from(sample_rate))?;

        let nes = Nes::new(&options).map_err(|e| WebError::js("creating jsnes", &e))?;

        Ok(JsNesCore {
            nes,
            tap,
            _on_frame: on_frame,
            _on_audio_sample: on_audio_sample,
            _on_status_update: on_status_update,
        })
    }
}

/// jsnes reads ROMs as binary strings: one char per byte.
fn binary_string(data: &[u8]) -> String {
    data.iter().map(|&b| char::from(b)).collect()
}

impl EmulationCore for JsNesCore {
    fn load_image(&mut self, image: &[u8]) -> Result<(), CoreError> {
        self.nes
            .load_rom(&binary_string(image))
            .map_err(|e| CoreError::Rejected(js_error_message(&e)))
    }

    fn set_button(&mut self, player: Player, button: Button, pressed: bool) {
        let controller = player.number();
        let index = button.index();
        if pressed {
            self.nes.button_down(controller, index);
        } else {
            self.nes.button_up(controller, index);
        }
    }

    fn advance_one_frame(&mut self, output: &mut dyn CoreOutput) -> Result<(), CoreError> {
        {
            let mut tap = self.tap.borrow_mut();
            tap.frame_ready = false;
            tap.samples.clear();
        }

        self.nes
            .frame()
            .map_err(|e| CoreError::Fault(js_error_message(&e)))?;

        let tap = self.tap.borrow();
        if tap.frame_ready {
            output.on_frame(&tap.pixels);
        }
        for &(left, right) in &tap.samples {
            output.on_sample(left, right);
        }
        Ok(())
    }
}
