//! `setInterval` tick timer

use std::rc::Rc;
use std::time::Duration;

use nes_shell::{ShellError, TickScheduler};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::Window;

use crate::{console_warn, js_error_message, SessionSlot};

/// Interval delay for `period`, rounded down so firings are never late.
fn interval_millis(period: Duration) -> i32 {
    i32::try_from(period.as_millis()).unwrap_or(i32::MAX).max(1)
}

/// Fires the session's timer handler with `performance.now()`.
pub(crate) struct IntervalScheduler {
    window: Window,
    slot: SessionSlot,
    handle: Option<i32>,
    // Kept across cancel: a failing tick cancels from inside this callback
    callback: Option<Closure<dyn FnMut()>>,
}

impl IntervalScheduler {
    pub(crate) fn new(window: Window, slot: SessionSlot) -> Self {
        IntervalScheduler {
            window,
            slot,
            handle: None,
            callback: None,
        }
    }

    fn callback(&mut self) -> &Closure<dyn FnMut()> {
        let slot = Rc::clone(&self.slot);
        let performance = self.window.performance();
        self.callback.get_or_insert_with(|| {
            Closure::wrap(Box::new(move || {
                let Some(session) = slot.borrow().upgrade() else {
                    return;
                };
                // Re-entrant firing (e.g. from a nested event loop): skip it
                let Ok(mut session) = session.try_borrow_mut() else {
                    return;
                };
                let now_ms = performance.as_ref().map_or(0.0, |p| p.now());
                let now = Duration::from_secs_f64(now_ms.max(0.0) / 1000.0);
                if let Err(err) = session.on_timer(now) {
                    console_warn!("Emulation stopped: {err}");
                }
            }) as Box<dyn FnMut()>)
        })
    }
}

impl TickScheduler for IntervalScheduler {
    fn start(&mut self, period: Duration) -> nes_shell::Result<()> {
        self.cancel();
        let delay = interval_millis(period);
        let function = self.callback().as_ref().unchecked_ref::<js_sys::Function>().clone();
        let handle = self
            .window
            .set_interval_with_callback_and_timeout_and_arguments_0(&function, delay)
            .map_err(|e| {
                ShellError::DeviceUnavailable(format!(
                    "setInterval failed: {}",
                    js_error_message(&e)
                ))
            })?;
        self.handle = Some(handle);
        Ok(())
    }

    fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.window.clear_interval_with_handle(handle);
        }
    }

    fn is_active(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for IntervalScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}
