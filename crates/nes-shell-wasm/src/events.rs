//! Page event listeners
//!
//! Keyboard and gamepad connection events feed the input aggregator; the
//! page visibility suspends and resumes the session.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use nes_shell::{PlaybackState, Session};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Document, EventTarget, GamepadEvent, KeyboardEvent, Window};

use crate::jsnes::JsNesCore;
use crate::{console_warn, SharedSession, WebError};

type EventClosure = Closure<dyn FnMut(web_sys::Event)>;

/// Listeners attached to the page, detached on [`remove`](Self::remove).
pub(crate) struct Listeners {
    attached: Vec<(EventTarget, &'static str, EventClosure)>,
}

/// Run `f` against the session if it is alive and not already borrowed.
fn with_session(
    weak: &Weak<RefCell<Session<JsNesCore>>>,
    f: impl FnOnce(&mut Session<JsNesCore>),
) {
    if let Some(session) = weak.upgrade() {
        if let Ok(mut session) = session.try_borrow_mut() {
            f(&mut session);
        }
    }
}

impl Listeners {
    pub(crate) fn install(
        window: &Window,
        document: &Document,
        session: &SharedSession,
    ) -> Result<Self, WebError> {
        let mut listeners = Listeners {
            attached: Vec::new(),
        };
        let window_target: &EventTarget = window.as_ref();
        let document_target: &EventTarget = document.as_ref();

        for (name, pressed) in [("keydown", true), ("keyup", false)] {
            let weak = Rc::downgrade(session);
            listeners.attach(window_target, name, move |event| {
                let Some(event) = event.dyn_ref::<KeyboardEvent>() else {
                    return;
                };
                if pressed && event.repeat() {
                    return;
                }
                with_session(&weak, |session| {
                    if session.key_event(&event.code(), pressed) {
                        event.prevent_default();
                    }
                });
            })?;
        }

        for (name, connected) in [("gamepadconnected", true), ("gamepaddisconnected", false)] {
            let weak = Rc::downgrade(session);
            listeners.attach(window_target, name, move |event| {
                let Some(pad) = event.dyn_ref::<GamepadEvent>().and_then(|e| e.gamepad()) else {
                    return;
                };
                with_session(&weak, |session| {
                    if connected {
                        session.gamepad_connected(pad.index());
                    } else {
                        session.gamepad_disconnected(pad.index());
                    }
                });
            })?;
        }

        let weak = Rc::downgrade(session);
        let page = document.clone();
        listeners.attach(document_target, "visibilitychange", move |_| {
            with_session(&weak, |session| {
                if page.hidden() {
                    session.suspend();
                } else if session.state() == PlaybackState::Suspended {
                    if let Err(err) = session.resume() {
                        console_warn!("Resume failed: {err}");
                    }
                }
            });
        })?;

        Ok(listeners)
    }

    fn attach(
        &mut self,
        target: &EventTarget,
        name: &'static str,
        handler: impl FnMut(web_sys::Event) + 'static,
    ) -> Result<(), WebError> {
        let closure = Closure::wrap(Box::new(handler) as Box<dyn FnMut(web_sys::Event)>);
        target
            .add_event_listener_with_callback(name, closure.as_ref().unchecked_ref())
            .map_err(|e| WebError::js("adding event listener", &e))?;
        self.attached.push((target.clone(), name, closure));
        Ok(())
    }

    /// Detach everything. Idempotent.
    pub(crate) fn remove(&mut self) {
        for (target, name, closure) in self.attached.drain(..) {
            let _ = target.remove_event_listener_with_callback(name, closure.as_ref().unchecked_ref());
        }
    }
}
