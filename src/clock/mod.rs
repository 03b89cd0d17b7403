//! Frame clock
//!
//! One tick = read the merged controller state, forward changed buttons to
//! the core, advance the core exactly one frame, then publish the frame to the
//! video sink and the samples to the audio ring buffer.
//!
//! Output is staged while the core runs and published only if the step
//! succeeds, so a failed tick delivers neither its frame nor any of its
//! samples.

pub mod pacer;
pub mod scheduler;

pub use pacer::{FramePacer, FRAME_RATE_RANGE, MAX_CATCH_UP_TICKS};
pub use scheduler::{ManualScheduler, TickScheduler};

use serde::Serialize;
use std::time::Duration;
use tracing::{error, trace};

use crate::audio::{AudioProducer, StereoSample};
use crate::emulation::{CoreError, CoreOutput, EmulationCore};
use crate::input::{
    Button, ControllerState, GamepadSnapshot, InputAggregator, Player, PLAYER_COUNT,
};
use crate::video::{self, VideoSink};
use crate::{Result, ShellError};

/// NTSC frame rate
pub const DEFAULT_FRAME_RATE_HZ: f64 = 60.0;

/// Outcome of one successful tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// 1-based tick number since the clock was created
    pub tick: u64,
    /// Whether the core produced a video frame
    pub frame_delivered: bool,
    /// Stereo pairs pushed into the ring buffer
    pub samples_delivered: usize,
}

/// Collects one step's output before it is published.
#[derive(Default)]
struct TickStaging {
    frame: Vec<u32>,
    frame_seen: bool,
    samples: Vec<StereoSample>,
}

impl TickStaging {
    fn clear(&mut self) {
        self.frame_seen = false;
        self.samples.clear();
    }
}

impl CoreOutput for TickStaging {
    fn on_frame(&mut self, pixels: &[u32]) {
        self.frame.clear();
        self.frame.extend_from_slice(pixels);
        self.frame_seen = true;
    }

    fn on_sample(&mut self, left: f32, right: f32) {
        self.samples.push(StereoSample::new(left, right));
    }
}

/// Fixed-rate driver of the emulation core.
pub struct FrameClock {
    pacer: FramePacer,
    ticks: u64,
    /// Controller state last forwarded to the core
    applied: [ControllerState; PLAYER_COUNT],
    /// Send every button on the next tick (after an image load)
    full_sync: bool,
    staging: TickStaging,
}

impl FrameClock {
    /// Create a clock running at `frame_rate_hz`, clamped to
    /// [`FRAME_RATE_RANGE`].
    pub fn new(frame_rate_hz: f64) -> Self {
        FrameClock {
            pacer: FramePacer::from_rate(frame_rate_hz),
            ticks: 0,
            applied: [ControllerState::empty(); PLAYER_COUNT],
            full_sync: true,
            staging: TickStaging::default(),
        }
    }

    /// Timer period for one tick.
    pub fn period(&self) -> Duration {
        self.pacer.period()
    }

    /// Ticks attempted since creation.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Pacing state.
    pub fn pacer(&self) -> &FramePacer {
        &self.pacer
    }

    /// Ticks due at host time `now`, at most [`MAX_CATCH_UP_TICKS`].
    pub fn due(&mut self, now: Duration) -> u32 {
        self.pacer.due(now)
    }

    /// Re-anchor pacing, e.g. after a suspension.
    pub fn reset_pacing(&mut self) {
        self.pacer.reset();
    }

    /// A new image was loaded: the core's controllers start from scratch, so
    /// the next tick forwards every button.
    pub fn image_loaded(&mut self) {
        self.applied = [ControllerState::empty(); PLAYER_COUNT];
        self.full_sync = true;
    }

    /// Run one tick.
    ///
    /// On failure nothing of this tick reaches `video` or `audio` and the
    /// error is a [`ShellError::StepFailure`] carrying the tick number.
    pub fn tick<C: EmulationCore + ?Sized>(
        &mut self,
        core: &mut C,
        input: &mut InputAggregator,
        pads: &[GamepadSnapshot],
        video: &mut VideoSink,
        audio: &mut AudioProducer,
    ) -> Result<TickReport> {
        self.ticks += 1;
        let tick = self.ticks;

        let states = input.poll_devices(pads);
        self.apply_input(core, states);

        self.staging.clear();
        let step = core.advance_one_frame(&mut self.staging).and_then(|()| {
            if self.staging.frame_seen {
                video::check_frame(&self.staging.frame)
            } else {
                Ok(())
            }
        });
        if let Err(err) = step {
            let reason = match err {
                CoreError::Rejected(reason) | CoreError::Fault(reason) => reason,
            };
            error!(tick, %reason, "Core step failed");
            self.staging.clear();
            return Err(ShellError::StepFailure { tick, reason });
        }

        audio.push_samples(&self.staging.samples);
        if self.staging.frame_seen {
            video
                .convert(&self.staging.frame)
                .map_err(|err| ShellError::StepFailure {
                    tick,
                    reason: err.to_string(),
                })?;
        }

        let report = TickReport {
            tick,
            frame_delivered: self.staging.frame_seen,
            samples_delivered: self.staging.samples.len(),
        };
        trace!(?report, "Tick");
        Ok(report)
    }

    fn apply_input<C: EmulationCore + ?Sized>(
        &mut self,
        core: &mut C,
        states: [ControllerState; PLAYER_COUNT],
    ) {
        for player in Player::ALL {
            let state = states[player.index()];
            if self.full_sync {
                for button in Button::ALL {
                    core.set_button(player, button, state.is_held(button));
                }
            } else {
                for button in state.changed(self.applied[player.index()]) {
                    core.set_button(player, button, state.is_held(button));
                }
            }
        }
        self.applied = states;
        self.full_sync = false;
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_RATE_HZ)
    }
}

impl std::fmt::Debug for FrameClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameClock")
            .field("pacer", &self.pacer)
            .field("ticks", &self.ticks)
            .field("applied", &self.applied)
            .finish()
    }
}
