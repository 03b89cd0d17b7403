//! Session: one emulation core bound to one set of host devices
//!
//! The session is the only owner of the synchronization layer. The host calls
//! into it from its event handlers (timer, keyboard, touch, gamepad
//! connection, visibility) and never touches the parts directly.

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

use crate::audio::{channel, AudioBackend, AudioProducer, BufferStats, VolumeControl};
use crate::clock::{FrameClock, TickReport, TickScheduler};
use crate::config::ShellConfig;
use crate::emulation::EmulationCore;
use crate::input::{Button, ControllerState, GamepadSource, InputAggregator, Player};
use crate::lifecycle::{LifecycleController, PlaybackState};
use crate::video::{DisplaySurface, VideoSink};
use crate::{Result, ShellError};

/// Host-side devices a session drives.
pub struct HostBindings {
    /// Repeating tick timer
    pub scheduler: Box<dyn TickScheduler>,
    /// Audio output factory
    pub audio_backend: Box<dyn AudioBackend>,
    /// Where frames are shown
    pub display: Box<dyn DisplaySurface>,
    /// Gamepad polling
    pub gamepads: Box<dyn GamepadSource>,
}

/// Diagnostic snapshot of a session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SessionStats {
    /// Playback state
    pub state: PlaybackState,
    /// Ticks attempted
    pub ticks: u64,
    /// Frames converted by the video sink
    pub frames_converted: u64,
    /// Ring buffer counters
    pub audio: BufferStats,
    /// Whether the audio device is open
    pub audio_device: bool,
    /// Registered gamepads
    pub connected_gamepads: usize,
    /// Times the tick schedule dropped a backlog
    pub pacing_resyncs: u64,
}

/// A running shell around one emulation core.
pub struct Session<C: EmulationCore> {
    core: C,
    config: ShellConfig,
    input: InputAggregator,
    clock: FrameClock,
    video: VideoSink,
    producer: AudioProducer,
    volume: VolumeControl,
    lifecycle: LifecycleController,
    display: Box<dyn DisplaySurface>,
    gamepads: Box<dyn GamepadSource>,
}

impl<C: EmulationCore> Session<C> {
    /// Validate `config` and assemble a stopped session with no image.
    pub fn new(core: C, config: ShellConfig, host: HostBindings) -> Result<Self> {
        config.validate()?;

        let input = InputAggregator::new(config.key_map()?, config.gamepad);
        let clock = FrameClock::new(config.frame_rate_hz);
        let (producer, consumer) = channel(config.audio.ring_capacity)?;
        let volume = producer.volume_control();
        volume.set_volume(config.audio.volume);
        volume.set_muted(config.audio.muted);

        let lifecycle = LifecycleController::new(
            host.scheduler,
            host.audio_backend,
            consumer,
            config.audio,
            clock.period(),
        );

        info!(
            frame_rate_hz = config.frame_rate_hz,
            sample_rate = config.audio.sample_rate,
            ring_capacity = producer.capacity(),
            "Session created"
        );

        Ok(Session {
            core,
            config,
            input,
            clock,
            video: VideoSink::new(),
            producer,
            volume,
            lifecycle,
            display: host.display,
            gamepads: host.gamepads,
        })
    }

    /// Hand a program image to the core.
    ///
    /// A rejected image is reported as [`ShellError::LoadFailure`] and leaves
    /// the session as it was, running or not.
    pub fn load_image(&mut self, image: &[u8]) -> Result<()> {
        if self.lifecycle.is_disposed() {
            return Err(ShellError::LoadFailure("session disposed".into()));
        }
        if let Err(err) = self.core.load_image(image) {
            warn!(%err, bytes = image.len(), "Image rejected");
            return Err(ShellError::LoadFailure(err.to_string()));
        }
        self.lifecycle.set_image_loaded(true);
        self.clock.image_loaded();
        info!(bytes = image.len(), "Image loaded");
        Ok(())
    }

    /// Start (or resume) ticking and audio output.
    pub fn start(&mut self) -> Result<()> {
        self.lifecycle.start()?;
        self.clock.reset_pacing();
        Ok(())
    }

    /// Same as [`start`](Self::start).
    pub fn resume(&mut self) -> Result<()> {
        self.start()
    }

    /// Pause audio and ticking; held inputs are released.
    pub fn suspend(&mut self) {
        self.lifecycle.suspend();
        self.input.release_all();
    }

    /// Stop audio and ticking, keeping the image.
    pub fn stop(&mut self) {
        self.lifecycle.stop();
        self.input.release_all();
    }

    /// Stop and forget the image.
    pub fn eject(&mut self) {
        self.lifecycle.eject();
        self.input.release_all();
    }

    /// End the session and release the audio device.
    pub fn dispose(&mut self) {
        self.lifecycle.dispose();
        self.input.release_all();
        info!(ticks = self.clock.ticks(), "Session disposed");
    }

    /// Timer callback: run the ticks due at host time `now`, then present.
    ///
    /// Does nothing unless running. Returns the number of ticks run.
    pub fn on_timer(&mut self, now: Duration) -> Result<u32> {
        if !self.lifecycle.is_running() {
            return Ok(0);
        }
        let due = self.clock.due(now);
        let mut ran = 0;
        let mut outcome = Ok(());
        for _ in 0..due {
            match self.tick() {
                Ok(Some(_)) => ran += 1,
                Ok(None) => break,
                Err(err) => {
                    outcome = Err(err);
                    break;
                }
            }
        }
        if ran > 0 {
            self.paint();
        }
        outcome.map(|()| ran)
    }

    /// Run exactly one tick if running.
    ///
    /// Returns `Ok(None)` when not running. A core failure stops the session
    /// and invalidates the image.
    pub fn tick(&mut self) -> Result<Option<TickReport>> {
        if !self.lifecycle.is_running() {
            return Ok(None);
        }
        let pads = self.gamepads.poll();
        let result = self.clock.tick(
            &mut self.core,
            &mut self.input,
            &pads,
            &mut self.video,
            &mut self.producer,
        );
        match result {
            Ok(report) => Ok(Some(report)),
            Err(err) => {
                self.lifecycle.fail();
                self.input.release_all();
                Err(err)
            }
        }
    }

    /// Present the newest converted frame. Returns whether it is new.
    pub fn paint(&mut self) -> bool {
        self.video.present(&mut *self.display)
    }

    /// Raw keyboard event; returns whether the code is bound.
    pub fn key_event(&mut self, code: &str, pressed: bool) -> bool {
        self.input.key_event(code, pressed)
    }

    /// Keyboard event already resolved to a player and button.
    pub fn set_key(&mut self, code: &str, player: Player, button: Button, pressed: bool) {
        self.input.set_key(code, player, button, pressed);
    }

    /// On-screen button touched.
    pub fn touch_start(&mut self, touch_id: i32, player: Player, button: Button) {
        self.input.touch_start(touch_id, player, button);
    }

    /// Touch point lifted.
    pub fn touch_end(&mut self, touch_id: i32) {
        self.input.touch_end(touch_id);
    }

    /// Gamepad connected.
    pub fn gamepad_connected(&mut self, index: u32) {
        self.input.gamepad_connected(index);
    }

    /// Gamepad disconnected.
    pub fn gamepad_disconnected(&mut self, index: u32) {
        self.input.gamepad_disconnected(index);
    }

    /// Merged input of `player` as of the last event or poll.
    pub fn controller_state(&self, player: Player) -> ControllerState {
        self.input.current_state(player)
    }

    /// Set output volume (0.0 to 1.0); applies from the next device pull.
    pub fn set_volume(&mut self, volume: f32) {
        self.volume.set_volume(volume);
    }

    /// Mute or unmute output.
    pub fn set_muted(&mut self, muted: bool) {
        self.volume.set_muted(muted);
    }

    /// Shared volume handle.
    pub fn volume_control(&self) -> VolumeControl {
        self.volume.clone()
    }

    /// Playback state
    pub fn state(&self) -> PlaybackState {
        self.lifecycle.state()
    }

    /// Whether a valid image is loaded
    pub fn has_image(&self) -> bool {
        self.lifecycle.has_image()
    }

    /// Diagnostics snapshot
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            state: self.lifecycle.state(),
            ticks: self.clock.ticks(),
            frames_converted: self.video.frames_converted(),
            audio: self.producer.stats(),
            audio_device: self.lifecycle.has_audio_device(),
            connected_gamepads: self.input.connected_gamepads(),
            pacing_resyncs: self.clock.pacer().resyncs(),
        }
    }

    /// Newest converted RGBA image
    pub fn frame(&self) -> &[u8] {
        self.video.frame()
    }

    /// Active configuration
    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    /// Tick period
    pub fn tick_period(&self) -> Duration {
        self.clock.period()
    }

    /// The emulation core
    pub fn core(&self) -> &C {
        &self.core
    }

    /// The emulation core, mutably
    pub fn core_mut(&mut self) -> &mut C {
        &mut self.core
    }
}

impl<C: EmulationCore> fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("lifecycle", &self.lifecycle)
            .field("clock", &self.clock)
            .field("video", &self.video)
            .field("producer", &self.producer)
            .finish_non_exhaustive()
    }
}
