//! Lifecycle controller
//!
//! Owns the tick timer and the audio output device and moves them together
//! through Stopped, Running and Suspended.
//!
//! Start order: check that an image is loaded, arm the timer, then resume the
//! audio device (or open it the first time). Suspend and stop run the other
//! way round: audio first, then the timer.

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::audio::{AudioBackend, AudioConfig, AudioConsumer, AudioOutput};
use crate::clock::TickScheduler;
use crate::{Result, ShellError};

/// Session playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    /// Not ticking; the default and the state after any failure
    #[default]
    Stopped,
    /// Timer armed, core advancing, audio pulling
    Running,
    /// Paused by the host (hidden tab, lost focus); resumable
    Suspended,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PlaybackState::Stopped => "stopped",
            PlaybackState::Running => "running",
            PlaybackState::Suspended => "suspended",
        })
    }
}

/// Starts and stops the timer and the audio device as one unit.
pub struct LifecycleController {
    state: PlaybackState,
    scheduler: Box<dyn TickScheduler>,
    backend: Box<dyn AudioBackend>,
    audio_config: AudioConfig,
    /// Ring buffer endpoint waiting for a device to own it
    pending: Option<AudioConsumer>,
    /// Created at most once
    device: Option<Box<dyn AudioOutput>>,
    image_loaded: bool,
    disposed: bool,
    period: Duration,
}

impl LifecycleController {
    /// Create a stopped controller.
    ///
    /// `consumer` is handed to the audio backend on the first successful
    /// start.
    pub fn new(
        scheduler: Box<dyn TickScheduler>,
        backend: Box<dyn AudioBackend>,
        consumer: AudioConsumer,
        audio_config: AudioConfig,
        period: Duration,
    ) -> Self {
        LifecycleController {
            state: PlaybackState::Stopped,
            scheduler,
            backend,
            audio_config,
            pending: Some(consumer),
            device: None,
            image_loaded: false,
            disposed: false,
            period,
        }
    }

    /// Current state
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Whether ticks should run
    pub fn is_running(&self) -> bool {
        self.state == PlaybackState::Running
    }

    /// Whether a loaded image is ready to run
    pub fn has_image(&self) -> bool {
        self.image_loaded
    }

    /// Whether the audio device has been opened
    pub fn has_audio_device(&self) -> bool {
        self.device.is_some()
    }

    /// Whether the audio device exists and is pulling
    pub fn audio_running(&self) -> bool {
        self.device.as_ref().is_some_and(|d| d.is_running())
    }

    /// Whether [`dispose`](Self::dispose) was called
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Record whether a valid image is loaded.
    pub fn set_image_loaded(&mut self, loaded: bool) {
        self.image_loaded = loaded;
    }

    /// Stopped or Suspended to Running.
    ///
    /// Fails with [`ShellError::LoadFailure`] when no valid image is loaded.
    /// An audio device that cannot be opened is logged and skipped; video
    /// keeps running and the next start tries again.
    pub fn start(&mut self) -> Result<()> {
        if self.state == PlaybackState::Running {
            return Ok(());
        }
        if self.disposed {
            return Err(ShellError::LoadFailure("session disposed".into()));
        }
        if !self.image_loaded {
            return Err(ShellError::LoadFailure("no image loaded".into()));
        }

        self.scheduler.start(self.period)?;
        self.start_audio();

        let previous = std::mem::replace(&mut self.state, PlaybackState::Running);
        info!(from = ?previous, audio = self.audio_running(), "Session running");
        Ok(())
    }

    /// Alias of [`start`](Self::start) for hosts that distinguish the two.
    pub fn resume(&mut self) -> Result<()> {
        self.start()
    }

    /// Running to Suspended. No effect in other states.
    pub fn suspend(&mut self) {
        if self.state != PlaybackState::Running {
            return;
        }
        self.halt();
        self.state = PlaybackState::Suspended;
        info!("Session suspended");
    }

    /// Any state to Stopped. The loaded image is kept.
    pub fn stop(&mut self) {
        if self.state == PlaybackState::Stopped {
            return;
        }
        self.halt();
        self.state = PlaybackState::Stopped;
        info!("Session stopped");
    }

    /// Stop after a fatal core error. The image must be reloaded before the
    /// next start.
    pub fn fail(&mut self) {
        self.halt();
        self.state = PlaybackState::Stopped;
        self.image_loaded = false;
        warn!("Session stopped after core failure; reload the image to continue");
    }

    /// Stop and forget the image.
    pub fn eject(&mut self) {
        self.stop();
        self.image_loaded = false;
    }

    /// Stop for good and release the audio device.
    pub fn dispose(&mut self) {
        self.stop();
        self.scheduler.cancel();
        self.image_loaded = false;
        self.disposed = true;
        if self.device.take().is_some() {
            debug!("Audio device released");
        }
        self.pending = None;
    }

    fn start_audio(&mut self) {
        if let Some(device) = self.device.as_mut() {
            if let Err(err) = device.resume() {
                warn!(%err, "Audio device did not resume; continuing without sound");
            }
            return;
        }

        let Some(consumer) = self.pending.take() else {
            return;
        };
        match self.backend.open(consumer, &self.audio_config) {
            Ok(device) => {
                info!(
                    sample_rate = self.audio_config.sample_rate,
                    block_frames = self.audio_config.block_frames,
                    latency_ms = self.audio_config.latency_ms(),
                    "Audio device opened"
                );
                self.device = Some(device);
            }
            Err(err) => {
                warn!(reason = %err.reason, "Audio device unavailable; continuing without sound");
                self.pending = Some(err.consumer);
            }
        }
    }

    /// Audio first, then the timer.
    fn halt(&mut self) {
        if let Some(device) = self.device.as_mut() {
            if let Err(err) = device.suspend() {
                warn!(%err, "Audio device did not suspend");
            }
        }
        self.scheduler.cancel();
    }
}

impl fmt::Debug for LifecycleController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleController")
            .field("state", &self.state)
            .field("image_loaded", &self.image_loaded)
            .field("audio_device", &self.device.is_some())
            .field("scheduler_active", &self.scheduler.is_active())
            .field("disposed", &self.disposed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{channel, OpenError};
    use crate::clock::ManualScheduler;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<&'static str>>>;

    struct LoggingScheduler {
        log: Log,
        active: bool,
    }

    impl TickScheduler for LoggingScheduler {
        fn start(&mut self, _period: Duration) -> Result<()> {
            self.log.borrow_mut().push("timer start");
            self.active = true;
            Ok(())
        }

        fn cancel(&mut self) {
            if self.active {
                self.log.borrow_mut().push("timer cancel");
            }
            self.active = false;
        }

        fn is_active(&self) -> bool {
            self.active
        }
    }

    struct LoggingDevice {
        log: Log,
        running: bool,
        _consumer: AudioConsumer,
    }

    impl AudioOutput for LoggingDevice {
        fn resume(&mut self) -> Result<()> {
            self.log.borrow_mut().push("audio resume");
            self.running = true;
            Ok(())
        }

        fn suspend(&mut self) -> Result<()> {
            self.log.borrow_mut().push("audio suspend");
            self.running = false;
            Ok(())
        }

        fn is_running(&self) -> bool {
            self.running
        }
    }

    struct LoggingBackend {
        log: Log,
        refuse: usize,
    }

    impl AudioBackend for LoggingBackend {
        fn open(
            &mut self,
            consumer: AudioConsumer,
            _config: &AudioConfig,
        ) -> std::result::Result<Box<dyn AudioOutput>, OpenError> {
            if self.refuse > 0 {
                self.refuse -= 1;
                self.log.borrow_mut().push("audio refused");
                return Err(OpenError::new("autoplay blocked", consumer));
            }
            self.log.borrow_mut().push("audio open");
            Ok(Box::new(LoggingDevice {
                log: Rc::clone(&self.log),
                running: true,
                _consumer: consumer,
            }))
        }
    }

    fn controller(refuse: usize) -> (LifecycleController, Log) {
        let log: Log = Rc::default();
        let (_producer, consumer) = channel(64).unwrap();
        let controller = LifecycleController::new(
            Box::new(LoggingScheduler {
                log: Rc::clone(&log),
                active: false,
            }),
            Box::new(LoggingBackend {
                log: Rc::clone(&log),
                refuse,
            }),
            consumer,
            AudioConfig::default(),
            Duration::from_millis(16),
        );
        (controller, log)
    }

    #[test]
    fn test_start_without_image_fails() {
        let (mut lc, log) = controller(0);
        let err = lc.start().unwrap_err();
        assert!(matches!(err, ShellError::LoadFailure(_)));
        assert_eq!(lc.state(), PlaybackState::Stopped);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_start_and_suspend_order() {
        let (mut lc, log) = controller(0);
        lc.set_image_loaded(true);
        lc.start().unwrap();
        lc.suspend();
        lc.start().unwrap();
        lc.stop();

        assert_eq!(
            *log.borrow(),
            vec![
                "timer start",
                "audio open",
                "audio suspend",
                "timer cancel",
                "timer start",
                "audio resume",
                "audio suspend",
                "timer cancel",
            ]
        );
        assert_eq!(lc.state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_device_opened_once() {
        let (mut lc, log) = controller(0);
        lc.set_image_loaded(true);
        for _ in 0..3 {
            lc.start().unwrap();
            lc.suspend();
        }
        let opens = log.borrow().iter().filter(|e| **e == "audio open").count();
        assert_eq!(opens, 1);
    }

    #[test]
    fn test_open_failure_retried_on_next_start() {
        let (mut lc, log) = controller(1);
        lc.set_image_loaded(true);

        lc.start().unwrap();
        assert_eq!(lc.state(), PlaybackState::Running);
        assert!(!lc.has_audio_device());

        lc.stop();
        lc.start().unwrap();
        assert!(lc.audio_running());
        assert_eq!(
            *log.borrow(),
            vec![
                "timer start",
                "audio refused",
                "timer cancel",
                "timer start",
                "audio open",
            ]
        );
    }

    #[test]
    fn test_fail_requires_reload() {
        let (mut lc, _log) = controller(0);
        lc.set_image_loaded(true);
        lc.start().unwrap();
        lc.fail();
        assert_eq!(lc.state(), PlaybackState::Stopped);
        assert!(matches!(lc.start(), Err(ShellError::LoadFailure(_))));

        lc.set_image_loaded(true);
        assert!(lc.start().is_ok());
    }

    #[test]
    fn test_suspend_only_from_running() {
        let (mut lc, log) = controller(0);
        lc.suspend();
        assert_eq!(lc.state(), PlaybackState::Stopped);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_dispose_releases_device() {
        let scheduler = ManualScheduler::new();
        let (_producer, consumer) = channel(64).unwrap();
        let log: Log = Rc::default();
        let mut lc = LifecycleController::new(
            Box::new(scheduler.clone()),
            Box::new(LoggingBackend {
                log: Rc::clone(&log),
                refuse: 0,
            }),
            consumer,
            AudioConfig::default(),
            Duration::from_millis(16),
        );
        lc.set_image_loaded(true);
        lc.start().unwrap();
        assert!(scheduler.is_active());

        lc.dispose();
        assert!(!scheduler.is_active());
        assert!(!lc.has_audio_device());
        assert!(lc.is_disposed());
        lc.set_image_loaded(true);
        assert!(lc.start().is_err());
    }
}
