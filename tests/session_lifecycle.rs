//! Integration tests for the session pipeline
//!
//! A scripted core, a manual scheduler and recording host devices stand in
//! for the browser, so the tests can check what reaches the display and the
//! audio device tick by tick.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use approx::assert_relative_eq;
use nes_shell::audio::{AudioConsumer, OpenError, StereoSample};
use nes_shell::video::FRAME_PIXELS;
use nes_shell::{
    AudioBackend, AudioConfig, AudioOutput, Button, CoreError, CoreOutput, EmulationCore,
    GamepadSnapshot, GamepadSource, HostBindings, ManualScheduler, PlaybackState, Player, Session,
    ShellConfig, ShellError, TickScheduler,
};

const SAMPLES_PER_FRAME: usize = 735;

/// Emits frame `n` as a flat image of value `n` and 735 samples whose left
/// channel encodes the frame number.
#[derive(Default)]
struct ScriptedCore {
    frames: u64,
    fail_at: Option<u64>,
    held: [[bool; 8]; 2],
}

impl ScriptedCore {
    fn held(&self, player: Player, button: Button) -> bool {
        self.held[player.index()][button.index() as usize]
    }
}

impl EmulationCore for ScriptedCore {
    fn load_image(&mut self, image: &[u8]) -> Result<(), CoreError> {
        if !image.starts_with(b"NES\x1a") {
            return Err(CoreError::Rejected("missing iNES header".into()));
        }
        self.frames = 0;
        Ok(())
    }

    fn set_button(&mut self, player: Player, button: Button, pressed: bool) {
        self.held[player.index()][button.index() as usize] = pressed;
    }

    fn advance_one_frame(&mut self, output: &mut dyn CoreOutput) -> Result<(), CoreError> {
        self.frames += 1;
        let frame = self.frames;
        let level = frame as f32 / 1000.0;
        for _ in 0..SAMPLES_PER_FRAME {
            output.on_sample(level, -level);
        }
        output.on_frame(&vec![frame as u32; FRAME_PIXELS]);
        if self.fail_at == Some(frame) {
            return Err(CoreError::Fault(format!("jammed at frame {frame}")));
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
struct Display {
    presented: Rc<RefCell<Vec<u8>>>,
    count: Rc<RefCell<usize>>,
}

impl nes_shell::DisplaySurface for Display {
    fn present(&mut self, rgba: &[u8], width: u32, height: u32) {
        assert_eq!((width, height), (256, 240));
        *self.presented.borrow_mut() = rgba.to_vec();
        *self.count.borrow_mut() += 1;
    }
}

#[derive(Clone, Default)]
struct Pads {
    snapshots: Rc<RefCell<Vec<GamepadSnapshot>>>,
}

impl GamepadSource for Pads {
    fn poll(&mut self) -> Vec<GamepadSnapshot> {
        self.snapshots.borrow().clone()
    }
}

/// Audio backend that parks the consumer where the test can drain it.
#[derive(Clone, Default)]
struct Speaker {
    consumer: Rc<RefCell<Option<AudioConsumer>>>,
    opens: Rc<RefCell<usize>>,
    refusals_left: Rc<RefCell<usize>>,
    running: Rc<RefCell<bool>>,
}

impl Speaker {
    fn pull(&self, frames: usize) -> Vec<StereoSample> {
        self.consumer
            .borrow_mut()
            .as_mut()
            .expect("device not open")
            .pull_block(frames)
    }

    fn available(&self) -> usize {
        self.consumer.borrow().as_ref().map_or(0, |c| c.available())
    }
}

struct SpeakerDevice(Speaker);

impl AudioOutput for SpeakerDevice {
    fn resume(&mut self) -> nes_shell::Result<()> {
        *self.0.running.borrow_mut() = true;
        Ok(())
    }

    fn suspend(&mut self) -> nes_shell::Result<()> {
        *self.0.running.borrow_mut() = false;
        Ok(())
    }

    fn is_running(&self) -> bool {
        *self.0.running.borrow()
    }
}

impl AudioBackend for Speaker {
    fn open(
        &mut self,
        consumer: AudioConsumer,
        _config: &AudioConfig,
    ) -> Result<Box<dyn AudioOutput>, OpenError> {
        let mut refusals = self.refusals_left.borrow_mut();
        if *refusals > 0 {
            *refusals -= 1;
            return Err(OpenError::new("user gesture required", consumer));
        }
        *self.opens.borrow_mut() += 1;
        *self.consumer.borrow_mut() = Some(consumer);
        *self.running.borrow_mut() = true;
        Ok(Box::new(SpeakerDevice(self.clone())))
    }
}

struct Rig {
    session: Session<ScriptedCore>,
    scheduler: ManualScheduler,
    display: Display,
    pads: Pads,
    speaker: Speaker,
}

fn rig_with(core: ScriptedCore, refusals: usize) -> Rig {
    let scheduler = ManualScheduler::new();
    let display = Display::default();
    let pads = Pads::default();
    let speaker = Speaker::default();
    *speaker.refusals_left.borrow_mut() = refusals;

    let session = Session::new(
        core,
        ShellConfig::default(),
        HostBindings {
            scheduler: Box::new(scheduler.clone()),
            audio_backend: Box::new(speaker.clone()),
            display: Box::new(display.clone()),
            gamepads: Box::new(pads.clone()),
        },
    )
    .expect("default config is valid");

    Rig {
        session,
        scheduler,
        display,
        pads,
        speaker,
    }
}

fn rig() -> Rig {
    rig_with(ScriptedCore::default(), 0)
}

const ROM: &[u8] = b"NES\x1a\x02\x01\x00\x00";

#[test]
fn test_start_without_image_is_load_failure() {
    let mut rig = rig();

    let err = rig.session.start().unwrap_err();
    assert!(matches!(err, ShellError::LoadFailure(_)));
    assert_eq!(rig.session.state(), PlaybackState::Stopped);
    assert!(!rig.scheduler.is_active());

    // A stray timer firing does nothing
    assert_eq!(rig.session.on_timer(Duration::from_secs(1)).unwrap(), 0);
    assert!(rig.session.tick().unwrap().is_none());
    assert_eq!(rig.session.core().frames, 0);
    assert_eq!(rig.session.stats().ticks, 0);
}

#[test]
fn test_stop_start_after_eject_is_load_failure() {
    let mut rig = rig();
    rig.session.load_image(ROM).unwrap();
    rig.session.start().unwrap();
    rig.session.stop();
    rig.session.eject();

    assert!(matches!(rig.session.start(), Err(ShellError::LoadFailure(_))));
    assert_eq!(rig.session.on_timer(Duration::from_secs(2)).unwrap(), 0);
    assert_eq!(rig.session.core().frames, 0);
}

#[test]
fn test_step_failure_at_tick_ten() {
    let mut rig = rig_with(
        ScriptedCore {
            fail_at: Some(10),
            ..Default::default()
        },
        0,
    );
    rig.session.load_image(ROM).unwrap();
    rig.session.start().unwrap();

    for expected in 1..=9 {
        let report = rig.session.tick().unwrap().expect("running");
        assert_eq!(report.tick, expected);
        assert!(report.frame_delivered);
        assert_eq!(report.samples_delivered, SAMPLES_PER_FRAME);
    }
    let err = rig.session.tick().unwrap_err();
    assert!(matches!(err, ShellError::StepFailure { tick: 10, .. }), "{err}");

    // Nine frames and their samples, nothing from tick 10
    let stats = rig.session.stats();
    assert_eq!(stats.frames_converted, 9);
    assert_eq!(stats.audio.pushed, 9 * SAMPLES_PER_FRAME as u64);
    assert_eq!(rig.speaker.available(), 9 * SAMPLES_PER_FRAME);
    let audio = rig.speaker.pull(9 * SAMPLES_PER_FRAME);
    assert_relative_eq!(audio[0].left, 0.001);
    assert_relative_eq!(audio.last().unwrap().left, 0.009);
    assert_eq!(&rig.session.frame()[0..4], &[9, 0, 0, 255]);

    assert_eq!(stats.state, PlaybackState::Stopped);
    assert!(!rig.scheduler.is_active());
    assert!(!*rig.speaker.running.borrow());

    // The image must be reloaded before running again
    assert!(matches!(rig.session.start(), Err(ShellError::LoadFailure(_))));
    rig.session.load_image(ROM).unwrap();
    rig.session.start().unwrap();
    assert_eq!(rig.session.state(), PlaybackState::Running);
}

#[test]
fn test_timer_paces_ticks_and_presents_newest_frame() {
    let mut rig = rig();
    rig.session.load_image(ROM).unwrap();
    rig.session.start().unwrap();
    let period = rig.session.tick_period();
    assert_eq!(rig.scheduler.period(), Some(period));

    let t0 = Duration::from_secs(10);
    assert_eq!(rig.session.on_timer(t0).unwrap(), 1);
    assert_eq!(rig.session.on_timer(t0 + period / 2).unwrap(), 0);
    // Late firing catches up two ticks but presents once
    assert_eq!(rig.session.on_timer(t0 + period * 2).unwrap(), 2);

    assert_eq!(*rig.display.count.borrow(), 2);
    assert_eq!(&rig.display.presented.borrow()[0..4], &[3, 0, 0, 255]);
    assert_eq!(rig.session.stats().frames_converted, 3);
}

#[test]
fn test_suspended_session_ignores_timer() {
    let mut rig = rig();
    rig.session.load_image(ROM).unwrap();
    rig.session.start().unwrap();
    rig.session.on_timer(Duration::ZERO).unwrap();

    rig.session.suspend();
    assert_eq!(rig.session.state(), PlaybackState::Suspended);
    assert!(!rig.scheduler.is_active());
    assert!(!*rig.speaker.running.borrow());
    assert_eq!(rig.session.on_timer(Duration::from_secs(1)).unwrap(), 0);
    assert_eq!(rig.session.core().frames, 1);

    rig.session.resume().unwrap();
    assert!(*rig.speaker.running.borrow());
    // Pacing re-anchors instead of replaying the suspended time
    assert_eq!(rig.session.on_timer(Duration::from_secs(60)).unwrap(), 1);
}

#[test]
fn test_audio_device_created_once() {
    let mut rig = rig();
    rig.session.load_image(ROM).unwrap();
    for _ in 0..5 {
        rig.session.start().unwrap();
        rig.session.suspend();
        rig.session.resume().unwrap();
        rig.session.stop();
    }
    assert_eq!(*rig.speaker.opens.borrow(), 1);
}

#[test]
fn test_audio_refusal_keeps_video_running() {
    let mut rig = rig_with(ScriptedCore::default(), 1);
    rig.session.load_image(ROM).unwrap();
    rig.session.start().unwrap();

    assert_eq!(rig.session.state(), PlaybackState::Running);
    assert!(!rig.session.stats().audio_device);
    rig.session.tick().unwrap();
    rig.session.tick().unwrap();
    assert_eq!(rig.session.stats().frames_converted, 2);

    // Next start opens the device with the same ring buffer
    rig.session.stop();
    rig.session.start().unwrap();
    assert!(rig.session.stats().audio_device);
    assert_eq!(rig.speaker.available(), 2 * SAMPLES_PER_FRAME);
}

#[test]
fn test_rejected_image_leaves_running_session_alone() {
    let mut rig = rig();
    rig.session.load_image(ROM).unwrap();
    rig.session.start().unwrap();
    rig.session.tick().unwrap();

    let err = rig.session.load_image(b"not a rom").unwrap_err();
    assert!(matches!(err, ShellError::LoadFailure(_)));
    assert_eq!(rig.session.state(), PlaybackState::Running);
    assert!(rig.session.tick().unwrap().is_some());
    assert_eq!(rig.session.core().frames, 2);
}

#[test]
fn test_inputs_are_or_ed_across_sources() {
    let mut rig = rig();
    rig.session.load_image(ROM).unwrap();
    rig.session.start().unwrap();

    let mut buttons = vec![false; 16];
    buttons[0] = true;
    *rig.pads.snapshots.borrow_mut() = vec![GamepadSnapshot {
        index: 0,
        buttons,
        axes: vec![0.0, 0.0],
    }];
    assert!(rig.session.key_event("KeyX", true));
    rig.session.tick().unwrap();
    assert!(rig.session.core().held(Player::One, Button::A));

    // Releasing the key does not release what the pad holds
    rig.session.key_event("KeyX", false);
    rig.session.tick().unwrap();
    assert!(rig.session.core().held(Player::One, Button::A));

    rig.pads.snapshots.borrow_mut().clear();
    rig.session.tick().unwrap();
    assert!(!rig.session.core().held(Player::One, Button::A));

    // Player 2 keys and touch
    rig.session.key_event("KeyW", true);
    rig.session.touch_start(3, Player::Two, Button::Start);
    rig.session.tick().unwrap();
    assert!(rig.session.core().held(Player::Two, Button::Up));
    assert!(rig.session.core().held(Player::Two, Button::Start));
    assert!(!rig.session.core().held(Player::One, Button::Up));
}

#[test]
fn test_volume_applies_to_later_pulls_only() {
    let mut rig = rig();
    rig.session.load_image(ROM).unwrap();
    rig.session.start().unwrap();
    rig.session.tick().unwrap();

    let first = rig.speaker.pull(100);
    rig.session.set_volume(0.5);
    let second = rig.speaker.pull(100);
    rig.session.set_muted(true);
    let third = rig.speaker.pull(100);

    assert_relative_eq!(first[0].left, 0.001);
    assert_relative_eq!(second[0].left, 0.0005);
    assert_relative_eq!(third[0].left, 0.0);
    assert_relative_eq!(rig.session.volume_control().volume(), 0.5);
}

#[test]
fn test_dispose_ends_session() {
    let mut rig = rig();
    rig.session.load_image(ROM).unwrap();
    rig.session.start().unwrap();
    rig.session.dispose();

    assert_eq!(rig.session.state(), PlaybackState::Stopped);
    assert!(!rig.scheduler.is_active());
    assert!(matches!(
        rig.session.load_image(ROM),
        Err(ShellError::LoadFailure(_))
    ));
    assert!(rig.session.start().is_err());
}
