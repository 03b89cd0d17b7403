//! nes-shell-soak: runs the synchronization layer against the real audio
//! device with a built-in test-signal core and logs buffer health.

use std::f32::consts::TAU;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use nes_shell::input::NoGamepads;
use nes_shell::video::{FRAME_HEIGHT, FRAME_WIDTH};
use nes_shell::{
    Button, CoreError, CoreOutput, DisplaySurface, EmulationCore, HostBindings, ManualScheduler,
    Player, RodioBackend, Session, ShellConfig, TickScheduler,
};

#[derive(Parser, Debug)]
#[command(name = "nes-shell-soak", about = "Soak-test the frame clock and audio ring buffer")]
struct Args {
    /// How long to run, in seconds
    #[arg(short, long, default_value_t = 10)]
    seconds: u64,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Test tone frequency in Hz
    #[arg(long, default_value_t = 440.0)]
    tone_hz: f32,

    /// Output volume (0.0 to 1.0), overrides the configuration
    #[arg(long)]
    volume: Option<f32>,

    /// Stall the host loop every N seconds to provoke catch-up and underruns
    #[arg(long)]
    stall_every: Option<u64>,

    /// Stall length in milliseconds
    #[arg(long, default_value_t = 250)]
    stall_ms: u64,
}

/// Core that draws a scrolling gradient and plays a sine tone.
///
/// Holding A on player 1 raises the tone an octave.
struct ToneCore {
    sample_rate: f32,
    samples_per_frame: f64,
    /// Fractional samples carried between frames
    sample_debt: f64,
    tone_hz: f32,
    phase: f32,
    frame: u32,
    octave_up: bool,
    pixels: Vec<u32>,
    loaded: bool,
}

impl ToneCore {
    fn new(config: &ShellConfig, tone_hz: f32) -> Self {
        ToneCore {
            sample_rate: config.audio.sample_rate as f32,
            samples_per_frame: config.audio.samples_per_frame(config.frame_rate_hz),
            sample_debt: 0.0,
            tone_hz,
            phase: 0.0,
            frame: 0,
            octave_up: false,
            pixels: vec![0; FRAME_WIDTH * FRAME_HEIGHT],
            loaded: false,
        }
    }
}

impl EmulationCore for ToneCore {
    fn load_image(&mut self, image: &[u8]) -> std::result::Result<(), CoreError> {
        if image.is_empty() {
            return Err(CoreError::Rejected("empty image".into()));
        }
        self.frame = 0;
        self.loaded = true;
        Ok(())
    }

    fn set_button(&mut self, player: Player, button: Button, pressed: bool) {
        if (player, button) == (Player::One, Button::A) {
            self.octave_up = pressed;
        }
    }

    fn advance_one_frame(
        &mut self,
        output: &mut dyn CoreOutput,
    ) -> std::result::Result<(), CoreError> {
        if !self.loaded {
            return Err(CoreError::Fault("no image".into()));
        }
        self.frame = self.frame.wrapping_add(1);

        for (i, px) in self.pixels.iter_mut().enumerate() {
            let x = (i % FRAME_WIDTH) as u32;
            let y = (i / FRAME_WIDTH) as u32;
            let r = (x + self.frame) & 0xFF;
            let g = (y + self.frame / 2) & 0xFF;
            let b = 0x80;
            *px = (b << 16) | (g << 8) | r;
        }
        output.on_frame(&self.pixels);

        self.sample_debt += self.samples_per_frame;
        let count = self.sample_debt.floor();
        self.sample_debt -= count;

        let freq = if self.octave_up {
            self.tone_hz * 2.0
        } else {
            self.tone_hz
        };
        let step = TAU * freq / self.sample_rate;
        for _ in 0..count as usize {
            let value = 0.25 * self.phase.sin();
            output.on_sample(value, value);
            self.phase = (self.phase + step) % TAU;
        }
        Ok(())
    }
}

/// Counts presented frames instead of drawing them.
#[derive(Default, Clone)]
struct CountingDisplay {
    presented: Arc<AtomicU64>,
}

impl DisplaySurface for CountingDisplay {
    fn present(&mut self, _rgba: &[u8], _width: u32, _height: u32) {
        self.presented.fetch_add(1, Ordering::Relaxed);
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ShellConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => ShellConfig::default(),
    };
    if let Some(volume) = args.volume {
        config.audio.volume = volume;
    }

    let scheduler = ManualScheduler::new();
    let display = CountingDisplay::default();
    let core = ToneCore::new(&config, args.tone_hz);
    let mut session = Session::new(
        core,
        config,
        HostBindings {
            scheduler: Box::new(scheduler.clone()),
            audio_backend: Box::new(RodioBackend),
            display: Box::new(display.clone()),
            gamepads: Box::new(NoGamepads),
        },
    )
    .context("creating session")?;

    session
        .load_image(b"soak")
        .context("loading test image")?;
    session.start().context("starting session")?;
    if !session.stats().audio_device {
        warn!("No audio device; running video only");
    }

    let period = session.tick_period();
    let run_for = Duration::from_secs(args.seconds);
    let started = Instant::now();
    let mut next_report = Duration::from_secs(1);
    let mut next_stall = args.stall_every.map(Duration::from_secs);

    while started.elapsed() < run_for {
        let now = started.elapsed();
        if scheduler.is_active() {
            session.on_timer(now).context("tick failed")?;
        }

        if now >= next_report {
            let stats = session.stats();
            info!(
                t = now.as_secs(),
                ticks = stats.ticks,
                frames = stats.frames_converted,
                pushed = stats.audio.pushed,
                delivered = stats.audio.delivered,
                underruns = stats.audio.underruns,
                dropped = stats.audio.dropped,
                fill = %format!("{:.1}%", stats.audio.fill_percentage * 100.0),
                resyncs = stats.pacing_resyncs,
                "Buffer stats"
            );
            next_report += Duration::from_secs(1);
        }

        if let (Some(every), Some(at)) = (args.stall_every, next_stall) {
            if now >= at {
                warn!(ms = args.stall_ms, "Stalling host loop");
                thread::sleep(Duration::from_millis(args.stall_ms));
                next_stall = Some(at + Duration::from_secs(every.max(1)));
            }
        }

        thread::sleep(period);
    }

    session.dispose();
    let stats = session.stats();
    info!(
        ticks = stats.ticks,
        presented = display.presented.load(Ordering::Relaxed),
        underruns = stats.audio.underruns,
        dropped = stats.audio.dropped,
        "Soak finished"
    );
    Ok(())
}
