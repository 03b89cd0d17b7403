//! Lock-free stereo ring buffer between the frame clock and the audio device
//!
//! Two independently clocked contexts share this buffer:
//! - Producer: runs inside each frame clock tick and pushes one stereo pair per
//!   emulated audio sample
//! - Consumer: runs in the audio device callback and pulls fixed-size blocks on
//!   the device's own schedule
//!
//! Memory consumption is fixed at `capacity * 8` bytes. Slots are atomic 64-bit
//! words holding a packed (left, right) pair, and both cursors are monotonic
//! counters, so neither side ever takes a lock or waits on the other.
//!
//! Overflow policy: the producer never blocks. When it laps the consumer, the
//! oldest unread pairs are overwritten and the consumer skips past them.
//! Underflow policy: a pull that finds fewer pairs than requested zero-fills
//! the deficit. Both conditions are counted in [`BufferStats`].

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{fence, AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::{Result, ShellError};

/// Largest accepted capacity, in stereo pairs (512 MB of slots).
pub const MAX_CAPACITY: usize = 64 * 1024 * 1024;

/// How many times a pull re-reads after detecting that the producer lapped it
/// mid-copy before giving up and emitting silence for the block.
const MAX_READ_ATTEMPTS: usize = 4;

/// One interleaved stereo sample pair.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StereoSample {
    /// Left channel, -1.0..=1.0
    pub left: f32,
    /// Right channel, -1.0..=1.0
    pub right: f32,
}

impl StereoSample {
    /// A pair of zeros.
    pub const SILENCE: Self = Self {
        left: 0.0,
        right: 0.0,
    };

    /// Create a pair from raw channel values.
    pub const fn new(left: f32, right: f32) -> Self {
        Self { left, right }
    }

    fn pack(self) -> u64 {
        (u64::from(self.left.to_bits()) << 32) | u64::from(self.right.to_bits())
    }

    fn unpack(bits: u64) -> Self {
        Self {
            left: f32::from_bits((bits >> 32) as u32),
            right: f32::from_bits(bits as u32),
        }
    }

    fn scaled(self, gain: f32) -> Self {
        Self {
            left: self.left * gain,
            right: self.right * gain,
        }
    }
}

/// Clamp a producer value into the valid sample range. NaN becomes silence.
fn clamp_sample(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(-1.0, 1.0)
    }
}

/// Snapshot of ring buffer health for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct BufferStats {
    /// Pairs pushed by the producer since creation
    pub pushed: u64,
    /// Pairs handed to the device (excluding zero-fill)
    pub delivered: u64,
    /// Pulls that had to zero-fill part of the requested block
    pub underruns: u64,
    /// Pairs discarded because the producer lapped the consumer
    pub dropped: u64,
    /// Unread pairs as a fraction of capacity (0.0 to 1.0)
    pub fill_percentage: f32,
}

struct Shared {
    slots: Box<[AtomicU64]>,
    capacity: u64,
    /// `pos & mask == pos % capacity`
    mask: u64,
    /// Producer claim: one past the slot index currently being overwritten.
    /// Stored before the slot write so a reader can detect a lap.
    claimed: AtomicU64,
    /// Producer cursor: pairs fully written (release-stored after the slot)
    written: AtomicU64,
    /// Consumer cursor: pairs delivered or skipped
    read: AtomicU64,
    volume_bits: AtomicU32,
    muted: AtomicBool,
    delivered: AtomicU64,
    underruns: AtomicU64,
    dropped: AtomicU64,
}

impl Shared {
    fn gain(&self) -> f32 {
        if self.muted.load(Ordering::Relaxed) {
            0.0
        } else {
            f32::from_bits(self.volume_bits.load(Ordering::Relaxed))
        }
    }

    fn stats(&self) -> BufferStats {
        let written = self.written.load(Ordering::Acquire);
        let read = self.read.load(Ordering::Acquire);
        let unread = written.saturating_sub(read).min(self.capacity);
        BufferStats {
            pushed: written,
            delivered: self.delivered.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            fill_percentage: unread as f32 / self.capacity as f32,
        }
    }
}

/// Create a ring buffer and split it into its two endpoints.
///
/// Capacity is in stereo pairs and is rounded up to the next power of two.
///
/// # Errors
///
/// Returns [`ShellError::Config`] if the capacity is 0 or exceeds
/// [`MAX_CAPACITY`].
pub fn channel(requested_capacity: usize) -> Result<(AudioProducer, AudioConsumer)> {
    if requested_capacity == 0 {
        return Err(ShellError::Config(
            "audio ring buffer capacity must be greater than 0".into(),
        ));
    }

    let capacity = requested_capacity.next_power_of_two();
    if capacity > MAX_CAPACITY {
        return Err(ShellError::Config(format!(
            "audio ring buffer capacity {capacity} exceeds maximum {MAX_CAPACITY}"
        )));
    }

    let slots = (0..capacity)
        .map(|_| AtomicU64::new(StereoSample::SILENCE.pack()))
        .collect::<Vec<_>>()
        .into_boxed_slice();

    let shared = Arc::new(Shared {
        slots,
        capacity: capacity as u64,
        mask: capacity as u64 - 1,
        claimed: AtomicU64::new(0),
        written: AtomicU64::new(0),
        read: AtomicU64::new(0),
        volume_bits: AtomicU32::new(1.0f32.to_bits()),
        muted: AtomicBool::new(false),
        delivered: AtomicU64::new(0),
        underruns: AtomicU64::new(0),
        dropped: AtomicU64::new(0),
    });

    Ok((
        AudioProducer {
            shared: Arc::clone(&shared),
            write_pos: 0,
        },
        AudioConsumer {
            shared,
            read_pos: 0,
            starved: false,
        },
    ))
}

/// Write endpoint, owned by the frame clock. Not cloneable: there is exactly one
/// writer.
pub struct AudioProducer {
    shared: Arc<Shared>,
    write_pos: u64,
}

impl AudioProducer {
    /// Append one stereo pair. Values are clamped to -1.0..=1.0.
    ///
    /// Never blocks. If the consumer has fallen a full buffer behind, this
    /// overwrites the oldest unread pair.
    pub fn push_sample(&mut self, left: f32, right: f32) {
        let shared = &*self.shared;
        let pos = self.write_pos;
        let sample = StereoSample::new(clamp_sample(left), clamp_sample(right));

        shared.claimed.store(pos + 1, Ordering::Relaxed);
        fence(Ordering::Release);
        shared.slots[(pos & shared.mask) as usize].store(sample.pack(), Ordering::Relaxed);

        self.write_pos = pos + 1;
        shared.written.store(self.write_pos, Ordering::Release);
    }

    /// Append a run of pairs in order.
    pub fn push_samples(&mut self, samples: &[StereoSample]) {
        for sample in samples {
            self.push_sample(sample.left, sample.right);
        }
    }

    /// Capacity in stereo pairs (after power-of-two rounding).
    pub fn capacity(&self) -> usize {
        self.shared.capacity as usize
    }

    /// Handle for changing output volume from any context.
    pub fn volume_control(&self) -> VolumeControl {
        VolumeControl {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Current buffer statistics.
    pub fn stats(&self) -> BufferStats {
        self.shared.stats()
    }
}

impl fmt::Debug for AudioProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioProducer")
            .field("capacity", &self.shared.capacity)
            .field("write_pos", &self.write_pos)
            .finish()
    }
}

/// Read endpoint, owned by the audio device callback. Not cloneable: there is
/// exactly one reader.
pub struct AudioConsumer {
    shared: Arc<Shared>,
    read_pos: u64,
    starved: bool,
}

impl AudioConsumer {
    /// Pull exactly `frames` pairs, scaled by the volume in effect now.
    ///
    /// Pairs beyond what is buffered are silence.
    pub fn pull_block(&mut self, frames: usize) -> Vec<StereoSample> {
        let mut block = vec![StereoSample::SILENCE; frames];
        let delivered = self.read_with(frames, |i, sample| block[i] = sample);
        block[delivered..].fill(StereoSample::SILENCE);
        block
    }

    /// Fill an interleaved `[l, r, l, r, ...]` device buffer.
    ///
    /// Returns the number of pairs that came from the buffer; the rest of
    /// `dest` is zeroed.
    pub fn pull_interleaved_into(&mut self, dest: &mut [f32]) -> usize {
        let frames = dest.len() / 2;
        let delivered = self.read_with(frames, |i, sample| {
            dest[2 * i] = sample.left;
            dest[2 * i + 1] = sample.right;
        });
        dest[2 * delivered..].fill(0.0);
        delivered
    }

    /// Fill separate left/right channel buffers (Web Audio layout).
    ///
    /// Pulls `min(left.len(), right.len())` pairs; returns the number that
    /// came from the buffer. Everything else is zeroed.
    pub fn pull_planar_into(&mut self, left: &mut [f32], right: &mut [f32]) -> usize {
        let frames = left.len().min(right.len());
        let delivered = self.read_with(frames, |i, sample| {
            left[i] = sample.left;
            right[i] = sample.right;
        });
        left[delivered..].fill(0.0);
        right[delivered..].fill(0.0);
        delivered
    }

    /// Pairs currently readable (at most capacity).
    pub fn available(&self) -> usize {
        let written = self.shared.written.load(Ordering::Acquire);
        written.saturating_sub(self.read_pos).min(self.shared.capacity) as usize
    }

    /// Discard everything buffered so far.
    pub fn flush(&mut self) {
        self.read_pos = self.shared.written.load(Ordering::Acquire);
        self.shared.read.store(self.read_pos, Ordering::Release);
    }

    /// Capacity in stereo pairs.
    pub fn capacity(&self) -> usize {
        self.shared.capacity as usize
    }

    /// Handle for changing output volume from any context.
    pub fn volume_control(&self) -> VolumeControl {
        VolumeControl {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Current buffer statistics.
    pub fn stats(&self) -> BufferStats {
        self.shared.stats()
    }

    /// Copy up to `frames` pairs into `emit(index, sample)`, returning how many
    /// were delivered. The caller zero-fills the remainder.
    fn read_with(&mut self, frames: usize, mut emit: impl FnMut(usize, StereoSample)) -> usize {
        let shared = &*self.shared;
        let gain = shared.gain();

        for _ in 0..MAX_READ_ATTEMPTS {
            let written = shared.written.load(Ordering::Acquire);

            // Skip whatever the producer has already overwritten.
            let oldest = written.saturating_sub(shared.capacity);
            let start = self.read_pos.max(oldest);
            let take = (written - start).min(frames as u64);

            for i in 0..take {
                let bits = shared.slots[((start + i) & shared.mask) as usize].load(Ordering::Relaxed);
                emit(i as usize, StereoSample::unpack(bits).scaled(gain));
            }

            // If the producer claimed any slot we just copied, the copy may mix
            // generations. Re-read from a fresh snapshot.
            fence(Ordering::Acquire);
            let claimed = shared.claimed.load(Ordering::Relaxed);
            if claimed.saturating_sub(shared.capacity) > start {
                continue;
            }

            let skipped = start - self.read_pos;
            if skipped > 0 {
                shared.dropped.fetch_add(skipped, Ordering::Relaxed);
                debug!(skipped, "audio ring buffer overrun, dropped oldest pairs");
            }

            self.read_pos = start + take;
            shared.read.store(self.read_pos, Ordering::Release);
            shared.delivered.fetch_add(take, Ordering::Relaxed);
            self.note_underrun(take < frames as u64);
            return take as usize;
        }

        // The producer kept lapping this reader; emit silence and let the next
        // pull resynchronise from the newest data.
        self.note_underrun(frames > 0);
        0
    }

    fn note_underrun(&mut self, short: bool) {
        if short {
            self.shared.underruns.fetch_add(1, Ordering::Relaxed);
            if !self.starved {
                debug!("audio ring buffer underrun, zero-filling");
            }
        }
        self.starved = short;
    }
}

impl fmt::Debug for AudioConsumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioConsumer")
            .field("capacity", &self.shared.capacity)
            .field("read_pos", &self.read_pos)
            .finish()
    }
}

/// Output volume shared by both endpoints. Volume is applied at pull time, so a
/// change affects already-buffered audio but never audio already returned.
#[derive(Clone)]
pub struct VolumeControl {
    shared: Arc<Shared>,
}

impl VolumeControl {
    /// Set output volume, clamped to 0.0..=1.0. NaN is treated as 0.0.
    pub fn set_volume(&self, volume: f32) {
        let volume = if volume.is_nan() {
            0.0
        } else {
            volume.clamp(0.0, 1.0)
        };
        self.shared
            .volume_bits
            .store(volume.to_bits(), Ordering::Relaxed);
    }

    /// Volume as last set (ignores mute).
    pub fn volume(&self) -> f32 {
        f32::from_bits(self.shared.volume_bits.load(Ordering::Relaxed))
    }

    /// Mute or unmute without losing the volume setting.
    pub fn set_muted(&self, muted: bool) {
        self.shared.muted.store(muted, Ordering::Relaxed);
    }

    /// Whether output is muted.
    pub fn is_muted(&self) -> bool {
        self.shared.muted.load(Ordering::Relaxed)
    }

    /// Gain applied to the next pull: 0.0 when muted, otherwise the volume.
    pub fn gain(&self) -> f32 {
        self.shared.gain()
    }
}

impl fmt::Debug for VolumeControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VolumeControl")
            .field("volume", &self.volume())
            .field("muted", &self.is_muted())
            .finish()
    }
}
