use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};

pub mod judge;
pub mod metrics;
pub mod scheduler;
pub mod session;

/// Default capacity of the input queue between a device thread and the frame loop.
pub const INPUT_QUEUE_CAPACITY: usize = 256;

/// A note-on from the input device, stamped with session time.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct InputEvent {
    pub pitch: u8,
    pub velocity: u8,
    pub timestamp_ms: f64,
}

/// Bounded, order-preserving queue for input events. The sender side may live
/// on any thread; the receiver is drained by the frame loop.
pub fn input_channel(capacity: usize) -> (SyncSender<InputEvent>, Receiver<InputEvent>) {
    mpsc::sync_channel(capacity.max(1))
}

/// Receives note triggers. Implementations must return immediately.
pub trait AudioSink: Send {
    fn note_on(&self, pitch: u8, velocity: u8);
}

/// Drops every note.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentAudio;

impl AudioSink for SilentAudio {
    fn note_on(&self, _pitch: u8, _velocity: u8) {}
}

/// Logs every note at `info`, handy when running without a synth.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAudio;

impl AudioSink for LogAudio {
    fn note_on(&self, pitch: u8, velocity: u8) {
        info!(
            "Playing {} (velocity {})",
            crate::theory::note_name(pitch),
            velocity
        );
    }
}

/// Forwards `(pitch, velocity)` to a synth thread without ever blocking.
/// Triggers are dropped when the synth falls behind.
#[derive(Debug, Clone)]
pub struct ChannelAudio {
    tx: SyncSender<(u8, u8)>,
}

impl ChannelAudio {
    pub fn new(capacity: usize) -> (Self, Receiver<(u8, u8)>) {
        let (tx, rx) = mpsc::sync_channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl AudioSink for ChannelAudio {
    fn note_on(&self, pitch: u8, velocity: u8) {
        match self.tx.try_send((pitch, velocity)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                debug!("Audio queue full, dropping note {}..!", pitch);
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!("Audio receiver gone, dropping note {}..!", pitch);
            }
        }
    }
}
