use serde::{Deserialize, Serialize};

/// A Standard MIDI File reduced to the events the decoder cares about.
///
/// `ticks_per_beat` is `0` when the header carried no metrical division
/// (SMPTE timing, or a zero field); the decoder substitutes a fallback.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct MidiSource {
    pub ticks_per_beat: u16,
    pub tracks: Vec<Vec<TrackEvent>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TrackEvent {
    pub delta: u32,
    pub kind: EventKind,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum EventKind {
    Meta(MetaEvent),
    Channel(ChannelEvent),
    /// SysEx, escapes, controllers and anything else that only advances time.
    Other,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum MetaEvent {
    /// Microseconds per beat.
    Tempo(u32),
    TimeSignature { numerator: u8, denominator: u8 },
    KeySignature { sharps: i8, minor: bool },
    TrackName(String),
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelEvent {
    NoteOn { channel: u8, pitch: u8, velocity: u8 },
    NoteOff { channel: u8, pitch: u8, velocity: u8 },
    ProgramChange { channel: u8, program: u8 },
}

impl TrackEvent {
    pub fn new(delta: u32, kind: EventKind) -> Self {
        Self { delta, kind }
    }

    pub fn tempo(delta: u32, microseconds_per_beat: u32) -> Self {
        Self::new(delta, EventKind::Meta(MetaEvent::Tempo(microseconds_per_beat)))
    }

    pub fn note_on(delta: u32, channel: u8, pitch: u8, velocity: u8) -> Self {
        Self::new(
            delta,
            EventKind::Channel(ChannelEvent::NoteOn {
                channel,
                pitch,
                velocity,
            }),
        )
    }

    pub fn note_off(delta: u32, channel: u8, pitch: u8) -> Self {
        Self::new(
            delta,
            EventKind::Channel(ChannelEvent::NoteOff {
                channel,
                pitch,
                velocity: 0,
            }),
        )
    }
}
