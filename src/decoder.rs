use crate::model::source::{ChannelEvent, EventKind, MetaEvent, TrackEvent};
use serde::{Deserialize, Serialize};
use std::slice::Iter;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteEventKind {
    NoteOn,
    NoteOff,
}

/// A note event pinned to its absolute tick within a track.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawChannelEvent {
    pub tick: u64,
    pub kind: NoteEventKind,
    pub pitch: u8,
    pub velocity: u8,
    pub channel: u8,
    pub track: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrackMessage<'a> {
    Meta(&'a MetaEvent),
    Note(RawChannelEvent),
    Program { channel: u8, program: u8 },
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimedMessage<'a> {
    pub tick: u64,
    pub message: TrackMessage<'a>,
}

/// Walks one track's delta-timed events, yielding each at its absolute tick.
///
/// A `NoteOn` with velocity 0 is yielded as a `NoteOff`.
pub struct TrackEventDecoder<'a> {
    track: usize,
    events: Iter<'a, TrackEvent>,
    tick: u64,
}

impl<'a> TrackEventDecoder<'a> {
    pub fn new(track: usize, events: &'a [TrackEvent]) -> Self {
        Self {
            track,
            events: events.iter(),
            tick: 0,
        }
    }

    /// The absolute tick of the last event yielded so far. Once the decoder is
    /// exhausted this is the track's end tick.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn track(&self) -> usize {
        self.track
    }

    fn classify(&self, kind: &'a EventKind) -> TrackMessage<'a> {
        match kind {
            EventKind::Meta(meta) => TrackMessage::Meta(meta),
            EventKind::Channel(ChannelEvent::NoteOn {
                channel,
                pitch,
                velocity,
            }) => TrackMessage::Note(RawChannelEvent {
                tick: self.tick,
                kind: if *velocity == 0 {
                    NoteEventKind::NoteOff
                } else {
                    NoteEventKind::NoteOn
                },
                pitch: *pitch,
                velocity: *velocity,
                channel: *channel,
                track: self.track,
            }),
            EventKind::Channel(ChannelEvent::NoteOff {
                channel,
                pitch,
                velocity,
            }) => TrackMessage::Note(RawChannelEvent {
                tick: self.tick,
                kind: NoteEventKind::NoteOff,
                pitch: *pitch,
                velocity: *velocity,
                channel: *channel,
                track: self.track,
            }),
            EventKind::Channel(ChannelEvent::ProgramChange { channel, program }) => {
                TrackMessage::Program {
                    channel: *channel,
                    program: *program,
                }
            }
            EventKind::Other => TrackMessage::Other,
        }
    }
}

impl<'a> Iterator for TrackEventDecoder<'a> {
    type Item = TimedMessage<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let event = self.events.next()?;
        self.tick = self.tick.saturating_add(event.delta as u64);

        Some(TimedMessage {
            tick: self.tick,
            message: self.classify(&event.kind),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn accumulates_absolute_ticks() {
        let track = vec![
            TrackEvent::tempo(0, 400_000),
            TrackEvent::note_on(10, 0, 60, 90),
            TrackEvent::new(5, EventKind::Other),
            TrackEvent::note_off(20, 0, 60),
        ];

        let mut decoder = TrackEventDecoder::new(3, &track);
        let ticks: Vec<u64> = decoder.by_ref().map(|m| m.tick).collect();

        assert_eq!(ticks, vec![0, 10, 15, 35]);
        assert_eq!(decoder.tick(), 35);
    }

    #[test]
    fn zero_velocity_note_on_becomes_note_off() {
        let track = vec![
            TrackEvent::note_on(0, 2, 64, 100),
            TrackEvent::note_on(96, 2, 64, 0),
        ];

        let messages: Vec<TimedMessage> = TrackEventDecoder::new(1, &track).collect();

        match &messages[1].message {
            TrackMessage::Note(ev) => {
                assert_eq!(ev.kind, NoteEventKind::NoteOff);
                assert_eq!(ev.tick, 96);
                assert_eq!(ev.channel, 2);
                assert_eq!(ev.track, 1);
            }
            other => panic!("expected a note event, got {:?}", other),
        }
    }

    #[test]
    fn classifies_meta_and_program_events() {
        let track = vec![
            TrackEvent::new(0, EventKind::Meta(MetaEvent::TrackName("Lead".into()))),
            TrackEvent::new(
                0,
                EventKind::Channel(ChannelEvent::ProgramChange {
                    channel: 0,
                    program: 5,
                }),
            ),
        ];

        let messages: Vec<TimedMessage> = TrackEventDecoder::new(0, &track).collect();

        assert!(matches!(
            messages[0].message,
            TrackMessage::Meta(MetaEvent::TrackName(_))
        ));
        assert_eq!(
            messages[1].message,
            TrackMessage::Program {
                channel: 0,
                program: 5
            }
        );
    }
}
