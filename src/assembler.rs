use crate::decoder::RawChannelEvent;
use crate::model::song::{DecodeAnomalies, DecodedNote};
use crate::tempo::ticks_to_seconds;
use log::{debug, warn};
use std::collections::BTreeMap;

/// Notes at or below this duration are discarded as noise.
pub const MIN_NOTE_SEC: f64 = 0.001;

#[derive(Debug, Clone, Copy)]
struct OpenNote {
    start_tick: u64,
    tempo_at_start: u32,
    velocity: u8,
}

/// The notes closed within a single track plus what went wrong along the way.
#[derive(Debug, Clone, Default)]
pub struct AssembledTrack {
    pub notes: Vec<DecodedNote>,
    pub anomalies: DecodeAnomalies,
    pub note_ons: usize,
}

/// Pairs note-on/note-off events of one track into closed notes.
///
/// Open notes are keyed by `(pitch, channel)`. Both the start time and the
/// duration of a note are converted with the tempo that was in effect when the
/// note started, so later tempo changes never move an already-open note.
#[derive(Debug)]
pub struct NoteAssembler {
    track: usize,
    ticks_per_beat: u16,
    open: BTreeMap<(u8, u8), OpenNote>,
    out: AssembledTrack,
}

impl NoteAssembler {
    pub fn new(track: usize, ticks_per_beat: u16) -> Self {
        Self {
            track,
            ticks_per_beat,
            open: BTreeMap::new(),
            out: AssembledTrack::default(),
        }
    }

    pub fn open_notes(&self) -> usize {
        self.open.len()
    }

    /// Opens a note. A second note-on for a key that is already sounding is
    /// ignored for timing; the original start stays in place.
    pub fn note_on(&mut self, event: &RawChannelEvent, tempo: u32) {
        self.out.note_ons += 1;
        let key = (event.pitch, event.channel);

        if let Some(existing) = self.open.get(&key) {
            self.out.anomalies.duplicate_note_ons += 1;
            warn!(
                "T{} NoteOn for already active pitch {} ch{} at tick {} (open since tick {}), ignoring it for timing..!",
                self.track, event.pitch, event.channel, event.tick, existing.start_tick
            );
            return;
        }

        self.open.insert(
            key,
            OpenNote {
                start_tick: event.tick,
                tempo_at_start: tempo,
                velocity: event.velocity,
            },
        );
    }

    /// Closes the matching open note. Falls back to any channel carrying the
    /// same pitch (oldest start wins) before giving up on an orphan.
    pub fn note_off(&mut self, event: &RawChannelEvent) {
        let key = (event.pitch, event.channel);

        if let Some(open) = self.open.remove(&key) {
            self.close(key, open, event.tick, false);
            return;
        }

        let fallback = self
            .open
            .range((event.pitch, u8::MIN)..=(event.pitch, u8::MAX))
            .min_by_key(|(_, open)| open.start_tick)
            .map(|(key, _)| *key);

        if let Some(fallback_key) = fallback
            && let Some(open) = self.open.remove(&fallback_key)
        {
            self.out.anomalies.channel_fallback_matches += 1;
            debug!(
                "T{} NoteOff for pitch {} ch{} matched the note open on ch{} at tick {}..!",
                self.track, event.pitch, event.channel, fallback_key.1, open.start_tick
            );
            self.close(fallback_key, open, event.tick, false);
            return;
        }

        self.out.anomalies.orphan_note_offs += 1;
        debug!(
            "T{} Orphaned NoteOff for {} ch{} at tick {}..!",
            self.track, event.pitch, event.channel, event.tick
        );
    }

    /// Force-closes anything still sounding at the track's final tick and
    /// hands back the track's notes.
    pub fn finish(mut self, end_tick: u64) -> AssembledTrack {
        let dangling = std::mem::take(&mut self.open);

        for (key, open) in dangling {
            self.out.anomalies.force_closed_notes += 1;
            warn!(
                "T{} Unclosed NoteOn for {} ch{} at tick {}, auto-closing at track end tick {}..!",
                self.track, key.0, key.1, open.start_tick, end_tick
            );
            self.close(key, open, end_tick, true);
        }

        self.out
    }

    fn close(&mut self, (pitch, channel): (u8, u8), open: OpenNote, end_tick: u64, forced: bool) {
        let duration_ticks = end_tick.saturating_sub(open.start_tick);
        let start_sec = ticks_to_seconds(open.start_tick, self.ticks_per_beat, open.tempo_at_start);
        let duration_sec = ticks_to_seconds(duration_ticks, self.ticks_per_beat, open.tempo_at_start);

        if duration_sec <= MIN_NOTE_SEC {
            self.out.anomalies.dropped_short_notes += 1;
            warn!(
                "T{} Zero or near-zero duration ({:.4}s) for pitch {} ch{} starting at tick {}{}, dropping it..!",
                self.track,
                duration_sec,
                pitch,
                channel,
                open.start_tick,
                if forced { " (closed at track end)" } else { "" }
            );
            return;
        }

        self.out.notes.push(DecodedNote {
            pitch,
            start_sec,
            duration_sec,
            velocity: open.velocity,
            track: self.track,
            channel,
            start_tick: open.start_tick,
            duration_ticks,
        });
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::decoder::NoteEventKind;
    use crate::tempo::DEFAULT_MPQN;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-9
    }

    fn on(tick: u64, pitch: u8, channel: u8) -> RawChannelEvent {
        RawChannelEvent {
            tick,
            kind: NoteEventKind::NoteOn,
            pitch,
            velocity: 100,
            channel,
            track: 0,
        }
    }

    fn off(tick: u64, pitch: u8, channel: u8) -> RawChannelEvent {
        RawChannelEvent {
            kind: NoteEventKind::NoteOff,
            velocity: 0,
            ..on(tick, pitch, channel)
        }
    }

    #[test]
    fn pairs_on_and_off() {
        env_logger::try_init().unwrap_or(());

        let mut asm = NoteAssembler::new(0, 480);
        asm.note_on(&on(0, 60, 0), DEFAULT_MPQN);
        asm.note_off(&off(480, 60, 0));
        let out = asm.finish(480);

        assert_eq!(out.notes.len(), 1);
        assert!(approx_eq(out.notes[0].start_sec, 0.0));
        assert!(approx_eq(out.notes[0].duration_sec, 0.5));
        assert_eq!(out.notes[0].velocity, 100);
    }

    #[test]
    fn duplicate_note_on_keeps_original_start() {
        env_logger::try_init().unwrap_or(());

        let mut asm = NoteAssembler::new(0, 480);
        asm.note_on(&on(0, 60, 0), DEFAULT_MPQN);
        asm.note_on(&on(100, 60, 0), DEFAULT_MPQN);
        asm.note_off(&off(480, 60, 0));
        let out = asm.finish(480);

        assert_eq!(out.notes.len(), 1);
        assert_eq!(out.notes[0].start_tick, 0);
        assert_eq!(out.notes[0].duration_ticks, 480);
        assert_eq!(out.anomalies.duplicate_note_ons, 1);
        assert_eq!(out.note_ons, 2);
    }

    #[test]
    fn note_off_falls_back_to_oldest_same_pitch() {
        env_logger::try_init().unwrap_or(());

        let mut asm = NoteAssembler::new(0, 480);
        asm.note_on(&on(100, 62, 3), DEFAULT_MPQN);
        asm.note_on(&on(50, 62, 5), DEFAULT_MPQN);
        asm.note_off(&off(480, 62, 9));

        assert_eq!(asm.open_notes(), 1);
        let out = asm.finish(960);

        assert_eq!(out.anomalies.channel_fallback_matches, 1);
        let closed = out.notes.iter().find(|n| n.channel == 5).unwrap();
        assert_eq!(closed.start_tick, 50);
        assert_eq!(closed.duration_ticks, 430);

        let forced = out.notes.iter().find(|n| n.channel == 3).unwrap();
        assert_eq!(forced.duration_ticks, 860);
        assert_eq!(out.anomalies.force_closed_notes, 1);
    }

    #[test]
    fn orphan_note_off_is_counted_and_dropped() {
        env_logger::try_init().unwrap_or(());

        let mut asm = NoteAssembler::new(0, 480);
        asm.note_off(&off(10, 70, 0));
        let out = asm.finish(10);

        assert!(out.notes.is_empty());
        assert_eq!(out.anomalies.orphan_note_offs, 1);
    }

    #[test]
    fn sub_millisecond_note_is_dropped() {
        env_logger::try_init().unwrap_or(());

        // 1 tick at 480 tpb and 120 BPM is ~1.04ms, 0 ticks is nothing at all
        let mut asm = NoteAssembler::new(0, 480);
        asm.note_on(&on(0, 60, 0), DEFAULT_MPQN);
        asm.note_off(&off(0, 60, 0));
        asm.note_on(&on(10, 61, 0), DEFAULT_MPQN);
        asm.note_off(&off(11, 61, 0));
        let out = asm.finish(11);

        assert_eq!(out.anomalies.dropped_short_notes, 1);
        assert_eq!(out.notes.len(), 1);
        assert_eq!(out.notes[0].pitch, 61);
    }

    #[test]
    fn uses_tempo_at_note_start() {
        env_logger::try_init().unwrap_or(());

        let mut asm = NoteAssembler::new(0, 480);
        asm.note_on(&on(480, 60, 0), 1_000_000);
        asm.note_off(&off(960, 60, 0));
        let out = asm.finish(960);

        assert!(approx_eq(out.notes[0].start_sec, 1.0));
        assert!(approx_eq(out.notes[0].duration_sec, 1.0));
    }
}
