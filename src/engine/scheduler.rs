use crate::engine::judge::{FallingNote, Grade, HitWindow, NoteState};
use crate::model::config::{KeyRange, SessionConfig};
use crate::model::song::DecodedNote;
use crate::theory::note_name;
use crate::timeline::NoteTimeline;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Gap between consecutive notes of a generated practice sequence.
pub const PRACTICE_SPACING_SEC: f64 = 1.0;
pub const PRACTICE_DURATION_SEC: f64 = 0.5;
pub const PRACTICE_VELOCITY: u8 = 100;

/// A key press that resolved a falling note.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct HitOutcome {
    pub pitch: u8,
    pub target_time_sec: f64,
    pub timing_error_ms: f64,
    pub grade: Grade,
    pub accuracy: f64,
}

/// What a single `update` changed.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub materialized: usize,
    pub newly_active: usize,
    pub newly_missed: usize,
    pub retired: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub total_notes: usize,
    pub hit_notes: usize,
    pub missed_notes: usize,
    pub out_of_range_notes: usize,
}

impl SessionSummary {
    pub fn resolved_notes(&self) -> usize {
        self.hit_notes + self.missed_notes + self.out_of_range_notes
    }

    pub fn is_complete(&self) -> bool {
        self.resolved_notes() >= self.total_notes
    }
}

/// Turns a note timeline into falling notes and judges key presses against them.
///
/// In streaming mode only notes due within `stream_window_sec` of the session
/// clock are instantiated; the rest wait in `pending` in timeline order.
#[derive(Debug)]
pub struct FallingNoteScheduler {
    window: HitWindow,
    lead_time_sec: f64,
    stream_window_sec: Option<f64>,
    key_range: KeyRange,
    fade_sec: f64,
    highlight_window_sec: f64,
    pending: VecDeque<DecodedNote>,
    notes: Vec<FallingNote>,
    total_notes: usize,
    hit_notes: usize,
    missed_notes: usize,
    retired_out_of_range: usize,
}

impl FallingNoteScheduler {
    fn empty(config: &SessionConfig) -> Self {
        Self {
            window: config.hit_window(),
            lead_time_sec: config.lead_time_sec,
            stream_window_sec: config.stream_window_sec.map(|w| w.max(0.0)),
            key_range: config.key_range,
            fade_sec: config.fade_sec,
            highlight_window_sec: config.highlight_window_sec,
            pending: VecDeque::new(),
            notes: Vec::new(),
            total_notes: 0,
            hit_notes: 0,
            missed_notes: 0,
            retired_out_of_range: 0,
        }
    }

    /// Takes ownership of a decoded timeline. Without a stream window every
    /// note is materialized immediately.
    pub fn from_timeline(timeline: NoteTimeline, config: &SessionConfig) -> Self {
        let mut scheduler = Self::empty(config);
        scheduler.total_notes = timeline.len();
        scheduler.pending = timeline.into_iter().collect();

        match scheduler.stream_window_sec {
            Some(window) => {
                scheduler.materialize_due(0.0);
                info!(
                    "Streaming {} notes with a {:.1}s window, {} materialized up front..!",
                    scheduler.total_notes,
                    window,
                    scheduler.notes.len()
                );
            }
            None => {
                scheduler.materialize_all();
                info!(
                    "Scheduled {} falling notes with {:.1}s lead time..!",
                    scheduler.total_notes, scheduler.lead_time_sec
                );
            }
        }

        scheduler
    }

    /// Evenly spaced practice sequence (scales, arpeggiated chords), always
    /// materialized up front.
    pub fn from_sequence(pitches: &[u8], config: &SessionConfig) -> Self {
        let mut scheduler = Self::empty(config);
        scheduler.stream_window_sec = None;

        for (i, &pitch) in pitches.iter().enumerate() {
            let target = scheduler.lead_time_sec + i as f64 * PRACTICE_SPACING_SEC;
            let note = FallingNote::new(pitch, target, PRACTICE_DURATION_SEC, PRACTICE_VELOCITY);
            scheduler.push_note(note);
        }
        scheduler.total_notes = scheduler.notes.len();

        info!(
            "Scheduled a practice sequence of {} notes..!",
            scheduler.total_notes
        );

        scheduler
    }

    pub fn hit_window(&self) -> HitWindow {
        self.window
    }

    pub fn lead_time_sec(&self) -> f64 {
        self.lead_time_sec
    }

    /// Currently instantiated notes, in target order.
    pub fn notes(&self) -> &[FallingNote] {
        &self.notes
    }

    pub fn pending_notes(&self) -> usize {
        self.pending.len()
    }

    pub fn key_range(&self) -> KeyRange {
        self.key_range
    }

    fn push_note(&mut self, mut note: FallingNote) {
        if !self.key_range.contains(note.pitch) {
            note.mark_out_of_range();
        }
        self.notes.push(note);
    }

    fn materialize_all(&mut self) -> usize {
        let count = self.pending.len();
        while let Some(decoded) = self.pending.pop_front() {
            let note = FallingNote::from_decoded(&decoded, self.lead_time_sec);
            self.push_note(note);
        }
        count
    }

    /// Instantiates pending notes whose target time falls within the stream
    /// window of `current_time_sec`.
    fn materialize_due(&mut self, current_time_sec: f64) -> usize {
        let Some(window) = self.stream_window_sec else {
            return self.materialize_all();
        };

        let horizon = current_time_sec + window;
        let mut count = 0;
        while let Some(next) = self.pending.front() {
            if next.start_sec + self.lead_time_sec > horizon {
                break;
            }

            if let Some(decoded) = self.pending.pop_front() {
                let note = FallingNote::from_decoded(&decoded, self.lead_time_sec);
                self.push_note(note);
                count += 1;
            }
        }

        if count > 0 {
            debug!(
                "Materialized {} notes up to {:.3}s ({} pending)..!",
                count,
                horizon,
                self.pending.len()
            );
        }

        count
    }

    /// Advances every note to `current_time_sec` exactly once, then retires
    /// notes whose fade has elapsed.
    pub fn update(&mut self, current_time_sec: f64) -> UpdateOutcome {
        let mut outcome = UpdateOutcome {
            materialized: self.materialize_due(current_time_sec),
            ..UpdateOutcome::default()
        };

        for note in self.notes.iter_mut() {
            match note.update(current_time_sec, self.window) {
                Some(NoteState::Active) => outcome.newly_active += 1,
                Some(NoteState::Missed) => {
                    outcome.newly_missed += 1;
                    debug!(
                        "Missed {} (target {:.3}s)..!",
                        note_name(note.pitch),
                        note.target_time_sec
                    );
                }
                _ => {}
            }
        }
        self.missed_notes += outcome.newly_missed;

        let before = self.notes.len();
        let fade_sec = self.fade_sec;
        let tolerance_sec = self.window.tolerance() / 1000.0;
        let mut retired_out_of_range = 0;

        self.notes.retain(|note| {
            let keep = match note.state() {
                NoteState::Hit | NoteState::Missed => note
                    .resolved_at_sec()
                    .is_none_or(|at| current_time_sec - at < fade_sec),
                NoteState::OutOfRange => {
                    current_time_sec <= note.target_time_sec + tolerance_sec + fade_sec
                }
                NoteState::Upcoming | NoteState::Active => true,
            };

            if !keep && note.state() == NoteState::OutOfRange {
                retired_out_of_range += 1;
            }
            keep
        });

        self.retired_out_of_range += retired_out_of_range;
        outcome.retired = before - self.notes.len();

        outcome
    }

    /// Judges a key press. Among the Upcoming/Active notes of that pitch, the
    /// one closest in time to the press is matched.
    pub fn check_hit(&mut self, pitch: u8, play_time_ms: f64) -> Option<HitOutcome> {
        self.materialize_due(play_time_ms / 1000.0);

        let window = self.window;
        let best = self
            .notes
            .iter()
            .enumerate()
            .filter(|(_, note)| note.pitch == pitch && note.state().is_judgeable())
            .map(|(i, note)| (i, (play_time_ms - note.target_time_ms()).abs()))
            .filter(|(_, error)| *error <= window.tolerance())
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)?;

        let note = &mut self.notes[best];
        if !note.check_hit(pitch, play_time_ms, window) {
            return None;
        }

        let timing_error_ms = note.timing_error_ms()?;
        self.hit_notes += 1;

        Some(HitOutcome {
            pitch,
            target_time_sec: note.target_time_sec,
            timing_error_ms,
            grade: Grade::from_error(timing_error_ms, window.tolerance_ms),
            accuracy: note.accuracy(window).unwrap_or(0.0),
        })
    }

    /// Pitches that should light up on the keyboard: judgeable notes due within
    /// the highlight window.
    pub fn notes_to_highlight(&self, current_time_sec: f64) -> Vec<u8> {
        let mut pitches: Vec<u8> = self
            .notes
            .iter()
            .filter(|note| note.state().is_judgeable())
            .filter(|note| {
                let ahead = note.time_to_hit_sec(current_time_sec);
                (0.0..=self.highlight_window_sec).contains(&ahead)
            })
            .map(|note| note.pitch)
            .collect();

        pitches.sort_unstable();
        pitches.dedup();
        pitches
    }

    /// Re-evaluates which notes are playable on the displayed keyboard.
    pub fn set_key_range(&mut self, key_range: KeyRange) {
        self.key_range = key_range;

        for note in self.notes.iter_mut() {
            if key_range.contains(note.pitch) {
                note.restore_in_range();
            } else {
                note.mark_out_of_range();
            }
        }

        debug!(
            "Key range set to {}..={}..!",
            note_name(key_range.low),
            note_name(key_range.high)
        );
    }

    pub fn summary(&self) -> SessionSummary {
        let out_of_range_now = self
            .notes
            .iter()
            .filter(|note| note.state() == NoteState::OutOfRange)
            .count();

        SessionSummary {
            total_notes: self.total_notes,
            hit_notes: self.hit_notes,
            missed_notes: self.missed_notes,
            out_of_range_notes: self.retired_out_of_range + out_of_range_now,
        }
    }

    /// Drops every note, pending or instantiated.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.notes.clear();
        self.total_notes = 0;
        self.hit_notes = 0;
        self.missed_notes = 0;
        self.retired_out_of_range = 0;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::song::DecodedNote;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-9
    }

    fn decoded(pitch: u8, start_sec: f64) -> DecodedNote {
        DecodedNote {
            pitch,
            start_sec,
            duration_sec: 0.5,
            velocity: 90,
            track: 0,
            channel: 0,
            start_tick: 0,
            duration_ticks: 0,
        }
    }

    fn config(lead_time_sec: f64) -> SessionConfig {
        SessionConfig {
            lead_time_sec,
            ..SessionConfig::default()
        }
    }

    #[test]
    fn targets_include_lead_time() {
        env_logger::try_init().unwrap_or(());

        let timeline = NoteTimeline::new(vec![decoded(60, 0.0), decoded(62, 1.5)]);
        let scheduler = FallingNoteScheduler::from_timeline(timeline, &config(3.0));

        let targets: Vec<f64> = scheduler.notes().iter().map(|n| n.target_time_sec).collect();
        assert_eq!(targets.len(), 2);
        assert!(approx_eq(targets[0], 3.0));
        assert!(approx_eq(targets[1], 4.5));
        assert_eq!(scheduler.summary().total_notes, 2);
    }

    #[test]
    fn boundary_press_hits_and_late_press_misses() {
        env_logger::try_init().unwrap_or(());

        let timeline = NoteTimeline::new(vec![decoded(60, 1.0), decoded(64, 1.0)]);
        let mut scheduler = FallingNoteScheduler::from_timeline(timeline, &config(0.0));

        let hit = scheduler.check_hit(60, 1200.0).unwrap();
        assert!(approx_eq(hit.timing_error_ms, 200.0));
        assert_eq!(hit.grade, Grade::Ok);

        assert!(scheduler.check_hit(64, 1201.0).is_none());
        let outcome = scheduler.update(1.201);
        assert_eq!(outcome.newly_missed, 1);

        let summary = scheduler.summary();
        assert_eq!(summary.hit_notes, 1);
        assert_eq!(summary.missed_notes, 1);
        assert!(summary.is_complete());
    }

    #[test]
    fn repeated_update_does_not_double_count() {
        env_logger::try_init().unwrap_or(());

        let timeline = NoteTimeline::new(vec![decoded(60, 0.0), decoded(62, 0.1)]);
        let mut scheduler = FallingNoteScheduler::from_timeline(timeline, &config(0.0));

        let first = scheduler.update(0.35);
        let second = scheduler.update(0.35);

        assert_eq!(first.newly_missed, 2);
        assert_eq!(second.newly_missed, 0);
        assert_eq!(scheduler.summary().missed_notes, 2);
        assert_eq!(
            scheduler.notes().iter().map(|n| n.state()).collect::<Vec<_>>(),
            vec![NoteState::Missed, NoteState::Missed]
        );
    }

    #[test]
    fn press_matches_closest_candidate() {
        env_logger::try_init().unwrap_or(());

        // Two C4s 150ms apart: a press at 1.14s is within both windows but
        // belongs to the second one
        let timeline = NoteTimeline::new(vec![decoded(60, 1.0), decoded(60, 1.15)]);
        let mut scheduler = FallingNoteScheduler::from_timeline(timeline, &config(0.0));

        let hit = scheduler.check_hit(60, 1140.0).unwrap();
        assert!(approx_eq(hit.target_time_sec, 1.15));
        assert_eq!(scheduler.notes()[0].state(), NoteState::Upcoming);
        assert_eq!(scheduler.notes()[1].state(), NoteState::Hit);

        let hit = scheduler.check_hit(60, 1010.0).unwrap();
        assert!(approx_eq(hit.target_time_sec, 1.0));
        assert_eq!(hit.grade, Grade::Perfect);
    }

    #[test]
    fn streaming_keeps_a_bounded_window() {
        env_logger::try_init().unwrap_or(());

        let notes: Vec<DecodedNote> = (0..100).map(|i| decoded(60, i as f64)).collect();
        let config = SessionConfig {
            lead_time_sec: 1.0,
            stream_window_sec: Some(5.0),
            ..SessionConfig::default()
        };
        let mut scheduler = FallingNoteScheduler::from_timeline(NoteTimeline::new(notes), &config);

        // targets 1..=5 are inside the first window
        assert_eq!(scheduler.notes().len(), 5);
        assert_eq!(scheduler.pending_notes(), 95);

        for frame in 0..=200 {
            scheduler.update(frame as f64 * 0.25);
            assert!(scheduler.notes().len() <= 8);
        }

        let summary = scheduler.summary();
        assert_eq!(summary.total_notes, 100);
        assert_eq!(summary.missed_notes, 49);
        assert!(scheduler.pending_notes() > 0);
    }

    #[test]
    fn resolved_notes_fade_out() {
        env_logger::try_init().unwrap_or(());

        let timeline = NoteTimeline::new(vec![decoded(60, 1.0)]);
        let mut scheduler = FallingNoteScheduler::from_timeline(timeline, &config(0.0));

        scheduler.check_hit(60, 1000.0);
        assert_eq!(scheduler.update(1.2).retired, 0);
        assert_eq!(scheduler.update(1.5).retired, 1);
        assert!(scheduler.notes().is_empty());
        assert_eq!(scheduler.summary().hit_notes, 1);
    }

    #[test]
    fn key_range_marks_and_restores_notes() {
        env_logger::try_init().unwrap_or(());

        let timeline = NoteTimeline::new(vec![decoded(20, 1.0), decoded(60, 1.0)]);
        let mut scheduler = FallingNoteScheduler::from_timeline(timeline, &config(0.0));

        assert_eq!(scheduler.notes()[0].state(), NoteState::OutOfRange);
        assert!(scheduler.check_hit(20, 1000.0).is_none());
        assert_eq!(scheduler.summary().out_of_range_notes, 1);

        scheduler.set_key_range(KeyRange::new(0, 127));
        assert!(scheduler.check_hit(20, 1000.0).is_some());

        scheduler.set_key_range(KeyRange::new(61, 72));
        scheduler.update(5.0);
        let summary = scheduler.summary();
        assert_eq!(summary.hit_notes, 1);
        assert_eq!(summary.out_of_range_notes, 1);
        assert!(summary.is_complete());
    }

    #[test]
    fn highlights_notes_about_to_land() {
        env_logger::try_init().unwrap_or(());

        let timeline = NoteTimeline::new(vec![
            decoded(60, 1.0),
            decoded(64, 1.0),
            decoded(67, 2.0),
        ]);
        let scheduler = FallingNoteScheduler::from_timeline(timeline, &config(0.0));

        assert_eq!(scheduler.notes_to_highlight(0.8), vec![60, 64]);
        assert!(scheduler.notes_to_highlight(0.5).is_empty());
        assert_eq!(scheduler.notes_to_highlight(1.9), vec![67]);
    }

    #[test]
    fn practice_sequence_is_evenly_spaced() {
        env_logger::try_init().unwrap_or(());

        let scheduler = FallingNoteScheduler::from_sequence(&[60, 62, 64], &config(2.0));
        let notes = scheduler.notes();

        assert_eq!(notes.len(), 3);
        assert!(approx_eq(notes[0].target_time_sec, 2.0));
        assert!(approx_eq(notes[2].target_time_sec, 4.0));
        assert!(notes.iter().all(|n| n.velocity == PRACTICE_VELOCITY));
        assert!(notes.iter().all(|n| approx_eq(n.duration_sec, PRACTICE_DURATION_SEC)));
    }
}
