use crate::model::song::DecodedNote;
use crate::theory::note_name;
use log::debug;
use serde::{Deserialize, Serialize};

pub const DEFAULT_TOLERANCE_MS: u32 = 200;

/// Lifecycle of a falling note.
///
/// `Upcoming` and `Active` are recomputed from the clock on every update.
/// `Hit` and `Missed` are terminal. `OutOfRange` marks notes whose key is not
/// on the displayed keyboard; they are drawn but never judged.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoteState {
    Upcoming,
    Active,
    Hit,
    Missed,
    OutOfRange,
}

impl NoteState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, NoteState::Hit | NoteState::Missed)
    }

    /// Whether a key press may still resolve this note.
    pub fn is_judgeable(&self) -> bool {
        matches!(self, NoteState::Upcoming | NoteState::Active)
    }
}

/// Symmetric timing band around a note's target time.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct HitWindow {
    pub tolerance_ms: u32,
}

impl Default for HitWindow {
    fn default() -> Self {
        Self {
            tolerance_ms: DEFAULT_TOLERANCE_MS,
        }
    }
}

impl HitWindow {
    pub fn new(tolerance_ms: u32) -> Self {
        Self { tolerance_ms }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance_ms as f64
    }

    pub fn contains(&self, timing_error_ms: f64) -> bool {
        timing_error_ms.abs() <= self.tolerance()
    }

    /// Lifecycle state implied purely by the clock.
    pub fn state_at(&self, current_ms: f64, target_ms: f64) -> NoteState {
        if current_ms > target_ms + self.tolerance() {
            NoteState::Missed
        } else if (current_ms - target_ms).abs() <= self.tolerance() {
            NoteState::Active
        } else {
            NoteState::Upcoming
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Grade {
    Perfect,
    Great,
    Good,
    Ok,
    Miss,
}

impl Grade {
    pub const ALL: [Grade; 5] = [Grade::Perfect, Grade::Great, Grade::Good, Grade::Ok, Grade::Miss];

    /// Buckets a timing error by magnitude: `<30`, `<70`, `<120`, `<=tolerance`.
    pub fn from_error(timing_error_ms: f64, tolerance_ms: u32) -> Grade {
        let error = timing_error_ms.abs();

        if error < 30.0 {
            Grade::Perfect
        } else if error < 70.0 {
            Grade::Great
        } else if error < 120.0 {
            Grade::Good
        } else if error <= tolerance_ms as f64 {
            Grade::Ok
        } else {
            Grade::Miss
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Grade::Perfect => "Perfect",
            Grade::Great => "Great",
            Grade::Good => "Good",
            Grade::Ok => "OK",
            Grade::Miss => "Miss",
        }
    }

    pub fn timing_multiplier(&self) -> f64 {
        match self {
            Grade::Perfect => 1.5,
            Grade::Great => 1.2,
            Grade::Good => 1.0,
            Grade::Ok => 0.5,
            Grade::Miss => 0.1,
        }
    }
}

/// A scheduled note travelling towards the "now" line.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FallingNote {
    pub pitch: u8,
    pub target_time_sec: f64,
    pub duration_sec: f64,
    pub velocity: u8,
    state: NoteState,
    timing_error_ms: Option<f64>,
    resolved_at_sec: Option<f64>,
}

impl FallingNote {
    pub fn new(pitch: u8, target_time_sec: f64, duration_sec: f64, velocity: u8) -> Self {
        Self {
            pitch,
            target_time_sec,
            duration_sec,
            velocity,
            state: NoteState::Upcoming,
            timing_error_ms: None,
            resolved_at_sec: None,
        }
    }

    pub fn from_decoded(note: &DecodedNote, lead_time_sec: f64) -> Self {
        Self::new(
            note.pitch,
            note.start_sec + lead_time_sec,
            note.duration_sec,
            note.velocity,
        )
    }

    pub fn state(&self) -> NoteState {
        self.state
    }

    /// Signed error of the press that hit this note; negative is early.
    pub fn timing_error_ms(&self) -> Option<f64> {
        self.timing_error_ms
    }

    pub fn resolved_at_sec(&self) -> Option<f64> {
        self.resolved_at_sec
    }

    pub fn target_time_ms(&self) -> f64 {
        self.target_time_sec * 1000.0
    }

    pub fn time_to_hit_sec(&self, current_time_sec: f64) -> f64 {
        self.target_time_sec - current_time_sec
    }

    /// Percentage of the hit window left unused by the press, 100 for a
    /// perfectly timed hit.
    pub fn accuracy(&self, window: HitWindow) -> Option<f64> {
        let error = self.timing_error_ms?;
        if window.tolerance_ms == 0 {
            return Some(100.0);
        }

        Some((100.0 * (1.0 - error.abs() / window.tolerance())).max(0.0))
    }

    /// Re-derives the state from the clock. Returns the new state if it changed.
    pub fn update(&mut self, current_time_sec: f64, window: HitWindow) -> Option<NoteState> {
        if self.state.is_terminal() || self.state == NoteState::OutOfRange {
            return None;
        }

        let next = window.state_at(current_time_sec * 1000.0, self.target_time_ms());
        if next == self.state {
            return None;
        }

        debug!(
            "Note {} ({}) changed state: {:?} -> {:?} at {:.3}s (target {:.3}s)",
            self.pitch,
            note_name(self.pitch),
            self.state,
            next,
            current_time_sec,
            self.target_time_sec
        );

        if next == NoteState::Missed {
            self.resolved_at_sec = Some(current_time_sec);
        }
        self.state = next;

        Some(next)
    }

    /// Judges a key press against this note. A press outside the window leaves
    /// the note untouched so a better-timed press can still claim it.
    pub fn check_hit(&mut self, played_pitch: u8, play_time_ms: f64, window: HitWindow) -> bool {
        if !self.state.is_judgeable() || played_pitch != self.pitch {
            return false;
        }

        let timing_error_ms = play_time_ms - self.target_time_ms();
        if !window.contains(timing_error_ms) {
            debug!(
                "Press of {} outside the hit window (error {:.1}ms, state {:?})",
                note_name(self.pitch),
                timing_error_ms,
                self.state
            );
            return false;
        }

        debug!(
            "HIT registered for {} (error {:.1}ms, was {:?})",
            note_name(self.pitch),
            timing_error_ms,
            self.state
        );

        self.state = NoteState::Hit;
        self.timing_error_ms = Some(timing_error_ms);
        self.resolved_at_sec = Some(play_time_ms / 1000.0);

        true
    }

    pub(crate) fn mark_out_of_range(&mut self) {
        if self.state.is_judgeable() {
            self.state = NoteState::OutOfRange;
        }
    }

    /// Brings a note back onto the keyboard; the next update places it in time.
    pub(crate) fn restore_in_range(&mut self) {
        if self.state == NoteState::OutOfRange {
            self.state = NoteState::Upcoming;
        }
    }
}
