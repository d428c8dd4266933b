use crate::model::song::{DecodedNote, DurationStats};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Default window for grouping note starts into a single chord.
pub const CHORD_THRESHOLD_SEC: f64 = 0.05;

/// Every decoded note of a file, sorted by start time.
///
/// Ties are broken by track index and then pitch so the order never depends
/// on hash or sort stability. The timeline is immutable once built.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct NoteTimeline {
    notes: Vec<DecodedNote>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Chord {
    pub time_sec: f64,
    pub pitches: Vec<u8>,
}

impl NoteTimeline {
    pub fn new(mut notes: Vec<DecodedNote>) -> Self {
        notes.sort_by(timeline_order);
        Self { notes }
    }

    /// Merges per-track note lists into one timeline.
    pub fn from_tracks<I>(tracks: I) -> Self
    where
        I: IntoIterator<Item = Vec<DecodedNote>>,
    {
        Self::new(tracks.into_iter().flatten().collect())
    }

    pub fn notes(&self) -> &[DecodedNote] {
        &self.notes
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DecodedNote> {
        self.notes.iter()
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// End of the last-sounding note.
    pub fn end_sec(&self) -> f64 {
        self.notes
            .iter()
            .map(DecodedNote::end_sec)
            .fold(0.0, f64::max)
    }

    pub fn duration_stats(&self) -> DurationStats {
        if self.notes.is_empty() {
            return DurationStats::default();
        }

        let mut min_sec = f64::INFINITY;
        let mut max_sec = 0.0f64;
        let mut sum = 0.0;

        for note in self.notes.iter() {
            min_sec = min_sec.min(note.duration_sec);
            max_sec = max_sec.max(note.duration_sec);
            sum += note.duration_sec;
        }

        DurationStats {
            min_sec,
            max_sec,
            avg_sec: sum / self.notes.len() as f64,
        }
    }

    /// Largest number of notes sounding at once.
    ///
    /// A note ending at `t` is not counted as overlapping a note starting at
    /// the same `t`: end points sort before start points on ties.
    pub fn peak_concurrency(&self) -> usize {
        let mut points: Vec<(f64, i32)> = Vec::with_capacity(self.notes.len() * 2);
        for note in self.notes.iter() {
            points.push((note.start_sec, 1));
            points.push((note.end_sec(), -1));
        }

        points.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut current: i32 = 0;
        let mut peak: i32 = 0;
        for (_, change) in points {
            current += change;
            peak = peak.max(current);
        }

        peak as usize
    }

    /// Groups notes into chords: a note joins the current group while its start
    /// lies within `threshold_sec` of the group's average start time.
    pub fn chords(&self, threshold_sec: f64) -> Vec<Chord> {
        let mut chords: Vec<Chord> = Vec::new();
        let mut group: Vec<&DecodedNote> = Vec::new();
        let mut group_time = 0.0;

        for note in self.notes.iter() {
            if group.is_empty() || (note.start_sec - group_time).abs() < threshold_sec {
                group.push(note);
                group_time = group.iter().map(|n| n.start_sec).sum::<f64>() / group.len() as f64;
                continue;
            }

            chords.push(Chord {
                time_sec: group_time,
                pitches: group.iter().map(|n| n.pitch).collect(),
            });
            group.clear();
            group.push(note);
            group_time = note.start_sec;
        }

        if !group.is_empty() {
            chords.push(Chord {
                time_sec: group_time,
                pitches: group.iter().map(|n| n.pitch).collect(),
            });
        }

        chords
    }

    /// Notes sounding at any point within `[start_sec, end_sec]`.
    pub fn notes_in_range(&self, start_sec: f64, end_sec: f64) -> Vec<&DecodedNote> {
        self.notes
            .iter()
            .take_while(|n| n.start_sec <= end_sec)
            .filter(|n| n.end_sec() >= start_sec)
            .collect()
    }
}

impl IntoIterator for NoteTimeline {
    type Item = DecodedNote;
    type IntoIter = std::vec::IntoIter<DecodedNote>;

    fn into_iter(self) -> Self::IntoIter {
        self.notes.into_iter()
    }
}

impl<'a> IntoIterator for &'a NoteTimeline {
    type Item = &'a DecodedNote;
    type IntoIter = std::slice::Iter<'a, DecodedNote>;

    fn into_iter(self) -> Self::IntoIter {
        self.notes.iter()
    }
}

fn timeline_order(a: &DecodedNote, b: &DecodedNote) -> Ordering {
    a.start_sec
        .total_cmp(&b.start_sec)
        .then(a.track.cmp(&b.track))
        .then(a.pitch.cmp(&b.pitch))
}
