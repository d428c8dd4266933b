use crate::error::DecodeWarning;
use crate::timeline::NoteTimeline;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const MICROSECONDS_PER_MINUTE: f64 = 60_000_000.0;

/// A note with absolute timing, produced once per parse and never mutated.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DecodedNote {
    pub pitch: u8,
    pub start_sec: f64,
    pub duration_sec: f64,
    pub velocity: u8,
    pub track: usize,
    pub channel: u8,
    pub start_tick: u64,
    pub duration_ticks: u64,
}

impl DecodedNote {
    pub fn end_sec(&self) -> f64 {
        self.start_sec + self.duration_sec
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TempoChange {
    pub tick: u64,
    pub seconds: f64,
    pub microseconds_per_beat: u32,
    pub track: usize,
}

impl TempoChange {
    pub fn bpm(&self) -> f64 {
        bpm(self.microseconds_per_beat)
    }
}

pub fn bpm(microseconds_per_beat: u32) -> f64 {
    MICROSECONDS_PER_MINUTE / (microseconds_per_beat.max(1) as f64)
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TimeSignatureChange {
    pub tick: u64,
    pub seconds: f64,
    pub numerator: u8,
    pub denominator: u8,
    pub track: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct KeySignatureChange {
    pub tick: u64,
    pub seconds: f64,
    pub key: String,
    pub track: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProgramChange {
    pub tick: u64,
    pub seconds: f64,
    pub track: usize,
    pub channel: u8,
    pub program: u8,
}

/// Min/max/avg note duration in seconds. All zero for an empty timeline.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct DurationStats {
    pub min_sec: f64,
    pub max_sec: f64,
    pub avg_sec: f64,
}

/// Counters for every non-fatal decode anomaly.
///
/// `note_ons == decoded_notes + duplicate_note_ons + dropped_short_notes` holds
/// for every decoded file.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeAnomalies {
    pub duplicate_note_ons: usize,
    pub orphan_note_offs: usize,
    pub dropped_short_notes: usize,
    pub force_closed_notes: usize,
    pub channel_fallback_matches: usize,
}

impl DecodeAnomalies {
    pub fn absorb(&mut self, other: &DecodeAnomalies) {
        self.duplicate_note_ons += other.duplicate_note_ons;
        self.orphan_note_offs += other.orphan_note_offs;
        self.dropped_short_notes += other.dropped_short_notes;
        self.force_closed_notes += other.force_closed_notes;
        self.channel_fallback_matches += other.channel_fallback_matches;
    }
}

/// Everything learned about a file besides the notes themselves.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct MidiAnalysis {
    pub title: Option<String>,
    pub total_duration_sec: f64,
    pub ticks_per_beat: u16,
    pub track_names: Vec<String>,
    pub tempo_changes: Vec<TempoChange>,
    pub time_signature_changes: Vec<TimeSignatureChange>,
    pub key_signature_changes: Vec<KeySignatureChange>,
    pub program_changes: Vec<ProgramChange>,
    pub duration_stats: DurationStats,
    pub peak_concurrency: usize,
    /// Raw `NoteOn` events with a non-zero velocity.
    pub note_ons: usize,
    pub note_distribution: BTreeMap<u8, usize>,
    pub anomalies: DecodeAnomalies,
    pub warnings: Vec<DecodeWarning>,
}

impl MidiAnalysis {
    pub fn unique_pitches(&self) -> usize {
        self.note_distribution.len()
    }

    pub fn pitch_range(&self) -> Option<(u8, u8)> {
        let low = self.note_distribution.keys().next()?;
        let high = self.note_distribution.keys().next_back()?;
        Some((*low, *high))
    }

    /// Most frequently started pitches, highest count first, ties by pitch.
    pub fn most_frequent(&self, n: usize) -> Vec<(u8, usize)> {
        let mut counts: Vec<(u8, usize)> = self
            .note_distribution
            .iter()
            .map(|(&pitch, &count)| (pitch, count))
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        counts.truncate(n);
        counts
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Song {
    pub timeline: NoteTimeline,
    pub analysis: MidiAnalysis,
}
