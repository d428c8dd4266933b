use crate::engine::judge::{DEFAULT_TOLERANCE_MS, HitWindow};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "keyfall",
    about = "Decode a MIDI file and practice it as falling notes!"
)]
pub struct Args {
    /// Path to the target MIDI file. Required for midi practice and the report.
    pub midi: Option<PathBuf>,

    /// What to do: report|preview|play.
    #[arg(short, long, default_value = "play")]
    pub mode: String,

    /// Practice content: midi|scale|chord.
    #[arg(short, long, default_value = "midi")]
    pub practice: String,

    /// Root note for scale and chord practice.
    #[arg(short, long, default_value_t = 60)]
    pub root: u8,

    /// Scale type for scale practice, e.g. major, natural_minor, blues.
    #[arg(long, default_value = "major")]
    pub scale: String,

    /// Octaves to span for scale practice.
    #[arg(long, default_value_t = 1)]
    pub octaves: u8,

    /// Chord type for chord practice, e.g. maj, min7, sus4.
    #[arg(long, default_value = "maj")]
    pub chord: String,

    /// Seconds between a note appearing and its target time.
    #[arg(short, long = "lead-time", default_value_t = 3.0)]
    pub lead_time: f64,

    /// Hit window in milliseconds on either side of a note's target time.
    #[arg(short, long, default_value_t = DEFAULT_TOLERANCE_MS)]
    pub tolerance: u32,

    /// Only materialize notes due within the next N seconds. Omit to load every note up front.
    #[arg(long = "stream-window")]
    pub stream_window: Option<f64>,

    /// Feed the input queue with the song's own notes.
    #[arg(short, long, default_value_t = false)]
    pub autoplay: bool,

    /// Largest timing offset in ms the autoplay producer cycles through.
    #[arg(long = "autoplay-jitter", default_value_t = 0.0)]
    pub autoplay_jitter: f64,

    /// Prints extra information to the terminal.
    #[arg(short, long)]
    pub verbose: bool,

    /// Maximum notes to print in preview mode.
    #[arg(long, default_value_t = 80)]
    pub preview_max: usize,
}

impl Args {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            lead_time_sec: self.lead_time.max(0.0),
            tolerance_ms: self.tolerance,
            stream_window_sec: self.stream_window,
            ..SessionConfig::default()
        }
    }
}

/// Inclusive range of MIDI pitches shown on the keyboard.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyRange {
    pub low: u8,
    pub high: u8,
}

impl Default for KeyRange {
    /// The 88-key piano, A0 to C8.
    fn default() -> Self {
        Self { low: 21, high: 108 }
    }
}

impl KeyRange {
    pub fn new(low: u8, high: u8) -> Self {
        Self {
            low: low.min(high),
            high: low.max(high),
        }
    }

    pub fn contains(&self, pitch: u8) -> bool {
        (self.low..=self.high).contains(&pitch)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    pub lead_time_sec: f64,
    pub tolerance_ms: u32,
    /// `None` materializes every note up front.
    pub stream_window_sec: Option<f64>,
    pub key_range: KeyRange,
    /// How long a resolved note stays visible before it is retired.
    pub fade_sec: f64,
    pub highlight_window_sec: f64,
    pub frame_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lead_time_sec: 3.0,
            tolerance_ms: DEFAULT_TOLERANCE_MS,
            stream_window_sec: None,
            key_range: KeyRange::default(),
            fade_sec: 0.5,
            highlight_window_sec: 0.3,
            frame_interval_ms: 16,
        }
    }
}

impl SessionConfig {
    pub fn hit_window(&self) -> HitWindow {
        HitWindow::new(self.tolerance_ms)
    }
}
