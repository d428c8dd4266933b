use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Structural failures that abort a MIDI import.
///
/// Per-note anomalies never surface here; they are logged and counted in
/// [`crate::DecodeAnomalies`] instead.
#[derive(Error, Debug)]
pub enum MidiError {
    #[error("MIDI file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("Failed to read MIDI file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed MIDI header: {reason}")]
    MalformedMidiHeader { reason: String },

    #[error("Unexpected end of file at byte {offset} (needed {needed} more bytes)")]
    UnexpectedEof { offset: usize, needed: usize },

    #[error("Malformed MIDI track data: {reason}")]
    Malformed { reason: String },
}

/// Non-fatal problems recovered from while decoding a file.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecodeWarning {
    /// The header carried no usable ticks-per-beat; the fallback was used instead.
    #[error("Invalid ticks per beat {found}, using {substituted}")]
    InvalidTicksPerBeat { found: u16, substituted: u16 },
}
