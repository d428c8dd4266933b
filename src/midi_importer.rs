use crate::assembler::NoteAssembler;
use crate::decoder::{NoteEventKind, TrackEventDecoder, TrackMessage};
use crate::error::{DecodeWarning, MidiError};
use crate::model::song::*;
use crate::model::source::*;
use crate::tempo::{DEFAULT_MPQN, DEFAULT_TICKS_PER_BEAT, TempoMap, ticks_to_seconds};
use crate::theory::key_signature_name;
use crate::timeline::NoteTimeline;
use log::{debug, info, warn};
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

pub type Result<T> = std::result::Result<T, MidiError>;

const HEADER_CHUNK: &[u8; 4] = b"MThd";
const TRACK_CHUNK: &[u8; 4] = b"MTrk";
const CHUNK_PREFIX_LEN: usize = 8;
const MIN_HEADER_LEN: usize = 6;

/// Reads and decodes a MIDI file into a timeline plus its analysis record.
pub fn import_midi_file<P: AsRef<Path>>(path: P) -> Result<Song> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => MidiError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => MidiError::Io {
            path: path.to_path_buf(),
            source: e,
        },
    })?;

    let title = path
        .file_name()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string());

    midi_bytes_to_song(&bytes, title)
}

pub fn midi_bytes_to_song(bytes: &[u8], title: Option<String>) -> Result<Song> {
    let source = parse_midi_bytes(bytes)?;
    let mut song = decode_source(&source);
    song.analysis.title = title;

    Ok(song)
}

/// Validates the chunk layout and converts the file into a [`MidiSource`].
pub fn parse_midi_bytes(bytes: &[u8]) -> Result<MidiSource> {
    check_structure(bytes)?;

    let smf = Smf::parse(bytes).map_err(|e| MidiError::Malformed {
        reason: e.to_string(),
    })?;

    debug!(
        "MIDI format: {:?}, timing: {:?}, tracks: {}",
        smf.header.format,
        smf.header.timing,
        smf.tracks.len()
    );

    Ok(smf_to_source(&smf))
}

fn check_structure(bytes: &[u8]) -> Result<()> {
    let lead = &bytes[..bytes.len().min(HEADER_CHUNK.len())];
    if !HEADER_CHUNK.starts_with(lead) {
        return Err(MidiError::MalformedMidiHeader {
            reason: format!("expected 'MThd' chunk, found {:?}", lead),
        });
    }

    let header_end = CHUNK_PREFIX_LEN + MIN_HEADER_LEN;
    if bytes.len() < header_end {
        return Err(MidiError::UnexpectedEof {
            offset: bytes.len(),
            needed: header_end - bytes.len(),
        });
    }

    let header_len = read_u32(&bytes[4..8]) as usize;
    if header_len < MIN_HEADER_LEN {
        return Err(MidiError::MalformedMidiHeader {
            reason: format!("header chunk is {} bytes long, expected at least 6", header_len),
        });
    }

    let format = u16::from_be_bytes([bytes[8], bytes[9]]);
    if format > 2 {
        return Err(MidiError::MalformedMidiHeader {
            reason: format!("unknown SMF format {}", format),
        });
    }

    let mut offset = CHUNK_PREFIX_LEN.saturating_add(header_len);
    if bytes.len() < offset {
        return Err(MidiError::UnexpectedEof {
            offset: bytes.len(),
            needed: offset - bytes.len(),
        });
    }

    while offset < bytes.len() {
        let remaining = bytes.len() - offset;
        if remaining < CHUNK_PREFIX_LEN {
            warn!("Ignoring {} trailing bytes after the last chunk..!", remaining);
            break;
        }

        let id = &bytes[offset..offset + 4];
        let len = read_u32(&bytes[offset + 4..offset + 8]) as usize;
        let end = offset.saturating_add(CHUNK_PREFIX_LEN).saturating_add(len);

        if end > bytes.len() {
            if id == TRACK_CHUNK {
                return Err(MidiError::UnexpectedEof {
                    offset: bytes.len(),
                    needed: end - bytes.len(),
                });
            }

            warn!(
                "Ignoring truncated non-track chunk {:?} at byte {}..!",
                String::from_utf8_lossy(id),
                offset
            );
            break;
        }

        offset = end;
    }

    Ok(())
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

pub fn smf_to_source(smf: &Smf) -> MidiSource {
    let ticks_per_beat = match smf.header.timing {
        Timing::Metrical(t) => t.as_int(),
        Timing::Timecode(fps, subframe) => {
            warn!(
                "SMPTE timecode timing ({:?} fps, {} subframes) has no ticks per beat..!",
                fps, subframe
            );
            0
        }
    };

    let tracks = smf
        .tracks
        .iter()
        .map(|track| {
            track
                .iter()
                .map(|event| TrackEvent {
                    delta: event.delta.as_int(),
                    kind: convert_kind(&event.kind),
                })
                .collect()
        })
        .collect();

    MidiSource {
        ticks_per_beat,
        tracks,
    }
}

fn convert_kind(kind: &TrackEventKind) -> EventKind {
    match kind {
        TrackEventKind::Meta(meta) => match meta {
            MetaMessage::Tempo(micro) => EventKind::Meta(MetaEvent::Tempo(micro.as_int())),
            MetaMessage::TimeSignature(numerator, denominator_pow, _, _) => {
                EventKind::Meta(MetaEvent::TimeSignature {
                    numerator: *numerator,
                    denominator: 1u8 << (*denominator_pow).min(7),
                })
            }
            MetaMessage::KeySignature(sharps, minor) => EventKind::Meta(MetaEvent::KeySignature {
                sharps: *sharps,
                minor: *minor,
            }),
            MetaMessage::TrackName(bytes) => {
                EventKind::Meta(MetaEvent::TrackName(String::from_utf8_lossy(bytes).into_owned()))
            }
            _ => EventKind::Other,
        },
        TrackEventKind::Midi { channel, message } => {
            let channel: u8 = channel.as_int();

            match message {
                MidiMessage::NoteOn { key, vel } => EventKind::Channel(ChannelEvent::NoteOn {
                    channel,
                    pitch: key.as_int(),
                    velocity: vel.as_int(),
                }),
                MidiMessage::NoteOff { key, vel } => EventKind::Channel(ChannelEvent::NoteOff {
                    channel,
                    pitch: key.as_int(),
                    velocity: vel.as_int(),
                }),
                MidiMessage::ProgramChange { program } => {
                    EventKind::Channel(ChannelEvent::ProgramChange {
                        channel,
                        program: program.as_int(),
                    })
                }
                _ => EventKind::Other,
            }
        }
        _ => EventKind::Other,
    }
}

/// First `set_tempo` found anywhere in the file, in track order.
fn initial_tempo(source: &MidiSource) -> Option<u32> {
    source.tracks.iter().flatten().find_map(|event| match event.kind {
        EventKind::Meta(MetaEvent::Tempo(mpqn)) => Some(mpqn),
        _ => None,
    })
}

/// Decodes every track into absolute-time notes and gathers the analysis.
///
/// Never fails: every per-note anomaly is logged, counted and either dropped
/// or repaired.
pub fn decode_source(source: &MidiSource) -> Song {
    let mut analysis = MidiAnalysis::default();

    let ticks_per_beat = if source.ticks_per_beat == 0 {
        warn!(
            "MIDI file has invalid or missing ticks per beat, using default {}..!",
            DEFAULT_TICKS_PER_BEAT
        );
        analysis.warnings.push(DecodeWarning::InvalidTicksPerBeat {
            found: source.ticks_per_beat,
            substituted: DEFAULT_TICKS_PER_BEAT,
        });
        DEFAULT_TICKS_PER_BEAT
    } else {
        source.ticks_per_beat
    };
    analysis.ticks_per_beat = ticks_per_beat;

    let seed_tempo = initial_tempo(source).unwrap_or_else(|| {
        debug!(
            "No tempo found, using default {} us/qn ({:.2} BPM)",
            DEFAULT_MPQN,
            bpm(DEFAULT_MPQN)
        );
        DEFAULT_MPQN
    });

    let mut track_notes: Vec<Vec<DecodedNote>> = Vec::with_capacity(source.tracks.len());
    let mut max_tick: u64 = 0;

    for (track_idx, track) in source.tracks.iter().enumerate() {
        let mut decoder = TrackEventDecoder::new(track_idx, track);
        let mut tempo = TempoMap::new(seed_tempo);
        let mut assembler = NoteAssembler::new(track_idx, ticks_per_beat);
        let mut track_name: Option<String> = None;

        for msg in decoder.by_ref() {
            let current_tempo = tempo.current();
            let seconds = ticks_to_seconds(msg.tick, ticks_per_beat, current_tempo);

            match msg.message {
                TrackMessage::Meta(MetaEvent::Tempo(mpqn)) => {
                    debug!(
                        "T{} Tempo change at tick {}: {} -> {} us/qn ({:.2} BPM)",
                        track_idx,
                        msg.tick,
                        current_tempo,
                        mpqn,
                        bpm(*mpqn)
                    );
                    tempo.push(msg.tick, *mpqn);
                    analysis.tempo_changes.push(TempoChange {
                        tick: msg.tick,
                        seconds: ticks_to_seconds(msg.tick, ticks_per_beat, *mpqn),
                        microseconds_per_beat: *mpqn,
                        track: track_idx,
                    });
                }
                TrackMessage::Meta(MetaEvent::TimeSignature {
                    numerator,
                    denominator,
                }) => {
                    analysis.time_signature_changes.push(TimeSignatureChange {
                        tick: msg.tick,
                        seconds,
                        numerator: *numerator,
                        denominator: *denominator,
                        track: track_idx,
                    });
                }
                TrackMessage::Meta(MetaEvent::KeySignature { sharps, minor }) => {
                    analysis.key_signature_changes.push(KeySignatureChange {
                        tick: msg.tick,
                        seconds,
                        key: key_signature_name(*sharps, *minor),
                        track: track_idx,
                    });
                }
                TrackMessage::Meta(MetaEvent::TrackName(name)) => {
                    if track_name.is_none() {
                        debug!("T{} Track name: {}", track_idx, name);
                        track_name = Some(name.clone());
                    }
                }
                TrackMessage::Program { channel, program } => {
                    analysis.program_changes.push(ProgramChange {
                        tick: msg.tick,
                        seconds,
                        track: track_idx,
                        channel,
                        program,
                    });
                }
                TrackMessage::Note(event) => match event.kind {
                    NoteEventKind::NoteOn => {
                        *analysis.note_distribution.entry(event.pitch).or_default() += 1;
                        assembler.note_on(&event, current_tempo);
                    }
                    NoteEventKind::NoteOff => assembler.note_off(&event),
                },
                TrackMessage::Other => {}
            }
        }

        let end_tick = decoder.tick();
        let assembled = assembler.finish(end_tick);

        debug!(
            "T{} finished at tick {} with {} notes..!",
            track_idx,
            end_tick,
            assembled.notes.len()
        );

        analysis.note_ons += assembled.note_ons;
        analysis.anomalies.absorb(&assembled.anomalies);
        analysis
            .track_names
            .push(track_name.unwrap_or_else(|| format!("Track {}", track_idx)));
        track_notes.push(assembled.notes);
        max_tick = max_tick.max(end_tick);
    }

    let file_tempo = TempoMap::from_changes(
        DEFAULT_MPQN,
        analysis
            .tempo_changes
            .iter()
            .map(|tc| (tc.tick, tc.microseconds_per_beat)),
    );
    analysis.total_duration_sec =
        ticks_to_seconds(max_tick, ticks_per_beat, file_tempo.tempo_at(max_tick));

    let timeline = NoteTimeline::from_tracks(track_notes);
    analysis.duration_stats = timeline.duration_stats();
    analysis.peak_concurrency = timeline.peak_concurrency();

    info!(
        "Finished decoding {} track(s): {} timed notes from {} note-ons..!",
        source.tracks.len(),
        timeline.len(),
        analysis.note_ons
    );

    if timeline.is_empty() && analysis.note_ons > 0 {
        warn!("Found NoteOn events but decoded zero timed notes, check durations..!");
    }

    Song { timeline, analysis }
}
