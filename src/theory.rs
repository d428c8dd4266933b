use log::warn;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

const MAJOR_KEYS: [&str; 15] = [
    "Cb", "Gb", "Db", "Ab", "Eb", "Bb", "F", "C", "G", "D", "A", "E", "B", "F#", "C#",
];

const MINOR_KEYS: [&str; 15] = [
    "Ab", "Eb", "Bb", "F", "C", "G", "D", "A", "E", "B", "F#", "C#", "G#", "D#", "A#",
];

const SCALES: &[(&str, &[u8])] = &[
    ("major", &[0, 2, 4, 5, 7, 9, 11, 12]),
    ("natural_minor", &[0, 2, 3, 5, 7, 8, 10, 12]),
    ("harmonic_minor", &[0, 2, 3, 5, 7, 8, 11, 12]),
    ("melodic_minor", &[0, 2, 3, 5, 7, 9, 11, 12]),
    ("pentatonic_major", &[0, 2, 4, 7, 9, 12]),
    ("pentatonic_minor", &[0, 3, 5, 7, 10, 12]),
    ("blues", &[0, 3, 5, 6, 7, 10, 12]),
    ("chromatic", &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]),
];

const CHORDS: &[(&str, &[u8])] = &[
    ("maj", &[0, 4, 7]),
    ("min", &[0, 3, 7]),
    ("dim", &[0, 3, 6]),
    ("aug", &[0, 4, 8]),
    ("maj7", &[0, 4, 7, 11]),
    ("min7", &[0, 3, 7, 10]),
    ("dom7", &[0, 4, 7, 10]),
    ("dim7", &[0, 3, 6, 9]),
    ("half_dim7", &[0, 3, 6, 10]),
    ("sus2", &[0, 2, 7]),
    ("sus4", &[0, 5, 7]),
    ("add9", &[0, 4, 7, 14]),
    ("add11", &[0, 4, 7, 17]),
    ("maj9", &[0, 4, 7, 11, 14]),
    ("min9", &[0, 3, 7, 10, 14]),
    ("dom9", &[0, 4, 7, 10, 14]),
];

/// Scientific pitch name, e.g. `C4` for 60. Anything above 127 is `??`.
pub fn note_name(pitch: u8) -> String {
    if pitch > 127 {
        return "??".to_owned();
    }

    let octave = (pitch / 12) as i32 - 1;
    format!("{}{}", NOTE_NAMES[(pitch % 12) as usize], octave)
}

/// Conventional key name for a key signature meta event, e.g. `Bbm`.
pub fn key_signature_name(sharps: i8, minor: bool) -> String {
    let idx = (sharps.clamp(-7, 7) + 7) as usize;
    if minor {
        format!("{}m", MINOR_KEYS[idx])
    } else {
        MAJOR_KEYS[idx].to_owned()
    }
}

fn lookup(table: &'static [(&'static str, &'static [u8])], name: &str) -> Option<&'static [u8]> {
    let name = name.to_lowercase();
    table
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, intervals)| *intervals)
}

pub fn scale_names() -> impl Iterator<Item = &'static str> {
    SCALES.iter().map(|(name, _)| *name)
}

pub fn chord_names() -> impl Iterator<Item = &'static str> {
    CHORDS.iter().map(|(name, _)| *name)
}

/// Pitches of a scale over `octaves` octaves, ending on the top root.
/// Pitches outside 0..=127 are skipped.
pub fn generate_scale(root: u8, scale_type: &str, octaves: u8) -> Vec<u8> {
    let intervals = lookup(SCALES, scale_type).unwrap_or_else(|| {
        warn!("Unknown scale type '{}', defaulting to major..!", scale_type);
        SCALES[0].1
    });

    let root = root as i32;
    let mut pitches: Vec<u8> = Vec::new();

    for octave in 0..octaves as i32 {
        for &interval in &intervals[..intervals.len() - 1] {
            push_in_range(&mut pitches, root + octave * 12 + interval as i32);
        }
    }
    push_in_range(&mut pitches, root + octaves as i32 * 12);

    pitches
}

pub fn generate_chord(root: u8, chord_type: &str) -> Vec<u8> {
    let intervals = lookup(CHORDS, chord_type).unwrap_or_else(|| {
        warn!("Unknown chord type '{}', defaulting to a major triad..!", chord_type);
        CHORDS[0].1
    });

    let mut pitches: Vec<u8> = Vec::new();
    for &interval in intervals {
        push_in_range(&mut pitches, root as i32 + interval as i32);
    }

    pitches
}

fn push_in_range(pitches: &mut Vec<u8>, pitch: i32) {
    if (0..=127).contains(&pitch) {
        pitches.push(pitch as u8);
    }
}
