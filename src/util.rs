use crate::theory::{chord_names, scale_names};
use log::info;

/// What the binary does with the loaded content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Report,
    Preview,
    Play,
}

/// Which notes a session is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Practice {
    Midi,
    Scale,
    Chord,
}

pub fn parse_mode(s: &str) -> Mode {
    match s.to_lowercase().as_str() {
        "r" | "report" | "analyze" => Mode::Report,
        "d" | "dry" | "preview" => Mode::Preview,
        "p" | "play" | "practice" => Mode::Play,
        other => {
            info!("Unknown mode '{}', defaulting to `play`..!", other);
            Mode::Play
        }
    }
}

pub fn parse_practice(s: &str) -> Practice {
    match s.to_lowercase().as_str() {
        "m" | "midi" | "song" => Practice::Midi,
        "s" | "scale" => Practice::Scale,
        "c" | "chord" => Practice::Chord,
        other => {
            info!("Unknown practice content '{}', defaulting to `midi`..!", other);
            Practice::Midi
        }
    }
}

/// Normalizes a scale name typed on the command line, e.g. `Natural Minor`.
pub fn parse_scale_type(s: &str) -> String {
    let name = s.trim().to_lowercase().replace([' ', '-'], "_");
    if !scale_names().any(|known| known == name) {
        info!(
            "Unknown scale '{}'. Known scales: {}",
            s,
            scale_names().collect::<Vec<_>>().join(", ")
        );
    }
    name
}

pub fn parse_chord_type(s: &str) -> String {
    let name = s.trim().to_lowercase().replace([' ', '-'], "_");
    if !chord_names().any(|known| known == name) {
        info!(
            "Unknown chord '{}'. Known chords: {}",
            s,
            chord_names().collect::<Vec<_>>().join(", ")
        );
    }
    name
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_modes_and_practice() {
        env_logger::try_init().unwrap_or(());

        assert_eq!(parse_mode("Report"), Mode::Report);
        assert_eq!(parse_mode("d"), Mode::Preview);
        assert_eq!(parse_mode("whatever"), Mode::Play);
        assert_eq!(parse_practice("SCALE"), Practice::Scale);
        assert_eq!(parse_practice("c"), Practice::Chord);
        assert_eq!(parse_practice(""), Practice::Midi);
    }

    #[test]
    fn normalizes_theory_names() {
        env_logger::try_init().unwrap_or(());

        assert_eq!(parse_scale_type("Natural Minor"), "natural_minor");
        assert_eq!(parse_scale_type("pentatonic-major"), "pentatonic_major");
        assert_eq!(parse_chord_type(" Half-Dim7 "), "half_dim7");
    }
}
