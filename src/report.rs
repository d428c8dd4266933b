use crate::model::song::{MidiAnalysis, Song, bpm};
use crate::tempo::DEFAULT_MPQN;
use crate::theory::note_name;
use std::collections::BTreeMap;
use std::fmt::Write;

const TOP_PITCHES: usize = 5;

/// Human-readable summary of a decoded file, one labelled section per topic.
pub fn analysis_report(song: &Song) -> String {
    let analysis = &song.analysis;
    let mut out = String::new();

    let _ = writeln!(
        out,
        "### MIDI File Analysis Report: {} ###\n",
        analysis.title.as_deref().unwrap_or("Untitled")
    );

    general_info(&mut out, analysis);
    note_info(&mut out, song);
    duration_stats(&mut out, analysis);
    tempo_changes(&mut out, analysis);
    time_signature_changes(&mut out, analysis);
    key_signature_changes(&mut out, analysis);
    program_changes(&mut out, analysis);
    decode_anomalies(&mut out, analysis);

    out
}

fn general_info(out: &mut String, analysis: &MidiAnalysis) {
    let _ = writeln!(out, "Approx. Total Duration: {:.2} seconds", analysis.total_duration_sec);
    let _ = writeln!(out, "Ticks Per Beat: {}", analysis.ticks_per_beat);
    let _ = writeln!(out, "Number of Tracks: {}", analysis.track_names.len());
    let _ = writeln!(
        out,
        "Tracks: {}\n",
        if analysis.track_names.is_empty() {
            "N/A".to_owned()
        } else {
            analysis.track_names.join(", ")
        }
    );
}

fn note_info(out: &mut String, song: &Song) {
    let analysis = &song.analysis;

    let _ = writeln!(out, "Total Notes Played (raw NoteOn): {}", analysis.note_ons);
    let _ = writeln!(out, "Notes in Sequence (Timed): {}", song.timeline.len());
    let _ = writeln!(out, "Unique Notes Used: {}", analysis.unique_pitches());
    let _ = writeln!(out, "Peak Concurrent Notes: {}", analysis.peak_concurrency);

    let Some((low, high)) = analysis.pitch_range() else {
        let _ = writeln!(out, "Note Range: N/A\nMost Frequent Notes: N/A\n");
        return;
    };

    let _ = writeln!(
        out,
        "Note Range: {} ({}) - {} ({})\n",
        low,
        note_name(low),
        high,
        note_name(high)
    );

    let _ = writeln!(out, "Most Frequent Notes (Top {}):", TOP_PITCHES);
    for (pitch, count) in analysis.most_frequent(TOP_PITCHES) {
        let _ = writeln!(out, "  Note {} ({}): {} times", pitch, note_name(pitch), count);
    }
    out.push('\n');
}

fn duration_stats(out: &mut String, analysis: &MidiAnalysis) {
    let stats = analysis.duration_stats;

    let _ = writeln!(out, "Note Duration Statistics (Timed Notes):");
    let _ = writeln!(out, "  Min Duration: {:.4}", stats.min_sec);
    let _ = writeln!(out, "  Max Duration: {:.4}", stats.max_sec);
    let _ = writeln!(out, "  Avg Duration: {:.4}\n", stats.avg_sec);
}

fn tempo_changes(out: &mut String, analysis: &MidiAnalysis) {
    let default_bpm = bpm(DEFAULT_MPQN);
    let _ = writeln!(out, "Tempo Changes (BPM):");

    let mut changes: Vec<_> = analysis.tempo_changes.iter().collect();
    changes.sort_by_key(|c| c.tick);

    let Some(first) = changes.first() else {
        let _ = writeln!(
            out,
            "  No tempo changes detected (Using default: {:.2} BPM).\n",
            default_bpm
        );
        return;
    };

    let mut last_bpm = -1.0;
    if first.tick > 0 {
        let _ = writeln!(
            out,
            "  Initial Tempo (Default): {:.2} BPM (until tick {})",
            default_bpm, first.tick
        );
        last_bpm = default_bpm;
    }

    for change in changes {
        let bpm = change.bpm();
        if (bpm - last_bpm).abs() > 0.01 {
            let _ = writeln!(
                out,
                "  Tick {} ({:.2}s): {:.2} BPM",
                change.tick, change.seconds, bpm
            );
            last_bpm = bpm;
        }
    }
    out.push('\n');
}

fn time_signature_changes(out: &mut String, analysis: &MidiAnalysis) {
    let _ = writeln!(out, "Time Signature Changes:");

    let mut changes: Vec<_> = analysis.time_signature_changes.iter().collect();
    changes.sort_by_key(|c| c.tick);

    let Some(first) = changes.first() else {
        let _ = writeln!(out, "  No time signature changes detected (Assumed 4/4).\n");
        return;
    };

    let mut last = None;
    if first.tick > 0 {
        let _ = writeln!(out, "  Initial (Assumed): 4/4 (until tick {})", first.tick);
        last = Some((4, 4));
    }

    for change in changes {
        let signature = (change.numerator, change.denominator);
        if last != Some(signature) {
            let _ = writeln!(
                out,
                "  Tick {} ({:.2}s): {}/{}",
                change.tick, change.seconds, signature.0, signature.1
            );
            last = Some(signature);
        }
    }
    out.push('\n');
}

fn key_signature_changes(out: &mut String, analysis: &MidiAnalysis) {
    let _ = writeln!(out, "Key Signature Changes:");

    let mut changes: Vec<_> = analysis.key_signature_changes.iter().collect();
    changes.sort_by_key(|c| c.tick);

    let Some(first) = changes.first() else {
        let _ = writeln!(
            out,
            "  No key signature changes detected (Assumed C Major / A Minor).\n"
        );
        return;
    };

    let mut last: Option<&str> = None;
    if first.tick > 0 {
        let _ = writeln!(
            out,
            "  Initial (Assumed): C Major / A Minor (until tick {})",
            first.tick
        );
        last = Some("C");
    }

    for change in changes {
        if last != Some(change.key.as_str()) {
            let _ = writeln!(
                out,
                "  Tick {} ({:.2}s): {}",
                change.tick, change.seconds, change.key
            );
            last = Some(change.key.as_str());
        }
    }
    out.push('\n');
}

fn program_changes(out: &mut String, analysis: &MidiAnalysis) {
    let _ = writeln!(out, "Program (Instrument) Changes:");

    if analysis.program_changes.is_empty() {
        let _ = writeln!(out, "  No program changes detected.\n");
        return;
    }

    let mut by_track: BTreeMap<usize, Vec<_>> = BTreeMap::new();
    for change in analysis.program_changes.iter() {
        by_track.entry(change.track).or_default().push(change);
    }

    for (track, mut changes) in by_track {
        let name = analysis
            .track_names
            .get(track)
            .cloned()
            .unwrap_or_else(|| format!("Track {}", track));
        let _ = writeln!(out, "  {}:", name);

        changes.sort_by_key(|c| c.tick);
        let mut last_program = None;
        for change in changes {
            if last_program != Some(change.program) {
                let _ = writeln!(
                    out,
                    "    Tick {} ({:.2}s), Ch {}: Prog {}",
                    change.tick, change.seconds, change.channel, change.program
                );
                last_program = Some(change.program);
            }
        }
    }
    out.push('\n');
}

fn decode_anomalies(out: &mut String, analysis: &MidiAnalysis) {
    let anomalies = &analysis.anomalies;

    let _ = writeln!(out, "Decode Anomalies:");
    let _ = writeln!(out, "  Duplicate NoteOns ignored: {}", anomalies.duplicate_note_ons);
    let _ = writeln!(out, "  Orphaned NoteOffs: {}", anomalies.orphan_note_offs);
    let _ = writeln!(out, "  Near-zero notes dropped: {}", anomalies.dropped_short_notes);
    let _ = writeln!(out, "  Notes closed at track end: {}", anomalies.force_closed_notes);
    let _ = writeln!(
        out,
        "  NoteOffs matched across channels: {}",
        anomalies.channel_fallback_matches
    );

    for warning in analysis.warnings.iter() {
        let _ = writeln!(out, "  Warning: {}", warning);
    }
}
