use anyhow::{Result, bail};
use clap::Parser;
use keyfall::{
    Args, FallingNoteScheduler, INPUT_QUEUE_CAPACITY, LogAudio, Mode, Player, Practice, Session,
    SessionClock, analysis_report, generate_chord, generate_scale, import_midi_file, input_channel,
    note_name, parse_chord_type, parse_mode, parse_practice, parse_scale_type, spawn_autoplay,
};
use log::{debug, info, warn};
use std::sync::Arc;

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let mode = parse_mode(&args.mode);
    let practice = parse_practice(&args.practice);
    let config = args.session_config();

    let song = if practice == Practice::Midi || mode == Mode::Report {
        let Some(path) = args.midi.as_ref() else {
            bail!("A MIDI file is required for midi practice and the report..!");
        };

        info!("Importing MIDI file: '{}'...", path.display());
        let song = import_midi_file(path)?;
        debug!(
            "Imported '{}' with {} notes..!",
            song.analysis.title.as_deref().unwrap_or("<unknown>"),
            song.timeline.len()
        );
        Some(song)
    } else {
        None
    };

    if mode == Mode::Report {
        if let Some(song) = song.as_ref() {
            println!("{}", analysis_report(song));
        }
        return Ok(());
    }

    let (scheduler, presses) = match (practice, song) {
        (Practice::Midi, Some(song)) => {
            let presses: Vec<(f64, u8, u8)> = song
                .timeline
                .iter()
                .filter(|n| config.key_range.contains(n.pitch))
                .map(|n| (n.start_sec + config.lead_time_sec, n.pitch, n.velocity))
                .collect();
            (FallingNoteScheduler::from_timeline(song.timeline, &config), presses)
        }
        (Practice::Midi, None) => bail!("No MIDI file loaded..!"),
        (Practice::Scale, _) | (Practice::Chord, _) => {
            let pitches = if practice == Practice::Scale {
                let scale = parse_scale_type(&args.scale);
                info!("Practicing {} {} over {} octave(s)..!", note_name(args.root), scale, args.octaves);
                generate_scale(args.root, &scale, args.octaves)
            } else {
                let chord = parse_chord_type(&args.chord);
                info!("Practicing {} {} as an arpeggio..!", note_name(args.root), chord);
                generate_chord(args.root, &chord)
            };

            let scheduler = FallingNoteScheduler::from_sequence(&pitches, &config);
            let presses: Vec<(f64, u8, u8)> = scheduler
                .notes()
                .iter()
                .filter(|n| n.state().is_judgeable())
                .map(|n| (n.target_time_sec, n.pitch, n.velocity))
                .collect();
            (scheduler, presses)
        }
    };

    if mode == Mode::Preview {
        info!("Previewing at most {} notes..!", args.preview_max);
        for (i, note) in scheduler.notes().iter().take(args.preview_max).enumerate() {
            info!(
                "Note {}: {:>4} ({:3}) target={:.3}s dur={:.3}s vel={} state={:?}",
                i,
                note_name(note.pitch),
                note.pitch,
                note.target_time_sec,
                note.duration_sec,
                note.velocity,
                note.state()
            );
        }
        if scheduler.pending_notes() > 0 {
            info!("{} more notes are streamed in during play..!", scheduler.pending_notes());
        }
        return Ok(());
    }

    let (input_tx, input_rx) = input_channel(INPUT_QUEUE_CAPACITY);
    let player = Player::new(config.frame_interval_ms, args.verbose);
    player.load_session(Session::new(scheduler, LogAudio, input_rx))?;

    let clock = SessionClock::start();
    if args.autoplay {
        info!("Autoplaying {} notes..!", presses.len());
        spawn_autoplay(presses, input_tx, clock, args.autoplay_jitter);
    } else {
        warn!("No input device is attached, notes will be judged as missed unless --autoplay is set..!");
        drop(input_tx);
    }

    let player = Arc::new(player);
    let player_for_handler = Arc::clone(&player);

    ctrlc::set_handler(move || {
        warn!("Ctrl-C received, stopping the session..!");
        let _ = player_for_handler.stop();
    })?;

    let summary = player.play(true, clock)?;

    if let Some(summary) = summary {
        println!(
            "Hit {} of {} notes ({} missed, {} off the keyboard)",
            summary.hit_notes, summary.total_notes, summary.missed_notes, summary.out_of_range_notes
        );
    }
    info!("Session finished, exiting..!");

    Ok(())
}
