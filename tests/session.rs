use keyfall::{
    FallingNoteScheduler, Grade, InputEvent, NoteState, SessionConfig, Session, SilentAudio,
    analysis_report, input_channel, midi_bytes_to_song,
};
use midly::num::{u4, u7, u15, u24, u28};
use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind,
};

fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9
}

fn meta(delta: u32, message: MetaMessage<'static>) -> TrackEvent<'static> {
    TrackEvent {
        delta: u28::new(delta),
        kind: TrackEventKind::Meta(message),
    }
}

fn note(delta: u32, key: u8, vel: u8) -> TrackEvent<'static> {
    TrackEvent {
        delta: u28::new(delta),
        kind: TrackEventKind::Midi {
            channel: u4::new(0),
            message: MidiMessage::NoteOn {
                key: u7::new(key),
                vel: u7::new(vel),
            },
        },
    }
}

/// Quarter notes C4 E4 G4 at 120 BPM, then a C5 held to the end of the track.
fn arpeggio_bytes() -> Vec<u8> {
    let mut smf = Smf::new(Header::new(Format::Parallel, Timing::Metrical(u15::new(480))));
    smf.tracks.push(vec![
        meta(0, MetaMessage::TrackName(b"Tempo")),
        meta(0, MetaMessage::Tempo(u24::new(500_000))),
        meta(0, MetaMessage::EndOfTrack),
    ]);
    smf.tracks.push(vec![
        meta(0, MetaMessage::TrackName(b"Right Hand")),
        note(0, 60, 100),
        note(480, 60, 0),
        note(0, 64, 90),
        note(480, 64, 0),
        note(0, 67, 80),
        note(480, 67, 0),
        note(0, 72, 70),
        meta(480, MetaMessage::EndOfTrack),
    ]);

    let mut bytes = Vec::new();
    smf.write(&mut bytes).unwrap();
    bytes
}

fn press(pitch: u8, timestamp_ms: f64) -> InputEvent {
    InputEvent {
        pitch,
        velocity: 100,
        timestamp_ms,
    }
}

#[test]
fn decode_schedule_and_judge() {
    env_logger::try_init().unwrap_or(());

    let song = midi_bytes_to_song(&arpeggio_bytes(), Some("arpeggio.mid".to_owned())).unwrap();
    assert_eq!(song.timeline.len(), 4);
    assert_eq!(song.analysis.anomalies.force_closed_notes, 1);
    assert!(approx_eq(song.analysis.total_duration_sec, 2.0));

    let report = analysis_report(&song);
    assert!(report.contains("Tracks: Tempo, Right Hand"));

    let config = SessionConfig {
        lead_time_sec: 1.0,
        fade_sec: 5.0,
        ..SessionConfig::default()
    };
    let scheduler = FallingNoteScheduler::from_timeline(song.timeline, &config);
    let (tx, rx) = input_channel(16);
    let mut session = Session::new(scheduler, SilentAudio, rx);

    // C4 due at 1.0s, E4 at 1.5s, G4 at 2.0s, C5 at 2.5s
    tx.send(press(60, 1010.0)).unwrap();
    tx.send(press(64, 1560.0)).unwrap();
    tx.send(press(62, 2000.0)).unwrap();
    tx.send(press(72, 2600.0)).unwrap();

    let report = session.frame(1.6);
    assert_eq!(report.inputs, 4);
    assert_eq!(report.hits.len(), 3);
    assert_eq!(report.hits[0].grade, Grade::Perfect);
    assert_eq!(report.hits[1].grade, Grade::Great);
    assert_eq!(report.hits[2].grade, Grade::Good);

    let states: Vec<NoteState> = session.scheduler().notes().iter().map(|n| n.state()).collect();
    assert_eq!(
        states,
        vec![NoteState::Hit, NoteState::Hit, NoteState::Upcoming, NoteState::Hit]
    );

    session.frame(2.21);
    let summary = session.summary();
    assert_eq!(summary.total_notes, 4);
    assert_eq!(summary.hit_notes, 3);
    assert_eq!(summary.missed_notes, 1);
    assert!(summary.is_complete());

    let metrics = session.metrics();
    assert_eq!(metrics.max_streak(), 3);
    assert_eq!(metrics.current_streak(), 0);
    assert!(approx_eq(metrics.accuracy_percentage(), 75.0));
}

#[test]
fn streaming_session_reaches_the_same_result() {
    env_logger::try_init().unwrap_or(());

    let song = midi_bytes_to_song(&arpeggio_bytes(), None).unwrap();
    let config = SessionConfig {
        lead_time_sec: 1.0,
        stream_window_sec: Some(0.5),
        ..SessionConfig::default()
    };
    let scheduler = FallingNoteScheduler::from_timeline(song.timeline, &config);
    assert_eq!(scheduler.notes().len(), 0);
    assert_eq!(scheduler.pending_notes(), 4);

    let (tx, rx) = input_channel(16);
    let mut session = Session::new(scheduler, SilentAudio, rx);

    let mut frame = 0;
    let mut hits = 0;
    while !session.is_complete() && frame < 400 {
        let now = frame as f64 * 0.01;
        let target = session
            .scheduler()
            .notes()
            .iter()
            .find(|n| n.state() == NoteState::Active && n.target_time_sec <= now)
            .map(|n| n.pitch);

        if let Some(pitch) = target {
            tx.send(press(pitch, now * 1000.0)).unwrap();
        }

        hits += session.frame(now).hits.len();
        assert!(session.scheduler().notes().len() <= 3);
        frame += 1;
    }

    assert_eq!(hits, 4);
    let summary = session.summary();
    assert_eq!(summary.hit_notes, 4);
    assert_eq!(summary.missed_notes, 0);
}
