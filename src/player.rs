use crate::engine::scheduler::SessionSummary;
use crate::engine::session::Session;
use crate::engine::{AudioSink, InputEvent};
use crate::theory::note_name;
use anyhow::{anyhow, bail};
use log::{debug, info, warn};
use spin_sleep::{SpinSleeper, SpinStrategy};
use std::sync::mpsc::{self, Sender, SyncSender};
use std::sync::Mutex;
use std::thread;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

enum ControlMsg {
    Stop,
}

/// Monotonic session time shared by the frame loop and input producers.
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    start: Instant,
}

impl SessionClock {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_sec(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed_sec() * 1000.0
    }

    pub fn instant_at(&self, time_sec: f64) -> Instant {
        self.start + Duration::from_secs_f64(time_sec.max(0.0))
    }
}

/// Drives a `Session` on a worker thread at a fixed frame interval.
pub struct Player<A: AudioSink> {
    frame_interval: Duration,
    verbose: bool,
    session: Mutex<Option<Session<A>>>,
    control_tx: Mutex<Option<Sender<ControlMsg>>>,
    worker_handle: Mutex<Option<JoinHandle<SessionSummary>>>,
}

impl<A: AudioSink + 'static> Player<A> {
    pub fn new(frame_interval_ms: u64, verbose: bool) -> Self {
        Self {
            frame_interval: Duration::from_millis(frame_interval_ms.max(1)),
            verbose,
            session: Mutex::new(None),
            control_tx: Mutex::new(None),
            worker_handle: Mutex::new(None),
        }
    }

    pub fn load_session(&self, session: Session<A>) -> anyhow::Result<()> {
        let summary = session.summary();

        let Ok(mut lock) = self.session.lock() else {
            bail!("Failed to lock the session..!");
        };
        *lock = Some(session);

        info!(
            "Loaded session with {} notes ({} off the keyboard)..!",
            summary.total_notes, summary.out_of_range_notes
        );

        Ok(())
    }

    /// Starts the frame loop. With `join` the call blocks until the session is
    /// complete or stopped and returns its summary.
    pub fn play(&self, join: bool, clock: SessionClock) -> anyhow::Result<Option<SessionSummary>> {
        {
            let Ok(guard) = self.worker_handle.lock() else {
                bail!("Failed to lock worker handle..!")
            };

            if guard.is_some() {
                bail!("Playback already running..!")
            }
        }

        let session = {
            let Ok(mut lock) = self.session.lock() else {
                bail!("Failed to lock the session..!")
            };
            lock.take()
        };

        let Some(mut session) = session else {
            bail!("No session loaded..!")
        };

        let (tx, rx) = mpsc::channel::<ControlMsg>();

        {
            let Ok(mut ctl) = self.control_tx.lock() else {
                bail!("Failed to lock control_tx..!")
            };

            *ctl = Some(tx);
        }

        let frame_interval = self.frame_interval;
        let verbose = self.verbose;
        let handle = thread::spawn(move || {
            let ctrl_rx = rx;
            let sleeper = SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread);
            let mut frames: u64 = 0;

            info!("Starting session, frame interval {:?}..!", frame_interval);

            loop {
                if let Ok(ControlMsg::Stop) = ctrl_rx.try_recv() {
                    warn!(
                        "Session stopped via control message after {:.1} seconds..!",
                        clock.elapsed_sec()
                    );
                    break;
                }

                let report = session.frame(clock.elapsed_sec());
                frames += 1;

                if verbose {
                    for hit in report.hits.iter() {
                        info!(
                            "{:8} {:5} | error: {:>+8.1}ms | accuracy: {:>5.1}% | at {:>9.3}s",
                            hit.grade.label(),
                            note_name(hit.pitch),
                            hit.timing_error_ms,
                            hit.accuracy,
                            report.time_sec
                        );
                    }
                    if report.newly_missed > 0 {
                        info!(
                            "{:8} x{} at {:>9.3}s",
                            "Miss",
                            report.newly_missed,
                            report.time_sec
                        );
                    }
                }

                if session.is_complete() {
                    info!("Every note resolved after {} frames..!", frames);
                    break;
                }

                sleeper.sleep(frame_interval);
            }

            let metrics = session.metrics();
            info!(
                "Score: {} | accuracy: {:.1}% | max streak: {} | avg error: {:.1}ms",
                metrics.score(),
                metrics.accuracy_percentage(),
                metrics.max_streak(),
                metrics.average_timing_error_ms()
            );

            session.summary()
        });

        if join {
            let summary = handle
                .join()
                .map_err(|_| anyhow!("Session thread panicked..!"))?;

            if let Ok(mut ctl) = self.control_tx.lock() {
                ctl.take();
            }

            Ok(Some(summary))
        } else {
            let Ok(mut wh) = self.worker_handle.lock() else {
                bail!("Failed to lock worker handle..!")
            };

            *wh = Some(handle);
            Ok(None)
        }
    }

    pub fn stop(&self) -> anyhow::Result<Option<SessionSummary>> {
        let tx = {
            let Ok(mut lock) = self.control_tx.lock() else {
                bail!("Failed to lock control_tx..!")
            };
            lock.take()
        };

        if let Some(tx) = tx {
            let _ = tx.send(ControlMsg::Stop);
        } else {
            bail!("No worker is running a session..!")
        }

        let Ok(mut lock) = self.worker_handle.lock() else {
            bail!("Failed to lock worker_handle..!")
        };

        if let Some(handle) = lock.take() {
            let summary = handle
                .join()
                .map_err(|_| anyhow!("Session thread panicked..!"))?;
            debug!("Session thread joined..!");
            info!("Stopped session thread..!");
            return Ok(Some(summary));
        }

        Ok(None)
    }
}

/// Feeds `notes` into the input queue at their target times, offset by a
/// repeating pattern scaled to `jitter_ms`. Returns the number of presses sent.
pub fn spawn_autoplay(
    notes: Vec<(f64, u8, u8)>,
    input: SyncSender<InputEvent>,
    clock: SessionClock,
    jitter_ms: f64,
) -> JoinHandle<usize> {
    const JITTER_PATTERN: [f64; 5] = [0.0, 1.0, -1.0, 0.5, -0.5];

    thread::spawn(move || {
        let sleeper = SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread);
        let mut sent = 0;

        for (i, (target_sec, pitch, velocity)) in notes.into_iter().enumerate() {
            let offset_ms = JITTER_PATTERN[i % JITTER_PATTERN.len()] * jitter_ms;
            let due = clock.instant_at(target_sec + offset_ms / 1000.0);

            let now = Instant::now();
            if due > now {
                sleeper.sleep(due - now);
            }

            let event = InputEvent {
                pitch,
                velocity,
                timestamp_ms: clock.elapsed_ms(),
            };

            if input.send(event).is_err() {
                debug!("Input queue closed, autoplay finished early..!");
                break;
            }
            sent += 1;
        }

        debug!("Autoplay sent {} presses..!", sent);
        sent
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::scheduler::FallingNoteScheduler;
    use crate::engine::{SilentAudio, input_channel};
    use crate::model::config::SessionConfig;

    fn quick_config() -> SessionConfig {
        SessionConfig {
            lead_time_sec: 0.2,
            fade_sec: 0.05,
            frame_interval_ms: 2,
            ..SessionConfig::default()
        }
    }

    #[test]
    fn autoplay_hits_a_scale() {
        env_logger::try_init().unwrap_or(());

        let config = quick_config();
        let scheduler = FallingNoteScheduler::from_sequence(&[60, 62, 64], &config);
        let presses: Vec<(f64, u8, u8)> = scheduler
            .notes()
            .iter()
            .map(|n| (n.target_time_sec, n.pitch, n.velocity))
            .collect();

        let (tx, rx) = input_channel(16);
        let player = Player::new(config.frame_interval_ms, true);
        player
            .load_session(Session::new(scheduler, SilentAudio, rx))
            .unwrap();

        let clock = SessionClock::start();
        let producer = spawn_autoplay(presses, tx, clock, 20.0);
        let summary = player.play(true, clock).unwrap().unwrap();

        assert_eq!(producer.join().unwrap(), 3);
        assert_eq!(summary.total_notes, 3);
        assert_eq!(summary.hit_notes, 3);
        assert_eq!(summary.missed_notes, 0);
    }

    #[test]
    fn stop_ends_a_running_session() {
        env_logger::try_init().unwrap_or(());

        let config = SessionConfig {
            lead_time_sec: 30.0,
            ..quick_config()
        };
        let scheduler = FallingNoteScheduler::from_sequence(&[60], &config);
        let (_tx, rx) = input_channel(4);

        let player = Player::new(config.frame_interval_ms, false);
        player
            .load_session(Session::new(scheduler, SilentAudio, rx))
            .unwrap();

        assert!(player.play(false, SessionClock::start()).unwrap().is_none());
        assert!(player.play(false, SessionClock::start()).is_err());

        let summary = player.stop().unwrap().unwrap();
        assert_eq!(summary.total_notes, 1);
        assert_eq!(summary.hit_notes, 0);
        assert!(player.stop().is_err());
    }

    #[test]
    fn play_without_session_fails() {
        let player: Player<SilentAudio> = Player::new(16, false);
        assert!(player.play(true, SessionClock::start()).is_err());
    }
}
