use crate::engine::metrics::PerformanceMetrics;
use crate::engine::scheduler::{FallingNoteScheduler, HitOutcome, SessionSummary};
use crate::engine::{AudioSink, InputEvent};
use crate::theory::note_name;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{Receiver, TryRecvError};

/// Everything one frame did.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    pub time_sec: f64,
    pub inputs: usize,
    pub hits: Vec<HitOutcome>,
    pub newly_missed: usize,
}

/// Single-owner game state: the scheduler, the metrics and the audio sink, fed
/// from an input queue that is drained once per frame.
pub struct Session<A: AudioSink> {
    scheduler: FallingNoteScheduler,
    metrics: PerformanceMetrics,
    audio: A,
    input: Receiver<InputEvent>,
    input_closed: bool,
}

impl<A: AudioSink> Session<A> {
    pub fn new(scheduler: FallingNoteScheduler, audio: A, input: Receiver<InputEvent>) -> Self {
        let metrics = PerformanceMetrics::new(scheduler.hit_window().tolerance_ms);
        Self {
            scheduler,
            metrics,
            audio,
            input,
            input_closed: false,
        }
    }

    /// Runs one frame: every queued press is played and judged in arrival
    /// order, then the scheduler advances to `current_time_sec` once.
    pub fn frame(&mut self, current_time_sec: f64) -> FrameReport {
        let mut report = FrameReport {
            time_sec: current_time_sec,
            ..FrameReport::default()
        };

        loop {
            match self.input.try_recv() {
                Ok(event) => {
                    report.inputs += 1;
                    self.audio.note_on(event.pitch, event.velocity);

                    if let Some(hit) = self.scheduler.check_hit(event.pitch, event.timestamp_ms) {
                        self.metrics.note_hit(hit.timing_error_ms);
                        report.hits.push(hit);
                    } else {
                        debug!(
                            "Press of {} at {:.1}ms matched no note..!",
                            note_name(event.pitch),
                            event.timestamp_ms
                        );
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.input_closed {
                        info!("Input source disconnected..!");
                        self.input_closed = true;
                    }
                    break;
                }
            }
        }

        let outcome = self.scheduler.update(current_time_sec);
        for _ in 0..outcome.newly_missed {
            self.metrics.note_missed();
        }
        report.newly_missed = outcome.newly_missed;

        report
    }

    pub fn scheduler(&self) -> &FallingNoteScheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut FallingNoteScheduler {
        &mut self.scheduler
    }

    pub fn metrics(&self) -> &PerformanceMetrics {
        &self.metrics
    }

    pub fn summary(&self) -> SessionSummary {
        self.scheduler.summary()
    }

    pub fn is_complete(&self) -> bool {
        self.summary().is_complete()
    }

    pub fn input_closed(&self) -> bool {
        self.input_closed
    }

    /// Discards every note and all statistics.
    pub fn reset(&mut self) {
        self.scheduler.clear();
        self.metrics.reset();
        while self.input.try_recv().is_ok() {}
    }
}
