use log::debug;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MPQN: u32 = 500_000;
pub const DEFAULT_TICKS_PER_BEAT: u16 = 480;

/// Converts a tick span to seconds at a fixed tempo.
pub fn ticks_to_seconds(delta_ticks: u64, ticks_per_beat: u16, microseconds_per_beat: u32) -> f64 {
    (delta_ticks as f64) * (microseconds_per_beat as f64)
        / ((ticks_per_beat as f64) * 1_000_000.0)
}

/// Tempo breakpoints for one track (or a whole file), in tick order.
///
/// Lookups return the tempo of the latest breakpoint at or before a tick, or
/// the initial tempo when the tick precedes every breakpoint.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TempoMap {
    initial: u32,
    breakpoints: Vec<(u64, u32)>,
}

impl Default for TempoMap {
    fn default() -> Self {
        Self::new(DEFAULT_MPQN)
    }
}

impl TempoMap {
    pub fn new(initial: u32) -> Self {
        Self {
            initial,
            breakpoints: Vec::new(),
        }
    }

    /// Builds a map from unordered `(tick, microseconds_per_beat)` pairs.
    /// Changes sharing a tick keep their given order, so the last one wins.
    pub fn from_changes<I>(initial: u32, changes: I) -> Self
    where
        I: IntoIterator<Item = (u64, u32)>,
    {
        let mut breakpoints: Vec<(u64, u32)> = changes.into_iter().collect();
        breakpoints.sort_by_key(|(tick, _)| *tick);

        Self {
            initial,
            breakpoints,
        }
    }

    /// Records a `set_tempo` seen while walking a track in tick order.
    pub fn push(&mut self, tick: u64, microseconds_per_beat: u32) {
        if let Some(&(last_tick, _)) = self.breakpoints.last()
            && tick < last_tick
        {
            debug!(
                "Out of order tempo change at tick {} (last {}), re-sorting..!",
                tick, last_tick
            );
            self.breakpoints.push((tick, microseconds_per_beat));
            self.breakpoints.sort_by_key(|(t, _)| *t);
            return;
        }

        self.breakpoints.push((tick, microseconds_per_beat));
    }

    pub fn tempo_at(&self, tick: u64) -> u32 {
        let idx = self.breakpoints.partition_point(|(t, _)| *t <= tick);
        if idx == 0 {
            self.initial
        } else {
            self.breakpoints[idx - 1].1
        }
    }

    /// Tempo after every recorded change has been applied.
    pub fn current(&self) -> u32 {
        self.breakpoints
            .last()
            .map(|(_, mpqn)| *mpqn)
            .unwrap_or(self.initial)
    }

    pub fn initial(&self) -> u32 {
        self.initial
    }

    pub fn breakpoints(&self) -> &[(u64, u32)] {
        &self.breakpoints
    }

    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }
}
