use crate::engine::judge::{DEFAULT_TOLERANCE_MS, Grade};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Number of recent timing errors kept for the rolling average.
pub const TIMING_HISTORY: usize = 50;

/// Scoring and statistics fed by hits and misses of a session.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PerformanceMetrics {
    tolerance_ms: u32,
    total_notes: usize,
    hit_notes: usize,
    missed_notes: usize,
    current_streak: usize,
    max_streak: usize,
    score: u64,
    timing_errors: VecDeque<f64>,
    grade_counts: BTreeMap<Grade, usize>,
    last_grade: Option<Grade>,
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE_MS)
    }
}

impl PerformanceMetrics {
    pub fn new(tolerance_ms: u32) -> Self {
        Self {
            tolerance_ms,
            total_notes: 0,
            hit_notes: 0,
            missed_notes: 0,
            current_streak: 0,
            max_streak: 0,
            score: 0,
            timing_errors: VecDeque::with_capacity(TIMING_HISTORY),
            grade_counts: Grade::ALL.iter().map(|g| (*g, 0)).collect(),
            last_grade: None,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.tolerance_ms);
    }

    /// Records a hit and returns its grade.
    pub fn note_hit(&mut self, timing_error_ms: f64) -> Grade {
        let error = timing_error_ms.abs();

        self.total_notes += 1;
        self.hit_notes += 1;
        self.current_streak += 1;
        self.max_streak = self.max_streak.max(self.current_streak);

        if self.timing_errors.len() == TIMING_HISTORY {
            self.timing_errors.pop_front();
        }
        self.timing_errors.push_back(error);

        let grade = Grade::from_error(error, self.tolerance_ms);
        *self.grade_counts.entry(grade).or_insert(0) += 1;
        self.last_grade = Some(grade);

        let streak_multiplier = (1.0 + self.current_streak as f64 / 50.0).min(3.0);
        self.score += (100.0 * grade.timing_multiplier() * streak_multiplier) as u64;

        grade
    }

    pub fn note_missed(&mut self) {
        self.total_notes += 1;
        self.missed_notes += 1;
        self.current_streak = 0;
        *self.grade_counts.entry(Grade::Miss).or_insert(0) += 1;
        self.last_grade = Some(Grade::Miss);
    }

    pub fn score(&self) -> u64 {
        self.score
    }

    pub fn current_streak(&self) -> usize {
        self.current_streak
    }

    pub fn max_streak(&self) -> usize {
        self.max_streak
    }

    pub fn total_notes(&self) -> usize {
        self.total_notes
    }

    pub fn hit_notes(&self) -> usize {
        self.hit_notes
    }

    pub fn missed_notes(&self) -> usize {
        self.missed_notes
    }

    pub fn last_grade(&self) -> Option<Grade> {
        self.last_grade
    }

    pub fn grade_count(&self, grade: Grade) -> usize {
        self.grade_counts.get(&grade).copied().unwrap_or(0)
    }

    pub fn grade_counts(&self) -> &BTreeMap<Grade, usize> {
        &self.grade_counts
    }

    /// Share of judged notes that were hit; 100 before anything is judged.
    pub fn accuracy_percentage(&self) -> f64 {
        if self.total_notes == 0 {
            return 100.0;
        }
        self.hit_notes as f64 / self.total_notes as f64 * 100.0
    }

    /// Mean absolute error over the last `TIMING_HISTORY` hits.
    pub fn average_timing_error_ms(&self) -> f64 {
        if self.timing_errors.is_empty() {
            return 0.0;
        }
        self.timing_errors.iter().sum::<f64>() / self.timing_errors.len() as f64
    }

    pub fn recent_timing_errors(&self) -> impl Iterator<Item = &f64> {
        self.timing_errors.iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-9
    }

    #[test]
    fn scores_by_grade_and_streak() {
        let mut metrics = PerformanceMetrics::new(200);

        // streak 1: 100 * 1.5 * 1.02
        assert_eq!(metrics.note_hit(-10.0), Grade::Perfect);
        assert_eq!(metrics.score(), 153);

        // streak 2: 100 * 0.5 * 1.04
        assert_eq!(metrics.note_hit(150.0), Grade::Ok);
        assert_eq!(metrics.score(), 205);

        metrics.note_missed();
        assert_eq!(metrics.current_streak(), 0);
        assert_eq!(metrics.max_streak(), 2);
        assert_eq!(metrics.grade_count(Grade::Miss), 1);
        assert_eq!(metrics.last_grade(), Some(Grade::Miss));
    }

    #[test]
    fn accuracy_and_average_error() {
        let mut metrics = PerformanceMetrics::default();
        assert!(approx_eq(metrics.accuracy_percentage(), 100.0));
        assert!(approx_eq(metrics.average_timing_error_ms(), 0.0));

        metrics.note_hit(-20.0);
        metrics.note_hit(40.0);
        metrics.note_missed();
        metrics.note_missed();

        assert!(approx_eq(metrics.accuracy_percentage(), 50.0));
        assert!(approx_eq(metrics.average_timing_error_ms(), 30.0));
    }

    #[test]
    fn timing_history_is_bounded() {
        let mut metrics = PerformanceMetrics::default();
        for _ in 0..TIMING_HISTORY {
            metrics.note_hit(100.0);
        }
        for _ in 0..TIMING_HISTORY {
            metrics.note_hit(0.0);
        }

        assert_eq!(metrics.recent_timing_errors().count(), TIMING_HISTORY);
        assert!(approx_eq(metrics.average_timing_error_ms(), 0.0));
    }

    #[test]
    fn streak_multiplier_caps_at_three() {
        let mut metrics = PerformanceMetrics::default();
        for _ in 0..100 {
            metrics.note_hit(50.0);
        }

        let before = metrics.score();
        metrics.note_hit(50.0);
        assert_eq!(metrics.score() - before, 360);
    }

    #[test]
    fn reset_keeps_tolerance() {
        let mut metrics = PerformanceMetrics::new(120);
        metrics.note_hit(110.0);
        metrics.reset();

        assert_eq!(metrics.total_notes(), 0);
        assert_eq!(metrics.score(), 0);
        assert_eq!(metrics.note_hit(119.0), Grade::Good);
        assert_eq!(metrics.note_hit(121.0), Grade::Miss);
    }
}
