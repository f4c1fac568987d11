use std::collections::VecDeque;

use crate::config::EstimatorConfig;
use crate::events::SignalState;

/// How an estimator observation changed the estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum EstimateRule {
    /// Replaced outright; the observation disagreed by more than the snap ratio
    Snap,
    /// Exponential blend toward the single observation
    Blend,
    /// Blend toward the median of the shortest half of recent dots
    ShortHalfMedian,
    /// Blend toward a third of a dash duration
    DashCorroboration,
}

/// Adaptive dot-unit estimate in samples.
///
/// Early on (fewer than `fast_phase_len` dots seen) single observations move
/// the estimate quickly; a new speed snaps it outright. Afterwards it
/// tracks the median of the shortest half of the recent dots, which keeps
/// stretched dots and misread dashes from dragging it upward.
#[derive(Debug, Clone)]
pub struct UnitEstimator {
    config: EstimatorConfig,
    unit: f64,
    recent_dots: VecDeque<f64>,
}

impl UnitEstimator {
    pub fn new(initial_unit: f64, config: EstimatorConfig) -> Self {
        Self {
            recent_dots: VecDeque::with_capacity(config.window_len),
            config,
            unit: initial_unit,
        }
    }

    pub fn unit(&self) -> f64 {
        self.unit
    }

    pub fn dots_observed(&self) -> usize {
        self.recent_dots.len()
    }

    pub fn observe_dot(&mut self, duration: f64) -> EstimateRule {
        self.recent_dots.push_back(duration);
        while self.recent_dots.len() > self.config.window_len.max(1) {
            self.recent_dots.pop_front();
        }

        if self.recent_dots.len() < self.config.fast_phase_len {
            return self.fast_update(duration, EstimateRule::Blend);
        }

        let median = shortest_half_median(&self.recent_dots);
        let w = self.config.median_weight;
        self.unit = self.unit * (1.0 - w) + median * w;
        EstimateRule::ShortHalfMedian
    }

    /// A dash is evidence for a unit of a third of its length
    pub fn observe_dash(&mut self, duration: f64) -> EstimateRule {
        self.fast_update(duration / 3.0, EstimateRule::DashCorroboration)
    }

    fn fast_update(&mut self, evidence: f64, blended: EstimateRule) -> EstimateRule {
        if (evidence - self.unit).abs() > self.unit * self.config.snap_ratio {
            self.unit = evidence;
            return EstimateRule::Snap;
        }
        let w = self.config.fast_weight;
        self.unit = self.unit * (1.0 - w) + evidence * w;
        blended
    }
}

/// Median of the shorter half of `values` (lower middle element of the
/// first `len / 2 + 1` sorted values)
fn shortest_half_median(values: &VecDeque<f64>) -> f64 {
    let mut sorted: Vec<f64> = values.iter().copied().collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let half = &sorted[..sorted.len() / 2 + 1];
    half[half.len() / 2]
}

/// A committed run of tone or silence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run {
    pub state: SignalState,
    pub duration: u64,
}

/// Timing read off a batch of runs before any of them was classified
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scale {
    /// Median of the shortest duration cluster: dots and intra-character gaps
    pub unit: Option<f64>,
    /// Median of the shortest cluster among silences long enough to end a character
    pub char_gap: Option<f64>,
}

impl Scale {
    /// Clusters are separated where a sorted duration is at least
    /// `split_ratio` times its predecessor. The unit cluster needs two
    /// members; the character gap needs a longer (word) gap above it.
    pub fn measure(runs: &[Run], split_ratio: f64, char_gap_units: u32) -> Self {
        let durations: Vec<u64> = runs.iter().map(|run| run.duration).collect();
        let unit = shortest_cluster(&durations, split_ratio, 2);
        let char_gap = unit.and_then(|unit| {
            let min_gap = (char_gap_units as f64 - 0.5) * unit;
            let gaps: Vec<u64> = runs
                .iter()
                .filter(|run| run.state == SignalState::Silence && run.duration as f64 >= min_gap)
                .map(|run| run.duration)
                .collect();
            shortest_cluster(&gaps, split_ratio, 1)
        });
        Self { unit, char_gap }
    }
}

/// Median of the values below the first step of at least `ratio` in the
/// sorted (non-zero) durations, if that cluster has `min_members` or more
fn shortest_cluster(durations: &[u64], ratio: f64, min_members: usize) -> Option<f64> {
    let mut sorted: Vec<u64> = durations.iter().copied().filter(|&d| d > 0).collect();
    sorted.sort_unstable();
    let split = sorted
        .windows(2)
        .enumerate()
        .skip(min_members.saturating_sub(1))
        .find(|(_, pair)| pair[1] as f64 >= ratio * pair[0] as f64)
        .map(|(i, _)| i + 1)?;
    let cluster = &sorted[..split];
    Some(cluster[cluster.len() / 2] as f64)
}

/// Running estimate of the silence that separates characters.
///
/// Unset until the first character gap is seen, then blended like the fast
/// phase of [`UnitEstimator`].
#[derive(Debug, Clone)]
pub struct GapEstimator {
    weight: f64,
    gap: Option<f64>,
}

impl GapEstimator {
    pub fn new(weight: f64) -> Self {
        Self { weight, gap: None }
    }

    pub fn gap(&self) -> Option<f64> {
        self.gap
    }

    pub fn observe(&mut self, duration: f64) {
        self.gap = Some(match self.gap {
            None => duration,
            Some(gap) => gap * (1.0 - self.weight) + duration * self.weight,
        });
    }

    pub fn forget(&mut self) {
        self.gap = None;
    }
}
