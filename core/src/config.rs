use crate::error::{MorseError, Result};
use crate::{BLOCK_DURATION_MS, CANDIDATE_FREQUENCIES, DEFAULT_SAMPLE_RATE, DEFAULT_WPM};

/// What dash durations contribute to the unit estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DashEvidence {
    /// Only dots update the estimate
    Ignore,
    /// A dash also counts as evidence for a unit of a third of its length
    Corroborate,
}

/// Tuning of the adaptive dot-unit estimator
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EstimatorConfig {
    /// Recent dot durations kept for the median
    pub window_len: usize,
    /// Below this many dots, single observations blend or snap directly
    pub fast_phase_len: usize,
    /// Relative disagreement above which a fast-phase observation replaces the estimate
    pub snap_ratio: f64,
    /// Weight of a new observation in the fast phase
    pub fast_weight: f64,
    /// Weight of the shortest-half median once the fast phase is over
    pub median_weight: f64,
    pub dash_evidence: DashEvidence,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            window_len: 10,
            fast_phase_len: 5,
            snap_ratio: 0.5,
            fast_weight: 0.3,
            median_weight: 0.7,
            dash_evidence: DashEvidence::Corroborate,
        }
    }
}

/// Decoder tuning. Every heuristic constant lives here.
///
/// Durations are given in milliseconds so one config serves any sample
/// rate; the block length defaults to 10 ms, which puts the 600/700/800 Hz
/// candidates on separate, orthogonal detector bins.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DecoderConfig {
    pub sample_rate: u32,
    /// Samples per analysis block; `None` means 10 ms worth
    pub block_len: Option<usize>,
    pub candidate_frequencies: Vec<f32>,

    /// Tone starts above `noise median * threshold_on_factor + epsilon`
    pub threshold_on_factor: f64,
    /// Tone holds while above `noise median * threshold_off_factor + epsilon`
    pub threshold_off_factor: f64,
    pub threshold_epsilon: f64,
    pub noise_history_len: usize,
    /// Minimum share of block energy in the detected bin for a block to count
    /// as tone. For a clean carrier this share is the fraction of the block
    /// the tone covers, so 0.5 rounds partly keyed blocks to the nearer state.
    pub min_tone_purity: f64,

    /// Consecutive winning tone blocks before the carrier is locked
    pub lock_confirm_blocks: usize,

    /// Speed assumed until the dot length has been measured
    pub initial_wpm: u32,
    /// Runs held back while looking for the dot length and character gap;
    /// 0 starts decoding at `initial_wpm` straight away
    pub calibration_max_runs: usize,
    /// Step between sorted durations that separates one timing class from the next
    pub calibration_split_ratio: f64,
    /// Without a measured dot length, the first tone of the session counts as a
    /// dash once it exceeds this many units
    pub first_tone_dash_ratio: Option<f64>,
    /// State flips that revert within this time are discarded
    pub denoise_ms: f64,
    /// Subtract half a block from durations longer than one block
    pub latency_compensation: bool,

    /// Tones of at least this many units are dashes
    pub dash_units: u32,
    /// Silences of at least this many units end a character
    pub char_gap_units: u32,
    /// Silences of at least this many units may end a word
    pub word_gap_units: u32,
    /// A word break also needs the gap to reach this multiple of the learned character gap
    pub word_gap_ratio: f64,
    /// Character gap assumed, in units, before one has been measured
    pub initial_char_gap_units: f64,
    /// Blend weight of new character gap observations
    pub char_gap_weight: f64,
    /// Blend weight of intra-character gaps in the silence unit
    pub silence_unit_weight: f64,

    pub estimator: EstimatorConfig,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            block_len: None,
            candidate_frequencies: CANDIDATE_FREQUENCIES.to_vec(),
            threshold_on_factor: 6.0,
            threshold_off_factor: 3.0,
            threshold_epsilon: 1e-9,
            noise_history_len: 50,
            min_tone_purity: 0.5,
            lock_confirm_blocks: 3,
            initial_wpm: DEFAULT_WPM,
            calibration_max_runs: 48,
            calibration_split_ratio: 2.0,
            first_tone_dash_ratio: Some(1.1),
            denoise_ms: 12.0,
            latency_compensation: false,
            dash_units: 2,
            char_gap_units: 3,
            word_gap_units: 7,
            word_gap_ratio: 2.0,
            initial_char_gap_units: 4.0,
            char_gap_weight: 0.3,
            silence_unit_weight: 0.3,
            estimator: EstimatorConfig::default(),
        }
    }
}

impl DecoderConfig {
    /// Defaults for a given input sample rate
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            ..Self::default()
        }
    }

    pub fn with_candidate_frequencies(mut self, frequencies: &[f32]) -> Self {
        self.candidate_frequencies = frequencies.to_vec();
        self
    }

    pub fn with_initial_wpm(mut self, wpm: u32) -> Self {
        self.initial_wpm = wpm;
        self
    }

    /// Skip calibration and decode from the first tone at `initial_wpm`
    pub fn without_calibration(mut self) -> Self {
        self.calibration_max_runs = 0;
        self
    }

    pub fn with_block_len(mut self, block_len: usize) -> Self {
        self.block_len = Some(block_len);
        self
    }

    pub fn block_len(&self) -> usize {
        self.block_len
            .unwrap_or_else(|| self.ms_to_samples(BLOCK_DURATION_MS as f64).round() as usize)
    }

    /// Seed dot unit in samples
    pub fn initial_unit_samples(&self) -> f64 {
        self.ms_to_samples(crate::timing::dit_duration_ms(self.initial_wpm.max(1)))
    }

    pub fn denoise_samples(&self) -> u64 {
        self.ms_to_samples(self.denoise_ms).round() as u64
    }

    fn ms_to_samples(&self, ms: f64) -> f64 {
        self.sample_rate as f64 * ms / 1000.0
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| -> Result<()> { Err(MorseError::InvalidConfig(msg)) };

        if self.sample_rate == 0 {
            return invalid("sample rate must be non-zero".to_string());
        }
        if self.block_len() == 0 {
            return invalid("block length must be at least one sample".to_string());
        }
        if self.candidate_frequencies.is_empty() {
            return invalid("at least one candidate frequency is required".to_string());
        }
        let nyquist = self.sample_rate as f32 / 2.0;
        if let Some(f) = self
            .candidate_frequencies
            .iter()
            .find(|&&f| !(f > 0.0 && f < nyquist))
        {
            return invalid(format!("candidate frequency {f} Hz outside (0, {nyquist}) Hz"));
        }
        if !(self.threshold_off_factor > 0.0 && self.threshold_on_factor >= self.threshold_off_factor)
        {
            return invalid(format!(
                "threshold factors must satisfy 0 < off ({}) <= on ({})",
                self.threshold_off_factor, self.threshold_on_factor
            ));
        }
        if !(self.threshold_epsilon > 0.0) {
            return invalid("threshold epsilon must be positive".to_string());
        }
        if self.noise_history_len == 0 {
            return invalid("noise history must hold at least one block".to_string());
        }
        if !(0.0..=1.0).contains(&self.min_tone_purity) {
            return invalid("tone purity must lie in [0, 1]".to_string());
        }
        if self.lock_confirm_blocks == 0 {
            return invalid("frequency lock needs at least one confirming block".to_string());
        }
        if self.initial_wpm < 1 {
            return invalid("initial wpm must be at least 1".to_string());
        }
        if !(self.calibration_split_ratio > 1.0) {
            return invalid("calibration split ratio must exceed 1".to_string());
        }
        if self.first_tone_dash_ratio.is_some_and(|ratio| !(ratio > 0.0)) {
            return invalid("first tone dash ratio must be positive".to_string());
        }
        if !(self.denoise_ms >= 0.0) {
            return invalid("denoise time must be non-negative".to_string());
        }
        if self.dash_units < 1 || self.char_gap_units < 1 || self.word_gap_units < self.char_gap_units
        {
            return invalid("unit thresholds must satisfy 1 <= char gap <= word gap".to_string());
        }
        if !(self.word_gap_ratio >= 1.0 && self.initial_char_gap_units > 0.0) {
            return invalid("word gap ratio must be >= 1 and the char gap seed positive".to_string());
        }
        for (name, weight) in [("char gap", self.char_gap_weight), ("silence unit", self.silence_unit_weight)] {
            if !(weight > 0.0 && weight <= 1.0) {
                return invalid(format!("{name} weight must lie in (0, 1]"));
            }
        }

        let est = &self.estimator;
        if est.window_len == 0 || est.fast_phase_len > est.window_len {
            return invalid("estimator window must hold the fast phase".to_string());
        }
        if !(est.snap_ratio > 0.0) {
            return invalid("snap ratio must be positive".to_string());
        }
        for (name, weight) in [("fast", est.fast_weight), ("median", est.median_weight)] {
            if !(weight > 0.0 && weight <= 1.0) {
                return invalid(format!("{name} weight must lie in (0, 1]"));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = DecoderConfig::default();
        config.validate().unwrap();
        assert_eq!(config.block_len(), 160);
        assert_eq!(config.initial_unit_samples(), 960.0);
        assert_eq!(config.denoise_samples(), 192);
        assert_eq!(config.estimator.dash_evidence, DashEvidence::Corroborate);
        assert_eq!(config.clone().without_calibration().calibration_max_runs, 0);
    }

    #[test]
    fn test_block_len_follows_sample_rate() {
        assert_eq!(DecoderConfig::new(8000).block_len(), 80);
        assert_eq!(DecoderConfig::new(44100).block_len(), 441);
        assert_eq!(DecoderConfig::new(8000).with_block_len(256).block_len(), 256);
    }

    #[test]
    fn test_rejects_degenerate_values() {
        let cases = [
            DecoderConfig::new(0),
            DecoderConfig::default().with_initial_wpm(0),
            DecoderConfig::default().with_candidate_frequencies(&[]),
            DecoderConfig::new(8000).with_candidate_frequencies(&[700.0, 4000.0]),
            DecoderConfig::default().with_block_len(0),
            DecoderConfig {
                threshold_off_factor: 8.0,
                ..DecoderConfig::default()
            },
            DecoderConfig {
                calibration_split_ratio: 1.0,
                ..DecoderConfig::default()
            },
            DecoderConfig {
                first_tone_dash_ratio: Some(0.0),
                ..DecoderConfig::default()
            },
            DecoderConfig {
                silence_unit_weight: 0.0,
                ..DecoderConfig::default()
            },
            DecoderConfig {
                estimator: EstimatorConfig {
                    fast_phase_len: 20,
                    ..EstimatorConfig::default()
                },
                ..DecoderConfig::default()
            },
        ];
        for config in cases {
            assert!(config.validate().is_err(), "accepted {config:?}");
        }
    }
}
