use crate::error::{MorseError, Result};
use crate::{DEFAULT_SAMPLE_RATE, DEFAULT_TONE_HZ, DEFAULT_WPM, MIN_WPM, PARIS_DIT_MS};

/// Dot duration in milliseconds for a PARIS-standard speed
pub fn dit_duration_ms(wpm: u32) -> f64 {
    PARIS_DIT_MS / wpm as f64
}

/// Sender timing: character speed, Farnsworth spacing speed, carrier and rate.
///
/// Symbols inside a character are keyed at `wpm`; the gaps between
/// characters and words are stretched to `farnsworth_wpm`. Setting both to
/// the same value gives standard timing.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimingParameters {
    wpm: u32,
    farnsworth_wpm: u32,
    tone_hz: f32,
    sample_rate: u32,
}

impl TimingParameters {
    pub fn new(wpm: u32, farnsworth_wpm: u32, tone_hz: f32, sample_rate: u32) -> Result<Self> {
        if wpm < MIN_WPM {
            return Err(MorseError::InvalidConfig(format!(
                "wpm must be at least {MIN_WPM}, got {wpm}"
            )));
        }
        if farnsworth_wpm < 1 {
            return Err(MorseError::InvalidConfig(
                "farnsworth wpm must be at least 1".to_string(),
            ));
        }
        if sample_rate == 0 {
            return Err(MorseError::InvalidConfig(
                "sample rate must be non-zero".to_string(),
            ));
        }
        let nyquist = sample_rate as f32 / 2.0;
        if !(tone_hz > 0.0 && tone_hz < nyquist) {
            return Err(MorseError::InvalidConfig(format!(
                "tone frequency {tone_hz} Hz must lie in (0, {nyquist}) Hz"
            )));
        }

        Ok(Self {
            wpm,
            farnsworth_wpm,
            tone_hz,
            sample_rate,
        })
    }

    /// Standard timing: spacing keyed at the character speed
    pub fn standard(wpm: u32, tone_hz: f32, sample_rate: u32) -> Result<Self> {
        Self::new(wpm, wpm, tone_hz, sample_rate)
    }

    pub fn wpm(&self) -> u32 {
        self.wpm
    }

    pub fn farnsworth_wpm(&self) -> u32 {
        self.farnsworth_wpm
    }

    pub fn tone_hz(&self) -> f32 {
        self.tone_hz
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn samples_for_ms(&self, ms: f64) -> usize {
        (self.sample_rate as f64 * ms / 1000.0).round() as usize
    }

    /// One dot at the character speed
    pub fn dot_samples(&self) -> usize {
        self.samples_for_ms(dit_duration_ms(self.wpm))
    }

    /// One dot at the spacing speed
    pub fn farnsworth_dot_samples(&self) -> usize {
        self.samples_for_ms(dit_duration_ms(self.farnsworth_wpm))
    }

    pub fn dash_samples(&self) -> usize {
        self.dot_samples() * 3
    }

    /// Silence after every symbol
    pub fn intra_gap_samples(&self) -> usize {
        self.dot_samples()
    }

    /// Extra silence after each character, on top of its trailing intra gap
    pub fn char_gap_samples(&self) -> usize {
        self.farnsworth_dot_samples() * 3
    }

    /// Silence rendered for a space character
    pub fn word_gap_samples(&self) -> usize {
        self.farnsworth_dot_samples() * 7
    }
}

impl Default for TimingParameters {
    fn default() -> Self {
        Self {
            wpm: DEFAULT_WPM,
            farnsworth_wpm: DEFAULT_WPM,
            tone_hz: DEFAULT_TONE_HZ,
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}
