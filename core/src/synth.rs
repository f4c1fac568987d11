use crate::container;
use crate::error::{MorseError, Result};
use crate::pcm::{PcmBuffer, SampleFormat};
use crate::symbols::SymbolTable;
use crate::timing::TimingParameters;
use std::f32::consts::PI;

/// Default share of each tone spent fading in (and again fading out)
pub const DEFAULT_FADE_FRACTION: f32 = 0.05;

/// Ramp length of the legacy linear envelope
pub const LEGACY_RAMP_MS: f32 = 20.0;

/// Attack/decay shape applied to every tone segment
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Envelope {
    /// 0.5 * (1 - cos) ramps covering `fade_fraction` of the segment at each end
    RaisedCosine { fade_fraction: f32 },
    /// Straight ramps of a fixed duration, clamped to half the segment
    Linear { ramp_ms: f32 },
}

impl Default for Envelope {
    fn default() -> Self {
        Envelope::RaisedCosine {
            fade_fraction: DEFAULT_FADE_FRACTION,
        }
    }
}

/// Renders text as keyed sine tones.
///
/// Timing per character:
/// - every symbol is a tone (1 or 3 dots) followed by one dot of silence
/// - each character is followed by 3 more dots of silence at the spacing speed
/// - a space renders 7 dots of silence at the spacing speed
/// - characters without a Morse form contribute nothing
pub struct MorseSynthesizer {
    timing: TimingParameters,
    envelope: Envelope,
    amplitude: f32,
    table: &'static SymbolTable,
}

impl MorseSynthesizer {
    pub fn new(timing: TimingParameters) -> Self {
        Self {
            timing,
            envelope: Envelope::default(),
            amplitude: 1.0,
            table: SymbolTable::standard(),
        }
    }

    pub fn with_envelope(mut self, envelope: Envelope) -> Self {
        self.envelope = envelope;
        self
    }

    /// Peak level as a fraction of the output format's full scale
    pub fn with_amplitude(mut self, amplitude: f32) -> Result<Self> {
        if !(amplitude > 0.0 && amplitude <= 1.0) {
            return Err(MorseError::InvalidConfig(format!(
                "amplitude must lie in (0, 1], got {amplitude}"
            )));
        }
        self.amplitude = amplitude;
        Ok(self)
    }

    pub fn timing(&self) -> &TimingParameters {
        &self.timing
    }

    /// Render to normalized samples in [-1, 1]
    pub fn render(&self, text: &str) -> Vec<f32> {
        let dot = self.timing.dot_samples();
        let mut samples = Vec::with_capacity(self.estimate_len(text));

        for ch in text.chars() {
            if ch == ' ' {
                push_silence(&mut samples, self.timing.word_gap_samples());
                continue;
            }
            let Some(symbols) = self.table.encode(ch) else {
                continue;
            };
            for &symbol in symbols {
                samples.extend(self.tone(dot * symbol.units() as usize));
                push_silence(&mut samples, self.timing.intra_gap_samples());
            }
            push_silence(&mut samples, self.timing.char_gap_samples());
        }

        samples
    }

    /// Render to quantized PCM in the given format
    pub fn generate(&self, text: &str, format: SampleFormat) -> PcmBuffer {
        let samples = self.render(text);
        PcmBuffer::from_normalized(&samples, self.timing.sample_rate(), format)
    }

    /// Render straight to container bytes
    pub fn generate_container(&self, text: &str, format: SampleFormat) -> Vec<u8> {
        container::wrap(&self.generate(text, format))
    }

    fn tone(&self, len: usize) -> Vec<f32> {
        let sample_rate = self.timing.sample_rate() as f32;
        let freq = self.timing.tone_hz();
        let window = match self.envelope {
            Envelope::RaisedCosine { fade_fraction } => {
                let taper = (len as f32 * fade_fraction.clamp(0.0, 0.5)).round() as usize;
                raised_cosine_window(len, taper)
            }
            Envelope::Linear { ramp_ms } => {
                let ramp = (sample_rate * ramp_ms.max(0.0) / 1000.0).round() as usize;
                linear_window(len, ramp)
            }
        };

        window
            .iter()
            .enumerate()
            .map(|(i, &weight)| {
                let t = i as f32 / sample_rate;
                (2.0 * PI * freq * t).sin() * self.amplitude * weight
            })
            .collect()
    }

    fn estimate_len(&self, text: &str) -> usize {
        let per_char = self.timing.dash_samples() * 4 + self.timing.char_gap_samples();
        text.chars().count() * per_char
    }
}

fn push_silence(samples: &mut Vec<f32>, len: usize) {
    samples.resize(samples.len() + len, 0.0);
}

/// Render with standard 16-bit output
pub fn generate(
    text: &str,
    wpm: u32,
    farnsworth_wpm: u32,
    tone_hz: f32,
    sample_rate: u32,
) -> Result<PcmBuffer> {
    let timing = TimingParameters::new(wpm, farnsworth_wpm, tone_hz, sample_rate)?;
    Ok(MorseSynthesizer::new(timing).generate(text, SampleFormat::I16))
}

/// Raised-cosine taper: rises from exactly 0 at the first sample and falls
/// back to exactly 0 at the last one
fn raised_cosine_window(len: usize, taper_len: usize) -> Vec<f32> {
    let taper = taper_len.min(len / 2);
    let mut window = vec![1.0; len];
    if taper == 0 {
        return window;
    }

    for i in 0..taper {
        let progress = i as f32 / taper as f32;
        let value = 0.5 * (1.0 - (PI * progress).cos());
        window[i] = value;
        window[len - 1 - i] = value;
    }

    window
}

fn linear_window(len: usize, ramp_len: usize) -> Vec<f32> {
    let ramp = ramp_len.min(len / 2);
    let mut window = vec![1.0; len];
    if ramp == 0 {
        return window;
    }

    for i in 0..ramp {
        let value = i as f32 / ramp as f32;
        window[i] = value;
        window[len - 1 - i] = value;
    }

    window
}
