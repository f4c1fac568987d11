/// Stored sample layout of a [`PcmBuffer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SampleFormat {
    /// Unsigned 8-bit, silence at 128 (legacy export format)
    U8,
    /// Signed 16-bit little-endian, silence at 0
    I16,
}

impl SampleFormat {
    pub fn bits_per_sample(self) -> u16 {
        match self {
            SampleFormat::U8 => 8,
            SampleFormat::I16 => 16,
        }
    }

    pub fn bytes_per_sample(self) -> usize {
        self.bits_per_sample() as usize / 8
    }

    pub fn from_bits(bits: u16) -> Option<Self> {
        match bits {
            8 => Some(SampleFormat::U8),
            16 => Some(SampleFormat::I16),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PcmSamples {
    U8(Vec<u8>),
    I16(Vec<i16>),
}

/// Mono PCM audio at a fixed sample rate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmBuffer {
    pub sample_rate: u32,
    pub samples: PcmSamples,
}

impl PcmBuffer {
    /// Quantize normalized samples in [-1, 1] (values outside are clipped)
    pub fn from_normalized(samples: &[f32], sample_rate: u32, format: SampleFormat) -> Self {
        let samples = match format {
            SampleFormat::I16 => PcmSamples::I16(
                samples
                    .iter()
                    .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16)
                    .collect(),
            ),
            SampleFormat::U8 => PcmSamples::U8(
                samples
                    .iter()
                    .map(|&s| (128.0 + (s.clamp(-1.0, 1.0) * 127.0).round()) as u8)
                    .collect(),
            ),
        };
        Self {
            sample_rate,
            samples,
        }
    }

    pub fn format(&self) -> SampleFormat {
        match self.samples {
            PcmSamples::U8(_) => SampleFormat::U8,
            PcmSamples::I16(_) => SampleFormat::I16,
        }
    }

    pub fn len(&self) -> usize {
        match &self.samples {
            PcmSamples::U8(s) => s.len(),
            PcmSamples::I16(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.len() as f64 / self.sample_rate as f64
    }

    /// Samples as floats in [-1, 1)
    pub fn to_normalized(&self) -> Vec<f32> {
        match &self.samples {
            PcmSamples::U8(s) => s.iter().map(|&b| u8_to_f32(b)).collect(),
            PcmSamples::I16(s) => s.iter().map(|&v| i16_to_f32(v)).collect(),
        }
    }
}

pub fn u8_to_f32(sample: u8) -> f32 {
    (sample as f32 - 128.0) / 128.0
}

pub fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / 32768.0
}
