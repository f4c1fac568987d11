use std::f64::consts::PI;

/// Single-bin DFT detector tuned once for a frequency, sample rate and block
/// length.
///
/// The bin index is `round(N * f / sr)`, so the effective frequency is the
/// nearest multiple of `sr / N`. Every call starts from cleared registers.
#[derive(Debug, Clone)]
pub struct Goertzel {
    target_hz: f32,
    block_len: usize,
    coeff: f64,
    cos_omega: f64,
    sin_omega: f64,
}

impl Goertzel {
    pub fn new(target_hz: f32, sample_rate: u32, block_len: usize) -> Self {
        let n = block_len.max(1) as f64;
        let k = (n * target_hz as f64 / sample_rate.max(1) as f64).round();
        let omega = 2.0 * PI * k / n;

        Self {
            target_hz,
            block_len: block_len.max(1),
            coeff: 2.0 * omega.cos(),
            cos_omega: omega.cos(),
            sin_omega: omega.sin(),
        }
    }

    pub fn target_hz(&self) -> f32 {
        self.target_hz
    }

    /// Squared magnitude of the bin over the first `block_len` samples
    pub fn magnitude_squared(&self, samples: &[f32]) -> f64 {
        let mut q1 = 0.0f64;
        let mut q2 = 0.0f64;

        for &sample in samples.iter().take(self.block_len) {
            let q0 = self.coeff * q1 - q2 + sample as f64;
            q2 = q1;
            q1 = q0;
        }

        let real = q1 - q2 * self.cos_omega;
        let imag = q2 * self.sin_omega;
        real * real + imag * imag
    }
}

/// Fixed set of detectors, one per candidate carrier
#[derive(Debug, Clone)]
pub struct DetectorBank {
    detectors: Vec<Goertzel>,
}

impl DetectorBank {
    pub fn new(frequencies: &[f32], sample_rate: u32, block_len: usize) -> Self {
        Self {
            detectors: frequencies
                .iter()
                .map(|&f| Goertzel::new(f, sample_rate, block_len))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    pub fn frequency(&self, index: usize) -> Option<f32> {
        self.detectors.get(index).map(Goertzel::target_hz)
    }

    pub fn magnitude(&self, index: usize, block: &[f32]) -> f64 {
        self.detectors
            .get(index)
            .map_or(0.0, |detector| detector.magnitude_squared(block))
    }

    /// Index and magnitude of the strongest detector; ties go to the lowest index
    pub fn strongest(&self, block: &[f32]) -> (usize, f64) {
        let mut best = (0, 0.0);
        for (index, detector) in self.detectors.iter().enumerate() {
            let mag = detector.magnitude_squared(block);
            if mag > best.1 {
                best = (index, mag);
            }
        }
        best
    }
}

/// Share of a block's energy that sits in the detected bin.
///
/// A pure sinusoid on the bin scores about 1.0; white noise scores roughly
/// `2 / len`, a single click exactly `2 / len`.
pub fn tone_purity(magnitude: f64, block: &[f32]) -> f64 {
    let energy: f64 = block.iter().map(|&s| s as f64 * s as f64).sum();
    if energy <= 0.0 || block.is_empty() {
        return 0.0;
    }
    magnitude / (block.len() as f64 * energy / 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: u32, len: usize, amplitude: f32) -> Vec<f32> {
        (0..len)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                amplitude * (2.0 * std::f32::consts::PI * freq * t).sin()
            })
            .collect()
    }

    #[test]
    fn test_on_bin_tone_energy() {
        let detector = Goertzel::new(700.0, 8000, 80);
        let block = sine(700.0, 8000, 80, 1.0);
        let mag = detector.magnitude_squared(&block);
        // (A * N / 2)^2
        assert!((mag - 1600.0).abs() < 1.0, "magnitude was {mag}");
    }

    #[test]
    fn test_neighbouring_bins_are_orthogonal() {
        let bank = DetectorBank::new(&[600.0, 700.0, 800.0], 16000, 160);
        let block = sine(800.0, 16000, 160, 0.5);
        assert!(bank.magnitude(0, &block) < 1e-3);
        assert!(bank.magnitude(1, &block) < 1e-3);
        assert!(bank.magnitude(2, &block) > 100.0);

        let (index, _) = bank.strongest(&block);
        assert_eq!(index, 2);
        assert_eq!(bank.frequency(index), Some(800.0));
    }

    #[test]
    fn test_registers_reset_between_calls() {
        let detector = Goertzel::new(700.0, 8000, 80);
        let block = sine(700.0, 8000, 80, 1.0);
        let first = detector.magnitude_squared(&block);
        let second = detector.magnitude_squared(&block);
        assert_eq!(first, second);
        assert_eq!(detector.magnitude_squared(&[0.0; 80]), 0.0);
    }

    #[test]
    fn test_only_first_block_len_samples_count() {
        let detector = Goertzel::new(700.0, 8000, 80);
        let mut long = sine(700.0, 8000, 80, 1.0);
        let exact = detector.magnitude_squared(&long);
        long.extend(sine(700.0, 8000, 80, 1.0));
        assert_eq!(detector.magnitude_squared(&long), exact);
    }

    #[test]
    fn test_empty_and_short_blocks() {
        let bank = DetectorBank::new(&[700.0], 8000, 80);
        assert_eq!(bank.strongest(&[]), (0, 0.0));
        assert!(bank.magnitude(0, &sine(700.0, 8000, 20, 1.0)) > 0.0);
        assert_eq!(bank.magnitude(5, &[1.0]), 0.0);
    }

    #[test]
    fn test_purity_separates_tone_from_clicks() {
        let detector = Goertzel::new(700.0, 8000, 80);
        let tone = sine(700.0, 8000, 80, 0.3);
        let purity = tone_purity(detector.magnitude_squared(&tone), &tone);
        assert!((purity - 1.0).abs() < 0.01, "tone purity {purity}");

        let mut click = vec![0.0; 80];
        click[37] = 0.9;
        let purity = tone_purity(detector.magnitude_squared(&click), &click);
        assert!((purity - 2.0 / 80.0).abs() < 1e-6, "click purity {purity}");

        assert_eq!(tone_purity(0.0, &[0.0; 80]), 0.0);
    }
}
