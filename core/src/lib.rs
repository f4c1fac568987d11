//! Morse code audio codec
//!
//! Renders text as keyed sine tones in a mono PCM container and decodes
//! such audio back to text with a Goertzel detector bank, an adaptive noise
//! floor and a self-calibrating dot-length estimator.

pub mod config;
pub mod container;
pub mod decoder;
pub mod error;
pub mod estimator;
pub mod events;
pub mod goertzel;
pub mod pcm;
pub mod stream;
pub mod symbols;
pub mod synth;
pub mod timing;

pub use config::{DashEvidence, DecoderConfig, EstimatorConfig};
pub use container::ContainerInfo;
pub use decoder::{CharSink, DecoderState, FrequencyLock, LastEmission, MorseDecoder};
pub use error::{FormatError, MorseError, Result};
pub use events::{DecoderEvent, GapKind, SignalState};
pub use pcm::{PcmBuffer, PcmSamples, SampleFormat};
pub use stream::{decode_container, decode_pcm, decode_samples, run_capture, CaptureOutcome, StreamDecoder};
pub use symbols::{Symbol, SymbolTable};
pub use synth::{generate, Envelope, MorseSynthesizer};
pub use timing::TimingParameters;

// Timing
pub const PARIS_DIT_MS: f64 = 1200.0; // dot length at 1 wpm
pub const MIN_WPM: u32 = 5;
pub const DEFAULT_WPM: u32 = 20;

// Audio
pub const DEFAULT_SAMPLE_RATE: u32 = 16000;
pub const DEFAULT_TONE_HZ: f32 = 700.0;

// Detection
pub const BLOCK_DURATION_MS: usize = 10; // 100 Hz bins
pub const CANDIDATE_FREQUENCIES: [f32; 3] = [600.0, 700.0, 800.0];
