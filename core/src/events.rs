use crate::estimator::EstimateRule;
use crate::symbols::Symbol;

/// Binary keying state of the input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum SignalState {
    Silence,
    Tone,
}

impl SignalState {
    pub fn from_on(on: bool) -> Self {
        if on {
            SignalState::Tone
        } else {
            SignalState::Silence
        }
    }

    pub fn is_tone(self) -> bool {
        self == SignalState::Tone
    }

    pub fn opposite(self) -> Self {
        match self {
            SignalState::Silence => SignalState::Tone,
            SignalState::Tone => SignalState::Silence,
        }
    }
}

/// Classification of a committed silence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum GapKind {
    /// Between symbols of one character
    Symbol,
    /// Between characters
    Character,
    /// Between words
    Word,
}

/// Structured trace of the decoder's decisions.
///
/// Sample positions count from the first sample fed since construction or
/// the last reset.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum DecoderEvent {
    /// A state held long enough to be accepted; `duration` is the run that ended
    StateCommitted {
        from: SignalState,
        to: SignalState,
        at_sample: u64,
        duration: u64,
    },
    /// A flip that reverted before the denoise cutoff
    GlitchDiscarded {
        state: SignalState,
        at_sample: u64,
        duration: u64,
    },
    FrequencyLocked {
        frequency_hz: f32,
        at_sample: u64,
    },
    ToneClassified {
        duration: u64,
        units: u32,
        symbol: Symbol,
    },
    SilenceClassified {
        duration: u64,
        units: u32,
        kind: GapKind,
    },
    UnitEstimateUpdated {
        previous: f64,
        current: f64,
        rule: EstimateRule,
    },
    /// The unit used for silences moved: blended from an intra-character
    /// gap, or snapped to a new dot unit
    SilenceUnitUpdated {
        previous: f64,
        current: f64,
        rule: EstimateRule,
    },
    /// Held-back runs are about to be replayed. `measured` is false when no
    /// dot length stood out and the configured speed is used instead.
    Calibrated {
        unit: f64,
        char_gap: Option<f64>,
        measured: bool,
        runs: usize,
    },
    /// The learned character gap was discarded after the unit estimate snapped
    CharGapForgotten,
    CharacterEmitted {
        ch: char,
    },
    /// A completed symbol sequence with no table entry
    CharacterDropped {
        pattern: String,
    },
    /// Classification skipped because the unit estimate is not positive
    EstimateNotReady {
        duration: u64,
    },
}
