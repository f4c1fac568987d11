use std::collections::VecDeque;
use std::mem;
use std::sync::mpsc::Sender;

use log::{debug, trace};

use crate::config::{DashEvidence, DecoderConfig};
use crate::error::Result;
use crate::estimator::{EstimateRule, GapEstimator, Run, Scale, UnitEstimator};
use crate::events::{DecoderEvent, GapKind, SignalState};
use crate::goertzel::{tone_purity, DetectorBank};
use crate::symbols::{pattern_to_string, Symbol, SymbolTable};

/// Receives decoded characters (and `' '` word breaks) as they are recognized
pub trait CharSink {
    fn emit(&mut self, ch: char);
}

impl CharSink for String {
    fn emit(&mut self, ch: char) {
        self.push(ch);
    }
}

impl CharSink for Vec<char> {
    fn emit(&mut self, ch: char) {
        self.push(ch);
    }
}

/// Characters are dropped once the receiver hangs up
impl CharSink for Sender<char> {
    fn emit(&mut self, ch: char) {
        let _ = self.send(ch);
    }
}

impl<F: FnMut(char)> CharSink for F {
    fn emit(&mut self, ch: char) {
        self(ch)
    }
}

/// Callback receiving every [`DecoderEvent`]
pub type Observer = Box<dyn FnMut(&DecoderEvent) + Send>;

/// What was sent to the sink most recently
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LastEmission {
    Nothing,
    Character,
    WordBreak,
}

/// Carrier selection progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrequencyLock {
    /// Tracking which detector has won the most recent run of tone blocks
    Searching {
        candidate: Option<usize>,
        streak: usize,
    },
    /// Index into the configured candidate frequencies
    Locked(usize),
}

#[derive(Debug, Clone)]
struct NoiseFloor {
    history: VecDeque<f64>,
    capacity: usize,
}

impl NoiseFloor {
    fn new(capacity: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, magnitude: f64) {
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(magnitude);
    }

    fn median(&self) -> f64 {
        if self.history.is_empty() {
            return 0.0;
        }
        let mut sorted: Vec<f64> = self.history.iter().copied().collect();
        sorted.sort_by(|a, b| a.total_cmp(b));
        sorted[sorted.len() / 2]
    }
}

/// Where a silence duration came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SilenceOrigin {
    /// Ended by the next tone
    Measured,
    /// Still open when the stream was flushed
    Trailing,
}

/// Progress of the start-of-session timing measurement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Calibration {
    /// Committed runs held back until their durations show the dot length
    /// and the character gap
    Collecting(Vec<Run>),
    /// The dot length was read off the held-back runs
    Measured,
    /// Decoding from the configured speed
    Assumed,
}

/// An opposite-state run not yet long enough to commit
#[derive(Debug, Clone, Copy)]
struct Flip {
    /// Start of the first block of the run
    since: u64,
    /// Interpolated sample position of the edge
    edge: u64,
}

/// Everything the decoder learns while running. Replaced wholesale on reset.
#[derive(Debug, Clone)]
pub struct DecoderState {
    samples_processed: u64,
    /// Comparator output for the latest block
    observed: SignalState,
    /// State accepted after the denoise check
    committed: SignalState,
    last_transition: u64,
    pending_flip: Option<Flip>,
    /// Tone coverage and length of the latest block
    last_block: (f64, usize),
    lock: FrequencyLock,
    calibration: Calibration,
    pending_symbols: Vec<Symbol>,
    last_emission: LastEmission,
    noise: NoiseFloor,
    unit: UnitEstimator,
    /// Unit that silences are measured in; follows intra-character gaps
    silence_unit: f64,
    char_gap: GapEstimator,
}

impl DecoderState {
    fn new(config: &DecoderConfig) -> Self {
        let calibration = if config.calibration_max_runs == 0 {
            Calibration::Assumed
        } else {
            Calibration::Collecting(Vec::new())
        };

        Self {
            samples_processed: 0,
            observed: SignalState::Silence,
            committed: SignalState::Silence,
            last_transition: 0,
            pending_flip: None,
            last_block: (0.0, 0),
            lock: FrequencyLock::Searching {
                candidate: None,
                streak: 0,
            },
            calibration,
            pending_symbols: Vec::new(),
            last_emission: LastEmission::Nothing,
            noise: NoiseFloor::new(config.noise_history_len),
            unit: UnitEstimator::new(config.initial_unit_samples(), config.estimator.clone()),
            silence_unit: config.initial_unit_samples(),
            char_gap: GapEstimator::new(config.char_gap_weight),
        }
    }

    pub fn samples_processed(&self) -> u64 {
        self.samples_processed
    }

    pub fn signal_state(&self) -> SignalState {
        self.committed
    }

    pub fn last_transition(&self) -> u64 {
        self.last_transition
    }

    pub fn frequency_lock(&self) -> FrequencyLock {
        self.lock
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    pub fn pending_symbols(&self) -> &[Symbol] {
        &self.pending_symbols
    }

    pub fn last_emission(&self) -> LastEmission {
        self.last_emission
    }

    pub fn noise_floor(&self) -> f64 {
        self.noise.median()
    }

    /// Current dot unit in samples
    pub fn unit_estimate(&self) -> f64 {
        self.unit.unit()
    }

    pub fn silence_unit_estimate(&self) -> f64 {
        self.silence_unit
    }

    /// Learned silence between characters in samples, once one has been seen
    pub fn char_gap_estimate(&self) -> Option<f64> {
        self.char_gap.gap()
    }
}

/// Adaptive Morse decoder fed with blocks of normalized samples.
///
/// Per block: a Goertzel detector (the locked one, or the strongest of the
/// candidate bank) is compared against thresholds derived from the median
/// noise floor, with hysteresis. Runs of tone and silence that survive the
/// denoise check are classified in units of a self-calibrating dot length;
/// completed characters go to the sink as soon as their trailing gap ends.
///
/// At the start of a session committed runs are held back until their
/// durations separate into a dot-length cluster and, above it, character
/// and word gaps. The held runs are then replayed against that scale, so
/// the first characters of a transmission at any speed decode like the
/// rest. The hold is bounded by `calibration_max_runs` and released on
/// flush.
pub struct MorseDecoder<S: CharSink = String> {
    config: DecoderConfig,
    bank: DetectorBank,
    block_len: usize,
    denoise: u64,
    table: &'static SymbolTable,
    state: DecoderState,
    sink: S,
    observer: Option<Observer>,
}

impl<S: CharSink> MorseDecoder<S> {
    pub fn new(config: DecoderConfig, sink: S) -> Result<Self> {
        config.validate()?;
        let block_len = config.block_len();
        let bank = DetectorBank::new(&config.candidate_frequencies, config.sample_rate, block_len);
        debug!(
            "decoder: {} Hz, {} samples/block, candidates {:?}",
            config.sample_rate, block_len, config.candidate_frequencies
        );

        Ok(Self {
            bank,
            block_len,
            denoise: config.denoise_samples(),
            table: SymbolTable::standard(),
            state: DecoderState::new(&config),
            config,
            sink,
            observer: None,
        })
    }

    /// Receive every decoder event in addition to the `trace` log
    pub fn set_observer<F>(&mut self, observer: F)
    where
        F: FnMut(&DecoderEvent) + Send + 'static,
    {
        self.observer = Some(Box::new(observer));
    }

    pub fn clear_observer(&mut self) {
        self.observer = None;
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn block_len(&self) -> usize {
        self.block_len
    }

    pub fn state(&self) -> &DecoderState {
        &self.state
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    pub fn locked_frequency(&self) -> Option<f32> {
        match self.state.lock {
            FrequencyLock::Locked(index) => self.bank.frequency(index),
            FrequencyLock::Searching { .. } => None,
        }
    }

    pub fn unit_estimate_ms(&self) -> f64 {
        self.samples_to_ms(self.state.unit.unit())
    }

    /// Learned character gap in milliseconds
    pub fn char_gap_ms(&self) -> Option<f64> {
        self.state.char_gap.gap().map(|gap| self.samples_to_ms(gap))
    }

    /// Character speed implied by the current dot estimate
    pub fn estimated_wpm(&self) -> f64 {
        let ms = self.unit_estimate_ms();
        if ms > 0.0 {
            crate::PARIS_DIT_MS / ms
        } else {
            0.0
        }
    }

    fn samples_to_ms(&self, samples: f64) -> f64 {
        samples * 1000.0 / self.config.sample_rate as f64
    }

    /// Feed any number of samples, analysed in consecutive blocks of
    /// `block_len` (the last one may be short)
    pub fn process_buffer(&mut self, samples: &[f32]) {
        for block in samples.chunks(self.block_len) {
            self.process_block(block);
        }
    }

    /// Analyse one block. Longer input is split into blocks.
    pub fn process_block(&mut self, block: &[f32]) {
        if block.is_empty() {
            return;
        }
        if block.len() > self.block_len {
            self.process_buffer(block);
            return;
        }

        let block_start = self.state.samples_processed;
        let floor = self.state.noise.median();
        let threshold_on = floor * self.config.threshold_on_factor + self.config.threshold_epsilon;
        let threshold_off = floor * self.config.threshold_off_factor + self.config.threshold_epsilon;

        let (detector, magnitude) = match self.state.lock {
            FrequencyLock::Locked(index) => (index, self.bank.magnitude(index, block)),
            FrequencyLock::Searching { .. } => self.bank.strongest(block),
        };
        let coverage = tone_purity(magnitude, block).clamp(0.0, 1.0);
        let tonal = coverage >= self.config.min_tone_purity;
        let on = tonal
            && match self.state.observed {
                SignalState::Tone => magnitude > threshold_off,
                SignalState::Silence => magnitude > threshold_on,
            };

        // Tone energy never feeds the noise estimate
        if self.state.observed == SignalState::Silence && !on {
            self.state.noise.push(magnitude);
        }
        self.update_lock(detector, on && magnitude > threshold_on, block_start);

        self.state.observed = SignalState::from_on(on);
        self.state.samples_processed = block_start + block.len() as u64;
        self.track_run(block_start, block.len(), coverage);
        self.state.last_block = (coverage, block.len());
    }

    /// Close out the stream: commit or drop the open run, release any
    /// held-back runs, then force the pending character and a trailing word
    /// break
    pub fn flush(&mut self) {
        let end = self.state.samples_processed;

        if let Some(flip) = self.state.pending_flip.take() {
            if end - flip.since >= self.denoise {
                self.commit(flip.edge);
            } else {
                self.discard_glitch(flip.since, end);
            }
        }

        let open = self.state.committed;
        let close = if open.is_tone() {
            let (coverage, len) = self.state.last_block;
            let uncovered = ((1.0 - coverage) * len as f64).round() as u64;
            end.saturating_sub(uncovered).max(self.state.last_transition)
        } else {
            end
        };
        let duration = self.compensate(close - self.state.last_transition);

        if open.is_tone() {
            self.route_run(Run {
                state: SignalState::Tone,
                duration,
            });
            self.calibrate(true);
        } else {
            self.calibrate(true);
            self.process_silence(duration, SilenceOrigin::Trailing);
        }
        self.complete_character();
        self.emit_word_break();

        self.state.last_transition = end;
        self.state.committed = SignalState::Silence;
        self.state.observed = SignalState::Silence;
    }

    /// Forget everything learned; the sink is left untouched
    pub fn reset(&mut self) {
        self.state = DecoderState::new(&self.config);
    }

    fn update_lock(&mut self, detector: usize, winning: bool, at_sample: u64) {
        let FrequencyLock::Searching { candidate, streak } = self.state.lock else {
            return;
        };
        if !winning {
            self.state.lock = FrequencyLock::Searching {
                candidate: None,
                streak: 0,
            };
            return;
        }

        let streak = if candidate == Some(detector) { streak + 1 } else { 1 };
        if streak >= self.config.lock_confirm_blocks {
            self.state.lock = FrequencyLock::Locked(detector);
            let frequency_hz = self.bank.frequency(detector).unwrap_or_default();
            debug!("locked onto {frequency_hz} Hz at sample {at_sample}");
            self.record(DecoderEvent::FrequencyLocked {
                frequency_hz,
                at_sample,
            });
        } else {
            self.state.lock = FrequencyLock::Searching {
                candidate: Some(detector),
                streak,
            };
        }
    }

    fn track_run(&mut self, block_start: u64, len: usize, coverage: f64) {
        if self.state.observed == self.state.committed {
            if let Some(flip) = self.state.pending_flip.take() {
                self.discard_glitch(flip.since, block_start);
            }
            return;
        }

        let flip = match self.state.pending_flip {
            Some(flip) => flip,
            None => {
                let flip = Flip {
                    since: block_start,
                    edge: self.edge_within(block_start, len, coverage),
                };
                self.state.pending_flip = Some(flip);
                flip
            }
        };
        if self.state.samples_processed - flip.since >= self.denoise {
            self.commit(flip.edge);
        }
    }

    /// Sample position of the edge that flipped the comparator in the block
    /// at `block_start`.
    ///
    /// A clean carrier puts the share of a block it covers into the bin, so
    /// the covered shares of this block and the previous one place the edge
    /// inside them.
    fn edge_within(&self, block_start: u64, len: usize, coverage: f64) -> u64 {
        let (previous, previous_len) = self.state.last_block;
        let start = block_start as f64;
        let edge = if self.state.observed.is_tone() {
            start + (1.0 - coverage) * len as f64 - previous * previous_len as f64
        } else {
            start + coverage * len as f64 - (1.0 - previous) * previous_len as f64
        };
        let lowest = self.state.last_transition as f64;
        let highest = (self.state.samples_processed as f64).max(lowest);
        edge.clamp(lowest, highest).round() as u64
    }

    fn discard_glitch(&mut self, since: u64, until: u64) {
        self.record(DecoderEvent::GlitchDiscarded {
            state: self.state.committed.opposite(),
            at_sample: since,
            duration: until - since,
        });
    }

    fn commit(&mut self, edge: u64) {
        let from = self.state.committed;
        let to = from.opposite();
        let raw = edge.saturating_sub(self.state.last_transition);
        self.record(DecoderEvent::StateCommitted {
            from,
            to,
            at_sample: edge,
            duration: raw,
        });

        self.state.last_transition = edge;
        self.state.committed = to;
        self.state.pending_flip = None;
        let duration = self.compensate(raw);
        self.route_run(Run { state: from, duration });
    }

    fn compensate(&self, duration: u64) -> u64 {
        if self.config.latency_compensation && duration > self.block_len as u64 {
            duration - self.block_len as u64 / 2
        } else {
            duration
        }
    }

    /// Classify a committed run, or hold it back while calibrating
    fn route_run(&mut self, run: Run) {
        if let Calibration::Collecting(held) = &mut self.state.calibration {
            // a leading silence carries no timing
            if run.duration > 0 && (run.state.is_tone() || !held.is_empty()) {
                held.push(run);
                self.calibrate(false);
            }
            return;
        }

        match run.state {
            SignalState::Tone => self.process_tone(run.duration),
            SignalState::Silence => self.process_silence(run.duration, SilenceOrigin::Measured),
        }
    }

    /// Replay the held-back runs once the dot length and character gap
    /// stand out, the hold is full, or `force` is set
    fn calibrate(&mut self, force: bool) {
        let Calibration::Collecting(held) = &self.state.calibration else {
            return;
        };
        let scale = Scale::measure(
            held,
            self.config.calibration_split_ratio,
            self.config.char_gap_units,
        );
        let full = held.len() >= self.config.calibration_max_runs;
        if !(force || full || (scale.unit.is_some() && scale.char_gap.is_some())) {
            return;
        }

        let held = match mem::replace(&mut self.state.calibration, Calibration::Assumed) {
            Calibration::Collecting(held) => held,
            _ => Vec::new(),
        };
        if let Some(unit) = scale.unit {
            self.state.calibration = Calibration::Measured;
            self.state.unit = UnitEstimator::new(unit, self.config.estimator.clone());
            self.state.silence_unit = unit;
        }
        if let Some(gap) = scale.char_gap {
            self.state.char_gap.observe(gap);
        }
        debug!(
            "calibrated from {} runs: unit {:.1} samples, char gap {:?}",
            held.len(),
            self.state.unit.unit(),
            scale.char_gap
        );
        self.record(DecoderEvent::Calibrated {
            unit: self.state.unit.unit(),
            char_gap: scale.char_gap,
            measured: scale.unit.is_some(),
            runs: held.len(),
        });

        for run in held {
            self.route_run(run);
        }
    }

    /// `None` while `unit` is unusable
    fn units(&mut self, duration: u64, unit: f64) -> Option<u32> {
        if !(unit > 0.0) {
            self.record(DecoderEvent::EstimateNotReady { duration });
            return None;
        }
        Some(((duration as f64 / unit).round() as u32).max(1))
    }

    fn process_tone(&mut self, duration: u64) {
        if duration == 0 {
            return;
        }
        let Some(units) = self.units(duration, self.state.unit.unit()) else {
            return;
        };

        let symbol = if units >= self.config.dash_units || self.long_opening_tone(duration) {
            Symbol::Dash
        } else {
            Symbol::Dot
        };
        self.state.pending_symbols.push(symbol);
        self.record(DecoderEvent::ToneClassified {
            duration,
            units,
            symbol,
        });

        let previous = self.state.unit.unit();
        let rule = match (symbol, self.config.estimator.dash_evidence) {
            (Symbol::Dot, _) => Some(self.state.unit.observe_dot(duration as f64)),
            (Symbol::Dash, DashEvidence::Corroborate) => {
                Some(self.state.unit.observe_dash(duration as f64))
            }
            (Symbol::Dash, DashEvidence::Ignore) => None,
        };
        if let Some(rule) = rule {
            self.record(DecoderEvent::UnitEstimateUpdated {
                previous,
                current: self.state.unit.unit(),
                rule,
            });
            if rule == EstimateRule::Snap {
                self.follow_snap();
            }
        }
    }

    /// First tone of a session decoded at the configured speed: past
    /// `first_tone_dash_ratio` units it is read as a dash
    fn long_opening_tone(&self, duration: u64) -> bool {
        matches!(self.state.calibration, Calibration::Assumed)
            && self.state.last_emission == LastEmission::Nothing
            && self.state.pending_symbols.is_empty()
            && self
                .config
                .first_tone_dash_ratio
                .is_some_and(|ratio| duration as f64 > ratio * self.state.unit.unit())
    }

    /// The dot unit jumped to a new speed: silences follow it and the
    /// learned character gap is dropped
    fn follow_snap(&mut self) {
        let previous = self.state.silence_unit;
        self.state.silence_unit = self.state.unit.unit();
        self.record(DecoderEvent::SilenceUnitUpdated {
            previous,
            current: self.state.silence_unit,
            rule: EstimateRule::Snap,
        });

        if self.state.char_gap.gap().is_some() {
            self.state.char_gap.forget();
            self.record(DecoderEvent::CharGapForgotten);
        }
    }

    fn process_silence(&mut self, duration: u64, origin: SilenceOrigin) {
        if duration == 0 {
            return;
        }
        let Some(units) = self.units(duration, self.state.silence_unit) else {
            return;
        };

        if units < self.config.char_gap_units {
            self.record(DecoderEvent::SilenceClassified {
                duration,
                units,
                kind: GapKind::Symbol,
            });
            if origin == SilenceOrigin::Measured {
                self.observe_intra_gap(duration);
            }
            return;
        }

        let kind = if self.is_word_gap(duration, units) {
            GapKind::Word
        } else {
            GapKind::Character
        };
        self.record(DecoderEvent::SilenceClassified {
            duration,
            units,
            kind,
        });

        let completed = self.complete_character();
        if kind == GapKind::Word {
            self.emit_word_break();
        } else if completed && origin == SilenceOrigin::Measured {
            self.state.char_gap.observe(duration as f64);
        }
    }

    fn observe_intra_gap(&mut self, duration: u64) {
        let previous = self.state.silence_unit;
        let weight = self.config.silence_unit_weight;
        self.state.silence_unit = previous * (1.0 - weight) + duration as f64 * weight;
        self.record(DecoderEvent::SilenceUnitUpdated {
            previous,
            current: self.state.silence_unit,
            rule: EstimateRule::Blend,
        });
    }

    /// Word breaks need the unit threshold and a clear margin over the
    /// learned character gap, so stretched spacing still reads as letters
    fn is_word_gap(&self, duration: u64, units: u32) -> bool {
        if units < self.config.word_gap_units {
            return false;
        }
        let reference = self
            .state
            .char_gap
            .gap()
            .unwrap_or(self.config.initial_char_gap_units * self.state.silence_unit);
        duration as f64 >= self.config.word_gap_ratio * reference
    }

    /// Look up and emit the pending symbols; `true` if a character was emitted
    fn complete_character(&mut self) -> bool {
        if self.state.pending_symbols.is_empty() {
            return false;
        }
        let symbols = mem::take(&mut self.state.pending_symbols);
        match self.table.decode(&symbols) {
            Some(ch) => {
                self.sink.emit(ch);
                self.state.last_emission = LastEmission::Character;
                self.record(DecoderEvent::CharacterEmitted { ch });
                true
            }
            None => {
                self.record(DecoderEvent::CharacterDropped {
                    pattern: pattern_to_string(&symbols),
                });
                false
            }
        }
    }

    fn emit_word_break(&mut self) {
        if self.state.last_emission != LastEmission::Character {
            return;
        }
        self.sink.emit(' ');
        self.state.last_emission = LastEmission::WordBreak;
        self.record(DecoderEvent::CharacterEmitted { ch: ' ' });
    }

    fn record(&mut self, event: DecoderEvent) {
        trace!("{event:?}");
        if let Some(observer) = self.observer.as_mut() {
            observer(&event);
        }
    }
}
