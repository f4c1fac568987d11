use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use crossbeam_channel::{bounded, Sender};
use hound::WavReader;
use morsewave_core::symbols::{pattern_to_text, text_to_pattern};
use morsewave_core::{
    container, run_capture, CaptureOutcome, DecoderConfig, DecoderEvent, Envelope, MorseDecoder, MorseError,
    MorseSynthesizer, SampleFormat, StreamDecoder, TimingParameters,
};
use serde::Serialize;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use thiserror::Error;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "morsewave")]
#[command(about = "Morse code audio encoder and decoder")]
struct Cli {
    /// Log more (-v info, -vv debug, -vvv trace); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode text to a WAV file
    Encode {
        /// Text to encode (use --input to read it from a file)
        #[arg(value_name = "TEXT", required_unless_present = "input")]
        text: Option<String>,

        /// Read the text from a file instead
        #[arg(short, long, value_name = "INPUT.TXT", conflicts_with = "text")]
        input: Option<PathBuf>,

        /// Output WAV file
        #[arg(short, long, value_name = "OUTPUT.WAV")]
        output: PathBuf,

        /// Character speed in words per minute
        #[arg(long, default_value_t = morsewave_core::DEFAULT_WPM)]
        wpm: u32,

        /// Spacing speed in words per minute (defaults to --wpm)
        #[arg(long)]
        farnsworth: Option<u32>,

        /// Carrier frequency in Hz
        #[arg(long, default_value_t = morsewave_core::DEFAULT_TONE_HZ)]
        tone: f32,

        #[arg(long, default_value_t = morsewave_core::DEFAULT_SAMPLE_RATE)]
        sample_rate: u32,

        /// Bits per sample: 8 or 16
        #[arg(long, default_value_t = 16)]
        bits: u16,

        #[arg(long, value_enum, default_value_t = EnvelopeArg::RaisedCosine)]
        envelope: EnvelopeArg,
    },

    /// Decode a WAV file to text
    Decode {
        /// Input WAV file
        #[arg(value_name = "INPUT.WAV")]
        input: PathBuf,

        /// Expected speed, used until the dot length has been measured
        #[arg(long)]
        wpm_hint: Option<u32>,

        /// Candidate carrier frequencies in Hz, comma separated
        #[arg(long, value_delimiter = ',')]
        frequencies: Option<Vec<f32>>,

        /// Decoder tuning as JSON (any subset of the decoder settings)
        #[arg(long, value_name = "CONFIG.JSON")]
        config: Option<PathBuf>,

        /// Print a JSON report instead of plain text
        #[arg(long)]
        json: bool,

        /// Include every decoder event in the JSON report
        #[arg(long, requires = "json")]
        events: bool,
    },

    /// Decode raw mono PCM from stdin as it arrives
    Listen {
        #[arg(long, default_value_t = morsewave_core::DEFAULT_SAMPLE_RATE)]
        sample_rate: u32,

        #[arg(long, value_enum, default_value_t = RawFormat::S16le)]
        format: RawFormat,

        /// Expected speed, used until the dot length has been measured
        #[arg(long)]
        wpm_hint: Option<u32>,

        /// Stop after this many seconds of audio
        #[arg(long)]
        seconds: Option<f64>,
    },

    /// Show the header of a WAV file written by this tool
    Inspect {
        #[arg(value_name = "INPUT.WAV")]
        input: PathBuf,
    },

    /// Print the dot/dash notation of some text, or read notation back
    Morse {
        #[arg(value_name = "TEXT")]
        text: String,

        /// Treat TEXT as notation (`... --- ... / ...`) and print the text
        #[arg(long)]
        decode: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum EnvelopeArg {
    /// Raised-cosine fades over 5% of each tone
    RaisedCosine,
    /// Fixed 20 ms linear ramps
    Linear,
}

impl From<EnvelopeArg> for Envelope {
    fn from(arg: EnvelopeArg) -> Self {
        match arg {
            EnvelopeArg::RaisedCosine => Envelope::default(),
            EnvelopeArg::Linear => Envelope::Linear {
                ramp_ms: morsewave_core::synth::LEGACY_RAMP_MS,
            },
        }
    }
}

/// Raw sample encodings accepted on stdin
#[derive(Clone, Copy, Debug, ValueEnum)]
enum RawFormat {
    U8,
    S16le,
    F32le,
}

impl RawFormat {
    fn bytes_per_sample(self) -> usize {
        match self {
            RawFormat::U8 => 1,
            RawFormat::S16le => 2,
            RawFormat::F32le => 4,
        }
    }

    fn to_normalized(self, bytes: &[u8]) -> Vec<f32> {
        match self {
            RawFormat::U8 => bytes.iter().map(|&b| morsewave_core::pcm::u8_to_f32(b)).collect(),
            RawFormat::S16le => bytes
                .chunks_exact(2)
                .map(|b| morsewave_core::pcm::i16_to_f32(i16::from_le_bytes([b[0], b[1]])))
                .collect(),
            RawFormat::F32le => bytes
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
        }
    }
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Codec(#[from] MorseError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Usage(String),
}

type Result<T> = std::result::Result<T, CliError>;

#[derive(Serialize)]
struct DecodeReport {
    text: String,
    sample_rate: u32,
    duration_secs: f64,
    locked_frequency_hz: Option<f32>,
    estimated_wpm: f64,
    unit_ms: f64,
    char_gap_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    events: Option<Vec<DecoderEvent>>,
}

#[derive(Serialize)]
struct InspectReport {
    sample_rate: u32,
    channels: u16,
    bits_per_sample: u16,
    data_len: usize,
    samples: usize,
    duration_secs: f64,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Encode {
            text,
            input,
            output,
            wpm,
            farnsworth,
            tone,
            sample_rate,
            bits,
            envelope,
        } => {
            let text = match (text, input) {
                (_, Some(path)) => fs::read_to_string(&path)?,
                (Some(text), None) => text,
                (None, None) => return Err(CliError::Usage("no text given".into())),
            };
            let timing = TimingParameters::new(wpm, farnsworth.unwrap_or(wpm), tone, sample_rate)?;
            encode_command(&text, &output, timing, bits, envelope.into())
        }
        Commands::Decode {
            input,
            wpm_hint,
            frequencies,
            config,
            json,
            events,
        } => decode_command(&input, wpm_hint, frequencies, config.as_deref(), json, events),
        Commands::Listen {
            sample_rate,
            format,
            wpm_hint,
            seconds,
        } => listen_command(sample_rate, format, wpm_hint, seconds),
        Commands::Inspect { input } => inspect_command(&input),
        Commands::Morse { text, decode } => {
            if decode {
                println!("{}", pattern_to_text(&text));
            } else {
                println!("{}", text_to_pattern(&text));
            }
            Ok(())
        }
    }
}

fn encode_command(
    text: &str,
    output_path: &Path,
    timing: TimingParameters,
    bits: u16,
    envelope: Envelope,
) -> Result<()> {
    let format = SampleFormat::from_bits(bits)
        .ok_or_else(|| CliError::Usage(format!("unsupported bit depth {bits}, use 8 or 16")))?;

    let synth = MorseSynthesizer::new(timing).with_envelope(envelope);
    let pcm = synth.generate(text.trim_end_matches(|c| c == '\r' || c == '\n'), format);
    info!(
        "{} wpm (spacing {} wpm), {} Hz tone, {} Hz sampling",
        timing.wpm(),
        timing.farnsworth_wpm(),
        timing.tone_hz(),
        timing.sample_rate()
    );

    fs::write(output_path, container::wrap(&pcm))?;
    println!(
        "Encoded {} samples ({:.2} s) to {}",
        pcm.len(),
        pcm.duration_secs(),
        output_path.display()
    );
    Ok(())
}

/// Read a mono integer or float WAV as normalized samples
fn read_wav(path: &Path) -> Result<(Vec<f32>, u32)> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();
    if spec.channels != 1 {
        return Err(CliError::Usage(format!("expected mono audio, got {} channels", spec.channels)));
    }
    info!(
        "Read WAV: {} Hz, {} channels, {} bits",
        spec.sample_rate, spec.channels, spec.bits_per_sample
    );

    let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Float, 32) => reader.samples::<f32>().collect::<std::result::Result<_, _>>()?,
        (hound::SampleFormat::Int, bits @ (8 | 16 | 24 | 32)) => {
            let scale = (1u64 << (bits - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()?
        }
        (_, bits) => return Err(CliError::Usage(format!("unsupported bit depth {bits}"))),
    };
    Ok((samples, spec.sample_rate))
}

fn decoder_config(
    sample_rate: u32,
    wpm_hint: Option<u32>,
    frequencies: Option<Vec<f32>>,
    config_path: Option<&Path>,
) -> Result<DecoderConfig> {
    let mut config = match config_path {
        Some(path) => {
            let mut config: DecoderConfig = serde_json::from_str(&fs::read_to_string(path)?)?;
            config.sample_rate = sample_rate;
            config
        }
        None => DecoderConfig::new(sample_rate),
    };
    if let Some(wpm) = wpm_hint {
        config = config.with_initial_wpm(wpm);
    }
    if let Some(frequencies) = frequencies {
        config = config.with_candidate_frequencies(&frequencies);
    }
    config.validate()?;
    Ok(config)
}

fn decode_command(
    input_path: &Path,
    wpm_hint: Option<u32>,
    frequencies: Option<Vec<f32>>,
    config_path: Option<&Path>,
    json: bool,
    with_events: bool,
) -> Result<()> {
    let (samples, sample_rate) = read_wav(input_path)?;
    let config = decoder_config(sample_rate, wpm_hint, frequencies, config_path)?;
    debug!("decoder config: {config:?}");

    let mut decoder = MorseDecoder::new(config, String::new())?;
    let events = Arc::new(Mutex::new(Vec::new()));
    if with_events {
        let log = events.clone();
        decoder.set_observer(move |event| {
            if let Ok(mut log) = log.lock() {
                log.push(event.clone());
            }
        });
    }

    decoder.process_buffer(&samples);
    decoder.flush();
    decoder.clear_observer();
    info!("Decoded {} samples", samples.len());

    let locked_frequency_hz = decoder.locked_frequency();
    let estimated_wpm = decoder.estimated_wpm();
    let unit_ms = decoder.unit_estimate_ms();
    let char_gap_ms = decoder.char_gap_ms();
    let text = decoder.into_sink().trim_end().to_string();

    if !json {
        println!("{text}");
        return Ok(());
    }

    let events = with_events.then(|| {
        events
            .lock()
            .map(|mut log| std::mem::take(&mut *log))
            .unwrap_or_default()
    });
    let report = DecodeReport {
        text,
        sample_rate,
        duration_secs: samples.len() as f64 / sample_rate as f64,
        locked_frequency_hz,
        estimated_wpm,
        unit_ms,
        char_gap_ms,
        events,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Reads stdin on its own thread and hands fixed-size frames to the decoder
/// through a bounded channel.
///
/// The thread ends at end of input, after exactly `limit` samples, or when
/// `stop` is raised; dropping the sender then lets the decoder drain every
/// frame already queued.
fn spawn_reader(
    format: RawFormat,
    frame_len: usize,
    limit: Option<u64>,
    sender: Sender<Vec<f32>>,
    stop: Arc<AtomicBool>,
) -> thread::JoinHandle<io::Result<u64>> {
    thread::spawn(move || {
        let stdin = io::stdin();
        let mut input = stdin.lock();
        let bytes_per_sample = format.bytes_per_sample();
        let mut bytes = Vec::with_capacity(frame_len * bytes_per_sample);
        let mut total = 0u64;

        while !stop.load(Ordering::Relaxed) {
            let wanted = limit.map_or(frame_len as u64, |limit| limit.saturating_sub(total).min(frame_len as u64));
            if wanted == 0 {
                debug!("time limit reached");
                break;
            }
            bytes.clear();
            let read = (&mut input)
                .take(wanted * bytes_per_sample as u64)
                .read_to_end(&mut bytes)?;
            if read == 0 {
                break;
            }
            let whole = read - read % bytes_per_sample;
            let frame = format.to_normalized(&bytes[..whole]);
            total += frame.len() as u64;
            if sender.send(frame).is_err() {
                break;
            }
        }
        Ok(total)
    })
}

fn listen_command(sample_rate: u32, format: RawFormat, wpm_hint: Option<u32>, seconds: Option<f64>) -> Result<()> {
    let config = decoder_config(sample_rate, wpm_hint, None, None)?;
    let frame_len = config.block_len();
    let limit = seconds.map(|s| (s.max(0.0) * sample_rate as f64) as u64);

    let stdout_sink = |ch: char| {
        let mut out = io::stdout().lock();
        let _ = write!(out, "{ch}");
        let _ = out.flush();
    };
    let mut stream = StreamDecoder::new(config, stdout_sink)?;

    let stop = Arc::new(AtomicBool::new(false));
    let (sender, receiver) = bounded::<Vec<f32>>(64);
    let reader = spawn_reader(format, frame_len, limit, sender, stop.clone());
    info!("listening: {sample_rate} Hz {format:?} on stdin");

    match run_capture(&mut stream, receiver.iter(), &stop) {
        CaptureOutcome::Stopped => {
            info!("capture cancelled");
            stream.finish();
        }
        CaptureOutcome::Exhausted => debug!("input closed"),
    }
    stop.store(true, Ordering::Relaxed);
    drop(receiver);
    println!();

    let total = reader
        .join()
        .map_err(|_| CliError::Usage("stdin reader panicked".into()))??;
    info!(
        "processed {} samples ({:.2} s)",
        total,
        total as f64 / sample_rate as f64
    );
    Ok(())
}

fn inspect_command(input_path: &Path) -> Result<()> {
    let bytes = fs::read(input_path)?;
    let (pcm, info) = container::unwrap(&bytes)?;
    let report = InspectReport {
        sample_rate: info.sample_rate,
        channels: info.channels,
        bits_per_sample: info.bits_per_sample,
        data_len: info.data_len,
        samples: pcm.len(),
        duration_secs: pcm.duration_secs(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
