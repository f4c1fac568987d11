use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};

use morsewave_core::{MorseSynthesizer, TimingParameters};

fn binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_morsewave"))
}

fn tmp_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("morsewave-cli-tests");
    fs::create_dir_all(&dir).expect("Failed to create temp dir");
    dir.join(name)
}

fn run_morsewave(args: &[&str]) -> Output {
    Command::new(binary())
        .args(args)
        .output()
        .expect("Failed to execute morsewave")
}

fn stdout_of(output: &Output) -> String {
    assert!(
        output.status.success(),
        "morsewave failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn encode(text: &str, name: &str, extra: &[&str]) -> PathBuf {
    let wav = tmp_path(name);
    let mut args = vec!["encode", text, "--output", wav.to_str().unwrap()];
    args.extend_from_slice(extra);
    let output = stdout_of(&run_morsewave(&args));
    assert!(output.contains("Encoded"), "unexpected output: {output}");
    wav
}

#[test]
fn test_encode_then_decode() {
    let wav = encode("CQ DE K1ABC", "round_trip.wav", &[]);

    // 16 kHz, 16-bit: a few seconds of audio plus the 44-byte header
    let size = fs::metadata(&wav).expect("Output file not created").len();
    assert!(size > 50_000 && size < 500_000, "unexpected size: {size} bytes");

    let text = stdout_of(&run_morsewave(&["decode", wav.to_str().unwrap()]));
    assert_eq!(text.trim(), "CQ DE K1ABC");
}

#[test]
fn test_encode_from_file() {
    let input = tmp_path("message.txt");
    fs::write(&input, "73 GL\n").unwrap();
    let wav = tmp_path("from_file.wav");

    stdout_of(&run_morsewave(&[
        "encode",
        "--input",
        input.to_str().unwrap(),
        "--output",
        wav.to_str().unwrap(),
        "--tone",
        "600",
    ]));
    let text = stdout_of(&run_morsewave(&["decode", wav.to_str().unwrap()]));
    assert_eq!(text.trim(), "73 GL");
}

#[test]
fn test_decode_json_report() {
    let wav = encode("TEST", "json_report.wav", &["--tone", "800", "--sample-rate", "8000"]);

    let output = stdout_of(&run_morsewave(&["decode", wav.to_str().unwrap(), "--json", "--events"]));
    let report: serde_json::Value = serde_json::from_str(&output).expect("report is not JSON");
    assert_eq!(report["text"], "TEST");
    assert_eq!(report["sample_rate"], 8000);
    assert_eq!(report["locked_frequency_hz"], 800.0);
    let wpm = report["estimated_wpm"].as_f64().unwrap();
    assert!((wpm - 20.0).abs() < 1.5, "estimated wpm {wpm}");
    // the last element's 60 ms gap plus 3 more dots between letters
    let char_gap = report["char_gap_ms"].as_f64().unwrap();
    assert!((char_gap - 240.0).abs() < 20.0, "character gap {char_gap} ms");
    assert!(!report["events"].as_array().unwrap().is_empty());
}

#[test]
fn test_slow_speed_without_hint() {
    let wav = encode("PARIS", "slow.wav", &["--wpm", "10"]);
    let path = wav.to_str().unwrap();

    let measured = stdout_of(&run_morsewave(&["decode", path]));
    assert_eq!(measured.trim(), "PARIS");

    let hinted = stdout_of(&run_morsewave(&["decode", path, "--wpm-hint", "10"]));
    assert_eq!(hinted.trim(), "PARIS");

    let config = tmp_path("slow_config.json");
    fs::write(&config, r#"{ "initial_wpm": 10, "candidate_frequencies": [700.0] }"#).unwrap();
    let configured = stdout_of(&run_morsewave(&["decode", path, "--config", config.to_str().unwrap()]));
    assert_eq!(configured.trim(), "PARIS");
}

#[test]
fn test_eight_bit_output_and_inspect() {
    let wav = encode("E", "eight_bit.wav", &["--bits", "8", "--sample-rate", "8000", "--envelope", "linear"]);

    let output = stdout_of(&run_morsewave(&["inspect", wav.to_str().unwrap()]));
    let info: serde_json::Value = serde_json::from_str(&output).expect("inspect output is not JSON");
    assert_eq!(info["bits_per_sample"], 8);
    assert_eq!(info["channels"], 1);
    assert_eq!(info["sample_rate"], 8000);
    // one dot, its gap and the character gap: 5 dots of 60 ms
    assert_eq!(info["samples"], 2400);

    let text = stdout_of(&run_morsewave(&["decode", wav.to_str().unwrap()]));
    assert_eq!(text.trim(), "E");
}

#[test]
fn test_morse_notation() {
    let output = stdout_of(&run_morsewave(&["morse", "SOS sos"]));
    assert_eq!(output.trim(), "... --- ... / ... --- ...");

    let text = stdout_of(&run_morsewave(&["morse", "--decode", "... --- ... / .... .."]));
    assert_eq!(text.trim(), "SOS HI");
}

fn pcm16(text: &str) -> Vec<u8> {
    let timing = TimingParameters::new(20, 20, 700.0, 8000).unwrap();
    MorseSynthesizer::new(timing)
        .render(text)
        .iter()
        .flat_map(|&s| ((s * 32767.0) as i16).to_le_bytes())
        .collect()
}

fn listen(args: &[&str], bytes: &[u8]) -> Output {
    let mut child = Command::new(binary())
        .arg("listen")
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn morsewave");
    {
        let mut stdin = child.stdin.take().unwrap();
        // the reader may stop early once its time limit is reached
        let _ = stdin.write_all(bytes);
    }
    child.wait_with_output().unwrap()
}

#[test]
fn test_listen_on_stdin() {
    let output = listen(&["--sample-rate", "8000"], &pcm16("HELLO"));
    assert_eq!(stdout_of(&output).trim(), "HELLO");
}

#[test]
fn test_listen_stops_after_time_limit() {
    // "HELLO" takes 3.42 s at 20 wpm and "WORLD" starts a second later
    let mut bytes = pcm16("HELLO");
    bytes.extend(vec![0u8; 8000 * 2]);
    bytes.extend(pcm16("WORLD"));

    let output = listen(&["--sample-rate", "8000", "--seconds", "4"], &bytes);
    assert_eq!(stdout_of(&output).trim(), "HELLO");
}

#[test]
fn test_errors_exit_non_zero() {
    let missing = run_morsewave(&["decode", "/nonexistent/input.wav"]);
    assert!(!missing.status.success());

    let wav = tmp_path("bad_bits.wav");
    let bad_bits = run_morsewave(&["encode", "E", "--output", wav.to_str().unwrap(), "--bits", "12"]);
    assert!(!bad_bits.status.success());
    assert!(String::from_utf8_lossy(&bad_bits.stderr).contains("bit depth"));

    let bad_speed = run_morsewave(&["encode", "E", "--output", wav.to_str().unwrap(), "--wpm", "0"]);
    assert!(!bad_speed.status.success());

    let garbage = tmp_path("garbage.wav");
    fs::write(&garbage, b"not a wav file at all").unwrap();
    assert!(!run_morsewave(&["inspect", garbage.to_str().unwrap()]).status.success());
}
