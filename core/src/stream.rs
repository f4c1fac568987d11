use std::sync::atomic::{AtomicBool, Ordering};

use log::debug;

use crate::config::DecoderConfig;
use crate::container;
use crate::decoder::{CharSink, MorseDecoder};
use crate::error::Result;
use crate::pcm::PcmBuffer;

/// Feeds a [`MorseDecoder`] from pushes of any size.
///
/// Samples are buffered until a full analysis block is available, so the
/// decoder sees the same block boundaries no matter how the input was
/// chunked. [`finish`](Self::finish) handles the short tail and flushes.
pub struct StreamDecoder<S: CharSink = String> {
    decoder: MorseDecoder<S>,
    pending: Vec<f32>,
}

impl<S: CharSink> StreamDecoder<S> {
    pub fn new(config: DecoderConfig, sink: S) -> Result<Self> {
        let decoder = MorseDecoder::new(config, sink)?;
        Ok(Self {
            pending: Vec::with_capacity(decoder.block_len()),
            decoder,
        })
    }

    pub fn push(&mut self, samples: &[f32]) {
        let block_len = self.decoder.block_len();
        let mut rest = samples;

        if !self.pending.is_empty() {
            let needed = block_len - self.pending.len();
            let take = needed.min(rest.len());
            self.pending.extend_from_slice(&rest[..take]);
            rest = &rest[take..];
            if self.pending.len() < block_len {
                return;
            }
            self.decoder.process_block(&self.pending);
            self.pending.clear();
        }

        let whole = rest.len() - rest.len() % block_len;
        self.decoder.process_buffer(&rest[..whole]);
        self.pending.extend_from_slice(&rest[whole..]);
    }

    /// Process the buffered tail (a short block) and flush the decoder
    pub fn finish(&mut self) {
        if !self.pending.is_empty() {
            self.decoder.process_block(&self.pending);
            self.pending.clear();
        }
        self.decoder.flush();
    }

    pub fn reset(&mut self) {
        self.pending.clear();
        self.decoder.reset();
    }

    /// Samples buffered but not yet analysed
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    pub fn decoder(&self) -> &MorseDecoder<S> {
        &self.decoder
    }

    pub fn decoder_mut(&mut self) -> &mut MorseDecoder<S> {
        &mut self.decoder
    }

    pub fn into_sink(self) -> S {
        self.decoder.into_sink()
    }
}

/// Why [`run_capture`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// The stop flag was raised; the decoder was not flushed
    Stopped,
    /// The source ran dry; the decoder was finished
    Exhausted,
}

/// Drive `stream` from a source of sample blocks until the source ends or
/// `stop` is raised.
///
/// The flag is checked before each block, so cancellation takes effect
/// within one block of latency. A stopped session keeps its state and can
/// be resumed or finished by the caller.
pub fn run_capture<S, I>(stream: &mut StreamDecoder<S>, blocks: I, stop: &AtomicBool) -> CaptureOutcome
where
    S: CharSink,
    I: IntoIterator,
    I::Item: AsRef<[f32]>,
{
    for block in blocks {
        if stop.load(Ordering::Relaxed) {
            debug!("capture stopped after {} samples", stream.decoder().state().samples_processed());
            return CaptureOutcome::Stopped;
        }
        stream.push(block.as_ref());
    }
    stream.finish();
    CaptureOutcome::Exhausted
}

/// Decode normalized samples in one go.
///
/// The trailing word break emitted by the final flush is trimmed.
pub fn decode_samples(samples: &[f32], config: DecoderConfig) -> Result<String> {
    let mut decoder = MorseDecoder::new(config, String::new())?;
    decoder.process_buffer(samples);
    decoder.flush();
    let mut text = decoder.into_sink();
    text.truncate(text.trim_end().len());
    Ok(text)
}

/// Decode a PCM buffer with default tuning for its sample rate
pub fn decode_pcm(pcm: &PcmBuffer) -> Result<String> {
    decode_samples(&pcm.to_normalized(), DecoderConfig::new(pcm.sample_rate))
}

/// Decode container bytes as produced by [`container::wrap`]
pub fn decode_container(bytes: &[u8]) -> Result<String> {
    let (pcm, _) = container::unwrap(bytes)?;
    decode_pcm(&pcm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::MorseSynthesizer;
    use crate::timing::TimingParameters;

    fn render(text: &str, wpm: u32, sample_rate: u32) -> Vec<f32> {
        let timing = TimingParameters::new(wpm, wpm, 700.0, sample_rate).unwrap();
        MorseSynthesizer::new(timing).render(text)
    }

    #[test]
    fn test_chunking_does_not_change_output() {
        let samples = render("CQ DE", 20, 8000);
        let expected = decode_samples(&samples, DecoderConfig::new(8000)).unwrap();
        assert_eq!(expected, "CQ DE");

        for chunk in [1, 7, 80, 333, 4096] {
            let mut stream = StreamDecoder::new(DecoderConfig::new(8000), String::new()).unwrap();
            for piece in samples.chunks(chunk) {
                stream.push(piece);
            }
            stream.finish();
            assert_eq!(stream.into_sink().trim_end(), expected, "chunk size {chunk}");
        }
    }

    #[test]
    fn test_tail_block_is_buffered_until_finish() {
        let mut stream = StreamDecoder::new(DecoderConfig::new(8000), String::new()).unwrap();
        stream.push(&[0.0; 50]);
        assert_eq!(stream.buffered(), 50);
        assert_eq!(stream.decoder().state().samples_processed(), 0);
        stream.push(&[0.0; 50]);
        assert_eq!(stream.buffered(), 20);
        assert_eq!(stream.decoder().state().samples_processed(), 80);
        stream.finish();
        assert_eq!(stream.buffered(), 0);
        assert_eq!(stream.decoder().state().samples_processed(), 100);
    }

    #[test]
    fn test_capture_runs_to_exhaustion() {
        let samples = render("TEST", 20, 8000);
        let blocks: Vec<Vec<f32>> = samples.chunks(256).map(|c| c.to_vec()).collect();
        let stop = AtomicBool::new(false);

        let mut stream = StreamDecoder::new(DecoderConfig::new(8000), String::new()).unwrap();
        assert_eq!(run_capture(&mut stream, &blocks, &stop), CaptureOutcome::Exhausted);
        assert_eq!(stream.into_sink(), "TEST ");
    }

    #[test]
    fn test_capture_honours_stop_flag() {
        let samples = render("TEST", 20, 8000);
        let stop = AtomicBool::new(false);
        let mut fed = 0;

        let mut stream = StreamDecoder::new(DecoderConfig::new(8000), String::new()).unwrap();
        let blocks = samples.chunks(80).inspect(|_| {
            fed += 1;
            if fed == 10 {
                stop.store(true, Ordering::Relaxed);
            }
        });
        assert_eq!(run_capture(&mut stream, blocks, &stop), CaptureOutcome::Stopped);
        assert_eq!(stream.decoder().state().samples_processed(), 9 * 80);
    }

    #[test]
    fn test_decode_container_bytes() {
        let timing = TimingParameters::new(20, 20, 600.0, 8000).unwrap();
        let bytes = MorseSynthesizer::new(timing)
            .generate_container("73", crate::pcm::SampleFormat::U8);
        assert_eq!(decode_container(&bytes).unwrap(), "73");
        assert!(decode_container(&bytes[..20]).is_err());
    }
}
