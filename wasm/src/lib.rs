use std::mem;

use morsewave_core::symbols::{pattern_to_text, text_to_pattern};
use morsewave_core::{
    container, decode_container, DecoderConfig, MorseSynthesizer, SampleFormat, StreamDecoder, TimingParameters,
};
use wasm_bindgen::prelude::*;

fn to_js(e: impl ToString) -> JsValue {
    JsValue::from_str(&e.to_string())
}

#[wasm_bindgen]
pub struct WasmEncoder {
    inner: MorseSynthesizer,
}

#[wasm_bindgen]
impl WasmEncoder {
    #[wasm_bindgen(constructor)]
    pub fn new(wpm: u32, farnsworth_wpm: u32, tone_hz: f32, sample_rate: u32) -> Result<WasmEncoder, JsValue> {
        TimingParameters::new(wpm, farnsworth_wpm, tone_hz, sample_rate)
            .map(|timing| WasmEncoder {
                inner: MorseSynthesizer::new(timing),
            })
            .map_err(to_js)
    }

    /// Render text as a Float32Array ready for an AudioBuffer
    #[wasm_bindgen]
    pub fn encode(&self, text: &str) -> Vec<f32> {
        self.inner.render(text)
    }

    /// Render text as WAV bytes with 8 or 16 bits per sample
    #[wasm_bindgen(js_name = encodeWav)]
    pub fn encode_wav(&self, text: &str, bits_per_sample: u16) -> Result<Vec<u8>, JsValue> {
        let format = SampleFormat::from_bits(bits_per_sample)
            .ok_or_else(|| to_js(format!("unsupported bit depth {bits_per_sample}")))?;
        Ok(container::wrap(&self.inner.generate(text, format)))
    }

    #[wasm_bindgen(getter, js_name = sampleRate)]
    pub fn sample_rate(&self) -> u32 {
        self.inner.timing().sample_rate()
    }
}

/// Live decoder for microphone blocks of any size
#[wasm_bindgen]
pub struct WasmDecoder {
    inner: StreamDecoder<String>,
}

#[wasm_bindgen]
impl WasmDecoder {
    #[wasm_bindgen(constructor)]
    pub fn new(sample_rate: u32, initial_wpm: Option<u32>) -> Result<WasmDecoder, JsValue> {
        let mut config = DecoderConfig::new(sample_rate);
        if let Some(wpm) = initial_wpm {
            config = config.with_initial_wpm(wpm);
        }
        StreamDecoder::new(config, String::new())
            .map(|inner| WasmDecoder { inner })
            .map_err(to_js)
    }

    /// Feed samples; returns the characters recognized since the last call
    #[wasm_bindgen]
    pub fn push(&mut self, samples: &[f32]) -> String {
        self.inner.push(samples);
        self.drain()
    }

    /// End of input: returns the final characters including the trailing space
    #[wasm_bindgen]
    pub fn finish(&mut self) -> String {
        self.inner.finish();
        self.drain()
    }

    #[wasm_bindgen]
    pub fn reset(&mut self) {
        self.inner.reset();
        self.inner.decoder_mut().sink_mut().clear();
    }

    #[wasm_bindgen(getter, js_name = lockedFrequency)]
    pub fn locked_frequency(&self) -> Option<f32> {
        self.inner.decoder().locked_frequency()
    }

    #[wasm_bindgen(getter, js_name = estimatedWpm)]
    pub fn estimated_wpm(&self) -> f64 {
        self.inner.decoder().estimated_wpm()
    }

    fn drain(&mut self) -> String {
        mem::take(self.inner.decoder_mut().sink_mut())
    }
}

/// Decode WAV bytes produced by `encodeWav` in one call
#[wasm_bindgen(js_name = decodeWav)]
pub fn decode_wav(bytes: &[u8]) -> Result<String, JsValue> {
    decode_container(bytes).map_err(to_js)
}

#[wasm_bindgen(js_name = textToMorse)]
pub fn text_to_morse(text: &str) -> String {
    text_to_pattern(text)
}

#[wasm_bindgen(js_name = morseToText)]
pub fn morse_to_text(notation: &str) -> String {
    pattern_to_text(notation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_drains_incrementally() {
        let encoder = WasmEncoder::new(20, 20, 700.0, 8000).unwrap();
        let samples = encoder.encode("TEST");
        let mut decoder = WasmDecoder::new(8000, None).unwrap();

        let mut text = String::new();
        for block in samples.chunks(512) {
            text.push_str(&decoder.push(block));
        }
        text.push_str(&decoder.finish());

        assert_eq!(text, "TEST ");
        assert_eq!(decoder.finish(), "");
        assert_eq!(decoder.locked_frequency(), Some(700.0));
    }

    #[test]
    fn test_notation_both_ways() {
        let notation = text_to_morse("CQ DE");
        assert_eq!(notation, "-.-. --.- / -.. .");
        assert_eq!(morse_to_text(&notation), "CQ DE");
    }
}
