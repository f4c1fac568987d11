//! Canonical 44-byte RIFF/WAVE header for mono linear PCM.
//!
//! Layout (all fields little-endian):
//!
//! ```text
//!  0  "RIFF"          4  file length - 8     8  "WAVE"
//! 12  "fmt "         16  fmt length (16)    20  encoding (1 = PCM)
//! 22  channels       24  sample rate        28  byte rate
//! 32  block align    34  bits per sample    36  "data"
//! 40  data length    44  samples...
//! ```

use crate::error::{FormatError, Result};
use crate::pcm::{PcmBuffer, PcmSamples, SampleFormat};

pub const HEADER_LEN: usize = 44;

const PCM_ENCODING: u16 = 1;
const FMT_CHUNK_LEN: u32 = 16;

/// Header fields reported by [`unwrap`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    /// Bytes of sample data actually present after the header
    pub data_len: usize,
}

/// Prefix `pcm` with a mono header describing its rate and sample width
pub fn wrap(pcm: &PcmBuffer) -> Vec<u8> {
    let format = pcm.format();
    let bytes_per_sample = format.bytes_per_sample() as u32;
    let data_len = (pcm.len() as u32).saturating_mul(bytes_per_sample);

    let mut bytes = Vec::with_capacity(HEADER_LEN + data_len as usize);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&data_len.saturating_add(36).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&FMT_CHUNK_LEN.to_le_bytes());
    bytes.extend_from_slice(&PCM_ENCODING.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&pcm.sample_rate.to_le_bytes());
    bytes.extend_from_slice(&pcm.sample_rate.saturating_mul(bytes_per_sample).to_le_bytes());
    bytes.extend_from_slice(&(bytes_per_sample as u16).to_le_bytes());
    bytes.extend_from_slice(&format.bits_per_sample().to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());

    match &pcm.samples {
        PcmSamples::U8(samples) => bytes.extend_from_slice(samples),
        PcmSamples::I16(samples) => {
            for sample in samples {
                bytes.extend_from_slice(&sample.to_le_bytes());
            }
        }
    }

    bytes
}

/// Parse a container produced by [`wrap`] (or any canonical mono PCM file).
///
/// A declared data length larger than what is present is clamped to the
/// bytes actually available; a dangling half sample is ignored.
pub fn unwrap(bytes: &[u8]) -> Result<(PcmBuffer, ContainerInfo)> {
    if bytes.len() < HEADER_LEN {
        return Err(FormatError::Truncated { len: bytes.len() }.into());
    }

    expect_tag(bytes, 0, "RIFF")?;
    expect_tag(bytes, 8, "WAVE")?;
    expect_tag(bytes, 12, "fmt ")?;
    expect_tag(bytes, 36, "data")?;

    let encoding = read_u16(bytes, 20);
    if encoding != PCM_ENCODING {
        return Err(FormatError::UnsupportedEncoding(encoding).into());
    }
    let channels = read_u16(bytes, 22);
    if channels != 1 {
        return Err(FormatError::UnsupportedChannels(channels).into());
    }
    let sample_rate = read_u32(bytes, 24);
    if sample_rate == 0 {
        return Err(FormatError::InvalidSampleRate.into());
    }
    let bits_per_sample = read_u16(bytes, 34);
    let format = SampleFormat::from_bits(bits_per_sample)
        .ok_or(FormatError::UnsupportedBitsPerSample(bits_per_sample))?;

    let declared = read_u32(bytes, 40) as usize;
    let available = bytes.len() - HEADER_LEN;
    let data_len = declared.min(available);
    let data = &bytes[HEADER_LEN..HEADER_LEN + data_len];

    let samples = match format {
        SampleFormat::U8 => PcmSamples::U8(data.to_vec()),
        SampleFormat::I16 => PcmSamples::I16(
            data.chunks_exact(2)
                .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
                .collect(),
        ),
    };

    let info = ContainerInfo {
        sample_rate,
        channels,
        bits_per_sample,
        data_len,
    };
    Ok((
        PcmBuffer {
            sample_rate,
            samples,
        },
        info,
    ))
}

fn expect_tag(bytes: &[u8], offset: usize, tag: &'static str) -> Result<()> {
    if &bytes[offset..offset + 4] != tag.as_bytes() {
        return Err(FormatError::BadTag {
            expected: tag,
            offset,
        }
        .into());
    }
    Ok(())
}

fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MorseError;

    fn sample_buffer(format: SampleFormat) -> PcmBuffer {
        PcmBuffer::from_normalized(&[0.0, 0.5, -0.5, 1.0, -1.0], 8000, format)
    }

    #[test]
    fn test_header_fields_16_bit() {
        let bytes = wrap(&sample_buffer(SampleFormat::I16));
        assert_eq!(bytes.len(), HEADER_LEN + 10);
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(read_u32(&bytes, 4), 36 + 10);
        assert_eq!(read_u16(&bytes, 22), 1);
        assert_eq!(read_u32(&bytes, 24), 8000);
        assert_eq!(read_u32(&bytes, 28), 16000);
        assert_eq!(read_u16(&bytes, 32), 2);
        assert_eq!(read_u16(&bytes, 34), 16);
        assert_eq!(read_u32(&bytes, 40), 10);
    }

    #[test]
    fn test_header_fields_8_bit() {
        let bytes = wrap(&sample_buffer(SampleFormat::U8));
        assert_eq!(bytes.len(), HEADER_LEN + 5);
        assert_eq!(read_u32(&bytes, 28), 8000);
        assert_eq!(read_u16(&bytes, 32), 1);
        assert_eq!(read_u16(&bytes, 34), 8);
        assert_eq!(bytes[HEADER_LEN], 128);
    }

    #[test]
    fn test_unwrap_restores_samples() {
        for format in [SampleFormat::U8, SampleFormat::I16] {
            let original = sample_buffer(format);
            let (pcm, info) = unwrap(&wrap(&original)).unwrap();
            assert_eq!(pcm, original);
            assert_eq!(info.channels, 1);
            assert_eq!(info.sample_rate, 8000);
            assert_eq!(info.bits_per_sample, format.bits_per_sample());
        }
    }

    #[test]
    fn test_rejects_short_input() {
        let bytes = wrap(&sample_buffer(SampleFormat::I16));
        for len in [0, 10, HEADER_LEN - 1] {
            match unwrap(&bytes[..len]) {
                Err(MorseError::Format(FormatError::Truncated { len: reported })) => {
                    assert_eq!(reported, len)
                }
                other => panic!("expected truncation error, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_rejects_stereo() {
        let mut bytes = wrap(&sample_buffer(SampleFormat::I16));
        bytes[22..24].copy_from_slice(&2u16.to_le_bytes());
        assert!(matches!(
            unwrap(&bytes),
            Err(MorseError::Format(FormatError::UnsupportedChannels(2)))
        ));
    }

    #[test]
    fn test_rejects_bad_tags_and_widths() {
        let mut bytes = wrap(&sample_buffer(SampleFormat::I16));
        bytes[8] = b'X';
        assert!(matches!(
            unwrap(&bytes),
            Err(MorseError::Format(FormatError::BadTag { offset: 8, .. }))
        ));

        let mut bytes = wrap(&sample_buffer(SampleFormat::I16));
        bytes[34..36].copy_from_slice(&24u16.to_le_bytes());
        assert!(matches!(
            unwrap(&bytes),
            Err(MorseError::Format(FormatError::UnsupportedBitsPerSample(24)))
        ));
    }

    #[test]
    fn test_clamps_declared_length() {
        let mut bytes = wrap(&sample_buffer(SampleFormat::I16));
        bytes.truncate(HEADER_LEN + 5);
        let (pcm, info) = unwrap(&bytes).unwrap();
        assert_eq!(info.data_len, 5);
        assert_eq!(pcm.len(), 2);
    }

    #[test]
    fn test_byte_rate_saturates() {
        let pcm = PcmBuffer::from_normalized(&[0.25], u32::MAX, SampleFormat::I16);
        let bytes = wrap(&pcm);
        assert_eq!(read_u32(&bytes, 24), u32::MAX);
        assert_eq!(read_u32(&bytes, 28), u32::MAX);
    }

    #[test]
    fn test_header_only_is_empty_audio() {
        let empty = PcmBuffer::from_normalized(&[], 16000, SampleFormat::I16);
        let bytes = wrap(&empty);
        assert_eq!(bytes.len(), HEADER_LEN);
        let (pcm, _) = unwrap(&bytes).unwrap();
        assert!(pcm.is_empty());
    }
}
