//! Finalized audio payload
//!
//! Buffered PCM chunks are concatenated and wrapped in a WAV container, the
//! format the identification service expects for `recorded_audio.wav`.

use super::source::{AudioChunk, CaptureFormat};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::Cursor;
use std::time::Duration;

/// MIME type of every payload
pub const PAYLOAD_MIME: &str = "audio/wav";

/// File name used when the payload is uploaded
pub const PAYLOAD_FILE_NAME: &str = "recorded_audio.wav";

/// One finished recording, ready for submission
#[derive(Debug, Clone)]
pub struct AudioPayload {
    /// Complete WAV file (header + data)
    pub bytes: Vec<u8>,
    pub format: CaptureFormat,
    /// Total samples across all channels
    pub sample_count: usize,
}

impl AudioPayload {
    /// Wrap chunks into a 16-bit PCM WAV payload
    pub fn from_chunks(format: CaptureFormat, chunks: &[AudioChunk]) -> Result<Self, hound::Error> {
        let spec = WavSpec {
            channels: format.channels,
            sample_rate: format.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::new());
        let mut sample_count = 0usize;
        {
            let mut writer = WavWriter::new(&mut cursor, spec)?;
            for chunk in chunks {
                for &sample in chunk {
                    writer.write_sample(sample)?;
                }
                sample_count += chunk.len();
            }
            writer.finalize()?;
        }

        Ok(Self {
            bytes: cursor.into_inner(),
            format,
            sample_count,
        })
    }

    pub fn mime(&self) -> &'static str {
        PAYLOAD_MIME
    }

    pub fn file_name(&self) -> &'static str {
        PAYLOAD_FILE_NAME
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sample_count == 0
    }

    /// Audio duration implied by the sample count
    pub fn audio_duration(&self) -> Duration {
        let frames_per_second =
            self.format.sample_rate as u64 * self.format.channels.max(1) as u64;
        if frames_per_second == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.sample_count as f64 / frames_per_second as f64)
    }
}
