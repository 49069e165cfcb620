//! Opus encoder adapter
//!
//! One encoder instance per source session, created at stream start and
//! dropped at stream stop. The application hint is fixed at creation;
//! bitrate, complexity and rate control stay adjustable while encoding.

use bytes::Bytes;
use opus::{Application, Bitrate, Channels, Encoder};

use crate::config::{CodecApplication, FrameSize, RateControl, SourceConfig};
use crate::constants::{ENCODE_BUFFER_SIZE, TRANSPORT_SAMPLE_RATE};
use crate::error::CodecError;

/// Encoder parameters that may change while a session runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderTuning {
    pub bitrate_kbps: u32,
    pub complexity: u8,
    pub rate_control: RateControl,
}

impl From<&SourceConfig> for EncoderTuning {
    fn from(config: &SourceConfig) -> Self {
        Self {
            bitrate_kbps: config.bitrate_kbps,
            complexity: config.complexity,
            rate_control: config.rate_control,
        }
    }
}

/// Opus encoder fixed at the 48 kHz / stereo transport format
pub struct FrameEncoder {
    encoder: Encoder,
    frame_size: FrameSize,
    /// Encoding buffer (reused to avoid allocations)
    encode_buffer: Vec<u8>,
}

impl FrameEncoder {
    pub fn new(
        frame_size: FrameSize,
        application: CodecApplication,
        tuning: EncoderTuning,
    ) -> Result<Self, CodecError> {
        let application = match application {
            CodecApplication::Audio => Application::Audio,
            CodecApplication::LowDelay => Application::LowDelay,
            CodecApplication::Voip => Application::Voip,
        };

        let mut encoder = Encoder::new(TRANSPORT_SAMPLE_RATE, Channels::Stereo, application)
            .map_err(|e| CodecError::EncoderInit(e.to_string()))?;

        encoder
            .set_inband_fec(true)
            .map_err(|e| CodecError::EncoderInit(format!("Failed to set FEC: {}", e)))?;

        let mut this = Self {
            encoder,
            frame_size,
            encode_buffer: vec![0u8; ENCODE_BUFFER_SIZE],
        };
        this.apply(tuning)?;
        Ok(this)
    }

    /// Encode one frame of interleaved 16-bit transport PCM.
    ///
    /// Input length must be exactly `frame_size * 2` samples.
    pub fn encode(&mut self, pcm: &[i16]) -> Result<Bytes, CodecError> {
        if pcm.len() != self.samples_per_frame() {
            return Err(CodecError::InvalidFrameSize(pcm.len()));
        }

        let size = self
            .encoder
            .encode(pcm, &mut self.encode_buffer)
            .map_err(|e| CodecError::EncodingFailed(e.to_string()))?;

        Ok(Bytes::copy_from_slice(&self.encode_buffer[..size]))
    }

    /// Apply the latest tuning to the live encoder
    pub fn apply(&mut self, tuning: EncoderTuning) -> Result<(), CodecError> {
        self.encoder
            .set_bitrate(Bitrate::Bits(tuning.bitrate_kbps as i32 * 1000))
            .map_err(|e| CodecError::EncoderInit(format!("Failed to set bitrate: {}", e)))?;

        self.encoder
            .set_complexity(i32::from(tuning.complexity))
            .map_err(|e| CodecError::EncoderInit(format!("Failed to set complexity: {}", e)))?;

        let (vbr, constrained) = match tuning.rate_control {
            RateControl::Cbr => (false, false),
            RateControl::Vbr => (true, false),
            RateControl::ConstrainedVbr => (true, true),
        };
        self.encoder
            .set_vbr(vbr)
            .map_err(|e| CodecError::EncoderInit(format!("Failed to set VBR: {}", e)))?;
        self.encoder
            .set_vbr_constraint(constrained)
            .map_err(|e| CodecError::EncoderInit(format!("Failed to set CVBR: {}", e)))?;

        Ok(())
    }

    /// Frame size in samples per channel
    pub fn frame_size(&self) -> FrameSize {
        self.frame_size
    }

    /// Total interleaved samples expected per frame
    pub fn samples_per_frame(&self) -> usize {
        self.frame_size.samples_per_frame()
    }
}
