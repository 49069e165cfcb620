//! Opus codec adapters
//!
//! Transport audio is always 48 kHz stereo 16-bit PCM regardless of the host
//! engine's format; the adapters here enforce that contract and keep the
//! codec instances private to their owning pipeline.

pub mod decoder;
pub mod encoder;

pub use decoder::{FrameDecoder, PacketInfo};
pub use encoder::{EncoderTuning, FrameEncoder};

/// Convert interleaved f32 PCM in [-1, 1] to 16-bit PCM, reusing `dst`
pub fn f32_to_i16_into(src: &[f32], dst: &mut Vec<i16>) {
    dst.clear();
    dst.extend(
        src.iter()
            .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16),
    );
}

/// Convert interleaved 16-bit PCM back to f32 in [-1, 1], reusing `dst`
pub fn i16_to_f32_into(src: &[i16], dst: &mut Vec<f32>) {
    dst.clear();
    dst.extend(src.iter().map(|&s| f32::from(s) / 32_768.0));
}
