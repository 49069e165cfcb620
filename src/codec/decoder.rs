//! Opus decoder adapter
//!
//! One decoder instance per client session. It is fixed at the 48 kHz /
//! stereo transport capability even when the negotiated signal is mono, so a
//! mid-stream quality change never forces a decoder reinitialization.

use opus::{Channels, Decoder};

use crate::config::FrameSize;
use crate::constants::{TRANSPORT_CHANNELS, TRANSPORT_SAMPLE_RATE};
use crate::error::CodecError;

/// Opus decoder fixed at the 48 kHz / stereo transport format
pub struct FrameDecoder {
    decoder: Decoder,
    /// Decoding buffer (reused to avoid allocations); sized for the largest
    /// legal frame
    decode_buffer: Vec<i16>,
}

impl FrameDecoder {
    pub fn new() -> Result<Self, CodecError> {
        let decoder = Decoder::new(TRANSPORT_SAMPLE_RATE, Channels::Stereo)
            .map_err(|e| CodecError::DecoderInit(e.to_string()))?;

        Ok(Self {
            decoder,
            decode_buffer: vec![0i16; 2880 * TRANSPORT_CHANNELS as usize],
        })
    }

    /// Decode one Opus payload into interleaved 16-bit transport PCM.
    ///
    /// Returns exactly `samples_per_channel * 2` samples for the frame the
    /// payload carries. Malformed payload is a recoverable error.
    pub fn decode(&mut self, payload: &[u8]) -> Result<Vec<i16>, CodecError> {
        let samples = self
            .decoder
            .decode(payload, &mut self.decode_buffer, false)
            .map_err(|e| CodecError::DecodingFailed(e.to_string()))?;

        Ok(self.decode_buffer[..samples * TRANSPORT_CHANNELS as usize].to_vec())
    }

    /// Packet loss concealment output for one lost frame
    pub fn decode_plc(&mut self, frame_size: FrameSize) -> Result<Vec<i16>, CodecError> {
        let wanted = frame_size.samples_per_frame();
        let samples = self
            .decoder
            .decode(&[], &mut self.decode_buffer[..wanted], false)
            .map_err(|e| CodecError::DecodingFailed(e.to_string()))?;

        Ok(self.decode_buffer[..samples * TRANSPORT_CHANNELS as usize].to_vec())
    }

    /// Reset decoder state, e.g. after a long gap
    pub fn reset(&mut self) -> Result<(), CodecError> {
        self.decoder
            .reset_state()
            .map_err(|e| CodecError::DecoderInit(e.to_string()))
    }
}

/// Framing metadata read off a raw Opus payload without touching decoder
/// state. Diagnostic only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacketInfo {
    pub bandwidth: opus::Bandwidth,
    /// Channels coded in the packet; may be 1 even on a stereo session when
    /// the encoder dropped to mono at low bitrate
    pub channels: u16,
    pub frames_per_packet: usize,
    /// Samples per channel in each frame, at the transport rate
    pub samples_per_frame: usize,
    /// Samples per channel in the whole packet
    pub samples_per_channel: usize,
}

impl PacketInfo {
    pub fn parse(payload: &[u8]) -> Result<Self, CodecError> {
        let bandwidth = opus::packet::get_bandwidth(payload)
            .map_err(|e| CodecError::MalformedPacket(e.to_string()))?;
        let channels = match opus::packet::get_nb_channels(payload)
            .map_err(|e| CodecError::MalformedPacket(e.to_string()))?
        {
            Channels::Mono => 1,
            Channels::Stereo => 2,
        };
        let frames_per_packet = opus::packet::get_nb_frames(payload)
            .map_err(|e| CodecError::MalformedPacket(e.to_string()))?;
        let samples_per_frame =
            opus::packet::get_samples_per_frame(payload, TRANSPORT_SAMPLE_RATE)
                .map_err(|e| CodecError::MalformedPacket(e.to_string()))?;
        let samples_per_channel = opus::packet::get_nb_samples(payload, TRANSPORT_SAMPLE_RATE)
            .map_err(|e| CodecError::MalformedPacket(e.to_string()))?;

        Ok(Self {
            bandwidth,
            channels,
            frames_per_packet,
            samples_per_frame,
            samples_per_channel,
        })
    }
}
