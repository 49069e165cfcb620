//! Session negotiation header
//!
//! Every packet a source emits starts with a small self-describing header
//! carrying the host engine's format: `[total][len]sample_rate[len]channels
//! [len]endianness`, each field prefixed by its byte length and the whole
//! header prefixed by its own total length. Integer fields travel in the
//! sender's native byte order; the trailing flag lets the receiver reverse
//! them when the hosts disagree.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::HeaderError;

/// Audio format of the host engine driving a pipeline, as injected by the
/// embedding application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostAudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Sender-negotiated session parameters, serialized into the packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Host engine sample rate on the source side. Informational for the
    /// receiver; transport audio is always encoded at the fixed Opus rate.
    pub sample_rate: u32,
    /// Host engine channel count on the source side
    pub channels: u32,
    /// Byte order of the sender's integer fields
    pub little_endian: bool,
}

impl SessionConfig {
    /// Capture the local host format and byte order
    pub fn from_host(format: HostAudioFormat) -> Self {
        Self {
            sample_rate: format.sample_rate,
            channels: u32::from(format.channels),
            little_endian: cfg!(target_endian = "little"),
        }
    }

    /// Serialize the header. The integer fields are written in the byte
    /// order the `little_endian` flag declares.
    pub fn encode(&self) -> Bytes {
        let mut rate = self.sample_rate.to_ne_bytes();
        let mut channels = self.channels.to_ne_bytes();
        if self.little_endian != cfg!(target_endian = "little") {
            rate.reverse();
            channels.reverse();
        }

        let total = 1 + (1 + rate.len()) + (1 + channels.len()) + (1 + 1);
        let mut buf = BytesMut::with_capacity(total);
        buf.put_u8(total as u8);
        buf.put_u8(rate.len() as u8);
        buf.put_slice(&rate);
        buf.put_u8(channels.len() as u8);
        buf.put_slice(&channels);
        buf.put_u8(1);
        buf.put_u8(u8::from(self.little_endian));
        buf.freeze()
    }

    /// Parse a header from the start of `packet`.
    ///
    /// Returns the config together with the declared header length, which is
    /// the offset of the audio payload within the packet. Multi-byte integer
    /// fields are byte-reversed when the sender's endianness differs from
    /// this target's.
    pub fn decode(packet: &[u8]) -> Result<(Self, usize), HeaderError> {
        let total = *packet.first().ok_or(HeaderError::Truncated { want: 1, got: 0 })? as usize;
        if total <= 1 {
            return Err(HeaderError::BadLength(total));
        }
        if packet.len() < total {
            return Err(HeaderError::Truncated {
                want: total,
                got: packet.len(),
            });
        }

        fn field<'a>(
            packet: &'a [u8],
            cursor: &mut usize,
            total: usize,
            want: usize,
        ) -> Result<&'a [u8], HeaderError> {
            if *cursor >= total {
                return Err(HeaderError::BadLength(total));
            }
            let len = packet[*cursor] as usize;
            if len != want {
                return Err(HeaderError::BadFieldLength { want, got: len });
            }
            *cursor += 1;
            if *cursor + len > total {
                return Err(HeaderError::BadLength(total));
            }
            let bytes = &packet[*cursor..*cursor + len];
            *cursor += len;
            Ok(bytes)
        }

        let mut cursor = 1;
        let b = field(packet, &mut cursor, total, 4)?;
        let mut rate = [b[0], b[1], b[2], b[3]];
        let b = field(packet, &mut cursor, total, 4)?;
        let mut channels = [b[0], b[1], b[2], b[3]];
        let little_endian = field(packet, &mut cursor, total, 1)?[0] != 0;

        if little_endian != cfg!(target_endian = "little") {
            rate.reverse();
            channels.reverse();
        }

        Ok((
            Self {
                sample_rate: u32::from_ne_bytes(rate),
                channels: u32::from_ne_bytes(channels),
                little_endian,
            },
            total,
        ))
    }
}
