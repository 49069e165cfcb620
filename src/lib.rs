//! # opuscast
//!
//! Low-latency Opus audio streaming pipelines with a pluggable transport.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────── SOURCE ────────────────────────────┐
//! │                                                                │
//! │  host push callback (f32 PCM)                                  │
//! │        │ SourceInput::push                                     │
//! │        ▼                                                       │
//! │  ┌───────────────┐    ┌──────────────┐    ┌────────────────┐   │
//! │  │ i16 sample    │    │   encoder    │    │ outbound       │   │
//! │  │ accumulation  │───▶│   worker     │───▶│ PacketQueue    │   │
//! │  │ ring          │    │ (Opus 48k/2) │    │ (drop oldest)  │   │
//! │  └───────────────┘    └──────────────┘    └───────┬────────┘   │
//! │                    [header ++ opus payload]       │            │
//! └───────────────────────────────────────────────────┼────────────┘
//!                                                     │ PacketSource
//!                                       transport (collaborator)
//!                                                     │ PacketSink
//! ┌───────────────────────────────────────────────────┼────────────┐
//! │                                           ┌───────▼────────┐   │
//! │  ┌───────────────┐    ┌──────────────┐    │ inbound        │   │
//! │  │ f32 output    │◀───│   decoder    │◀───│ PacketQueue    │   │
//! │  │ ring          │    │   worker     │    │ (drop oldest)  │   │
//! │  └───────┬───────┘    │ (Opus 48k/2) │    └────────────────┘   │
//! │          │            └──────────────┘                         │
//! │          ▼ ClientOutput::pull (silence on underrun)            │
//! │  host pull callback (f32 PCM)                                  │
//! │                                                                │
//! └──────────────────────────── CLIENT ────────────────────────────┘
//! ```
//!
//! The session format (host sample rate, channel count, endianness) is
//! serialized as a small length-prefixed header and prefixed to every packet;
//! the client parses it once to negotiate the session and afterwards only
//! uses its declared length to locate the Opus payload.

pub mod buffer;
pub mod codec;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod protocol;
pub mod queue;
pub mod transport;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    use std::time::Duration;

    /// Opus transport sample rate, used for transfer regardless of the
    /// host engine's actual rate
    pub const TRANSPORT_SAMPLE_RATE: u32 = 48_000;

    /// Opus transport channel count
    pub const TRANSPORT_CHANNELS: u16 = 2;

    /// Default Opus bitrate in kbit/s
    pub const DEFAULT_BITRATE_KBPS: u32 = 128;

    /// Default Opus encoder complexity (0-10)
    pub const DEFAULT_COMPLEXITY: u8 = 10;

    /// Default frame size in samples per channel
    pub const DEFAULT_FRAME_SIZE: u32 = 960;

    /// Maximum element count of the compressed packet queues
    pub const PACKET_QUEUE_CAPACITY: usize = 100;

    /// Capacity of the source-side sample accumulation ring, in samples
    pub const ACCUMULATOR_CAPACITY: usize = 10_000;

    /// Client output ring capacity, in seconds of transport-format audio
    pub const OUTPUT_BUFFER_SECONDS: usize = 5;

    /// Worker loop sleep between iterations
    pub const WORKER_SLEEP: Duration = Duration::from_millis(1);

    /// How long the decoder worker blocks against an empty packet queue
    pub const DEQUEUE_TIMEOUT: Duration = Duration::from_millis(10);

    /// Size of the reused Opus encode buffer (max Opus frame is ~1275 bytes)
    pub const ENCODE_BUFFER_SIZE: usize = 4000;
}
