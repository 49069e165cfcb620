//! Streaming pipelines
//!
//! A [`source::SourcePipeline`] turns a host audio engine's push callback
//! into header-prefixed compressed packets; a [`client::ClientPipeline`]
//! turns received packets back into PCM served through a pull callback.
//! Each active pipeline owns exactly one background worker thread; the host
//! callback threads only ever touch the sample buffers under their short
//! locks.

pub mod client;
pub mod source;
pub mod worker;

pub use client::{ClientOutput, ClientPipeline};
pub use source::{SourceInput, SourcePipeline};

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::protocol::SessionConfig;

/// Source pipeline lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Idle,
    Encoding,
}

/// Client pipeline lifecycle. Playback must not start before the session
/// header has been parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Idle,
    WaitingForConfig,
    Decoding,
}

/// Lifecycle notifications emitted by a source pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    Started { name: String },
    Stopped { name: String },
    Error { name: String, message: String },
}

/// Lifecycle notifications emitted by a client pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// The first valid session header was parsed; playback may begin
    SessionNegotiated {
        name: String,
        session: SessionConfig,
    },
    Stopped {
        name: String,
    },
    Error {
        name: String,
        message: String,
    },
}

/// Bounded event channel between a pipeline and its embedding application.
///
/// Emission never blocks a worker: when the subscriber falls behind, new
/// events are discarded.
pub struct EventHub<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> Clone for EventHub<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
        }
    }
}

impl<T> EventHub<T> {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self { tx, rx }
    }

    pub fn emit(&self, event: T) {
        let _ = self.tx.try_send(event);
    }

    /// Receiver for the embedding application to poll or block on
    pub fn subscribe(&self) -> Receiver<T> {
        self.rx.clone()
    }
}

/// Source pipeline counters, snapshotted for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub packets_encoded: u64,
    pub bytes_encoded: u64,
    /// Frames lost to per-frame codec failures
    pub frames_dropped: u64,
}

/// Client pipeline counters, snapshotted for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    pub packets_decoded: u64,
    /// Packets discarded before decoding: unusable header or malformed payload
    pub packets_discarded: u64,
    /// Pulls that could not be served in full
    pub underruns: u64,
}
