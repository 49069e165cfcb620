//! Transport boundary
//!
//! The pipelines never talk to a network themselves. A transport drains
//! packets from a [`PacketSource`] and delivers them into a [`PacketSink`],
//! preserving packet boundaries 1:1; a stream-oriented transport must
//! re-frame packets before handing them back. [`LoopbackLink`] is the
//! minimal in-process implementation, used by the demo binary and tests.

use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::constants::DEQUEUE_TIMEOUT;
use crate::error::{Result, TransportError};
use crate::pipeline::worker::Worker;
use crate::queue::PacketQueue;

/// Clonable handle over a source pipeline's outbound queue
#[derive(Clone)]
pub struct PacketSource {
    queue: Arc<PacketQueue>,
}

impl PacketSource {
    pub(crate) fn new(queue: Arc<PacketQueue>) -> Self {
        Self { queue }
    }

    /// Take the oldest outbound packet, waiting up to `timeout` for one
    pub fn next_packet(&self, timeout: Duration) -> Option<Bytes> {
        self.queue.pop_timeout(timeout)
    }

    /// Packets currently waiting to be sent
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Clonable handle over a client pipeline's inbound queue
#[derive(Clone)]
pub struct PacketSink {
    queue: Arc<PacketQueue>,
    accepting: Arc<AtomicBool>,
}

impl PacketSink {
    pub(crate) fn new(queue: Arc<PacketQueue>, accepting: Arc<AtomicBool>) -> Self {
        Self { queue, accepting }
    }

    /// Deliver one received packet. Fails once the owning pipeline has
    /// stopped.
    pub fn deliver(&self, packet: Bytes) -> std::result::Result<(), TransportError> {
        if !self.accepting.load(Ordering::Acquire) {
            return Err(TransportError::Disconnected);
        }
        self.queue.push(packet);
        Ok(())
    }
}

/// In-process transport shuttling packets from a source to a sink on its
/// own worker
pub struct LoopbackLink {
    worker: Option<Worker>,
}

impl LoopbackLink {
    pub fn start(source: PacketSource, sink: PacketSink) -> Result<Self> {
        let worker = Worker::spawn("loopback-link", move |token| {
            while token.should_run() {
                let Some(packet) = source.next_packet(DEQUEUE_TIMEOUT) else {
                    continue;
                };
                if sink.deliver(packet).is_err() {
                    tracing::info!("loopback-link: peer disconnected");
                    break;
                }
            }
        })?;

        Ok(Self {
            worker: Some(worker),
        })
    }

    pub fn stop(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
        }
    }
}

impl Drop for LoopbackLink {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClientConfig, SourceConfig};
    use crate::pipeline::{ClientPipeline, SourcePipeline};
    use crate::protocol::HostAudioFormat;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn loopback_carries_a_session_end_to_end() {
        let mut source = SourcePipeline::new(
            SourceConfig::default(),
            HostAudioFormat {
                sample_rate: 48_000,
                channels: 2,
            },
        )
        .unwrap();
        let mut client = ClientPipeline::new(ClientConfig::default()).unwrap();

        source.start().unwrap();
        client.start().unwrap();
        let mut link = LoopbackLink::start(source.packet_source(), client.packet_sink()).unwrap();

        // Two full frames of a 440 Hz tone.
        let mut input = source.input_handle();
        let mut chunk: Vec<f32> = (0..3840)
            .map(|i| {
                let t = (i / 2) as f32 / 48_000.0;
                (t * 440.0 * 2.0 * std::f32::consts::PI).sin() * 0.3
            })
            .collect();
        input.push(&mut chunk);

        let deadline = Instant::now() + Duration::from_secs(2);
        while client.buffered_samples() < 3840 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }

        assert!(client.is_ready());
        assert_eq!(client.session().unwrap().sample_rate, 48_000);

        let output = client.output_handle().unwrap();
        let mut out = [0.0f32; 3840];
        assert!(output.pull(&mut out));
        // Opus is lossy; the signal survives but not bit-exactly. The tail
        // of the pull must carry energy once the codec has converged.
        assert!(out[1920..].iter().any(|&s| s.abs() > 0.05));

        link.stop();
        source.stop();
        client.stop();
        assert!(matches!(
            client.submit_packet(Bytes::from_static(&[1])),
            Err(TransportError::Disconnected)
        ));
    }
}
