//! Decoder pipeline (client side)
//!
//! The transport delivers packets into the inbound queue; the decoder worker
//! negotiates the session from the first usable header, decodes the Opus
//! payloads and fills the output ring the host engine pulls from. Playback
//! must not begin before negotiation: [`ClientPipeline::output_handle`]
//! returns `None` until then.

use bytes::Bytes;
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use crate::buffer::SampleRing;
use crate::codec::decoder::{FrameDecoder, PacketInfo};
use crate::codec::i16_to_f32_into;
use crate::config::ClientConfig;
use crate::constants::{DEQUEUE_TIMEOUT, WORKER_SLEEP};
use crate::error::{Result, TransportError};
use crate::pipeline::worker::{StopToken, Worker};
use crate::pipeline::{ClientEvent, ClientState, ClientStats, EventHub};
use crate::protocol::SessionConfig;
use crate::queue::PacketQueue;
use crate::transport::PacketSink;

struct Shared {
    output: SampleRing<f32>,
    session: Mutex<Option<SessionConfig>>,
    /// f32 bits; read by the pull callback on the audio thread
    volume: AtomicU32,
    /// Whether the most recent pull came up short
    underrun: AtomicBool,
    packets_decoded: AtomicU64,
    packets_discarded: AtomicU64,
    underruns: AtomicU64,
    last_packet_info: Mutex<Option<PacketInfo>>,
    last_error: Mutex<Option<String>>,
}

/// Decodes received packets into PCM served through a pull callback
pub struct ClientPipeline {
    config: ClientConfig,
    shared: Arc<Shared>,
    inbound: Arc<PacketQueue>,
    accepting: Arc<AtomicBool>,
    events: EventHub<ClientEvent>,
    worker: Option<Worker>,
}

impl ClientPipeline {
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let shared = Arc::new(Shared {
            output: SampleRing::new(config.output_capacity),
            session: Mutex::new(None),
            volume: AtomicU32::new(config.volume.to_bits()),
            underrun: AtomicBool::new(false),
            packets_decoded: AtomicU64::new(0),
            packets_discarded: AtomicU64::new(0),
            underruns: AtomicU64::new(0),
            last_packet_info: Mutex::new(None),
            last_error: Mutex::new(None),
        });

        Ok(Self {
            inbound: Arc::new(PacketQueue::new(config.queue_capacity)),
            accepting: Arc::new(AtomicBool::new(false)),
            events: EventHub::new(64),
            shared,
            config,
            worker: None,
        })
    }

    /// Create the decoder and spawn the worker in `WaitingForConfig`.
    /// Idempotent while running.
    pub fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }

        let decoder = FrameDecoder::new()?;

        let shared = self.shared.clone();
        let inbound = self.inbound.clone();
        let events = self.events.clone();
        let name = self.config.name.clone();

        self.worker = Some(Worker::spawn(
            &format!("{}-decoder", self.config.name),
            move |token| decode_loop(token, decoder, shared, inbound, events, name),
        )?);
        self.accepting.store(true, Ordering::Release);

        tracing::info!("{}: decoder started, waiting for session config", self.config.name);
        Ok(())
    }

    /// Stop the worker, release the decoder and clear the negotiated
    /// session so a restart renegotiates cleanly.
    pub fn stop(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            self.accepting.store(false, Ordering::Release);
            worker.stop();

            *self.shared.session.lock() = None;
            *self.shared.last_packet_info.lock() = None;
            self.shared.underrun.store(false, Ordering::Relaxed);
            self.shared.output.clear();
            self.inbound.clear();

            tracing::info!("{}: decoder stopped", self.config.name);
            self.events.emit(ClientEvent::Stopped {
                name: self.config.name.clone(),
            });
        }
    }

    pub fn state(&self) -> ClientState {
        if self.worker.is_none() {
            ClientState::Idle
        } else if self.shared.session.lock().is_some() {
            ClientState::Decoding
        } else {
            ClientState::WaitingForConfig
        }
    }

    /// Ready for playback once a valid session header has been parsed
    pub fn is_ready(&self) -> bool {
        self.state() == ClientState::Decoding
    }

    /// Handle for the host engine's pull callback; `None` until the session
    /// has been negotiated
    pub fn output_handle(&self) -> Option<ClientOutput> {
        (self.state() == ClientState::Decoding).then(|| ClientOutput {
            shared: self.shared.clone(),
        })
    }

    /// Deliver one packet from the transport
    pub fn submit_packet(&self, packet: Bytes) -> std::result::Result<(), TransportError> {
        if !self.accepting.load(Ordering::Acquire) {
            return Err(TransportError::Disconnected);
        }
        self.inbound.push(packet);
        Ok(())
    }

    /// Clonable delivery handle for the transport
    pub fn packet_sink(&self) -> PacketSink {
        PacketSink::new(self.inbound.clone(), self.accepting.clone())
    }

    /// Negotiated session parameters, once known
    pub fn session(&self) -> Option<SessionConfig> {
        *self.shared.session.lock()
    }

    /// Playback gain applied in the pull callback
    pub fn set_volume(&self, volume: f32) {
        self.shared
            .volume
            .store(volume.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    /// Whether the most recent pull came up short
    pub fn underrun(&self) -> bool {
        self.shared.underrun.load(Ordering::Relaxed)
    }

    /// Packets waiting to be decoded
    pub fn queued_packets(&self) -> usize {
        self.inbound.len()
    }

    /// Decoded samples waiting to be pulled
    pub fn buffered_samples(&self) -> usize {
        self.shared.output.available()
    }

    /// Framing metadata of the most recently decoded packet
    pub fn last_packet_info(&self) -> Option<PacketInfo> {
        *self.shared.last_packet_info.lock()
    }

    pub fn stats(&self) -> ClientStats {
        ClientStats {
            packets_decoded: self.shared.packets_decoded.load(Ordering::Relaxed),
            packets_discarded: self.shared.packets_discarded.load(Ordering::Relaxed),
            underruns: self.shared.underruns.load(Ordering::Relaxed),
        }
    }

    pub fn last_error(&self) -> Option<String> {
        self.shared.last_error.lock().clone()
    }

    pub fn events(&self) -> Receiver<ClientEvent> {
        self.events.subscribe()
    }
}

impl Drop for ClientPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Host-side pull handle, available once the session is negotiated
pub struct ClientOutput {
    shared: Arc<Shared>,
}

impl ClientOutput {
    /// Host pull callback. Fills `out` from the ring; a deficit is
    /// zero-filled instead of blocking and flagged as an underrun.
    /// Returns whether the pull was served in full.
    pub fn pull(&self, out: &mut [f32]) -> bool {
        let got = self.shared.output.read_into(out);
        out[got..].fill(0.0);

        let volume = f32::from_bits(self.shared.volume.load(Ordering::Relaxed));
        if volume != 1.0 {
            for sample in &mut out[..got] {
                *sample *= volume;
            }
        }

        let complete = got == out.len();
        self.shared.underrun.store(!complete, Ordering::Relaxed);
        if !complete {
            self.shared.underruns.fetch_add(1, Ordering::Relaxed);
        }
        complete
    }
}

fn decode_loop(
    token: StopToken,
    mut decoder: FrameDecoder,
    shared: Arc<Shared>,
    inbound: Arc<PacketQueue>,
    events: EventHub<ClientEvent>,
    name: String,
) {
    let mut pcm_f32: Vec<f32> = Vec::new();

    while token.should_run() {
        let Some(packet) = inbound.pop_timeout(DEQUEUE_TIMEOUT) else {
            continue;
        };
        if packet.is_empty() {
            continue;
        }

        // Every packet carries the session header; its declared length
        // locates the payload. Reparsing is idempotent once the session is
        // known. A packet without a usable header is not actionable.
        let (session, offset) = match SessionConfig::decode(&packet) {
            Ok(parsed) => parsed,
            Err(e) => {
                shared.packets_discarded.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("{}: discarding packet without usable header: {}", name, e);
                continue;
            }
        };

        let negotiated = {
            let mut slot = shared.session.lock();
            if slot.is_none() {
                *slot = Some(session);
                true
            } else {
                false
            }
        };
        if negotiated {
            tracing::info!(
                "{}: session negotiated: {} Hz, {} channels, {} endian sender",
                name,
                session.sample_rate,
                session.channels,
                if session.little_endian { "little" } else { "big" }
            );
            events.emit(ClientEvent::SessionNegotiated {
                name: name.clone(),
                session,
            });
        }

        let payload = &packet[offset..];
        if payload.is_empty() {
            shared.packets_discarded.fetch_add(1, Ordering::Relaxed);
            continue;
        }

        // Introspection is diagnostic only; a parse failure here surfaces
        // through the decode below.
        if let Ok(info) = PacketInfo::parse(payload) {
            *shared.last_packet_info.lock() = Some(info);
        }

        match decoder.decode(payload) {
            Ok(pcm) => {
                i16_to_f32_into(&pcm, &mut pcm_f32);
                if !shared.output.write(&pcm_f32) {
                    tracing::trace!("{}: output ring full, decoded frame dropped", name);
                }
                shared.packets_decoded.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                // Recoverable: drop the packet, keep decoding.
                shared.packets_discarded.fetch_add(1, Ordering::Relaxed);
                *shared.last_error.lock() = Some(e.to_string());
                tracing::warn!("{}: dropping malformed packet: {}", name, e);
                events.emit(ClientEvent::Error {
                    name: name.clone(),
                    message: e.to_string(),
                });
            }
        }

        thread::sleep(WORKER_SLEEP);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encoder::{EncoderTuning, FrameEncoder};
    use crate::config::{CodecApplication, FrameSize, SourceConfig};
    use crate::protocol::HostAudioFormat;
    use bytes::{BufMut, BytesMut};
    use std::time::{Duration, Instant};

    fn encoder() -> FrameEncoder {
        FrameEncoder::new(
            FrameSize::F960,
            CodecApplication::Audio,
            EncoderTuning::from(&SourceConfig::default()),
        )
        .unwrap()
    }

    fn packet_for(encoder: &mut FrameEncoder, header: &Bytes, samples: &[i16]) -> Bytes {
        let payload = encoder.encode(samples).unwrap();
        let mut packet = BytesMut::with_capacity(header.len() + payload.len());
        packet.put_slice(header);
        packet.put_slice(&payload);
        packet.freeze()
    }

    fn wait_until(deadline_ms: u64, mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_millis(deadline_ms);
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        done()
    }

    #[test]
    fn not_ready_until_a_valid_header_arrives() {
        let mut pipeline = ClientPipeline::new(ClientConfig::default()).unwrap();
        pipeline.start().unwrap();
        assert_eq!(pipeline.state(), ClientState::WaitingForConfig);
        assert!(pipeline.output_handle().is_none());

        // Truncated header: declares 200 bytes, carries 4. Not actionable,
        // and must never flip readiness.
        pipeline
            .submit_packet(Bytes::from_static(&[200, 4, 1, 2]))
            .unwrap();

        assert!(wait_until(200, || pipeline.stats().packets_discarded >= 1));
        assert_eq!(pipeline.state(), ClientState::WaitingForConfig);
        assert!(pipeline.output_handle().is_none());
        assert!(pipeline.session().is_none());
        pipeline.stop();
    }

    #[test]
    fn negotiates_session_and_serves_pulls() {
        let mut pipeline = ClientPipeline::new(ClientConfig::default()).unwrap();
        pipeline.start().unwrap();

        let header = SessionConfig::from_host(HostAudioFormat {
            sample_rate: 44_100,
            channels: 2,
        })
        .encode();
        let mut encoder = encoder();
        for _ in 0..3 {
            let packet = packet_for(&mut encoder, &header, &vec![100i16; 1920]);
            pipeline.submit_packet(packet).unwrap();
        }

        assert!(wait_until(1000, || pipeline.buffered_samples() >= 3 * 1920));
        assert_eq!(pipeline.state(), ClientState::Decoding);
        let session = pipeline.session().unwrap();
        assert_eq!(session.sample_rate, 44_100);
        assert_eq!(session.channels, 2);
        assert!(pipeline.last_packet_info().is_some());

        let output = pipeline.output_handle().unwrap();
        let mut out = [0.0f32; 1920];
        for _ in 0..3 {
            assert!(output.pull(&mut out));
            assert!(!pipeline.underrun());
        }

        // Nothing left: the deficit is silence, flagged as an underrun.
        assert!(!output.pull(&mut out));
        assert!(pipeline.underrun());
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(pipeline.stats().underruns, 1);
        assert_eq!(pipeline.stats().packets_decoded, 3);
        pipeline.stop();
    }

    #[test]
    fn volume_scales_served_samples() {
        let mut pipeline = ClientPipeline::new(ClientConfig::default()).unwrap();
        pipeline.start().unwrap();

        let header = SessionConfig::from_host(HostAudioFormat {
            sample_rate: 48_000,
            channels: 2,
        })
        .encode();
        let mut encoder = encoder();
        pipeline
            .submit_packet(packet_for(&mut encoder, &header, &vec![8000i16; 1920]))
            .unwrap();
        assert!(wait_until(1000, || pipeline.buffered_samples() >= 1920));

        pipeline.set_volume(0.0);
        let output = pipeline.output_handle().unwrap();
        let mut out = [1.0f32; 1920];
        assert!(output.pull(&mut out));
        assert!(out.iter().all(|&s| s == 0.0));
        pipeline.stop();
    }

    #[test]
    fn malformed_payload_is_dropped_not_fatal() {
        let mut pipeline = ClientPipeline::new(ClientConfig::default()).unwrap();
        pipeline.start().unwrap();

        let header = SessionConfig::from_host(HostAudioFormat {
            sample_rate: 48_000,
            channels: 2,
        })
        .encode();

        // Valid header, garbage Opus payload.
        let mut bad = BytesMut::new();
        bad.put_slice(&header);
        bad.put_slice(&[0x03]);
        pipeline.submit_packet(bad.freeze()).unwrap();

        assert!(wait_until(1000, || pipeline.stats().packets_discarded >= 1));
        // The session still negotiated off the bad packet's header and the
        // pipeline keeps decoding later packets.
        assert_eq!(pipeline.state(), ClientState::Decoding);
        assert!(pipeline.last_error().is_some());

        let mut encoder = encoder();
        pipeline
            .submit_packet(packet_for(&mut encoder, &header, &vec![0i16; 1920]))
            .unwrap();
        assert!(wait_until(1000, || pipeline.stats().packets_decoded == 1));
        pipeline.stop();
    }

    #[test]
    fn stop_rejects_delivery_and_clears_session() {
        let mut pipeline = ClientPipeline::new(ClientConfig::default()).unwrap();
        pipeline.start().unwrap();

        let header = SessionConfig::from_host(HostAudioFormat {
            sample_rate: 48_000,
            channels: 2,
        })
        .encode();
        let mut encoder = encoder();
        pipeline
            .submit_packet(packet_for(&mut encoder, &header, &vec![0i16; 1920]))
            .unwrap();
        assert!(wait_until(1000, || pipeline.is_ready()));

        pipeline.stop();
        assert_eq!(pipeline.state(), ClientState::Idle);
        assert!(pipeline.session().is_none());
        assert!(matches!(
            pipeline.submit_packet(Bytes::from_static(&[1])),
            Err(TransportError::Disconnected)
        ));

        // A restart renegotiates from scratch.
        pipeline.start().unwrap();
        assert_eq!(pipeline.state(), ClientState::WaitingForConfig);
        pipeline.stop();
    }
}
