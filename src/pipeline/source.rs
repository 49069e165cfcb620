//! Encoder pipeline (source side)
//!
//! The host audio engine pushes float PCM through [`SourceInput::push`] at
//! its own cadence; the encoder worker drains the accumulation ring one
//! frame at a time, encodes, and enqueues header-prefixed packets for the
//! transport to pick up. The push callback never touches codec or network
//! code.

use bytes::{BufMut, Bytes, BytesMut};
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use crate::buffer::SampleRing;
use crate::codec::encoder::{EncoderTuning, FrameEncoder};
use crate::codec::f32_to_i16_into;
use crate::config::{RateControl, SourceConfig};
use crate::constants::WORKER_SLEEP;
use crate::error::{ConfigError, Result};
use crate::pipeline::worker::{StopToken, Worker};
use crate::pipeline::{EventHub, SourceEvent, SourceState, SourceStats};
use crate::protocol::{HostAudioFormat, SessionConfig};
use crate::queue::PacketQueue;
use crate::transport::PacketSource;

struct Shared {
    accumulator: SampleRing<i16>,
    tuning: Mutex<EncoderTuning>,
    tuning_generation: AtomicU64,
    /// f32 bits; read by the push callback on the audio thread
    monitor_volume: AtomicU32,
    packets_encoded: AtomicU64,
    bytes_encoded: AtomicU64,
    frames_dropped: AtomicU64,
    last_error: Mutex<Option<String>>,
}

/// Encodes pushed host audio into compressed packets on its own worker
pub struct SourcePipeline {
    config: SourceConfig,
    session: SessionConfig,
    header: Bytes,
    shared: Arc<Shared>,
    outbound: Arc<PacketQueue>,
    events: EventHub<SourceEvent>,
    worker: Option<Worker>,
}

impl SourcePipeline {
    /// Build a pipeline for the given host format. The session header is
    /// serialized once here and prefixed to every packet the worker emits.
    pub fn new(config: SourceConfig, host_format: HostAudioFormat) -> Result<Self> {
        config.validate()?;

        let session = SessionConfig::from_host(host_format);
        let header = session.encode();

        let shared = Arc::new(Shared {
            accumulator: SampleRing::new(config.accumulator_capacity),
            tuning: Mutex::new(EncoderTuning::from(&config)),
            tuning_generation: AtomicU64::new(0),
            monitor_volume: AtomicU32::new(config.monitor_volume.to_bits()),
            packets_encoded: AtomicU64::new(0),
            bytes_encoded: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            last_error: Mutex::new(None),
        });

        Ok(Self {
            outbound: Arc::new(PacketQueue::new(config.queue_capacity)),
            events: EventHub::new(64),
            shared,
            session,
            header,
            config,
            worker: None,
        })
    }

    /// Create the encoder and spawn the worker. Idempotent while running.
    ///
    /// Fails before any thread is spawned when the host channel count is not
    /// mono or stereo.
    pub fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }

        if self.session.channels != 1 && self.session.channels != 2 {
            return Err(ConfigError::UnsupportedChannels(self.session.channels as u16).into());
        }

        let encoder = FrameEncoder::new(
            self.config.frame_size,
            self.config.application,
            *self.shared.tuning.lock(),
        )?;

        let shared = self.shared.clone();
        let outbound = self.outbound.clone();
        let header = self.header.clone();
        let events = self.events.clone();
        let name = self.config.name.clone();

        self.worker = Some(Worker::spawn(
            &format!("{}-encoder", self.config.name),
            move |token| encode_loop(token, encoder, shared, outbound, header, events, name),
        )?);

        tracing::info!(
            "{}: encoder started, frame size {} ({:.1} ms)",
            self.config.name,
            self.config.frame_size.samples_per_channel(),
            self.config.frame_size.duration_ms()
        );
        self.events.emit(SourceEvent::Started {
            name: self.config.name.clone(),
        });
        Ok(())
    }

    /// Stop the worker and release the encoder. The join is bounded by the
    /// worker's sleep interval.
    pub fn stop(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
            tracing::info!("{}: encoder stopped", self.config.name);
            self.events.emit(SourceEvent::Stopped {
                name: self.config.name.clone(),
            });
        }
    }

    pub fn state(&self) -> SourceState {
        if self.worker.is_some() {
            SourceState::Encoding
        } else {
            SourceState::Idle
        }
    }

    /// Handle for the host engine's push callback
    pub fn input_handle(&self) -> SourceInput {
        SourceInput {
            shared: self.shared.clone(),
            scratch: Vec::new(),
        }
    }

    /// Handle for the transport to drain outbound packets
    pub fn packet_source(&self) -> PacketSource {
        PacketSource::new(self.outbound.clone())
    }

    /// Session parameters serialized into every packet
    pub fn session(&self) -> SessionConfig {
        self.session
    }

    pub fn set_bitrate(&self, bitrate_kbps: u32) -> std::result::Result<(), ConfigError> {
        if !(6..=510).contains(&bitrate_kbps) {
            return Err(ConfigError::OutOfRange {
                field: "bitrate_kbps",
                value: bitrate_kbps.to_string(),
            });
        }
        self.shared.tuning.lock().bitrate_kbps = bitrate_kbps;
        self.shared.tuning_generation.fetch_add(1, Ordering::Release);
        Ok(())
    }

    pub fn set_complexity(&self, complexity: u8) -> std::result::Result<(), ConfigError> {
        if complexity > 10 {
            return Err(ConfigError::OutOfRange {
                field: "complexity",
                value: complexity.to_string(),
            });
        }
        self.shared.tuning.lock().complexity = complexity;
        self.shared.tuning_generation.fetch_add(1, Ordering::Release);
        Ok(())
    }

    pub fn set_rate_control(&self, rate_control: RateControl) {
        self.shared.tuning.lock().rate_control = rate_control;
        self.shared.tuning_generation.fetch_add(1, Ordering::Release);
    }

    /// Monitoring gain applied to the push callback's buffer; does not
    /// modify the sent audio
    pub fn set_monitor_volume(&self, volume: f32) {
        self.shared
            .monitor_volume
            .store(volume.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    /// Packets waiting for the transport
    pub fn queued_packets(&self) -> usize {
        self.outbound.len()
    }

    /// Samples waiting to be encoded
    pub fn buffered_samples(&self) -> usize {
        self.shared.accumulator.available()
    }

    pub fn stats(&self) -> SourceStats {
        SourceStats {
            packets_encoded: self.shared.packets_encoded.load(Ordering::Relaxed),
            bytes_encoded: self.shared.bytes_encoded.load(Ordering::Relaxed),
            frames_dropped: self.shared.frames_dropped.load(Ordering::Relaxed),
        }
    }

    pub fn last_error(&self) -> Option<String> {
        self.shared.last_error.lock().clone()
    }

    pub fn events(&self) -> Receiver<SourceEvent> {
        self.events.subscribe()
    }
}

impl Drop for SourcePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Host-side push handle. One per callback; owns its conversion scratch so
/// the audio thread never allocates after the first call.
pub struct SourceInput {
    shared: Arc<Shared>,
    scratch: Vec<i16>,
}

impl SourceInput {
    /// Host push callback. Converts the float PCM to 16-bit transport
    /// samples and appends them to the accumulation ring, then scales the
    /// callback buffer in place for local monitoring. A write that does not
    /// fit is rejected and counted by the ring.
    pub fn push(&mut self, data: &mut [f32]) {
        f32_to_i16_into(data, &mut self.scratch);
        self.shared.accumulator.write(&self.scratch);

        let volume = f32::from_bits(self.shared.monitor_volume.load(Ordering::Relaxed));
        if volume != 1.0 {
            for sample in data.iter_mut() {
                *sample *= volume;
            }
        }
    }
}

fn encode_loop(
    token: StopToken,
    mut encoder: FrameEncoder,
    shared: Arc<Shared>,
    outbound: Arc<PacketQueue>,
    header: Bytes,
    events: EventHub<SourceEvent>,
    name: String,
) {
    let samples_per_frame = encoder.samples_per_frame();
    let mut frame = vec![0i16; samples_per_frame];
    let mut applied_generation = 0u64;

    while token.should_run() {
        let generation = shared.tuning_generation.load(Ordering::Acquire);
        if generation != applied_generation {
            let tuning = *shared.tuning.lock();
            if let Err(e) = encoder.apply(tuning) {
                tracing::warn!("{}: failed to retune encoder: {}", name, e);
            }
            applied_generation = generation;
        }

        if shared.accumulator.available() < samples_per_frame {
            thread::sleep(WORKER_SLEEP);
            continue;
        }
        shared.accumulator.read_into(&mut frame);

        match encoder.encode(&frame) {
            Ok(payload) => {
                let mut packet = BytesMut::with_capacity(header.len() + payload.len());
                packet.put_slice(&header);
                packet.put_slice(&payload);
                if !outbound.push(packet.freeze()) {
                    tracing::trace!("{}: outbound queue full, oldest packet dropped", name);
                }
                shared.packets_encoded.fetch_add(1, Ordering::Relaxed);
                shared
                    .bytes_encoded
                    .fetch_add(payload.len() as u64, Ordering::Relaxed);
            }
            Err(e) => {
                // Recoverable: drop the frame, keep encoding.
                shared.frames_dropped.fetch_add(1, Ordering::Relaxed);
                *shared.last_error.lock() = Some(e.to_string());
                tracing::warn!("{}: frame dropped: {}", name, e);
                events.emit(SourceEvent::Error {
                    name: name.clone(),
                    message: e.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decoder::FrameDecoder;
    use crate::error::Error;
    use std::time::{Duration, Instant};

    fn host_stereo() -> HostAudioFormat {
        HostAudioFormat {
            sample_rate: 48_000,
            channels: 2,
        }
    }

    #[test]
    fn rejects_unsupported_channel_count_before_spawning() {
        let mut pipeline = SourcePipeline::new(
            SourceConfig::default(),
            HostAudioFormat {
                sample_rate: 48_000,
                channels: 6,
            },
        )
        .unwrap();

        let err = pipeline.start().unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::UnsupportedChannels(6))
        ));
        assert_eq!(pipeline.state(), SourceState::Idle);
    }

    #[test]
    fn start_is_idempotent() {
        let mut pipeline = SourcePipeline::new(SourceConfig::default(), host_stereo()).unwrap();
        pipeline.start().unwrap();
        pipeline.start().unwrap();
        assert_eq!(pipeline.state(), SourceState::Encoding);

        pipeline.stop();
        assert_eq!(pipeline.state(), SourceState::Idle);
    }

    #[test]
    fn monitor_volume_scales_callback_buffer_not_sent_audio() {
        let pipeline = SourcePipeline::new(SourceConfig::default(), host_stereo()).unwrap();
        pipeline.set_monitor_volume(0.5);
        let mut input = pipeline.input_handle();

        let mut data = [0.8f32; 4];
        input.push(&mut data);

        // Monitoring halved in place.
        for sample in data {
            assert!((sample - 0.4).abs() < 1e-6);
        }
        // The accumulated transport audio kept full scale.
        assert_eq!(pipeline.buffered_samples(), 4);
        let sent = pipeline.shared.accumulator.read(4);
        let expected = (0.8 * f32::from(i16::MAX)) as i16;
        assert!(sent.iter().all(|&s| (s - expected).abs() <= 1));
    }

    // One second of stereo audio at frame size 960 is exactly 25 frames.
    #[test]
    fn emits_expected_packets_for_one_second_of_audio() {
        let config = SourceConfig::default();
        let accumulator_capacity = config.accumulator_capacity;
        let mut pipeline = SourcePipeline::new(config, host_stereo()).unwrap();
        pipeline.start().unwrap();
        let mut input = pipeline.input_handle();

        let chunk_sizes = [480usize, 1024, 2048, 960, 512];
        let mut sizes = chunk_sizes.iter().cycle();
        let mut remaining = 48_000usize;
        while remaining > 0 {
            let size = (*sizes.next().unwrap()).min(remaining);

            // Wait for the encoder to drain enough room so no push is
            // rejected; the callback cadence provides this pacing in a
            // real host.
            let deadline = Instant::now() + Duration::from_secs(2);
            while pipeline.buffered_samples() + size > accumulator_capacity {
                assert!(Instant::now() < deadline, "encoder failed to drain");
                thread::sleep(Duration::from_millis(1));
            }

            let mut chunk = vec![0.25f32; size];
            input.push(&mut chunk);
            remaining -= size;
        }

        let source = pipeline.packet_source();
        let mut packets = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(2);
        while packets.len() < 25 && Instant::now() < deadline {
            if let Some(packet) = source.next_packet(Duration::from_millis(50)) {
                packets.push(packet);
            }
        }
        pipeline.stop();

        assert_eq!(packets.len(), 25);
        assert!(source.next_packet(Duration::from_millis(20)).is_none());
        assert_eq!(pipeline.stats().packets_encoded, 25);

        // Every packet carries a parseable header and decodes to one full
        // frame at the transport format.
        let mut decoder = FrameDecoder::new().unwrap();
        for packet in &packets {
            let (session, offset) = SessionConfig::decode(packet).unwrap();
            assert_eq!(session.sample_rate, 48_000);
            assert_eq!(session.channels, 2);
            assert!(offset < packet.len());

            let pcm = decoder.decode(&packet[offset..]).unwrap();
            assert_eq!(pcm.len(), 1920);
        }
    }

    #[test]
    fn live_tuning_is_validated_and_applied() {
        let mut pipeline = SourcePipeline::new(SourceConfig::default(), host_stereo()).unwrap();
        pipeline.start().unwrap();

        assert!(pipeline.set_bitrate(5).is_err());
        assert!(pipeline.set_complexity(11).is_err());

        pipeline.set_bitrate(64).unwrap();
        pipeline.set_complexity(3).unwrap();
        pipeline.set_rate_control(RateControl::ConstrainedVbr);

        // The worker picks the change up and keeps encoding.
        let mut input = pipeline.input_handle();
        let mut chunk = vec![0.1f32; 1920];
        input.push(&mut chunk);

        let source = pipeline.packet_source();
        assert!(source.next_packet(Duration::from_secs(1)).is_some());
        pipeline.stop();
        assert_eq!(pipeline.stats().frames_dropped, 0);
    }
}
