//! Loopback streaming demo
//!
//! Drives a full source -> transport -> client session in one process: a
//! generated tone stands in for the host engine's push callback, a paced
//! pull drains the client, and pipeline stats are logged once a second.

use anyhow::Result;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use opuscast::{
    config::StreamConfig,
    pipeline::{ClientPipeline, SourcePipeline},
    protocol::HostAudioFormat,
    transport::LoopbackLink,
};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Optional TOML config path, then optional run duration in seconds.
    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => StreamConfig::load(&path)?,
        None => StreamConfig::default(),
    };
    let run_for = Duration::from_secs(args.next().map(|s| s.parse()).transpose()?.unwrap_or(10));

    let host_format = HostAudioFormat {
        sample_rate: 48_000,
        channels: 2,
    };

    let mut source = SourcePipeline::new(config.source, host_format)?;
    let mut client = ClientPipeline::new(config.client)?;

    source.start()?;
    client.start()?;
    let mut link = LoopbackLink::start(source.packet_source(), client.packet_sink())?;

    tracing::info!("streaming a 440 Hz tone over loopback for {:?}", run_for);

    // 10 ms of stereo audio per iteration, the cadence a host DSP buffer of
    // 480 frames would produce.
    let chunk_frames = 480usize;
    let mut input = source.input_handle();
    let mut output = None;
    let mut push_buffer = vec![0.0f32; chunk_frames * 2];
    let mut pull_buffer = vec![0.0f32; chunk_frames * 2];
    let mut clock = 0u64;
    let mut pulled: u64 = 0;
    let mut underruns: u64 = 0;

    let started = Instant::now();
    let mut last_report = started;
    while started.elapsed() < run_for {
        for frame in 0..chunk_frames {
            let t = (clock + frame as u64) as f32 / 48_000.0;
            let sample = (t * 440.0 * 2.0 * std::f32::consts::PI).sin() * 0.5;
            push_buffer[frame * 2] = sample;
            push_buffer[frame * 2 + 1] = sample;
        }
        clock += chunk_frames as u64;
        input.push(&mut push_buffer);

        // Playback starts only once the session header has arrived.
        if output.is_none() {
            output = client.output_handle();
            if output.is_some() {
                tracing::info!("session negotiated: {:?}", client.session());
            }
        }
        if let Some(ref output) = output {
            if !output.pull(&mut pull_buffer) {
                underruns += 1;
            }
            pulled += pull_buffer.len() as u64;
        }

        if last_report.elapsed() >= Duration::from_secs(1) {
            let source_stats = source.stats();
            let client_stats = client.stats();
            tracing::info!(
                "encoded {} packets ({:.1} KB), decoded {}, queues {}/{}, buffered {} samples, {} pull underruns",
                source_stats.packets_encoded,
                source_stats.bytes_encoded as f64 / 1024.0,
                client_stats.packets_decoded,
                source.queued_packets(),
                client.queued_packets(),
                client.buffered_samples(),
                underruns,
            );
            if let Some(info) = client.last_packet_info() {
                tracing::debug!("last packet: {:?}", info);
            }
            last_report = Instant::now();
        }

        std::thread::sleep(Duration::from_millis(10));
    }

    link.stop();
    source.stop();
    client.stop();

    let source_stats = source.stats();
    let client_stats = client.stats();
    tracing::info!(
        "done: {} packets encoded, {} decoded, {} discarded, {} samples pulled, {} underruns",
        source_stats.packets_encoded,
        client_stats.packets_decoded,
        client_stats.packets_discarded,
        pulled,
        underruns,
    );
    Ok(())
}
