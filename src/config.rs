//! Pipeline configuration
//!
//! Plain data structs passed at construction, loadable from TOML. Everything
//! has a sensible default wired to [`crate::constants`].

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::constants::*;
use crate::error::{ConfigError, Error};

/// Legal Opus frame sizes at the 48 kHz transport rate, in samples per
/// channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum FrameSize {
    F120,
    F240,
    F480,
    F960,
    F1920,
    F2880,
}

impl FrameSize {
    pub fn samples_per_channel(self) -> usize {
        match self {
            FrameSize::F120 => 120,
            FrameSize::F240 => 240,
            FrameSize::F480 => 480,
            FrameSize::F960 => 960,
            FrameSize::F1920 => 1920,
            FrameSize::F2880 => 2880,
        }
    }

    /// Total interleaved samples in one transport frame
    pub fn samples_per_frame(self) -> usize {
        self.samples_per_channel() * TRANSPORT_CHANNELS as usize
    }

    pub fn duration_ms(self) -> f32 {
        self.samples_per_channel() as f32 * 1000.0 / TRANSPORT_SAMPLE_RATE as f32
    }
}

impl Default for FrameSize {
    fn default() -> Self {
        FrameSize::F960
    }
}

impl TryFrom<u32> for FrameSize {
    type Error = ConfigError;

    fn try_from(value: u32) -> Result<Self, ConfigError> {
        match value {
            120 => Ok(FrameSize::F120),
            240 => Ok(FrameSize::F240),
            480 => Ok(FrameSize::F480),
            960 => Ok(FrameSize::F960),
            1920 => Ok(FrameSize::F1920),
            2880 => Ok(FrameSize::F2880),
            other => Err(ConfigError::InvalidFrameSize(other)),
        }
    }
}

impl From<FrameSize> for u32 {
    fn from(value: FrameSize) -> u32 {
        value.samples_per_channel() as u32
    }
}

/// Encoder application hint, fixed at encoder creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CodecApplication {
    /// Broadcast / high-fidelity
    #[default]
    Audio,
    /// Lowest achievable latency, voice modes unused
    LowDelay,
    /// VoIP / videoconference
    Voip,
}

/// Rate-control mode, changeable while the encoder runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RateControl {
    #[default]
    Cbr,
    Vbr,
    ConstrainedVbr,
}

/// Source (encoder) pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Identifier used in logs and events
    pub name: String,

    /// Opus bitrate in kbit/s (6-510)
    pub bitrate_kbps: u32,

    /// Opus encoder complexity (0-10)
    pub complexity: u8,

    pub rate_control: RateControl,

    /// Samples per channel per compressed frame
    pub frame_size: FrameSize,

    pub application: CodecApplication,

    /// Gain applied to the host's callback buffer after capture; does not
    /// modify the sent audio
    pub monitor_volume: f32,

    /// Outbound packet queue capacity
    pub queue_capacity: usize,

    /// Accumulation ring capacity in samples
    pub accumulator_capacity: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            name: "source".to_string(),
            bitrate_kbps: DEFAULT_BITRATE_KBPS,
            complexity: DEFAULT_COMPLEXITY,
            rate_control: RateControl::default(),
            frame_size: FrameSize::default(),
            application: CodecApplication::default(),
            monitor_volume: 1.0,
            queue_capacity: PACKET_QUEUE_CAPACITY,
            accumulator_capacity: ACCUMULATOR_CAPACITY,
        }
    }
}

impl SourceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(6..=510).contains(&self.bitrate_kbps) {
            return Err(ConfigError::OutOfRange {
                field: "bitrate_kbps",
                value: self.bitrate_kbps.to_string(),
            });
        }
        if self.complexity > 10 {
            return Err(ConfigError::OutOfRange {
                field: "complexity",
                value: self.complexity.to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.monitor_volume) {
            return Err(ConfigError::OutOfRange {
                field: "monitor_volume",
                value: self.monitor_volume.to_string(),
            });
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::OutOfRange {
                field: "queue_capacity",
                value: "0".to_string(),
            });
        }
        if self.accumulator_capacity < self.frame_size.samples_per_frame() {
            return Err(ConfigError::OutOfRange {
                field: "accumulator_capacity",
                value: self.accumulator_capacity.to_string(),
            });
        }
        Ok(())
    }
}

/// Client (decoder) pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Identifier used in logs and events
    pub name: String,

    /// Playback gain applied in the pull callback
    pub volume: f32,

    /// Inbound packet queue capacity
    pub queue_capacity: usize,

    /// Output ring capacity in samples
    pub output_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name: "client".to_string(),
            volume: 1.0,
            queue_capacity: PACKET_QUEUE_CAPACITY,
            output_capacity: TRANSPORT_SAMPLE_RATE as usize
                * TRANSPORT_CHANNELS as usize
                * OUTPUT_BUFFER_SECONDS,
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.volume) {
            return Err(ConfigError::OutOfRange {
                field: "volume",
                value: self.volume.to_string(),
            });
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::OutOfRange {
                field: "queue_capacity",
                value: "0".to_string(),
            });
        }
        if self.output_capacity == 0 {
            return Err(ConfigError::OutOfRange {
                field: "output_capacity",
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

/// Both pipeline configs, as loaded from a single TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub source: SourceConfig,
    pub client: ClientConfig,
}

impl StreamConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: StreamConfig =
            toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.source.validate()?;
        config.client.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let raw = std::fs::read_to_string(path)?;
        Ok(Self::from_toml_str(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = StreamConfig::default();
        config.source.validate().unwrap();
        config.client.validate().unwrap();
        assert_eq!(config.source.frame_size.samples_per_channel(), 960);
        assert_eq!(config.client.output_capacity, 480_000);
    }

    #[test]
    fn frame_size_duration() {
        assert_eq!(FrameSize::F120.duration_ms(), 2.5);
        assert_eq!(FrameSize::F960.duration_ms(), 20.0);
        assert_eq!(FrameSize::F2880.samples_per_frame(), 5760);
    }

    #[test]
    fn illegal_frame_size_is_rejected() {
        assert!(matches!(
            FrameSize::try_from(1000),
            Err(ConfigError::InvalidFrameSize(1000))
        ));
    }

    #[test]
    fn toml_roundtrip() {
        let raw = r#"
            [source]
            name = "stage-mix"
            bitrate_kbps = 96
            complexity = 5
            rate_control = "constrained_vbr"
            frame_size = 480
            application = "low_delay"

            [client]
            volume = 0.5
        "#;
        let config = StreamConfig::from_toml_str(raw).unwrap();
        assert_eq!(config.source.name, "stage-mix");
        assert_eq!(config.source.bitrate_kbps, 96);
        assert_eq!(config.source.rate_control, RateControl::ConstrainedVbr);
        assert_eq!(config.source.frame_size, FrameSize::F480);
        assert_eq!(config.source.application, CodecApplication::LowDelay);
        assert_eq!(config.client.volume, 0.5);
        // Unspecified fields keep their defaults.
        assert_eq!(config.client.queue_capacity, 100);
    }

    #[test]
    fn out_of_range_bitrate_fails_validation() {
        let raw = "[source]\nbitrate_kbps = 511\n";
        let err = StreamConfig::from_toml_str(raw).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::OutOfRange {
                field: "bitrate_kbps",
                ..
            }
        ));
    }

    #[test]
    fn bad_frame_size_fails_parse() {
        let raw = "[source]\nframe_size = 100\n";
        assert!(StreamConfig::from_toml_str(raw).is_err());
    }
}
