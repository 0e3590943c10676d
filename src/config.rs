use crate::transport::Endpoint;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FramecastConfig {
    pub endpoint: EndpointConfig,
    pub reconnect: ReconnectConfig,
    pub keepalive: KeepaliveConfig,
    pub encoder: EncoderConfig,
    pub pipeline: PipelineConfig,
    pub capture: CaptureConfig,
    pub recording: RecordingConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EndpointConfig {
    /// Consumer address, `ws://host:port`
    #[serde(default = "default_endpoint_url")]
    pub url: String,

    /// Handshake timeout in seconds
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect attempt in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Backoff growth factor between consecutive attempts
    #[serde(default = "default_multiplier")]
    pub multiplier: u32,

    /// Consecutive failed attempts before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct KeepaliveConfig {
    /// Seconds between liveness pings
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,

    /// Seconds to wait for the pong answering a ping
    #[serde(default = "default_pong_timeout")]
    pub pong_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EncoderConfig {
    /// JPEG quality, 1-100
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Frames waiting for the encoder before new ones are dropped
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CaptureConfig {
    /// Synthetic source frame width
    #[serde(default = "default_capture_width")]
    pub width: u32,

    /// Synthetic source frame height
    #[serde(default = "default_capture_height")]
    pub height: u32,

    /// Synthetic source frames per second
    #[serde(default = "default_capture_fps")]
    pub fps: u32,

    /// Interleave one audio buffer every N video frames (0 disables)
    #[serde(default = "default_audio_every")]
    pub audio_every: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RecordingConfig {
    /// Elapsed time publication interval in milliseconds
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Stop the recording once the connection has been given up
    #[serde(default = "default_stop_on_give_up")]
    pub stop_on_give_up: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

impl EndpointConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}

impl ReconnectConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

impl KeepaliveConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn pong_timeout(&self) -> Duration {
        Duration::from_secs(self.pong_timeout_secs)
    }
}

impl RecordingConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl FramecastConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("framecast.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("endpoint.url", default_endpoint_url())?
            .set_default(
                "endpoint.handshake_timeout_secs",
                default_handshake_timeout(),
            )?
            .set_default("reconnect.base_delay_ms", default_base_delay_ms())?
            .set_default("reconnect.multiplier", default_multiplier())?
            .set_default("reconnect.max_attempts", default_max_attempts())?
            .set_default("keepalive.ping_interval_secs", default_ping_interval())?
            .set_default("keepalive.pong_timeout_secs", default_pong_timeout())?
            .set_default("encoder.jpeg_quality", default_jpeg_quality() as u64)?
            .set_default(
                "pipeline.queue_capacity",
                default_queue_capacity() as u64,
            )?
            .set_default("capture.width", default_capture_width())?
            .set_default("capture.height", default_capture_height())?
            .set_default("capture.fps", default_capture_fps())?
            .set_default("capture.audio_every", default_audio_every())?
            .set_default("recording.tick_interval_ms", default_tick_interval_ms())?
            .set_default("recording.stop_on_give_up", default_stop_on_give_up())?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as u64,
            )?
            .add_source(File::with_name(&path_str).required(false))
            // FRAMECAST_RECONNECT__MAX_ATTEMPTS style keys; single underscores stay in field names
            .add_source(
                Environment::with_prefix("FRAMECAST")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: FramecastConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        Endpoint::parse(&self.endpoint.url)
            .map_err(|e| ConfigError::Message(e.to_string()))?;

        if self.endpoint.handshake_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "Endpoint handshake_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.reconnect.base_delay_ms == 0 {
            return Err(ConfigError::Message(
                "Reconnect base_delay_ms must be greater than 0".to_string(),
            ));
        }

        if self.reconnect.multiplier == 0 {
            return Err(ConfigError::Message(
                "Reconnect multiplier must be at least 1".to_string(),
            ));
        }

        if self.reconnect.max_attempts == 0 {
            return Err(ConfigError::Message(
                "Reconnect max_attempts must be greater than 0".to_string(),
            ));
        }

        if self.keepalive.ping_interval_secs == 0 {
            return Err(ConfigError::Message(
                "Keepalive ping_interval_secs must be greater than 0".to_string(),
            ));
        }

        if self.keepalive.pong_timeout_secs == 0
            || self.keepalive.pong_timeout_secs >= self.keepalive.ping_interval_secs
        {
            return Err(ConfigError::Message(
                "Keepalive pong_timeout_secs must be greater than 0 and less than ping_interval_secs"
                    .to_string(),
            ));
        }

        if !(1..=100).contains(&self.encoder.jpeg_quality) {
            return Err(ConfigError::Message(
                "Encoder jpeg_quality must be between 1 and 100".to_string(),
            ));
        }

        if self.pipeline.queue_capacity == 0 {
            return Err(ConfigError::Message(
                "Pipeline queue_capacity must be greater than 0".to_string(),
            ));
        }

        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(ConfigError::Message(
                "Capture resolution must be greater than 0".to_string(),
            ));
        }

        if self.capture.fps == 0 {
            return Err(ConfigError::Message(
                "Capture fps must be greater than 0".to_string(),
            ));
        }

        if self.recording.tick_interval_ms == 0 {
            return Err(ConfigError::Message(
                "Recording tick_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for FramecastConfig {
    fn default() -> Self {
        Self {
            endpoint: EndpointConfig {
                url: default_endpoint_url(),
                handshake_timeout_secs: default_handshake_timeout(),
            },
            reconnect: ReconnectConfig {
                base_delay_ms: default_base_delay_ms(),
                multiplier: default_multiplier(),
                max_attempts: default_max_attempts(),
            },
            keepalive: KeepaliveConfig {
                ping_interval_secs: default_ping_interval(),
                pong_timeout_secs: default_pong_timeout(),
            },
            encoder: EncoderConfig {
                jpeg_quality: default_jpeg_quality(),
            },
            pipeline: PipelineConfig {
                queue_capacity: default_queue_capacity(),
            },
            capture: CaptureConfig {
                width: default_capture_width(),
                height: default_capture_height(),
                fps: default_capture_fps(),
                audio_every: default_audio_every(),
            },
            recording: RecordingConfig {
                tick_interval_ms: default_tick_interval_ms(),
                stop_on_give_up: default_stop_on_give_up(),
            },
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
            },
        }
    }
}

// Default value functions
fn default_endpoint_url() -> String {
    "ws://localhost:8080".to_string()
}
fn default_handshake_timeout() -> u64 {
    30
}

fn default_base_delay_ms() -> u64 {
    1000
}
fn default_multiplier() -> u32 {
    2
}
fn default_max_attempts() -> u32 {
    5
}

fn default_ping_interval() -> u64 {
    30
}
fn default_pong_timeout() -> u64 {
    10
}

fn default_jpeg_quality() -> u8 {
    50
}

fn default_queue_capacity() -> usize {
    4
}

fn default_capture_width() -> u32 {
    640
}
fn default_capture_height() -> u32 {
    360
}
fn default_capture_fps() -> u32 {
    10
}
fn default_audio_every() -> u32 {
    0
}

fn default_tick_interval_ms() -> u64 {
    1000
}
fn default_stop_on_give_up() -> bool {
    false
}

fn default_event_bus_capacity() -> usize {
    100
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::io::Write;

    // Loading reads the process environment; tests that load must not overlap the env test
    static ENV_LOCK: Mutex<()> = parking_lot::const_mutex(());

    #[test]
    fn test_default_config() {
        let config = FramecastConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.endpoint.url, "ws://localhost:8080");
        assert_eq!(config.reconnect.base_delay(), Duration::from_secs(1));
        assert_eq!(config.reconnect.multiplier, 2);
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.keepalive.ping_interval(), Duration::from_secs(30));
        assert_eq!(config.encoder.jpeg_quality, 50);
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let _env = ENV_LOCK.lock();
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            "[endpoint]\nurl = \"ws://10.0.0.5:8080\"\n\n[reconnect]\nmax_attempts = 3\n"
        )
        .unwrap();

        let config = FramecastConfig::load_from_file(file.path()).unwrap();

        assert_eq!(config.endpoint.url, "ws://10.0.0.5:8080");
        assert_eq!(config.reconnect.max_attempts, 3);
        // Untouched keys keep their defaults
        assert_eq!(config.reconnect.base_delay_ms, 1000);
        assert_eq!(config.encoder.jpeg_quality, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let _env = ENV_LOCK.lock();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");

        let config = FramecastConfig::load_from_file(&path).unwrap();
        assert_eq!(config, FramecastConfig::default());
    }

    #[test]
    fn test_environment_overrides_file_and_defaults() {
        let _env = ENV_LOCK.lock();
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(file, "[reconnect]\nmax_attempts = 7\n").unwrap();

        std::env::set_var("FRAMECAST_RECONNECT__MAX_ATTEMPTS", "3");
        std::env::set_var("FRAMECAST_RECORDING__STOP_ON_GIVE_UP", "true");
        std::env::set_var("FRAMECAST_KEEPALIVE__PONG_TIMEOUT_SECS", "5");
        let loaded = FramecastConfig::load_from_file(file.path());
        std::env::remove_var("FRAMECAST_RECONNECT__MAX_ATTEMPTS");
        std::env::remove_var("FRAMECAST_RECORDING__STOP_ON_GIVE_UP");
        std::env::remove_var("FRAMECAST_KEEPALIVE__PONG_TIMEOUT_SECS");

        let config = loaded.unwrap();
        assert_eq!(config.reconnect.max_attempts, 3);
        assert!(config.recording.stop_on_give_up);
        assert_eq!(config.keepalive.pong_timeout(), Duration::from_secs(5));
        assert_eq!(config.reconnect.base_delay_ms, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = FramecastConfig::default();

        config.endpoint.url = "http://localhost:8080".to_string();
        assert!(config.validate().is_err());

        config.endpoint.url = "ws://localhost:8080".to_string();
        config.encoder.jpeg_quality = 0;
        assert!(config.validate().is_err());

        config.encoder.jpeg_quality = 50;
        config.reconnect.max_attempts = 0;
        assert!(config.validate().is_err());

        config.reconnect.max_attempts = 5;
        assert!(config.validate().is_ok());

        config.keepalive.pong_timeout_secs = 30;
        assert!(config.validate().is_err());
        config.keepalive.pong_timeout_secs = 10;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_round_trip_of_defaults() {
        let rendered = FramecastConfig::default().to_toml().unwrap();
        assert!(rendered.contains("[reconnect]"));
        assert!(rendered.contains("max_attempts = 5"));
    }
}
