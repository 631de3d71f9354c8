//! Configuration loading from TOML files
//!
//! Config file is selected via `--config <path>` (default: config/dev.toml).
//! A missing file falls back to `Config::default()`. Any other read failure,
//! a parse failure, or invalid values (region, frame bounds, channel
//! capacity, replay fps) are load errors.

use crate::domain::region::RegionState;
use crate::domain::types::Point;
use crate::io::replay::replay_period;
use crate::services::classifier::BoundaryPolicy;
use crate::services::query::FrameBounds;
use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SiteConfig {
    /// Identifier used as the MQTT client id prefix and Prometheus label
    #[serde(default = "default_site_id")]
    pub id: String,
}

fn default_site_id() -> String {
    "region-counter".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_bind_address")]
    pub bind_address: String,
    /// HTTP API port (0 to disable)
    #[serde(default = "default_api_port")]
    pub port: u16,
}

fn default_api_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8000
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { bind_address: default_api_bind_address(), port: default_api_port() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_mqtt_host")]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default = "default_mqtt_topic")]
    pub topic: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_mqtt_topic() -> String {
    "detections/#".to_string()
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            topic: default_mqtt_topic(),
            username: None,
            password: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_broker_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
}

fn default_broker_bind_address() -> String {
    "0.0.0.0".to_string()
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self { enabled: false, bind_address: default_broker_bind_address(), port: default_mqtt_port() }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ReplayConfig {
    /// JSONL file with one frame per line
    #[serde(default)]
    pub file: Option<String>,
    /// Pacing in frames per second (0 = as fast as possible, else 0.001..=1000)
    #[serde(default)]
    pub fps: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    #[serde(default = "default_target_class")]
    pub target_class: String,
    #[serde(default)]
    pub min_confidence: f32,
    /// Bounded ingestion channel size
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_target_class() -> String {
    "person".to_string()
}

fn default_channel_capacity() -> usize {
    1000
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            target_class: default_target_class(),
            min_confidence: 0.0,
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RegionConfig {
    /// Initial polygon; fewer than 4 points starts pending
    #[serde(default)]
    pub points: Vec<Point>,
    #[serde(default)]
    pub boundary: BoundaryPolicy,
    #[serde(default)]
    pub frame_width: Option<u32>,
    #[serde(default)]
    pub frame_height: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

fn default_metrics_interval() -> u64 {
    10
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub region: RegionConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    api_bind_address: String,
    api_port: u16,
    mqtt_enabled: bool,
    mqtt_host: String,
    mqtt_port: u16,
    mqtt_topic: String,
    mqtt_username: Option<String>,
    mqtt_password: Option<String>,
    broker_enabled: bool,
    broker_bind_address: String,
    broker_port: u16,
    replay_file: Option<String>,
    replay_fps: f64,
    target_class: String,
    min_confidence: f32,
    channel_capacity: usize,
    initial_region: RegionState,
    boundary_policy: BoundaryPolicy,
    frame_bounds: Option<FrameBounds>,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site_id: default_site_id(),
            api_bind_address: default_api_bind_address(),
            api_port: default_api_port(),
            mqtt_enabled: true,
            mqtt_host: default_mqtt_host(),
            mqtt_port: default_mqtt_port(),
            mqtt_topic: default_mqtt_topic(),
            mqtt_username: None,
            mqtt_password: None,
            broker_enabled: false,
            broker_bind_address: default_broker_bind_address(),
            broker_port: default_mqtt_port(),
            replay_file: None,
            replay_fps: 0.0,
            target_class: default_target_class(),
            min_confidence: 0.0,
            channel_capacity: default_channel_capacity(),
            initial_region: RegionState::default(),
            boundary_policy: BoundaryPolicy::Inclusive,
            frame_bounds: None,
            metrics_interval_secs: default_metrics_interval(),
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        Self::from_toml(&content, &path.display().to_string())
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    fn from_toml(content: &str, source: &str) -> anyhow::Result<Self> {
        let toml_config: TomlConfig = toml::from_str(content)?;

        let initial_region = RegionState::from_points(&toml_config.region.points)
            .context("invalid [region] points")?;

        let frame_bounds = match (toml_config.region.frame_width, toml_config.region.frame_height) {
            (Some(width), Some(height)) => Some(FrameBounds { width, height }),
            (None, None) => None,
            _ => anyhow::bail!("[region] frame_width and frame_height must be set together"),
        };

        if toml_config.detection.channel_capacity == 0 {
            anyhow::bail!("[detection] channel_capacity must be positive");
        }

        replay_period(toml_config.replay.fps).context("invalid [replay] fps")?;

        Ok(Self {
            site_id: toml_config.site.id,
            api_bind_address: toml_config.api.bind_address,
            api_port: toml_config.api.port,
            mqtt_enabled: toml_config.mqtt.enabled,
            mqtt_host: toml_config.mqtt.host,
            mqtt_port: toml_config.mqtt.port,
            mqtt_topic: toml_config.mqtt.topic,
            mqtt_username: toml_config.mqtt.username,
            mqtt_password: toml_config.mqtt.password,
            broker_enabled: toml_config.broker.enabled,
            broker_bind_address: toml_config.broker.bind_address,
            broker_port: toml_config.broker.port,
            replay_file: toml_config.replay.file,
            replay_fps: toml_config.replay.fps,
            target_class: toml_config.detection.target_class,
            min_confidence: toml_config.detection.min_confidence,
            channel_capacity: toml_config.detection.channel_capacity,
            initial_region,
            boundary_policy: toml_config.region.boundary,
            frame_bounds,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file: source.to_string(),
        })
    }

    /// Load configuration - uses defaults only when the file does not exist
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        match fs::metadata(path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(config_file = %path.display(), "config_file_missing_using_defaults");
                Ok(Self::default())
            }
            _ => Self::from_file(path),
        }
    }

    // Getters for all config fields
    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn api_bind_address(&self) -> &str {
        &self.api_bind_address
    }

    pub fn api_port(&self) -> u16 {
        self.api_port
    }

    pub fn mqtt_enabled(&self) -> bool {
        self.mqtt_enabled
    }

    pub fn mqtt_host(&self) -> &str {
        &self.mqtt_host
    }

    pub fn mqtt_port(&self) -> u16 {
        self.mqtt_port
    }

    pub fn mqtt_topic(&self) -> &str {
        &self.mqtt_topic
    }

    pub fn mqtt_username(&self) -> Option<&str> {
        self.mqtt_username.as_deref()
    }

    pub fn mqtt_password(&self) -> Option<&str> {
        self.mqtt_password.as_deref()
    }

    pub fn broker_enabled(&self) -> bool {
        self.broker_enabled
    }

    pub fn broker_bind_address(&self) -> &str {
        &self.broker_bind_address
    }

    pub fn broker_port(&self) -> u16 {
        self.broker_port
    }

    pub fn replay_file(&self) -> Option<&str> {
        self.replay_file.as_deref()
    }

    pub fn replay_fps(&self) -> f64 {
        self.replay_fps
    }

    pub fn target_class(&self) -> &str {
        &self.target_class
    }

    pub fn min_confidence(&self) -> f32 {
        self.min_confidence
    }

    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity
    }

    pub fn initial_region(&self) -> &RegionState {
        &self.initial_region
    }

    pub fn boundary_policy(&self) -> BoundaryPolicy {
        self.boundary_policy
    }

    pub fn frame_bounds(&self) -> Option<FrameBounds> {
        self.frame_bounds
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method to set the detection filters
    pub fn with_detection_filter(mut self, target_class: &str, min_confidence: f32) -> Self {
        self.target_class = target_class.to_string();
        self.min_confidence = min_confidence;
        self
    }

    /// Builder method to set the boundary convention
    pub fn with_boundary_policy(mut self, policy: BoundaryPolicy) -> Self {
        self.boundary_policy = policy;
        self
    }

    /// Builder method to override the replay source (used by `--replay`/`--fps`)
    pub fn with_replay(mut self, file: Option<String>, fps: Option<f64>) -> anyhow::Result<Self> {
        if file.is_some() {
            self.replay_file = file;
        }
        if let Some(fps) = fps {
            replay_period(fps).context("invalid --fps")?;
            self.replay_fps = fps;
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.api_port(), 8000);
        assert_eq!(config.mqtt_host(), "localhost");
        assert_eq!(config.mqtt_port(), 1883);
        assert!(config.mqtt_enabled());
        assert!(!config.broker_enabled());
        assert_eq!(config.target_class(), "person");
        assert_eq!(config.min_confidence(), 0.0);
        assert_eq!(config.channel_capacity(), 1000);
        assert_eq!(config.boundary_policy(), BoundaryPolicy::Inclusive);
        assert!(!config.initial_region().is_active());
        assert!(config.frame_bounds().is_none());
        assert!(config.replay_file().is_none());
    }

    #[test]
    fn test_empty_toml_matches_defaults() {
        let config = Config::from_toml("", "inline").unwrap();
        assert_eq!(config.api_port(), Config::default().api_port());
        assert_eq!(config.mqtt_topic(), Config::default().mqtt_topic());
        assert_eq!(config.metrics_interval_secs(), 10);
        assert_eq!(config.config_file(), "inline");
    }

    #[test]
    fn test_region_section() {
        let config = Config::from_toml(
            r#"
[region]
points = [[0, 0], [10, 0], [10, 10], [0, 10]]
boundary = "exclusive"
frame_width = 640
frame_height = 480
"#,
            "inline",
        )
        .unwrap();

        assert!(config.initial_region().is_active());
        assert_eq!(config.initial_region().points()[1], Point::new(10, 0));
        assert_eq!(config.boundary_policy(), BoundaryPolicy::Exclusive);
        assert_eq!(config.frame_bounds(), Some(FrameBounds { width: 640, height: 480 }));
    }

    #[test]
    fn test_partial_region_starts_pending() {
        let config =
            Config::from_toml("[region]\npoints = [[0, 0], [10, 0]]\n", "inline").unwrap();
        assert!(!config.initial_region().is_active());
        assert_eq!(config.initial_region().points().len(), 2);
    }

    #[test]
    fn test_too_many_region_points_rejected() {
        let result = Config::from_toml(
            "[region]\npoints = [[0, 0], [1, 0], [1, 1], [0, 1], [2, 2]]\n",
            "inline",
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_half_frame_bounds_rejected() {
        assert!(Config::from_toml("[region]\nframe_width = 640\n", "inline").is_err());
    }

    #[test]
    fn test_zero_channel_capacity_rejected() {
        assert!(Config::from_toml("[detection]\nchannel_capacity = 0\n", "inline").is_err());
    }

    #[test]
    fn test_with_replay_overrides_only_given_values() {
        let config =
            Config::default().with_replay(Some("frames.jsonl".to_string()), None).unwrap();
        assert_eq!(config.replay_file(), Some("frames.jsonl"));
        assert_eq!(config.replay_fps(), 0.0);

        let config = config.with_replay(None, Some(15.0)).unwrap();
        assert_eq!(config.replay_file(), Some("frames.jsonl"));
        assert_eq!(config.replay_fps(), 15.0);
    }

    #[test]
    fn test_with_replay_rejects_unusable_fps() {
        for fps in [f64::INFINITY, f64::NAN, -2.0, 1e-320, 5000.0] {
            assert!(Config::default().with_replay(None, Some(fps)).is_err(), "fps {}", fps);
        }
    }

    #[test]
    fn test_replay_fps_section_validated() {
        let config = Config::from_toml("[replay]\nfps = 25.0\n", "inline").unwrap();
        assert_eq!(config.replay_fps(), 25.0);

        for fps in ["inf", "nan", "-1.0", "1e-320", "1e9"] {
            let content = format!("[replay]\nfps = {}\n", fps);
            assert!(Config::from_toml(&content, "inline").is_err(), "fps {}", fps);
        }
    }
}
