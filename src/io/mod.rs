//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `mqtt` - MQTT client for receiving detection frames
//! - `replay` - JSONL frame replay for offline runs
//! - `http_api` - Query/config HTTP API and Prometheus metrics endpoint

pub mod http_api;
pub mod mqtt;
pub mod replay;

// Re-export commonly used types
pub use http_api::{start_api_server, ApiContext};
pub use mqtt::{parse_frame, start_mqtt_client};
pub use replay::{replay_file, replay_period, ReplaySummary};
