//! Application configuration
//!
//! Stored as YAML in the data root (`config.yaml`). Every endpoint address,
//! port and timing value used by discovery, the parameter tree client and
//! the readiness detector comes from here instead of being hardcoded.
//!
//! # Usage
//!
//! ```ignore
//! use fitcheck_core::config::{config_path, default_data_root, load_config, FitCheckConfig};
//!
//! let root = default_data_root();
//! let config: FitCheckConfig = load_config(&config_path(&root));
//! ```

mod io;
mod paths;

pub use io::{load_config, save_config, write_atomic};
pub use paths::{config_path, default_data_root, presets_dir, settings_path, DATA_ROOT_ENV};

use crate::blacklist::BlacklistRules;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FitCheckConfig {
    pub discovery: DiscoveryConfig,
    pub osc: OscConfig,
    pub readiness: ReadinessSettings,
    pub blacklist: BlacklistRules,
    pub notifications: NotificationConfig,
}

/// Service advertisement matching
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Fully qualified service type to browse
    pub service_type: String,
    /// Instance name prefix to accept (case-insensitive)
    pub name_prefix: String,
    /// How long to wait for an advertisement
    pub timeout_secs: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            service_type: "_oscjson._tcp.local.".to_string(),
            name_prefix: "VRChat".to_string(),
            timeout_secs: 10,
        }
    }
}

impl DiscoveryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// UDP control protocol endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OscConfig {
    /// Host the application listens on
    pub host: IpAddr,
    /// Port the application receives control messages on
    pub send_port: u16,
    /// Local port the application reports changes to
    pub listen_port: u16,
}

impl Default for OscConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            send_port: 9000,
            listen_port: 9001,
        }
    }
}

impl OscConfig {
    /// Destination for outbound control messages
    pub fn send_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.send_port)
    }

    /// Local bind address for inbound notifications
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.listen_port)
    }
}

/// Avatar-change readiness timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessSettings {
    /// Overall deadline for a switch to settle
    pub timeout_ms: u64,
    /// Quiet period without new parameter names before declaring stable
    pub quiet_ms: u64,
    /// Predicate polling interval
    pub poll_interval_ms: u64,
    /// Distinct parameter names required after the change acknowledgement
    pub min_params: usize,
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            quiet_ms: 300,
            poll_interval_ms: 25,
            min_params: 1,
        }
    }
}

/// Overlay notification delivery
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,
    /// Local UDP port of the overlay
    pub port: u16,
    /// How long a toast stays on screen
    pub timeout_secs: f32,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: crate::notify::DEFAULT_OVERLAY_PORT,
            timeout_secs: 5.0,
        }
    }
}
