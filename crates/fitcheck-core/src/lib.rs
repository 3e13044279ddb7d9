//! FitCheck Core - Avatar parameter presets over OSC/OSCQuery
//!
//! Discovers the application's endpoint, snapshots avatar parameters into
//! file-backed presets, and replays them (switching avatars first when
//! needed).

pub mod blacklist;
pub mod client;
pub mod config;
pub mod discovery;
pub mod endpoint;
pub mod error;
pub mod notify;
pub mod osc;
pub mod readiness;
pub mod settings;
pub mod store;
pub mod tree;
pub mod types;

pub use blacklist::BlacklistRules;
pub use client::ParameterTreeClient;
pub use discovery::{Endpoint, EndpointLocator};
pub use endpoint::{AvatarEndpoint, LiveEndpoint};
pub use error::{FitCheckError, Result};
pub use readiness::{ReadinessCriteria, ReadinessDetector, ReadinessPhase};
pub use settings::Settings;
pub use store::{ApplyReport, PresetStore};
pub use types::*;
