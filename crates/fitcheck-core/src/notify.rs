//! Overlay toast notifications
//!
//! The overlay accepts one JSON document per UDP datagram and only listens
//! on localhost. Delivery is fire-and-forget.

use crate::error::Result;
use regex::Regex;
use serde::Serialize;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::OnceLock;

/// Default overlay notification port
pub const DEFAULT_OVERLAY_PORT: u16 = 42069;

/// Notification popup (as opposed to media player info)
const MESSAGE_TYPE_POPUP: u8 = 1;

/// Notification document understood by the overlay
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayNotification {
    /// Supports rich text
    pub title: String,
    pub source_app: String,
    /// Seconds on screen
    pub timeout: f32,
    /// Empty content gives a small notification
    pub content: String,
    /// Base64 image, file path, or `default`/`error`/`warning`
    pub icon: String,
    /// `.ogg` path or `default`/`error`/`warning`; empty is silent
    pub audio_path: String,
    pub opacity: f32,
    pub volume: f32,
    pub message_type: u8,
    pub height: f32,
    pub index: u32,
    pub use_base64_icon: bool,
}

impl OverlayNotification {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            source_app: "FitCheck".to_string(),
            timeout: 5.0,
            content: content.into(),
            icon: String::new(),
            audio_path: String::new(),
            opacity: 1.0,
            volume: 0.7,
            message_type: MESSAGE_TYPE_POPUP,
            height: 175.0,
            index: 0,
            use_base64_icon: false,
        }
    }

    /// Set the icon; the base64 flag follows the icon string
    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self.use_base64_icon = is_base64(&self.icon);
        self
    }

    pub fn with_timeout(mut self, seconds: f32) -> Self {
        self.timeout = seconds;
        self
    }

    /// Send to the overlay on localhost
    pub fn send(&self, port: u16) -> Result<()> {
        let payload = serde_json::to_vec(self)?;
        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0))?;
        socket.send_to(&payload, SocketAddr::from((Ipv4Addr::LOCALHOST, port)))?;
        log::debug!("Notify: Sent '{}' to overlay port {}", self.title, port);
        Ok(())
    }
}

/// Check whether a string is standard padded base64
///
/// An empty string is not treated as an icon.
pub fn is_base64(data: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"^([A-Za-z0-9+/]{4})*([A-Za-z0-9+/]{3}=|[A-Za-z0-9+/]{2}==)?$").ok()
    });
    !data.is_empty() && pattern.as_ref().is_some_and(|re| re.is_match(data))
}
