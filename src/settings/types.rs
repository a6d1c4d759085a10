use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::display::StereoLayout;
use crate::frame::zoom::clamp_zoom;
use crate::net::ConnectionConfig;
use crate::render::RenderConfig;

/// Where the pose server lives and how hard to try reaching it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub connect_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub reconnect_interval_ms: u64,
    pub max_payload: u32,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9999,
            connect_timeout_ms: 4000,
            write_timeout_ms: 4000,
            reconnect_interval_ms: 2000,
            max_payload: frame_wire::DEFAULT_MAX_PAYLOAD,
        }
    }
}

/// Requested capture format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CaptureSettings {
    pub width: u32,
    pub height: u32,
    pub fps: f32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30.0,
        }
    }
}

/// Top-level settings file structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub server: ServerSettings,
    /// Ask the server to run inference on each frame.
    pub ml_enabled: bool,
    pub show_boxes: bool,
    pub show_skeletons: bool,
    pub zoom: f32,
    pub stereo_layout: StereoLayout,
    pub capture: CaptureSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            ml_enabled: false,
            show_boxes: true,
            show_skeletons: true,
            zoom: 1.0,
            stereo_layout: StereoLayout::default(),
            capture: CaptureSettings::default(),
        }
    }
}

impl Settings {
    pub fn connection_config(&self) -> ConnectionConfig {
        let mut config = ConnectionConfig::new(self.server.host.clone(), self.server.port);
        // Socket timeouts reject zero durations.
        config.connect_timeout = Duration::from_millis(self.server.connect_timeout_ms.max(1));
        config.write_timeout = Duration::from_millis(self.server.write_timeout_ms.max(1));
        config.reconnect_interval = Duration::from_millis(self.server.reconnect_interval_ms);
        config.max_payload = self.server.max_payload;
        config
    }

    pub fn render_config(&self) -> RenderConfig {
        RenderConfig {
            show_boxes: self.show_boxes,
            show_skeletons: self.show_skeletons,
        }
    }

    /// Zoom factor clamped into the supported range.
    pub fn zoom(&self) -> f32 {
        clamp_zoom(self.zoom)
    }

    /// Point the server settings at `host:port`.
    pub fn apply_server_override(&mut self, value: &str) -> Result<(), String> {
        let (host, port) = value
            .rsplit_once(':')
            .ok_or_else(|| format!("expected host:port, got '{value}'"))?;
        if host.is_empty() {
            return Err(format!("missing host in '{value}'"));
        }
        let port = port
            .parse::<u16>()
            .map_err(|e| format!("invalid port in '{value}': {e}"))?;
        self.server.host = host.trim_start_matches('[').trim_end_matches(']').to_string();
        self.server.port = port;
        Ok(())
    }
}
