//! Operator controls and the per-frame configuration snapshot.
//!
//! Controls are mutated from the command channel and read by the capture
//! thread once per frame. Everything downstream only sees the immutable
//! [`FrameConfig`] taken at capture time.

use parking_lot::Mutex;
use std::str::FromStr;
use std::time::{Duration, Instant};

use crate::frame::zoom::{clamp_zoom, MAX_ZOOM, MIN_ZOOM};
use crate::render::RenderConfig;
use crate::settings::Settings;

/// How long a zoom change takes to settle.
pub const ZOOM_ANIMATION: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    ToggleSkeletons,
    ToggleBoxes,
    ZoomIn,
    ZoomOut,
    SetZoom(f32),
    ToggleMl,
}

impl FromStr for Command {
    type Err = String;

    /// Parses operator phrases such as `zoom in`, `zoom 2.5`, `skeleton`,
    /// `boxes` or `ml`. Case and surrounding whitespace are ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        let words: Vec<&str> = normalized.split_whitespace().collect();
        let command = match words.as_slice() {
            ["skeleton" | "skeletons"] | ["toggle", "skeleton" | "skeletons"] => {
                Command::ToggleSkeletons
            }
            ["box" | "boxes"] | ["toggle", "box" | "boxes"] => Command::ToggleBoxes,
            ["zoom", "in"] => Command::ZoomIn,
            ["zoom", "out"] => Command::ZoomOut,
            ["zoom", factor] => Command::SetZoom(
                factor
                    .parse::<f32>()
                    .map_err(|e| format!("invalid zoom factor '{factor}': {e}"))?,
            ),
            ["ml"] | ["toggle", "ml"] => Command::ToggleMl,
            _ => return Err(format!("unknown command '{}'", s.trim())),
        };
        Ok(command)
    }
}

/// Everything a frame needs to know about the controls, captured once.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameConfig {
    pub render: RenderConfig,
    pub zoom: f32,
    /// Sent as the wire flag in remote mode.
    pub ml_enabled: bool,
}

#[derive(Debug, Clone, Copy)]
struct ZoomAnimation {
    from: f32,
    to: f32,
    started: Instant,
}

impl ZoomAnimation {
    fn settled(value: f32, now: Instant) -> Self {
        Self {
            from: value,
            to: value,
            started: now,
        }
    }

    /// Decelerating ease from `from` to `to` over [`ZOOM_ANIMATION`].
    fn value_at(&self, now: Instant) -> f32 {
        let elapsed = now.saturating_duration_since(self.started);
        let t = (elapsed.as_secs_f32() / ZOOM_ANIMATION.as_secs_f32()).min(1.0);
        let eased = 1.0 - (1.0 - t) * (1.0 - t);
        self.from + (self.to - self.from) * eased
    }
}

#[derive(Debug)]
struct ControlState {
    render: RenderConfig,
    ml_enabled: bool,
    zoom: ZoomAnimation,
}

pub struct Controls {
    state: Mutex<ControlState>,
}

impl Controls {
    pub fn new(render: RenderConfig, zoom: f32, ml_enabled: bool) -> Self {
        Self {
            state: Mutex::new(ControlState {
                render,
                ml_enabled,
                zoom: ZoomAnimation::settled(clamp_zoom(zoom), Instant::now()),
            }),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.render_config(), settings.zoom(), settings.ml_enabled)
    }

    pub fn apply(&self, command: Command) {
        self.apply_at(command, Instant::now());
    }

    fn apply_at(&self, command: Command, now: Instant) {
        let mut state = self.state.lock();
        match command {
            Command::ToggleSkeletons => state.render.show_skeletons = !state.render.show_skeletons,
            Command::ToggleBoxes => state.render.show_boxes = !state.render.show_boxes,
            Command::ToggleMl => state.ml_enabled = !state.ml_enabled,
            Command::ZoomIn => state.zoom = Self::retarget(&state.zoom, MAX_ZOOM, now),
            Command::ZoomOut => state.zoom = Self::retarget(&state.zoom, MIN_ZOOM, now),
            Command::SetZoom(factor) => {
                state.zoom = Self::retarget(&state.zoom, clamp_zoom(factor), now)
            }
        }
        tracing::debug!("applied {command:?}");
    }

    /// Start a new animation from wherever the current one is now.
    fn retarget(current: &ZoomAnimation, target: f32, now: Instant) -> ZoomAnimation {
        ZoomAnimation {
            from: current.value_at(now),
            to: target,
            started: now,
        }
    }

    /// Snapshot for a frame captured now.
    pub fn frame_config(&self) -> FrameConfig {
        self.frame_config_at(Instant::now())
    }

    fn frame_config_at(&self, now: Instant) -> FrameConfig {
        let state = self.state.lock();
        FrameConfig {
            render: state.render,
            zoom: state.zoom.value_at(now),
            ml_enabled: state.ml_enabled,
        }
    }

    /// Zoom factor the current animation is heading to.
    pub fn target_zoom(&self) -> f32 {
        self.state.lock().zoom.to
    }

    /// Write the settled control values back into `settings`.
    pub fn store_into(&self, settings: &mut Settings) {
        let state = self.state.lock();
        settings.show_boxes = state.render.show_boxes;
        settings.show_skeletons = state.render.show_skeletons;
        settings.ml_enabled = state.ml_enabled;
        settings.zoom = state.zoom.to;
    }
}
