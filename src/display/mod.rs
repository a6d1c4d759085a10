// Display: presentation surfaces and the stereo eye slots.

pub mod stereo;

use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use stereo::{FrameBuffer, StereoDisplay};

/// Which stream an image belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    /// Camera frame as captured, updated for every frame.
    Passthrough,
    /// Frame after inference and overlay, or as returned by the server.
    Processed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eye {
    Left,
    Right,
}

/// How the two views map onto the two eyes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StereoLayout {
    /// Left eye shows the passthrough view, right eye the processed view.
    #[default]
    RawLeft,
    /// Both eyes show the processed view.
    Mirrored,
}

impl StereoLayout {
    /// Eyes that show `view` under this layout.
    pub fn eyes(self, view: View) -> &'static [Eye] {
        match (self, view) {
            (StereoLayout::RawLeft, View::Passthrough) => &[Eye::Left],
            (StereoLayout::RawLeft, View::Processed) => &[Eye::Right],
            (StereoLayout::Mirrored, View::Passthrough) => &[],
            (StereoLayout::Mirrored, View::Processed) => &[Eye::Left, Eye::Right],
        }
    }
}

/// Anything that can show a frame. Called from the presenter thread only;
/// implementations must not block for long.
pub trait DisplaySurface: Send {
    fn present(&mut self, view: View, image: Arc<RgbImage>);
}
