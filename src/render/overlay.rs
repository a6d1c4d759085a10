//! Skeleton overlay.
//!
//! Detections stay normalized until here; they are mapped to pixels by the
//! size of the image being drawn on, so the same set can be drawn on a
//! resized or zoomed frame. Drawing happens on a copy of the input.

use image::{Rgb, RgbImage};

use crate::pose::skeleton::{KEYPOINT_THRESHOLD, SKELETON};
use crate::pose::types::Detection;

const OVERLAY_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BOX_STROKE: i64 = 3;
const EDGE_STROKE: i64 = 2;
const POINT_RADIUS: i64 = 4;

/// What to draw for each detection. Snapshotted once per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderConfig {
    pub show_boxes: bool,
    pub show_skeletons: bool,
}

impl RenderConfig {
    /// Whether anything would be drawn at all.
    pub fn draws_anything(&self) -> bool {
        self.show_boxes || self.show_skeletons
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            show_boxes: true,
            show_skeletons: true,
        }
    }
}

/// A shape in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Primitive {
    Rect {
        left: f32,
        top: f32,
        right: f32,
        bottom: f32,
    },
    Point {
        x: f32,
        y: f32,
    },
    Segment {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
    },
}

/// Lay out the primitives for `detections` on a `width` × `height` image.
///
/// Shapes with a non-finite coordinate are left out.
pub fn plan(
    detections: &[Detection],
    width: u32,
    height: u32,
    config: &RenderConfig,
) -> Vec<Primitive> {
    let (w, h) = (width as f32, height as f32);
    let mut primitives = Vec::new();

    for detection in detections {
        if config.show_boxes {
            let (left, top, right, bottom) = detection.bbox.corners();
            let rect = Primitive::Rect {
                left: left * w,
                top: top * h,
                right: right * w,
                bottom: bottom * h,
            };
            if rect.is_finite() {
                primitives.push(rect);
            }
        }

        if !config.show_skeletons {
            continue;
        }

        let keypoints = &detection.keypoints;
        for kp in keypoints.iter().filter(|kp| kp.is_visible(KEYPOINT_THRESHOLD)) {
            let point = Primitive::Point {
                x: kp.x * w,
                y: kp.y * h,
            };
            if point.is_finite() {
                primitives.push(point);
            }
        }

        for &(a, b) in &SKELETON {
            let (from, to) = (&keypoints[a], &keypoints[b]);
            if from.is_visible(KEYPOINT_THRESHOLD) && to.is_visible(KEYPOINT_THRESHOLD) {
                let segment = Primitive::Segment {
                    x1: from.x * w,
                    y1: from.y * h,
                    x2: to.x * w,
                    y2: to.y * h,
                };
                if segment.is_finite() {
                    primitives.push(segment);
                }
            }
        }
    }

    primitives
}

impl Primitive {
    fn is_finite(&self) -> bool {
        match *self {
            Primitive::Rect {
                left,
                top,
                right,
                bottom,
            } => [left, top, right, bottom].iter().all(|v| v.is_finite()),
            Primitive::Point { x, y } => x.is_finite() && y.is_finite(),
            Primitive::Segment { x1, y1, x2, y2 } => {
                [x1, y1, x2, y2].iter().all(|v| v.is_finite())
            }
        }
    }
}

/// Draw `detections` onto a copy of `image`.
pub fn render(image: &RgbImage, detections: &[Detection], config: &RenderConfig) -> RgbImage {
    let mut canvas = image.clone();
    let (width, height) = canvas.dimensions();
    let bounds = Bounds::around(width, height);

    for primitive in plan(detections, width, height, config) {
        match primitive {
            Primitive::Rect {
                left,
                top,
                right,
                bottom,
            } => {
                let corners = [(left, top), (right, top), (right, bottom), (left, bottom)];
                let next = corners.iter().cycle().skip(1);
                for (&from, &to) in corners.iter().zip(next) {
                    if let Some((from, to)) = bounds.clip(from, to) {
                        draw_line(&mut canvas, from, to, BOX_STROKE);
                    }
                }
            }
            Primitive::Point { x, y } => {
                if bounds.contains(x, y) {
                    fill_circle(&mut canvas, to_pixel(x, y), POINT_RADIUS);
                }
            }
            Primitive::Segment { x1, y1, x2, y2 } => {
                if let Some((from, to)) = bounds.clip((x1, y1), (x2, y2)) {
                    draw_line(&mut canvas, from, to, EDGE_STROKE);
                }
            }
        }
    }

    canvas
}

/// The image area grown by the widest stroke, so shapes just outside the
/// edge still paint their visible part.
struct Bounds {
    min: f32,
    max_x: f32,
    max_y: f32,
}

impl Bounds {
    fn around(width: u32, height: u32) -> Self {
        let margin = (POINT_RADIUS + BOX_STROKE) as f32;
        Self {
            min: -margin,
            max_x: width as f32 + margin,
            max_y: height as f32 + margin,
        }
    }

    fn contains(&self, x: f32, y: f32) -> bool {
        (self.min..=self.max_x).contains(&x) && (self.min..=self.max_y).contains(&y)
    }

    /// Liang-Barsky clip of the segment `from`-`to`. `None` when nothing of
    /// it lies inside.
    fn clip(&self, from: (f32, f32), to: (f32, f32)) -> Option<((i64, i64), (i64, i64))> {
        let (dx, dy) = (to.0 - from.0, to.1 - from.1);
        if !dx.is_finite() || !dy.is_finite() {
            return None;
        }
        let (mut t0, mut t1) = (0.0f32, 1.0f32);
        let edges = [
            (-dx, from.0 - self.min),
            (dx, self.max_x - from.0),
            (-dy, from.1 - self.min),
            (dy, self.max_y - from.1),
        ];
        for (p, q) in edges {
            if p.abs() <= f32::EPSILON {
                if q < 0.0 {
                    return None;
                }
                continue;
            }
            let r = q / p;
            if p < 0.0 {
                if r > t1 {
                    return None;
                }
                t0 = t0.max(r);
            } else {
                if r < t0 {
                    return None;
                }
                t1 = t1.min(r);
            }
        }
        let at = |t: f32| to_pixel(from.0 + t * dx, from.1 + t * dy);
        Some((at(t0), at(t1)))
    }
}

fn to_pixel(x: f32, y: f32) -> (i64, i64) {
    (x.round() as i64, y.round() as i64)
}

fn put(image: &mut RgbImage, x: i64, y: i64) {
    if (0..i64::from(image.width())).contains(&x) && (0..i64::from(image.height())).contains(&y) {
        image.put_pixel(x as u32, y as u32, OVERLAY_COLOR);
    }
}

fn stamp(image: &mut RgbImage, x: i64, y: i64, stroke: i64) {
    let lo = -(stroke - 1) / 2;
    let hi = stroke / 2;
    for dy in lo..=hi {
        for dx in lo..=hi {
            put(image, x + dx, y + dy);
        }
    }
}

/// Bresenham line. Endpoints are already clipped to the stroke margin.
fn draw_line(image: &mut RgbImage, from: (i64, i64), to: (i64, i64), stroke: i64) {
    let (mut x, mut y) = from;
    let dx = (to.0 - x).abs();
    let dy = -(to.1 - y).abs();
    let sx = if x < to.0 { 1 } else { -1 };
    let sy = if y < to.1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        stamp(image, x, y, stroke);
        if x == to.0 && y == to.1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

fn fill_circle(image: &mut RgbImage, (cx, cy): (i64, i64), radius: i64) {
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= radius * radius {
                put(image, cx + dx, cy + dy);
            }
        }
    }
}
