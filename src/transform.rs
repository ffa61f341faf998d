//! Coordinate transformations between screen, canvas and image space.
//!
//! Pointer input arrives in client (screen) pixels relative to the window.
//! The canvas widget may be displayed at a different size than its backing
//! store, and the viewport applies zoom and pan on top of canvas space.
//! Image space is only used at the storage/export boundary.

use crate::constants::{MAX_SCALE, MIN_SCALE, PAN_STEP, ZOOM_STEP};
use crate::types::CanvasPos;
use serde::{Deserialize, Serialize};

/// Direction of a single zoom step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomDirection {
    /// Increase the scale
    In,
    /// Decrease the scale
    Out,
}

impl ZoomDirection {
    fn sign(self) -> f32 {
        match self {
            ZoomDirection::In => 1.0,
            ZoomDirection::Out => -1.0,
        }
    }
}

/// Direction of a single pan step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanDirection {
    /// Move the content left
    Left,
    /// Move the content right
    Right,
    /// Move the content up
    Up,
    /// Move the content down
    Down,
}

/// Zoom scale and pan offset applied on top of canvas space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Viewport {
    /// Current zoom level (1.0 = canvas pixels map 1:1 to backing-store pixels)
    pub scale: f32,
    /// Horizontal translation in backing-store pixels
    pub offset_x: f32,
    /// Vertical translation in backing-store pixels
    pub offset_y: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            scale: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
        }
    }
}

impl Viewport {
    /// Applies one zoom step, clamped to the allowed scale range.
    ///
    /// Returns `true` if the scale changed; at a bound the call is a no-op.
    pub fn zoom(&mut self, direction: ZoomDirection) -> bool {
        let old_scale = self.scale;
        self.scale = (self.scale + ZOOM_STEP * direction.sign()).clamp(MIN_SCALE, MAX_SCALE);
        (self.scale - old_scale).abs() > f32::EPSILON
    }

    /// Applies one zoom step while keeping the canvas point under `anchor` fixed.
    ///
    /// `anchor` is given in backing-store pixels, before the viewport is applied.
    pub fn zoom_at(&mut self, anchor: egui::Pos2, direction: ZoomDirection) -> bool {
        let canvas_before = self.backing_to_canvas(anchor);
        if !self.zoom(direction) {
            return false;
        }
        self.offset_x = anchor.x - canvas_before.x * self.scale;
        self.offset_y = anchor.y - canvas_before.y * self.scale;
        true
    }

    /// Translates the view by one pan step.
    pub fn pan(&mut self, direction: PanDirection) -> bool {
        match direction {
            PanDirection::Left => self.offset_x -= PAN_STEP,
            PanDirection::Right => self.offset_x += PAN_STEP,
            PanDirection::Up => self.offset_y -= PAN_STEP,
            PanDirection::Down => self.offset_y += PAN_STEP,
        }
        true
    }

    /// Translates the view by an arbitrary delta in backing-store pixels.
    pub fn pan_by(&mut self, delta: egui::Vec2) {
        self.offset_x += delta.x;
        self.offset_y += delta.y;
    }

    /// Restores scale 1.0 and zero offset.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Undoes translate and scale: `canvas = (raw - offset) / scale`.
    pub fn backing_to_canvas(&self, raw: egui::Pos2) -> egui::Pos2 {
        egui::pos2(
            (raw.x - self.offset_x) / self.scale,
            (raw.y - self.offset_y) / self.scale,
        )
    }

    /// Applies scale then translate: `raw = canvas * scale + offset`.
    pub fn canvas_to_backing(&self, canvas: egui::Pos2) -> egui::Pos2 {
        egui::pos2(
            canvas.x * self.scale + self.offset_x,
            canvas.y * self.scale + self.offset_y,
        )
    }
}

/// Converts a client-space pointer position into canvas space.
///
/// # Arguments
///
/// * `client` - Pointer position in client pixels
/// * `canvas_rect` - Bounding rectangle of the canvas element in client pixels
/// * `backing_size` - Dimensions of the canvas backing store
/// * `viewport` - Current zoom/pan state
pub fn screen_to_canvas(
    client: egui::Pos2,
    canvas_rect: egui::Rect,
    backing_size: egui::Vec2,
    viewport: &Viewport,
) -> egui::Pos2 {
    let (sx, sy) = css_scale(canvas_rect, backing_size);
    let raw = egui::pos2(
        (client.x - canvas_rect.min.x) * sx,
        (client.y - canvas_rect.min.y) * sy,
    );
    viewport.backing_to_canvas(raw)
}

/// Converts a canvas-space position back into client space.
///
/// Exact inverse of [`screen_to_canvas`] for the same rectangle and viewport.
pub fn canvas_to_screen(
    canvas: egui::Pos2,
    canvas_rect: egui::Rect,
    backing_size: egui::Vec2,
    viewport: &Viewport,
) -> egui::Pos2 {
    let (sx, sy) = css_scale(canvas_rect, backing_size);
    let raw = viewport.canvas_to_backing(canvas);
    egui::pos2(
        raw.x / sx + canvas_rect.min.x,
        raw.y / sy + canvas_rect.min.y,
    )
}

/// Ratio between backing-store pixels and displayed pixels on each axis.
fn css_scale(canvas_rect: egui::Rect, backing_size: egui::Vec2) -> (f32, f32) {
    let sx = if canvas_rect.width() > 0.0 {
        backing_size.x / canvas_rect.width()
    } else {
        1.0
    };
    let sy = if canvas_rect.height() > 0.0 {
        backing_size.y / canvas_rect.height()
    } else {
        1.0
    };
    (sx, sy)
}

/// Converts a canvas coordinate into image space, rounded to the nearest pixel.
pub fn canvas_to_image(value: i32, canvas_dim: u32, image_dim: u32) -> i32 {
    if canvas_dim == 0 {
        return value;
    }
    (value as f64 * image_dim as f64 / canvas_dim as f64).round() as i32
}

/// Converts an image coordinate into canvas space, rounded to the nearest pixel.
pub fn image_to_canvas(value: i32, canvas_dim: u32, image_dim: u32) -> i32 {
    if image_dim == 0 {
        return value;
    }
    (value as f64 * canvas_dim as f64 / image_dim as f64).round() as i32
}

/// Canvas and image dimensions used for storage-boundary conversions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageFrame {
    /// Canvas width in pixels
    pub canvas_width: u32,
    /// Canvas height in pixels
    pub canvas_height: u32,
    /// Native image width in pixels
    pub image_width: u32,
    /// Native image height in pixels
    pub image_height: u32,
}

impl ImageFrame {
    /// Creates a frame from canvas and image dimensions.
    pub fn new(canvas_width: u32, canvas_height: u32, image_width: u32, image_height: u32) -> Self {
        Self {
            canvas_width,
            canvas_height,
            image_width,
            image_height,
        }
    }

    /// A frame where canvas and image share dimensions.
    pub fn identity(width: u32, height: u32) -> Self {
        Self::new(width, height, width, height)
    }

    /// A frame for an image scaled down so its longest edge is at most `max_edge`.
    ///
    /// Smaller images keep their native size.
    pub fn fitted(image_width: u32, image_height: u32, max_edge: u32) -> Self {
        let longest = image_width.max(image_height);
        if longest <= max_edge || longest == 0 {
            return Self::identity(image_width, image_height);
        }
        let ratio = max_edge as f64 / longest as f64;
        let canvas_width = ((image_width as f64 * ratio).round() as u32).max(1);
        let canvas_height = ((image_height as f64 * ratio).round() as u32).max(1);
        Self::new(canvas_width, canvas_height, image_width, image_height)
    }

    /// Canvas dimensions as an `egui::Vec2`.
    pub fn canvas_size(&self) -> egui::Vec2 {
        egui::vec2(self.canvas_width as f32, self.canvas_height as f32)
    }

    /// Converts a whole position into image space.
    pub fn canvas_to_image(&self, pos: CanvasPos) -> CanvasPos {
        CanvasPos::new(
            canvas_to_image(pos.x, self.canvas_width, self.image_width),
            canvas_to_image(pos.y, self.canvas_height, self.image_height),
        )
    }

    /// Converts a whole position into canvas space.
    pub fn image_to_canvas(&self, pos: CanvasPos) -> CanvasPos {
        CanvasPos::new(
            image_to_canvas(pos.x, self.canvas_width, self.image_width),
            image_to_canvas(pos.y, self.canvas_height, self.image_height),
        )
    }
}
