//! Cursor overlay placement
//!
//! The real pointer is drawn into the scene as an arrow texture. Its location
//! is expressed in the same texture space the eye samples from, so the arrow
//! ends up on the half of the window that eye is looking at.

use glam::Vec2;

use crate::config::{ProjectionConfig, ViewMode};
use crate::pose::Eye;

/// Distance in arrow image pixels from the image corner to the arrow tip
const ARROW_HOTSPOT_OFFSET: f32 = -10.0;

/// Below this size on either axis the arrow is not drawn
pub const ARROW_VISIBILITY_THRESHOLD: f32 = 0.001;

/// Which horizontal slice of the captured window an eye samples
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeSampling {
    pub offset_x: f32,
    pub scale_x: f32,
}

pub fn eye_sampling(view_mode: ViewMode, eye: Eye) -> EyeSampling {
    let offset_x = match (view_mode, eye) {
        (ViewMode::Plane, _) => 0.0,
        (ViewMode::LeftRight, Eye::Left) | (ViewMode::RightLeft, Eye::Right) => 0.0,
        (ViewMode::LeftRight, Eye::Right) | (ViewMode::RightLeft, Eye::Left) => 0.5,
    };
    let scale_x = if view_mode == ViewMode::Plane { 1.0 } else { 0.5 };
    EyeSampling { offset_x, scale_x }
}

/// Shader inputs for drawing the arrow in one eye
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CursorOverlay {
    pub cursor_location: Vec2,
    pub arrow_size: Vec2,
}

impl CursorOverlay {
    pub fn is_visible(&self) -> bool {
        self.arrow_size.x >= ARROW_VISIBILITY_THRESHOLD && self.arrow_size.y >= ARROW_VISIBILITY_THRESHOLD
    }
}

/// Pointer and window state the overlay is computed from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerFrame {
    /// Pointer position relative to the source window, in pixels
    pub pointer: Vec2,
    /// Latest source window size in pixels
    pub window_size: (u32, u32),
    /// Arrow image size in pixels
    pub arrow_image: (u32, u32),
    /// Output of `mesh::cursor_scale_uniform`
    pub arrow_size: Vec2,
}

/// Place the arrow for `eye`.
pub fn compose(projection: &ProjectionConfig, eye: Eye, frame: &PointerFrame) -> CursorOverlay {
    let window_w = frame.window_size.0.max(1) as f32;
    let window_h = frame.window_size.1.max(1) as f32;
    let mut location = Vec2::new(frame.pointer.x / window_w, frame.pointer.y / window_h);

    if projection.view_mode != ViewMode::Plane {
        if projection.cursor_wrap {
            if location.x >= 0.5 {
                location.x -= 0.5;
            }
        } else {
            location.x *= 0.5;
        }
    }

    location.x += eye_sampling(projection.view_mode, eye).offset_x;

    let (arrow_w, arrow_h) = frame.arrow_image;
    if arrow_w > 0 && arrow_h > 0 {
        let drawn = frame.arrow_size * Vec2::new(window_w, window_h);
        let drawn_scale = drawn / Vec2::new(arrow_w as f32, arrow_h as f32);
        location += ARROW_HOTSPOT_OFFSET * drawn_scale / Vec2::new(window_w, window_h);
    }

    CursorOverlay {
        cursor_location: location,
        arrow_size: frame.arrow_size,
    }
}
