//! World-to-frame coordinate mapping.
//!
//! Track geometry lives in world centimeters with y growing away from the
//! pit wall; frames use top-left-origin pixels with y growing downward. The
//! mapper applies a uniform scale, per-axis offsets, and the vertical flip
//! in one place so no drawing code ever does its own arithmetic.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Scale parameters mapping world centimeters onto frame pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleParams {
    /// Pixels per centimeter
    pub cm_to_px: f32,
    /// Horizontal pixel offset
    pub x_offset: f32,
    /// Vertical pixel offset, applied before the flip
    pub y_offset: f32,
}

impl Default for ScaleParams {
    fn default() -> Self {
        Self {
            cm_to_px: 2.0,
            x_offset: 100.0,
            y_offset: 100.0,
        }
    }
}

/// Pure world-to-pixel transform, fixed for a session.
#[derive(Debug, Clone, Copy)]
pub struct CoordinateMapper {
    scale: ScaleParams,
    frame_height: f32,
}

impl CoordinateMapper {
    pub fn new(scale: ScaleParams, frame_height: f32) -> Self {
        Self {
            scale,
            frame_height,
        }
    }

    /// Map a world position (centimeters) to frame pixels.
    ///
    /// Increasing world y moves up on screen, which in pixel space means a
    /// decreasing y.
    pub fn to_pixels(&self, world: Point2<f32>) -> Point2<f32> {
        Point2::new(
            world.x * self.scale.cm_to_px + self.scale.x_offset,
            self.frame_height - (world.y * self.scale.cm_to_px + self.scale.y_offset),
        )
    }

    /// Convert a world-space length to pixels. No offset, no flip.
    pub fn span_px(&self, length_cm: f32) -> f32 {
        length_cm * self.scale.cm_to_px
    }
}
