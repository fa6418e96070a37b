//! The frame contract: what one composed tick looks like.
//!
//! A [`Frame`] is an ordered stack of layers rebuilt from scratch every
//! tick; nothing in it survives to the next tick. Layers carry plain data
//! with positions already in pixel space, so any backend that can paint
//! circles, lines, and text can present one without knowing anything about
//! telemetry.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// =============================================================================
// COLORS
// =============================================================================

/// 8-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const GRAY: Color = Color::rgb(128, 128, 128);
    pub const LIGHT_GRAY: Color = Color::rgb(211, 211, 211);
    pub const RED: Color = Color::rgb(255, 0, 0);
    pub const GREEN: Color = Color::rgb(0, 128, 0);
    pub const BLUE: Color = Color::rgb(0, 0, 255);
    pub const ORANGE: Color = Color::rgb(255, 165, 0);
    pub const YELLOW: Color = Color::rgb(255, 255, 0);
}

// =============================================================================
// PRIMITIVES
// =============================================================================

/// A positioned text block. Newlines separate label lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextLabel {
    pub at: Point2<f32>,
    pub text: String,
    pub color: Color,
    pub size: f32,
}

/// Straight line segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub from: Point2<f32>,
    pub to: Point2<f32>,
    pub color: Color,
    pub width: f32,
}

/// Open polyline through two or more points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polyline {
    pub points: Vec<Point2<f32>>,
    pub color: Color,
    pub width: f32,
    pub alpha: f32,
}

/// Filled circular marker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CircleMarker {
    pub at: Point2<f32>,
    pub radius: f32,
    pub color: Color,
}

/// Unfilled ring, drawn around a marker to flag it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RingMarker {
    pub at: Point2<f32>,
    pub radius: f32,
    pub color: Color,
    pub width: f32,
}

// =============================================================================
// COMPOSITES
// =============================================================================

/// A fixed beacon's marker plus its coordinate label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorMarker {
    pub marker: CircleMarker,
    pub label: TextLabel,
}

/// Everything drawn for one live car this tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagSprite {
    /// Position history; present only with two or more samples
    pub trail: Option<Polyline>,
    /// Body marker, colored by link quality
    pub body: CircleMarker,
    /// Present only while the collision monitor reports live contact
    pub collision_ring: Option<RingMarker>,
    /// Name, position, lap, and speed lines
    pub label: TextLabel,
}

/// One formatted standings row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardRow {
    /// 1-based rank
    pub position: usize,
    pub name: String,
    /// "current/total" while racing, "FIN" after the flag
    pub lap_text: String,
    pub total_time: Duration,
    pub points: i32,
}

/// Ranked standings panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardPanel {
    pub origin: Point2<f32>,
    pub rows: Vec<LeaderboardRow>,
}

impl LeaderboardPanel {
    /// Monospace rendering: header, rule, column titles, one line per row.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![
            "LEADERBOARD".to_string(),
            "=".repeat(40),
            "Pos  Car       Lap    Time    Points".to_string(),
            "-".repeat(40),
        ];
        for row in &self.rows {
            lines.push(format!(
                "{}.   {}    {:<6}  {:>6.1}s  {:+4}",
                row.position,
                row.name,
                row.lap_text,
                row.total_time.as_secs_f32(),
                row.points,
            ));
        }
        lines
    }
}

/// One car's collision totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollisionRow {
    pub name: String,
    pub total: u32,
    pub initiated: u32,
    pub received: u32,
}

/// Per-car collision summary panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollisionPanel {
    pub origin: Point2<f32>,
    pub rows: Vec<CollisionRow>,
}

impl CollisionPanel {
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec!["COLLISIONS".to_string(), "-".repeat(40)];
        for row in &self.rows {
            lines.push(format!(
                "{}: {} (Init: {}, Recv: {})",
                row.name, row.total, row.initiated, row.received,
            ));
        }
        lines
    }
}

// =============================================================================
// LAYER STACK
// =============================================================================

/// One z-ordered slice of a composed frame.
///
/// The set is closed; presenters match exhaustively and there is no
/// catch-all variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Layer {
    /// Background grid: pixel offsets of full-span lines along each axis
    Grid {
        vertical: Vec<f32>,
        horizontal: Vec<f32>,
        color: Color,
        width: f32,
        alpha: f32,
    },
    /// Closed polygon through every anchor position
    TrackOutline {
        corners: Vec<Point2<f32>>,
        color: Color,
        width: f32,
    },
    /// Start/finish marker with its label
    StartLine { line: Segment, label: TextLabel },
    /// Every fixed beacon
    Anchors(Vec<AnchorMarker>),
    /// Every live car with its overlays
    Tags(Vec<TagSprite>),
    /// Race-state banner
    StatusBanner(TextLabel),
    /// Ranked standings
    Leaderboard(LeaderboardPanel),
    /// Per-car collision totals
    Collisions(CollisionPanel),
}

/// A complete composed frame: layers in back-to-front draw order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub layers: Vec<Layer>,
}

impl Frame {
    pub fn push(&mut self, layer: Layer) {
        self.layers.push(layer);
    }

    /// The live-car layer, if composed.
    pub fn tags(&self) -> Option<&[TagSprite]> {
        self.layers.iter().find_map(|layer| match layer {
            Layer::Tags(sprites) => Some(sprites.as_slice()),
            _ => None,
        })
    }

    pub fn banner(&self) -> Option<&TextLabel> {
        self.layers.iter().find_map(|layer| match layer {
            Layer::StatusBanner(label) => Some(label),
            _ => None,
        })
    }

    pub fn leaderboard(&self) -> Option<&LeaderboardPanel> {
        self.layers.iter().find_map(|layer| match layer {
            Layer::Leaderboard(panel) => Some(panel),
            _ => None,
        })
    }

    pub fn collisions(&self) -> Option<&CollisionPanel> {
        self.layers.iter().find_map(|layer| match layer {
            Layer::Collisions(panel) => Some(panel),
            _ => None,
        })
    }
}
