//! Anchors, tags, and the shared tag arena.
//!
//! `TagStore` is the rendezvous point between the two halves of the system:
//! the UDP receive thread writes one row per accepted packet, the render
//! thread reads row snapshots once per tick. Each row sits behind its own
//! mutex, so a whole-row update is atomic and a reader can never observe a
//! half-applied packet (fresh ranges with a stale quality class, say).

use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Number of signal-strength slots in a telemetry record.
pub const RSSI_SLOTS: usize = 8;

/// Default number of trail samples kept per tag.
pub const DEFAULT_TRAIL_CAPACITY: usize = 50;

// =============================================================================
// ANCHORS
// =============================================================================

/// Fixed reference beacon with a known world position (centimeters).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    /// Beacon identity
    pub id: usize,
    /// Display name (e.g. "A0")
    pub name: String,
    /// Surveyed world position in centimeters
    pub position: Point2<f32>,
}

impl Anchor {
    pub fn new(id: usize, name: &str, x_cm: f32, y_cm: f32) -> Self {
        Self {
            id,
            name: name.to_string(),
            position: Point2::new(x_cm, y_cm),
        }
    }
}

// =============================================================================
// LINK QUALITY
// =============================================================================

/// Categorical reliability of a tag's latest measurement.
///
/// The set is closed: labels outside it collapse to `Unknown` at parse time,
/// so downstream matches stay exhaustive with no catch-all class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkQuality {
    Excellent,
    Good,
    Fair,
    Poor,
    Unknown,
}

impl LinkQuality {
    /// Classify quality from the number of anchors contributing ranges.
    pub fn classify(anchor_count: usize) -> Self {
        match anchor_count {
            0 => LinkQuality::Unknown,
            1 | 2 => LinkQuality::Poor,
            3 => LinkQuality::Fair,
            4 | 5 => LinkQuality::Good,
            _ => LinkQuality::Excellent,
        }
    }

    /// Parse a wire label, collapsing anything unrecognized to `Unknown`.
    pub fn from_label(label: &str) -> Self {
        match label.to_ascii_lowercase().as_str() {
            "excellent" => LinkQuality::Excellent,
            "good" => LinkQuality::Good,
            "fair" => LinkQuality::Fair,
            "poor" => LinkQuality::Poor,
            _ => LinkQuality::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LinkQuality::Excellent => "excellent",
            LinkQuality::Good => "good",
            LinkQuality::Fair => "fair",
            LinkQuality::Poor => "poor",
            LinkQuality::Unknown => "unknown",
        }
    }
}

// =============================================================================
// TAGS
// =============================================================================

/// One historical position sample, kept for trail rendering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrailPoint {
    /// World position in centimeters
    pub position: Point2<f32>,
    /// When the sample was accepted
    pub at: Instant,
}

/// Mobile tracked entity: one race car's live telemetry row.
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    /// Identity; always equals this row's index in the arena
    pub id: usize,
    /// Display name
    pub name: String,
    /// Current world position in centimeters
    pub position: Point2<f32>,
    /// Quality class of the latest accepted packet
    pub quality: LinkQuality,
    /// Latest range measurements, one per visible anchor
    pub ranges: Vec<f32>,
    /// Latest signal-strength readings
    pub rssi: Vec<i32>,
    /// Number of anchors contributing to the latest packet
    pub anchor_count: usize,
    /// Whether the positioning strategy has ever placed this tag
    pub active: bool,
    /// Instant of the last accepted update
    pub last_update: Option<Instant>,
    /// Bounded position history, oldest first
    pub history: VecDeque<TrailPoint>,
    trail_capacity: usize,
}

impl Tag {
    fn new(id: usize, name: &str, trail_capacity: usize) -> Self {
        Self {
            id,
            name: name.to_string(),
            position: Point2::origin(),
            quality: LinkQuality::Unknown,
            ranges: Vec::new(),
            rssi: vec![0; RSSI_SLOTS],
            anchor_count: 0,
            active: false,
            last_update: None,
            history: VecDeque::with_capacity(trail_capacity),
            trail_capacity,
        }
    }

    /// Move the tag and append the sample to its trail, evicting the oldest
    /// sample once the trail is full. Capacity zero keeps no trail at all.
    pub fn record_position(&mut self, position: Point2<f32>, at: Instant) {
        self.position = position;
        if self.trail_capacity > 0 {
            if self.history.len() >= self.trail_capacity {
                self.history.pop_front();
            }
            self.history.push_back(TrailPoint { position, at });
        }
        self.last_update = Some(at);
    }

    /// Whether this tag should be drawn: placed at least once and updated
    /// within `timeout` of `now`.
    pub fn is_live(&self, timeout: Duration, now: Instant) -> bool {
        self.active
            && self
                .last_update
                .map_or(false, |at| now.duration_since(at) <= timeout)
    }
}

// =============================================================================
// TAG STORE
// =============================================================================

/// Fixed-size arena of tag rows shared between the ingest and render threads.
///
/// The set of tags is decided at construction; telemetry can only update
/// rows that exist. Row locks are scoped inside each method, so the store
/// never holds a lock across a call boundary.
#[derive(Debug)]
pub struct TagStore {
    rows: Vec<Mutex<Tag>>,
}

impl TagStore {
    /// Build an arena with one row per name, ids assigned by position.
    pub fn new(names: &[&str]) -> Self {
        Self::with_trail_capacity(names, DEFAULT_TRAIL_CAPACITY)
    }

    pub fn with_trail_capacity(names: &[&str], trail_capacity: usize) -> Self {
        let rows = names
            .iter()
            .enumerate()
            .map(|(id, name)| Mutex::new(Tag::new(id, name, trail_capacity)))
            .collect();
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn contains(&self, id: usize) -> bool {
        id < self.rows.len()
    }

    /// Run `apply` against one row under its lock.
    ///
    /// Everything `apply` writes becomes visible to readers as a single
    /// unit. Returns `None` when the id is outside the arena.
    pub fn update<R>(&self, id: usize, apply: impl FnOnce(&mut Tag) -> R) -> Option<R> {
        let row = self.rows.get(id)?;
        let mut tag = row.lock().unwrap();
        Some(apply(&mut tag))
    }

    /// Clone one row's current state.
    pub fn snapshot(&self, id: usize) -> Option<Tag> {
        self.rows.get(id).map(|row| row.lock().unwrap().clone())
    }

    /// Clone every row, in id order. Rows are locked one at a time, so the
    /// result is per-row consistent rather than a global freeze.
    pub fn snapshots(&self) -> Vec<Tag> {
        self.rows
            .iter()
            .map(|row| row.lock().unwrap().clone())
            .collect()
    }
}
