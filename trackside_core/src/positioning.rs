//! Position resolution strategies.
//!
//! The receive loop does not know how positions are computed: it hands each
//! accepted packet's ranges to a [`PositionStrategy`] and applies whatever
//! comes back. The shipped [`FixedPositionTable`] places each car at a known
//! bring-up spot regardless of measurements; a real range solver slots in
//! behind the same trait without touching the ingest path.

use nalgebra::Point2;
use std::collections::HashMap;

/// Resolves world positions from range telemetry.
///
/// Implementations run on the receive thread, inside the row lock of the
/// tag being updated, so they must be `Send` and should stay cheap.
pub trait PositionStrategy: Send {
    /// Resolve a world position (centimeters) for `tag_id` from its latest
    /// range vector. `None` leaves the tag wherever it last was.
    fn solve(&self, tag_id: usize, ranges: &[f32]) -> Option<Point2<f32>>;
}

/// Fixed per-car positions, ignoring the measured ranges.
///
/// Hardware bring-up stand-in: cars appear at known spots so the whole
/// pipeline can be exercised before a solver exists.
#[derive(Debug, Clone, Default)]
pub struct FixedPositionTable {
    slots: HashMap<usize, Point2<f32>>,
}

impl FixedPositionTable {
    pub fn new(slots: impl IntoIterator<Item = (usize, Point2<f32>)>) -> Self {
        Self {
            slots: slots.into_iter().collect(),
        }
    }

    /// The three-car layout the prototype firmware reports during bench tests.
    pub fn bench_layout() -> Self {
        Self::new([
            (0, Point2::new(50.0, 50.0)),
            (1, Point2::new(100.0, 100.0)),
            (2, Point2::new(150.0, 150.0)),
        ])
    }

    pub fn insert(&mut self, tag_id: usize, position: Point2<f32>) {
        self.slots.insert(tag_id, position);
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl PositionStrategy for FixedPositionTable {
    fn solve(&self, tag_id: usize, _ranges: &[f32]) -> Option<Point2<f32>> {
        self.slots.get(&tag_id).copied()
    }
}
