//! Race bookkeeping queried per tick.
//!
//! Lap counting, speed estimation, and collision scoring are somebody
//! else's job. The compositor consults them through these traits once per
//! tick and caches nothing: a subsystem with no answer for a car this tick
//! costs that car one label line, never an error.

use std::time::{Duration, Instant};

/// One ranked standings row.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardEntry {
    pub car_id: usize,
    pub name: String,
    pub current_lap: u32,
    pub total_laps: u32,
    /// Accumulated race time
    pub total_time: Duration,
    pub finished: bool,
}

/// Lap progress for a single car.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LapInfo {
    /// Whether the car is currently on a counted lap
    pub racing: bool,
    pub current_lap: u32,
    pub total_laps: u32,
    pub finished: bool,
}

/// Speed readout for a single car, in centimeters per second.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedInfo {
    pub instantaneous: f32,
    pub average: f32,
}

/// Collision bookkeeping for a single car.
#[derive(Debug, Clone, PartialEq)]
pub struct CollisionInfo {
    pub name: String,
    /// Contact is happening right now
    pub in_collision: bool,
    /// Penalty/bonus points from contact scoring
    pub points: i32,
    pub total_collisions: u32,
    pub initiated: u32,
    pub received: u32,
}

/// Race state and standings.
pub trait RaceProgress {
    /// Current standings, best placed first.
    fn leaderboard(&self) -> Vec<LeaderboardEntry>;

    /// Lap progress for one car, if the race knows the car.
    fn lap_info(&self, car_id: usize) -> Option<LapInfo>;

    /// Whether a race is underway.
    fn is_active(&self) -> bool;

    /// When the running race started.
    fn start_time(&self) -> Option<Instant>;
}

/// Live speed estimates.
pub trait SpeedSource {
    fn speed_info(&self, car_id: usize) -> Option<SpeedInfo>;
}

/// Contact detection and scoring.
pub trait CollisionMonitor {
    fn collision_info(&self, car_id: usize) -> Option<CollisionInfo>;
}
