//! Scripted race bookkeeping.
//!
//! The oracle types answer the compositor's per-tick queries from fixed
//! scripts instead of live computation: a scenario decides exactly what the
//! race looks like, runs the pipeline, then asserts on the composed frame.

use std::collections::HashMap;
use std::time::Instant;
use trackside_core::race::{
    CollisionInfo, CollisionMonitor, LapInfo, LeaderboardEntry, RaceProgress, SpeedInfo,
    SpeedSource,
};

/// Race state driven entirely by the scenario script.
#[derive(Debug, Clone)]
pub struct ScriptedRace {
    active: bool,
    started: Option<Instant>,
    board: Vec<LeaderboardEntry>,
    laps: HashMap<usize, LapInfo>,
}

impl ScriptedRace {
    /// No race underway, empty standings.
    pub fn idle() -> Self {
        Self {
            active: false,
            started: None,
            board: Vec::new(),
            laps: HashMap::new(),
        }
    }

    /// A race that has been running since `started`.
    pub fn running(started: Instant) -> Self {
        Self {
            active: true,
            started: Some(started),
            board: Vec::new(),
            laps: HashMap::new(),
        }
    }

    /// Append a standings row. Rows rank in insertion order.
    pub fn with_entry(mut self, entry: LeaderboardEntry) -> Self {
        self.board.push(entry);
        self
    }

    pub fn with_lap(mut self, car_id: usize, lap: LapInfo) -> Self {
        self.laps.insert(car_id, lap);
        self
    }
}

impl RaceProgress for ScriptedRace {
    fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        self.board.clone()
    }

    fn lap_info(&self, car_id: usize) -> Option<LapInfo> {
        self.laps.get(&car_id).copied()
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn start_time(&self) -> Option<Instant> {
        self.started
    }
}

/// Fixed per-car speed readouts.
#[derive(Debug, Clone, Default)]
pub struct FixedSpeeds {
    speeds: HashMap<usize, SpeedInfo>,
}

impl FixedSpeeds {
    pub fn with_speed(mut self, car_id: usize, instantaneous: f32, average: f32) -> Self {
        self.speeds.insert(
            car_id,
            SpeedInfo {
                instantaneous,
                average,
            },
        );
        self
    }
}

impl SpeedSource for FixedSpeeds {
    fn speed_info(&self, car_id: usize) -> Option<SpeedInfo> {
        self.speeds.get(&car_id).copied()
    }
}

/// Scripted per-car collision records.
#[derive(Debug, Clone, Default)]
pub struct ScriptedCollisions {
    cars: HashMap<usize, CollisionInfo>,
}

impl ScriptedCollisions {
    pub fn with_car(mut self, car_id: usize, info: CollisionInfo) -> Self {
        self.cars.insert(car_id, info);
        self
    }
}

impl CollisionMonitor for ScriptedCollisions {
    fn collision_info(&self, car_id: usize) -> Option<CollisionInfo> {
        self.cars.get(&car_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_idle_race_has_nothing_to_say() {
        let race = ScriptedRace::idle();
        assert!(!race.is_active());
        assert!(race.start_time().is_none());
        assert!(race.leaderboard().is_empty());
        assert!(race.lap_info(0).is_none());
    }

    #[test]
    fn test_scripted_race_answers_queries() {
        let started = Instant::now();
        let race = ScriptedRace::running(started)
            .with_entry(LeaderboardEntry {
                car_id: 0,
                name: "Red".to_string(),
                current_lap: 2,
                total_laps: 5,
                total_time: Duration::from_secs(30),
                finished: false,
            })
            .with_lap(
                0,
                LapInfo {
                    racing: true,
                    current_lap: 2,
                    total_laps: 5,
                    finished: false,
                },
            );

        assert!(race.is_active());
        assert_eq!(race.start_time(), Some(started));
        assert_eq!(race.leaderboard().len(), 1);
        assert_eq!(race.lap_info(0).unwrap().current_lap, 2);
        assert!(race.lap_info(1).is_none());
    }

    #[test]
    fn test_fixed_speeds_and_collisions_by_car() {
        let speeds = FixedSpeeds::default().with_speed(1, 42.0, 38.5);
        assert_eq!(speeds.speed_info(1).unwrap().instantaneous, 42.0);
        assert!(speeds.speed_info(0).is_none());

        let collisions = ScriptedCollisions::default().with_car(
            1,
            CollisionInfo {
                name: "Blue".to_string(),
                in_collision: true,
                points: -2,
                total_collisions: 1,
                initiated: 1,
                received: 0,
            },
        );
        assert!(collisions.collision_info(1).unwrap().in_collision);
        assert!(collisions.collision_info(0).is_none());
    }
}
