//! Trackside test harness.
//!
//! Everything a scenario needs to exercise the wire-to-view pipeline
//! without hardware:
//! - **Feeder**: deterministic UDP datagrams with seeded range noise
//!   ([`feeder`])
//! - **Oracles**: scripted race, speed, and collision answers ([`oracle`])
//! - **Capture**: a presenter that keeps composed frames for assertions
//!   ([`capture`])

pub mod capture;
pub mod feeder;
pub mod oracle;

pub use capture::{init_test_logging, CapturePresenter};
pub use feeder::TelemetryFeeder;
pub use oracle::{FixedSpeeds, ScriptedCollisions, ScriptedRace};
