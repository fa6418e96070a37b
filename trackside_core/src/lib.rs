//! Trackside: live race telemetry over UWB radio ranging.
//!
//! Instrumented model cars report range measurements as UDP datagrams; this
//! crate turns that feed into a complete race view, one frame per tick:
//! - **Ingestion**: a timeout-polling receive loop with per-cause drop
//!   counters and atomic per-row arena updates ([`ingest`], [`entity`])
//! - **Positioning**: a strategy seam between raw ranges and world
//!   positions ([`positioning`])
//! - **Geometry**: the world-centimeter to frame-pixel transform with the
//!   display's vertical flip ([`mapper`])
//! - **Composition**: grid, track outline, start line, anchors, live cars
//!   with trails and overlays, banner, leaderboard, and collision panels,
//!   rebuilt from scratch every tick ([`frame`], [`compose`])
//!
//! Lap counting, speed estimation, and collision scoring stay outside; the
//! compositor queries them per tick through the traits in [`race`].

pub mod compose;
pub mod entity;
pub mod frame;
pub mod ingest;
pub mod mapper;
pub mod positioning;
pub mod race;

pub use compose::{
    FrameCompositor, FramePresenter, QualityPalette, RenderConfig, RenderLoop, SpeedDisplayMode,
    StartLineSpec, StopHandle, DEFAULT_TICK,
};
pub use entity::{Anchor, LinkQuality, Tag, TagStore, TrailPoint};
pub use frame::{Color, Frame, Layer, TagSprite};
pub use ingest::{
    IngestError, IngestStats, ReceiverConfig, TelemetryDatagram, TelemetryReceiver,
};
pub use mapper::{CoordinateMapper, ScaleParams};
pub use positioning::{FixedPositionTable, PositionStrategy};
pub use race::{
    CollisionInfo, CollisionMonitor, LapInfo, LeaderboardEntry, RaceProgress, SpeedInfo,
    SpeedSource,
};
