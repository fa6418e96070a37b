//! Per-tick frame composition.
//!
//! The compositor runs on whichever single thread owns the display and
//! rebuilds the complete layer stack every tick: static track furniture
//! first, then live cars, then the race overlays. Race, speed, and
//! collision answers are queried fresh each tick and never cached, so a
//! subsystem with nothing to say about a car costs that car one label line
//! for one tick and nothing more.

use crate::entity::{Anchor, LinkQuality, Tag, TagStore};
use crate::frame::{
    AnchorMarker, CircleMarker, CollisionPanel, CollisionRow, Color, Frame, Layer,
    LeaderboardPanel, LeaderboardRow, Polyline, RingMarker, Segment, TagSprite, TextLabel,
};
use crate::mapper::{CoordinateMapper, ScaleParams};
use crate::race::{CollisionMonitor, LeaderboardEntry, RaceProgress, SpeedSource};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default render cadence, about 30 frames per second.
pub const DEFAULT_TICK: Duration = Duration::from_millis(33);

const LABEL_SIZE: f32 = 8.0;
const BANNER_SIZE: f32 = 12.0;

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Start/finish marker geometry, in world centimeters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartLineSpec {
    Vertical { x: f32, y_start: f32, y_end: f32 },
    Horizontal { x_start: f32, x_end: f32, y: f32 },
}

/// Marker color for each link-quality class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityPalette {
    pub excellent: Color,
    pub good: Color,
    pub fair: Color,
    pub poor: Color,
    pub unknown: Color,
}

impl QualityPalette {
    pub fn color(&self, quality: LinkQuality) -> Color {
        match quality {
            LinkQuality::Excellent => self.excellent,
            LinkQuality::Good => self.good,
            LinkQuality::Fair => self.fair,
            LinkQuality::Poor => self.poor,
            LinkQuality::Unknown => self.unknown,
        }
    }
}

impl Default for QualityPalette {
    fn default() -> Self {
        Self {
            excellent: Color::GREEN,
            good: Color::BLUE,
            fair: Color::ORANGE,
            poor: Color::RED,
            unknown: Color::GRAY,
        }
    }
}

/// Which speed figures the per-car label shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeedDisplayMode {
    Instantaneous,
    Average,
    Both,
}

/// View configuration, fixed for a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Frame width in pixels
    pub frame_width: f32,
    /// Frame height in pixels; also feeds the mapper's vertical flip
    pub frame_height: f32,
    /// World-space grid pitch
    pub grid_spacing_cm: f32,
    pub anchor_radius: f32,
    pub tag_radius: f32,
    pub collision_ring_radius: f32,
    pub trail_width: f32,
    /// `None` hides the start/finish marker entirely
    pub start_line: Option<StartLineSpec>,
    pub palette: QualityPalette,
    pub speed_display: SpeedDisplayMode,
    /// Cars with no accepted update inside this window are not drawn
    pub tag_timeout: Duration,
    pub status_origin: Point2<f32>,
    pub leaderboard_origin: Point2<f32>,
    pub collision_origin: Point2<f32>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            frame_width: 1400.0,
            frame_height: 900.0,
            grid_spacing_cm: 50.0,
            anchor_radius: 8.0,
            tag_radius: 10.0,
            collision_ring_radius: 18.0,
            trail_width: 2.0,
            start_line: Some(StartLineSpec::Vertical {
                x: 0.0,
                y_start: 0.0,
                y_end: 200.0,
            }),
            palette: QualityPalette::default(),
            speed_display: SpeedDisplayMode::Both,
            tag_timeout: Duration::from_secs(2),
            status_origin: Point2::new(20.0, 20.0),
            leaderboard_origin: Point2::new(1050.0, 60.0),
            collision_origin: Point2::new(1050.0, 420.0),
        }
    }
}

// =============================================================================
// COMPOSITOR
// =============================================================================

/// Assembles one complete [`Frame`] per render tick.
pub struct FrameCompositor {
    store: Arc<TagStore>,
    anchors: Vec<Anchor>,
    mapper: CoordinateMapper,
    config: RenderConfig,
}

impl FrameCompositor {
    pub fn new(
        store: Arc<TagStore>,
        anchors: Vec<Anchor>,
        scale: ScaleParams,
        config: RenderConfig,
    ) -> Self {
        let mapper = CoordinateMapper::new(scale, config.frame_height);
        Self {
            store,
            anchors,
            mapper,
            config,
        }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn anchors(&self) -> &[Anchor] {
        &self.anchors
    }

    /// Build the full layer stack for this tick.
    ///
    /// Layer order is fixed: grid, track outline, start line, anchors, live
    /// tags, status banner, leaderboard, collisions. Conditional layers
    /// (outline, start line) are skipped, never reordered.
    pub fn compose(
        &self,
        race: &dyn RaceProgress,
        speeds: &dyn SpeedSource,
        collisions: &dyn CollisionMonitor,
        now: Instant,
    ) -> Frame {
        let mut frame = Frame::default();

        frame.push(self.grid_layer());
        if let Some(outline) = self.outline_layer() {
            frame.push(outline);
        }
        if let Some(start) = self.start_line_layer() {
            frame.push(start);
        }
        frame.push(self.anchor_layer());
        frame.push(Layer::Tags(self.tag_sprites(race, speeds, collisions, now)));
        frame.push(Layer::StatusBanner(self.status_banner(race, now)));

        let board = race.leaderboard();
        frame.push(Layer::Leaderboard(self.leaderboard_panel(&board, collisions)));
        frame.push(Layer::Collisions(self.collision_panel(&board, collisions)));

        frame
    }

    fn grid_layer(&self) -> Layer {
        let pitch = self.mapper.span_px(self.config.grid_spacing_cm);
        let mut vertical = Vec::new();
        let mut horizontal = Vec::new();
        if pitch > 0.0 {
            let mut x = 0.0;
            while x < self.config.frame_width {
                vertical.push(x);
                x += pitch;
            }
            let mut y = 0.0;
            while y < self.config.frame_height {
                horizontal.push(y);
                y += pitch;
            }
        }
        Layer::Grid {
            vertical,
            horizontal,
            color: Color::LIGHT_GRAY,
            width: 0.5,
            alpha: 0.5,
        }
    }

    /// Closed polygon through the anchors. Fewer than three corners is not
    /// an area, so the layer is skipped.
    fn outline_layer(&self) -> Option<Layer> {
        if self.anchors.len() < 3 {
            return None;
        }
        let corners = self
            .anchors
            .iter()
            .map(|anchor| self.mapper.to_pixels(anchor.position))
            .collect();
        Some(Layer::TrackOutline {
            corners,
            color: Color::BLUE,
            width: 2.0,
        })
    }

    fn start_line_layer(&self) -> Option<Layer> {
        let spec = self.config.start_line?;
        let (from, to, label_at) = match spec {
            StartLineSpec::Vertical { x, y_start, y_end } => {
                let from = self.mapper.to_pixels(Point2::new(x, y_start));
                let to = self.mapper.to_pixels(Point2::new(x, y_end));
                (from, to, Point2::new(from.x + 10.0, from.y + 10.0))
            }
            StartLineSpec::Horizontal { x_start, x_end, y } => {
                let from = self.mapper.to_pixels(Point2::new(x_start, y));
                let to = self.mapper.to_pixels(Point2::new(x_end, y));
                (from, to, Point2::new(from.x + 10.0, from.y - 25.0))
            }
        };
        Some(Layer::StartLine {
            line: Segment {
                from,
                to,
                color: Color::GREEN,
                width: 4.0,
            },
            label: TextLabel {
                at: label_at,
                text: "START/FINISH".to_string(),
                color: Color::GREEN,
                size: BANNER_SIZE,
            },
        })
    }

    fn anchor_layer(&self) -> Layer {
        let markers = self
            .anchors
            .iter()
            .map(|anchor| {
                let at = self.mapper.to_pixels(anchor.position);
                AnchorMarker {
                    marker: CircleMarker {
                        at,
                        radius: self.config.anchor_radius,
                        color: Color::BLACK,
                    },
                    label: TextLabel {
                        at: Point2::new(at.x + 12.0, at.y - 8.0),
                        text: format!(
                            "{}\n({},{})",
                            anchor.name, anchor.position.x, anchor.position.y
                        ),
                        color: Color::BLACK,
                        size: LABEL_SIZE,
                    },
                }
            })
            .collect();
        Layer::Anchors(markers)
    }

    fn tag_sprites(
        &self,
        race: &dyn RaceProgress,
        speeds: &dyn SpeedSource,
        collisions: &dyn CollisionMonitor,
        now: Instant,
    ) -> Vec<TagSprite> {
        self.store
            .snapshots()
            .into_iter()
            .filter(|tag| tag.is_live(self.config.tag_timeout, now))
            .map(|tag| self.sprite_for(&tag, race, speeds, collisions))
            .collect()
    }

    fn sprite_for(
        &self,
        tag: &Tag,
        race: &dyn RaceProgress,
        speeds: &dyn SpeedSource,
        collisions: &dyn CollisionMonitor,
    ) -> TagSprite {
        let at = self.mapper.to_pixels(tag.position);
        let color = self.config.palette.color(tag.quality);

        let trail = (tag.history.len() >= 2).then(|| Polyline {
            points: tag
                .history
                .iter()
                .map(|sample| self.mapper.to_pixels(sample.position))
                .collect(),
            color: Color::YELLOW,
            width: self.config.trail_width,
            alpha: 0.5,
        });

        let collision = collisions.collision_info(tag.id);
        let collision_ring = collision
            .as_ref()
            .filter(|info| info.in_collision)
            .map(|_| RingMarker {
                at,
                radius: self.config.collision_ring_radius,
                color: Color::RED,
                width: 3.0,
            });

        let mut lines = vec![format!(
            "{} ({},{})",
            tag.name, tag.position.x as i32, tag.position.y as i32
        )];
        if let Some(lap) = race.lap_info(tag.id) {
            if lap.racing {
                lines.push(format!("Lap {}/{}", lap.current_lap, lap.total_laps));
            } else if lap.finished {
                lines.push("FINISHED".to_string());
            }
        }
        if let Some(speed) = speeds.speed_info(tag.id) {
            lines.push(match self.config.speed_display {
                SpeedDisplayMode::Instantaneous => format!("S: {:.1}", speed.instantaneous),
                SpeedDisplayMode::Average => format!("S: {:.1}", speed.average),
                SpeedDisplayMode::Both => {
                    format!("S: {:.1} (Avg: {:.1})", speed.instantaneous, speed.average)
                }
            });
        }

        TagSprite {
            trail,
            body: CircleMarker {
                at,
                radius: self.config.tag_radius,
                color,
            },
            collision_ring,
            label: TextLabel {
                at: Point2::new(at.x + 18.0, at.y),
                text: lines.join("\n"),
                color,
                size: LABEL_SIZE,
            },
        }
    }

    fn status_banner(&self, race: &dyn RaceProgress, now: Instant) -> TextLabel {
        let text = if race.is_active() {
            match race.start_time() {
                Some(started) => format!(
                    "RACE IN PROGRESS\nTime: {:.1}s",
                    now.duration_since(started).as_secs_f32()
                ),
                None => "RACE IN PROGRESS".to_string(),
            }
        } else {
            "WAITING FOR RACE START".to_string()
        };
        TextLabel {
            at: self.config.status_origin,
            text,
            color: Color::BLACK,
            size: BANNER_SIZE,
        }
    }

    fn leaderboard_panel(
        &self,
        board: &[LeaderboardEntry],
        collisions: &dyn CollisionMonitor,
    ) -> LeaderboardPanel {
        let rows = board
            .iter()
            .enumerate()
            .map(|(rank, entry)| {
                let points = collisions
                    .collision_info(entry.car_id)
                    .map_or(0, |info| info.points);
                let lap_text = if entry.finished {
                    "FIN".to_string()
                } else {
                    format!("{}/{}", entry.current_lap, entry.total_laps)
                };
                LeaderboardRow {
                    position: rank + 1,
                    name: entry.name.clone(),
                    lap_text,
                    total_time: entry.total_time,
                    points,
                }
            })
            .collect();
        LeaderboardPanel {
            origin: self.config.leaderboard_origin,
            rows,
        }
    }

    /// Collision totals in leaderboard order; cars the monitor does not
    /// know are left out rather than zero-filled.
    fn collision_panel(
        &self,
        board: &[LeaderboardEntry],
        collisions: &dyn CollisionMonitor,
    ) -> CollisionPanel {
        let rows = board
            .iter()
            .filter_map(|entry| {
                collisions.collision_info(entry.car_id).map(|info| CollisionRow {
                    name: info.name,
                    total: info.total_collisions,
                    initiated: info.initiated,
                    received: info.received,
                })
            })
            .collect();
        CollisionPanel {
            origin: self.config.collision_origin,
            rows,
        }
    }
}

// =============================================================================
// PRESENTATION
// =============================================================================

/// Paints composed frames.
///
/// Presenting is infallible by contract: a backend that cannot paint a
/// frame skips it, it does not get to stop composition.
pub trait FramePresenter {
    fn present(&mut self, frame: &Frame);
}

/// Shared switch that ends a running [`RenderLoop`].
#[derive(Debug, Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Tick-driven render loop. Runs on the caller's thread until stopped.
pub struct RenderLoop<P: FramePresenter> {
    compositor: FrameCompositor,
    presenter: P,
    tick: Duration,
    stop: Arc<AtomicBool>,
}

impl<P: FramePresenter> RenderLoop<P> {
    pub fn new(compositor: FrameCompositor, presenter: P) -> Self {
        Self {
            compositor,
            presenter,
            tick: DEFAULT_TICK,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// A handle that stops the loop from any thread.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(Arc::clone(&self.stop))
    }

    /// Compose and present frames until the stop handle fires. Blocks.
    pub fn run(
        &mut self,
        race: &dyn RaceProgress,
        speeds: &dyn SpeedSource,
        collisions: &dyn CollisionMonitor,
    ) {
        debug!("render loop started, tick {:?}", self.tick);
        while !self.stop.load(Ordering::SeqCst) {
            let frame = self.compositor.compose(race, speeds, collisions, Instant::now());
            self.presenter.present(&frame);
            thread::sleep(self.tick);
        }
        debug!("render loop stopped");
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    /// Hand the presenter back, consuming the loop.
    pub fn into_presenter(self) -> P {
        self.presenter
    }
}
