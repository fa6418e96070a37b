//! UDP telemetry ingestion.
//!
//! Each car reports as one datagram of UTF-8 JSON on a connectionless
//! socket; nothing is acknowledged and loss is tolerated. The
//! receiver owns the socket and a dedicated receive thread; every blocking
//! `recv_from` is bounded by a short read timeout so the loop can notice
//! the stop flag without an external interrupt. That poll is the only
//! cancellation mechanism.
//!
//! Faults never cross the loop boundary. Every drop cause carries its own
//! counter, so a flaky feed shows up in [`IngestStats`] instead of taking
//! the thread down.

use crate::entity::{LinkQuality, TagStore, RSSI_SLOTS};
use crate::positioning::PositionStrategy;
use crossbeam::channel::{bounded, Receiver, RecvTimeoutError};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

// =============================================================================
// WIRE FORMAT
// =============================================================================

/// Wire-level telemetry record. Transient: decoded, applied, discarded.
///
/// Senders may omit any field; defaults follow the anchor firmware's
/// conventions (no id reads as -1 and is rejected downstream, missing rssi
/// reads as eight zeros).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TelemetryDatagram {
    /// Reporting tag id; -1 when the sender omitted it
    #[serde(default = "default_id")]
    pub id: i64,
    /// Range measurements in centimeters, one per visible anchor
    #[serde(default)]
    pub range: Vec<f32>,
    /// Signal-strength readings
    #[serde(default = "default_rssi")]
    pub rssi: Vec<i32>,
}

fn default_id() -> i64 {
    -1
}

fn default_rssi() -> Vec<i32> {
    vec![0; RSSI_SLOTS]
}

impl TelemetryDatagram {
    /// Decode a raw payload. UTF-8 JSON, surrounding whitespace tolerated.
    pub fn decode(payload: &[u8]) -> Result<Self, IngestError> {
        let text = std::str::from_utf8(payload)
            .map_err(|e| IngestError::Decode(e.to_string()))?;
        serde_json::from_str(text.trim()).map_err(|e| IngestError::Decode(e.to_string()))
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Ingestion faults, tagged by cause.
///
/// Only `Bind` is fatal; the receive loop counts the rest and keeps going.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The socket could not be set up at startup. Nothing can run.
    #[error("telemetry socket unavailable: {0}")]
    Bind(std::io::Error),

    /// The payload was not valid UTF-8 JSON in the expected shape.
    #[error("undecodable datagram: {0}")]
    Decode(String),

    /// A well-formed packet named an id outside the arena.
    #[error("telemetry for unknown tag id {id}")]
    UnknownTag { id: i64 },

    /// The socket failed mid-receive (read timeouts are not faults).
    #[error("socket receive failed: {0}")]
    Transport(std::io::Error),
}

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Receiver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiverConfig {
    /// UDP bind address
    pub bind_addr: String,
    /// Blocking-receive bound; the stop flag is checked once per interval
    pub poll_interval: Duration,
    /// How recently a valid packet must have arrived to count as connected
    pub link_timeout: Duration,
    /// Longest wait for the receive thread to acknowledge a stop
    pub join_timeout: Duration,
    /// Receive buffer size in bytes
    pub max_datagram: usize,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:4210".to_string(),
            poll_interval: Duration::from_millis(100),
            link_timeout: Duration::from_secs(2),
            join_timeout: Duration::from_secs(1),
            max_datagram: 2048,
        }
    }
}

// =============================================================================
// STATISTICS
// =============================================================================

/// Point-in-time statistics snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestStats {
    /// Every datagram that reached the socket. Monotonic until reset.
    pub packets_received: u64,
    /// Valid packets during the last whole one-second window
    pub packets_per_second: u32,
    /// Undecodable payloads dropped
    pub decode_errors: u64,
    /// Well-formed packets rejected for an id outside the arena
    pub rejected_ids: u64,
    /// Socket receive faults
    pub transport_errors: u64,
    /// Time since the receiver started
    pub uptime: Duration,
    /// A valid packet arrived within the link timeout
    pub connected: bool,
}

/// Counters shared between the receive thread and stat queries.
///
/// One mutex guards the lot; it is touched once per datagram and once per
/// query, well below contention at telemetry rates.
#[derive(Debug)]
struct Counters {
    packets_received: u64,
    decode_errors: u64,
    rejected_ids: u64,
    transport_errors: u64,
    packets_per_second: u32,
    window_count: u32,
    window_started: Instant,
    last_valid: Option<Instant>,
}

impl Counters {
    fn new(started: Instant) -> Self {
        Self {
            packets_received: 0,
            decode_errors: 0,
            rejected_ids: 0,
            transport_errors: 0,
            packets_per_second: 0,
            window_count: 0,
            window_started: started,
            last_valid: None,
        }
    }

    fn note_valid(&mut self, now: Instant) {
        self.last_valid = Some(now);
        // Roll first so a packet after a quiet spell opens a fresh window
        // instead of landing in the stale one.
        self.roll_window(now);
        self.window_count += 1;
    }

    /// Close the one-second window once it has elapsed. Called on every
    /// valid packet and on every query. A window that sat quiet past a full
    /// extra second publishes zero, not its leftover count.
    fn roll_window(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.window_started);
        if elapsed < Duration::from_secs(1) {
            return;
        }
        self.packets_per_second = if elapsed < Duration::from_secs(2) {
            self.window_count
        } else {
            0
        };
        self.window_count = 0;
        self.window_started = now;
    }

    fn count_drop(&mut self, error: &IngestError) {
        match error {
            IngestError::Decode(_) => self.decode_errors += 1,
            IngestError::UnknownTag { .. } => self.rejected_ids += 1,
            IngestError::Transport(_) => self.transport_errors += 1,
            // Startup failures never reach the loop.
            IngestError::Bind(_) => {}
        }
    }

    fn connected(&self, link_timeout: Duration, now: Instant) -> bool {
        self.last_valid
            .map_or(false, |at| now.duration_since(at) < link_timeout)
    }
}

struct Shared {
    running: AtomicBool,
    counters: Mutex<Counters>,
}

impl Shared {
    fn with_counters<R>(&self, f: impl FnOnce(&mut Counters) -> R) -> R {
        f(&mut self.counters.lock().unwrap())
    }
}

// =============================================================================
// RECEIVER
// =============================================================================

/// Owns the telemetry socket and its receive thread.
///
/// Dropping the receiver stops it: the flag flips, the thread is waited on
/// for at most `join_timeout`, and the socket closes when the thread drops
/// it at the next poll tick.
pub struct TelemetryReceiver {
    shared: Arc<Shared>,
    config: ReceiverConfig,
    local_addr: SocketAddr,
    started: Instant,
    thread: Option<JoinHandle<()>>,
    exit_rx: Receiver<()>,
}

impl TelemetryReceiver {
    /// Bind the socket and start the receive thread.
    ///
    /// Returns [`IngestError::Bind`] when the socket cannot be set up; with
    /// no socket there is nothing to run.
    pub fn spawn(
        config: ReceiverConfig,
        store: Arc<TagStore>,
        strategy: Box<dyn PositionStrategy>,
    ) -> Result<Self, IngestError> {
        let socket = UdpSocket::bind(&config.bind_addr).map_err(IngestError::Bind)?;
        socket
            .set_read_timeout(Some(config.poll_interval))
            .map_err(IngestError::Bind)?;
        let local_addr = socket.local_addr().map_err(IngestError::Bind)?;

        let started = Instant::now();
        let shared = Arc::new(Shared {
            running: AtomicBool::new(true),
            counters: Mutex::new(Counters::new(started)),
        });

        let (exit_tx, exit_rx) = bounded(1);
        let loop_shared = Arc::clone(&shared);
        let max_datagram = config.max_datagram;
        let thread = thread::Builder::new()
            .name("telemetry-rx".to_string())
            .spawn(move || {
                receive_loop(socket, loop_shared, store, strategy, max_datagram);
                let _ = exit_tx.send(());
            })
            .map_err(IngestError::Bind)?;

        info!("telemetry receiver listening on {}", local_addr);
        Ok(Self {
            shared,
            config,
            local_addr,
            started,
            thread: Some(thread),
            exit_rx,
        })
    }

    /// The bound address, with the OS-assigned port resolved.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Whether a valid packet arrived within the link timeout.
    pub fn is_connected(&self) -> bool {
        let now = Instant::now();
        let link_timeout = self.config.link_timeout;
        self.shared
            .with_counters(|c| c.connected(link_timeout, now))
    }

    /// Snapshot the counters.
    pub fn statistics(&self) -> IngestStats {
        let now = Instant::now();
        let uptime = now.duration_since(self.started);
        let link_timeout = self.config.link_timeout;
        self.shared.with_counters(|c| {
            c.roll_window(now);
            IngestStats {
                packets_received: c.packets_received,
                packets_per_second: c.packets_per_second,
                decode_errors: c.decode_errors,
                rejected_ids: c.rejected_ids,
                transport_errors: c.transport_errors,
                uptime,
                connected: c.connected(link_timeout, now),
            }
        })
    }

    /// Zero every counter and restart the rate window.
    ///
    /// Connectivity timestamps survive the reset: clearing counters must
    /// not flip `connected`.
    pub fn reset_statistics(&self) {
        let now = Instant::now();
        self.shared.with_counters(|c| {
            c.packets_received = 0;
            c.decode_errors = 0;
            c.rejected_ids = 0;
            c.transport_errors = 0;
            c.packets_per_second = 0;
            c.window_count = 0;
            c.window_started = now;
        });
    }

    /// Stop the receive thread, waiting at most `join_timeout` for it to
    /// acknowledge. Idempotent; later calls are no-ops.
    ///
    /// On timeout the thread is abandoned rather than blocked on. It still
    /// exits at its next poll tick and drops the socket then.
    pub fn stop(&mut self) {
        let Some(handle) = self.thread.take() else {
            return;
        };
        self.shared.running.store(false, Ordering::SeqCst);

        match self.exit_rx.recv_timeout(self.config.join_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let _ = handle.join();
                info!("telemetry receiver stopped");
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "telemetry thread did not stop within {:?}, abandoning it",
                    self.config.join_timeout
                );
                drop(handle);
            }
        }
    }
}

impl Drop for TelemetryReceiver {
    fn drop(&mut self) {
        self.stop();
    }
}

// =============================================================================
// RECEIVE LOOP
// =============================================================================

fn receive_loop(
    socket: UdpSocket,
    shared: Arc<Shared>,
    store: Arc<TagStore>,
    strategy: Box<dyn PositionStrategy>,
    max_datagram: usize,
) {
    let mut buffer = vec![0u8; max_datagram];

    while shared.running.load(Ordering::SeqCst) {
        let len = match socket.recv_from(&mut buffer) {
            Ok((len, _src)) => len,
            // Read timeout: just a chance to re-check the stop flag.
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                continue;
            }
            Err(e) => {
                // A failing socket during shutdown is a normal exit.
                if !shared.running.load(Ordering::SeqCst) {
                    break;
                }
                warn!("telemetry receive failed: {}", e);
                shared.with_counters(|c| c.count_drop(&IngestError::Transport(e)));
                continue;
            }
        };

        let now = Instant::now();
        let received = shared.with_counters(|c| {
            c.packets_received += 1;
            c.packets_received
        });

        match ingest_datagram(&buffer[..len], &store, strategy.as_ref(), now) {
            Ok(tag_id) => {
                shared.with_counters(|c| c.note_valid(now));
                if received % 100 == 0 {
                    debug!("{} datagrams in, latest tag {}", received, tag_id);
                }
            }
            Err(error) => {
                debug!("datagram dropped: {}", error);
                shared.with_counters(|c| c.count_drop(&error));
            }
        }
    }

    debug!("telemetry receive loop exiting");
}

/// Decode one payload and apply it to the arena. Returns the updated id.
///
/// All of a tag's fields land inside one row-lock scope, position included,
/// so a concurrent reader sees the whole packet or none of it.
fn ingest_datagram(
    payload: &[u8],
    store: &TagStore,
    strategy: &dyn PositionStrategy,
    now: Instant,
) -> Result<usize, IngestError> {
    let TelemetryDatagram { id, range, rssi } = TelemetryDatagram::decode(payload)?;

    let tag_id = usize::try_from(id)
        .ok()
        .filter(|&slot| slot < store.len())
        .ok_or(IngestError::UnknownTag { id })?;

    store
        .update(tag_id, move |tag| {
            tag.ranges = range;
            tag.rssi = rssi;
            tag.anchor_count = tag.ranges.len();
            tag.quality = LinkQuality::classify(tag.anchor_count);
            if let Some(position) = strategy.solve(tag.id, &tag.ranges) {
                tag.record_position(position, now);
                tag.active = true;
            }
        })
        .map(|_| tag_id)
        .ok_or(IngestError::UnknownTag { id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::positioning::FixedPositionTable;
    use nalgebra::Point2;

    fn store3() -> TagStore {
        TagStore::new(&["Car 0", "Car 1", "Car 2"])
    }

    #[test]
    fn test_decode_full_record() {
        let datagram =
            TelemetryDatagram::decode(br#"{"id": 1, "range": [10, 20.5, 30, 40], "rssi": [1, 2, 3, 4]}"#)
                .unwrap();
        assert_eq!(datagram.id, 1);
        assert_eq!(datagram.range, vec![10.0, 20.5, 30.0, 40.0]);
        assert_eq!(datagram.rssi, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_decode_applies_field_defaults() {
        let datagram = TelemetryDatagram::decode(br#"{"id": 2}"#).unwrap();
        assert_eq!(datagram.id, 2);
        assert!(datagram.range.is_empty());
        assert_eq!(datagram.rssi, vec![0; RSSI_SLOTS]);

        let anonymous = TelemetryDatagram::decode(br#"{"range": [5.0]}"#).unwrap();
        assert_eq!(anonymous.id, -1);
    }

    #[test]
    fn test_decode_tolerates_whitespace_and_extras() {
        let datagram =
            TelemetryDatagram::decode(b"  {\"id\": 0, \"fw\": \"1.4.2\"}\n").unwrap();
        assert_eq!(datagram.id, 0);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            TelemetryDatagram::decode(b"{not json"),
            Err(IngestError::Decode(_))
        ));
        assert!(matches!(
            TelemetryDatagram::decode(&[0xff, 0xfe, 0x01]),
            Err(IngestError::Decode(_))
        ));
        assert!(matches!(
            TelemetryDatagram::decode(br#"{"id": "one"}"#),
            Err(IngestError::Decode(_))
        ));
    }

    #[test]
    fn test_ingest_updates_row_as_one_unit() {
        let store = store3();
        let strategy = FixedPositionTable::bench_layout();
        let now = Instant::now();

        let tag_id = ingest_datagram(
            br#"{"id": 1, "range": [10, 20, 30, 40], "rssi": [1, 2, 3, 4]}"#,
            &store,
            &strategy,
            now,
        )
        .unwrap();
        assert_eq!(tag_id, 1);

        let tag = store.snapshot(1).unwrap();
        assert_eq!(tag.ranges, vec![10.0, 20.0, 30.0, 40.0]);
        assert_eq!(tag.rssi, vec![1, 2, 3, 4]);
        assert_eq!(tag.anchor_count, 4);
        assert_eq!(tag.quality, LinkQuality::Good);
        assert_eq!(tag.position, Point2::new(100.0, 100.0));
        assert!(tag.active);
        assert_eq!(tag.last_update, Some(now));
        assert_eq!(tag.history.len(), 1);
    }

    #[test]
    fn test_ingest_rejects_out_of_range_id() {
        let store = store3();
        let strategy = FixedPositionTable::bench_layout();
        let before = store.snapshots();

        let result = ingest_datagram(br#"{"id": 99}"#, &store, &strategy, Instant::now());
        assert!(matches!(result, Err(IngestError::UnknownTag { id: 99 })));

        let negative = ingest_datagram(br#"{"range": [1.0]}"#, &store, &strategy, Instant::now());
        assert!(matches!(negative, Err(IngestError::UnknownTag { id: -1 })));

        assert_eq!(store.snapshots(), before, "rejected packets leave no trace");
    }

    #[test]
    fn test_ingest_without_position_keeps_tag_inactive() {
        let store = store3();
        let strategy = FixedPositionTable::default();

        ingest_datagram(
            br#"{"id": 0, "range": [10, 20, 30], "rssi": [9]}"#,
            &store,
            &strategy,
            Instant::now(),
        )
        .unwrap();

        let tag = store.snapshot(0).unwrap();
        assert_eq!(tag.ranges, vec![10.0, 20.0, 30.0]);
        assert_eq!(tag.quality, LinkQuality::Fair);
        assert!(!tag.active, "no strategy answer, so never placed");
        assert!(tag.history.is_empty());
        assert!(tag.last_update.is_none());
    }

    #[test]
    fn test_empty_range_classifies_unknown() {
        let store = store3();
        let strategy = FixedPositionTable::bench_layout();

        ingest_datagram(br#"{"id": 2}"#, &store, &strategy, Instant::now()).unwrap();

        let tag = store.snapshot(2).unwrap();
        assert_eq!(tag.anchor_count, 0);
        assert_eq!(tag.quality, LinkQuality::Unknown);
        assert!(tag.active, "fixed slot still places the tag");
    }

    #[test]
    fn test_rate_window_decays_after_quiet_spell() {
        let t0 = Instant::now();
        let mut counters = Counters::new(t0);
        for i in 0..5u64 {
            counters.note_valid(t0 + Duration::from_millis(100 * i));
        }

        // The first roll after the window closes publishes its count.
        counters.roll_window(t0 + Duration::from_millis(1100));
        assert_eq!(counters.packets_per_second, 5);

        // A query long after the feed went quiet reads zero, not leftovers.
        counters.roll_window(t0 + Duration::from_secs(10));
        assert_eq!(counters.packets_per_second, 0);

        // A late packet counts toward its own fresh window.
        counters.note_valid(t0 + Duration::from_secs(20));
        assert_eq!(counters.packets_per_second, 0);
        counters.roll_window(t0 + Duration::from_secs(21));
        assert_eq!(counters.packets_per_second, 1);
    }

    #[test]
    fn test_spawn_fails_on_unusable_address() {
        let result = TelemetryReceiver::spawn(
            ReceiverConfig {
                bind_addr: "not-an-address".to_string(),
                ..ReceiverConfig::default()
            },
            Arc::new(store3()),
            Box::new(FixedPositionTable::bench_layout()),
        );
        assert!(matches!(result, Err(IngestError::Bind(_))));
    }

    #[test]
    fn test_receiver_over_loopback_and_stop_idempotence() {
        let config = ReceiverConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            poll_interval: Duration::from_millis(20),
            ..ReceiverConfig::default()
        };
        let store = Arc::new(store3());
        let mut receiver = TelemetryReceiver::spawn(
            config,
            Arc::clone(&store),
            Box::new(FixedPositionTable::bench_layout()),
        )
        .unwrap();
        assert!(!receiver.is_connected());

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender
            .send_to(
                br#"{"id": 0, "range": [10, 20, 30, 40], "rssi": [1, 2, 3, 4]}"#,
                receiver.local_addr(),
            )
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while store.snapshot(0).unwrap().last_update.is_none() {
            assert!(Instant::now() < deadline, "packet never ingested");
            thread::sleep(Duration::from_millis(5));
        }

        let stats = receiver.statistics();
        assert_eq!(stats.packets_received, 1);
        assert_eq!(stats.decode_errors, 0);
        assert!(stats.connected);
        assert!(receiver.is_connected());

        receiver.stop();
        receiver.stop();
        assert_eq!(receiver.statistics().packets_received, 1);
    }
}
