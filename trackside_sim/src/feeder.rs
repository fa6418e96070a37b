//! Deterministic UDP telemetry feeder.
//!
//! Sends wire-format datagrams at a receiver the way the trackside gateway
//! would: fire-and-forget, no acknowledgement, loss tolerated. Range noise
//! comes from a seeded ChaCha8 stream, so a scenario replays identically
//! from the same seed.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use std::io;
use std::net::{SocketAddr, UdpSocket};
use tracing::trace;

/// Sends scripted telemetry datagrams to one receiver.
pub struct TelemetryFeeder {
    socket: UdpSocket,
    target: SocketAddr,
    rng: ChaCha8Rng,
    noise_std: f32,
}

impl TelemetryFeeder {
    pub fn new(target: SocketAddr, seed: u64) -> io::Result<Self> {
        let socket = UdpSocket::bind("127.0.0.1:0")?;
        Ok(Self {
            socket,
            target,
            rng: ChaCha8Rng::seed_from_u64(seed),
            noise_std: 0.0,
        })
    }

    /// Gaussian noise applied to every range, in centimeters. Zero disables.
    pub fn set_range_noise(&mut self, std_dev: f32) {
        self.noise_std = std_dev;
    }

    /// Send one well-formed reading for `tag_id`.
    pub fn send_reading(&mut self, tag_id: usize, ranges: &[f32], rssi: &[i32]) -> io::Result<()> {
        let noisy = self.noisy_ranges(ranges);
        let payload = serde_json::json!({
            "id": tag_id,
            "range": noisy,
            "rssi": rssi,
        });
        self.send_raw(payload.to_string().as_bytes())
    }

    /// Send a reading that names no id at all.
    pub fn send_anonymous(&mut self, ranges: &[f32]) -> io::Result<()> {
        let payload = serde_json::json!({ "range": ranges });
        self.send_raw(payload.to_string().as_bytes())
    }

    /// Send a payload no decoder will accept.
    pub fn send_malformed(&mut self) -> io::Result<()> {
        self.send_raw(b"{telemetry!!")
    }

    /// Send an arbitrary payload unchanged.
    pub fn send_raw(&mut self, payload: &[u8]) -> io::Result<()> {
        self.socket.send_to(payload, self.target)?;
        trace!("fed {} bytes to {}", payload.len(), self.target);
        Ok(())
    }

    fn noisy_ranges(&mut self, ranges: &[f32]) -> Vec<f32> {
        if self.noise_std <= 0.0 {
            return ranges.to_vec();
        }
        let normal = Normal::new(0.0f32, self.noise_std).unwrap();
        ranges
            .iter()
            .map(|range| range + normal.sample(&mut self.rng))
            .collect()
    }
}
