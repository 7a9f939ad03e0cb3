//! Randomized upload throughput generator

use std::time::Instant;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::config::SimulationConfig;
use crate::tracker::AnnounceError;

/// Produces monotonically increasing uploaded-byte counts at a random speed.
///
/// Each tick samples a speed uniformly from `[min_speed, max_speed]` and
/// credits `speed * elapsed` bytes. In bounded mode the total is clamped at
/// the target and completion is signalled once through [`take_completion`].
///
/// [`take_completion`]: TrafficSimulator::take_completion
#[derive(Debug, Clone)]
pub struct TrafficSimulator {
    min_speed: u64,
    max_speed: u64,
    target_bytes: Option<u64>,
    rng: ChaCha8Rng,
    total_uploaded: u64,
    current_speed: u64,
    last_tick: Option<Instant>,
    completed: bool,
    completion_pending: bool,
}

impl TrafficSimulator {
    /// Creates a simulator. `target_bytes` of `None` means unlimited.
    ///
    /// # Errors
    ///
    /// - `AnnounceError::InvalidConfiguration` - A speed is zero, `min_speed > max_speed`,
    ///   or the target is zero
    pub fn new(
        target_bytes: Option<u64>,
        min_speed: u64,
        max_speed: u64,
        seed: Option<u64>,
    ) -> Result<Self, AnnounceError> {
        if min_speed == 0 || max_speed == 0 || min_speed > max_speed {
            return Err(AnnounceError::InvalidConfiguration {
                reason: format!(
                    "upload speeds must be positive with min <= max (got {min_speed}..{max_speed})"
                ),
            });
        }
        if target_bytes == Some(0) {
            return Err(AnnounceError::InvalidConfiguration {
                reason: "upload target must be greater than zero".to_string(),
            });
        }

        let seed = seed.unwrap_or_else(rand::random);
        Ok(Self {
            min_speed,
            max_speed,
            target_bytes,
            rng: ChaCha8Rng::seed_from_u64(seed),
            total_uploaded: 0,
            current_speed: 0,
            last_tick: None,
            completed: false,
            completion_pending: false,
        })
    }

    /// Creates a simulator from the simulation section of the configuration.
    ///
    /// # Errors
    ///
    /// - `AnnounceError::InvalidConfiguration` - See [`TrafficSimulator::new`]
    pub fn from_config(config: &SimulationConfig) -> Result<Self, AnnounceError> {
        Self::new(
            config.target_upload_bytes,
            config.min_upload_speed,
            config.max_upload_speed,
            config.seed,
        )
    }

    /// Advances the simulation to `now`, returning the bytes credited.
    ///
    /// The first tick only anchors the clock. A tick that is not later than
    /// the previous one does nothing.
    pub fn tick(&mut self, now: Instant) -> u64 {
        let Some(last) = self.last_tick else {
            self.last_tick = Some(now);
            return 0;
        };
        if now <= last {
            return 0;
        }
        self.last_tick = Some(now);

        if self.completed {
            return 0;
        }

        let elapsed = now.duration_since(last).as_secs_f64();
        let speed = self.rng.random_range(self.min_speed..=self.max_speed);
        let mut credited = (speed as f64 * elapsed) as u64;
        self.current_speed = speed;

        if let Some(target) = self.target_bytes {
            let remaining = target - self.total_uploaded;
            if credited >= remaining {
                credited = remaining;
                self.completed = true;
                self.completion_pending = true;
                self.current_speed = 0;
                tracing::info!("Upload target of {} bytes reached", target);
            }
        }

        self.total_uploaded = self.total_uploaded.saturating_add(credited);
        credited
    }

    /// Returns `true` exactly once after the target has been reached.
    pub fn take_completion(&mut self) -> bool {
        std::mem::take(&mut self.completion_pending)
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Last sampled speed in bytes per second.
    pub fn current_speed(&self) -> u64 {
        self.current_speed
    }

    pub fn total_uploaded(&self) -> u64 {
        self.total_uploaded
    }

    pub fn target_bytes(&self) -> Option<u64> {
        self.target_bytes
    }

    /// Zeroes progress and clears completion. Speeds, target and the random
    /// stream are kept.
    pub fn reset(&mut self) {
        self.total_uploaded = 0;
        self.current_speed = 0;
        self.last_tick = None;
        self.completed = false;
        self.completion_pending = false;
    }
}
