//! Fuzzed pauses between page interactions
//!
//! Every pause lasts `base * scale * (1 + u)` with `u` drawn uniformly from
//! `[0, 1)`, so no two waits are identical. These pauses are the only
//! scheduling points of a harvesting run.

use rand::Rng;
use std::time::Duration;
use tracing::trace;

/// Source of randomized delays, owning the run's randomness
pub struct Pacer<R> {
    base: Duration,
    rng: R,
}

impl<R: Rng> Pacer<R> {
    pub fn new(base: Duration, rng: R) -> Self {
        Self { base, rng }
    }

    /// Duration of the next pause for `scale` times the base interval
    pub fn next_delay(&mut self, scale: f64) -> Duration {
        let interval = self.base.mul_f64(scale);
        interval + interval.mul_f64(self.rng.random::<f64>())
    }

    /// Sleep for a fuzzed multiple of the base interval
    pub async fn pause(&mut self, scale: f64) {
        let delay = self.next_delay(scale);
        if delay.is_zero() {
            return;
        }
        trace!("Pausing for {:?}", delay);
        tokio::time::sleep(delay).await;
    }

    /// Randomness shared with tie-breaking
    pub fn rng(&mut self) -> &mut R {
        &mut self.rng
    }
}
