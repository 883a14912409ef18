use std::time::Duration;

use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, SeedableRng};

const BASE_BACKOFF_MS: u64 = 250;
const MAX_EXPONENT: u32 = 6;

/// Exponential retry delay with up to one base step of jitter.
#[derive(Debug)]
pub struct Backoff {
    jitter_rng: Mutex<StdRng>,
}

impl Backoff {
    pub fn new() -> Self {
        Self {
            jitter_rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Delay before retrying after `attempt` (1-based) failed.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(MAX_EXPONENT);
        let base = Duration::from_millis(BASE_BACKOFF_MS << exponent);
        let jitter = {
            let mut rng = self.jitter_rng.lock();
            Duration::from_millis(rng.gen_range(0..BASE_BACKOFF_MS))
        };
        base + jitter
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_per_attempt_and_caps() {
        let backoff = Backoff::new();
        let within = |attempt: u32, base_ms: u64| {
            let delay = backoff.delay(attempt);
            delay >= Duration::from_millis(base_ms)
                && delay < Duration::from_millis(base_ms + BASE_BACKOFF_MS)
        };
        assert!(within(1, 250));
        assert!(within(2, 500));
        assert!(within(3, 1_000));
        assert!(within(7, 16_000));
        assert!(within(40, 16_000));
    }
}
