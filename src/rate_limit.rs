use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{sleep, timeout, Instant};
use tracing::trace;

use crate::errors::{AppError, AppResult};

const SECOND: Duration = Duration::from_secs(1);
const HOUR: Duration = Duration::from_secs(3600);

/// Sliding-log limiter over a one second and a one hour window.
///
/// A grant is recorded in both windows at the instant it is handed out and is never
/// returned, so a caller that fails after `acquire` still spends its slot.
pub struct DualWindowRateLimiter {
    per_second: usize,
    per_hour: usize,
    windows: Mutex<Windows>,
}

#[derive(Default)]
struct Windows {
    second: VecDeque<Instant>,
    hour: VecDeque<Instant>,
}

impl Windows {
    fn evict(&mut self, now: Instant) {
        evict_older_than(&mut self.second, now, SECOND);
        evict_older_than(&mut self.hour, now, HOUR);
    }
}

fn evict_older_than(window: &mut VecDeque<Instant>, now: Instant, span: Duration) {
    while let Some(front) = window.front() {
        if now.duration_since(*front) >= span {
            window.pop_front();
        } else {
            break;
        }
    }
}

fn opening_after(window: &VecDeque<Instant>, now: Instant, span: Duration) -> Duration {
    window
        .front()
        .map(|front| (*front + span).saturating_duration_since(now))
        .unwrap_or_default()
}

impl DualWindowRateLimiter {
    pub fn new(per_second: u32, per_hour: u32) -> Self {
        Self {
            per_second: per_second.max(1) as usize,
            per_hour: per_hour.max(1) as usize,
            windows: Mutex::new(Windows::default()),
        }
    }

    pub fn per_second(&self) -> usize {
        self.per_second
    }

    pub fn per_hour(&self) -> usize {
        self.per_hour
    }

    /// Waits until both windows have room, then consumes one slot from each.
    pub async fn acquire(&self) {
        loop {
            let wait = match self.try_grant(Instant::now()) {
                None => return,
                Some(wait) => wait,
            };
            trace!(?wait, "search rate limit saturated; waiting");
            sleep(wait.max(Duration::from_millis(1))).await;
        }
    }

    pub async fn acquire_timeout(&self, limit: Duration) -> AppResult<()> {
        timeout(limit, self.acquire())
            .await
            .map_err(|_| AppError::RateLimitTimeout(limit))
    }

    /// Records a grant and returns `None`, or returns how long until a slot may open.
    fn try_grant(&self, now: Instant) -> Option<Duration> {
        let mut windows = self.windows.lock();
        windows.evict(now);

        let second_full = windows.second.len() >= self.per_second;
        let hour_full = windows.hour.len() >= self.per_hour;
        if !second_full && !hour_full {
            windows.second.push_back(now);
            windows.hour.push_back(now);
            return None;
        }

        let mut wait = Duration::ZERO;
        if second_full {
            wait = wait.max(opening_after(&windows.second, now, SECOND));
        }
        if hour_full {
            wait = wait.max(opening_after(&windows.hour, now, HOUR));
        }
        Some(wait)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn max_in_window(grants: &[Instant], span: Duration) -> usize {
        grants
            .iter()
            .map(|start| {
                grants
                    .iter()
                    .filter(|t| **t >= *start && t.duration_since(*start) < span)
                    .count()
            })
            .max()
            .unwrap_or(0)
    }

    #[tokio::test(start_paused = true)]
    async fn grants_burst_then_waits_for_second_window() {
        let limiter = DualWindowRateLimiter::new(3, 100);
        let started = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert!(started.elapsed() < Duration::from_millis(10));

        limiter.acquire().await;
        assert!(started.elapsed() >= SECOND);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_never_exceed_either_window() {
        let limiter = Arc::new(DualWindowRateLimiter::new(5, 12));
        let grants = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let limiter = Arc::clone(&limiter);
            let grants = Arc::clone(&grants);
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                grants.lock().push(Instant::now());
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut grants = grants.lock().clone();
        grants.sort();
        assert_eq!(grants.len(), 20);
        assert!(max_in_window(&grants, SECOND) <= 5);
        assert!(max_in_window(&grants, HOUR) <= 12);
        let span = grants.last().unwrap().duration_since(grants[0]);
        assert!(span >= HOUR);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_variant_reports_saturation() {
        let limiter = DualWindowRateLimiter::new(1, 1);
        limiter.acquire().await;
        let result = limiter.acquire_timeout(Duration::from_secs(5)).await;
        assert!(matches!(result, Err(AppError::RateLimitTimeout(_))));
    }

    #[test]
    fn zero_limits_are_clamped() {
        let limiter = DualWindowRateLimiter::new(0, 0);
        assert_eq!(limiter.per_second(), 1);
        assert_eq!(limiter.per_hour(), 1);
    }
}
