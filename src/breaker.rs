use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::warn;

use crate::errors::{AppError, AppResult};

/// Counts consecutive failures of one external service across all workers.
#[derive(Debug)]
pub struct FailureBreaker {
    service: &'static str,
    threshold: usize,
    consecutive: AtomicUsize,
}

impl FailureBreaker {
    pub fn new(service: &'static str, threshold: usize) -> Self {
        Self {
            service,
            threshold: threshold.max(1),
            consecutive: AtomicUsize::new(0),
        }
    }

    pub fn record_success(&self) {
        self.consecutive.store(0, Ordering::SeqCst);
    }

    pub fn record_failure(&self) {
        let count = self.consecutive.fetch_add(1, Ordering::SeqCst) + 1;
        if count == self.threshold {
            warn!(
                service = self.service,
                consecutive_failures = count,
                "failure threshold reached; stopping new work"
            );
        }
    }

    /// Failures that still reached the service, such as a 404 page, reset the count.
    pub fn record_error(&self, err: &AppError) {
        if err.is_transport() {
            self.record_failure();
        } else {
            self.record_success();
        }
    }

    pub fn is_tripped(&self) -> bool {
        self.consecutive.load(Ordering::SeqCst) >= self.threshold
    }

    pub fn check(&self) -> AppResult<()> {
        let consecutive_failures = self.consecutive.load(Ordering::SeqCst);
        if consecutive_failures >= self.threshold {
            return Err(AppError::ServiceUnavailable {
                service: self.service,
                consecutive_failures,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_after_threshold_and_resets_on_success() {
        let breaker = FailureBreaker::new("search", 3);
        breaker.record_failure();
        breaker.record_failure();
        assert!(breaker.check().is_ok());
        breaker.record_success();
        for _ in 0..3 {
            breaker.record_failure();
        }
        assert!(breaker.is_tripped());
        match breaker.check() {
            Err(AppError::ServiceUnavailable {
                service,
                consecutive_failures,
            }) => {
                assert_eq!(service, "search");
                assert_eq!(consecutive_failures, 3);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn page_level_errors_do_not_count() {
        let breaker = FailureBreaker::new("page fetch", 2);
        let gone = AppError::PageStatus {
            url: "https://www.myntra.com/x/1/buy".into(),
            status: 404,
        };
        breaker.record_error(&AppError::fetch("https://api.scraperapi.com/", "timed out"));
        breaker.record_error(&gone);
        breaker.record_error(&AppError::fetch("https://api.scraperapi.com/", "timed out"));
        assert!(!breaker.is_tripped());
        breaker.record_error(&AppError::fetch("https://api.scraperapi.com/", "timed out"));
        assert!(breaker.is_tripped());
    }
}
