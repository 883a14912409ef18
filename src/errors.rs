use std::io;
use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

use crate::records::AnnotatedRow;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("{0}")]
    Config(String),
    #[error("{0}")]
    Parse(String),
    #[error("fetch failed for {url}: {reason}")]
    FetchFailed { url: String, reason: String },
    #[error("{url} answered with status {status}")]
    PageStatus { url: String, status: u16 },
    #[error("incomplete page for {url}: {bytes} bytes")]
    IncompletePage { url: String, bytes: usize },
    #[error("rate limiter did not grant a slot within {0:?}")]
    RateLimitTimeout(Duration),
    #[error("{service} unavailable after {consecutive_failures} consecutive failures")]
    ServiceUnavailable {
        service: &'static str,
        consecutive_failures: usize,
    },
    /// A stage stopped early; `rows` holds every input row, finished or untouched.
    #[error("{cause} ({} rows kept)", .rows.len())]
    Halted {
        #[source]
        cause: Box<AppError>,
        rows: Vec<AnnotatedRow>,
    },
}

impl AppError {
    pub fn fetch(url: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::FetchFailed {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// True when the service itself could not be reached or refused to serve.
    /// A page that answers 4xx still proves connectivity.
    pub fn is_transport(&self) -> bool {
        match self {
            AppError::Http(err) => match err.status() {
                Some(status) => is_unavailable_status(status.as_u16()),
                None => err.is_connect() || err.is_timeout() || err.is_request(),
            },
            AppError::PageStatus { status, .. } => is_unavailable_status(*status),
            AppError::FetchFailed { .. } | AppError::Io(_) => true,
            _ => false,
        }
    }
}

fn is_unavailable_status(status: u16) -> bool {
    status >= 500 || status == StatusCode::TOO_MANY_REQUESTS.as_u16()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(status: u16) -> AppError {
        AppError::PageStatus {
            url: "https://www.myntra.com/x/1/buy".into(),
            status,
        }
    }

    #[test]
    fn only_unreachable_services_count_as_transport() {
        assert!(!page(404).is_transport());
        assert!(!page(403).is_transport());
        assert!(page(429).is_transport());
        assert!(page(503).is_transport());
        assert!(AppError::fetch("https://api.scraperapi.com/", "connection reset").is_transport());
        assert!(!AppError::IncompletePage {
            url: "https://www.slikk.club/product/12345".into(),
            bytes: 120,
        }
        .is_transport());
        assert!(!AppError::Parse("bad json".into()).is_transport());
    }
}
