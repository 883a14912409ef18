use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use secrecy::{ExposeSecret, SecretString};
use tracing::trace;
use url::Url;

use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};

const SLIKK_PRODUCT_BASE: &str = "https://www.slikk.club/product/";
const MIN_PRODUCT_ID_DIGITS: usize = 5;

pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchRoute {
    /// Plain GET with a rotated browser User-Agent.
    Direct,
    /// Rendered through the scraping proxy.
    Proxy,
}

impl FetchRoute {
    pub fn as_tag(&self) -> &'static str {
        match self {
            FetchRoute::Direct => "direct",
            FetchRoute::Proxy => "proxy",
        }
    }
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str, route: FetchRoute) -> AppResult<String>;

    fn supports(&self, _route: FetchRoute) -> bool {
        true
    }
}

pub struct HttpPageFetcher {
    direct: reqwest::Client,
    proxy: reqwest::Client,
    scraper_key: Option<SecretString>,
    scraper_endpoint: String,
    agent_rng: Mutex<StdRng>,
}

impl HttpPageFetcher {
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        let direct = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.fetch_timeout_secs.max(1)))
            .pool_max_idle_per_host(config.max_workers)
            .build()?;
        let proxy = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.proxy_timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            direct,
            proxy,
            scraper_key: config.scraper_api_key.clone(),
            scraper_endpoint: config.scraper_endpoint.clone(),
            agent_rng: Mutex::new(StdRng::from_entropy()),
        })
    }

    fn user_agent(&self) -> &'static str {
        let mut rng = self.agent_rng.lock();
        USER_AGENTS.choose(&mut *rng).copied().unwrap_or(USER_AGENTS[0])
    }

    async fn fetch_direct(&self, url: &str) -> AppResult<String> {
        let response = self
            .direct
            .get(url)
            .header(USER_AGENT, self.user_agent())
            .header(ACCEPT, "text/html,application/xhtml+xml")
            .header(ACCEPT_LANGUAGE, "en-IN,en;q=0.9")
            .send()
            .await?;
        read_page(url, response).await
    }

    async fn fetch_proxy(&self, url: &str) -> AppResult<String> {
        let key = self
            .scraper_key
            .as_ref()
            .ok_or_else(|| AppError::Config("SCRAPERAPI_KEY is not set".into()))?;
        let response = self
            .proxy
            .get(&self.scraper_endpoint)
            .query(&[
                ("api_key", key.expose_secret()),
                ("url", url),
                ("render", "true"),
            ])
            .send()
            .await?;
        read_page(url, response).await
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    fn supports(&self, route: FetchRoute) -> bool {
        match route {
            FetchRoute::Direct => true,
            FetchRoute::Proxy => self.scraper_key.is_some(),
        }
    }

    async fn fetch(&self, url: &str, route: FetchRoute) -> AppResult<String> {
        let target = encode_path_spaces(url);
        trace!(url = %target, route = route.as_tag(), "fetching page");
        match route {
            FetchRoute::Direct => self.fetch_direct(&target).await,
            FetchRoute::Proxy => self.fetch_proxy(&target).await,
        }
    }
}

/// Non-success statuses become `PageStatus` so callers can tell dead pages from outages.
async fn read_page(url: &str, response: reqwest::Response) -> AppResult<String> {
    let status = response.status();
    if !status.is_success() {
        return Err(AppError::PageStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(response.text().await?)
}

/// Percent-encodes spaces in the path; other URLs are returned trimmed.
pub fn encode_path_spaces(url: &str) -> String {
    let trimmed = url.trim();
    if !trimmed.contains(' ') {
        return trimmed.to_string();
    }
    match Url::parse(trimmed) {
        Ok(parsed) => parsed.to_string(),
        Err(_) => trimmed.replace(' ', "%20"),
    }
}

/// Rewrites a Slikk URL ending in a long numeric id to the canonical product page.
pub fn normalize_slikk_url(url: &str) -> String {
    let trimmed = url.trim();
    let product_id = Url::parse(trimmed).ok().and_then(|parsed| {
        parsed
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last().map(str::to_string))
            .filter(|last| {
                last.len() >= MIN_PRODUCT_ID_DIGITS && last.chars().all(|c| c.is_ascii_digit())
            })
    });
    match product_id {
        Some(id) => format!("{SLIKK_PRODUCT_BASE}{id}"),
        None => encode_path_spaces(trimmed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_numeric_slikk_ids() {
        assert_eq!(
            normalize_slikk_url("https://slikk.club/p/some-tee/61050603"),
            "https://www.slikk.club/product/61050603"
        );
        assert_eq!(
            normalize_slikk_url("https://www.slikk.club/products/351389607076/"),
            "https://www.slikk.club/product/351389607076"
        );
        assert_eq!(
            normalize_slikk_url("https://www.slikk.club/product/1234"),
            "https://www.slikk.club/product/1234"
        );
    }

    #[test]
    fn encodes_spaces_in_paths() {
        assert_eq!(
            normalize_slikk_url("https://www.slikk.club/tss/oversized tee"),
            "https://www.slikk.club/tss/oversized%20tee"
        );
        assert_eq!(
            encode_path_spaces(" https://tigc.in/products/shirt "),
            "https://tigc.in/products/shirt"
        );
    }

    #[test]
    fn proxy_requires_key() {
        let fetcher = HttpPageFetcher::new(&AppConfig::default()).unwrap();
        assert!(fetcher.supports(FetchRoute::Direct));
        assert!(!fetcher.supports(FetchRoute::Proxy));
        let agent = fetcher.user_agent();
        assert!(USER_AGENTS.contains(&agent));
    }

    #[tokio::test]
    async fn proxy_without_key_fails_fast() {
        let fetcher = HttpPageFetcher::new(&AppConfig::default()).unwrap();
        let result = fetcher
            .fetch("https://www.slikk.club/product/12345", FetchRoute::Proxy)
            .await;
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
