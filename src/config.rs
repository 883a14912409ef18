use std::time::Duration;
use std::{env, io};

use secrecy::SecretString;
use serde::Serialize;
use tracing::debug;

use crate::ranking::{RankerSettings, SiteThresholds};

const DEFAULT_SEARCH_ENDPOINT: &str = "https://serpapi.com/search";
const DEFAULT_SCRAPER_ENDPOINT: &str = "https://api.scraperapi.com/";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub search_api_key: Option<SecretString>,
    pub scraper_api_key: Option<SecretString>,
    pub search_endpoint: String,
    pub scraper_endpoint: String,
    pub search_country: String,
    pub search_language: String,
    pub search_max_per_second: u32,
    pub search_max_per_hour: u32,
    pub search_timeout_secs: u64,
    pub search_max_attempts: u32,
    pub discovery_workers: usize,
    pub max_workers: usize,
    pub slikk_max_parallel: usize,
    pub slikk_retries: u32,
    pub slikk_retry_delay_ms: u64,
    pub slikk_min_page_bytes: usize,
    pub slikk_force_refresh: bool,
    pub fetch_timeout_secs: u64,
    pub proxy_timeout_secs: u64,
    pub fetch_max_attempts: u32,
    pub max_consecutive_failures: usize,
    pub ranking: RankerSettings,
}

#[derive(Clone, Debug, Serialize)]
pub struct PublicAppConfig {
    pub search_endpoint: String,
    pub scraper_endpoint: String,
    pub search_max_per_second: u32,
    pub search_max_per_hour: u32,
    pub discovery_workers: usize,
    pub max_workers: usize,
    pub slikk_max_parallel: usize,
    pub slikk_retries: u32,
    pub slikk_retry_delay_ms: u64,
    pub slikk_force_refresh: bool,
    pub max_consecutive_failures: usize,
    pub has_search_api_key: bool,
    pub has_scraper_api_key: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        load_dotenv_if_applicable();
        let defaults = RankerSettings::default();
        Self {
            search_api_key: parse_secret("SERPAPI_KEY"),
            scraper_api_key: parse_secret("SCRAPERAPI_KEY"),
            search_endpoint: env::var("SERPAPI_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_SEARCH_ENDPOINT.to_string()),
            scraper_endpoint: env::var("SCRAPERAPI_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_SCRAPER_ENDPOINT.to_string()),
            search_country: env::var("SEARCH_COUNTRY").unwrap_or_else(|_| "in".to_string()),
            search_language: env::var("SEARCH_LANGUAGE").unwrap_or_else(|_| "en".to_string()),
            search_max_per_second: parse_u32("SEARCH_MAX_PER_SECOND", 7).max(1),
            search_max_per_hour: parse_u32("SEARCH_MAX_PER_HOUR", 1000).max(1),
            search_timeout_secs: parse_u64("SEARCH_TIMEOUT_SECS", 20),
            search_max_attempts: parse_u32("SEARCH_MAX_ATTEMPTS", 3).max(1),
            discovery_workers: parse_usize("DISCOVERY_WORKERS", 8).max(1),
            max_workers: parse_usize("MAX_WORKERS", 24).max(1),
            slikk_max_parallel: parse_usize("SLIKK_MAX_PARALLEL", 3).max(1),
            slikk_retries: parse_u32("SLIKK_RETRIES", 3).max(1),
            slikk_retry_delay_ms: parse_u64("SLIKK_RETRY_DELAY_MS", 2_000),
            slikk_min_page_bytes: parse_usize("SLIKK_MIN_PAGE_BYTES", 5_000),
            slikk_force_refresh: parse_bool("SLIKK_FORCE_REFRESH", false),
            fetch_timeout_secs: parse_u64("FETCH_TIMEOUT_SECS", 30),
            proxy_timeout_secs: parse_u64("PROXY_TIMEOUT_SECS", 60),
            fetch_max_attempts: parse_u32("FETCH_MAX_ATTEMPTS", 3).max(1),
            max_consecutive_failures: parse_usize("MAX_CONSECUTIVE_FAILURES", 25).max(1),
            ranking: RankerSettings {
                marketplace: SiteThresholds {
                    min_similarity: parse_f64(
                        "MARKETPLACE_MIN_SIMILARITY",
                        defaults.marketplace.min_similarity,
                    ),
                    ..defaults.marketplace
                },
                brand: SiteThresholds {
                    min_similarity: parse_f64("BRAND_MIN_SIMILARITY", defaults.brand.min_similarity),
                    ..defaults.brand
                },
                ..defaults
            },
        }
    }

    pub fn public_profile(&self) -> PublicAppConfig {
        PublicAppConfig {
            search_endpoint: self.search_endpoint.clone(),
            scraper_endpoint: self.scraper_endpoint.clone(),
            search_max_per_second: self.search_max_per_second,
            search_max_per_hour: self.search_max_per_hour,
            discovery_workers: self.discovery_workers,
            max_workers: self.max_workers,
            slikk_max_parallel: self.slikk_max_parallel,
            slikk_retries: self.slikk_retries,
            slikk_retry_delay_ms: self.slikk_retry_delay_ms,
            slikk_force_refresh: self.slikk_force_refresh,
            max_consecutive_failures: self.max_consecutive_failures,
            has_search_api_key: self.search_api_key.is_some(),
            has_scraper_api_key: self.scraper_api_key.is_some(),
        }
    }

    pub fn slikk_retry_delay(&self) -> Duration {
        Duration::from_millis(self.slikk_retry_delay_ms)
    }
}

impl Default for AppConfig {
    /// Built-in defaults without reading the environment.
    fn default() -> Self {
        Self {
            search_api_key: None,
            scraper_api_key: None,
            search_endpoint: DEFAULT_SEARCH_ENDPOINT.to_string(),
            scraper_endpoint: DEFAULT_SCRAPER_ENDPOINT.to_string(),
            search_country: "in".to_string(),
            search_language: "en".to_string(),
            search_max_per_second: 7,
            search_max_per_hour: 1000,
            search_timeout_secs: 20,
            search_max_attempts: 3,
            discovery_workers: 8,
            max_workers: 24,
            slikk_max_parallel: 3,
            slikk_retries: 3,
            slikk_retry_delay_ms: 2_000,
            slikk_min_page_bytes: 5_000,
            slikk_force_refresh: false,
            fetch_timeout_secs: 30,
            proxy_timeout_secs: 60,
            fetch_max_attempts: 3,
            max_consecutive_failures: 25,
            ranking: RankerSettings::default(),
        }
    }
}

fn load_dotenv_if_applicable() {
    if !should_load_dotenv() {
        debug!("skipping .env load outside dev mode");
        return;
    }

    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn should_load_dotenv() -> bool {
    cfg!(debug_assertions) || parse_bool("ALLOW_DOTENV", false)
}

fn parse_secret(key: &str) -> Option<SecretString> {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(SecretString::from)
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn parse_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn parse_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(default)
}

fn parse_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && (0.0..=1.0).contains(v))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_public_profile_without_secrets() {
        env::set_var("SERPAPI_KEY", "secret");
        env::set_var("SCRAPERAPI_KEY", "  ");
        env::set_var("SLIKK_MAX_PARALLEL", "0");
        env::set_var("MAX_WORKERS", "12");
        env::set_var("SLIKK_FORCE_REFRESH", "true");
        env::set_var("BRAND_MIN_SIMILARITY", "4.5");

        let config = AppConfig::from_env();
        let public = config.public_profile();

        assert!(public.has_search_api_key);
        assert!(!public.has_scraper_api_key);
        assert_eq!(public.slikk_max_parallel, 1);
        assert_eq!(public.max_workers, 12);
        assert!(public.slikk_force_refresh);
        assert_eq!(
            config.ranking.brand.min_similarity,
            RankerSettings::default().brand.min_similarity
        );

        let rendered = serde_json::to_string(&public).unwrap();
        assert!(!rendered.contains("secret"));
    }

    #[test]
    fn defaults_match_documented_limits() {
        let config = AppConfig::default();
        assert_eq!(config.search_max_per_second, 7);
        assert_eq!(config.search_max_per_hour, 1000);
        assert_eq!(config.slikk_retry_delay(), Duration::from_secs(2));
        assert!(config.search_api_key.is_none());
    }
}
