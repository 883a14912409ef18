use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::trace;

use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};

const EMPTY_RESULT_MARKER: &str = "hasn't returned any results";
const MISSING_PRICE: &[&str] = &["", "N/A", "null"];

/// One raw result from an image or text search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub source: Option<String>,
    pub price_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchQuery {
    /// Reverse image search over the catalog photo.
    Visual { image_url: String },
    /// Site-scoped text query.
    Text { query: String },
}

impl SearchQuery {
    pub fn kind(&self) -> &'static str {
        match self {
            SearchQuery::Visual { .. } => "visual",
            SearchQuery::Text { .. } => "text",
        }
    }
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &SearchQuery) -> AppResult<Vec<SearchHit>>;
}

pub struct SerpApiClient {
    http: reqwest::Client,
    api_key: SecretString,
    endpoint: String,
    country: String,
    language: String,
}

impl SerpApiClient {
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        let api_key = config
            .search_api_key
            .clone()
            .ok_or_else(|| AppError::Config("SERPAPI_KEY is not set".into()))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.search_timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            http,
            api_key,
            endpoint: config.search_endpoint.clone(),
            country: config.search_country.clone(),
            language: config.search_language.clone(),
        })
    }
}

#[derive(Deserialize)]
struct Response {
    error: Option<String>,
    #[serde(default)]
    visual_matches: Vec<ResponseMatch>,
    #[serde(default)]
    shopping_results: Vec<ResponseMatch>,
    #[serde(default)]
    organic_results: Vec<ResponseMatch>,
}

#[derive(Deserialize)]
struct ResponseMatch {
    link: Option<String>,
    product_link: Option<String>,
    title: Option<String>,
    source: Option<String>,
    price: Option<ResponsePrice>,
    extracted_price: Option<f64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ResponsePrice {
    Listed {
        value: Option<String>,
        extracted_value: Option<f64>,
    },
    Text(String),
}

fn present(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!MISSING_PRICE.contains(&trimmed)).then(|| trimmed.to_string())
}

impl ResponseMatch {
    fn price_text(&self) -> Option<String> {
        let listed = match &self.price {
            Some(ResponsePrice::Listed {
                value,
                extracted_value,
            }) => value
                .as_deref()
                .and_then(present)
                .or_else(|| extracted_value.map(|amount| amount.to_string())),
            Some(ResponsePrice::Text(text)) => present(text),
            None => None,
        };
        listed.or_else(|| self.extracted_price.map(|amount| amount.to_string()))
    }

    fn into_hit(self) -> Option<SearchHit> {
        let price_text = self.price_text();
        let url = self
            .link
            .or(self.product_link)
            .filter(|link| !link.trim().is_empty())?;
        Some(SearchHit {
            url,
            title: self.title.unwrap_or_default(),
            source: self.source,
            price_text,
        })
    }
}

#[async_trait]
impl SearchProvider for SerpApiClient {
    async fn search(&self, query: &SearchQuery) -> AppResult<Vec<SearchHit>> {
        let mut params: Vec<(&str, &str)> = vec![
            ("api_key", self.api_key.expose_secret()),
            ("hl", self.language.as_str()),
        ];
        match query {
            SearchQuery::Visual { image_url } => {
                params.push(("engine", "google_lens"));
                params.push(("url", image_url.as_str()));
                params.push(("country", self.country.as_str()));
                params.push(("no_cache", "false"));
            }
            SearchQuery::Text { query } => {
                params.push(("engine", "google"));
                params.push(("q", query.as_str()));
                params.push(("gl", self.country.as_str()));
            }
        }

        let response = self
            .http
            .get(&self.endpoint)
            .query(&params)
            .send()
            .await?
            .error_for_status()?;
        let body = response.text().await?;
        let parsed: Response = serde_json::from_str(&body)
            .map_err(|err| AppError::Parse(format!("malformed {} response: {err}", query.kind())))?;

        let hits: Vec<SearchHit> = match query {
            SearchQuery::Visual { .. } => parsed.visual_matches,
            SearchQuery::Text { .. } => parsed
                .organic_results
                .into_iter()
                .chain(parsed.shopping_results)
                .collect(),
        }
        .into_iter()
        .filter_map(ResponseMatch::into_hit)
        .collect();

        if hits.is_empty() {
            if let Some(error) = parsed.error.filter(|e| !e.contains(EMPTY_RESULT_MARKER)) {
                return Err(AppError::fetch(&self.endpoint, error));
            }
        }

        trace!(kind = query.kind(), hits = hits.len(), "search responded");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: serde_json::Value) -> Vec<SearchHit> {
        let parsed: Response = serde_json::from_value(json).unwrap();
        parsed
            .visual_matches
            .into_iter()
            .filter_map(ResponseMatch::into_hit)
            .collect()
    }

    #[test]
    fn reads_structured_and_plain_prices() {
        let hits = parse(serde_json::json!({
            "visual_matches": [
                {"link": "https://a", "title": "A", "price": {"value": "₹1,299", "extracted_value": 1299.0}},
                {"link": "https://b", "title": "B", "price": {"value": "N/A", "extracted_value": 899.0}},
                {"link": "https://c", "title": "C", "price": "Rs. 450"},
                {"link": "https://d", "title": "D", "price": "null"},
                {"title": "no link"},
                {"product_link": "https://e", "extracted_price": 120.5}
            ]
        }));
        assert_eq!(hits.len(), 5);
        assert_eq!(hits[0].price_text.as_deref(), Some("₹1,299"));
        assert_eq!(hits[1].price_text.as_deref(), Some("899"));
        assert_eq!(hits[2].price_text.as_deref(), Some("Rs. 450"));
        assert_eq!(hits[3].price_text, None);
        assert_eq!(hits[4].url, "https://e");
        assert_eq!(hits[4].price_text.as_deref(), Some("120.5"));
    }

    #[test]
    fn missing_key_is_a_config_error() {
        let config = AppConfig::default();
        assert!(matches!(
            SerpApiClient::new(&config),
            Err(AppError::Config(_))
        ));
    }
}
