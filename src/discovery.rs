use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, info, trace, warn};

use crate::backoff::Backoff;
use crate::brands::{normalize_brand, BrandMatch};
use crate::breaker::FailureBreaker;
use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};
use crate::rate_limit::DualWindowRateLimiter;
use crate::ranking::CandidateRanker;
use crate::records::{AnnotatedRow, CatalogRow};
use crate::search::{SearchHit, SearchProvider, SearchQuery};
use crate::sites::Site;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryStage {
    Pending,
    Pass1Done,
    Pass2Done,
    Done,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryStats {
    pub total_rows: usize,
    pub pass1_queries: usize,
    pub pass1_skipped_no_image: usize,
    pub pass2_rows: usize,
    pub pass2_queries: usize,
    pub api_calls: usize,
    pub search_failures: usize,
    pub myntra_found: usize,
    pub slikk_found: usize,
    pub brand_found: usize,
    pub fully_resolved: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl DiscoveryStats {
    fn started(total_rows: usize) -> Self {
        let now = Utc::now();
        Self {
            total_rows,
            pass1_queries: 0,
            pass1_skipped_no_image: 0,
            pass2_rows: 0,
            pass2_queries: 0,
            api_calls: 0,
            search_failures: 0,
            myntra_found: 0,
            slikk_found: 0,
            brand_found: 0,
            fully_resolved: 0,
            started_at: now,
            finished_at: now,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiscoveryOutcome {
    /// Annotated rows, highest `view_count` first.
    pub rows: Vec<AnnotatedRow>,
    pub stats: DiscoveryStats,
}

struct RowState {
    row: CatalogRow,
    brand: BrandMatch,
    sites: Vec<Site>,
    stage: DiscoveryStage,
    annotated: AnnotatedRow,
}

impl RowState {
    fn new(row: &CatalogRow) -> Self {
        let brand = normalize_brand(&row.brand_name);
        Self {
            row: row.clone(),
            brand,
            sites: allowed_sites(brand),
            stage: DiscoveryStage::Pending,
            annotated: AnnotatedRow::from_catalog(row),
        }
    }

    fn missing(&self) -> Vec<Site> {
        self.annotated.results.missing(&self.sites)
    }

    fn finish(mut self) -> AnnotatedRow {
        let previous = std::mem::replace(&mut self.stage, DiscoveryStage::Done);
        trace!(style_id = %self.row.style_id, from = ?previous, "row done");
        self.annotated
    }
}

fn sort_by_views(rows: &mut [AnnotatedRow]) {
    rows.sort_by(|a, b| b.view_count.cmp(&a.view_count));
}

/// Wraps a breaker trip so the rows finished so far are not lost.
fn halt(cause: AppError, states: Vec<RowState>) -> AppError {
    let mut rows: Vec<AnnotatedRow> = states.into_iter().map(RowState::finish).collect();
    sort_by_views(&mut rows);
    AppError::Halted {
        cause: Box::new(cause),
        rows,
    }
}

/// Myntra and Slikk always; the brand store only when the brand has a domain.
pub fn allowed_sites(brand: BrandMatch) -> Vec<Site> {
    let mut sites = vec![Site::Myntra, Site::Slikk];
    if brand.site_profile().is_some() {
        sites.push(Site::Brand);
    }
    sites
}

/// Display name for catalogue brands so sub-labels query under the parent store.
fn query_brand(row: &CatalogRow, brand: BrandMatch) -> String {
    brand
        .profile()
        .map(|profile| profile.display_name.to_string())
        .unwrap_or_else(|| row.brand_name.trim().to_string())
}

pub fn site_query(row: &CatalogRow, brand: BrandMatch, domain: &str) -> String {
    format!(
        "{} {} site:{}",
        query_brand(row, brand),
        row.product_title.trim(),
        domain
    )
}

pub struct TwoPassDiscovery {
    search: Arc<dyn SearchProvider>,
    limiter: Arc<DualWindowRateLimiter>,
    ranker: CandidateRanker,
    breaker: FailureBreaker,
    workers: usize,
    max_attempts: u32,
    backoff: Backoff,
    api_calls: AtomicUsize,
    search_failures: AtomicUsize,
}

impl TwoPassDiscovery {
    pub fn new(search: Arc<dyn SearchProvider>, config: &AppConfig) -> Self {
        let limiter = Arc::new(DualWindowRateLimiter::new(
            config.search_max_per_second,
            config.search_max_per_hour,
        ));
        Self::with_limiter(search, limiter, config)
    }

    /// Shares one limiter between several orchestrators using the same API key.
    pub fn with_limiter(
        search: Arc<dyn SearchProvider>,
        limiter: Arc<DualWindowRateLimiter>,
        config: &AppConfig,
    ) -> Self {
        Self {
            search,
            limiter,
            ranker: CandidateRanker::new(config.ranking),
            breaker: FailureBreaker::new("search", config.max_consecutive_failures),
            workers: config.discovery_workers.max(1),
            max_attempts: config.search_max_attempts.max(1),
            backoff: Backoff::new(),
            api_calls: AtomicUsize::new(0),
            search_failures: AtomicUsize::new(0),
        }
    }

    pub async fn run(&self, rows: &[CatalogRow]) -> AppResult<DiscoveryOutcome> {
        let mut stats = DiscoveryStats::started(rows.len());
        let calls_before = self.api_calls.load(Ordering::SeqCst);
        let failures_before = self.search_failures.load(Ordering::SeqCst);
        info!(rows = rows.len(), workers = self.workers, "discovery pass 1 starting");

        let states: Vec<RowState> = rows.iter().map(RowState::new).collect();
        stats.pass1_skipped_no_image = states
            .iter()
            .filter(|state| state.row.image_url().is_none())
            .count();
        stats.pass1_queries = states.len() - stats.pass1_skipped_no_image;

        let states: Vec<RowState> = stream::iter(states)
            .map(|state| self.first_pass(state))
            .buffered(self.workers)
            .collect()
            .await;
        if let Err(cause) = self.breaker.check() {
            return Err(halt(cause, states));
        }

        let pending_pass2: usize = states
            .iter()
            .filter(|state| state.stage == DiscoveryStage::Pass1Done)
            .count();
        stats.pass2_rows = pending_pass2;
        stats.pass2_queries = states
            .iter()
            .filter(|state| state.stage == DiscoveryStage::Pass1Done)
            .map(|state| state.missing().len())
            .sum();
        info!(rows = pending_pass2, queries = stats.pass2_queries, "discovery pass 2 starting");

        let states: Vec<RowState> = stream::iter(states)
            .map(|state| self.second_pass(state))
            .buffered(self.workers)
            .collect()
            .await;
        if let Err(cause) = self.breaker.check() {
            return Err(halt(cause, states));
        }

        let mut annotated = Vec::with_capacity(states.len());
        for state in states {
            let results = &state.annotated.results;
            stats.myntra_found += usize::from(results.myntra.is_resolved());
            stats.slikk_found += usize::from(results.slikk.is_resolved());
            stats.brand_found += usize::from(results.brand.is_resolved());
            stats.fully_resolved += usize::from(state.missing().is_empty());
            annotated.push(state.finish());
        }
        sort_by_views(&mut annotated);

        stats.api_calls = self.api_calls.load(Ordering::SeqCst) - calls_before;
        stats.search_failures = self.search_failures.load(Ordering::SeqCst) - failures_before;
        stats.finished_at = Utc::now();
        info!(
            api_calls = stats.api_calls,
            myntra_found = stats.myntra_found,
            slikk_found = stats.slikk_found,
            brand_found = stats.brand_found,
            "discovery finished"
        );
        Ok(DiscoveryOutcome {
            rows: annotated,
            stats,
        })
    }

    async fn first_pass(&self, mut state: RowState) -> RowState {
        if self.breaker.is_tripped() {
            return state;
        }

        if let Some(image_url) = state.row.image_url() {
            let query = SearchQuery::Visual {
                image_url: image_url.to_string(),
            };
            if let Some(hits) = self.search_with_retry(&state.row.style_id, &query).await {
                let found = self
                    .ranker
                    .rank_sites(&state.row, state.brand, &state.sites, &hits);
                for candidate in found {
                    let site = candidate.site;
                    state.annotated.results.fill_if_empty(site, candidate.into());
                }
            }
        } else {
            debug!(style_id = %state.row.style_id, "no image; pass 1 skipped");
        }

        state.stage = if state.missing().is_empty() {
            DiscoveryStage::Done
        } else {
            DiscoveryStage::Pass1Done
        };
        state
    }

    async fn second_pass(&self, mut state: RowState) -> RowState {
        if state.stage != DiscoveryStage::Pass1Done {
            return state;
        }

        for site in state.missing() {
            if self.breaker.is_tripped() {
                return state;
            }
            let Some(domain) = site.domain_hint(state.brand.site_profile()) else {
                continue;
            };
            let query = SearchQuery::Text {
                query: site_query(&state.row, state.brand, domain),
            };
            let Some(hits) = self.search_with_retry(&state.row.style_id, &query).await else {
                continue;
            };
            if let Some(candidate) = self.ranker.rank(&state.row, state.brand, site, &hits) {
                state.annotated.results.fill_if_empty(site, candidate.into());
            }
        }

        state.stage = DiscoveryStage::Pass2Done;
        debug!(
            style_id = %state.row.style_id,
            missing = state.missing().len(),
            "pass 2 finished"
        );
        state
    }

    /// `None` once every attempt failed; the caller treats that as an empty result.
    async fn search_with_retry(&self, style_id: &str, query: &SearchQuery) -> Option<Vec<SearchHit>> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.limiter.acquire().await;
            self.api_calls.fetch_add(1, Ordering::SeqCst);
            match self.search.search(query).await {
                Ok(hits) => {
                    self.breaker.record_success();
                    return Some(hits);
                }
                Err(err) if attempt < self.max_attempts => {
                    let delay = self.backoff.delay(attempt);
                    warn!(
                        ?err,
                        style_id,
                        attempt,
                        kind = query.kind(),
                        "search failed; retrying after {:?}",
                        delay
                    );
                    sleep(delay).await;
                }
                Err(err) => {
                    warn!(?err, style_id, attempt, kind = query.kind(), "search gave up");
                    self.search_failures.fetch_add(1, Ordering::SeqCst);
                    self.breaker.record_error(&err);
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct ScriptedSearch {
        failures_left: AtomicUsize,
        always_fail: bool,
        queries: Mutex<Vec<SearchQuery>>,
    }

    fn hit(url: &str, title: &str) -> SearchHit {
        SearchHit {
            url: url.into(),
            title: title.into(),
            source: None,
            price_text: Some("₹1,099".into()),
        }
    }

    #[async_trait]
    impl SearchProvider for ScriptedSearch {
        async fn search(&self, query: &SearchQuery) -> AppResult<Vec<SearchHit>> {
            self.queries.lock().push(query.clone());
            if self.always_fail
                || self
                    .failures_left
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
            {
                return Err(AppError::fetch("serpapi", "boom"));
            }
            Ok(match query {
                SearchQuery::Visual { .. } => vec![hit(
                    "https://www.myntra.com/tshirts/tss/tss-batman-tee/100001/buy",
                    "TSS Batman Oversized T-Shirt",
                )],
                SearchQuery::Text { query } if query.contains("site:myntra.com") => vec![hit(
                    "https://www.myntra.com/tshirts/tss/other-tee/200002/buy",
                    "TSS Batman Oversized T-Shirt",
                )],
                SearchQuery::Text { query } if query.contains("site:thesouledstore.com") => {
                    vec![hit(
                        "https://www.thesouledstore.com/product/batman-oversized-t-shirt",
                        "Batman Oversized T-Shirt",
                    )]
                }
                SearchQuery::Text { .. } => Vec::new(),
            })
        }
    }

    fn row(style_id: &str, image: &str, views: u64) -> CatalogRow {
        CatalogRow {
            style_id: style_id.into(),
            brand_name: "The Souled Store".into(),
            product_title: "Batman Oversized T-Shirt".into(),
            first_image_url: image.into(),
            view_count: views,
            ..CatalogRow::default()
        }
    }

    fn config() -> AppConfig {
        AppConfig {
            search_max_per_second: 100,
            search_max_per_hour: 10_000,
            max_consecutive_failures: 3,
            ..AppConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn second_pass_only_targets_missing_sites() {
        let search = Arc::new(ScriptedSearch::default());
        let discovery = TwoPassDiscovery::new(search.clone(), &config());
        let outcome = discovery
            .run(&[row("1", "https://img/1.jpg", 5)])
            .await
            .unwrap();

        let results = &outcome.rows[0].results;
        assert_eq!(
            results.myntra.url.as_deref(),
            Some("https://www.myntra.com/tshirts/tss/tss-batman-tee/100001/buy")
        );
        assert_eq!(results.myntra.price, Some(1099.0));
        assert!(results.brand.url.is_some());
        assert!(results.slikk.url.is_none());

        let queries = search.queries.lock().clone();
        assert!(matches!(queries[0], SearchQuery::Visual { .. }));
        assert!(queries.iter().all(|q| match q {
            SearchQuery::Text { query } => !query.contains("site:myntra.com"),
            SearchQuery::Visual { .. } => true,
        }));
        assert_eq!(outcome.stats.api_calls, 3);
        assert_eq!(outcome.stats.pass2_queries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn rows_without_image_go_straight_to_text_queries() {
        let search = Arc::new(ScriptedSearch::default());
        let discovery = TwoPassDiscovery::new(search.clone(), &config());
        let outcome = discovery
            .run(&[row("1", "", 1), row("2", "https://img/2.jpg", 9)])
            .await
            .unwrap();

        assert_eq!(outcome.rows[0].style_id, "2");
        assert_eq!(outcome.rows[1].style_id, "1");
        assert_eq!(
            outcome.rows[1].results.myntra.url.as_deref(),
            Some("https://www.myntra.com/tshirts/tss/other-tee/200002/buy")
        );
        assert_eq!(outcome.stats.pass1_skipped_no_image, 1);
        assert_eq!(outcome.stats.myntra_found, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_failed_searches_with_backoff() {
        let search = Arc::new(ScriptedSearch {
            failures_left: AtomicUsize::new(2),
            ..ScriptedSearch::default()
        });
        let discovery = TwoPassDiscovery::new(search.clone(), &config());
        let outcome = discovery
            .run(&[row("1", "https://img/1.jpg", 1)])
            .await
            .unwrap();
        assert!(outcome.rows[0].results.myntra.is_resolved());
        assert_eq!(outcome.stats.search_failures, 0);
        assert_eq!(outcome.stats.api_calls, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn sustained_failures_halt_with_rows_kept() {
        let search = Arc::new(ScriptedSearch {
            always_fail: true,
            ..ScriptedSearch::default()
        });
        let discovery = TwoPassDiscovery::new(search, &config());
        let rows: Vec<CatalogRow> = (0..5)
            .map(|i| row(&i.to_string(), "https://img/x.jpg", i))
            .collect();
        let Err(AppError::Halted { cause, rows: kept }) = discovery.run(&rows).await else {
            panic!("expected the stage to halt");
        };
        assert!(matches!(
            *cause,
            AppError::ServiceUnavailable { service: "search", .. }
        ));
        let order: Vec<&str> = kept.iter().map(|row| row.style_id.as_str()).collect();
        assert_eq!(order, ["4", "3", "2", "1", "0"]);
    }

    #[tokio::test(start_paused = true)]
    async fn second_pass_leaves_rows_in_pass2_done() {
        let search = Arc::new(ScriptedSearch::default());
        let discovery = TwoPassDiscovery::new(search, &config());
        let mut state = RowState::new(&row("1", "", 1));
        state.stage = DiscoveryStage::Pass1Done;

        let state = discovery.second_pass(state).await;
        assert_eq!(state.stage, DiscoveryStage::Pass2Done);
        assert!(state.annotated.results.myntra.is_resolved());

        let untouched = discovery.second_pass(RowState::new(&row("2", "", 1))).await;
        assert_eq!(untouched.stage, DiscoveryStage::Pending);
    }

    #[test]
    fn unmapped_brands_only_target_marketplaces() {
        assert_eq!(allowed_sites(normalize_brand("Atom")), vec![Site::Myntra, Site::Slikk]);
        assert_eq!(allowed_sites(normalize_brand("Nike")), vec![Site::Myntra, Site::Slikk]);
        assert_eq!(allowed_sites(normalize_brand("Veirdo")).len(), 3);
    }

    #[test]
    fn site_query_uses_catalogue_display_name() {
        let row = CatalogRow {
            brand_name: "Mascln Sassafras".into(),
            product_title: "Linen Shirt".into(),
            ..CatalogRow::default()
        };
        assert_eq!(
            site_query(&row, normalize_brand(&row.brand_name), "sassafras.in"),
            "Sassafras Linen Shirt site:sassafras.in"
        );
    }
}
