use std::ops::AddAssign;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::backoff::Backoff;
use crate::breaker::FailureBreaker;
use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};
use crate::extractor::PriceExtractor;
use crate::fetch::{normalize_slikk_url, FetchRoute, PageFetcher};
use crate::records::AnnotatedRow;
use crate::sites::{Site, SiteKind};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionStats {
    pub total_rows: usize,
    pub myntra_success: usize,
    pub myntra_failed: usize,
    pub slikk_success: usize,
    pub slikk_failed: usize,
    pub slikk_skipped_existing: usize,
    pub slikk_calls: usize,
    pub brand_success: usize,
    pub brand_failed: usize,
    pub brand_skipped: usize,
    /// Sites left alone because their route needs a proxy key that is not configured.
    pub proxy_unavailable: usize,
    pub rows_failed: usize,
}

impl AddAssign<&ExtractionStats> for ExtractionStats {
    fn add_assign(&mut self, other: &ExtractionStats) {
        self.total_rows += other.total_rows;
        self.myntra_success += other.myntra_success;
        self.myntra_failed += other.myntra_failed;
        self.slikk_success += other.slikk_success;
        self.slikk_failed += other.slikk_failed;
        self.slikk_skipped_existing += other.slikk_skipped_existing;
        self.slikk_calls += other.slikk_calls;
        self.brand_success += other.brand_success;
        self.brand_failed += other.brand_failed;
        self.brand_skipped += other.brand_skipped;
        self.proxy_unavailable += other.proxy_unavailable;
        self.rows_failed += other.rows_failed;
    }
}

#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    /// Rows in input order.
    pub rows: Vec<AnnotatedRow>,
    pub stats: ExtractionStats,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct SlikkPolicy {
    retries: u32,
    retry_delay: Duration,
    min_page_bytes: usize,
    force_refresh: bool,
}

/// Shared by every spawned row task.
struct RowWorker {
    fetcher: Arc<dyn PageFetcher>,
    extractor: PriceExtractor,
    slikk_gate: Semaphore,
    slikk: SlikkPolicy,
    fetch_max_attempts: u32,
    breaker: FailureBreaker,
    backoff: Backoff,
}

/// Row-level worker pool with a nested, independently bounded gate for Slikk fetches.
pub struct ExtractionPool {
    worker: Arc<RowWorker>,
    max_workers: usize,
}

impl ExtractionPool {
    pub fn new(fetcher: Arc<dyn PageFetcher>, config: &AppConfig) -> Self {
        let worker = RowWorker {
            fetcher,
            extractor: PriceExtractor::new(),
            slikk_gate: Semaphore::new(config.slikk_max_parallel.max(1)),
            slikk: SlikkPolicy {
                retries: config.slikk_retries.max(1),
                retry_delay: config.slikk_retry_delay(),
                min_page_bytes: config.slikk_min_page_bytes,
                force_refresh: config.slikk_force_refresh,
            },
            fetch_max_attempts: config.fetch_max_attempts.max(1),
            breaker: FailureBreaker::new("page fetch", config.max_consecutive_failures),
            backoff: Backoff::new(),
        };
        Self {
            worker: Arc::new(worker),
            max_workers: config.max_workers.max(1),
        }
    }

    pub async fn run(&self, rows: Vec<AnnotatedRow>) -> AppResult<ExtractionOutcome> {
        let started_at = Utc::now();
        let total = rows.len();
        info!(
            rows = total,
            max_workers = self.max_workers,
            slikk_parallel = self.worker.slikk_gate.available_permits(),
            "extraction starting"
        );

        let gate = Arc::new(Semaphore::new(self.max_workers));
        let mut tasks = JoinSet::new();
        for (index, row) in rows.iter().cloned().enumerate() {
            let permit = Arc::clone(&gate)
                .acquire_owned()
                .await
                .map_err(|_| AppError::fetch("extraction pool", "worker gate closed"))?;
            if self.worker.breaker.is_tripped() {
                break;
            }
            let worker = Arc::clone(&self.worker);
            tasks.spawn(async move {
                let _permit = permit;
                let (row, stats) = worker.process(row).await;
                (index, row, stats)
            });
        }

        let mut processed: Vec<Option<AnnotatedRow>> = vec![None; total];
        let mut stats = ExtractionStats {
            total_rows: total,
            ..ExtractionStats::default()
        };
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, row, row_stats)) => {
                    stats += &row_stats;
                    processed[index] = Some(row);
                }
                Err(err) => {
                    warn!(?err, "row worker aborted; keeping the row unchanged");
                    stats.rows_failed += 1;
                }
            }
        }
        let rows: Vec<AnnotatedRow> = processed
            .into_iter()
            .zip(rows)
            .map(|(done, original)| done.unwrap_or(original))
            .collect();
        if let Err(cause) = self.worker.breaker.check() {
            warn!(?stats, "extraction halted; unprocessed rows keep their discovery values");
            return Err(AppError::Halted {
                cause: Box::new(cause),
                rows,
            });
        }
        let finished_at = Utc::now();
        info!(
            myntra_success = stats.myntra_success,
            slikk_success = stats.slikk_success,
            brand_success = stats.brand_success,
            slikk_calls = stats.slikk_calls,
            rows_failed = stats.rows_failed,
            "extraction finished"
        );
        Ok(ExtractionOutcome {
            rows,
            stats,
            started_at,
            finished_at,
        })
    }
}

impl RowWorker {
    async fn process(&self, mut row: AnnotatedRow) -> (AnnotatedRow, ExtractionStats) {
        let mut stats = ExtractionStats::default();
        for site in Site::ALL {
            let Some(url) = row.results.get(site).url.clone() else {
                continue;
            };
            match site.kind() {
                SiteKind::PrimaryMarketplace => {
                    let price = self.fetch_and_extract(&row.style_id, site, &url).await;
                    tally(&mut stats.myntra_success, &mut stats.myntra_failed, price.is_some());
                    update_price(&mut row, site, price);
                }
                SiteKind::SecondaryMarketplace => {
                    if row.results.slikk.price.is_some() && !self.slikk.force_refresh {
                        stats.slikk_skipped_existing += 1;
                        continue;
                    }
                    if !self.fetcher.supports(FetchRoute::Proxy) {
                        stats.proxy_unavailable += 1;
                        continue;
                    }
                    let price = self.fetch_slikk(&row.style_id, &url, &mut stats).await;
                    tally(&mut stats.slikk_success, &mut stats.slikk_failed, price.is_some());
                    update_price(&mut row, site, price);
                }
                SiteKind::BrandSite => {
                    if !self.extractor.supports_brand_url(&url) {
                        stats.brand_skipped += 1;
                        continue;
                    }
                    let route = self.extractor.route_for(SiteKind::BrandSite, &url);
                    if !self.fetcher.supports(route) {
                        stats.proxy_unavailable += 1;
                        continue;
                    }
                    let price = self.fetch_and_extract(&row.style_id, site, &url).await;
                    tally(&mut stats.brand_success, &mut stats.brand_failed, price.is_some());
                    update_price(&mut row, site, price);
                }
            }
        }
        (row, stats)
    }

    async fn fetch_and_extract(&self, style_id: &str, site: Site, url: &str) -> Option<f64> {
        let kind = site.kind();
        let route = self.extractor.route_for(kind, url);
        let html = self.fetch_with_retry(style_id, site, url, route).await?;
        self.extractor.extract(kind, url, &html)
    }

    async fn fetch_with_retry(
        &self,
        style_id: &str,
        site: Site,
        url: &str,
        route: FetchRoute,
    ) -> Option<String> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.fetcher.fetch(url, route).await {
                Ok(body) => {
                    self.breaker.record_success();
                    return Some(body);
                }
                Err(err) if attempt < self.fetch_max_attempts => {
                    let delay = self.backoff.delay(attempt);
                    debug!(
                        ?err,
                        style_id,
                        site = site.as_tag(),
                        attempt,
                        "page fetch failed; retrying after {:?}",
                        delay
                    );
                    sleep(delay).await;
                }
                Err(err) => {
                    warn!(?err, style_id, site = site.as_tag(), url, "page fetch gave up");
                    self.breaker.record_error(&err);
                    return None;
                }
            }
        }
    }

    /// Proxy fetch under the shared Slikk gate, with a fixed pause between attempts.
    async fn fetch_slikk(
        &self,
        style_id: &str,
        url: &str,
        stats: &mut ExtractionStats,
    ) -> Option<f64> {
        let target = normalize_slikk_url(url);
        let mut last_err = None;
        for attempt in 1..=self.slikk.retries {
            let outcome = {
                let Ok(_permit) = self.slikk_gate.acquire().await else {
                    warn!(style_id, "slikk gate closed");
                    return None;
                };
                stats.slikk_calls += 1;
                self.fetcher
                    .fetch(&target, FetchRoute::Proxy)
                    .await
                    .and_then(|body| {
                        if body.len() < self.slikk.min_page_bytes {
                            Err(AppError::IncompletePage {
                                url: target.clone(),
                                bytes: body.len(),
                            })
                        } else {
                            Ok(body)
                        }
                    })
            };

            match outcome {
                Ok(body) => {
                    self.breaker.record_success();
                    return self
                        .extractor
                        .extract(SiteKind::SecondaryMarketplace, &target, &body);
                }
                Err(err) => {
                    warn!(?err, style_id, attempt, url = %target, "slikk fetch failed");
                    last_err = Some(err);
                    if attempt < self.slikk.retries {
                        sleep(self.slikk.retry_delay).await;
                    }
                }
            }
        }
        if let Some(err) = last_err {
            self.breaker.record_error(&err);
        }
        None
    }
}

fn tally(success: &mut usize, failed: &mut usize, ok: bool) {
    if ok {
        *success += 1;
    } else {
        *failed += 1;
    }
}

/// Extraction only ever replaces a price with a newly parsed one.
fn update_price(row: &mut AnnotatedRow, site: Site, price: Option<f64>) {
    if let Some(price) = price {
        row.results.get_mut(site).price = Some(price);
    }
}
