pub mod backoff;
pub mod brands;
pub mod breaker;
pub mod config;
pub mod discovery;
pub mod errors;
pub mod extraction;
pub mod extractor;
pub mod fetch;
pub mod ingestion;
pub mod pricing;
pub mod ranking;
pub mod rate_limit;
pub mod records;
pub mod search;
pub mod sites;

use once_cell::sync::OnceCell;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use brands::{normalize_brand, BrandMatch, BrandProfile};
pub use config::{AppConfig, PublicAppConfig};
pub use discovery::{DiscoveryOutcome, DiscoveryStage, DiscoveryStats, TwoPassDiscovery};
pub use errors::{AppError, AppResult};
pub use extraction::{ExtractionOutcome, ExtractionPool, ExtractionStats};
pub use extractor::PriceExtractor;
pub use fetch::{FetchRoute, HttpPageFetcher, PageFetcher};
pub use ingestion::{read_catalog, read_sheet, write_sheet};
pub use pricing::normalize_price;
pub use ranking::{CandidateRanker, RankerSettings, SimilarityMetric, SiteThresholds};
pub use rate_limit::DualWindowRateLimiter;
pub use records::{AnnotatedRow, CandidateMatch, CatalogRow, SiteResult, SiteResults};
pub use search::{SearchHit, SearchProvider, SearchQuery, SerpApiClient};
pub use sites::{Site, SiteKind};

pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,catalog_price_matcher=debug"));
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    });
}
