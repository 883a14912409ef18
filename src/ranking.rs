use std::collections::HashSet;

use tracing::{debug, trace};

use crate::brands::{compact, BrandMatch};
use crate::pricing::normalize_price;
use crate::records::{CandidateMatch, CatalogRow};
use crate::search::SearchHit;
use crate::sites::{identify_site, is_product_url, Site};

const SCORE_EPSILON: f64 = 1e-9;
const COLOUR_MATCH_BONUS: f64 = 0.15;
const COLOUR_CLASH_PENALTY: f64 = 0.20;

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "with", "for", "on", "in", "at", "to", "buy", "shop",
    "online",
];

const COLOURS: &[&str] = &[
    "black", "white", "blue", "red", "green", "yellow", "pink", "purple", "orange", "brown",
    "grey", "gray", "beige", "navy", "olive", "maroon", "silver", "gold", "cream", "khaki", "tan",
    "teal", "burgundy", "mint", "lavender", "coral", "peach", "mustard", "charcoal", "rose",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimilarityMetric {
    /// Share of the catalog title's keywords found in the candidate title.
    #[default]
    KeywordOverlap,
    /// Intersection over union of both keyword sets.
    TokenJaccard,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SiteThresholds {
    pub min_similarity: f64,
    /// Weight of the search position term in the composite score.
    pub rank_weight: f64,
    pub acceptance_threshold: f64,
}

impl SiteThresholds {
    pub const MARKETPLACE: SiteThresholds = SiteThresholds {
        min_similarity: 0.05,
        rank_weight: 0.5,
        acceptance_threshold: 0.05,
    };

    pub const BRAND: SiteThresholds = SiteThresholds {
        min_similarity: 0.15,
        rank_weight: 0.2,
        acceptance_threshold: 0.15,
    };

    fn composite(&self, similarity: f64, position: usize) -> f64 {
        let position = position.max(1) as f64;
        (1.0 - self.rank_weight) * similarity + self.rank_weight / position
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankerSettings {
    pub metric: SimilarityMetric,
    pub marketplace: SiteThresholds,
    pub brand: SiteThresholds,
}

impl Default for RankerSettings {
    fn default() -> Self {
        Self {
            metric: SimilarityMetric::default(),
            marketplace: SiteThresholds::MARKETPLACE,
            brand: SiteThresholds::BRAND,
        }
    }
}

impl RankerSettings {
    pub fn thresholds(&self, site: Site) -> &SiteThresholds {
        if site.is_marketplace() {
            &self.marketplace
        } else {
            &self.brand
        }
    }
}

/// Picks at most one confident listing per site out of a raw result set.
#[derive(Debug, Clone, Default)]
pub struct CandidateRanker {
    settings: RankerSettings,
}

impl CandidateRanker {
    pub fn new(settings: RankerSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &RankerSettings {
        &self.settings
    }

    /// Best candidate for `site`, or `None` when nothing clears the thresholds.
    pub fn rank(
        &self,
        row: &CatalogRow,
        brand: BrandMatch,
        site: Site,
        hits: &[SearchHit],
    ) -> Option<CandidateMatch> {
        let variations = brand_variations(&row.brand_name, brand);
        let title_keywords = keywords(&row.product_title);
        let thresholds = self.settings.thresholds(site);

        let mut best: Option<CandidateMatch> = None;
        for (index, hit) in hits.iter().enumerate() {
            let position = index + 1;
            if identify_site(&hit.url, brand.site_profile()) != Some(site) {
                continue;
            }
            if !is_product_url(&hit.url, site, brand.site_profile()) {
                trace!(url = %hit.url, site = site.as_tag(), "rejected non-product url");
                continue;
            }
            if site.is_marketplace() && !mentions_brand(hit, &variations) {
                trace!(url = %hit.url, site = site.as_tag(), "rejected brand mismatch");
                continue;
            }

            let similarity = self.similarity(&title_keywords, &row.product_title, &hit.title);
            let score = thresholds.composite(similarity, position);
            if similarity < thresholds.min_similarity || score < thresholds.acceptance_threshold {
                trace!(
                    url = %hit.url,
                    similarity,
                    score,
                    "candidate below acceptance threshold"
                );
                continue;
            }

            let raw_price = hit.price_text.clone();
            let candidate = CandidateMatch {
                url: hit.url.clone(),
                title: hit.title.clone(),
                price: raw_price.as_deref().and_then(normalize_price),
                raw_price,
                site,
                position,
                similarity,
                score,
            };
            best = match best {
                Some(current) if !outranks(&candidate, &current) => Some(current),
                _ => Some(candidate),
            };
        }

        if let Some(selected) = &best {
            debug!(
                style_id = %row.style_id,
                site = site.as_tag(),
                url = %selected.url,
                score = selected.score,
                "selected candidate"
            );
        }
        best
    }

    /// Ranks the same result set once per site.
    pub fn rank_sites(
        &self,
        row: &CatalogRow,
        brand: BrandMatch,
        sites: &[Site],
        hits: &[SearchHit],
    ) -> Vec<CandidateMatch> {
        sites
            .iter()
            .filter_map(|site| self.rank(row, brand, *site, hits))
            .collect()
    }

    fn similarity(&self, title_keywords: &HashSet<String>, title: &str, found: &str) -> f64 {
        if title_keywords.is_empty() || found.trim().is_empty() {
            return 0.0;
        }
        let found_keywords = keywords(found);
        let common = title_keywords.intersection(&found_keywords).count() as f64;
        let base = match self.settings.metric {
            SimilarityMetric::KeywordOverlap => common / title_keywords.len() as f64,
            SimilarityMetric::TokenJaccard => {
                let union = title_keywords.union(&found_keywords).count() as f64;
                if union == 0.0 {
                    0.0
                } else {
                    common / union
                }
            }
        };
        (base + colour_adjustment(title, found)).clamp(0.0, 1.0)
    }
}

fn outranks(candidate: &CandidateMatch, current: &CandidateMatch) -> bool {
    if (candidate.score - current.score).abs() > SCORE_EPSILON {
        return candidate.score > current.score;
    }
    match (candidate.price.is_some(), current.price.is_some()) {
        (true, false) => true,
        (false, true) => false,
        _ => candidate.position < current.position,
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
}

fn keywords(text: &str) -> HashSet<String> {
    tokens(text)
        .filter(|token| !STOP_WORDS.contains(&token.as_str()))
        .collect()
}

fn colours(text: &str) -> HashSet<String> {
    tokens(text)
        .filter(|token| COLOURS.contains(&token.as_str()))
        .collect()
}

fn colour_adjustment(title: &str, found: &str) -> f64 {
    let wanted = colours(title);
    if wanted.is_empty() {
        return 0.0;
    }
    let offered = colours(found);
    if wanted.iter().any(|colour| offered.contains(colour)) {
        COLOUR_MATCH_BONUS
    } else if !offered.is_empty() {
        -COLOUR_CLASH_PENALTY
    } else {
        0.0
    }
}

/// Spellings of the brand a marketplace listing may carry.
fn brand_variations(raw: &str, brand: BrandMatch) -> Vec<String> {
    let lowered = raw.trim().to_lowercase();
    let mut variations = vec![
        lowered.clone(),
        lowered.replace(' ', ""),
        lowered.replace(' ', "-"),
        lowered.replace(' ', "_"),
    ];

    let words: Vec<&str> = lowered
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|word| !word.is_empty())
        .collect();
    if words.len() > 1 {
        let without_the = words
            .iter()
            .filter(|word| **word != "the")
            .copied()
            .collect::<Vec<_>>()
            .join(" ");
        if !without_the.is_empty() {
            variations.push(without_the.replace(' ', ""));
            variations.push(without_the);
        }
    }

    if let Some(profile) = brand.profile() {
        variations.push(profile.display_name.to_lowercase());
        variations.extend(profile.aliases.iter().map(|alias| alias.to_lowercase()));
    }

    variations.retain(|variation| variation.chars().count() > 2);
    variations.sort();
    variations.dedup();
    variations
}

fn mentions_brand(hit: &SearchHit, variations: &[String]) -> bool {
    let combined = format!(
        "{} {} {}",
        hit.title,
        hit.url,
        hit.source.as_deref().unwrap_or_default()
    )
    .to_lowercase();
    let compacted = compact(&combined);
    variations.iter().any(|variation| {
        if combined.contains(variation.as_str()) {
            return true;
        }
        let packed = compact(variation);
        packed.chars().count() > 2 && compacted.contains(&packed)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brands::normalize_brand;

    fn row(brand: &str, title: &str) -> CatalogRow {
        CatalogRow {
            style_id: "1".into(),
            brand_name: brand.into(),
            product_title: title.into(),
            ..CatalogRow::default()
        }
    }

    fn hit(url: &str, title: &str, price: Option<&str>) -> SearchHit {
        SearchHit {
            url: url.into(),
            title: title.into(),
            source: None,
            price_text: price.map(str::to_string),
        }
    }

    #[test]
    fn picks_best_marketplace_listing() {
        let row = row("Nike", "Air Max 90 Sneakers");
        let hits = vec![
            hit("https://www.amazon.in/nike-air-max/dp/B01", "Nike Air Max 90", None),
            hit(
                "https://www.myntra.com/men-shoes",
                "Nike Air Max 90 Sneakers",
                None,
            ),
            hit(
                "https://www.myntra.com/sports-shoes/nike/nike-men-air-max-90-sneakers/12345/buy",
                "Nike Men Air Max 90 Sneakers",
                Some("₹7,495"),
            ),
        ];
        let ranker = CandidateRanker::default();
        let found = ranker
            .rank(&row, normalize_brand("Nike"), Site::Myntra, &hits)
            .unwrap();
        assert_eq!(found.position, 3);
        assert_eq!(found.price, Some(7495.0));
        assert_eq!(found.raw_price.as_deref(), Some("₹7,495"));
    }

    #[test]
    fn marketplace_listing_must_mention_brand() {
        let row = row("The Souled Store", "Batman Oversized T-Shirt");
        let hits = vec![hit(
            "https://www.myntra.com/tshirts/roadster/batman-tee/555555/buy",
            "Batman Oversized T-Shirt",
            None,
        )];
        let ranker = CandidateRanker::default();
        let brand = normalize_brand("The Souled Store");
        assert!(ranker.rank(&row, brand, Site::Myntra, &hits).is_none());

        let hits = vec![hit(
            "https://www.myntra.com/tshirts/tss/batman-tee/555555/buy",
            "TSS Batman Oversized T-Shirt",
            None,
        )];
        assert!(ranker.rank(&row, brand, Site::Myntra, &hits).is_some());
    }

    #[test]
    fn brand_site_skips_brand_check_but_needs_similarity() {
        let row = row("TIGC", "Men Blue Slim Fit Denim Shirt");
        let brand = normalize_brand("TIGC");
        let ranker = CandidateRanker::default();
        let hits = vec![
            hit("https://tigc.in/products/red-hoodie", "Red Hoodie", None),
            hit(
                "https://tigc.in/products/blue-denim-shirt",
                "Blue Slim Fit Denim Shirt",
                Some("Rs. 1,499"),
            ),
        ];
        let found = ranker.rank(&row, brand, Site::Brand, &hits).unwrap();
        assert_eq!(found.url, "https://tigc.in/products/blue-denim-shirt");
        assert!(found.score >= SiteThresholds::BRAND.acceptance_threshold);
    }

    #[test]
    fn never_returns_below_threshold() {
        let settings = RankerSettings {
            marketplace: SiteThresholds {
                min_similarity: 0.9,
                ..SiteThresholds::MARKETPLACE
            },
            ..RankerSettings::default()
        };
        let ranker = CandidateRanker::new(settings);
        let row = row("Nike", "Air Max 90 Sneakers");
        let hits = vec![hit(
            "https://www.myntra.com/shoes/nike/nike-air-zoom/777777/buy",
            "Nike Air Zoom Running",
            None,
        )];
        assert!(ranker
            .rank(&row, normalize_brand("Nike"), Site::Myntra, &hits)
            .is_none());
    }

    #[test]
    fn ties_prefer_parseable_price() {
        let row = row("Nike", "Air Max");
        let brand = normalize_brand("Nike");
        let first = CandidateMatch {
            url: "a".into(),
            title: "Nike Air Max".into(),
            raw_price: Some("Free".into()),
            price: None,
            site: Site::Slikk,
            position: 1,
            similarity: 1.0,
            score: 0.8,
        };
        let second = CandidateMatch {
            url: "b".into(),
            price: Some(999.0),
            position: 2,
            ..first.clone()
        };
        assert!(outranks(&second, &first));
        assert!(!outranks(&first, &second));

        let hits = vec![
            hit("https://www.slikk.club/product/11111", "Nike Air Max", Some("Free")),
            hit("https://www.slikk.club/product/22222", "Nike Air Max", Some("₹999")),
        ];
        let ranker = CandidateRanker::new(RankerSettings {
            marketplace: SiteThresholds {
                rank_weight: 0.0,
                ..SiteThresholds::MARKETPLACE
            },
            ..RankerSettings::default()
        });
        let found = ranker.rank(&row, brand, Site::Slikk, &hits).unwrap();
        assert_eq!(found.url, "https://www.slikk.club/product/22222");
    }

    #[test]
    fn colour_agreement_moves_similarity() {
        let ranker = CandidateRanker::default();
        let title = "Black Cotton Hoodie";
        let wanted = keywords(title);
        let agree = ranker.similarity(&wanted, title, "Black Hoodie");
        let clash = ranker.similarity(&wanted, title, "Olive Hoodie");
        let neutral = ranker.similarity(&wanted, title, "Hoodie");
        assert!(agree > neutral);
        assert!(clash < neutral);
        assert_eq!(clash, 0.0_f64.max(1.0 / 3.0 - COLOUR_CLASH_PENALTY));
    }

    #[test]
    fn jaccard_metric_penalises_extra_words() {
        let overlap = CandidateRanker::default();
        let jaccard = CandidateRanker::new(RankerSettings {
            metric: SimilarityMetric::TokenJaccard,
            ..RankerSettings::default()
        });
        let title = "Denim Jacket";
        let wanted = keywords(title);
        let found = "Denim Jacket Washed Oversized";
        assert_eq!(overlap.similarity(&wanted, title, found), 1.0);
        assert_eq!(jaccard.similarity(&wanted, title, found), 0.5);
    }

    #[test]
    fn brand_variations_cover_aliases_and_spacing() {
        let variations = brand_variations("The Bear House", normalize_brand("The Bear House"));
        for expected in ["the bear house", "thebearhouse", "the-bear-house", "bear house", "bearhouse"] {
            assert!(variations.iter().any(|v| v == expected), "missing {expected}");
        }
        let compacted_hit = hit(
            "https://www.slikk.club/product/12345",
            "BEAR-HOUSE linen shirt",
            None,
        );
        assert!(mentions_brand(&compacted_hit, &variations));
    }
}
