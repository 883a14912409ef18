use serde::Serialize;

use crate::sites::Site;

/// One catalog product as read from the discovery input. Never mutated during a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogRow {
    pub style_id: String,
    pub brand_name: String,
    pub product_title: String,
    pub gender: String,
    pub category: String,
    pub min_price_rupees: String,
    pub first_image_url: String,
    pub view_count: u64,
    pub product_url: Option<String>,
}

impl CatalogRow {
    pub fn image_url(&self) -> Option<&str> {
        let trimmed = self.first_image_url.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SiteResult {
    pub url: Option<String>,
    pub price: Option<f64>,
}

impl SiteResult {
    pub fn is_resolved(&self) -> bool {
        self.url.is_some()
    }
}

impl From<CandidateMatch> for SiteResult {
    fn from(candidate: CandidateMatch) -> Self {
        SiteResult {
            url: Some(candidate.url),
            price: candidate.price,
        }
    }
}

/// Exactly one slot per supported site.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SiteResults {
    pub myntra: SiteResult,
    pub slikk: SiteResult,
    pub brand: SiteResult,
}

impl SiteResults {
    pub fn get(&self, site: Site) -> &SiteResult {
        match site {
            Site::Myntra => &self.myntra,
            Site::Slikk => &self.slikk,
            Site::Brand => &self.brand,
        }
    }

    pub fn get_mut(&mut self, site: Site) -> &mut SiteResult {
        match site {
            Site::Myntra => &mut self.myntra,
            Site::Slikk => &mut self.slikk,
            Site::Brand => &mut self.brand,
        }
    }

    /// Stores `result` only when the slot has no URL yet. Returns whether it was stored.
    pub fn fill_if_empty(&mut self, site: Site, result: SiteResult) -> bool {
        let slot = self.get_mut(site);
        if slot.is_resolved() || result.url.is_none() {
            return false;
        }
        *slot = result;
        true
    }

    pub fn missing(&self, sites: &[Site]) -> Vec<Site> {
        sites
            .iter()
            .copied()
            .filter(|site| !self.get(*site).is_resolved())
            .collect()
    }
}

/// The unit passed from discovery to extraction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotatedRow {
    pub view_count: u64,
    pub style_id: String,
    pub brand: String,
    pub product_title: String,
    pub gender: String,
    pub category: String,
    /// Reference price, carried through verbatim.
    pub klydo_price: String,
    pub klydo_url: String,
    pub results: SiteResults,
}

impl AnnotatedRow {
    pub fn from_catalog(row: &CatalogRow) -> Self {
        Self {
            view_count: row.view_count,
            style_id: row.style_id.clone(),
            brand: row.brand_name.clone(),
            product_title: row.product_title.clone(),
            gender: row.gender.clone(),
            category: row.category.clone(),
            klydo_price: row.min_price_rupees.clone(),
            klydo_url: row.product_url.clone().unwrap_or_default(),
            results: SiteResults::default(),
        }
    }
}

/// A ranked search hit. Only lives inside ranking and discovery.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateMatch {
    pub url: String,
    pub title: String,
    pub raw_price: Option<String>,
    pub price: Option<f64>,
    pub site: Site,
    /// 1-based rank in the search response.
    pub position: usize,
    pub similarity: f64,
    pub score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(url: &str, price: Option<f64>) -> SiteResult {
        SiteResult {
            url: Some(url.to_string()),
            price,
        }
    }

    #[test]
    fn fill_if_empty_never_overwrites() {
        let mut results = SiteResults::default();
        assert!(results.fill_if_empty(Site::Myntra, resolved("https://a", Some(10.0))));
        assert!(!results.fill_if_empty(Site::Myntra, resolved("https://b", Some(20.0))));
        assert_eq!(results.myntra.url.as_deref(), Some("https://a"));
        assert!(!results.fill_if_empty(Site::Slikk, SiteResult::default()));
        assert_eq!(results.missing(&Site::ALL), vec![Site::Slikk, Site::Brand]);
    }

    #[test]
    fn annotated_row_carries_reference_fields() {
        let row = CatalogRow {
            style_id: "42".into(),
            brand_name: "Nike".into(),
            min_price_rupees: "1,299".into(),
            view_count: 7,
            product_url: Some("https://klydo.in/p/42".into()),
            ..CatalogRow::default()
        };
        let annotated = AnnotatedRow::from_catalog(&row);
        assert_eq!(annotated.klydo_price, "1,299");
        assert_eq!(annotated.klydo_url, "https://klydo.in/p/42");
        assert_eq!(annotated.view_count, 7);
        assert_eq!(annotated.results, SiteResults::default());
    }

    #[test]
    fn blank_image_url_reads_as_absent() {
        let row = CatalogRow {
            first_image_url: "  ".into(),
            ..CatalogRow::default()
        };
        assert_eq!(row.image_url(), None);
    }
}
