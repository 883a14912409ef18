use serde::Serialize;
use url::Url;

use crate::brands::BrandProfile;

pub const MYNTRA_DOMAIN: &str = "myntra.com";
pub const SLIKK_DOMAIN: &str = "slikk.club";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Site {
    Myntra,
    Slikk,
    Brand,
}

impl Site {
    pub const ALL: [Site; 3] = [Site::Myntra, Site::Slikk, Site::Brand];

    pub fn as_tag(&self) -> &'static str {
        match self {
            Site::Myntra => "myntra",
            Site::Slikk => "slikk",
            Site::Brand => "brand",
        }
    }

    pub fn kind(&self) -> SiteKind {
        match self {
            Site::Myntra => SiteKind::PrimaryMarketplace,
            Site::Slikk => SiteKind::SecondaryMarketplace,
            Site::Brand => SiteKind::BrandSite,
        }
    }

    pub fn is_marketplace(&self) -> bool {
        !matches!(self.kind(), SiteKind::BrandSite)
    }

    /// Domain hint for a targeted query; brand sites need the row's brand profile.
    pub fn domain_hint(&self, brand: Option<&BrandProfile>) -> Option<&'static str> {
        match self {
            Site::Myntra => Some(MYNTRA_DOMAIN),
            Site::Slikk => Some(SLIKK_DOMAIN),
            Site::Brand => brand.and_then(|profile| profile.primary_domain()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteKind {
    PrimaryMarketplace,
    SecondaryMarketplace,
    BrandSite,
}

const LISTING_PATTERNS: &[&str] = &[
    "/collections/",
    "/collection/",
    "/category/",
    "/categories/",
    "/search",
    "?search=",
    "/s?",
    "/find/",
    "/brand/",
    "/brands/",
    "/sale/",
    "/deals/",
    "/all-products",
    "/shop?",
    "/filter",
    "/sort=",
    "?page=",
    "&page=",
    "/men/",
    "/women/",
    "/kids/",
    "/unisex/",
    "/clothing/",
    "/accessories/",
    "/footwear/",
];

/// Lowercased host without a leading `www.`, or empty when the URL does not parse.
pub fn host_of(url: &str) -> String {
    Url::parse(url.trim())
        .ok()
        .and_then(|parsed| parsed.host_str().map(|host| host.to_ascii_lowercase()))
        .map(|host| host.trim_start_matches("www.").to_string())
        .unwrap_or_default()
}

/// Which allowed site a result URL belongs to, if any.
pub fn identify_site(url: &str, brand: Option<&BrandProfile>) -> Option<Site> {
    let host = host_of(url);
    let lowered = url.to_ascii_lowercase();
    let matches = |domain: &str| host.contains(domain) || lowered.contains(domain);

    if matches(MYNTRA_DOMAIN) {
        return Some(Site::Myntra);
    }
    if matches(SLIKK_DOMAIN) {
        return Some(Site::Slikk);
    }
    brand
        .filter(|profile| profile.domains.iter().any(|domain| matches(domain)))
        .map(|_| Site::Brand)
}

/// Rejects listing, search and category pages; requires a product-page shape per site.
pub fn is_product_url(url: &str, site: Site, brand: Option<&BrandProfile>) -> bool {
    let lowered = url.to_ascii_lowercase();
    if LISTING_PATTERNS.iter().any(|pattern| lowered.contains(pattern)) {
        return false;
    }

    match site {
        Site::Myntra => lowered.contains("/buy") || lowered.contains("/p/"),
        Site::Slikk => true,
        Site::Brand => match brand.filter(|profile| profile.owns_url(&lowered)) {
            Some(profile) => profile
                .product_paths
                .iter()
                .any(|marker| lowered.contains(marker)),
            None => path_depth(&lowered) >= 3,
        },
    }
}

fn path_depth(url: &str) -> usize {
    url.split('/')
        .filter(|segment| !segment.is_empty() && !segment.starts_with('?'))
        .count()
}
