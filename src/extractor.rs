//! Site-specific price extraction over fetched page HTML.
//!
//! Every rule yields raw text that goes through [`normalize_price`]. Parsing is
//! synchronous: `scraper::Html` is not `Send`, so callers fetch first and extract after.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use tracing::trace;

use crate::brands::profile_for_url;
use crate::fetch::FetchRoute;
use crate::pricing::{normalize_price, normalize_price_within};
use crate::sites::{host_of, SiteKind};

/// Structured values under this are treated as noise (shipping fees, ratings, counts).
pub const MIN_PLAUSIBLE_PRICE: f64 = 50.0;
pub const MAX_SCANNED_PRICE: f64 = 100_000.0;

const MYNTRA_SELECTORS: &[&str] = &[
    "span.pdp-price",
    "span.pdp-discount-container",
    "span.product-price",
    "span.price-value",
];

const SLIKK_KEYS: &[&str] = &["sp", "offerprice", "sellingprice", "price", "mrp"];

const SHOPIFY_SELECTORS: &[&str] = &[
    "span[data-product-price]",
    "span.product__price.on-sale, div.product__price.on-sale",
    "span.product__price, div.product__price",
    "span.money, div.money",
    "span.price-item--sale, div.price-item--sale",
    "span.price-item--regular, div.price-item--regular",
    "span.price, div.price",
    "span.product-price, div.product-price",
];

/// Domains whose storefront only renders prices client-side.
const RENDERED_DOMAINS: &[&str] = &["thesouledstore.com"];

#[derive(Debug, Clone, Copy)]
enum Probe {
    Select(&'static str),
    /// Text of the parent of the first match, for prices split around a label span.
    ParentOf(&'static str),
}

struct BrandRule {
    fragments: &'static [&'static str],
    probes: &'static [Probe],
}

use Probe::{ParentOf, Select};

static BRAND_RULES: &[BrandRule] = &[
    BrandRule {
        fragments: &["tigc.in", "sassafras", "bearhouse", "silisoul"],
        probes: &[Select("span[data-product-price]")],
    },
    BrandRule {
        fragments: &["bewakoof"],
        probes: &[
            Select("span.productPrice, div.productPrice"),
            Select("span.discountedPriceText, div.discountedPriceText"),
            Select("span.sellingPrice, div.sellingPrice"),
            Select("span.price, div.price"),
            Select("span.product-price, div.product-price"),
        ],
    },
    BrandRule {
        fragments: &["mydesignation"],
        probes: &[
            Select("price-money bdi"),
            ParentOf("span.price__prefix"),
            Select("span.product-price, div.product-price"),
            Select("span.price, div.price"),
            Select("span.selling-price, div.selling-price"),
            Select("span.final-price, div.final-price"),
        ],
    },
    BrandRule {
        fragments: &["shopqissa", "qissa"],
        probes: &[
            Select("span.price.price--highlight.price--large, div.price.price--highlight.price--large"),
            Select("span.price.price--highlight, div.price.price--highlight"),
            Select("span.price--highlight, div.price--highlight"),
            Select("span.price.price--compare, div.price.price--compare"),
            Select("span.money, div.money"),
            Select("span.price, div.price"),
        ],
    },
    BrandRule {
        fragments: &["campussutra"],
        probes: &[
            Select("span.price, div.price"),
            Select("span.money, div.money"),
            Select("span.product-price, div.product-price"),
            Select("span.price-item--sale, div.price-item--sale"),
            Select("span.price-item--regular, div.price-item--regular"),
        ],
    },
    BrandRule {
        fragments: &["beeglee"],
        probes: &[
            Select("span.money, div.money"),
            Select("span.sale-price, div.sale-price"),
            Select("span.price, div.price"),
            Select("span.product-price, div.product-price"),
            Select("span.price-item--sale, div.price-item--sale"),
        ],
    },
    BrandRule {
        fragments: &["colorcapital"],
        probes: &[
            Select("span.price-item.price-item--sale.price-item-last"),
            Select("span.price-item--sale, div.price-item--sale"),
            Select("span.price-item, div.price-item"),
            Select("span.money, div.money"),
        ],
    },
    BrandRule {
        fragments: &["maincharacter"],
        probes: &[
            Select("span.price-item.price-item--sale.price-item-last.custom-price"),
            Select("span.price-item--sale, div.price-item--sale"),
            Select("span.custom-price, div.custom-price"),
            Select("span.price-item, div.price-item"),
            Select("span.money, div.money"),
        ],
    },
    BrandRule {
        fragments: &["theater"],
        probes: &[
            Select("span.price-item.price-item--sale.price-item--last"),
            Select("span.price-item--sale, div.price-item--sale"),
            Select("span.price-item, div.price-item"),
            Select("span.money, div.money"),
        ],
    },
    BrandRule {
        fragments: &["blackberrys"],
        probes: &[
            Select("xsale-price.sale-price, span.sale-price, div.sale-price"),
            Select("span.h4.text-subdued, div.h4.text-subdued"),
            Select("span.price, div.price"),
        ],
    },
    BrandRule {
        fragments: &["pinacolada"],
        probes: &[
            Select("s.product-price__price, span.product-price__price, div.product-price__price"),
            Select("span.price, div.price"),
        ],
    },
    BrandRule {
        fragments: &["veirdo"],
        probes: &[Select(r#"span[data-testid="product-price-value"]"#)],
    },
    BrandRule {
        fragments: &["technosport"],
        probes: &[Select("span.m-price-item--sale")],
    },
    BrandRule {
        fragments: &["thesouledstore"],
        probes: &[
            Select("span.offer"),
            Select("span.leftPrice .offer"),
            Select(".offerPrice"),
            Select(".price.offer"),
        ],
    },
    BrandRule {
        fragments: &["jockey"],
        probes: &[Select("span.price-item--sale")],
    },
    BrandRule {
        fragments: &["puma"],
        probes: &[Select(r#"span[data-test-id="item-price-pdp"]"#)],
    },
];

static JSON_LD_PRICE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""price"\s*:\s*"?(\d+(?:\.\d+)?)"?"#).expect("json-ld price pattern"));

static SLIKK_EMBEDDED: Lazy<Vec<Regex>> = Lazy::new(|| {
    ["sp", "offerPrice", "sellingPrice", "price", "mrp"]
        .iter()
        .map(|key| {
            Regex::new(&format!(r#"(?i)"{key}"\s*:\s*"?(\d+\.?\d*)"?"#)).expect("slikk key pattern")
        })
        .collect()
});

static RUPEE_AMOUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"₹\s*([\d,]+(?:\.\d{1,2})?)").expect("rupee pattern"));

static GENERIC_SCAN: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r#"(?i)"price"[:\s]+["']?(\d+)[.\d]*["']?"#,
        r#"(?i)"mrp"[:\s]+["']?(\d+)[.\d]*["']?"#,
        r"₹\s*(\d[\d,]*(?:\.\d{2})?)",
        r"(?i)Rs\.?\s*(\d[\d,]*(?:\.\d{2})?)",
        r"(?i)INR\s*(\d[\d,]*(?:\.\d{2})?)",
        r#"(?i)price["\s:]+(\d[\d,]+)"#,
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("generic price pattern"))
    .collect()
});

/// Stateless dispatcher over the three site kinds.
#[derive(Debug, Clone, Copy, Default)]
pub struct PriceExtractor;

impl PriceExtractor {
    pub fn new() -> Self {
        Self
    }

    /// How a page of this kind must be fetched.
    pub fn route_for(&self, kind: SiteKind, url: &str) -> FetchRoute {
        match kind {
            SiteKind::PrimaryMarketplace => FetchRoute::Direct,
            SiteKind::SecondaryMarketplace => FetchRoute::Proxy,
            SiteKind::BrandSite => {
                let host = host_of(url);
                if RENDERED_DOMAINS.iter().any(|domain| host.contains(domain)) {
                    FetchRoute::Proxy
                } else {
                    FetchRoute::Direct
                }
            }
        }
    }

    /// Whether a brand URL points at a catalogue store we know how to read.
    pub fn supports_brand_url(&self, url: &str) -> bool {
        profile_for_url(url).is_some()
    }

    pub fn extract(&self, kind: SiteKind, url: &str, html: &str) -> Option<f64> {
        let price = match kind {
            SiteKind::PrimaryMarketplace => extract_primary(html),
            SiteKind::SecondaryMarketplace => extract_secondary(html),
            SiteKind::BrandSite => extract_brand(&host_of(url), html),
        };
        trace!(url, ?kind, ?price, "extraction finished");
        price
    }
}

fn plausible(raw: &str) -> Option<f64> {
    normalize_price(raw).filter(|value| *value >= MIN_PLAUSIBLE_PRICE)
}

fn usable_text(text: &str) -> bool {
    text.chars().any(|c| c.is_ascii_digit()) && !text.to_lowercase().contains("save")
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ")
}

fn run_probe(document: &Html, probe: Probe) -> Option<f64> {
    let css = match probe {
        Probe::Select(css) | Probe::ParentOf(css) => css,
    };
    let Ok(selector) = Selector::parse(css) else {
        trace!(css, "skipping unparseable selector");
        return None;
    };
    document.select(&selector).find_map(|element| {
        let target = match probe {
            Probe::Select(_) => Some(element),
            Probe::ParentOf(_) => element.parent().and_then(ElementRef::wrap),
        }?;
        let text = element_text(target);
        if !usable_text(&text) {
            return None;
        }
        plausible(&text)
    })
}

fn first_match(document: &Html, selectors: &[&'static str]) -> Option<f64> {
    selectors
        .iter()
        .find_map(|css| run_probe(document, Select(*css)))
}

fn extract_primary(html: &str) -> Option<f64> {
    let from_dom = {
        let document = Html::parse_document(html);
        first_match(&document, MYNTRA_SELECTORS).or_else(|| json_ld_price(&document))
    };
    from_dom.or_else(|| scan_generic(html))
}

fn json_ld_price(document: &Html) -> Option<f64> {
    let selector = Selector::parse(r#"script[type="application/ld+json"]"#).ok()?;
    document.select(&selector).find_map(|script| {
        let body = script.text().collect::<String>();
        JSON_LD_PRICE
            .captures(&body)
            .and_then(|captures| captures.get(1))
            .and_then(|amount| plausible(amount.as_str()))
    })
}

fn extract_secondary(html: &str) -> Option<f64> {
    let embedded = SLIKK_EMBEDDED.iter().find_map(|pattern| {
        pattern
            .captures(html)
            .and_then(|captures| captures.get(1))
            .and_then(|amount| plausible(amount.as_str()))
    });
    if embedded.is_some() {
        return embedded;
    }

    let from_dom = {
        let document = Html::parse_document(html);
        next_data_price(&document).or_else(|| rupee_element_price(&document))
    };
    from_dom.or_else(|| scan_generic(html))
}

fn next_data_price(document: &Html) -> Option<f64> {
    let selector = Selector::parse("script#__NEXT_DATA__").ok()?;
    let script = document.select(&selector).next()?;
    let payload: Value = serde_json::from_str(&script.text().collect::<String>()).ok()?;
    let mut found = Vec::new();
    collect_price_values(&payload, &mut found);
    found.iter().find_map(|raw| plausible(raw))
}

/// Depth-first collection of values stored under any of the price keys.
fn collect_price_values(value: &Value, found: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                if SLIKK_KEYS.contains(&key.to_lowercase().as_str()) {
                    match nested {
                        Value::String(text) => found.push(text.clone()),
                        Value::Number(number) => found.push(number.to_string()),
                        _ => {}
                    }
                }
                collect_price_values(nested, found);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_price_values(item, found);
            }
        }
        _ => {}
    }
}

fn rupee_element_price(document: &Html) -> Option<f64> {
    let selector = Selector::parse("span, div").ok()?;
    document.select(&selector).find_map(|element| {
        let text = element_text(element);
        if !text.contains('₹') {
            return None;
        }
        RUPEE_AMOUNT
            .captures(&text)
            .and_then(|captures| captures.get(1))
            .and_then(|amount| plausible(amount.as_str()))
    })
}

fn extract_brand(host: &str, html: &str) -> Option<f64> {
    let from_dom = {
        let document = Html::parse_document(html);
        let specific = BRAND_RULES
            .iter()
            .filter(|rule| rule.fragments.iter().any(|fragment| host.contains(fragment)))
            .flat_map(|rule| rule.probes.iter())
            .find_map(|step| run_probe(&document, *step));
        specific.or_else(|| first_match(&document, SHOPIFY_SELECTORS))
    };
    from_dom.or_else(|| scan_generic(html))
}

/// Last resort over the raw page: the first plausible amount any pattern yields.
fn scan_generic(html: &str) -> Option<f64> {
    GENERIC_SCAN.iter().find_map(|pattern| {
        pattern.captures_iter(html).find_map(|captures| {
            captures.get(1).and_then(|amount| {
                normalize_price_within(amount.as_str(), MIN_PLAUSIBLE_PRICE, MAX_SCANNED_PRICE)
            })
        })
    })
}
