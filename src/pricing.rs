//! Price text normalization.
//!
//! Convention: `,` is always a thousands separator and `.` is always the decimal point.
//! When a chunk carries several dots (`790.00.00`) only the first one is kept. Values
//! are rounded to two decimals.

use once_cell::sync::Lazy;
use regex::Regex;

static NUMERIC_CHUNK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d[\d.,]*").expect("numeric chunk pattern"));

/// Parses raw price text into a positive finite value, or `None` when unparseable.
pub fn normalize_price(raw: &str) -> Option<f64> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }

    let chunk = NUMERIC_CHUNK.find(text)?;
    if is_negated(&text[..chunk.start()]) {
        return None;
    }

    let digits = chunk.as_str().replace(',', "");
    let digits = digits.trim_end_matches('.');
    let cleaned = match digits.split_once('.') {
        Some((whole, fraction)) => format!("{whole}.{}", fraction.replace('.', "")),
        None => digits.to_string(),
    };

    let value: f64 = cleaned.parse().ok()?;
    let rounded = (value * 100.0).round() / 100.0;
    (rounded.is_finite() && rounded > 0.0).then_some(rounded)
}

/// `normalize_price` restricted to an inclusive range.
pub fn normalize_price_within(raw: &str, min: f64, max: f64) -> Option<f64> {
    normalize_price(raw).filter(|value| (min..=max).contains(value))
}

/// Renders a price for the sheet: whole values without decimals, otherwise two decimals.
pub fn format_price(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}

fn is_negated(prefix: &str) -> bool {
    prefix
        .trim_end()
        .chars()
        .next_back()
        .map(|c| c == '-' || c == '\u{2212}')
        .unwrap_or(false)
}
