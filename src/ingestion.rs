use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::AppResult;
use crate::pricing::{format_price, normalize_price};
use crate::records::{AnnotatedRow, CatalogRow, SiteResult, SiteResults};

/// Cell values earlier runs wrote for "nothing found".
pub const PLACEHOLDERS: &[&str] = &[
    "Not Found",
    "Product not available on site",
    "Price not displayed in listing",
];

pub const SHEET_COLUMNS: &[&str] = &[
    "view_count",
    "style_id",
    "brand",
    "product_title",
    "gender",
    "category",
    "klydo_price",
    "myntra_price",
    "slikk_price",
    "brand_price",
    "klydo_url",
    "myntra_url",
    "slikk_url",
    "brand_url",
];

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CatalogRecord {
    style_id: String,
    brand_name: String,
    product_title: String,
    gender: String,
    category: String,
    min_price_rupees: String,
    first_image_url: String,
    view_count: String,
    product_url: String,
    klydo_url: String,
}

/// Field order matches `SHEET_COLUMNS`.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct SheetRecord {
    view_count: String,
    style_id: String,
    brand: String,
    product_title: String,
    gender: String,
    category: String,
    klydo_price: String,
    myntra_price: String,
    slikk_price: String,
    brand_price: String,
    klydo_url: String,
    myntra_url: String,
    slikk_url: String,
    brand_url: String,
}

fn is_absent(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty()
        || PLACEHOLDERS
            .iter()
            .any(|placeholder| placeholder.eq_ignore_ascii_case(trimmed))
}

fn present(value: String) -> Option<String> {
    (!is_absent(&value)).then(|| value.trim().to_string())
}

fn price_cell(value: &str) -> Option<f64> {
    if is_absent(value) {
        return None;
    }
    normalize_price(value)
}

/// Accepts `1234`, `1,234` and `1234.0`; anything else reads as zero.
pub fn parse_view_count(value: &str) -> u64 {
    let cleaned = value.trim().replace(',', "");
    cleaned
        .parse::<u64>()
        .ok()
        .or_else(|| {
            cleaned
                .parse::<f64>()
                .ok()
                .filter(|count| count.is_finite() && *count >= 0.0)
                .map(|count| count as u64)
        })
        .unwrap_or(0)
}

impl From<CatalogRecord> for CatalogRow {
    fn from(record: CatalogRecord) -> Self {
        let product_url = present(record.product_url).or_else(|| present(record.klydo_url));
        CatalogRow {
            style_id: record.style_id.trim().to_string(),
            brand_name: record.brand_name.trim().to_string(),
            product_title: record.product_title.trim().to_string(),
            gender: record.gender,
            category: record.category,
            min_price_rupees: record.min_price_rupees,
            first_image_url: record.first_image_url.trim().to_string(),
            view_count: parse_view_count(&record.view_count),
            product_url,
        }
    }
}

impl From<SheetRecord> for AnnotatedRow {
    fn from(record: SheetRecord) -> Self {
        let site = |url: String, price: &str| SiteResult {
            url: present(url),
            price: price_cell(price),
        };
        AnnotatedRow {
            view_count: parse_view_count(&record.view_count),
            results: SiteResults {
                myntra: site(record.myntra_url, &record.myntra_price),
                slikk: site(record.slikk_url, &record.slikk_price),
                brand: site(record.brand_url, &record.brand_price),
            },
            style_id: record.style_id.trim().to_string(),
            brand: record.brand,
            product_title: record.product_title,
            gender: record.gender,
            category: record.category,
            klydo_price: record.klydo_price,
            klydo_url: present(record.klydo_url).unwrap_or_default(),
        }
    }
}

impl From<&AnnotatedRow> for SheetRecord {
    fn from(row: &AnnotatedRow) -> Self {
        let price = |result: &SiteResult| result.price.map(format_price).unwrap_or_default();
        let url = |result: &SiteResult| result.url.clone().unwrap_or_default();
        SheetRecord {
            view_count: row.view_count.to_string(),
            style_id: row.style_id.clone(),
            brand: row.brand.clone(),
            product_title: row.product_title.clone(),
            gender: row.gender.clone(),
            category: row.category.clone(),
            klydo_price: row.klydo_price.clone(),
            myntra_price: price(&row.results.myntra),
            slikk_price: price(&row.results.slikk),
            brand_price: price(&row.results.brand),
            klydo_url: row.klydo_url.clone(),
            myntra_url: url(&row.results.myntra),
            slikk_url: url(&row.results.slikk),
            brand_url: url(&row.results.brand),
        }
    }
}

fn reader<R: Read>(input: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .flexible(true)
        .from_reader(input)
}

pub fn read_catalog_from<R: Read>(input: R) -> AppResult<Vec<CatalogRow>> {
    let mut rows = Vec::new();
    for (line, record) in reader(input).deserialize::<CatalogRecord>().enumerate() {
        let row = CatalogRow::from(record?);
        if row.style_id.is_empty() {
            warn!(line = line + 2, "skipping catalog row without style_id");
            continue;
        }
        rows.push(row);
    }
    debug!(rows = rows.len(), "catalog loaded");
    Ok(rows)
}

pub fn read_catalog(path: &Path) -> AppResult<Vec<CatalogRow>> {
    read_catalog_from(File::open(path)?)
}

pub fn read_sheet_from<R: Read>(input: R) -> AppResult<Vec<AnnotatedRow>> {
    let rows = reader(input)
        .deserialize::<SheetRecord>()
        .map(|record| record.map(AnnotatedRow::from))
        .collect::<Result<Vec<_>, _>>()?;
    debug!(rows = rows.len(), "sheet loaded");
    Ok(rows)
}

pub fn read_sheet(path: &Path) -> AppResult<Vec<AnnotatedRow>> {
    read_sheet_from(File::open(path)?)
}

pub fn write_sheet_to<W: Write>(output: W, rows: &[AnnotatedRow]) -> AppResult<()> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(output);
    writer.write_record(SHEET_COLUMNS)?;
    for row in rows {
        writer.serialize(SheetRecord::from(row))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_sheet(path: &Path, rows: &[AnnotatedRow]) -> AppResult<()> {
    write_sheet_to(File::create(path)?, rows)
}
