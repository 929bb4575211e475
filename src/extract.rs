use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

use crate::config::UNKNOWN_DATE;

/// Page phrases meaning "nothing on sale here". Matched case-insensitively.
pub const NO_EVENTS_MARKERS: &[&str] = &[
    "no upcoming events",
    "no events found",
    "there are currently no events",
    "no events scheduled",
    "no tickets currently available",
];

/// Elements whose text never reaches the reader.
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Keys whose numeric values are treated as ticket prices.
pub const PRICE_KEYS: &[&str] = &["price", "lowPrice", "highPrice", "minPrice", "maxPrice"];

static CURRENCY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[£$€]\s?(\d{1,3}(?:,\d{3})+(?:\.\d{1,2})?|\d+(?:\.\d{1,2})?)")
        .expect("currency regex")
});

static DAY_MONTH_YEAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(\d{1,2})(?:st|nd|rd|th)?\s+(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?,?\s+(\d{4})\b",
    )
    .expect("date regex")
});

static LD_JSON: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"script[type="application/ld+json"]"#).expect("ld+json selector")
});

#[derive(Debug, Clone, PartialEq)]
pub struct PriceDate {
    /// 0.0 = unknown.
    pub price_min: f64,
    /// 0.0 = unknown.
    pub price_max: f64,
    pub date: Option<NaiveDate>,
    pub date_label: String,
}

impl PriceDate {
    fn new(prices: &[f64], date: Option<NaiveDate>) -> Self {
        let (price_min, price_max) = min_max(prices);
        let date_label = date.map(format_date).unwrap_or_else(|| UNKNOWN_DATE.to_string());
        Self { price_min, price_max, date, date_label }
    }
}

/// Result of reading one listing. `NotTradable` is distinct from a listing
/// whose price simply could not be found: the former is dropped, the latter
/// is scored as a presale.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    NotTradable,
    Listing(PriceDate),
}

pub fn extract(raw: &str) -> Extraction {
    let trimmed = raw.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
            return Extraction::Listing(extract_json(&v));
        }
    }
    extract_html(raw)
}

fn extract_json(v: &Value) -> PriceDate {
    let scope = find_key(v, "offers").unwrap_or(v);
    let prices = positive(collect_numeric_leaves(scope, PRICE_KEYS));
    let date = find_key(v, "startDate")
        .and_then(Value::as_str)
        .and_then(parse_event_date);
    PriceDate::new(&prices, date)
}

fn extract_html(raw: &str) -> Extraction {
    let doc = Html::parse_document(raw);
    let mut text = String::new();
    visible_text(doc.root_element(), &mut text);

    let lower = text.to_lowercase();
    if NO_EVENTS_MARKERS.iter().any(|m| lower.contains(m)) {
        return Extraction::NotTradable;
    }

    // Structured data embedded in the page wins over text heuristics.
    let mut prices = Vec::new();
    let mut date = None;
    for script in doc.select(&LD_JSON) {
        let text: String = script.text().collect();
        let Ok(v) = serde_json::from_str::<Value>(text.trim()) else { continue };
        let scope = find_key(&v, "offers").unwrap_or(&v);
        prices.extend(positive(collect_numeric_leaves(scope, PRICE_KEYS)));
        if date.is_none() {
            date = find_key(&v, "startDate")
                .and_then(Value::as_str)
                .and_then(parse_event_date);
        }
    }

    if prices.is_empty() {
        prices = currency_amounts(&text);
    }
    if date.is_none() {
        date = find_day_month_year(&text);
    }

    Extraction::Listing(PriceDate::new(&prices, date))
}

/// Text nodes a browser would render, space separated. Script and style
/// bodies are skipped; JSON-LD is read separately.
fn visible_text(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
            out.push(' ');
        } else if let Some(child_el) = ElementRef::wrap(child) {
            if !HIDDEN_ELEMENTS.contains(&child_el.value().name()) {
                visible_text(child_el, out);
            }
        }
    }
}

/// Every numeric leaf (number or numeric string) stored under one of `keys`,
/// anywhere in the tree.
pub fn collect_numeric_leaves(v: &Value, keys: &[&str]) -> Vec<f64> {
    let mut out = Vec::new();
    walk_numeric(v, keys, &mut out);
    out
}

fn walk_numeric(v: &Value, keys: &[&str], out: &mut Vec<f64>) {
    match v {
        Value::Object(map) => {
            for (k, child) in map {
                if keys.contains(&k.as_str()) {
                    if let Some(n) = as_number(child) {
                        out.push(n);
                    }
                }
                walk_numeric(child, keys, out);
            }
        }
        Value::Array(items) => {
            for child in items {
                walk_numeric(child, keys, out);
            }
        }
        _ => {}
    }
}

/// First value stored under `key`, depth-first.
pub fn find_key<'a>(v: &'a Value, key: &str) -> Option<&'a Value> {
    match v {
        Value::Object(map) => map
            .get(key)
            .or_else(|| map.values().find_map(|child| find_key(child, key))),
        Value::Array(items) => items.iter().find_map(|child| find_key(child, key)),
        _ => None,
    }
}

fn as_number(v: &Value) -> Option<f64> {
    v.as_f64()
        .or_else(|| v.as_str().and_then(|s| s.trim().replace(',', "").parse().ok()))
        .filter(|n: &f64| n.is_finite())
}

fn positive(values: Vec<f64>) -> Vec<f64> {
    values.into_iter().filter(|p| *p > 0.0).collect()
}

fn min_max(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    (min, max)
}

pub fn currency_amounts(text: &str) -> Vec<f64> {
    CURRENCY_RE
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .filter_map(|m| m.as_str().replace(',', "").parse::<f64>().ok())
        .filter(|p| *p > 0.0)
        .collect()
}

pub fn find_day_month_year(text: &str) -> Option<NaiveDate> {
    DAY_MONTH_YEAR_RE.captures_iter(text).find_map(|c| {
        let day: u32 = c.get(1)?.as_str().parse().ok()?;
        let month = month_number(c.get(2)?.as_str())?;
        let year: i32 = c.get(3)?.as_str().parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    })
}

fn month_number(abbrev: &str) -> Option<u32> {
    let months = ["jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec"];
    let lower = abbrev.to_lowercase();
    months.iter().position(|m| *m == lower).map(|i| i as u32 + 1)
}

/// ISO8601 date-time (with or without offset) or a bare `YYYY-MM-DD`.
pub fn parse_event_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.date());
    }
    s.get(..10)
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
}

pub fn format_date(d: NaiveDate) -> String {
    d.format("%a %d %b %Y").to_string()
}
