//! Read-only queries over snapshots: the operations a dashboard needs to
//! draw its filters, KPIs, charts and tables.
//!
//! Nothing here mutates a [`RecordSet`] or a growth table; every query
//! returns fresh values.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

use crate::growth::{QoqGrowth, YoyGrowth};
use crate::record::{RecordSet, RegistrationRecord};

// ── Filters ─────────────────────────────────────────────────────────────────

pub fn filter_by_categories(records: &RecordSet, categories: &BTreeSet<String>) -> RecordSet {
    records.filter(|r| categories.contains(r.category()))
}

pub fn filter_by_manufacturers(records: &RecordSet, manufacturers: &BTreeSet<String>) -> RecordSet {
    records.filter(|r| manufacturers.contains(r.manufacturer()))
}

/// Records dated within `[start, end]`. An inverted range selects nothing.
pub fn filter_by_date_range(records: &RecordSet, start: NaiveDate, end: NaiveDate) -> RecordSet {
    records.filter(|r| r.date() >= start && r.date() <= end)
}

/// Dashboard selection state, passed explicitly into queries.
///
/// `None` in a field means "no restriction".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UiState {
    pub categories: Option<BTreeSet<String>>,
    pub manufacturers: Option<BTreeSet<String>>,
    /// Inclusive on both ends.
    pub date_range: Option<(NaiveDate, NaiveDate)>,
}

impl UiState {
    /// Everything selected.
    pub fn all() -> Self {
        Self::default()
    }

    /// Initial selection for a record set: all categories, the first
    /// `max_manufacturers` manufacturers by name, and the full date span.
    pub fn initial(records: &RecordSet, max_manufacturers: usize) -> Self {
        Self {
            categories: Some(records.categories().into_iter().map(String::from).collect()),
            manufacturers: Some(
                records
                    .manufacturers()
                    .into_iter()
                    .take(max_manufacturers)
                    .map(String::from)
                    .collect(),
            ),
            date_range: records.date_bounds(),
        }
    }

    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = Some(categories.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_manufacturers<I, S>(mut self, manufacturers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.manufacturers = Some(manufacturers.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_date_range(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.date_range = Some((start, end));
        self
    }

    pub fn includes_category(&self, category: &str) -> bool {
        self.categories
            .as_ref()
            .map_or(true, |set| set.contains(category))
    }

    pub fn matches(&self, record: &RegistrationRecord) -> bool {
        self.includes_category(record.category())
            && self
                .manufacturers
                .as_ref()
                .map_or(true, |set| set.contains(record.manufacturer()))
            && self
                .date_range
                .map_or(true, |(start, end)| record.date() >= start && record.date() <= end)
    }

    /// Records matching every active restriction.
    pub fn apply(&self, records: &RecordSet) -> RecordSet {
        records.filter(|r| self.matches(r))
    }

    /// YoY rows for the selected categories. Growth tables are restricted by
    /// category only; manufacturer and date filters apply to raw records.
    pub fn yoy_rows<'a>(&self, yoy: &'a [YoyGrowth]) -> Vec<&'a YoyGrowth> {
        yoy.iter()
            .filter(|g| self.includes_category(&g.category))
            .collect()
    }

    pub fn qoq_rows<'a>(&self, qoq: &'a [QoqGrowth]) -> Vec<&'a QoqGrowth> {
        qoq.iter()
            .filter(|g| self.includes_category(&g.category))
            .collect()
    }
}

// ── Group and sum ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKey {
    Date,
    Category,
    Manufacturer,
    Year,
    Quarter,
    Period,
    Month,
}

/// One component of a group key. Orders naturally within a kind.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum GroupValue {
    Date(NaiveDate),
    Int(i64),
    Text(String),
}

impl fmt::Display for GroupValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupValue::Date(d) => write!(f, "{d}"),
            GroupValue::Int(i) => write!(f, "{i}"),
            GroupValue::Text(s) => f.write_str(s),
        }
    }
}

impl GroupKey {
    fn value_of(self, record: &RegistrationRecord) -> GroupValue {
        match self {
            GroupKey::Date => GroupValue::Date(record.date()),
            GroupKey::Category => GroupValue::Text(record.category().to_string()),
            GroupKey::Manufacturer => GroupValue::Text(record.manufacturer().to_string()),
            GroupKey::Year => GroupValue::Int(record.year() as i64),
            GroupKey::Quarter => GroupValue::Int(record.quarter() as i64),
            GroupKey::Period => GroupValue::Text(record.period().to_string()),
            GroupKey::Month => GroupValue::Int(record.month() as i64),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupTotal {
    pub key: Vec<GroupValue>,
    pub registrations: u64,
    pub rows: usize,
}

/// Sum registrations grouped by `keys`, ordered by key.
///
/// With no keys the result is a single grand-total group (or nothing for an
/// empty record set).
pub fn group_and_sum(records: &RecordSet, keys: &[GroupKey]) -> Vec<GroupTotal> {
    let mut groups: BTreeMap<Vec<GroupValue>, (u64, usize)> = BTreeMap::new();
    for rec in records {
        let key = keys.iter().map(|k| k.value_of(rec)).collect();
        let entry = groups.entry(key).or_insert((0, 0));
        entry.0 += rec.registrations();
        entry.1 += 1;
    }
    groups
        .into_iter()
        .map(|(key, (registrations, rows))| GroupTotal {
            key,
            registrations,
            rows,
        })
        .collect()
}

// ── Derived views ───────────────────────────────────────────────────────────

/// Per (category, year) totals and row counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategorySummary {
    pub category: String,
    pub year: i32,
    pub total_registrations: u64,
    pub row_count: usize,
}

pub fn category_summary(records: &RecordSet) -> Vec<CategorySummary> {
    let mut acc: BTreeMap<(&str, i32), (u64, usize)> = BTreeMap::new();
    for rec in records {
        let entry = acc.entry((rec.category(), rec.year())).or_insert((0, 0));
        entry.0 += rec.registrations();
        entry.1 += 1;
    }
    acc.into_iter()
        .map(|((category, year), (total, rows))| CategorySummary {
            category: category.to_string(),
            year,
            total_registrations: total,
            row_count: rows,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketShare {
    pub category: String,
    pub registrations: u64,
    pub share_pct: f64,
}

/// Each category's share of all registrations. Shares are zero when the
/// total is zero.
pub fn market_share_by_category(records: &RecordSet) -> Vec<MarketShare> {
    let total = records.total_registrations();
    let mut per_category: BTreeMap<&str, u64> = BTreeMap::new();
    for rec in records {
        *per_category.entry(rec.category()).or_insert(0) += rec.registrations();
    }
    per_category
        .into_iter()
        .map(|(category, registrations)| MarketShare {
            category: category.to_string(),
            registrations,
            share_pct: if total == 0 {
                0.0
            } else {
                registrations as f64 / total as f64 * 100.0
            },
        })
        .collect()
}

/// Category with the most registrations; ties go to the first name.
pub fn top_category(records: &RecordSet) -> Option<String> {
    let mut per_category: BTreeMap<&str, u64> = BTreeMap::new();
    for rec in records {
        *per_category.entry(rec.category()).or_insert(0) += rec.registrations();
    }
    let mut best: Option<(&str, u64)> = None;
    for (category, total) in per_category {
        if best.map_or(true, |(_, t)| total > t) {
            best = Some((category, total));
        }
    }
    best.map(|(category, _)| category.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub category: String,
    pub registrations: u64,
}

/// Registrations per (date, category), ordered by date then category.
pub fn trend_by_category(records: &RecordSet) -> Vec<TrendPoint> {
    let mut acc: BTreeMap<(NaiveDate, &str), u64> = BTreeMap::new();
    for rec in records {
        *acc.entry((rec.date(), rec.category())).or_insert(0) += rec.registrations();
    }
    acc.into_iter()
        .map(|((date, category), registrations)| TrendPoint {
            date,
            category: category.to_string(),
            registrations,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManufacturerYear {
    pub manufacturer: String,
    pub year: i32,
    pub registrations: u64,
}

/// Registrations per (manufacturer, year).
pub fn manufacturer_trend(records: &RecordSet) -> Vec<ManufacturerYear> {
    let mut acc: BTreeMap<(&str, i32), u64> = BTreeMap::new();
    for rec in records {
        *acc.entry((rec.manufacturer(), rec.year())).or_insert(0) += rec.registrations();
    }
    acc.into_iter()
        .map(|((manufacturer, year), registrations)| ManufacturerYear {
            manufacturer: manufacturer.to_string(),
            year,
            registrations,
        })
        .collect()
}

/// Mean growth of one category in one bucket (a year, or a period label).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeanGrowth {
    pub category: String,
    pub bucket: String,
    pub mean_growth_pct: f64,
    pub samples: usize,
}

pub fn mean_yoy_by_category_year<'a, I>(rows: I) -> Vec<MeanGrowth>
where
    I: IntoIterator<Item = &'a YoyGrowth>,
{
    // keyed by the numeric year so buckets sort chronologically
    let mut acc: BTreeMap<(&str, i32), (f64, usize)> = BTreeMap::new();
    for g in rows {
        let entry = acc.entry((g.category.as_str(), g.year)).or_insert((0.0, 0));
        entry.0 += g.yoy_growth_pct;
        entry.1 += 1;
    }
    acc.into_iter()
        .map(|((category, year), (sum, n))| MeanGrowth {
            category: category.to_string(),
            bucket: year.to_string(),
            mean_growth_pct: sum / n as f64,
            samples: n,
        })
        .collect()
}

pub fn mean_qoq_by_category_period<'a, I>(rows: I) -> Vec<MeanGrowth>
where
    I: IntoIterator<Item = &'a QoqGrowth>,
{
    let mut acc: BTreeMap<(&str, i32, u8), (f64, usize)> = BTreeMap::new();
    for g in rows {
        let entry = acc
            .entry((g.category.as_str(), g.year, g.quarter))
            .or_insert((0.0, 0));
        entry.0 += g.qoq_growth_pct;
        entry.1 += 1;
    }
    acc.into_iter()
        .map(|((category, year, quarter), (sum, n))| MeanGrowth {
            category: category.to_string(),
            bucket: format!("{year}-Q{quarter}"),
            mean_growth_pct: sum / n as f64,
            samples: n,
        })
        .collect()
}

/// The `n` highest YoY growth rows. Ties keep table order
/// (category, manufacturer, year).
pub fn top_yoy_performers<'a, I>(rows: I, n: usize) -> Vec<&'a YoyGrowth>
where
    I: IntoIterator<Item = &'a YoyGrowth>,
{
    let mut rows: Vec<&YoyGrowth> = rows.into_iter().collect();
    rows.sort_by(|a, b| b.yoy_growth_pct.total_cmp(&a.yoy_growth_pct));
    rows.truncate(n);
    rows
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

// ── Key metrics ─────────────────────────────────────────────────────────────

/// Headline numbers for the current selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyMetrics {
    pub total_registrations: u64,
    pub avg_yoy_growth_pct: Option<f64>,
    pub avg_qoq_growth_pct: Option<f64>,
    pub top_category: Option<String>,
}

impl KeyMetrics {
    pub fn compute(
        records: &RecordSet,
        yoy: &[YoyGrowth],
        qoq: &[QoqGrowth],
        ui: &UiState,
    ) -> Self {
        let filtered = ui.apply(records);
        Self {
            total_registrations: filtered.total_registrations(),
            avg_yoy_growth_pct: mean(ui.yoy_rows(yoy).into_iter().map(|g| g.yoy_growth_pct)),
            avg_qoq_growth_pct: mean(ui.qoq_rows(qoq).into_iter().map(|g| g.qoq_growth_pct)),
            top_category: top_category(&filtered),
        }
    }
}
