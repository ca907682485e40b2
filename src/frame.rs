//! DataFrame views of records and growth tables for DataFrame-speaking
//! consumers (the Python binding, notebooks, CSV export).

use chrono::NaiveDate;
use polars::prelude::*;

use crate::error::Result;
use crate::growth::{QoqGrowth, YoyGrowth};
use crate::query::CategorySummary;
use crate::record::RecordSet;
use crate::schema::{growth, record, summary};

fn days_since_epoch(date: NaiveDate) -> i32 {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or(NaiveDate::MIN);
    date.signed_duration_since(epoch).num_days() as i32
}

/// Records with a `Date`-typed date column and the derived time fields.
pub fn records_frame(records: &RecordSet) -> Result<DataFrame> {
    let n = records.len();
    let mut dates = Vec::with_capacity(n);
    let mut categories = Vec::with_capacity(n);
    let mut manufacturers = Vec::with_capacity(n);
    let mut counts = Vec::with_capacity(n);
    let mut years = Vec::with_capacity(n);
    let mut quarters = Vec::with_capacity(n);
    let mut months = Vec::with_capacity(n);

    for rec in records {
        dates.push(days_since_epoch(rec.date()));
        categories.push(rec.category());
        manufacturers.push(rec.manufacturer());
        counts.push(rec.registrations());
        years.push(rec.year());
        quarters.push(rec.quarter() as i32);
        months.push(rec.month() as i32);
    }

    let date_series = Series::new(record::DATE.into(), dates).cast(&DataType::Date)?;

    let columns: Vec<Column> = vec![
        date_series.into(),
        Series::new(record::CATEGORY.into(), categories).into(),
        Series::new(record::MANUFACTURER.into(), manufacturers).into(),
        Series::new(record::REGISTRATIONS.into(), counts).into(),
        Series::new(record::YEAR.into(), years).into(),
        Series::new(record::QUARTER.into(), quarters).into(),
        Series::new(record::MONTH.into(), months).into(),
    ];
    Ok(DataFrame::new(columns)?)
}

pub fn yoy_frame(rows: &[YoyGrowth]) -> Result<DataFrame> {
    let columns: Vec<Column> = vec![
        Series::new(
            growth::CATEGORY.into(),
            rows.iter().map(|g| g.category.as_str()).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            growth::MANUFACTURER.into(),
            rows.iter().map(|g| g.manufacturer.as_str()).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            growth::YEAR.into(),
            rows.iter().map(|g| g.year).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            growth::PREVIOUS_YEAR.into(),
            rows.iter().map(|g| g.previous_year).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            growth::CURRENT_TOTAL.into(),
            rows.iter().map(|g| g.current_total).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            growth::PREVIOUS_TOTAL.into(),
            rows.iter().map(|g| g.previous_total).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            growth::YOY_GROWTH_PCT.into(),
            rows.iter().map(|g| g.yoy_growth_pct).collect::<Vec<_>>(),
        )
        .into(),
    ];
    Ok(DataFrame::new(columns)?)
}

pub fn qoq_frame(rows: &[QoqGrowth]) -> Result<DataFrame> {
    let columns: Vec<Column> = vec![
        Series::new(
            growth::CATEGORY.into(),
            rows.iter().map(|g| g.category.as_str()).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            growth::MANUFACTURER.into(),
            rows.iter().map(|g| g.manufacturer.as_str()).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            growth::YEAR.into(),
            rows.iter().map(|g| g.year).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            growth::QUARTER.into(),
            rows.iter().map(|g| g.quarter as i32).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            growth::PERIOD.into(),
            rows.iter().map(|g| g.period.as_str()).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            growth::PREVIOUS_PERIOD.into(),
            rows.iter().map(|g| g.previous_period.as_str()).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            growth::CURRENT_TOTAL.into(),
            rows.iter().map(|g| g.current_total).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            growth::PREVIOUS_TOTAL.into(),
            rows.iter().map(|g| g.previous_total).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            growth::QOQ_GROWTH_PCT.into(),
            rows.iter().map(|g| g.qoq_growth_pct).collect::<Vec<_>>(),
        )
        .into(),
    ];
    Ok(DataFrame::new(columns)?)
}

pub fn category_summary_frame(rows: &[CategorySummary]) -> Result<DataFrame> {
    let columns: Vec<Column> = vec![
        Series::new(
            summary::CATEGORY.into(),
            rows.iter().map(|s| s.category.as_str()).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            summary::YEAR.into(),
            rows.iter().map(|s| s.year).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            summary::TOTAL_REGISTRATIONS.into(),
            rows.iter().map(|s| s.total_registrations).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            summary::ROW_COUNT.into(),
            rows.iter().map(|s| s.row_count as u64).collect::<Vec<_>>(),
        )
        .into(),
    ];
    Ok(DataFrame::new(columns)?)
}

/// Group an exported frame by `by` and sum `value`, sorted by the group keys.
pub fn group_and_sum_frame(df: &DataFrame, by: &[&str], value: &str) -> Result<DataFrame> {
    let keys: Vec<Expr> = by.iter().map(|c| col(*c)).collect();
    let out = df
        .clone()
        .lazy()
        .group_by(keys.clone())
        .agg([col(value).sum()])
        .sort_by_exprs(keys, SortMultipleOptions::default())
        .collect()?;
    Ok(out)
}
