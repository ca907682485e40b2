use std::collections::HashSet;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use tracing::{debug, info, warn};

use crate::config::{DashboardConfig, RowPolicy};
use crate::error::{Result, VehRegError};
use crate::record::{RecordSet, RegistrationRecord};
use crate::schema::{category, record};

/// Accepted date-time layouts; only the date part is kept.
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// Validation settings for a load.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub row_policy: RowPolicy,
    pub known_categories: Vec<String>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            row_policy: RowPolicy::default(),
            known_categories: category::KNOWN.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl From<&DashboardConfig> for LoadOptions {
    fn from(config: &DashboardConfig) -> Self {
        Self {
            row_policy: config.row_policy,
            known_categories: config.known_categories.clone(),
        }
    }
}

/// Record Store loader: turns a tabular source into a validated [`RecordSet`].
///
/// Required columns: date, category, manufacturer, registrations.
/// Optional year, quarter and month columns are ignored; those fields are
/// recomputed from the date of every row.
#[derive(Debug, Clone, Default)]
pub struct RecordLoader {
    options: LoadOptions,
}

impl RecordLoader {
    pub fn new(options: LoadOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    // ── Sources ─────────────────────────────────────────────────────────────

    /// Load a CSV file from disk.
    pub fn load_csv(&self, path: impl AsRef<Path>) -> Result<RecordSet> {
        let path = path.as_ref();
        let df = read_csv_as_strings(path)?;
        let set = self.load_frame(&df)?;
        info!(path = %path.display(), rows = set.len(), "loaded registration csv");
        Ok(set)
    }

    /// Load CSV content already held in memory.
    pub fn load_csv_bytes(&self, bytes: impl Into<Vec<u8>>) -> Result<RecordSet> {
        let df = read_csv_bytes_as_strings(bytes.into())?;
        self.load_frame(&df)
    }

    /// Validate and normalize an existing DataFrame.
    ///
    /// `date` may be a String, Date or Datetime column; the other columns
    /// may have any dtype that casts to string. The summed registrations of
    /// the accepted rows always fit in `u64`, so every aggregate over the
    /// returned set does too.
    pub fn load_frame(&self, df: &DataFrame) -> Result<RecordSet> {
        require_columns(df, &record::REQUIRED)?;

        let ignored: Vec<&str> = record::DERIVED
            .iter()
            .copied()
            .filter(|c| df.column(c).is_ok())
            .collect();
        if !ignored.is_empty() {
            debug!(columns = ?ignored, "ignoring precomputed time columns");
        }

        let dates = date_column(df)?;
        let categories = string_column(df, record::CATEGORY)?;
        let manufacturers = string_column(df, record::MANUFACTURER)?;
        let counts = string_column(df, record::REGISTRATIONS)?;

        let dates = dates.str()?;
        let categories = categories.str()?;
        let manufacturers = manufacturers.str()?;
        let counts = counts.str()?;

        let mut records = Vec::with_capacity(df.height());
        let mut skipped = 0usize;
        let mut total: u64 = 0;
        let mut unknown_seen: HashSet<String> = HashSet::new();

        for row in 0..df.height() {
            let parsed = parse_row(
                row,
                dates.get(row),
                categories.get(row),
                manufacturers.get(row),
                counts.get(row),
            )
            .and_then(|rec| match total.checked_add(rec.registrations()) {
                Some(sum) => Ok((rec, sum)),
                None => Err(VehRegError::InvalidValue {
                    row,
                    column: record::REGISTRATIONS.to_string(),
                    reason: format!("running total overflows u64 at {}", rec.registrations()),
                }),
            });

            match parsed {
                Ok((rec, sum)) => {
                    total = sum;
                    if !self.is_known(rec.category()) && unknown_seen.insert(rec.category().into())
                    {
                        warn!(category = rec.category(), "unknown vehicle category");
                    }
                    records.push(rec);
                }
                Err(err) if err.is_row_error() && self.options.row_policy == RowPolicy::Skip => {
                    warn!(row, error = %err, "skipping invalid registration row");
                    skipped += 1;
                }
                Err(err) => return Err(err),
            }
        }

        if skipped > 0 {
            warn!(skipped, kept = records.len(), "rows excluded from aggregates");
        }
        debug!(rows = records.len(), "record set validated");

        Ok(RecordSet::from_records(records))
    }

    fn is_known(&self, category: &str) -> bool {
        self.options.known_categories.iter().any(|c| c == category)
    }
}

// ── Row parsing ─────────────────────────────────────────────────────────────

fn parse_row(
    row: usize,
    date: Option<&str>,
    category: Option<&str>,
    manufacturer: Option<&str>,
    count: Option<&str>,
) -> Result<RegistrationRecord> {
    let raw_date = date.map(str::trim).unwrap_or("");
    let date = parse_date(raw_date).ok_or_else(|| VehRegError::MalformedDate {
        row,
        value: raw_date.to_string(),
    })?;

    let category = required_text(row, record::CATEGORY, category)?;
    let manufacturer = required_text(row, record::MANUFACTURER, manufacturer)?;
    let registrations = parse_registrations(count).map_err(|reason| VehRegError::InvalidValue {
        row,
        column: record::REGISTRATIONS.to_string(),
        reason,
    })?;

    Ok(RegistrationRecord::new(
        date,
        category,
        manufacturer,
        registrations,
    ))
}

/// Parse an ISO 8601 date, or the date part of an ISO date-time.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok().or_else(|| {
        DATETIME_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|dt| dt.date())
    })
}

/// Parse a registration count. Missing, non-integer and negative values are
/// rejected with a human-readable reason.
pub fn parse_registrations(raw: Option<&str>) -> std::result::Result<u64, String> {
    let raw = raw.map(str::trim).unwrap_or("");
    if raw.is_empty() {
        return Err("missing value".to_string());
    }
    let n: i64 = raw
        .parse()
        .map_err(|_| format!("'{raw}' is not an integer"))?;
    if n < 0 {
        return Err(format!("negative count {n}"));
    }
    Ok(n as u64)
}

fn required_text(row: usize, column: &str, value: Option<&str>) -> Result<String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(VehRegError::InvalidValue {
            row,
            column: column.to_string(),
            reason: "missing value".to_string(),
        }),
    }
}

// ── Frame helpers ───────────────────────────────────────────────────────────

fn require_columns(df: &DataFrame, required: &[&str]) -> Result<()> {
    for &col_name in required {
        if df.column(col_name).is_err() {
            return Err(VehRegError::Schema(col_name.to_string()));
        }
    }
    Ok(())
}

fn string_column(df: &DataFrame, name: &str) -> Result<Column> {
    Ok(df.column(name)?.cast(&DataType::String)?)
}

/// Datetime values stringify with a time part and fractional seconds, so
/// truncate them to dates first.
fn date_column(df: &DataFrame) -> Result<Column> {
    let column = df.column(record::DATE)?;
    let column = match column.dtype() {
        DataType::Datetime(_, _) => column.cast(&DataType::Date)?,
        _ => column.clone(),
    };
    Ok(column.cast(&DataType::String)?)
}

/// Read a CSV file with all columns as String dtype and trimmed column names.
fn read_csv_as_strings(path: &Path) -> Result<DataFrame> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0)) // all columns as String
        .try_into_reader_with_file_path(Some(PathBuf::from(path)))?
        .finish()?;
    trim_column_names(df)
}

fn read_csv_bytes_as_strings(bytes: Vec<u8>) -> Result<DataFrame> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()?;
    trim_column_names(df)
}

fn trim_column_names(mut df: DataFrame) -> Result<DataFrame> {
    let trimmed: Vec<String> = df
        .get_column_names_str()
        .iter()
        .map(|c| c.trim().to_string())
        .collect();
    df.set_column_names(trimmed)?;
    Ok(df)
}
