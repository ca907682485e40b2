use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

/// Calendar quarter (1-4) of a month (1-12).
pub fn quarter_of(month: u32) -> u8 {
    ((month.clamp(1, 12) - 1) / 3 + 1) as u8
}

/// A (year, quarter) bucket. Ordering is chronological: `2021-Q4 < 2022-Q1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Period {
    pub year: i32,
    pub quarter: u8,
}

impl Period {
    pub fn new(year: i32, quarter: u8) -> Self {
        Self { year, quarter }
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            quarter: quarter_of(date.month()),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-Q{}", self.year, self.quarter)
    }
}

/// One validated registration row.
///
/// `year`, `quarter` and `month` are always derived from `date` in the
/// constructor; there is no way to build a record with inconsistent
/// time fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrationRecord {
    date: NaiveDate,
    category: String,
    manufacturer: String,
    registrations: u64,
    year: i32,
    quarter: u8,
    month: u8,
}

impl RegistrationRecord {
    pub fn new(
        date: NaiveDate,
        category: impl Into<String>,
        manufacturer: impl Into<String>,
        registrations: u64,
    ) -> Self {
        Self {
            date,
            category: category.into(),
            manufacturer: manufacturer.into(),
            registrations,
            year: date.year(),
            quarter: quarter_of(date.month()),
            month: date.month() as u8,
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn manufacturer(&self) -> &str {
        &self.manufacturer
    }

    pub fn registrations(&self) -> u64 {
        self.registrations
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn quarter(&self) -> u8 {
        self.quarter
    }

    pub fn month(&self) -> u8 {
        self.month
    }

    pub fn period(&self) -> Period {
        Period::new(self.year, self.quarter)
    }
}

/// Immutable, cheaply clonable set of registration records.
///
/// Clones share the same backing storage; filtering produces a new set and
/// never touches the source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSet {
    records: Arc<Vec<RegistrationRecord>>,
}

impl RecordSet {
    /// Aggregates sum registrations in `u64`; the caller keeps the total in
    /// range (`RecordLoader` enforces it).
    pub fn from_records(records: Vec<RegistrationRecord>) -> Self {
        Self {
            records: Arc::new(records),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RegistrationRecord> {
        self.records.iter()
    }

    pub fn as_slice(&self) -> &[RegistrationRecord] {
        &self.records
    }

    pub fn total_registrations(&self) -> u64 {
        self.records.iter().map(|r| r.registrations).sum()
    }

    pub fn categories(&self) -> BTreeSet<&str> {
        self.records.iter().map(|r| r.category()).collect()
    }

    pub fn manufacturers(&self) -> BTreeSet<&str> {
        self.records.iter().map(|r| r.manufacturer()).collect()
    }

    /// Earliest and latest date present, or `None` for an empty set.
    pub fn date_bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        let min = self.records.iter().map(|r| r.date).min()?;
        let max = self.records.iter().map(|r| r.date).max()?;
        Some((min, max))
    }

    /// New set holding the records that satisfy `keep`.
    pub fn filter<F>(&self, mut keep: F) -> RecordSet
    where
        F: FnMut(&RegistrationRecord) -> bool,
    {
        self.records.iter().filter(|r| keep(r)).cloned().collect()
    }
}

impl FromIterator<RegistrationRecord> for RecordSet {
    fn from_iter<I: IntoIterator<Item = RegistrationRecord>>(iter: I) -> Self {
        Self::from_records(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a RecordSet {
    type Item = &'a RegistrationRecord;
    type IntoIter = std::slice::Iter<'a, RegistrationRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn derived_fields_follow_the_date() {
        let r = RegistrationRecord::new(date(2021, 11, 30), "4W", "Acme", 7);
        assert_eq!(r.year(), 2021);
        assert_eq!(r.quarter(), 4);
        assert_eq!(r.month(), 11);
        assert_eq!(r.period().to_string(), "2021-Q4");
    }

    #[test]
    fn quarter_boundaries() {
        assert_eq!(quarter_of(1), 1);
        assert_eq!(quarter_of(3), 1);
        assert_eq!(quarter_of(4), 2);
        assert_eq!(quarter_of(9), 3);
        assert_eq!(quarter_of(10), 4);
        assert_eq!(quarter_of(12), 4);
    }

    #[test]
    fn periods_order_chronologically() {
        assert!(Period::new(2021, 4) < Period::new(2022, 1));
        assert!(Period::new(2021, 2) < Period::new(2021, 4));
        assert!(Period::new(2009, 4) < Period::new(2010, 1));
    }

    #[test]
    fn filter_leaves_source_untouched() {
        let set: RecordSet = vec![
            RegistrationRecord::new(date(2021, 1, 1), "2W", "Hero", 10),
            RegistrationRecord::new(date(2021, 2, 1), "4W", "Tata", 20),
        ]
        .into_iter()
        .collect();

        let only_4w = set.filter(|r| r.category() == "4W");
        assert_eq!(only_4w.len(), 1);
        assert_eq!(set.len(), 2);
        assert_eq!(set.total_registrations(), 30);
    }

    #[test]
    fn date_bounds_of_empty_set_is_none() {
        assert_eq!(RecordSet::default().date_bounds(), None);
    }
}
