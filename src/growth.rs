use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::record::{RecordSet, RegistrationRecord};

/// Year-over-year change for one (category, manufacturer) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YoyGrowth {
    pub category: String,
    pub manufacturer: String,
    pub year: i32,
    /// The closest earlier year with data; may be more than one year back.
    pub previous_year: i32,
    pub current_total: u64,
    pub previous_total: u64,
    pub yoy_growth_pct: f64,
}

/// Quarter-over-quarter change for one (category, manufacturer) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QoqGrowth {
    pub category: String,
    pub manufacturer: String,
    pub year: i32,
    pub quarter: u8,
    /// `"<year>-Q<quarter>"`
    pub period: String,
    pub previous_period: String,
    pub current_total: u64,
    pub previous_total: u64,
    pub qoq_growth_pct: f64,
}

/// Both derived tables computed from the same record set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GrowthTables {
    pub yoy: Vec<YoyGrowth>,
    pub qoq: Vec<QoqGrowth>,
}

impl GrowthTables {
    pub fn compute(records: &RecordSet) -> Self {
        Self {
            yoy: compute_yoy(records),
            qoq: compute_qoq(records),
        }
    }
}

/// Percentage change from `previous` to `current`; zero when there is no base.
pub fn growth_pct(current: u64, previous: u64) -> f64 {
    if previous == 0 {
        return 0.0;
    }
    (current as f64 - previous as f64) / previous as f64 * 100.0
}

/// YoY growth per (category, manufacturer), comparing each present year with
/// the previous present year.
///
/// Output is ordered by category, manufacturer, year and does not depend on
/// the order of the input rows.
pub fn compute_yoy(records: &RecordSet) -> Vec<YoyGrowth> {
    let partitions = partition_totals(records, RegistrationRecord::year);

    let mut out = Vec::new();
    for ((category, manufacturer), totals) in &partitions {
        for step in adjacent_steps(totals) {
            out.push(YoyGrowth {
                category: category.to_string(),
                manufacturer: manufacturer.to_string(),
                year: step.current,
                previous_year: step.previous,
                current_total: step.current_total,
                previous_total: step.previous_total,
                yoy_growth_pct: growth_pct(step.current_total, step.previous_total),
            });
        }
    }

    debug!(partitions = partitions.len(), rows = out.len(), "computed yoy growth");
    out
}

/// QoQ growth per (category, manufacturer) over chronologically ordered
/// (year, quarter) periods.
pub fn compute_qoq(records: &RecordSet) -> Vec<QoqGrowth> {
    let partitions = partition_totals(records, RegistrationRecord::period);

    let mut out = Vec::new();
    for ((category, manufacturer), totals) in &partitions {
        for step in adjacent_steps(totals) {
            out.push(QoqGrowth {
                category: category.to_string(),
                manufacturer: manufacturer.to_string(),
                year: step.current.year,
                quarter: step.current.quarter,
                period: step.current.to_string(),
                previous_period: step.previous.to_string(),
                current_total: step.current_total,
                previous_total: step.previous_total,
                qoq_growth_pct: growth_pct(step.current_total, step.previous_total),
            });
        }
    }

    debug!(partitions = partitions.len(), rows = out.len(), "computed qoq growth");
    out
}

// ── Partitioning ────────────────────────────────────────────────────────────

type PartitionKey<'a> = (&'a str, &'a str);

/// Sum registrations per (category, manufacturer) and time bucket.
///
/// BTreeMaps keep both the partitions and the buckets inside them sorted,
/// which is what makes the result independent of input order.
fn partition_totals<'a, K, F>(
    records: &'a RecordSet,
    bucket: F,
) -> BTreeMap<PartitionKey<'a>, BTreeMap<K, u64>>
where
    K: Ord,
    F: Fn(&RegistrationRecord) -> K,
{
    let mut partitions: BTreeMap<PartitionKey<'a>, BTreeMap<K, u64>> = BTreeMap::new();
    for rec in records {
        *partitions
            .entry((rec.category(), rec.manufacturer()))
            .or_default()
            .entry(bucket(rec))
            .or_insert(0) += rec.registrations();
    }
    partitions
}

struct Step<K> {
    previous: K,
    current: K,
    previous_total: u64,
    current_total: u64,
}

/// Consecutive pairs of present buckets. Gaps are bridged, not filled.
fn adjacent_steps<K: Copy>(totals: &BTreeMap<K, u64>) -> impl Iterator<Item = Step<K>> + '_ {
    totals
        .iter()
        .zip(totals.iter().skip(1))
        .map(|((&previous, &previous_total), (&current, &current_total))| Step {
            previous,
            current,
            previous_total,
            current_total,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn rec(date: &str, category: &str, manufacturer: &str, n: u64) -> RegistrationRecord {
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap();
        RegistrationRecord::new(date, category, manufacturer, n)
    }

    fn set(rows: Vec<RegistrationRecord>) -> RecordSet {
        RecordSet::from_records(rows)
    }

    #[test]
    fn yoy_single_pair() {
        let records = set(vec![
            rec("2021-03-01", "4W", "Acme", 100),
            rec("2022-03-01", "4W", "Acme", 150),
        ]);
        let yoy = compute_yoy(&records);
        assert_eq!(
            yoy,
            vec![YoyGrowth {
                category: "4W".into(),
                manufacturer: "Acme".into(),
                year: 2022,
                previous_year: 2021,
                current_total: 150,
                previous_total: 100,
                yoy_growth_pct: 50.0,
            }]
        );
    }

    #[test]
    fn qoq_uses_chronological_adjacency() {
        let records = set(vec![
            rec("2021-05-10", "4W", "Acme", 30),
            rec("2021-11-01", "4W", "Acme", 40),
            rec("2022-02-01", "4W", "Acme", 50),
        ]);
        let qoq = compute_qoq(&records);
        assert_eq!(qoq.len(), 2);

        let last = qoq.last().unwrap();
        assert_eq!(last.period, "2022-Q1");
        assert_eq!(last.previous_period, "2021-Q4");
        assert_eq!(last.previous_total, 40);
        assert_eq!(last.qoq_growth_pct, 25.0);

        assert!(qoq
            .iter()
            .all(|g| !(g.period == "2022-Q1" && g.previous_period == "2021-Q2")));
    }

    #[test]
    fn zero_base_gives_zero_growth() {
        let records = set(vec![
            rec("2020-01-01", "3W", "Bajaj", 0),
            rec("2021-01-01", "3W", "Bajaj", 80),
        ]);
        let yoy = compute_yoy(&records);
        assert_eq!(yoy.len(), 1);
        assert_eq!(yoy[0].yoy_growth_pct, 0.0);
        assert!(yoy[0].yoy_growth_pct.is_finite());
    }

    #[test]
    fn single_period_partitions_emit_nothing() {
        let records = set(vec![
            rec("2021-01-01", "2W", "Hero", 10),
            rec("2021-01-20", "2W", "Hero", 15),
            rec("2021-02-01", "2W", "Honda", 5),
        ]);
        assert!(compute_yoy(&records).is_empty());
        assert_eq!(compute_qoq(&records).len(), 0);
    }

    #[test]
    fn year_gaps_are_bridged() {
        let records = set(vec![
            rec("2019-06-01", "4W", "Tata", 200),
            rec("2022-06-01", "4W", "Tata", 100),
        ]);
        let yoy = compute_yoy(&records);
        assert_eq!(yoy.len(), 1);
        assert_eq!(yoy[0].year, 2022);
        assert_eq!(yoy[0].previous_year, 2019);
        assert_eq!(yoy[0].yoy_growth_pct, -50.0);
    }

    #[test]
    fn duplicate_keys_are_summed() {
        let records = set(vec![
            rec("2021-03-01", "4W", "Acme", 60),
            rec("2021-03-01", "4W", "Acme", 40),
            rec("2022-03-01", "4W", "Acme", 120),
        ]);
        let yoy = compute_yoy(&records);
        assert_eq!(yoy[0].previous_total, 100);
        assert_eq!(yoy[0].current_total, 120);
        assert_eq!(yoy[0].yoy_growth_pct, 20.0);
    }

    #[test]
    fn output_ignores_input_order() {
        let rows = vec![
            rec("2022-01-01", "4W", "Tata", 9),
            rec("2020-04-01", "2W", "Hero", 11),
            rec("2021-07-01", "4W", "Tata", 7),
            rec("2021-04-01", "2W", "Hero", 13),
            rec("2020-10-01", "4W", "Tata", 3),
            rec("2022-04-01", "2W", "Hero", 17),
        ];
        let mut reversed = rows.clone();
        reversed.reverse();

        let a = GrowthTables::compute(&set(rows));
        let b = GrowthTables::compute(&set(reversed));
        assert_eq!(a, b);
        assert_eq!(a.yoy[0].category, "2W");
        assert_eq!(a.yoy.last().unwrap().category, "4W");
    }

    #[test]
    fn current_total_matches_yearly_sum() {
        let rows = vec![
            rec("2020-01-15", "2W", "TVS", 5),
            rec("2021-02-15", "2W", "TVS", 6),
            rec("2021-08-15", "2W", "TVS", 7),
            rec("2021-12-15", "2W", "TVS", 8),
            rec("2021-12-15", "2W", "Yamaha", 100),
        ];
        let records = set(rows);
        for g in compute_yoy(&records) {
            let expected: u64 = records
                .iter()
                .filter(|r| {
                    r.category() == g.category
                        && r.manufacturer() == g.manufacturer
                        && r.year() == g.year
                })
                .map(|r| r.registrations())
                .sum();
            assert_eq!(g.current_total, expected);
        }
    }

    #[test]
    fn partitions_are_independent() {
        let records = set(vec![
            rec("2021-01-01", "2W", "Bajaj", 10),
            rec("2022-01-01", "2W", "Bajaj", 20),
            rec("2021-01-01", "3W", "Bajaj", 10),
            rec("2022-01-01", "3W", "Bajaj", 5),
        ]);
        let yoy = compute_yoy(&records);
        assert_eq!(yoy.len(), 2);
        assert_eq!((yoy[0].category.as_str(), yoy[0].yoy_growth_pct), ("2W", 100.0));
        assert_eq!((yoy[1].category.as_str(), yoy[1].yoy_growth_pct), ("3W", -50.0));
    }

    #[test]
    fn empty_input_is_empty_output() {
        let tables = GrowthTables::compute(&RecordSet::default());
        assert!(tables.yoy.is_empty());
        assert!(tables.qoq.is_empty());
    }

    #[test]
    fn growth_pct_guard() {
        assert_eq!(growth_pct(0, 0), 0.0);
        assert_eq!(growth_pct(5, 0), 0.0);
        assert_eq!(growth_pct(0, 5), -100.0);
    }
}
