use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyDict;
use pyo3_polars::PyDataFrame;

use crate::cache::{AggregationCache, Snapshot};
use crate::config::{DashboardConfig, RowPolicy};
use crate::frame;
use crate::query::{self, KeyMetrics, UiState};

/// Python-facing handle over the aggregation cache.
///
/// Every accessor goes through the cache, so results are refreshed on TTL
/// expiry, after `invalidate()`, or when the CSV file changes.
#[pyclass(name = "RegistrationDashboard")]
pub struct PyRegistrationDashboard {
    cache: AggregationCache,
}

#[pymethods]
impl PyRegistrationDashboard {
    #[new]
    #[pyo3(signature = (data_path, cache_ttl_secs=300, row_policy="reject"))]
    fn new(data_path: String, cache_ttl_secs: u64, row_policy: &str) -> PyResult<Self> {
        let row_policy = match row_policy {
            "reject" => RowPolicy::Reject,
            "skip" => RowPolicy::Skip,
            other => {
                return Err(PyValueError::new_err(format!(
                    "Invalid row_policy: '{}'. Must be 'reject' or 'skip'",
                    other
                )))
            }
        };
        let config = DashboardConfig {
            data_path: data_path.into(),
            cache_ttl: Duration::from_secs(cache_ttl_secs),
            row_policy,
            ..DashboardConfig::default()
        };
        config.validate().map_err(crate::error::VehRegError::from)?;
        Ok(Self {
            cache: AggregationCache::from_config(&config),
        })
    }

    /// Build from a YAML config file.
    #[staticmethod]
    fn from_config(path: &str) -> PyResult<Self> {
        let config = DashboardConfig::from_file(path).map_err(crate::error::VehRegError::from)?;
        Ok(Self {
            cache: AggregationCache::from_config(&config),
        })
    }

    // ── Tables ──────────────────────────────────────────────────────────────

    fn records(&self, py: Python<'_>) -> PyResult<PyDataFrame> {
        let snapshot = self.snapshot(py)?;
        Ok(PyDataFrame(frame::records_frame(snapshot.records())?))
    }

    fn yoy(&self, py: Python<'_>) -> PyResult<PyDataFrame> {
        let snapshot = self.snapshot(py)?;
        Ok(PyDataFrame(frame::yoy_frame(snapshot.yoy())?))
    }

    fn qoq(&self, py: Python<'_>) -> PyResult<PyDataFrame> {
        let snapshot = self.snapshot(py)?;
        Ok(PyDataFrame(frame::qoq_frame(snapshot.qoq())?))
    }

    fn category_summary(&self, py: Python<'_>) -> PyResult<PyDataFrame> {
        let snapshot = self.snapshot(py)?;
        let rows = query::category_summary(snapshot.records());
        Ok(PyDataFrame(frame::category_summary_frame(&rows)?))
    }

    // ── Queries ─────────────────────────────────────────────────────────────

    /// Records matching the selection. Omitted arguments do not restrict.
    #[pyo3(signature = (categories=None, manufacturers=None, start=None, end=None))]
    fn filtered_records(
        &self,
        py: Python<'_>,
        categories: Option<Vec<String>>,
        manufacturers: Option<Vec<String>>,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> PyResult<PyDataFrame> {
        let snapshot = self.snapshot(py)?;
        let ui = ui_state(&snapshot, categories, manufacturers, start, end);
        Ok(PyDataFrame(frame::records_frame(&ui.apply(snapshot.records()))?))
    }

    #[pyo3(signature = (categories=None, manufacturers=None, start=None, end=None))]
    fn key_metrics<'py>(
        &self,
        py: Python<'py>,
        categories: Option<Vec<String>>,
        manufacturers: Option<Vec<String>>,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> PyResult<Bound<'py, PyDict>> {
        let snapshot = self.snapshot(py)?;
        let ui = ui_state(&snapshot, categories, manufacturers, start, end);
        let metrics = KeyMetrics::compute(snapshot.records(), snapshot.yoy(), snapshot.qoq(), &ui);

        let dict = PyDict::new(py);
        dict.set_item("total_registrations", metrics.total_registrations)?;
        dict.set_item("avg_yoy_growth_pct", metrics.avg_yoy_growth_pct)?;
        dict.set_item("avg_qoq_growth_pct", metrics.avg_qoq_growth_pct)?;
        dict.set_item("top_category", metrics.top_category)?;
        Ok(dict)
    }

    #[pyo3(signature = (n=10, categories=None))]
    fn top_yoy(
        &self,
        py: Python<'_>,
        n: usize,
        categories: Option<Vec<String>>,
    ) -> PyResult<PyDataFrame> {
        let snapshot = self.snapshot(py)?;
        let ui = ui_state(&snapshot, categories, None, None, None);
        let top: Vec<_> = query::top_yoy_performers(ui.yoy_rows(snapshot.yoy()), n)
            .into_iter()
            .cloned()
            .collect();
        Ok(PyDataFrame(frame::yoy_frame(&top)?))
    }

    #[pyo3(signature = (by, categories=None, manufacturers=None, start=None, end=None))]
    fn group_and_sum(
        &self,
        py: Python<'_>,
        by: Vec<String>,
        categories: Option<Vec<String>>,
        manufacturers: Option<Vec<String>>,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> PyResult<PyDataFrame> {
        let snapshot = self.snapshot(py)?;
        let ui = ui_state(&snapshot, categories, manufacturers, start, end);
        let df = frame::records_frame(&ui.apply(snapshot.records()))?;
        let by: Vec<&str> = by.iter().map(String::as_str).collect();
        let out = frame::group_and_sum_frame(&df, &by, crate::schema::record::REGISTRATIONS)?;
        Ok(PyDataFrame(out))
    }

    // ── Cache control ───────────────────────────────────────────────────────

    /// Force the next access to reload and recompute.
    fn invalidate(&self) {
        self.cache.invalidate();
    }

    #[getter]
    fn snapshot_id(&self, py: Python<'_>) -> PyResult<String> {
        Ok(self.snapshot(py)?.id().to_string())
    }
}

impl PyRegistrationDashboard {
    fn snapshot(&self, py: Python<'_>) -> PyResult<Arc<Snapshot>> {
        let cache = &self.cache;
        py.allow_threads(|| cache.get()).map_err(PyErr::from)
    }
}

fn ui_state(
    snapshot: &Snapshot,
    categories: Option<Vec<String>>,
    manufacturers: Option<Vec<String>>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> UiState {
    let bounds = snapshot.records().date_bounds();
    let date_range = match (start, end, bounds) {
        (None, None, _) => None,
        (Some(s), Some(e), _) => Some((s, e)),
        (Some(s), None, Some((_, max))) => Some((s, max)),
        (None, Some(e), Some((min, _))) => Some((min, e)),
        // no records: nothing to bound against
        (_, _, None) => None,
    };
    UiState {
        categories: categories.map(|c| c.into_iter().collect::<BTreeSet<_>>()),
        manufacturers: manufacturers.map(|m| m.into_iter().collect::<BTreeSet<_>>()),
        date_range,
    }
}
