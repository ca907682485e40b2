//! Growth analytics core for vehicle-registration data.
//!
//! Loads registration records, derives year-over-year and
//! quarter-over-quarter growth per (category, manufacturer), caches the
//! derived tables behind a TTL, and answers read-only dashboard queries.

pub mod cache;
pub mod config;
pub mod error;
pub mod frame;
pub mod growth;
pub mod loader;
pub mod query;
pub mod record;
pub mod schema;

#[cfg(feature = "python")]
mod python;

pub use cache::{AggregationCache, CsvFileSource, RecordSource, Snapshot, StaticSource};
pub use config::{DashboardConfig, RowPolicy};
pub use error::{Result, VehRegError};
pub use growth::{compute_qoq, compute_yoy, GrowthTables, QoqGrowth, YoyGrowth};
pub use loader::{LoadOptions, RecordLoader};
pub use query::{KeyMetrics, UiState};
pub use record::{Period, RecordSet, RegistrationRecord};

#[cfg(feature = "python")]
mod py_module {
    use pyo3::prelude::*;
    use pyo3::types::PyModule;

    use crate::python::PyRegistrationDashboard;
    use crate::schema;

    /// Export schema constants as Python submodules
    fn add_schema_exports(m: &Bound<'_, PyModule>) -> PyResult<()> {
        // Records
        let record = PyModule::new(m.py(), "record")?;
        record.add("DATE", schema::record::DATE)?;
        record.add("CATEGORY", schema::record::CATEGORY)?;
        record.add("MANUFACTURER", schema::record::MANUFACTURER)?;
        record.add("REGISTRATIONS", schema::record::REGISTRATIONS)?;
        record.add("YEAR", schema::record::YEAR)?;
        record.add("QUARTER", schema::record::QUARTER)?;
        record.add("MONTH", schema::record::MONTH)?;
        m.add_submodule(&record)?;

        // Growth tables
        let growth = PyModule::new(m.py(), "growth")?;
        growth.add("CATEGORY", schema::growth::CATEGORY)?;
        growth.add("MANUFACTURER", schema::growth::MANUFACTURER)?;
        growth.add("YEAR", schema::growth::YEAR)?;
        growth.add("QUARTER", schema::growth::QUARTER)?;
        growth.add("PERIOD", schema::growth::PERIOD)?;
        growth.add("PREVIOUS_YEAR", schema::growth::PREVIOUS_YEAR)?;
        growth.add("PREVIOUS_PERIOD", schema::growth::PREVIOUS_PERIOD)?;
        growth.add("CURRENT_TOTAL", schema::growth::CURRENT_TOTAL)?;
        growth.add("PREVIOUS_TOTAL", schema::growth::PREVIOUS_TOTAL)?;
        growth.add("YOY_GROWTH_PCT", schema::growth::YOY_GROWTH_PCT)?;
        growth.add("QOQ_GROWTH_PCT", schema::growth::QOQ_GROWTH_PCT)?;
        m.add_submodule(&growth)?;

        // Category summary
        let summary = PyModule::new(m.py(), "summary")?;
        summary.add("CATEGORY", schema::summary::CATEGORY)?;
        summary.add("YEAR", schema::summary::YEAR)?;
        summary.add("TOTAL_REGISTRATIONS", schema::summary::TOTAL_REGISTRATIONS)?;
        summary.add("ROW_COUNT", schema::summary::ROW_COUNT)?;
        m.add_submodule(&summary)?;

        // Categories
        let category = PyModule::new(m.py(), "category")?;
        category.add("KNOWN", schema::category::KNOWN.to_vec())?;
        m.add_submodule(&category)?;

        Ok(())
    }

    #[pymodule]
    fn vehreg(m: &Bound<'_, PyModule>) -> PyResult<()> {
        m.add_class::<PyRegistrationDashboard>()?;
        add_schema_exports(m)?;
        Ok(())
    }
}
