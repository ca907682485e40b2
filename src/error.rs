use thiserror::Error;

use crate::config::ConfigError;

pub type Result<T> = std::result::Result<T, VehRegError>;

#[derive(Error, Debug)]
pub enum VehRegError {
    #[error("Missing column: {0}")]
    Schema(String),

    #[error("Malformed date at row {row}: '{value}'")]
    MalformedDate { row: usize, value: String },

    #[error("Invalid value in column '{column}' at row {row}: {reason}")]
    InvalidValue {
        row: usize,
        column: String,
        reason: String,
    },

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl VehRegError {
    /// True for errors that concern a single row and may be skipped under
    /// a permissive row policy.
    pub fn is_row_error(&self) -> bool {
        matches!(
            self,
            VehRegError::MalformedDate { .. } | VehRegError::InvalidValue { .. }
        )
    }
}

#[cfg(feature = "python")]
impl From<VehRegError> for pyo3::PyErr {
    fn from(err: VehRegError) -> pyo3::PyErr {
        use pyo3::exceptions::{PyIOError, PyRuntimeError, PyValueError};
        match err {
            VehRegError::Io(_) => PyIOError::new_err(err.to_string()),
            VehRegError::Schema(_)
            | VehRegError::MalformedDate { .. }
            | VehRegError::InvalidValue { .. }
            | VehRegError::Config(_) => PyValueError::new_err(err.to_string()),
            VehRegError::Polars(_) => PyRuntimeError::new_err(err.to_string()),
        }
    }
}
