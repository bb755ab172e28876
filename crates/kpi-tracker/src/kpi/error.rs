use super::period::PeriodError;
use super::repository::StoreError;

/// Error raised by the KPI services. Every kind is terminal for the request.
#[derive(Debug, thiserror::Error)]
pub enum KpiError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
    #[error(transparent)]
    Store(StoreError),
}

impl KpiError {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Validation(_) => "validation_error",
            Self::Forbidden(_) => "forbidden",
            Self::Timeout(_) => "timeout",
            Self::Store(_) => "store_unavailable",
        }
    }
}

impl From<StoreError> for KpiError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound => Self::NotFound("record not found".to_string()),
            StoreError::Conflict => Self::Conflict("record already exists".to_string()),
            StoreError::VersionMismatch { .. } => Self::Conflict(
                "entry was modified concurrently, reload and retry".to_string(),
            ),
            other @ StoreError::Unavailable(_) => Self::Store(other),
        }
    }
}

impl From<PeriodError> for KpiError {
    fn from(value: PeriodError) -> Self {
        Self::Validation(value.to_string())
    }
}
