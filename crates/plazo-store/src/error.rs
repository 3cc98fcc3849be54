use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("case not found: {0}")]
    CaseNotFound(String),

    #[error("case already exists: {0}")]
    CaseExists(String),

    #[error("case store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt row for case {case_id}: {reason}")]
    Corrupt { case_id: String, reason: String },

    #[cfg(feature = "duckdb")]
    #[error("duckdb error: {0}")]
    DuckDb(#[from] ::duckdb::Error),
}

impl StoreError {
    /// Whether a retry by the delayed-execution facility may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unavailable(_) => true,
            #[cfg(feature = "duckdb")]
            Self::DuckDb(_) => true,
            Self::CaseNotFound(_) | Self::CaseExists(_) | Self::Corrupt { .. } => false,
        }
    }
}
