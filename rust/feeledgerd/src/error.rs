use crate::status::FeeStatus;

#[derive(Debug, thiserror::Error)]
pub enum FeeError {
    #[error("no academic year is marked as current")]
    NoActiveAcademicYear,

    #[error("invalid billing period: {0}")]
    InvalidPeriod(String),

    #[error("cannot move fee from {from} to {to}")]
    InvalidTransition { from: FeeStatus, to: FeeStatus },

    #[error("unknown fee status: {0}")]
    UnknownStatus(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Validation(String),

    #[error("fee settings are unreadable: {0}")]
    Settings(String),

    #[error("bad decimal value: {0}")]
    Decimal(#[from] rust_decimal::Error),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
}

impl FeeError {
    /// Stable code used in sidecar error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            FeeError::NoActiveAcademicYear => "no_active_academic_year",
            FeeError::InvalidPeriod(_) => "bad_params",
            FeeError::InvalidTransition { .. } => "invalid_transition",
            FeeError::UnknownStatus(_) => "bad_params",
            FeeError::NotFound(_) => "not_found",
            FeeError::Validation(_) => "bad_params",
            FeeError::Settings(_) => "settings_invalid",
            FeeError::Decimal(_) => "bad_params",
            FeeError::Db(_) => "db_query_failed",
        }
    }
}

pub type FeeResult<T> = Result<T, FeeError>;
