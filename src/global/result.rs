use super::error::GrfError;

/// Internal `Result` type alias used by the crate
pub type InternalResult<T> = Result<T, GrfError>;
