//! Error types for xsec

use thiserror::Error;

/// xsec error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid analysis setup (missing cv universe, mismatched error bands, ...).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Binning is invalid or two histograms being combined disagree on it.
    #[error("Binning error: {0}")]
    Binning(String),

    /// An event is missing a field, or truth was requested on a data event.
    #[error("Data error: {0}")]
    Data(String),

    /// Unfolding could not produce a result.
    #[error("Unfolding error: {0}")]
    Unfolding(String),

    /// Named object is absent from a store.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Computation error
    #[error("Computation error: {0}")]
    Computation(String),
}

impl Error {
    /// True for errors that only concern one extraction item and should not
    /// stop a batch of independent (material, observable) combinations.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Unfolding(_) | Error::NotFound(_) | Error::Computation(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_classification() {
        assert!(Error::Unfolding("singular".into()).is_recoverable());
        assert!(Error::NotFound("h".into()).is_recoverable());
        assert!(!Error::Config("no cv".into()).is_recoverable());
        assert!(!Error::Data("missing field".into()).is_recoverable());
    }

    #[test]
    fn io_error_converts() {
        let e: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(e.to_string().starts_with("I/O error"));
    }
}
