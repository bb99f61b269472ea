//! Process exit codes.

use std::fmt;

/// `xsec event-loop` / `xsec extract` exit statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Arguments could not be parsed.
    BadCmdLine = 1,
    /// Event loop: configuration or event file unusable.
    BadInputFile = 2,
    /// Event loop: reading events failed part way.
    BadFileRead = 3,
    /// Event loop: histogram files could not be written.
    BadOutputFile = 4,
}

/// Exit statuses of `xsec extract`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractStatus {
    /// Data histogram file unusable.
    BadDataFile = 2,
    /// MC histogram file unusable.
    BadMcFile = 3,
    /// At least one (material, observable) pair failed.
    ExtractionFailed = 4,
    /// A result file could not be created (typically: it already exists).
    BadOutputFile = 5,
}

/// An error together with the status the process should exit with.
#[derive(Debug)]
pub struct Failure {
    /// Exit status.
    pub code: u8,
    /// What went wrong.
    pub error: anyhow::Error,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#}", self.error)
    }
}

/// Attach an exit status to an error.
pub trait ExitOn<T> {
    /// Fail with `code` if `self` is an error.
    fn exit_on(self, code: u8) -> Result<T, Failure>;
}

impl<T, E: Into<anyhow::Error>> ExitOn<T> for Result<T, E> {
    fn exit_on(self, code: u8) -> Result<T, Failure> {
        self.map_err(|e| Failure { code, error: e.into() })
    }
}
