// Failure classes for a collection run.  The caller decides what each class means for the process
// (exit code, retry by the invoking timer, ...); nothing in here retries.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration: {0}")]
    Config(String),

    #[error("Data source: {0}")]
    DataSource(String),

    /// The identity-attribute directory could not answer for a user.  This is fatal for the run
    /// when the dimension is enabled.
    #[error("Directory lookup for user `{user}`: {reason}")]
    Directory { user: String, reason: String },

    #[error("Extraction: {0}")]
    Extraction(#[from] ParseError),

    #[error("Output sink: {0}")]
    Sink(#[from] std::io::Error),
}

/// Errors from the resource descriptor parsers.

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("job {job_id}: resource allocation `{descriptor}` does not start with cpu=<n>,mem=<size><M|G>")]
    TresAlloc { job_id: u32, descriptor: String },
}

pub type Result<T> = std::result::Result<T, Error>;
