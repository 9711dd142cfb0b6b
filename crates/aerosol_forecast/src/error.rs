//! Error types for acquiring, decoding and slicing a forecast.

use thiserror::Error;

/// Every failure in this crate is fatal for the viewing session: nothing is retried.
#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The archive answered with a non-success status code.
    #[error("archive returned HTTP {status} for {url}: {body}")]
    Archive {
        status: u16,
        url: String,
        body: String,
    },

    /// The archive accepted the request but the retrieval job did not succeed.
    #[error("retrieval job {job_id} ended with status '{status}': {detail}")]
    JobFailed {
        job_id: String,
        status: String,
        detail: String,
    },

    #[error("no archive credentials: {0}")]
    Credentials(String),

    #[error("invalid archive URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("failed to (de)serialize archive JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The downloaded file could not be decoded as GRIB.
    #[error("failed to decode GRIB message {index}: {reason}")]
    Decode { index: usize, reason: String },

    /// The file decoded, but held nothing on isobaric levels.
    #[error("no isobaric messages found in {0}")]
    EmptyField(String),

    #[error("messages in one file have different grid shapes: {expected:?} vs {found:?}")]
    GridMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    /// A selection that does not belong to the field's own axes.
    #[error("cannot resolve selection: {0}")]
    Selection(String),
}

impl ForecastError {
    pub(crate) fn decode(index: usize, reason: impl Into<String>) -> Self {
        Self::Decode {
            index,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ForecastError>;
