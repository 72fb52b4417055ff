//! Library error type.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The submit response had no `allURLs` list.
    #[error("response from `{url}` did not contain `allURLs`")]
    NoResultUrl { url: String },

    /// `allURLs` was present but none of the entries was an async result URL.
    #[error("no async result URL among {urls:?}")]
    NoAsyncUrl { urls: Vec<String> },

    /// Every table handed to the merge was missing or undecodable.
    #[error("no decodable data in any result file")]
    AllEmpty,

    #[error("request to `{url}` failed with status {status}")]
    Status { url: String, status: u16 },

    #[error("missing credentials: set OOI_USERNAME and OOI_TOKEN")]
    Credentials,

    #[error("decode failed: {0}")]
    Decode(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Regex(#[from] regex::Error),

    #[error(transparent)]
    Arrow(#[from] arrow::error::ArrowError),

    #[error(transparent)]
    Parquet(#[from] parquet::errors::ParquetError),
}
