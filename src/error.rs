use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Why a single page could not be retrieved. Never fatal for the crawl.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("page {page}: marker element did not appear within {waited:?}")]
    Timeout { page: u32, waited: Duration },

    #[error("page {page}: element '{marker}' vanished after the wait")]
    ElementNotFound { page: u32, marker: String },

    #[error("page {page}: {message}")]
    Unknown { page: u32, message: String },
}

impl FetchError {
    pub fn page(&self) -> u32 {
        match self {
            Self::Timeout { page, .. }
            | Self::ElementNotFound { page, .. }
            | Self::Unknown { page, .. } => *page,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::ElementNotFound { .. } => "element_not_found",
            Self::Unknown { .. } => "unknown",
        }
    }
}

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("invalid marker: {0}")]
    InvalidMarker(String),

    #[error("invalid url template '{template}': {source}")]
    InvalidUrl {
        template: String,
        #[source]
        source: url::ParseError,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("CSV error on {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("identity column '{column}' not found (available: {available:?})")]
    MissingIdentityColumn {
        column: String,
        available: Vec<String>,
    },

    #[error("none of the component columns are present: {wanted:?}")]
    NoComponentColumnsAvailable { wanted: Vec<String> },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("CSV error on {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}
