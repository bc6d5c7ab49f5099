use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Vendor error code and message as reported by the catalog service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiFault {
    pub code: String,
    pub message: String,
}

impl ApiFault {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ApiFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid request ({0})")]
    InvalidRequest(ApiFault),

    #[error("item not found ({0})")]
    ItemNotFound(ApiFault),

    #[error("no more result pages ({0})")]
    NoMoreResultPages(ApiFault),

    #[error("request throttled ({0})")]
    Throttled(ApiFault),

    #[error("search failed ({0})")]
    SearchFailed(ApiFault),

    /// Non-2xx response without a readable catalog document.
    #[error("server error ({0})")]
    Server(ApiFault),

    #[error("invalid ISBN: {0}")]
    InvalidIsbn(String),

    #[error("catalog call timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("cache error: {0}")]
    Cache(String),
}

impl CatalogError {
    /// The vendor fault carried by API-reported errors.
    pub fn fault(&self) -> Option<&ApiFault> {
        match self {
            Self::InvalidRequest(f)
            | Self::ItemNotFound(f)
            | Self::NoMoreResultPages(f)
            | Self::Throttled(f)
            | Self::SearchFailed(f)
            | Self::Server(f) => Some(f),
            _ => None,
        }
    }

    /// Vendor code for API faults, a synthetic code for local failures.
    pub fn fault_code(&self) -> String {
        if let Some(fault) = self.fault() {
            return fault.code.clone();
        }
        match self {
            Self::Configuration(_) => "Configuration",
            Self::InvalidIsbn(_) => "InvalidIsbn",
            Self::Timeout(_) => "Timeout",
            Self::Http(_) => "Http",
            Self::Parse(_) => "Parse",
            Self::Cache(_) => "Cache",
            _ => "Unknown",
        }
        .to_string()
    }

    /// Faults after which resolution may fall back to title/author search.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ItemNotFound(_) | Self::InvalidRequest(_))
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
