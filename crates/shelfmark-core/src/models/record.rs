use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::identifiers::IdentifierSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesInfo {
    pub name: String,
    pub index: u32,
}

/// Normalized bibliographic record produced from one catalog item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub title: String,

    #[serde(default)]
    pub authors: Vec<String>,

    #[serde(default)]
    pub identifiers: IdentifierSet,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub languages: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pubdate: Option<NaiveDate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series: Option<SeriesInfo>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,

    /// Position among the results of one query; 0 when order carries no meaning.
    #[serde(default)]
    pub source_relevance: usize,
}

impl CanonicalRecord {
    pub fn new(title: impl Into<String>, authors: Vec<String>) -> Self {
        Self {
            title: title.into(),
            authors,
            ..Default::default()
        }
    }

    pub fn with_relevance(mut self, rank: usize) -> Self {
        self.source_relevance = rank;
        self
    }
}
