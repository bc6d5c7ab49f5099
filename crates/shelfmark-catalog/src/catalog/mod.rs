//! Product-catalog API: request signing, the HTTP client, response model and
//! search paging.

pub mod client;
#[cfg(test)]
pub(crate) mod fake;
pub mod response;
pub mod search;
pub mod signer;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;

use crate::error::Result;

pub use client::CatalogClient;
pub use response::{AlternateVersion, ProductRecord, XmlNode};
pub use search::SearchPages;
pub use signer::{RequestSigner, SignedRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ItemLookup,
    ItemSearch,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ItemLookup => "ItemLookup",
            Self::ItemSearch => "ItemSearch",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdType {
    Asin,
    Isbn,
}

impl IdType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asin => "ASIN",
            Self::Isbn => "ISBN",
        }
    }
}

/// Operation plus named parameters. Built per call and never changed once
/// handed to the signer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogQuery {
    operation: Operation,
    params: BTreeMap<String, String>,
}

impl CatalogQuery {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            params: BTreeMap::new(),
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn params(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupRequest {
    /// One id, or up to ten comma-joined ids.
    pub item_id: String,
    pub id_type: IdType,
    /// Required by the service when `id_type` is ISBN.
    pub search_index: Option<String>,
}

impl LookupRequest {
    pub fn asin(item_id: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            id_type: IdType::Asin,
            search_index: None,
        }
    }

    pub fn isbn(item_id: impl Into<String>, search_index: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            id_type: IdType::Isbn,
            search_index: Some(search_index.into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchRequest {
    pub search_index: String,
    pub title: Option<String>,
    pub author: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub items: Vec<ProductRecord>,
    /// `Items/TotalPages` when the service reported it.
    pub total_pages: Option<u32>,
}

/// The two catalog calls resolution needs. `CatalogClient` is the network
/// implementation; tests substitute in-memory fakes.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn lookup(&self, request: &LookupRequest) -> Result<Vec<ProductRecord>>;

    async fn search_page(&self, request: &SearchRequest, page: u32) -> Result<SearchPage>;
}
