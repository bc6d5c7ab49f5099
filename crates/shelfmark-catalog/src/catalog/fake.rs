//! In-memory `Catalog` for resolver and pager tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::response::{XmlNode, fixtures};
use super::{Catalog, LookupRequest, ProductRecord, SearchPage, SearchRequest};
use crate::error::{ApiFault, CatalogError, Result};

type LookupFn = Box<dyn Fn() -> Result<Vec<ProductRecord>> + Send + Sync>;
type PageFn = Box<dyn Fn(u32) -> Result<SearchPage> + Send + Sync>;

pub fn product(asin: &str, title: &str, binding: &str, extra: &str) -> ProductRecord {
    ProductRecord::new(XmlNode::parse(&fixtures::item(asin, title, binding, extra)).unwrap())
}

pub fn not_found() -> CatalogError {
    CatalogError::ItemNotFound(ApiFault::new(
        "AWS.ECommerceService.NoExactMatches",
        "no match",
    ))
}

#[derive(Default)]
pub struct FakeCatalog {
    lookups: HashMap<String, LookupFn>,
    search: Option<PageFn>,
    lookup_calls: Mutex<Vec<LookupRequest>>,
    search_calls: Mutex<Vec<(SearchRequest, u32)>>,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_lookup<F>(mut self, item_id: &str, f: F) -> Self
    where
        F: Fn() -> Result<Vec<ProductRecord>> + Send + Sync + 'static,
    {
        self.lookups.insert(item_id.to_string(), Box::new(f));
        self
    }

    pub fn on_search<F>(mut self, f: F) -> Self
    where
        F: Fn(u32) -> Result<SearchPage> + Send + Sync + 'static,
    {
        self.search = Some(Box::new(f));
        self
    }

    pub fn lookup_calls(&self) -> Vec<LookupRequest> {
        self.lookup_calls.lock().unwrap().clone()
    }

    pub fn search_calls(&self) -> Vec<(SearchRequest, u32)> {
        self.search_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Catalog for FakeCatalog {
    async fn lookup(&self, request: &LookupRequest) -> Result<Vec<ProductRecord>> {
        self.lookup_calls.lock().unwrap().push(request.clone());
        match self.lookups.get(&request.item_id) {
            Some(f) => f(),
            None => Err(not_found()),
        }
    }

    async fn search_page(&self, request: &SearchRequest, page: u32) -> Result<SearchPage> {
        self.search_calls
            .lock()
            .unwrap()
            .push((request.clone(), page));
        match &self.search {
            Some(f) => f(page),
            None => Err(CatalogError::SearchFailed(ApiFault::new(
                "AWS.ECommerceService.NoExactMatches",
                "no match",
            ))),
        }
    }
}
