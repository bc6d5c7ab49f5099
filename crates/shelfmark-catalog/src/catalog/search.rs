use tracing::debug;

use super::{Catalog, ProductRecord, SearchRequest};
use crate::error::{CatalogError, Result};

/// Lazy page-by-page walk over one `ItemSearch`.
///
/// Ends when the reported `TotalPages` is reached, on an empty page, on
/// `NoMoreResultPages`, or after `max_pages`. Once exhausted it stays
/// exhausted. A `Throttled` error leaves the cursor in place so the same page
/// can be requested again.
pub struct SearchPages<'a> {
    catalog: &'a dyn Catalog,
    request: SearchRequest,
    next: u32,
    max_pages: Option<u32>,
    done: bool,
}

impl<'a> SearchPages<'a> {
    pub fn new(catalog: &'a dyn Catalog, request: SearchRequest) -> Self {
        Self {
            catalog,
            request,
            next: 1,
            max_pages: None,
            done: false,
        }
    }

    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = Some(max_pages);
        self
    }

    pub fn is_exhausted(&self) -> bool {
        self.done
    }

    /// Next page of records, `Ok(None)` once the sequence has ended.
    pub async fn next_page(&mut self) -> Result<Option<Vec<ProductRecord>>> {
        if self.done {
            return Ok(None);
        }
        if self.max_pages.is_some_and(|max| self.next > max) {
            self.done = true;
            return Ok(None);
        }

        let page = self.next;
        match self.catalog.search_page(&self.request, page).await {
            Ok(result) => {
                self.next += 1;
                let last = result.items.is_empty()
                    || result.total_pages.is_some_and(|total| total <= page);
                if last {
                    self.done = true;
                }
                debug!(page, count = result.items.len(), last, "search page");
                if result.items.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(result.items))
                }
            }
            Err(CatalogError::NoMoreResultPages(_)) => {
                self.done = true;
                Ok(None)
            }
            Err(e @ CatalogError::Throttled(_)) => Err(e),
            Err(e) => {
                self.done = true;
                Err(e)
            }
        }
    }

    /// Drain every remaining page.
    pub async fn collect_all(mut self) -> Result<Vec<ProductRecord>> {
        let mut all = Vec::new();
        while let Some(items) = self.next_page().await? {
            all.extend(items);
        }
        Ok(all)
    }
}
