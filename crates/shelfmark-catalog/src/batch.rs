//! Bulk identifier lookups that fill the record cache.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

use crate::catalog::{IdType, LookupRequest};
use crate::error::{CatalogError, Result};
use crate::identifiers::{isbn, looks_like_isbn, looks_like_vendor_id};
use crate::resolver::IdentificationResolver;

/// Ids per `ItemLookup`; the service's ceiling for comma-joined ids.
pub const CHUNK_SIZE: usize = 10;

static SEPARATOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[,;\s]+").unwrap());

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// New cache entries.
    pub written: usize,
    /// Results whose key was already cached.
    pub skipped: usize,
    /// Results with no usable key, or that could not be written.
    pub lost: usize,
    pub failed_chunks: usize,
}

impl BatchReport {
    pub fn merge(&mut self, other: BatchReport) {
        self.written += other.written;
        self.skipped += other.skipped;
        self.lost += other.lost;
        self.failed_chunks += other.failed_chunks;
    }
}

/// Identifier list split into ISBNs and vendor ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchPlan {
    pub isbns: Vec<String>,
    pub vendor_ids: Vec<String>,
    pub unrecognized: Vec<String>,
}

/// Split on commas, semicolons and whitespace.
pub fn split_identifiers(text: &str) -> Vec<String> {
    SEPARATOR_RE
        .split(text)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn plan(text: &str) -> BatchPlan {
    let mut plan = BatchPlan::default();
    for id in split_identifiers(text) {
        if looks_like_isbn(&id) {
            plan.isbns.push(id);
        } else if looks_like_vendor_id(&id) {
            plan.vendor_ids.push(id);
        } else {
            plan.unrecognized.push(id);
        }
    }
    plan
}

impl IdentificationResolver {
    /// Look `ids` up in chunks and write every result to the record cache,
    /// keyed by ISBN for ISBN batches when the result has one, else by vendor
    /// id. A failing chunk is logged and counted; only configuration errors
    /// stop the batch.
    pub async fn bulk_lookup(&self, ids: &[String], kind: IdType) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        let limit = self.default_timeout();
        let vendor_key = self.mapper().vendor_id_key();

        for chunk in ids.chunks(CHUNK_SIZE) {
            let request = match kind {
                IdType::Asin => LookupRequest::asin(chunk.join(",")),
                IdType::Isbn => {
                    let joined = chunk
                        .iter()
                        .map(|id| isbn::strip(id))
                        .collect::<Vec<_>>()
                        .join(",");
                    LookupRequest::isbn(joined, self.search_index())
                }
            };

            let products = match self.lookup(&request, limit).await {
                Ok(products) => products,
                Err(e @ CatalogError::Configuration(_)) => return Err(e),
                Err(e) => {
                    warn!(
                        ids = %request.item_id,
                        code = %e.fault_code(),
                        "batch chunk failed: {e}"
                    );
                    report.failed_chunks += 1;
                    continue;
                }
            };

            for product in &products {
                let record = self.mapper().map(product);
                let key = match kind {
                    IdType::Isbn => record.identifiers.isbn(),
                    IdType::Asin => None,
                }
                .or_else(|| record.identifiers.vendor_id(vendor_key));
                let Some(key) = key else {
                    warn!(title = %record.title, "batch result has no identifier");
                    report.lost += 1;
                    continue;
                };
                match self.records().put_if_absent(key, &record) {
                    Ok(true) => report.written += 1,
                    Ok(false) => report.skipped += 1,
                    Err(e) => {
                        warn!(%key, "failed to cache batch result: {e}");
                        report.lost += 1;
                    }
                }
            }
        }

        info!(
            kind = kind.as_str(),
            written = report.written,
            skipped = report.skipped,
            lost = report.lost,
            failed_chunks = report.failed_chunks,
            "batch lookup finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use shelfmark_core::{CanonicalRecord, LookupConfig};
    use tempfile::TempDir;

    use super::*;
    use crate::cache::{DiskRecordCache, MemoryCoverUrlCache};
    use crate::catalog::fake::{FakeCatalog, product};
    use crate::catalog::{ProductRecord, XmlNode};
    use crate::error::ApiFault;

    fn resolver(catalog: Arc<FakeCatalog>, dir: &TempDir) -> IdentificationResolver {
        let mut config = LookupConfig::default();
        config.catalog.max_qps = 0.0;
        IdentificationResolver::new(
            &config,
            catalog,
            Arc::new(DiskRecordCache::new(dir.path())),
            Arc::new(MemoryCoverUrlCache::new()),
        )
        .unwrap()
    }

    #[test]
    fn plan_classifies_tokens() {
        let plan = plan("0982514506, B0085UEQDO;9780306406157\n\tfoo ,,");
        assert_eq!(plan.isbns, vec!["0982514506", "9780306406157"]);
        assert_eq!(plan.vendor_ids, vec!["B0085UEQDO"]);
        assert_eq!(plan.unrecognized, vec!["foo"]);
        assert!(split_identifiers("  ").is_empty());
    }

    #[tokio::test]
    async fn vendor_ids_are_chunked_by_ten() {
        let ids: Vec<String> = (1..=12).map(|n| format!("B00000{n:04}")).collect();
        let first_chunk = ids[..10].join(",");
        let second_chunk = ids[10..].join(",");

        let orphan = || {
            ProductRecord::new(
                XmlNode::parse("<Item><ItemAttributes><Title>Orphan</Title></ItemAttributes></Item>")
                    .unwrap(),
            )
        };
        let catalog = Arc::new(
            FakeCatalog::new()
                .on_lookup(&first_chunk, move || {
                    Ok(vec![
                        product("B000000001", "One", "Kindle Edition", ""),
                        product("B000000002", "Two", "Kindle Edition", ""),
                        orphan(),
                    ])
                })
                .on_lookup(&second_chunk, || {
                    Err(CatalogError::Throttled(ApiFault::new("RequestThrottled", "")))
                }),
        );
        let dir = TempDir::new().unwrap();
        let resolver = resolver(catalog.clone(), &dir);
        resolver
            .records()
            .put_if_absent("B000000002", &CanonicalRecord::new("Already", vec![]))
            .unwrap();

        let report = resolver.bulk_lookup(&ids, IdType::Asin).await.unwrap();
        assert_eq!(
            report,
            BatchReport {
                written: 1,
                skipped: 1,
                lost: 1,
                failed_chunks: 1,
            }
        );
        let calls = catalog.lookup_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].item_id, first_chunk);
        assert_eq!(calls[1].item_id, second_chunk);
        assert_eq!(resolver.records().get("B000000002").unwrap().title, "Already");
    }

    #[tokio::test]
    async fn isbn_batch_keys_by_normalized_isbn() {
        let catalog = Arc::new(FakeCatalog::new().on_lookup("0982514506", || {
            let xml = "<Item><ASIN>B0085UEQDO</ASIN><ItemAttributes><Title>T</Title>\
                       <ISBN>0982514506</ISBN></ItemAttributes></Item>";
            Ok(vec![ProductRecord::new(XmlNode::parse(xml).unwrap())])
        }));
        let dir = TempDir::new().unwrap();
        let resolver = resolver(catalog.clone(), &dir);

        let report = resolver
            .bulk_lookup(&["0-9825145-0-6".to_string()], IdType::Isbn)
            .await
            .unwrap();
        assert_eq!(report.written, 1);
        assert!(resolver.records().get("9780982514504").is_some());
        assert!(resolver.records().get("B0085UEQDO").is_none());

        let calls = catalog.lookup_calls();
        assert_eq!(calls[0].id_type, IdType::Isbn);
        assert_eq!(calls[0].search_index.as_deref(), Some("KindleStore"));
    }

    #[test]
    fn reports_merge() {
        let mut total = BatchReport {
            written: 1,
            ..Default::default()
        };
        total.merge(BatchReport {
            written: 2,
            failed_chunks: 1,
            ..Default::default()
        });
        assert_eq!(total.written, 3);
        assert_eq!(total.failed_chunks, 1);
    }
}
