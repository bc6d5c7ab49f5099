//! Identification: cache check, identifier lookup with edition tie-break,
//! title/author fallback and streamed emission of canonical records.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use shelfmark_core::{CanonicalRecord, IdentifierSet, LookupConfig, LookupKey};

use crate::cache::{CoverUrlStore, DiskCoverUrlCache, DiskRecordCache, RecordStore};
use crate::cancel::AbortSignal;
use crate::catalog::{
    Catalog, CatalogClient, LookupRequest, ProductRecord, SearchPages, SearchRequest,
};
use crate::error::{CatalogError, Result};
use crate::http::{RateLimitedClient, RateLimiter};
use crate::identifiers::isbn;
use crate::mapper::MetadataMapper;
use crate::retry::RetryPolicy;
use crate::tokens;

// ─── Request / outcome types ─────────────────────────────────────────────────

/// What the host knows about a book before identification.
#[derive(Debug, Clone, Default)]
pub struct IdentifyRequest {
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub identifiers: IdentifierSet,
    /// Bound for each catalog call; the configured timeout when absent.
    pub timeout: Option<Duration>,
}

impl IdentifyRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.authors.push(author.into());
        self
    }

    pub fn with_identifier(mut self, kind: impl Into<String>, value: impl Into<String>) -> Self {
        self.identifiers.insert(kind, value);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn title_text(&self) -> Option<&str> {
        self.title.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }
}

/// Terminal state of one identification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Emitted(usize),
    EmptyNoMatch,
    AbandonedOnFault { code: String, message: String },
    InsufficientInput,
}

impl Outcome {
    /// Short message for the host UI; `None` when records were emitted.
    pub fn user_message(&self) -> Option<String> {
        match self {
            Self::Emitted(_) => None,
            Self::EmptyNoMatch => Some("No matching book found in the catalog".to_string()),
            Self::AbandonedOnFault { code, message } if message.is_empty() => {
                Some(format!("Catalog lookup failed ({code})"))
            }
            Self::AbandonedOnFault { code, message } => {
                Some(format!("Catalog lookup failed ({code}): {message}"))
            }
            Self::InsufficientInput => {
                Some("Need an identifier or a title to identify a book".to_string())
            }
        }
    }

    fn abandoned(err: &CatalogError) -> Self {
        Self::AbandonedOnFault {
            code: err.fault_code(),
            message: err
                .fault()
                .map(|f| f.message.clone())
                .unwrap_or_else(|| err.to_string()),
        }
    }
}

/// Collected result of [`IdentificationResolver::identify`].
#[derive(Debug, Clone)]
pub struct Identification {
    pub outcome: Outcome,
    pub records: Vec<CanonicalRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoverOutcome {
    Downloaded { url: String, bytes: Vec<u8> },
    Failed(String),
    Cancelled,
}

// ─── Resolver ────────────────────────────────────────────────────────────────

struct Settings {
    lookup_order: Vec<LookupKey>,
    preferred_binding: String,
    title_search: bool,
    cache_only: bool,
    cache_writes: bool,
    title_joiners: Vec<String>,
    search_index: String,
    max_search_pages: u32,
    timeout: Duration,
}

impl Settings {
    fn from_config(config: &LookupConfig) -> Self {
        let resolution = &config.resolution;
        Self {
            lookup_order: resolution.lookup_order.clone(),
            preferred_binding: resolution.preferred_binding.trim().to_string(),
            title_search: !resolution.disable_title_author_search,
            cache_only: resolution.disable_api_calls,
            cache_writes: config.cache.enabled,
            title_joiners: resolution.title_joiners.clone(),
            search_index: config.catalog.search_index.clone(),
            max_search_pages: config.catalog.max_search_pages.max(1),
            timeout: config.timeout(),
        }
    }
}

pub struct IdentificationResolver {
    catalog: Arc<dyn Catalog>,
    mapper: MetadataMapper,
    records: Arc<dyn RecordStore>,
    covers: Arc<dyn CoverUrlStore>,
    images: RateLimitedClient,
    retry: RetryPolicy,
    settings: Settings,
}

impl IdentificationResolver {
    /// Network catalog plus the on-disk caches under `cache.directory`.
    pub fn from_config(config: &LookupConfig) -> Result<Self> {
        let catalog = Arc::new(CatalogClient::from_config(config)?);
        let records = Arc::new(DiskRecordCache::new(config.records_dir()));
        let covers = Arc::new(DiskCoverUrlCache::new(config.covers_dir()));
        Self::new(config, catalog, records, covers)
    }

    pub fn new(
        config: &LookupConfig,
        catalog: Arc<dyn Catalog>,
        records: Arc<dyn RecordStore>,
        covers: Arc<dyn CoverUrlStore>,
    ) -> Result<Self> {
        Ok(Self {
            catalog,
            mapper: MetadataMapper::from_config(config),
            records,
            covers,
            images: RateLimitedClient::new(RateLimiter::unlimited(), config.timeout())?,
            retry: RetryPolicy::from_config(config),
            settings: Settings::from_config(config),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn catalog(&self) -> &dyn Catalog {
        self.catalog.as_ref()
    }

    pub fn records(&self) -> &dyn RecordStore {
        self.records.as_ref()
    }

    pub fn mapper(&self) -> &MetadataMapper {
        &self.mapper
    }

    pub(crate) fn search_index(&self) -> &str {
        &self.settings.search_index
    }

    pub(crate) fn default_timeout(&self) -> Duration {
        self.settings.timeout
    }

    /// Resolve `req`, sending each record on `tx` as soon as it is mapped.
    ///
    /// Only configuration problems are returned as `Err`; every other failure
    /// ends in an [`Outcome`].
    pub async fn identify_streaming(
        &self,
        req: &IdentifyRequest,
        abort: &AbortSignal,
        tx: mpsc::UnboundedSender<CanonicalRecord>,
    ) -> Result<Outcome> {
        let title = req.title_text();
        let keys = cache_keys(&req.identifiers, self.mapper.vendor_id_key());
        if keys.is_empty() && title.is_none() {
            info!("nothing to identify: no identifier and no title");
            return Ok(Outcome::InsufficientInput);
        }

        if let Some(record) = keys.iter().find_map(|key| self.records.get(key)) {
            info!(title = %record.title, "identified from cache");
            self.remember(&record);
            return Ok(match tx.send(record.with_relevance(0)) {
                Ok(()) => Outcome::Emitted(1),
                Err(_) => Outcome::Emitted(0),
            });
        }

        if self.settings.cache_only {
            info!("cache miss with catalog calls disabled");
            return Ok(Outcome::EmptyNoMatch);
        }

        let limit = req.timeout.unwrap_or(self.settings.timeout);
        let mut products = Vec::new();

        if let Some(lookup) = self.lookup_target(&req.identifiers) {
            if abort.is_cancelled() {
                return Ok(Outcome::EmptyNoMatch);
            }
            info!(
                item_id = %lookup.item_id,
                id_type = lookup.id_type.as_str(),
                "looking up by identifier"
            );
            match self.identify_by_identifier(&lookup, limit, abort).await {
                Ok(found) => products = found,
                Err(e @ CatalogError::Configuration(_)) => return Err(e),
                Err(e) if e.is_not_found() => {
                    info!(code = %e.fault_code(), "identifier not found, trying title/author");
                }
                Err(e) => {
                    warn!(code = %e.fault_code(), "identifier lookup failed: {e}");
                    return Ok(Outcome::abandoned(&e));
                }
            }
        }

        if products.is_empty() && self.settings.title_search {
            if let Some(title) = title {
                if abort.is_cancelled() {
                    return Ok(Outcome::EmptyNoMatch);
                }
                match self.search_by_title(title, &req.authors, limit).await {
                    Ok(found) => products = found,
                    Err(e @ CatalogError::Configuration(_)) => return Err(e),
                    Err(
                        e @ (CatalogError::Throttled(_)
                        | CatalogError::Timeout(_)
                        | CatalogError::Server(_)),
                    ) => {
                        warn!(code = %e.fault_code(), "title/author search failed: {e}");
                        return Ok(Outcome::abandoned(&e));
                    }
                    Err(e) => {
                        info!(code = %e.fault_code(), "title/author search found nothing: {e}");
                    }
                }
            }
        }

        if products.is_empty() {
            info!("no catalog match");
            return Ok(Outcome::EmptyNoMatch);
        }

        let mut emitted = 0;
        for (rank, product) in products.iter().enumerate() {
            if abort.is_cancelled() {
                info!(emitted, "identification cancelled");
                break;
            }
            let record = self.mapper.map(product).with_relevance(rank);
            self.remember(&record);
            if tx.send(record).is_err() {
                debug!("receiver dropped, stopping emission");
                break;
            }
            emitted += 1;
        }
        info!(emitted, "identification finished");
        Ok(Outcome::Emitted(emitted))
    }

    /// [`identify_streaming`](Self::identify_streaming), collecting the records.
    pub async fn identify(
        &self,
        req: &IdentifyRequest,
        abort: &AbortSignal,
    ) -> Result<Identification> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let outcome = self.identify_streaming(req, abort, tx).await?;
        let mut records = Vec::new();
        while let Ok(record) = rx.try_recv() {
            records.push(record);
        }
        Ok(Identification { outcome, records })
    }

    /// Fetch the cover image for `req`, identifying first when no cover URL
    /// is cached for its identifiers.
    pub async fn download_cover(
        &self,
        req: &IdentifyRequest,
        abort: &AbortSignal,
    ) -> Result<CoverOutcome> {
        let mut url = self.cached_cover_url(&req.identifiers);
        if url.is_none() {
            debug!("no cached cover URL, identifying first");
            let identification = self.identify(req, abort).await?;
            url = self.cached_cover_url(&req.identifiers).or_else(|| {
                identification
                    .records
                    .first()
                    .and_then(|record| self.cached_cover_url(&record.identifiers))
            });
        }

        if abort.is_cancelled() {
            return Ok(CoverOutcome::Cancelled);
        }
        let Some(url) = url else {
            info!("no cover URL found");
            return Ok(CoverOutcome::Failed(
                "Download cover failed: could not identify the book".to_string(),
            ));
        };

        let limit = req.timeout.unwrap_or(self.settings.timeout);
        match bounded(limit, self.images.get_bytes(&url)).await {
            Ok(bytes) => {
                info!(%url, size = bytes.len(), "downloaded cover");
                Ok(CoverOutcome::Downloaded { url, bytes })
            }
            Err(e) => {
                warn!(%url, "cover download failed: {e}");
                Ok(CoverOutcome::Failed(format!(
                    "Failed to download cover from {url}"
                )))
            }
        }
    }

    // ─── Catalog calls ───────────────────────────────────────────────────────

    pub(crate) async fn lookup(
        &self,
        request: &LookupRequest,
        limit: Duration,
    ) -> Result<Vec<ProductRecord>> {
        self.retry
            .run(|| bounded(limit, self.catalog.lookup(request)))
            .await
    }

    fn lookup_target(&self, ids: &IdentifierSet) -> Option<LookupRequest> {
        self.settings.lookup_order.iter().find_map(|key| match key {
            LookupKey::VendorId => ids
                .vendor_id(self.mapper.vendor_id_key())
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(LookupRequest::asin),
            LookupKey::Isbn => ids
                .isbn()
                .map(isbn::strip)
                .filter(|id| !id.is_empty())
                .map(|id| LookupRequest::isbn(id, self.settings.search_index.as_str())),
        })
    }

    /// Identifier lookup plus the single alternate-edition hop.
    async fn identify_by_identifier(
        &self,
        request: &LookupRequest,
        limit: Duration,
        abort: &AbortSignal,
    ) -> Result<Vec<ProductRecord>> {
        let results = self.lookup(request, limit).await?;
        debug!(count = results.len(), "identifier lookup returned");
        if self.has_preferred(&results) {
            return Ok(self.only_preferred(results));
        }

        let alternate = results
            .iter()
            .flat_map(ProductRecord::alternate_versions)
            .filter(|v| self.is_preferred_binding(v.binding.as_deref()))
            .find_map(|v| v.vendor_id);
        let Some(alternate) = alternate else {
            return Ok(results);
        };
        if abort.is_cancelled() {
            return Ok(results);
        }

        info!(
            %alternate,
            binding = %self.settings.preferred_binding,
            "following alternate edition"
        );
        match self.lookup(&LookupRequest::asin(alternate.as_str()), limit).await {
            Ok(hop) if !hop.is_empty() => Ok(if self.has_preferred(&hop) {
                self.only_preferred(hop)
            } else {
                hop
            }),
            Ok(_) => Ok(results),
            Err(e @ CatalogError::Configuration(_)) => Err(e),
            Err(e) => {
                warn!(%alternate, "alternate edition lookup failed, keeping original results: {e}");
                Ok(results)
            }
        }
    }

    async fn search_by_title(
        &self,
        title: &str,
        authors: &[String],
        limit: Duration,
    ) -> Result<Vec<ProductRecord>> {
        let request = SearchRequest {
            search_index: self.settings.search_index.clone(),
            title: joined(tokens::title_tokens(title, &self.settings.title_joiners)),
            author: joined(tokens::author_tokens(authors)),
        };
        if request.title.is_none() && request.author.is_none() {
            debug!(title, "no usable search tokens");
            return Ok(Vec::new());
        }
        info!(title = ?request.title, author = ?request.author, "searching by title/author");

        let mut pages = SearchPages::new(self.catalog.as_ref(), request)
            .with_max_pages(self.settings.max_search_pages);
        let mut found = Vec::new();
        let mut attempt = 0;
        loop {
            match bounded(limit, pages.next_page()).await {
                Ok(Some(items)) => {
                    found.extend(items);
                    attempt = 0;
                }
                Ok(None) => break,
                Err(e) => {
                    if let Some(delay) = self.retry.retry_delay(&e, attempt) {
                        warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "search throttled, backing off"
                        );
                        sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    if found.is_empty() {
                        return Err(e);
                    }
                    warn!(count = found.len(), "search stopped early: {e}");
                    break;
                }
            }
        }
        Ok(found)
    }

    // ─── Binding preference ──────────────────────────────────────────────────

    fn is_preferred_binding(&self, binding: Option<&str>) -> bool {
        let preferred = &self.settings.preferred_binding;
        !preferred.is_empty() && binding.is_some_and(|b| b.trim().eq_ignore_ascii_case(preferred))
    }

    fn has_preferred(&self, items: &[ProductRecord]) -> bool {
        items
            .iter()
            .any(|p| self.is_preferred_binding(p.binding().as_deref()))
    }

    fn only_preferred(&self, items: Vec<ProductRecord>) -> Vec<ProductRecord> {
        items
            .into_iter()
            .filter(|p| self.is_preferred_binding(p.binding().as_deref()))
            .collect()
    }

    // ─── Caches ──────────────────────────────────────────────────────────────

    fn cached_cover_url(&self, ids: &IdentifierSet) -> Option<String> {
        cache_keys(ids, self.mapper.vendor_id_key())
            .iter()
            .find_map(|key| self.covers.get(key))
    }

    /// Cover URL first, so a later cover request finds it, then the record
    /// itself when caching is enabled.
    fn remember(&self, record: &CanonicalRecord) {
        let keys = cache_keys(&record.identifiers, self.mapper.vendor_id_key());
        if let Some(url) = &record.cover_url {
            for key in &keys {
                if let Err(e) = self.covers.set(key, url) {
                    warn!(%key, "failed to cache cover URL: {e}");
                }
            }
        }
        if !self.settings.cache_writes {
            return;
        }
        for key in &keys {
            match self.records.put_if_absent(key, record) {
                Ok(true) => debug!(%key, "cached identified record"),
                Ok(false) => {}
                Err(e) => warn!(%key, "failed to cache record: {e}"),
            }
        }
    }
}

/// Vendor id, then ISBN (ISBN-10 normalized to ISBN-13).
fn cache_keys(ids: &IdentifierSet, vendor_key: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(id) = ids.vendor_id(vendor_key) {
        keys.push(id.trim().to_string());
    }
    if let Some(raw) = ids.isbn() {
        let short = isbn::strip(raw);
        if isbn::is_valid(&short) {
            keys.push(isbn::normalize(&short));
        } else {
            keys.push(raw.trim().to_string());
        }
    }
    keys.retain(|k| !k.is_empty());
    keys
}

fn joined(tokens: Vec<String>) -> Option<String> {
    (!tokens.is_empty()).then(|| tokens.join(" "))
}

pub(crate) async fn bounded<T>(
    limit: Duration,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| CatalogError::Timeout(limit))?
}
