//! Shelfmark catalog: signed product-catalog lookups, identification and
//! metadata mapping.

pub mod batch;
pub mod cache;
pub mod cancel;
pub mod catalog;
pub mod error;
pub mod http;
pub mod identifiers;
pub mod mapper;
pub mod resolver;
pub mod retry;
pub mod tokens;

pub use batch::{BatchPlan, BatchReport};
pub use cache::{
    CoverUrlStore, DiskCoverUrlCache, DiskRecordCache, MemoryCoverUrlCache, RecordStore,
};
pub use cancel::AbortSignal;
pub use catalog::{Catalog, CatalogClient, IdType, LookupRequest, ProductRecord, SearchRequest};
pub use error::{ApiFault, CatalogError, Result};
pub use http::RateLimiter;
pub use mapper::MetadataMapper;
pub use resolver::{CoverOutcome, IdentificationResolver, Identification, IdentifyRequest, Outcome};
pub use retry::RetryPolicy;
