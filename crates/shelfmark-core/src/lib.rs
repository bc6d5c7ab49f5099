pub mod config;
pub mod error;
pub mod models;

pub use config::{
    CacheConfig, CatalogConfig, Credentials, LookupConfig, LookupKey, MappingConfig,
    ResolutionConfig, TitleRule,
};
pub use error::{CoreError, Result};
pub use models::*;
