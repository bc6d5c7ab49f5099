use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Url;
use sha2::Sha256;

use shelfmark_core::{LookupConfig, Region};

use super::CatalogQuery;
use crate::error::{CatalogError, Result};

type HmacSha256 = Hmac<Sha256>;

pub const REQUEST_PATH: &str = "/onca/xml";
pub const SERVICE: &str = "AWSECommerceService";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// A query rendered for one instant: canonical string plus its signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    pub scheme: String,
    pub host: String,
    pub canonical_query: String,
    pub signature: String,
}

impl SignedRequest {
    pub fn url(&self) -> String {
        format!(
            "{}://{}{}?{}&Signature={}",
            self.scheme,
            self.host,
            REQUEST_PATH,
            self.canonical_query,
            urlencoding::encode(&self.signature)
        )
    }
}

/// Holds credentials and the target host. Signing itself is a pure function
/// of the query and the timestamp.
#[derive(Clone)]
pub struct RequestSigner {
    access_key: String,
    secret_key: String,
    associate_tag: String,
    version: String,
    scheme: String,
    host: String,
}

impl RequestSigner {
    pub fn new(
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        associate_tag: impl Into<String>,
        region: Region,
    ) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            associate_tag: associate_tag.into(),
            version: "2013-08-01".to_string(),
            scheme: "https".to_string(),
            host: region.service_host().to_string(),
        }
    }

    pub fn from_config(config: &LookupConfig) -> Result<Self> {
        let creds = &config.credentials;
        let mut signer = Self::new(
            creds.access_key.clone(),
            creds.secret_key.clone(),
            creds.associate_tag.clone(),
            config.catalog.region,
        )
        .with_version(config.catalog.api_version.clone());
        if let Some(endpoint) = &config.catalog.endpoint {
            signer = signer.with_endpoint(endpoint)?;
        }
        Ok(signer)
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Point at `scheme://host[:port]` instead of the regional host.
    pub fn with_endpoint(mut self, endpoint: &str) -> Result<Self> {
        let url = Url::parse(endpoint)
            .map_err(|e| CatalogError::Configuration(format!("endpoint {endpoint:?}: {e}")))?;
        let host = url.host_str().ok_or_else(|| {
            CatalogError::Configuration(format!("endpoint {endpoint:?} has no host"))
        })?;
        self.host = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        self.scheme = url.scheme().to_string();
        Ok(self)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn ensure_configured(&self) -> Result<()> {
        if self.access_key.trim().is_empty() {
            return Err(CatalogError::Configuration(
                "access key is not set".to_string(),
            ));
        }
        if self.secret_key.trim().is_empty() {
            return Err(CatalogError::Configuration(
                "secret key is not set".to_string(),
            ));
        }
        Ok(())
    }

    /// Sign `query` as of `now`. Identical inputs give identical output.
    pub fn build(&self, query: &CatalogQuery, now: DateTime<Utc>) -> Result<SignedRequest> {
        self.ensure_configured()?;
        let canonical_query = self.canonical_query(query, now);
        let string_to_sign = format!("GET\n{}\n{}\n{}", self.host, REQUEST_PATH, canonical_query);

        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .map_err(|e| CatalogError::Configuration(format!("secret key: {e}")))?;
        mac.update(string_to_sign.as_bytes());
        let signature = STANDARD.encode(mac.finalize().into_bytes());

        Ok(SignedRequest {
            scheme: self.scheme.clone(),
            host: self.host.clone(),
            canonical_query,
            signature,
        })
    }

    fn canonical_query(&self, query: &CatalogQuery, now: DateTime<Utc>) -> String {
        let mut params = std::collections::BTreeMap::new();
        params.insert("AWSAccessKeyId", self.access_key.clone());
        params.insert("Operation", query.operation().as_str().to_string());
        params.insert("Service", SERVICE.to_string());
        params.insert("Timestamp", now.format(TIMESTAMP_FORMAT).to_string());
        params.insert("Version", self.version.clone());
        if !self.associate_tag.is_empty() {
            params.insert("AssociateTag", self.associate_tag.clone());
        }
        for (key, value) in query.params() {
            params.insert(key, value.to_string());
        }

        params
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}
