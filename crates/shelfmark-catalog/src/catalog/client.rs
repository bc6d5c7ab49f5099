use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};

use shelfmark_core::LookupConfig;

use super::response::ItemsResponse;
use super::{
    Catalog, CatalogQuery, LookupRequest, Operation, ProductRecord, RequestSigner, SearchPage,
    SearchRequest,
};
use crate::error::{ApiFault, CatalogError, Result};
use crate::http::{RateLimitedClient, RateLimiter};

const THROTTLED_CODE: &str = "RequestThrottled";
const HTTP_503_CODE: &str = "HTTP Error 503";
const OUT_OF_RANGE_CODE: &str = "ParameterOutOfRange";

/// Signed, throttled access to `ItemLookup` and `ItemSearch`.
///
/// Exactly one HTTP request per call; retrying is left to the caller.
pub struct CatalogClient {
    signer: RequestSigner,
    http: RateLimitedClient,
    response_group: String,
}

impl CatalogClient {
    pub fn new(signer: RequestSigner, http: RateLimitedClient, response_group: String) -> Self {
        Self {
            signer,
            http,
            response_group,
        }
    }

    pub fn from_config(config: &LookupConfig) -> Result<Self> {
        Self::with_limiter(config, RateLimiter::new(config.catalog.max_qps))
    }

    /// Build a client that throttles against an existing limiter.
    pub fn with_limiter(config: &LookupConfig, limiter: RateLimiter) -> Result<Self> {
        let signer = RequestSigner::from_config(config)?;
        let http = RateLimitedClient::new(limiter, config.timeout())?;
        Ok(Self::new(
            signer,
            http,
            config.catalog.response_group.clone(),
        ))
    }

    pub fn http(&self) -> &RateLimitedClient {
        &self.http
    }

    async fn call(&self, query: CatalogQuery) -> Result<ItemsResponse> {
        // Sign after the throttle wait so the timestamp is current at dispatch.
        self.http.limiter().throttle().await;
        let signed = self.signer.build(&query, Utc::now())?;
        debug!(
            operation = %query.operation(),
            host = %signed.host,
            "catalog request"
        );
        let resp = self.http.fetch(&signed.url()).await?;

        if resp.status == 503 {
            return Err(CatalogError::Throttled(ApiFault::new(
                HTTP_503_CODE,
                "service unavailable",
            )));
        }

        let parsed = match ItemsResponse::parse(&resp.body) {
            Ok(parsed) => parsed,
            Err(e) if !(200..300).contains(&resp.status) => {
                return Err(CatalogError::Server(ApiFault::new(
                    format!("HTTP Error {}", resp.status),
                    e.to_string(),
                )));
            }
            Err(e) => return Err(e),
        };

        if let Some(fault) = parsed.error_document() {
            warn!(code = %fault.code, message = %fault.message, "catalog error response");
            return Err(if fault.code == THROTTLED_CODE {
                CatalogError::Throttled(fault)
            } else {
                CatalogError::InvalidRequest(fault)
            });
        }
        Ok(parsed)
    }

    pub async fn lookup(&self, request: &LookupRequest) -> Result<Vec<ProductRecord>> {
        let mut query = CatalogQuery::new(Operation::ItemLookup)
            .param("ItemId", request.item_id.as_str())
            .param("IdType", request.id_type.as_str())
            .param("ResponseGroup", self.response_group.as_str());
        if let Some(index) = &request.search_index {
            query = query.param("SearchIndex", index.as_str());
        }

        let resp = self.call(query).await?;
        if !resp.is_valid() {
            let fault = resp
                .first_error()
                .unwrap_or_else(|| ApiFault::new("InvalidRequest", "request marked invalid"));
            return Err(CatalogError::InvalidRequest(fault));
        }

        let fault = resp.first_error();
        let items = resp.into_items();
        if items.is_empty() {
            let fault =
                fault.unwrap_or_else(|| ApiFault::new("ItemNotFound", "no item in response"));
            return Err(CatalogError::ItemNotFound(fault));
        }
        debug!(item_id = %request.item_id, count = items.len(), "lookup returned items");
        Ok(items)
    }

    /// Fetch one page (1-based) of an `ItemSearch`.
    pub async fn search_page(&self, request: &SearchRequest, page: u32) -> Result<SearchPage> {
        let mut query = CatalogQuery::new(Operation::ItemSearch)
            .param("SearchIndex", request.search_index.as_str())
            .param("ResponseGroup", self.response_group.as_str())
            .param("ItemPage", page.to_string());
        if let Some(title) = &request.title {
            query = query.param("Title", title.as_str());
        }
        if let Some(author) = &request.author {
            query = query.param("Author", author.as_str());
        }

        let resp = self.call(query).await.map_err(|e| match e {
            CatalogError::InvalidRequest(fault) => search_fault(fault),
            other => other,
        })?;
        if !resp.is_valid() {
            let fault = resp
                .first_error()
                .unwrap_or_else(|| ApiFault::new("InvalidRequest", "request marked invalid"));
            return Err(search_fault(fault));
        }

        let total_pages = resp.total_pages();
        let fault = resp.first_error();
        let items = resp.into_items();
        if items.is_empty() {
            if let Some(fault) = fault {
                return Err(search_fault(fault));
            }
        }
        Ok(SearchPage { items, total_pages })
    }
}

/// Search-side fault taxonomy.
fn search_fault(fault: ApiFault) -> CatalogError {
    if fault.code.ends_with(OUT_OF_RANGE_CODE) {
        CatalogError::NoMoreResultPages(fault)
    } else if fault.code.ends_with(THROTTLED_CODE) || fault.code == HTTP_503_CODE {
        CatalogError::Throttled(fault)
    } else {
        CatalogError::SearchFailed(fault)
    }
}

#[async_trait]
impl Catalog for CatalogClient {
    async fn lookup(&self, request: &LookupRequest) -> Result<Vec<ProductRecord>> {
        CatalogClient::lookup(self, request).await
    }

    async fn search_page(&self, request: &SearchRequest, page: u32) -> Result<SearchPage> {
        CatalogClient::search_page(self, request, page).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{Arc, Mutex};

    use chrono::NaiveDateTime;
    use mockito::{Matcher, Server};

    use super::*;
    use crate::catalog::response::fixtures;

    pub(crate) fn test_config(endpoint: &str) -> LookupConfig {
        let mut config = LookupConfig::default();
        config.credentials.access_key = "AKIDTEST".to_string();
        config.credentials.secret_key = "secret".to_string();
        config.credentials.associate_tag = "tag-20".to_string();
        config.catalog.endpoint = Some(endpoint.to_string());
        config.catalog.max_qps = 0.0;
        config.catalog.timeout_secs = 5;
        config
    }

    fn lookup_matcher(item_id: &str) -> Matcher {
        Matcher::AllOf(vec![
            Matcher::UrlEncoded("Operation".to_string(), "ItemLookup".to_string()),
            Matcher::UrlEncoded("ItemId".to_string(), item_id.to_string()),
        ])
    }

    #[tokio::test]
    async fn lookup_returns_items_in_document_order() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/onca/xml")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("Operation".to_string(), "ItemLookup".to_string()),
                Matcher::UrlEncoded("ItemId".to_string(), "B0085UEQDO".to_string()),
                Matcher::UrlEncoded("IdType".to_string(), "ASIN".to_string()),
                Matcher::UrlEncoded("Service".to_string(), "AWSECommerceService".to_string()),
                Matcher::UrlEncoded("AWSAccessKeyId".to_string(), "AKIDTEST".to_string()),
                Matcher::UrlEncoded("AssociateTag".to_string(), "tag-20".to_string()),
                Matcher::Regex("Signature=".to_string()),
            ]))
            .with_status(200)
            .with_header("content-type", "text/xml")
            .with_body(fixtures::lookup_response(&[
                fixtures::item("B0085UEQDO", "First", "Kindle Edition", ""),
                fixtures::item("B000SECOND", "Second", "Paperback", ""),
            ]))
            .expect(1)
            .create_async()
            .await;

        let client = CatalogClient::from_config(&test_config(&server.url())).unwrap();
        let items = client
            .lookup(&LookupRequest::asin("B0085UEQDO"))
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title().as_deref(), Some("First"));
        assert_eq!(items[1].vendor_id().as_deref(), Some("B000SECOND"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn isbn_lookup_sends_search_index() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/onca/xml")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("IdType".to_string(), "ISBN".to_string()),
                Matcher::UrlEncoded("SearchIndex".to_string(), "KindleStore".to_string()),
            ]))
            .with_status(200)
            .with_body(fixtures::lookup_response(&[fixtures::item(
                "B1", "T", "Kindle Edition", "",
            )]))
            .expect(1)
            .create_async()
            .await;

        let client = CatalogClient::from_config(&test_config(&server.url())).unwrap();
        let items = client
            .lookup(&LookupRequest::isbn("0982514506", "KindleStore"))
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn invalid_request_carries_first_error() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/onca/xml")
            .match_query(lookup_matcher("bogus"))
            .with_status(200)
            .with_body(fixtures::invalid_response("AWS.InvalidParameterValue"))
            .create_async()
            .await;

        let client = CatalogClient::from_config(&test_config(&server.url())).unwrap();
        let err = client.lookup(&LookupRequest::asin("bogus")).await.unwrap_err();
        match err {
            CatalogError::InvalidRequest(fault) => {
                assert_eq!(fault.code, "AWS.InvalidParameterValue")
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_items_is_item_not_found() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/onca/xml")
            .match_query(lookup_matcher("B000NONE00"))
            .with_status(200)
            .with_body(fixtures::not_found_response(
                "ItemLookupResponse",
                "AWS.ECommerceService.NoExactMatches",
            ))
            .create_async()
            .await;

        let client = CatalogClient::from_config(&test_config(&server.url())).unwrap();
        let err = client
            .lookup(&LookupRequest::asin("B000NONE00"))
            .await
            .unwrap_err();
        assert!(matches!(
            &err,
            CatalogError::ItemNotFound(f) if f.code == "AWS.ECommerceService.NoExactMatches"
        ));
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn http_503_is_throttled() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/onca/xml")
            .match_query(Matcher::Any)
            .with_status(503)
            .with_body("Service Unavailable")
            .create_async()
            .await;

        let client = CatalogClient::from_config(&test_config(&server.url())).unwrap();
        let err = client.lookup(&LookupRequest::asin("B1")).await.unwrap_err();
        assert!(matches!(err, CatalogError::Throttled(f) if f.code == "HTTP Error 503"));
    }

    #[tokio::test]
    async fn unreadable_server_error_is_not_a_miss() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/onca/xml")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body("Internal Server Error")
            .create_async()
            .await;

        let client = CatalogClient::from_config(&test_config(&server.url())).unwrap();
        let err = client.lookup(&LookupRequest::asin("B1")).await.unwrap_err();
        assert!(matches!(&err, CatalogError::Server(f) if f.code == "HTTP Error 500"));
        assert!(!err.is_not_found());
    }

    #[tokio::test]
    async fn gzip_bodies_are_decoded() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/onca/xml")
            .match_query(lookup_matcher("B0085UEQDO"))
            .with_status(200)
            .with_header("content-type", "text/xml")
            .with_header("content-encoding", "gzip")
            .with_body(include_bytes!("../../testdata/item_lookup.xml.gz"))
            .create_async()
            .await;

        let client = CatalogClient::from_config(&test_config(&server.url())).unwrap();
        let items = client
            .lookup(&LookupRequest::asin("B0085UEQDO"))
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title().as_deref(), Some("Three Parts Dead"));
    }

    #[tokio::test]
    async fn timestamp_is_taken_after_throttle_wait() {
        let stamps = Arc::new(Mutex::new(Vec::new()));
        let seen = stamps.clone();
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/onca/xml")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body_from_request(move |req| {
                let stamp = req
                    .path_and_query()
                    .split(['?', '&'])
                    .find_map(|p| p.strip_prefix("Timestamp="))
                    .map(|v| urlencoding::decode(v).unwrap().into_owned());
                seen.lock().unwrap().extend(stamp);
                fixtures::lookup_response(&[fixtures::item("B1", "T", "Kindle Edition", "")])
                    .into_bytes()
            })
            .expect(2)
            .create_async()
            .await;

        let mut config = test_config(&server.url());
        config.catalog.max_qps = 0.5;
        let client = CatalogClient::from_config(&config).unwrap();
        client.lookup(&LookupRequest::asin("B1")).await.unwrap();
        let queued_at = Utc::now();
        client.lookup(&LookupRequest::asin("B1")).await.unwrap();

        let stamps = stamps.lock().unwrap().clone();
        assert_eq!(stamps.len(), 2);
        let signed_at = NaiveDateTime::parse_from_str(&stamps[1], "%Y-%m-%dT%H:%M:%SZ")
            .unwrap()
            .and_utc();
        // the second call waits ~2s in the limiter
        assert!(signed_at.timestamp() > queued_at.timestamp());
    }

    #[tokio::test]
    async fn error_document_maps_throttle_and_other_codes() {
        let mut server = Server::new_async().await;
        let _throttled = server
            .mock("GET", "/onca/xml")
            .match_query(lookup_matcher("B1"))
            .with_status(200)
            .with_body(
                "<ItemLookupErrorResponse><Error><Code>RequestThrottled</Code>\
                 <Message>too fast</Message></Error></ItemLookupErrorResponse>",
            )
            .create_async()
            .await;
        let _denied = server
            .mock("GET", "/onca/xml")
            .match_query(lookup_matcher("B2"))
            .with_status(403)
            .with_body(
                "<ItemLookupErrorResponse><Error><Code>SignatureDoesNotMatch</Code>\
                 <Message>bad signature</Message></Error></ItemLookupErrorResponse>",
            )
            .create_async()
            .await;

        let client = CatalogClient::from_config(&test_config(&server.url())).unwrap();
        let err = client.lookup(&LookupRequest::asin("B1")).await.unwrap_err();
        assert!(matches!(err, CatalogError::Throttled(f) if f.code == "RequestThrottled"));
        let err = client.lookup(&LookupRequest::asin("B2")).await.unwrap_err();
        assert!(matches!(
            err,
            CatalogError::InvalidRequest(f) if f.code == "SignatureDoesNotMatch"
        ));
    }

    #[tokio::test]
    async fn search_page_reports_total_pages() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/onca/xml")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("Operation".to_string(), "ItemSearch".to_string()),
                Matcher::UrlEncoded("Title".to_string(), "Three Parts Dead".to_string()),
                Matcher::UrlEncoded("Author".to_string(), "Gladstone".to_string()),
                Matcher::UrlEncoded("ItemPage".to_string(), "2".to_string()),
            ]))
            .with_status(200)
            .with_body(fixtures::search_response(
                &[fixtures::item("B1", "Three Parts Dead", "Kindle Edition", "")],
                4,
            ))
            .expect(1)
            .create_async()
            .await;

        let client = CatalogClient::from_config(&test_config(&server.url())).unwrap();
        let request = SearchRequest {
            search_index: "KindleStore".to_string(),
            title: Some("Three Parts Dead".to_string()),
            author: Some("Gladstone".to_string()),
        };
        let page = client.search_page(&request, 2).await.unwrap();
        assert_eq!(page.total_pages, Some(4));
        assert_eq!(page.items.len(), 1);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn search_fault_taxonomy() {
        let mut server = Server::new_async().await;
        let page_matcher = |page: &str| {
            Matcher::AllOf(vec![
                Matcher::UrlEncoded("Operation".to_string(), "ItemSearch".to_string()),
                Matcher::UrlEncoded("ItemPage".to_string(), page.to_string()),
            ])
        };
        let _out_of_range = server
            .mock("GET", "/onca/xml")
            .match_query(page_matcher("11"))
            .with_status(200)
            .with_body(fixtures::invalid_response("AWS.ParameterOutOfRange"))
            .create_async()
            .await;
        let _no_match = server
            .mock("GET", "/onca/xml")
            .match_query(page_matcher("1"))
            .with_status(200)
            .with_body(fixtures::not_found_response(
                "ItemSearchResponse",
                "AWS.ECommerceService.NoExactMatches",
            ))
            .create_async()
            .await;

        let client = CatalogClient::from_config(&test_config(&server.url())).unwrap();
        let request = SearchRequest {
            search_index: "KindleStore".to_string(),
            title: Some("x".to_string()),
            author: None,
        };
        assert!(matches!(
            client.search_page(&request, 11).await,
            Err(CatalogError::NoMoreResultPages(_))
        ));
        assert!(matches!(
            client.search_page(&request, 1).await,
            Err(CatalogError::SearchFailed(_))
        ));
    }

    #[tokio::test]
    async fn missing_credentials_never_hit_network() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/onca/xml")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let mut config = test_config(&server.url());
        config.credentials.secret_key.clear();
        let client = CatalogClient::from_config(&config).unwrap();
        let err = client.lookup(&LookupRequest::asin("B1")).await.unwrap_err();
        assert!(matches!(err, CatalogError::Configuration(_)));
        mock.assert_async().await;
    }
}
