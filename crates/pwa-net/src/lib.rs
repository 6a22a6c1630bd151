//! # PWA Net
//!
//! Request/response model and network access for the offline worker.
//!
//! ## Design Goals
//!
//! 1. **One seam**: everything that reaches the network goes through [`Fetcher`]
//! 2. **Response typing**: responses carry a [`ResponseType`] so the worker can
//!    tell same-origin responses from cross-origin and opaque ones
//! 3. **Connectivity**: [`NetworkStatus`] drives the page indicator and makes
//!    the loader fail fast while offline

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{header, HeaderMap, HeaderName, HeaderValue, Method};
use mime::Mime;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, info, trace, warn};
use url::Url;

pub mod status;

pub use status::NetworkStatus;

/// Errors that can occur in networking.
#[derive(Error, Debug)]
pub enum NetError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Network is offline")]
    Offline,

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

/// Unique identifier for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

impl RequestId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

/// Request mode, mirroring what the page asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    /// Top-level page navigation.
    Navigate,
    /// Cross-origin requests are rejected.
    SameOrigin,
    /// Cross-origin responses come back opaque.
    #[default]
    NoCors,
    /// Cross-origin responses are readable.
    Cors,
}

/// HTTP request.
#[derive(Debug, Clone)]
pub struct Request {
    pub id: RequestId,
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub mode: RequestMode,
}

impl Request {
    /// Create a GET request for a subresource.
    pub fn get(url: Url) -> Self {
        Self {
            id: RequestId::new(),
            url,
            method: Method::GET,
            headers: HeaderMap::new(),
            body: None,
            mode: RequestMode::NoCors,
        }
    }

    /// Create a navigation request.
    pub fn navigate(url: Url) -> Self {
        Self {
            mode: RequestMode::Navigate,
            ..Self::get(url)
        }
    }

    /// Create a POST request.
    pub fn post(url: Url, body: Bytes) -> Self {
        Self {
            method: Method::POST,
            body: Some(body),
            mode: RequestMode::Cors,
            ..Self::get(url)
        }
    }

    /// Add a header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set the request mode.
    pub fn mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }
}

/// How much of a response the page may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    /// Same-origin response.
    Basic,
    /// Cross-origin response obtained in CORS mode.
    Cors,
    /// Cross-origin no-cors response; status, headers and body are hidden.
    Opaque,
    /// Network error.
    Error,
    /// Constructed locally rather than fetched.
    Default,
}

/// HTTP response with a fully loaded body.
#[derive(Debug, Clone)]
pub struct Response {
    pub url: Url,
    pub status: u16,
    pub status_text: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub response_type: ResponseType,
    pub redirected: bool,
    /// Served from a cache bucket rather than the network.
    pub from_cache: bool,
}

impl Response {
    /// Create a same-origin response.
    pub fn basic(url: Url, status: u16, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            url,
            status,
            status_text: reason_phrase(status),
            headers,
            body: body.into(),
            response_type: ResponseType::Basic,
            redirected: false,
            from_cache: false,
        }
    }

    /// Create a locally constructed response with a content type.
    pub fn synthetic(url: Url, status: u16, content_type: &str, body: impl Into<Bytes>) -> Self {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(content_type) {
            headers.insert(header::CONTENT_TYPE, value);
        }
        Self {
            response_type: ResponseType::Default,
            ..Self::basic(url, status, headers, body)
        }
    }

    /// Create an opaque response for a cross-origin no-cors request.
    pub fn opaque(url: Url) -> Self {
        Self {
            url,
            status: 0,
            status_text: String::new(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            response_type: ResponseType::Opaque,
            redirected: false,
            from_cache: false,
        }
    }

    /// Create a network error response.
    pub fn network_error(url: Url) -> Self {
        Self {
            response_type: ResponseType::Error,
            ..Self::opaque(url)
        }
    }

    /// Check if request was successful (2xx).
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn content_type(&self) -> Option<Mime> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<Mime>().ok())
    }

    /// Get the body as text.
    pub fn text(&self) -> Result<String, NetError> {
        String::from_utf8(self.body.to_vec()).map_err(|e| NetError::RequestFailed(e.to_string()))
    }

    /// Get the body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, NetError> {
        serde_json::from_slice(&self.body).map_err(|e| NetError::RequestFailed(e.to_string()))
    }
}

fn reason_phrase(status: u16) -> String {
    http::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("")
        .to_string()
}

/// Anything that can turn a request into a response.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError>;
}

/// Whether two URLs share scheme, host and port.
pub fn same_origin(a: &Url, b: &Url) -> bool {
    a.origin() == b.origin()
}

/// Resource loader configuration.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Origin of the page; decides basic vs cross-origin responses.
    pub origin: Url,
    /// User agent string.
    pub user_agent: String,
    /// Default timeout.
    pub timeout: Duration,
    /// Maximum redirects.
    pub max_redirects: usize,
}

impl LoaderConfig {
    pub fn new(origin: Url) -> Self {
        Self {
            origin,
            user_agent: format!("pwa-demo/{}", env!("CARGO_PKG_VERSION")),
            timeout: Duration::from_secs(30),
            max_redirects: 10,
        }
    }
}

/// `reqwest`-backed loader.
pub struct ResourceLoader {
    client: Client,
    config: LoaderConfig,
    status: NetworkStatus,
}

impl ResourceLoader {
    /// Create a new resource loader.
    pub fn new(config: LoaderConfig, status: NetworkStatus) -> Result<Self, NetError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| NetError::RequestFailed(e.to_string()))?;

        info!(origin = %config.origin, "ResourceLoader initialized");

        Ok(Self {
            client,
            config,
            status,
        })
    }

    pub fn status(&self) -> &NetworkStatus {
        &self.status
    }

    fn classify(&self, request: &Request, final_url: &Url) -> ResponseType {
        let origin = &self.config.origin;
        if same_origin(origin, &request.url) && same_origin(origin, final_url) {
            return ResponseType::Basic;
        }
        match request.mode {
            RequestMode::Cors => ResponseType::Cors,
            _ => ResponseType::Opaque,
        }
    }
}

#[async_trait]
impl Fetcher for ResourceLoader {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        debug!(url = %request.url, method = %request.method, "Fetching resource");

        if !self.status.is_online() {
            return Err(NetError::Offline);
        }

        if request.mode == RequestMode::SameOrigin && !same_origin(&self.config.origin, &request.url)
        {
            warn!(url = %request.url, "Cross-origin request in same-origin mode");
            return Err(NetError::RequestFailed(format!(
                "{} is not same-origin",
                request.url
            )));
        }

        let mut req_builder = self
            .client
            .request(request.method.clone(), request.url.clone());

        for (name, value) in request.headers.iter() {
            req_builder = req_builder.header(name, value);
        }

        if let Some(ref body) = request.body {
            req_builder = req_builder.body(body.clone());
        }

        let response = req_builder.send().await.map_err(|e| {
            if e.is_timeout() {
                NetError::Timeout(self.config.timeout)
            } else {
                NetError::HttpError(e)
            }
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let redirected = url != request.url;
        let response_type = self.classify(request, &url);

        if response_type == ResponseType::Opaque {
            trace!(url = %url, "Cross-origin no-cors response, hiding contents");
            return Ok(Response {
                redirected,
                ..Response::opaque(url)
            });
        }

        let body = response.bytes().await?;

        trace!(
            url = %url,
            status = %status,
            response_type = ?response_type,
            body_len = body.len(),
            "Response received"
        );

        Ok(Response {
            url,
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            headers,
            body,
            response_type,
            redirected,
            from_cache: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn loader_for(origin: &str, status: NetworkStatus) -> ResourceLoader {
        let config = LoaderConfig::new(Url::parse(origin).unwrap());
        ResourceLoader::new(config, status).unwrap()
    }

    #[test]
    fn test_request_builder() {
        let url = Url::parse("https://example.com/app.js").unwrap();
        let request = Request::get(url.clone()).header(
            HeaderName::from_static("accept"),
            HeaderValue::from_static("application/javascript"),
        );

        assert_eq!(request.url, url);
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.mode, RequestMode::NoCors);
        assert!(request.headers.contains_key("accept"));
        assert!(!request.is_navigation());
        assert!(Request::navigate(url).is_navigation());
    }

    #[test]
    fn test_request_id_uniqueness() {
        let id1 = RequestId::new();
        let id2 = RequestId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_synthetic_response() {
        let url = Url::parse("https://example.com/api").unwrap();
        let response = Response::synthetic(url, 408, "text/plain", "Network error happened");
        assert_eq!(response.status, 408);
        assert_eq!(response.status_text, "Request Timeout");
        assert_eq!(response.response_type, ResponseType::Default);
        assert_eq!(response.content_type().unwrap(), mime::TEXT_PLAIN);
        assert_eq!(response.text().unwrap(), "Network error happened");
        assert!(!response.ok());
    }

    #[test]
    fn test_network_error_response() {
        let url = Url::parse("https://example.com/feed").unwrap();
        let response = Response::network_error(url);

        assert_eq!(response.response_type, ResponseType::Error);
        assert_eq!(response.status, 0);
        assert!(!response.ok());
        assert!(response.body.is_empty());
    }

    #[test]
    fn test_same_origin() {
        let a = Url::parse("https://example.com/a").unwrap();
        let b = Url::parse("https://example.com/b?x=1").unwrap();
        let c = Url::parse("https://cdn.example.com/a").unwrap();
        assert!(same_origin(&a, &b));
        assert!(!same_origin(&a, &c));
    }

    #[tokio::test]
    async fn test_same_origin_fetch_is_basic() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/index.html"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;

        let loader = loader_for(&server.uri(), NetworkStatus::default());
        let url = Url::parse(&format!("{}/index.html", server.uri())).unwrap();
        let response = loader.fetch(&Request::get(url)).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.response_type, ResponseType::Basic);
        assert_eq!(response.text().unwrap(), "<html></html>");
    }

    #[tokio::test]
    async fn test_cross_origin_no_cors_is_opaque() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/lib.js"))
            .respond_with(ResponseTemplate::new(200).set_body_string("secret"))
            .mount(&server)
            .await;

        let loader = loader_for("https://app.example.com/", NetworkStatus::default());
        let url = Url::parse(&format!("{}/lib.js", server.uri())).unwrap();

        let response = loader.fetch(&Request::get(url.clone())).await.unwrap();
        assert_eq!(response.response_type, ResponseType::Opaque);
        assert_eq!(response.status, 0);
        assert!(response.body.is_empty());

        let response = loader
            .fetch(&Request::get(url).mode(RequestMode::Cors))
            .await
            .unwrap();
        assert_eq!(response.response_type, ResponseType::Cors);
        assert_eq!(response.text().unwrap(), "secret");
    }

    #[tokio::test]
    async fn test_non_success_status_is_returned() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let loader = loader_for(&server.uri(), NetworkStatus::default());
        let url = Url::parse(&format!("{}/missing.png", server.uri())).unwrap();
        let response = loader.fetch(&Request::get(url)).await.unwrap();
        assert_eq!(response.status, 404);
        assert!(!response.ok());
    }

    #[tokio::test]
    async fn test_offline_fails_fast() {
        let status = NetworkStatus::new(false);
        let loader = loader_for("https://app.example.com/", status);
        let url = Url::parse("https://app.example.com/").unwrap();
        let err = loader.fetch(&Request::navigate(url)).await.unwrap_err();
        assert!(matches!(err, NetError::Offline));
    }

    #[tokio::test]
    async fn test_same_origin_mode_rejects_cross_origin() {
        let loader = loader_for("https://app.example.com/", NetworkStatus::default());
        let url = Url::parse("https://other.example.com/data.json").unwrap();
        let request = Request::get(url).mode(RequestMode::SameOrigin);
        assert!(matches!(
            loader.fetch(&request).await,
            Err(NetError::RequestFailed(_))
        ));
    }
}
