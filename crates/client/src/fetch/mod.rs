//! Origin fetch pipeline.
//!
//! ### Requests
//! - Method, headers and body of the intercepted request are forwarded as-is,
//!   minus hop-by-hop headers and `accept-encoding`. The client negotiates
//!   compression itself, so a body only ever arrives in a coding it can decode.
//! - Redirects are handed back to the caller unless `max_redirects` is set.
//! - Max body bytes: 5MB (configurable)
//!
//! ### Responses
//! - Any HTTP status is a response, not an error. Only transport failures
//!   (connect, timeout, body read, size limit) are errors.

pub mod url;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Method, StatusCode, Url, header};
use std::time::{Duration, Instant};

pub use self::url::{UrlError, resolve};

use tether_core::{CacheEntry, Error};

/// Headers never forwarded between hops.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "host",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Request headers the client sets itself.
const CLIENT_OWNED: &[&str] = &["accept-encoding"];

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "tether/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow; 0 returns them to the caller (default: 0)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "tether/0.1".to_string(),
            max_bytes: 5 * 1024 * 1024,
            timeout: Duration::from_millis(20000),
            max_redirects: 0,
        }
    }
}

/// An outgoing request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: header::HeaderMap,
    pub body: Bytes,
}

impl Request {
    /// A bare GET for `url`.
    pub fn get(url: Url) -> Self {
        Self { method: Method::GET, url, headers: header::HeaderMap::new(), body: Bytes::new() }
    }

    pub fn with_headers(mut self, headers: header::HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, method: Method, body: Bytes) -> Self {
        self.method = method;
        self.body = body;
        self
    }
}

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
    /// Built locally (redirects, hydrated pages, the dev offline partial).
    Synthesized,
}

/// A response flowing through the interception layer.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// The URL this response answers
    pub url: Url,
    /// HTTP status code
    pub status: StatusCode,
    /// Response headers
    pub headers: header::HeaderMap,
    /// Response body bytes
    pub bytes: Bytes,
    /// Where the response came from
    pub source: ResponseSource,
}

impl FetchResponse {
    /// A locally built response.
    pub fn synthesized(url: Url, status: StatusCode, content_type: &str, body: impl Into<Bytes>) -> Self {
        let mut headers = header::HeaderMap::new();
        if let Ok(value) = header::HeaderValue::from_str(content_type) {
            headers.insert(header::CONTENT_TYPE, value);
        }
        Self { url, status, headers, bytes: body.into(), source: ResponseSource::Synthesized }
    }

    /// A `301 Moved Permanently` pointing at `location`.
    pub fn moved_permanently(url: Url, location: &str) -> Result<Self, Error> {
        let value = header::HeaderValue::from_str(location).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let mut headers = header::HeaderMap::new();
        headers.insert(header::LOCATION, value);
        Ok(Self {
            url,
            status: StatusCode::MOVED_PERMANENTLY,
            headers,
            bytes: Bytes::new(),
            source: ResponseSource::Synthesized,
        })
    }

    /// Whether the status is in the 200-299 range.
    pub fn is_ok(&self) -> bool {
        self.status.is_success()
    }

    /// Content-Type header, if present and readable.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    /// Location header, if present and readable.
    pub fn location(&self) -> Option<&str> {
        self.headers.get(header::LOCATION).and_then(|v| v.to_str().ok())
    }

    /// Body as UTF-8 text, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }

    /// Convert into a storable cache entry.
    pub fn to_cache_entry(&self) -> CacheEntry {
        let pairs: Vec<(&str, &str)> = self
            .headers
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)))
            .collect();

        let mut entry = CacheEntry::new(self.url.as_str(), self.status.as_u16(), self.bytes.to_vec());
        if let Some(content_type) = self.content_type() {
            entry = entry.with_content_type(content_type);
        }
        if let Ok(json) = serde_json::to_string(&pairs) {
            entry = entry.with_headers_json(json);
        }
        entry
    }

    /// Rebuild a response from a cache entry.
    pub fn from_cache_entry(entry: CacheEntry) -> Result<Self, Error> {
        let url = Url::parse(&entry.url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let status = StatusCode::from_u16(entry.status)
            .map_err(|e| Error::MalformedResponse(format!("cached status {}: {e}", entry.status)))?;

        let mut headers = header::HeaderMap::new();
        if let Some(json) = entry.headers_json.as_deref() {
            let pairs: Vec<(String, String)> = serde_json::from_str(json)?;
            for (name, value) in pairs {
                if let (Ok(name), Ok(value)) =
                    (header::HeaderName::from_bytes(name.as_bytes()), header::HeaderValue::from_str(&value))
                {
                    headers.append(name, value);
                }
            }
        }
        if !headers.contains_key(header::CONTENT_TYPE)
            && let Some(value) = entry.content_type.as_deref().and_then(|v| header::HeaderValue::from_str(v).ok())
        {
            headers.insert(header::CONTENT_TYPE, value);
        }

        Ok(Self { url, status, headers, bytes: Bytes::from(entry.body), source: ResponseSource::Cache })
    }
}

/// Anything able to perform a request against the network.
#[async_trait]
pub trait Network: Send + Sync {
    /// Perform `request`. Non-2xx statuses are returned as responses.
    async fn fetch(&self, request: &Request) -> Result<FetchResponse, Error>;
}

/// HTTP fetch client backed by reqwest.
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let redirect = if config.max_redirects == 0 {
            reqwest::redirect::Policy::none()
        } else {
            reqwest::redirect::Policy::limited(config.max_redirects)
        };

        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(redirect)
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }
}

/// The intercepted request's headers that go upstream.
fn forwarded_headers(headers: &header::HeaderMap) -> header::HeaderMap {
    let mut forwarded = header::HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if !HOP_BY_HOP.contains(&name.as_str()) && !CLIENT_OWNED.contains(&name.as_str()) {
            forwarded.append(name, value.clone());
        }
    }
    forwarded
}

fn transport_error(url: &Url, err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::FetchTimeout(format!("{url}: {err}"))
    } else {
        Error::Network(format!("{url}: {err}"))
    }
}

#[async_trait]
impl Network for FetchClient {
    async fn fetch(&self, request: &Request) -> Result<FetchResponse, Error> {
        let start = Instant::now();
        let url = request.url.clone();

        let mut builder =
            self.http.request(request.method.clone(), url.as_str()).headers(forwarded_headers(&request.headers));
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await.map_err(|e| transport_error(&url, e))?;

        let status = response.status();

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", len, self.config.max_bytes)));
        }

        let mut headers = response.headers().clone();
        for name in HOP_BY_HOP {
            headers.remove(*name);
        }
        // Decoded bodies arrive without content-encoding; the length may still differ.
        headers.remove(header::CONTENT_LENGTH);

        let bytes = response.bytes().await.map_err(|e| transport_error(&url, e))?;

        if bytes.len() > self.config.max_bytes {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", bytes.len(), self.config.max_bytes)));
        }

        let fetch_ms = start.elapsed().as_millis() as u64;

        tracing::debug!(
            "fetched {} {} -> {} in {}ms ({} bytes)",
            request.method,
            url,
            status.as_u16(),
            fetch_ms,
            bytes.len()
        );

        Ok(FetchResponse { url, status, headers, bytes, source: ResponseSource::Network })
    }
}
