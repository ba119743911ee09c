//! Upstream fragment fetcher
//!
//! One shared `reqwest::Client` issues a single GET per fragment attempt.
//! The timeout covers the response head only; body bytes are read on
//! demand by the assembler so that a slow client throttles upstream reads
//! instead of buffering them. Redirects are never followed: a 3xx from a
//! primary fragment is forwarded to the browser.

use crate::error::{Result, StitchError};
use crate::links::AssetLinks;
use bytes::Bytes;
use http::header::{HeaderMap, ACCEPT_LANGUAGE, LOCATION, REFERER, USER_AGENT};
use http::StatusCode;
use reqwest::redirect::Policy;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

/// Request headers forwarded verbatim to fragment upstreams; everything
/// else, `Cookie` included, is dropped.
const FORWARDED_HEADERS: [http::header::HeaderName; 3] =
    [REFERER, ACCEPT_LANGUAGE, USER_AGENT];

/// Successful upstream response with its body still unread
#[derive(Debug)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub location: Option<String>,
    pub links: AssetLinks,
    body: reqwest::Response,
}

impl FetchedResponse {
    /// Read the next upstream body chunk, `None` at end of body
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        self.body
            .chunk()
            .await
            .map_err(|e| StitchError::Http(format!("upstream body read failed: {}", e)))
    }
}

/// Shared HTTP client for fragment upstreams
#[derive(Debug, Clone)]
pub struct UpstreamFetcher {
    client: Client,
    forward_prefix: String,
}

impl UpstreamFetcher {
    /// Create a fetcher forwarding vendor headers matching `forward_prefix`
    pub fn new(forward_prefix: &str) -> Result<Self> {
        let client = Client::builder()
            .redirect(Policy::none())
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| StitchError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(UpstreamFetcher {
            client,
            forward_prefix: forward_prefix.to_ascii_lowercase(),
        })
    }

    /// Select the client request headers that may travel upstream
    ///
    /// Exactly `Referer`, `Accept-Language` and `User-Agent`, plus any
    /// header under the configured vendor prefix. Values are forwarded
    /// verbatim.
    pub fn forward_headers(&self, client_headers: &HeaderMap) -> HeaderMap {
        let mut forwarded = HeaderMap::new();
        for name in FORWARDED_HEADERS {
            for value in client_headers.get_all(&name) {
                forwarded.append(name.clone(), value.clone());
            }
        }
        for (name, value) in client_headers {
            if name.as_str().starts_with(&self.forward_prefix) {
                forwarded.append(name.clone(), value.clone());
            }
        }
        forwarded
    }

    /// Issue one GET and wait for the response head under `timeout`
    ///
    /// Success means a head with status below 500 arrived in time; the
    /// three failure modes (timeout, transport error, upstream 5xx) map to
    /// their own error variants so the runtime can distinguish them. On
    /// failure the connection is dropped, discarding any partial body.
    pub async fn fetch(
        &self,
        index: usize,
        url: &str,
        headers: &HeaderMap,
        timeout: Duration,
    ) -> Result<FetchedResponse> {
        if url.is_empty() {
            return Err(StitchError::FragmentNetwork {
                index,
                message: "fragment has no src URL".to_string(),
            });
        }
        debug!("Fetching fragment {} from {}", index, url);

        let request = self.client.get(url).headers(headers.clone());
        let response = tokio::time::timeout(timeout, request.send())
            .await
            .map_err(|_| {
                warn!("Fragment {} timed out after {:?} fetching {}", index, timeout, url);
                StitchError::FragmentTimeout {
                    index,
                    timeout_ms: timeout.as_millis() as u64,
                }
            })?
            .map_err(|e| {
                warn!("Fragment {} network error fetching {}: {}", index, url, e);
                StitchError::FragmentNetwork {
                    index,
                    message: e.to_string(),
                }
            })?;

        let status = response.status();
        if status.is_server_error() {
            warn!("Fragment {} upstream {} returned {}", index, url, status);
            return Err(StitchError::FragmentServer {
                index,
                status: status.as_u16(),
            });
        }

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let links = AssetLinks::from_headers(response.headers());

        debug!("Fragment {} responded with status {}", index, status);
        Ok(FetchedResponse {
            status,
            location,
            links,
            body: response,
        })
    }
}
