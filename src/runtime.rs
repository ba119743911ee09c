//! Fragment runtime
//!
//! One tokio task per placeholder owns the fragment's whole lifecycle:
//! fetch the primary URL, fall back once on failure, report the outcome to
//! the coordinator, then stream the sentinel-wrapped block through a
//! bounded channel. The channel bound is the backpressure mechanism: when
//! the assembler stops reading (slow client), the task blocks on send and
//! stops pulling upstream body bytes.

use crate::error::{Result, StitchError};
use crate::fetcher::{FetchedResponse, UpstreamFetcher};
use crate::fragment::FragmentDescriptor;
use crate::links::AssetLinks;
use crate::metrics::StitchMetrics;
use bytes::Bytes;
use http::StatusCode;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Fetch outcome of one fragment, reported before its body streams
#[derive(Debug, Clone)]
pub struct FragmentHead {
    pub status: StatusCode,
    pub location: Option<String>,
    pub used_fallback: bool,
    pub timed_out: bool,
    /// No usable response from primary or fallback; the slot stays empty
    /// and, for a primary fragment, the whole response becomes a 500
    pub errored: bool,
}

/// Assembler-facing handle to one fragment's output
#[derive(Debug)]
pub struct FragmentStream {
    pub index: usize,
    pub async_: bool,
    /// Bytes written at the placeholder position for async fragments
    pub placeholder: Option<Bytes>,
    /// The sentinel-wrapped block, body included
    pub body: mpsc::Receiver<Bytes>,
}

/// Sentinel and asset markup for one client-runtime instance name
#[derive(Debug, Clone)]
pub struct PipeMarkup {
    pipe_name: Arc<str>,
}

impl PipeMarkup {
    pub fn new(pipe_name: &str) -> Self {
        PipeMarkup {
            pipe_name: Arc::from(pipe_name),
        }
    }

    pub fn start(&self, index: usize, script: Option<&str>) -> String {
        self.call_sentinel("start", index, script)
    }

    pub fn end(&self, index: usize, script: Option<&str>) -> String {
        self.call_sentinel("end", index, script)
    }

    pub fn placeholder(&self, index: usize) -> String {
        format!(
            "<script data-pipe>{}.placeholder({})</script>",
            self.pipe_name, index
        )
    }

    pub fn load_css(&self, url: &str) -> String {
        format!(
            "<script>{}.loadCSS(\"{}\")</script>",
            self.pipe_name,
            escape_js_string(url)
        )
    }

    pub fn stylesheet_link(&self, url: &str) -> String {
        format!("<link rel=\"stylesheet\" href=\"{}\">", url)
    }

    fn call_sentinel(&self, method: &str, index: usize, script: Option<&str>) -> String {
        match script {
            Some(script) => format!(
                "<script data-pipe>{}.{}({}, \"{}\")</script>",
                self.pipe_name,
                method,
                index,
                escape_js_string(script)
            ),
            None => format!(
                "<script data-pipe>{}.{}({})</script>",
                self.pipe_name, method, index
            ),
        }
    }
}

/// Escape a URL for embedding in a double-quoted JS string literal
fn escape_js_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"").replace('<', "\\u003c")
}

/// Spawn the runtime task for one fragment
///
/// Returns the assembler handle and the head receiver the coordinator uses
/// for primary-status handling. The task finishes when the block has been
/// fully sent or the receiving side has gone away.
pub fn spawn(
    descriptor: FragmentDescriptor,
    fetcher: UpstreamFetcher,
    forwarded_headers: http::HeaderMap,
    markup: PipeMarkup,
    channel_capacity: usize,
    metrics: Arc<StitchMetrics>,
) -> (FragmentStream, oneshot::Receiver<FragmentHead>) {
    let (head_tx, head_rx) = oneshot::channel();
    let (body_tx, body_rx) = mpsc::channel(channel_capacity);

    let stream = FragmentStream {
        index: descriptor.index,
        async_: descriptor.async_,
        placeholder: descriptor
            .async_
            .then(|| Bytes::from(markup.placeholder(descriptor.index))),
        body: body_rx,
    };

    tokio::spawn(async move {
        run(descriptor, fetcher, forwarded_headers, markup, metrics, head_tx, body_tx).await;
    });

    (stream, head_rx)
}

async fn run(
    descriptor: FragmentDescriptor,
    fetcher: UpstreamFetcher,
    forwarded_headers: http::HeaderMap,
    markup: PipeMarkup,
    metrics: Arc<StitchMetrics>,
    head_tx: oneshot::Sender<FragmentHead>,
    body_tx: mpsc::Sender<Bytes>,
) {
    let index = descriptor.index;
    match fetch_with_fallback(&descriptor, &fetcher, &forwarded_headers, &metrics).await {
        Ok((response, used_fallback)) => {
            metrics.record_fragment(true);
            let head = FragmentHead {
                status: response.status,
                location: response.location.clone(),
                used_fallback,
                timed_out: false,
                errored: false,
            };
            // The coordinator may have no interest in non-primary heads.
            let _ = head_tx.send(head);
            stream_block(index, &descriptor, response, &markup, &body_tx).await;
        }
        Err(err) => {
            metrics.record_fragment(false);
            if matches!(err, StitchError::FragmentTimeout { .. }) {
                metrics.record_fragment_timeout();
            }
            let head = FragmentHead {
                status: StatusCode::OK,
                location: None,
                used_fallback: false,
                timed_out: matches!(err, StitchError::FragmentTimeout { .. }),
                errored: true,
            };
            let _ = head_tx.send(head);
            debug!("Fragment {} collapsed to an empty slot", index);
            // The slot collapses to nothing; closing the body channel is
            // all the assembler needs to move on.
            drop(body_tx);
        }
    }
}

/// Fetch the primary URL, then the fallback once if the primary attempt
/// failed in a fallback-eligible way
async fn fetch_with_fallback(
    descriptor: &FragmentDescriptor,
    fetcher: &UpstreamFetcher,
    forwarded_headers: &http::HeaderMap,
    metrics: &StitchMetrics,
) -> Result<(FetchedResponse, bool)> {
    let index = descriptor.index;
    let first = fetcher
        .fetch(index, &descriptor.src, forwarded_headers, descriptor.timeout)
        .await;

    match first {
        Ok(response) => Ok((response, false)),
        Err(err) if err.should_fallback() => match &descriptor.fallback_src {
            Some(fallback) => {
                warn!(
                    "Fragment {} failed ({}), trying fallback {}",
                    index, err, fallback
                );
                metrics.record_fragment_fallback();
                let response = fetcher
                    .fetch(index, fallback, forwarded_headers, descriptor.timeout)
                    .await?;
                Ok((response, true))
            }
            None => Err(err),
        },
        Err(err) => Err(err),
    }
}

/// Send the sentinel-wrapped block: asset markup, start, body bytes, end
async fn stream_block(
    index: usize,
    descriptor: &FragmentDescriptor,
    mut response: FetchedResponse,
    markup: &PipeMarkup,
    body_tx: &mpsc::Sender<Bytes>,
) {
    let links = std::mem::take(&mut response.links);
    let mut prelude = String::new();
    push_asset_markup(&mut prelude, descriptor, &links, markup);
    prelude.push_str(&markup.start(index, links.fragment_script.as_deref()));
    if body_tx.send(Bytes::from(prelude)).await.is_err() {
        return;
    }

    loop {
        match response.next_chunk().await {
            Ok(Some(chunk)) => {
                if body_tx.send(chunk).await.is_err() {
                    // Client gone; dropping the response aborts upstream.
                    return;
                }
            }
            Ok(None) => break,
            Err(err) => {
                // Truncate the slot but keep the sentinel pair balanced.
                warn!("Fragment {} body stream failed: {}", index, err);
                break;
            }
        }
    }

    debug!("Fragment {} body complete", index);
    let end = Bytes::from(markup.end(index, links.fragment_script.as_deref()));
    let _ = body_tx.send(end).await;
}

/// Stylesheets go before the start sentinel: `<link>` tags inline,
/// `loadCSS` script wrappers when the block is deferred
fn push_asset_markup(
    out: &mut String,
    descriptor: &FragmentDescriptor,
    links: &AssetLinks,
    markup: &PipeMarkup,
) {
    for url in &links.stylesheets {
        if descriptor.async_ {
            out.push_str(&markup.load_css(url));
        } else {
            out.push_str(&markup.stylesheet_link(url));
        }
    }
}
