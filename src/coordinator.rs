//! Request coordinator
//!
//! One `handle` call per client request: template and context are fetched
//! in parallel, the parser is driven over the template stream, a fragment
//! runtime is spawned per placeholder, and the assembler writes the
//! ordered result into the response body channel.
//!
//! The response head is withheld until it can be decided: the first
//! primary fragment in template order determines status and `Location`
//! (500 on its terminal failure), and a template with no primary fragment
//! gets a 200 once parsing has finished dispatching. Whichever decision
//! arrives first wins, so a template error beats a still-pending primary
//! and a decided head turns later errors into a plain truncated stream.

use crate::assembler::{self, AssemblyItem};
use crate::config::StitchConfig;
use crate::error::StitchError;
use crate::fetcher::UpstreamFetcher;
use crate::fragment::{ContextMap, FragmentDescriptor, TimeoutDefaults};
use crate::metrics::StitchMetrics;
use crate::parser::{TemplateEvent, TemplateParser};
use crate::runtime::{self, PipeMarkup};
use crate::sources::{ClientRequest, ContextSource, TemplateSource, TemplateStream};
use bytes::Bytes;
use futures::StreamExt;
use http::header::{HeaderMap, HeaderValue, CACHE_CONTROL, CONTENT_TYPE, LOCATION, PRAGMA};
use http::StatusCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// A decided client response with a streaming body
#[derive(Debug)]
pub struct ComposedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: mpsc::Receiver<Bytes>,
}

/// How the response head was decided
#[derive(Debug)]
enum HeadDecision {
    Ready {
        status: StatusCode,
        location: Option<String>,
        from_primary: bool,
    },
    Failed,
}

/// Per-request orchestrator, shared across all requests
pub struct RequestCoordinator {
    config: Arc<StitchConfig>,
    templates: Arc<dyn TemplateSource>,
    contexts: Arc<dyn ContextSource>,
    fetcher: UpstreamFetcher,
    markup: PipeMarkup,
    pipe_definition: Option<Bytes>,
    metrics: Arc<StitchMetrics>,
}

impl RequestCoordinator {
    pub fn new(
        config: Arc<StitchConfig>,
        templates: Arc<dyn TemplateSource>,
        contexts: Arc<dyn ContextSource>,
        metrics: Arc<StitchMetrics>,
    ) -> crate::error::Result<Self> {
        let fetcher = UpstreamFetcher::new(&config.forward_header_prefix)?;
        let markup = PipeMarkup::new(&config.pipe_instance_name);
        let pipe_definition = config.load_pipe_definition()?.map(Bytes::from);
        Ok(RequestCoordinator {
            config,
            templates,
            contexts,
            fetcher,
            markup,
            pipe_definition,
            metrics,
        })
    }

    pub fn metrics(&self) -> Arc<StitchMetrics> {
        self.metrics.clone()
    }

    /// Compose the response for one client request
    ///
    /// Never fails outright: acquisition and parse failures become a 500
    /// with an empty body, exactly like a failed primary fragment.
    pub async fn handle(&self, request: ClientRequest) -> ComposedResponse {
        self.metrics.record_request();

        let (template, context) = match tokio::join!(
            self.templates.fetch_template(&request),
            self.contexts.fetch_context(&request),
        ) {
            (Ok(template), Ok(context)) => (template, context),
            (Err(err), _) | (_, Err(err)) => {
                warn!("Request for {} failed before composition: {}", request.path, err);
                self.metrics.record_failed_request();
                return self.error_response(StatusCode::from_u16(err.to_http_status()).unwrap_or(
                    StatusCode::INTERNAL_SERVER_ERROR,
                ));
            }
        };

        let (out_tx, out_rx) = mpsc::channel(self.config.output_channel_capacity);
        let (item_tx, item_rx) = mpsc::unbounded_channel();
        let (decision_tx, mut decision_rx) = mpsc::channel(2);

        tokio::spawn(assembler_task(item_rx, out_tx, self.metrics.clone()));

        let compose = Compose {
            fetcher: self.fetcher.clone(),
            forwarded_headers: self.fetcher.forward_headers(&request.headers),
            markup: self.markup.clone(),
            defaults: TimeoutDefaults {
                inline: std::time::Duration::from_millis(self.config.inline_timeout_ms),
                async_: std::time::Duration::from_millis(self.config.async_timeout_ms),
            },
            channel_capacity: self.config.fragment_channel_capacity,
            metrics: self.metrics.clone(),
            pipe_definition: self.pipe_definition.clone(),
        };
        tokio::spawn(compose.run(template, context, item_tx, decision_tx));

        match decision_rx.recv().await {
            Some(HeadDecision::Ready {
                status,
                location,
                from_primary,
            }) => {
                if from_primary {
                    self.metrics.record_primary_response();
                }
                let mut headers = standard_headers();
                if let Some(location) = location {
                    if let Ok(value) = HeaderValue::from_str(&location) {
                        headers.insert(LOCATION, value);
                    }
                }
                ComposedResponse {
                    status,
                    headers,
                    body: out_rx,
                }
            }
            Some(HeadDecision::Failed) | None => {
                self.metrics.record_failed_request();
                // Dropping the body receiver unwinds the whole pipeline.
                self.error_response(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    fn error_response(&self, status: StatusCode) -> ComposedResponse {
        let (_, body) = mpsc::channel(1);
        ComposedResponse {
            status,
            headers: standard_headers(),
            body,
        }
    }
}

/// Headers set on every response, success or failure
fn standard_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));
    headers
}

async fn assembler_task(
    items: mpsc::UnboundedReceiver<AssemblyItem>,
    out: mpsc::Sender<Bytes>,
    metrics: Arc<StitchMetrics>,
) {
    match assembler::assemble(items, out, metrics).await {
        Ok(()) => {}
        Err(StitchError::ClientDisconnect) => {
            debug!("Client went away mid-stream; assembly stopped");
        }
        Err(err) => warn!("Assembly failed: {}", err),
    }
}

/// State for the template-driving task of one request
struct Compose {
    fetcher: UpstreamFetcher,
    forwarded_headers: HeaderMap,
    markup: PipeMarkup,
    defaults: TimeoutDefaults,
    channel_capacity: usize,
    metrics: Arc<StitchMetrics>,
    pipe_definition: Option<Bytes>,
}

impl Compose {
    async fn run(
        self,
        mut template: TemplateStream,
        context: ContextMap,
        item_tx: mpsc::UnboundedSender<AssemblyItem>,
        decision_tx: mpsc::Sender<HeadDecision>,
    ) {
        let mut parser = TemplateParser::new();
        let mut next_index = 0usize;
        let mut primary_seen = false;

        if let Some(definition) = self.pipe_definition.clone() {
            let _ = item_tx.send(AssemblyItem::Chunk(definition));
        }

        loop {
            if item_tx.is_closed() {
                // Client went away; stop parsing and spawning fetches.
                debug!("Assembly gone, abandoning template parse");
                return;
            }
            let events = match template.next().await {
                Some(Ok(chunk)) => match parser.push(&chunk) {
                    Ok(events) => events,
                    Err(err) => {
                        warn!("Template parse failed: {}", err);
                        let _ = decision_tx.send(HeadDecision::Failed).await;
                        return;
                    }
                },
                Some(Err(err)) => {
                    warn!("Template stream failed: {}", err);
                    let _ = decision_tx.send(HeadDecision::Failed).await;
                    return;
                }
                None => break,
            };
            self.dispatch(events, &context, &mut next_index, &mut primary_seen, &item_tx, &decision_tx);
        }

        match parser.finish() {
            Ok(events) => {
                self.dispatch(events, &context, &mut next_index, &mut primary_seen, &item_tx, &decision_tx);
            }
            Err(err) => {
                warn!("Template parse failed at end of stream: {}", err);
                let _ = decision_tx.send(HeadDecision::Failed).await;
                return;
            }
        }

        if !primary_seen {
            let _ = decision_tx
                .send(HeadDecision::Ready {
                    status: StatusCode::OK,
                    location: None,
                    from_primary: false,
                })
                .await;
        }
        // Dropping item_tx lets the assembler flush async fragments.
    }

    fn dispatch(
        &self,
        events: Vec<TemplateEvent>,
        context: &ContextMap,
        next_index: &mut usize,
        primary_seen: &mut bool,
        item_tx: &mpsc::UnboundedSender<AssemblyItem>,
        decision_tx: &mpsc::Sender<HeadDecision>,
    ) {
        for event in events {
            match event {
                TemplateEvent::Fragment { attrs } => {
                    let descriptor = FragmentDescriptor::from_attrs(
                        &attrs,
                        context,
                        *next_index,
                        self.defaults,
                    );
                    *next_index += 1;
                    debug!(
                        "Dispatching fragment {} src={} primary={} async={}",
                        descriptor.index, descriptor.src, descriptor.primary, descriptor.async_
                    );

                    let is_deciding_primary = descriptor.primary && !*primary_seen;
                    let (stream, head_rx) = runtime::spawn(
                        descriptor,
                        self.fetcher.clone(),
                        self.forwarded_headers.clone(),
                        self.markup.clone(),
                        self.channel_capacity,
                        self.metrics.clone(),
                    );

                    if is_deciding_primary {
                        *primary_seen = true;
                        let decision_tx = decision_tx.clone();
                        tokio::spawn(async move {
                            let decision = match head_rx.await {
                                Ok(head) if !head.errored => HeadDecision::Ready {
                                    status: head.status,
                                    location: head
                                        .location
                                        .filter(|_| head.status.is_redirection()),
                                    from_primary: true,
                                },
                                _ => HeadDecision::Failed,
                            };
                            let _ = decision_tx.send(decision).await;
                        });
                    }

                    let _ = item_tx.send(AssemblyItem::Fragment(stream));
                }
                other => {
                    if let Some(raw) = other.raw_bytes() {
                        let _ = item_tx.send(AssemblyItem::Chunk(raw.clone()));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{FileTemplateSource, StaticContextSource};
    use http::Method;

    async fn body_string(mut body: mpsc::Receiver<Bytes>) -> String {
        let mut out = Vec::new();
        while let Some(chunk) = body.recv().await {
            out.extend_from_slice(&chunk);
        }
        String::from_utf8(out).unwrap()
    }

    fn coordinator_for(dir: &std::path::Path) -> RequestCoordinator {
        let config = Arc::new(StitchConfig {
            template_dir: dir.to_str().unwrap().to_string(),
            ..Default::default()
        });
        RequestCoordinator::new(
            config,
            Arc::new(FileTemplateSource::new(dir)),
            Arc::new(StaticContextSource::default()),
            Arc::new(StitchMetrics::new()),
        )
        .unwrap()
    }

    fn request(path: &str) -> ClientRequest {
        ClientRequest::new(Method::GET, path, HeaderMap::new())
    }

    #[tokio::test]
    async fn test_fragmentless_template_passthrough() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("plain.html"), "<html><body>hi</body></html>").unwrap();
        let coordinator = coordinator_for(dir.path());

        let response = coordinator.handle(request("/plain")).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(
            response.headers.get(CACHE_CONTROL).unwrap(),
            "no-cache, no-store, must-revalidate"
        );
        assert_eq!(response.headers.get(PRAGMA).unwrap(), "no-cache");
        assert_eq!(response.headers.get(CONTENT_TYPE).unwrap(), "text/html");
        assert_eq!(body_string(response.body).await, "<html><body>hi</body></html>");
    }

    #[tokio::test]
    async fn test_missing_template_is_500() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator_for(dir.path());

        let response = coordinator.handle(request("/absent")).await;
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_string(response.body).await, "");
        assert_eq!(coordinator.metrics().get_stats().failed_requests, 1);
    }

    #[tokio::test]
    async fn test_malformed_template_is_500() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.html"), "<html><div class=").unwrap();
        let coordinator = coordinator_for(dir.path());

        let response = coordinator.handle(request("/broken")).await;
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_string(response.body).await, "");
    }
}
