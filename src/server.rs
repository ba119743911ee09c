//! Composition HTTP server
//!
//! Accept loop and hyper plumbing around the [`RequestCoordinator`]: every
//! connection gets a service that turns the coordinator's decided head and
//! body channel into a streaming HTTP response. The body is handed to
//! hyper as a `StreamBody`, so client consumption drives the whole
//! pipeline and a dropped connection unwinds it.

use crate::config::StitchConfig;
use crate::coordinator::RequestCoordinator;
use crate::error::{Result, StitchError};
use crate::metrics::StitchMetrics;
use crate::metrics_endpoint::MetricsEndpoint;
use crate::sources::{ClientRequest, ContextSource, FileTemplateSource, StaticContextSource, TemplateSource};
use bytes::Bytes;
use futures::StreamExt;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, StreamBody};
use hyper::body::Frame;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info};

type ResponseBody = BoxBody<Bytes, Infallible>;

/// The composition server
pub struct StitchServer {
    config: Arc<StitchConfig>,
    coordinator: Arc<RequestCoordinator>,
}

impl StitchServer {
    /// Build a server with the default file/static collaborators
    pub fn from_config(config: StitchConfig) -> Result<Self> {
        let templates: Arc<dyn TemplateSource> =
            Arc::new(FileTemplateSource::new(config.template_dir.clone()));
        let contexts: Arc<dyn ContextSource> = Arc::new(StaticContextSource::default());
        Self::with_sources(config, templates, contexts)
    }

    /// Build a server with custom template and context collaborators
    pub fn with_sources(
        config: StitchConfig,
        templates: Arc<dyn TemplateSource>,
        contexts: Arc<dyn ContextSource>,
    ) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let metrics = Arc::new(StitchMetrics::new());
        let coordinator = Arc::new(RequestCoordinator::new(
            config.clone(),
            templates,
            contexts,
            metrics,
        )?);
        Ok(StitchServer {
            config,
            coordinator,
        })
    }

    pub fn coordinator(&self) -> Arc<RequestCoordinator> {
        self.coordinator.clone()
    }

    /// Run the accept loop; returns only on listener failure
    pub async fn start(self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr: SocketAddr = self
            .config
            .listen_address
            .parse()
            .map_err(|e| StitchError::Config(format!("invalid listen address: {}", e)))?;

        if let Some(endpoint) = &self.config.metrics_endpoint {
            if endpoint.enabled {
                let metrics_addr: SocketAddr = endpoint
                    .address
                    .parse()
                    .map_err(|e| StitchError::Config(format!("invalid metrics address: {}", e)))?;
                let metrics = self.coordinator.metrics();
                tokio::spawn(async move {
                    if let Err(err) = MetricsEndpoint::new(metrics, metrics_addr).start().await {
                        error!("Metrics endpoint failed: {}", err);
                    }
                });
            }
        }

        let listener = TcpListener::bind(addr).await?;
        info!("Composition server listening on http://{}", addr);

        loop {
            let (stream, peer) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let coordinator = Arc::clone(&self.coordinator);

            tokio::task::spawn(async move {
                let service = service_fn(move |req| {
                    let coordinator = Arc::clone(&coordinator);
                    async move { handle_request(req, coordinator).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    // Mid-stream client disconnects land here too.
                    tracing::debug!("Connection from {} ended with error: {:?}", peer, err);
                }
            });
        }
    }
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    coordinator: Arc<RequestCoordinator>,
) -> std::result::Result<Response<ResponseBody>, hyper::Error> {
    let client_request = ClientRequest::new(
        req.method().clone(),
        req.uri().path().to_string(),
        req.headers().clone(),
    );

    let composed = coordinator.handle(client_request).await;

    let mut builder = Response::builder().status(composed.status);
    if let Some(headers) = builder.headers_mut() {
        headers.extend(composed.headers);
    }
    Ok(builder
        .body(stream_body(composed.body))
        .unwrap_or_else(|_| {
            Response::builder()
                .status(500)
                .body(empty_body())
                .expect("static response")
        }))
}

fn stream_body(rx: mpsc::Receiver<Bytes>) -> ResponseBody {
    let stream = ReceiverStream::new(rx).map(|chunk| Ok::<_, Infallible>(Frame::data(chunk)));
    BodyExt::boxed(StreamBody::new(stream))
}

fn empty_body() -> ResponseBody {
    BodyExt::boxed(http_body_util::Empty::<Bytes>::new())
}
