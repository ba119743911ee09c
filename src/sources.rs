//! Collaborator interfaces for template and context acquisition
//!
//! The coordinator only consumes these seams; how template bytes and
//! per-request overrides are produced is somebody else's business. The
//! shipped implementations are deliberately small: templates come from a
//! directory on disk, contexts from a fixed map (empty by default).

use crate::error::{Result, StitchError};
use crate::fragment::ContextMap;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use http::{HeaderMap, Method};
use std::path::{Component, PathBuf};
use tracing::debug;

/// Template bytes as a lazy chunk stream
pub type TemplateStream = BoxStream<'static, Result<Bytes>>;

/// The parts of the client request the composition core needs
#[derive(Debug, Clone)]
pub struct ClientRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
}

impl ClientRequest {
    pub fn new(method: Method, path: impl Into<String>, headers: HeaderMap) -> Self {
        ClientRequest {
            method,
            path: path.into(),
            headers,
        }
    }
}

/// Produces the template byte stream for a request
#[async_trait]
pub trait TemplateSource: Send + Sync {
    async fn fetch_template(&self, request: &ClientRequest) -> Result<TemplateStream>;
}

/// Produces the per-request fragment attribute overrides
#[async_trait]
pub trait ContextSource: Send + Sync {
    async fn fetch_context(&self, request: &ClientRequest) -> Result<ContextMap>;
}

/// Serves templates from files under a base directory
///
/// `/` maps to `index.html`; any other path maps to the same relative file
/// name, with `.html` appended when the path has no extension. Paths that
/// try to climb out of the base directory are rejected.
#[derive(Debug, Clone)]
pub struct FileTemplateSource {
    base_dir: PathBuf,
}

impl FileTemplateSource {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        FileTemplateSource {
            base_dir: base_dir.into(),
        }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let trimmed = path.trim_start_matches('/');
        let mut relative = if trimmed.is_empty() {
            PathBuf::from("index.html")
        } else {
            PathBuf::from(trimmed)
        };
        if relative.extension().is_none() {
            relative.set_extension("html");
        }
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(StitchError::TemplateFetch(format!(
                "template path is not plain relative: {}",
                path
            )));
        }
        Ok(self.base_dir.join(relative))
    }
}

#[async_trait]
impl TemplateSource for FileTemplateSource {
    async fn fetch_template(&self, request: &ClientRequest) -> Result<TemplateStream> {
        let file = self.resolve(&request.path)?;
        debug!("Loading template {}", file.display());
        let contents = tokio::fs::read(&file).await.map_err(|e| {
            StitchError::TemplateFetch(format!(
                "failed to read template {}: {}",
                file.display(),
                e
            ))
        })?;
        Ok(stream::iter([Ok(Bytes::from(contents))]).boxed())
    }
}

/// A fixed context map, the same for every request
#[derive(Debug, Clone, Default)]
pub struct StaticContextSource {
    context: ContextMap,
}

impl StaticContextSource {
    pub fn new(context: ContextMap) -> Self {
        StaticContextSource { context }
    }
}

#[async_trait]
impl ContextSource for StaticContextSource {
    async fn fetch_context(&self, _request: &ClientRequest) -> Result<ContextMap> {
        Ok(self.context.clone())
    }
}
