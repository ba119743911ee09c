//! pagestitch
//!
//! A streaming HTML layout/composition service: templates containing
//! `<fragment>` placeholders are streamed to the client while each
//! placeholder is filled with content fetched concurrently from an
//! upstream service. Out-of-order fragments are stitched into their slots
//! by a tiny browser runtime whose calls this service emits inline.
//!
//! # Overview
//!
//! A request is served by streaming the template from the very first byte:
//! the incremental parser tokenizes template chunks as they arrive, every
//! `<fragment>` placeholder immediately starts an upstream fetch, and the
//! assembler interleaves template bytes with fragment bodies in template
//! order. Fragments marked `async` only leave a placeholder sentinel
//! behind; their bodies follow after the template has ended. A fragment
//! marked `primary` controls the response status the client sees.
//!
//! # Architecture
//!
//! - [`TemplateParser`]: incremental tokenizer producing template events
//! - [`FragmentDescriptor`]: one placeholder with context overrides merged
//! - [`UpstreamFetcher`]: single-attempt GET with head timeout and header
//!   forwarding
//! - `runtime`: per-fragment task handling primary/fallback and sentinel
//!   emission
//! - `assembler`: template-ordered multiplexing of fragment streams
//! - [`RequestCoordinator`]: per-request orchestration and head decision
//! - [`StitchServer`]: hyper accept loop around the coordinator
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use pagestitch::{StitchConfig, StitchServer};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let config = StitchConfig::from_file("pagestitch.yaml")?;
//! let server = StitchServer::from_config(config)?;
//! server.start().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Template syntax
//!
//! Any HTML-ish stream. A fragment placeholder is a tag named `fragment`:
//!
//! ```html
//! <fragment id="cart" src="https://cart.example/box"
//!           fallback-src="https://cart.example/static" timeout="300">
//! ```
//!
//! Recognized attributes: `id`, `src`, `fallback-src`, `primary` (boolean),
//! `async` (boolean, `async=false` disables), `timeout` (milliseconds).

pub mod assembler;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod fetcher;
pub mod fragment;
pub mod links;
pub mod metrics;
pub mod metrics_endpoint;
pub mod parser;
pub mod runtime;
pub mod server;
pub mod sources;

// Re-export commonly used types
pub use config::{MetricsEndpointConfig, StitchConfig};
pub use coordinator::{ComposedResponse, RequestCoordinator};
pub use error::{Result, StitchError};
pub use fetcher::{FetchedResponse, UpstreamFetcher};
pub use fragment::{ContextMap, FragmentDescriptor, TimeoutDefaults};
pub use links::AssetLinks;
pub use metrics::{MetricsSnapshot, StitchMetrics};
pub use metrics_endpoint::MetricsEndpoint;
pub use parser::{Attribute, TemplateEvent, TemplateParser};
pub use runtime::{FragmentHead, FragmentStream, PipeMarkup};
pub use server::StitchServer;
pub use sources::{
    ClientRequest, ContextSource, FileTemplateSource, StaticContextSource, TemplateSource,
    TemplateStream,
};
