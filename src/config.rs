//! Configuration management for the pagestitch service

use crate::error::{Result, StitchError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Configuration for the composition service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StitchConfig {
    /// Address the composition server binds to (default: "127.0.0.1:8080")
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Directory containing template files (default: "./templates")
    #[serde(default = "default_template_dir")]
    pub template_dir: String,

    /// Global name of the client-side runtime object (default: "p")
    #[serde(default = "default_pipe_name")]
    pub pipe_instance_name: String,

    /// Optional file whose contents are emitted inline at the top of every
    /// composed page, typically the client-runtime definition
    #[serde(default)]
    pub pipe_definition_file: Option<String>,

    /// Vendor header prefix forwarded to fragment upstreams (default: "x-zalando-")
    #[serde(default = "default_forward_prefix")]
    pub forward_header_prefix: String,

    /// Fetch timeout for inline fragments in milliseconds (default: 1000)
    #[serde(default = "default_inline_timeout_ms")]
    pub inline_timeout_ms: u64,

    /// Fetch timeout for async fragments in milliseconds (default: 10000)
    #[serde(default = "default_async_timeout_ms")]
    pub async_timeout_ms: u64,

    /// Chunk capacity of each fragment body channel (default: 16)
    ///
    /// This bound is what propagates client backpressure to upstream body
    /// reads; larger values trade memory for burst tolerance.
    #[serde(default = "default_fragment_channel_capacity")]
    pub fragment_channel_capacity: usize,

    /// Chunk capacity of the client output channel (default: 64)
    #[serde(default = "default_output_channel_capacity")]
    pub output_channel_capacity: usize,

    /// Metrics endpoint configuration (optional)
    #[serde(default)]
    pub metrics_endpoint: Option<MetricsEndpointConfig>,
}

/// Configuration for the metrics HTTP endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsEndpointConfig {
    /// Whether to enable the metrics endpoint (default: false)
    #[serde(default)]
    pub enabled: bool,

    /// Address to bind the metrics endpoint to (default: "127.0.0.1:9090")
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

impl Default for MetricsEndpointConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: default_metrics_address(),
        }
    }
}

// Default value functions for serde
fn default_listen_address() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_template_dir() -> String {
    "./templates".to_string()
}

fn default_pipe_name() -> String {
    "p".to_string()
}

fn default_forward_prefix() -> String {
    "x-zalando-".to_string()
}

fn default_inline_timeout_ms() -> u64 {
    1000
}

fn default_async_timeout_ms() -> u64 {
    10000
}

fn default_fragment_channel_capacity() -> usize {
    16
}

fn default_output_channel_capacity() -> usize {
    64
}

fn default_metrics_address() -> String {
    "127.0.0.1:9090".to_string()
}

impl Default for StitchConfig {
    fn default() -> Self {
        StitchConfig {
            listen_address: default_listen_address(),
            template_dir: default_template_dir(),
            pipe_instance_name: default_pipe_name(),
            pipe_definition_file: None,
            forward_header_prefix: default_forward_prefix(),
            inline_timeout_ms: default_inline_timeout_ms(),
            async_timeout_ms: default_async_timeout_ms(),
            fragment_channel_capacity: default_fragment_channel_capacity(),
            output_channel_capacity: default_output_channel_capacity(),
            metrics_endpoint: None,
        }
    }
}

impl StitchConfig {
    /// Load configuration from a YAML file
    ///
    /// # Arguments
    /// * `path` - Path to the YAML configuration file
    ///
    /// # Returns
    /// * `Ok(StitchConfig)` if loading and validation succeed
    /// * `Err(StitchError)` if the file cannot be read or the config is invalid
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| StitchError::Config(format!("Failed to read config file: {}", e)))?;

        let config: StitchConfig = serde_yaml::from_str(&content)
            .map_err(|e| StitchError::Config(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Validation Rules
    /// - listen_address must parse as a socket address
    /// - pipe_instance_name must be a plausible JavaScript identifier
    /// - forward_header_prefix must start with "x-" and end with "-"
    /// - timeouts and channel capacities must be greater than 0
    pub fn validate(&self) -> Result<()> {
        if self.listen_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(StitchError::Config(format!(
                "listen_address is not a valid socket address: {}",
                self.listen_address
            )));
        }

        if self.pipe_instance_name.is_empty()
            || !self
                .pipe_instance_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
            || self
                .pipe_instance_name
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_digit())
        {
            return Err(StitchError::Config(format!(
                "pipe_instance_name must be a JavaScript identifier, got: {:?}",
                self.pipe_instance_name
            )));
        }

        let prefix = self.forward_header_prefix.to_ascii_lowercase();
        if !prefix.starts_with("x-") || !prefix.ends_with('-') || prefix.len() <= 3 {
            return Err(StitchError::Config(format!(
                "forward_header_prefix must look like \"x-<org>-\", got: {}",
                self.forward_header_prefix
            )));
        }

        if self.inline_timeout_ms == 0 || self.async_timeout_ms == 0 {
            return Err(StitchError::Config(
                "fragment timeouts must be greater than 0".to_string(),
            ));
        }

        if self.fragment_channel_capacity == 0 || self.output_channel_capacity == 0 {
            return Err(StitchError::Config(
                "channel capacities must be greater than 0".to_string(),
            ));
        }

        if let Some(ref endpoint) = self.metrics_endpoint {
            if endpoint.enabled && endpoint.address.parse::<std::net::SocketAddr>().is_err() {
                return Err(StitchError::Config(format!(
                    "metrics endpoint address is not a valid socket address: {}",
                    endpoint.address
                )));
            }
        }

        Ok(())
    }

    /// Load the optional pipe-definition payload from disk
    ///
    /// Returns `None` when no file is configured. A configured but
    /// unreadable file is a configuration error, caught at startup rather
    /// than per request.
    pub fn load_pipe_definition(&self) -> Result<Option<String>> {
        match &self.pipe_definition_file {
            None => Ok(None),
            Some(path) => {
                let payload = fs::read_to_string(path).map_err(|e| {
                    StitchError::Config(format!(
                        "Failed to read pipe definition file {}: {}",
                        path, e
                    ))
                })?;
                Ok(Some(payload))
            }
        }
    }
}
