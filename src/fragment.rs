//! Fragment descriptors
//!
//! A [`FragmentDescriptor`] is the immutable record of one `<fragment>`
//! placeholder after per-request context overrides have been merged in.
//! The parser's attribute list is treated as read-only: the merge builds a
//! fresh record every time, so a template parsed once can serve any number
//! of requests with differing contexts.

use crate::parser::Attribute;
use std::collections::HashMap;
use std::time::Duration;

/// Per-fragment attribute overrides, keyed by fragment id
pub type ContextMap = HashMap<String, HashMap<String, String>>;

/// Default fetch timeouts applied when a fragment has no `timeout` attribute
#[derive(Debug, Clone, Copy)]
pub struct TimeoutDefaults {
    pub inline: Duration,
    pub async_: Duration,
}

impl Default for TimeoutDefaults {
    fn default() -> Self {
        TimeoutDefaults {
            inline: Duration::from_millis(1000),
            async_: Duration::from_millis(10000),
        }
    }
}

/// Immutable description of one fragment placeholder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentDescriptor {
    /// Value of the `id` attribute, the context-override key
    pub id: Option<String>,
    /// Upstream URL; empty when the template and context provided none,
    /// which the runtime treats as an immediate fetch failure
    pub src: String,
    /// Secondary URL tried when the primary attempt fails
    pub fallback_src: Option<String>,
    /// Whether this fragment's status drives the client response
    pub primary: bool,
    /// Whether the body is deferred until after the template ends
    pub async_: bool,
    /// Upstream head timeout
    pub timeout: Duration,
    /// Position of this placeholder in template order, from 0
    pub index: usize,
}

impl FragmentDescriptor {
    /// Build a descriptor from parsed attributes and context overrides
    ///
    /// Context values override raw attribute values key-by-key; a fragment
    /// without an `id` is never overridden. Neither input is mutated.
    ///
    /// # Arguments
    /// * `attrs` - attributes as emitted by the template parser
    /// * `context` - per-request override map, keyed by fragment id
    /// * `index` - placeholder position in template order
    /// * `defaults` - timeouts used when no `timeout` attribute is present
    pub fn from_attrs(
        attrs: &[Attribute],
        context: &ContextMap,
        index: usize,
        defaults: TimeoutDefaults,
    ) -> Self {
        let mut merged: HashMap<&str, Option<&str>> = HashMap::new();
        for attr in attrs {
            // First occurrence wins, as in HTML attribute parsing.
            merged
                .entry(attr.name.as_str())
                .or_insert(attr.value.as_deref());
        }

        let id = merged
            .get("id")
            .and_then(|v| *v)
            .map(|v| v.to_string())
            .filter(|v| !v.is_empty());

        if let Some(overrides) = id.as_ref().and_then(|id| context.get(id)) {
            for (key, value) in overrides {
                merged.insert(key.as_str(), Some(value.as_str()));
            }
        }

        let src = merged
            .get("src")
            .and_then(|v| *v)
            .unwrap_or_default()
            .to_string();
        let fallback_src = merged
            .get("fallback-src")
            .and_then(|v| *v)
            .map(|v| v.to_string())
            .filter(|v| !v.is_empty());
        let primary = bool_attr(merged.get("primary").copied());
        let async_ = bool_attr(merged.get("async").copied());

        let default_timeout = if async_ {
            defaults.async_
        } else {
            defaults.inline
        };
        let timeout = merged
            .get("timeout")
            .and_then(|v| *v)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(default_timeout);

        FragmentDescriptor {
            id,
            src,
            fallback_src,
            primary,
            async_,
            timeout,
            index,
        }
    }
}

/// Boolean attribute semantics: absent means false, present means true,
/// except the literal value `"false"` which explicitly disables
fn bool_attr(entry: Option<Option<&str>>) -> bool {
    match entry {
        None => false,
        Some(Some(v)) => !v.eq_ignore_ascii_case("false"),
        Some(None) => true,
    }
}
