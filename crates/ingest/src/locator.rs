//! Identity resolution and stream lookup.
//!
//! The router asks a [`StreamResolver`] two questions per request: who is
//! sending (the [`StreamLocator`]) and which stream that identity maps to.
//! [`StaticStreamRegistry`] answers both from configuration loaded at startup.
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use http::HeaderMap;
use serde_json::Value;

use crate::error::LocatorError;
use crate::metadata;
use crate::types::{IngestType, SharedStream, StreamConfig, StreamLocator};

/// Resolves request identity to a configured stream.
#[async_trait]
pub trait StreamResolver: Send + Sync {
    /// Derives the locator from request headers and the decoded event.
    async fn locate(
        &self,
        ingest_type: IngestType,
        headers: &HeaderMap,
        event: &Value,
    ) -> Result<StreamLocator, LocatorError>;

    /// Read-only snapshot of the stream the locator points at.
    fn stream(&self, locator: &StreamLocator) -> Option<SharedStream>;
}

/// Immutable stream table built from configuration.
///
/// Lookup order: server keys for S2S traffic, browser keys for browser
/// traffic, then slug, then domain.
#[derive(Debug, Default)]
pub struct StaticStreamRegistry {
    data_domain: Option<String>,
    by_id: HashMap<String, SharedStream>,
    server_keys: HashMap<String, SharedStream>,
    browser_keys: HashMap<String, SharedStream>,
    slugs: HashMap<String, SharedStream>,
    domains: HashMap<String, SharedStream>,
}

impl StaticStreamRegistry {
    /// `data_domain` is the parent domain for `<slug>.<data_domain>` hosts.
    pub fn new(data_domain: Option<String>, streams: impl IntoIterator<Item = StreamConfig>) -> Self {
        let mut registry = Self {
            data_domain: data_domain
                .map(|d| d.trim_start_matches('.').to_ascii_lowercase())
                .filter(|d| !d.is_empty()),
            ..Default::default()
        };
        for stream in streams {
            registry.insert(Arc::new(stream));
        }
        registry
    }

    fn insert(&mut self, stream: SharedStream) {
        for key in &stream.server_keys {
            self.server_keys.insert(key.clone(), Arc::clone(&stream));
        }
        for key in &stream.browser_keys {
            self.browser_keys.insert(key.clone(), Arc::clone(&stream));
        }
        if let Some(slug) = stream.slug.as_ref().filter(|s| !s.is_empty()) {
            self.slugs.insert(slug.to_ascii_lowercase(), Arc::clone(&stream));
        }
        for domain in &stream.domains {
            self.domains
                .insert(domain.to_ascii_lowercase(), Arc::clone(&stream));
        }
        self.by_id.insert(stream.id.clone(), stream);
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn get(&self, stream_id: &str) -> Option<SharedStream> {
        self.by_id.get(stream_id).cloned()
    }

    fn find(&self, ingest_type: IngestType, locator: &StreamLocator) -> Option<&SharedStream> {
        if let Some(key) = locator.write_key.as_deref() {
            let keys = match ingest_type {
                IngestType::S2S => &self.server_keys,
                IngestType::Browser => &self.browser_keys,
            };
            return keys.get(key);
        }
        locator
            .slug
            .as_deref()
            .and_then(|s| self.slugs.get(s))
            .or_else(|| locator.domain.as_deref().and_then(|d| self.domains.get(d)))
    }

    /// Splits a host into a slug when it is a direct child of the data
    /// domain.
    fn slug_for_host<'a>(&self, host: &'a str) -> Option<&'a str> {
        let parent = self.data_domain.as_deref()?;
        host.strip_suffix(parent)?
            .strip_suffix('.')
            .filter(|s| !s.is_empty() && !s.contains('.'))
    }
}

#[async_trait]
impl StreamResolver for StaticStreamRegistry {
    async fn locate(
        &self,
        ingest_type: IngestType,
        headers: &HeaderMap,
        event: &Value,
    ) -> Result<StreamLocator, LocatorError> {
        let write_key = match metadata::write_key(headers)? {
            Some(key) => Some(key),
            None => event
                .get("writeKey")
                .and_then(Value::as_str)
                .filter(|k| !k.is_empty())
                .map(str::to_string),
        };

        let mut locator = StreamLocator::default();
        match write_key {
            Some(key) => locator.write_key = Some(key),
            None if ingest_type == IngestType::S2S => return Err(LocatorError::MissingWriteKey),
            None => {
                let host = metadata::host(headers).ok_or(LocatorError::MissingIdentity)?;
                match self.slug_for_host(&host) {
                    Some(slug) => locator.slug = Some(slug.to_string()),
                    None => locator.domain = Some(host),
                }
            }
        }

        if let Some(stream) = self.find(ingest_type, &locator) {
            locator.stream_id = Some(stream.id.clone());
            if locator.slug.is_none() {
                locator.slug = stream.slug.clone();
            }
        }
        Ok(locator)
    }

    fn stream(&self, locator: &StreamLocator) -> Option<SharedStream> {
        locator.stream_id.as_deref().and_then(|id| self.get(id))
    }
}
