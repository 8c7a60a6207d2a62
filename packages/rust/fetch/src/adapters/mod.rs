//! Fetch adapter trait, registry, and built-in adapters.
//!
//! An adapter turns one [`SourceDescriptor`] into a list of raw JSON records.
//! Adapters never normalize; that is the job of [`crate::normalize`].

mod federal_register;
mod github;
mod html;
mod json_api;
mod rss;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use pressroom_shared::{PipelineError, Result, SourceDescriptor};

use crate::error::FetchError;
use crate::http::{HttpFetcher, HttpRequest, query_pairs};

pub use federal_register::FederalRegisterAdapter;
pub use github::GitHubAdapter;
pub use html::HtmlListingAdapter;
pub use json_api::{JsonApiAdapter, extract_records};
pub use rss::RssAdapter;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Everything an adapter needs to fetch one source.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub source: SourceDescriptor,
    /// Maximum number of records to return.
    pub cap: usize,
    pub timeout: Duration,
}

impl FetchRequest {
    pub fn new(source: SourceDescriptor, cap: usize, timeout: Duration) -> Self {
        Self {
            source,
            cap,
            timeout,
        }
    }

    /// A GET for the source URL with its params and headers applied.
    pub fn http_get(&self) -> HttpRequest {
        let mut request = HttpRequest::get(&self.source.url, self.timeout);
        request.params = query_pairs(&self.source.params);
        request.headers = self.source.headers.clone();
        request
    }

    /// Whether the source already sets query parameter `key`.
    pub fn has_param(&self, key: &str) -> bool {
        self.source.params.contains_key(key)
    }
}

/// Retrieves raw records from an external source.
#[async_trait]
pub trait FetchAdapter: Send + Sync {
    /// Registry key, e.g. `"json_api"`.
    fn name(&self) -> &str;

    /// Fetch at most `request.cap` raw records.
    async fn fetch(&self, request: &FetchRequest) -> std::result::Result<Vec<Value>, FetchError>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

type AdapterFactory =
    Box<dyn Fn() -> std::result::Result<Arc<dyn FetchAdapter>, String> + Send + Sync>;

/// Named adapter factories. Names are checked at validation time; adapters are
/// constructed when a run loads them.
pub struct FetchAdapterRegistry {
    factories: BTreeMap<String, AdapterFactory>,
}

impl FetchAdapterRegistry {
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registry with every built-in adapter sharing `fetcher`.
    pub fn with_defaults(fetcher: HttpFetcher) -> Self {
        let mut registry = Self::empty();

        let f = fetcher.clone();
        registry.register_factory("json_api", move || Ok(Arc::new(JsonApiAdapter::new(f.clone()))));
        let f = fetcher.clone();
        registry.register_factory("github", move || Ok(Arc::new(GitHubAdapter::new(f.clone()))));
        let f = fetcher.clone();
        registry.register_factory("federal_register", move || {
            Ok(Arc::new(FederalRegisterAdapter::new(f.clone())))
        });
        let f = fetcher.clone();
        registry.register_factory("rss", move || Ok(Arc::new(RssAdapter::new(f.clone()))));
        let f = fetcher;
        registry.register_factory("html", move || Ok(Arc::new(HtmlListingAdapter::new(f.clone()))));

        registry
    }

    /// Register a ready-made adapter under its own name.
    pub fn register(&mut self, adapter: Arc<dyn FetchAdapter>) {
        let name = adapter.name().to_string();
        self.factories
            .insert(name, Box::new(move || Ok(adapter.clone())));
    }

    /// Register a factory; it runs each time the adapter is loaded.
    pub fn register_factory<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> std::result::Result<Arc<dyn FetchAdapter>, String> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Construct the adapter registered as `name`.
    pub fn load(&self, name: &str) -> Result<Arc<dyn FetchAdapter>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| PipelineError::adapter_load(name, "no such fetch adapter"))?;
        factory().map_err(|message| PipelineError::adapter_load(name, message))
    }
}

impl Default for FetchAdapterRegistry {
    fn default() -> Self {
        Self::empty()
    }
}

/// Parse a JSON body, mapping failures to [`FetchError::Parse`].
pub(crate) fn parse_json(body: &str, url: &str) -> std::result::Result<Value, FetchError> {
    serde_json::from_str(body).map_err(|e| FetchError::Parse {
        url: url.to_string(),
        message: e.to_string(),
    })
}
