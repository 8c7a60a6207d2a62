//! Source fetching and record normalization.
//!
//! This crate provides:
//! - [`HttpFetcher`] — timeout-bounded HTTP client
//! - [`adapters`] — Fetch adapters (JSON API, GitHub, Federal Register, RSS, HTML)
//! - [`FetchAdapterRegistry`] — Resolves adapters by name
//! - [`normalize`] — Raw record → `ContentItem` mapping

pub mod adapters;
pub mod error;
pub mod http;
pub mod normalize;

pub use adapters::{
    FederalRegisterAdapter, FetchAdapter, FetchAdapterRegistry, FetchRequest, GitHubAdapter,
    HtmlListingAdapter, JsonApiAdapter, RssAdapter, extract_records,
};
pub use error::FetchError;
pub use http::{HttpFetcher, HttpRequest, HttpResponse, query_pairs};
pub use normalize::{FieldStrategy, normalize};
