//! Catalog providers.
//!
//! The two upstreams share the same fragile shape — an HTML search page and
//! an HTML detail page — so both hide behind small async traits and share
//! the [`RetryingFetcher`](crate::fetch::RetryingFetcher) and the title
//! utilities. Selector breakage surfaces as [`ProviderError::Parse`], which
//! is distinct from fetch exhaustion and handled the same way downstream.

pub mod coop;
pub mod standalone;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::fetch::FetchError;
use crate::types::{Candidate, StandaloneLine};

pub use coop::HttpCoopCatalog;
pub use standalone::HttpStandaloneCatalog;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("expected markup missing: {0}")]
    Parse(&'static str),
}

/// Single-instance catalog: free-text search plus a detail page carrying a
/// password block and named download links.
#[async_trait]
pub trait StandaloneCatalog: Send + Sync {
    /// Ranked candidates for `term`, de-duplicated by detail URL, capped at
    /// display size. Zero matches is `Ok(vec![])`, not an error.
    async fn search(&self, term: &str) -> Result<Vec<Candidate>, ProviderError>;

    /// Password / extract-code / download lines for one detail page.
    async fn fetch_detail(&self, detail_url: &str) -> Result<Vec<StandaloneLine>, ProviderError>;
}

/// One shared-session search hit. `href` doubles as the fallback resource
/// link when the detail fetch is exhausted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoopCandidate {
    pub title: String,
    pub href: String,
}

/// Parsed shared-session detail page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoopDetail {
    /// Normalized `YYYY-MM-DD HH:MM`, or `"unknown"` when the page carries
    /// no recognizable date.
    pub updated: String,
    pub resource_link: Option<String>,
}

/// Shared-session catalog: keyword search filtered to the shared-session
/// category, plus a detail page with an update date and a torrent link.
#[async_trait]
pub trait CoopCatalog: Send + Sync {
    async fn search(&self, keyword: &str) -> Result<Vec<CoopCandidate>, ProviderError>;

    async fn fetch_detail(&self, candidate: &CoopCandidate) -> Result<CoopDetail, ProviderError>;
}
