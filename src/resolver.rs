//! Two-branch resource resolution for a chosen candidate.
//!
//! The standalone and shared-session branches run concurrently and are
//! isolated from each other: exhaustion or parse failure in one never
//! drops the other's result. Whatever was found is delivered; the bundle
//! is only a total failure when both branches come back empty.

use std::sync::Arc;

use crate::providers::{CoopCatalog, StandaloneCatalog};
use crate::title::normalize;
use crate::translate::CachingTranslator;
use crate::types::{Candidate, CoopItem, ResourceBundle, StandaloneLine, UNLOCK_CODE};

pub struct ResourceResolver {
    standalone: Arc<dyn StandaloneCatalog>,
    coop: Arc<dyn CoopCatalog>,
    translator: Option<Arc<CachingTranslator>>,
}

impl ResourceResolver {
    pub fn new(
        standalone: Arc<dyn StandaloneCatalog>,
        coop: Arc<dyn CoopCatalog>,
        translator: Option<Arc<CachingTranslator>>,
    ) -> Self {
        Self {
            standalone,
            coop,
            translator,
        }
    }

    /// Resolve one candidate against both providers. Infallible at this
    /// boundary: every upstream condition becomes an in-band line or flag.
    pub async fn resolve(&self, candidate: &Candidate) -> ResourceBundle {
        let normalized = normalize(&candidate.raw_title);
        tracing::info!(
            title = %candidate.raw_title,
            keyword = %normalized.keyword,
            "Resolving candidate"
        );

        let (standalone, coop) = tokio::join!(
            self.resolve_standalone(candidate),
            self.resolve_coop(&normalized.keyword),
        );

        // Best-effort display-name refinement when the raw title had no
        // native-script segment to show.
        let display_name = match &self.translator {
            Some(translator) if normalized.display_name == normalized.keyword => {
                translator.display_title(&normalized.keyword).await
            }
            _ => normalized.display_name.clone(),
        };

        ResourceBundle {
            display_name,
            keyword: normalized.keyword,
            standalone,
            coop,
        }
    }

    async fn resolve_standalone(&self, candidate: &Candidate) -> Vec<StandaloneLine> {
        match self.standalone.fetch_detail(&candidate.detail_url).await {
            Ok(lines) => lines,
            Err(e) => {
                tracing::warn!(
                    detail_url = %candidate.detail_url,
                    error = %e,
                    "Standalone branch exhausted"
                );
                vec![StandaloneLine::Note(
                    "no standalone resources found".to_string(),
                )]
            }
        }
    }

    async fn resolve_coop(&self, keyword: &str) -> Vec<CoopItem> {
        let hits = match self.coop.search(keyword).await {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!(keyword, error = %e, "Shared-session search exhausted");
                return Vec::new();
            }
        };

        let mut items = Vec::with_capacity(hits.len());
        for hit in hits {
            match self.coop.fetch_detail(&hit).await {
                Ok(detail) => items.push(CoopItem {
                    title: hit.title,
                    unlock_code: UNLOCK_CODE.to_string(),
                    updated: detail.updated,
                    resource_link: detail.resource_link,
                    degraded: false,
                }),
                Err(e) => {
                    // Fallback policy: the search-result link stands in for
                    // the unreachable detail page, flagged as degraded so
                    // consumers can tell resolved from guessed.
                    tracing::warn!(href = %hit.href, error = %e, "Shared-session detail exhausted; applying fallback");
                    items.push(CoopItem {
                        title: hit.title,
                        unlock_code: UNLOCK_CODE.to_string(),
                        updated: format!("upstream unreachable ({e})"),
                        resource_link: Some(hit.href),
                        degraded: true,
                    });
                }
            }
        }
        items
    }
}
