//! Opportunistic title translation.
//!
//! The actual translation lives outside the core (a chat-completion API
//! extension); the engine only sees the [`TitleTranslator`] trait. Results
//! are cached behind a bounded capacity and a TTL so a long-running process
//! cannot grow the map without limit.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

#[derive(Debug, Clone, thiserror::Error)]
pub enum TranslateError {
    #[error("translation request failed: {0}")]
    Request(String),
    #[error("translation returned an empty result")]
    Empty,
}

/// External collaborator: `translate(keyword) -> display name`.
#[async_trait]
pub trait TitleTranslator: Send + Sync {
    async fn translate(&self, keyword: &str) -> Result<String, TranslateError>;
}

struct CacheEntry {
    value: String,
    inserted_at: Instant,
}

/// Bounded cache wrapper around any [`TitleTranslator`].
///
/// Eviction: expired entries are dropped on access; when the map is full
/// the oldest entry goes first. Failures fall back to the keyword and are
/// not cached, so a transient outage does not pin the fallback.
pub struct CachingTranslator {
    inner: Box<dyn TitleTranslator>,
    cache: Mutex<HashMap<String, CacheEntry>>,
    capacity: usize,
    ttl: Duration,
}

impl CachingTranslator {
    pub const DEFAULT_CAPACITY: usize = 256;
    pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

    pub fn new(inner: Box<dyn TitleTranslator>) -> Self {
        Self::with_limits(inner, Self::DEFAULT_CAPACITY, Self::DEFAULT_TTL)
    }

    pub fn with_limits(inner: Box<dyn TitleTranslator>, capacity: usize, ttl: Duration) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            ttl,
        }
    }

    /// Translate `keyword` best-effort: cache hit, then the collaborator,
    /// then the keyword itself.
    pub async fn display_title(&self, keyword: &str) -> String {
        if keyword.trim().is_empty() {
            return keyword.to_string();
        }

        {
            let mut cache = self.cache.lock().await;
            if let Some(entry) = cache.get(keyword) {
                if entry.inserted_at.elapsed() < self.ttl {
                    return entry.value.clone();
                }
                cache.remove(keyword);
            }
        }

        match self.inner.translate(keyword).await {
            Ok(translated) if !translated.trim().is_empty() => {
                let mut cache = self.cache.lock().await;
                if cache.len() >= self.capacity {
                    if let Some(oldest) = cache
                        .iter()
                        .min_by_key(|(_, entry)| entry.inserted_at)
                        .map(|(key, _)| key.clone())
                    {
                        cache.remove(&oldest);
                    }
                }
                cache.insert(
                    keyword.to_string(),
                    CacheEntry {
                        value: translated.clone(),
                        inserted_at: Instant::now(),
                    },
                );
                translated
            }
            Ok(_) => keyword.to_string(),
            Err(e) => {
                tracing::warn!(keyword, error = %e, "Title translation failed; using keyword");
                keyword.to_string()
            }
        }
    }
}
