//! Shared-session catalog over HTTP.
//!
//! The upstream is a Russian release tracker behind chronically broken TLS,
//! so every request goes through the certificate-ignoring client. Search
//! hits are filtered to the shared-session category by their URL path;
//! detail pages carry a Russian-locale update date and a torrent link.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::Arc;
use url::Url;

use super::{CoopCandidate, CoopCatalog, CoopDetail, ProviderError};
use crate::fetch::{FetchOptions, RetryingFetcher};
use crate::title::fold_for_match;

/// URL-path markers that identify a shared-session release.
const SHARED_SESSION_MARKERS: &[&str] = &["po-seti", "onlayn", "multiplayer"];
/// The resolver only ever fetches details for this many hits.
pub const MAX_COOP_RESULTS: usize = 3;

static UPDATE_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{1,2})\s+([а-яА-Я]+)\s+(\d{4}),\s*(\d{1,2}):(\d{2})").unwrap()
});

const RUSSIAN_MONTHS: &[(&str, u32)] = &[
    ("января", 1),
    ("февраля", 2),
    ("марта", 3),
    ("апреля", 4),
    ("мая", 5),
    ("июня", 6),
    ("июля", 7),
    ("августа", 8),
    ("сентября", 9),
    ("октября", 10),
    ("ноября", 11),
    ("декабря", 12),
];

pub struct HttpCoopCatalog {
    fetcher: Arc<RetryingFetcher>,
    base_url: String,
}

impl HttpCoopCatalog {
    pub fn new(fetcher: Arc<RetryingFetcher>, base_url: String) -> Self {
        Self { fetcher, base_url }
    }

    /// Detail hrefs arrive absolute, relative, or pointing at stale mirror
    /// domains; re-root everything onto the configured base.
    fn canonical_detail_url(&self, href: &str) -> String {
        if href.starts_with(&self.base_url) {
            return href.to_string();
        }
        if let Ok(parsed) = Url::parse(href) {
            if parsed.scheme().starts_with("http") {
                return format!("{}{}", self.base_url.trim_end_matches('/'), parsed.path());
            }
        }
        let path = if href.starts_with('/') {
            href.to_string()
        } else {
            format!("/{href}")
        };
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl CoopCatalog for HttpCoopCatalog {
    async fn search(&self, keyword: &str) -> Result<Vec<CoopCandidate>, ProviderError> {
        if keyword.trim().is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/index.php", self.base_url.trim_end_matches('/'));
        let options = FetchOptions {
            query: vec![
                ("do".to_string(), "search".to_string()),
                ("subaction".to_string(), "search".to_string()),
                ("story".to_string(), keyword.to_string()),
            ],
            insecure_tls: true,
            ..Default::default()
        };
        let html = self.fetcher.fetch(&url, &options).await?;
        Ok(parse_coop_search(&html, keyword))
    }

    async fn fetch_detail(&self, candidate: &CoopCandidate) -> Result<CoopDetail, ProviderError> {
        let detail_url = self.canonical_detail_url(&candidate.href);
        let html = self.fetcher.fetch(&detail_url, &FetchOptions::insecure()).await?;
        Ok(parse_coop_detail(&html, &self.base_url))
    }
}

fn selector(css: &'static str) -> Selector {
    Selector::parse(css).unwrap_or_else(|_| panic!("invalid selector: {css}"))
}

pub(crate) fn is_shared_session(href: &str) -> bool {
    let lower = href.to_lowercase();
    SHARED_SESSION_MARKERS
        .iter()
        .any(|marker| lower.contains(marker))
}

/// Search-page extraction: keyword-matched, shared-session only,
/// de-duplicated by href, upstream order, capped at [`MAX_COOP_RESULTS`].
pub fn parse_coop_search(html: &str, keyword: &str) -> Vec<CoopCandidate> {
    let document = Html::parse_document(html);
    let result_sel = selector("a.search_res");
    let title_sel = selector(".search_res_title");

    let folded_keyword = fold_for_match(keyword);
    let mut out = Vec::new();
    let mut seen = HashSet::new();

    for anchor in document.select(&result_sel) {
        if out.len() >= MAX_COOP_RESULTS {
            break;
        }
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        if !is_shared_session(href) {
            continue;
        }
        let Some(title_el) = anchor.select(&title_sel).next() else {
            continue;
        };
        let title = title_el.text().collect::<String>().trim().to_string();
        if title.is_empty() || !fold_for_match(&title).contains(&folded_keyword) {
            continue;
        }
        if !seen.insert(href.to_string()) {
            continue;
        }
        out.push(CoopCandidate {
            title,
            href: href.to_string(),
        });
    }
    out
}

/// Normalize the tracker's Russian date (`17 мая 2021, 7:21`) to
/// `2021-05-17 07:21`. Unmatched months pass the raw text through;
/// pages without a date come back as `"unknown"`.
pub fn normalize_update_date(text: &str) -> String {
    let Some(caps) = UPDATE_DATE.captures(text) else {
        return "unknown".to_string();
    };
    let day: u32 = caps[1].parse().unwrap_or(0);
    let month_name = caps[2].to_lowercase();
    let year = &caps[3];
    let hour: u32 = caps[4].parse().unwrap_or(0);
    let minute = &caps[5];

    match RUSSIAN_MONTHS
        .iter()
        .find(|(name, _)| *name == month_name)
    {
        Some((_, month)) => format!("{year}-{month:02}-{day:02} {hour:02}:{minute}"),
        None => caps[0].to_string(),
    }
}

/// Detail-page extraction: update date plus torrent link, both best-effort.
pub fn parse_coop_detail(html: &str, base_url: &str) -> CoopDetail {
    let document = Html::parse_document(html);
    let update_sel = selector("div.tupd");
    let torrent_sel = selector("a.itemtop_games");
    let any_anchor = selector("a[href]");

    let update_text = document
        .select(&update_sel)
        .next()
        .map(|el| el.text().collect::<String>())
        .unwrap_or_default();
    let updated = normalize_update_date(&update_text);

    let resource_link = document
        .select(&torrent_sel)
        .next()
        .or_else(|| {
            document.select(&any_anchor).find(|anchor| {
                anchor
                    .text()
                    .collect::<String>()
                    .contains("Скачать торрент")
            })
        })
        .and_then(|anchor| anchor.value().attr("href"))
        .map(|href| {
            if href.starts_with('/') {
                format!("{}{}", base_url.trim_end_matches('/'), href)
            } else {
                href.to_string()
            }
        });

    CoopDetail {
        updated,
        resource_link,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEARCH_PAGE: &str = r#"
    <html><body>
      <a class="search_res" href="/12-terraria-po-seti.html">
        <span class="search_res_title">Terraria по сети</span>
      </a>
      <a class="search_res" href="/13-terraria.html">
        <span class="search_res_title">Terraria</span>
      </a>
      <a class="search_res" href="/12-terraria-po-seti.html">
        <span class="search_res_title">Terraria по сети</span>
      </a>
      <a class="search_res" href="/14-stardew-multiplayer.html">
        <span class="search_res_title">Stardew Valley co-op</span>
      </a>
    </body></html>"#;

    #[test]
    fn search_keeps_only_shared_session_hits() {
        let hits = parse_coop_search(SEARCH_PAGE, "Terraria");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].href, "/12-terraria-po-seti.html");
    }

    #[test]
    fn search_requires_keyword_in_title() {
        assert!(parse_coop_search(SEARCH_PAGE, "Celeste").is_empty());
    }

    #[test]
    fn search_caps_results() {
        let page: String = (0..6)
            .map(|i| {
                format!(
                    r#"<a class="search_res" href="/g{i}-po-seti.html">
                       <span class="search_res_title">Game {i}</span></a>"#
                )
            })
            .collect();
        let hits = parse_coop_search(&page, "Game");
        assert_eq!(hits.len(), MAX_COOP_RESULTS);
    }

    #[test]
    fn category_markers_match_case_insensitively() {
        assert!(is_shared_session("/12-game-PO-SETI.html"));
        assert!(is_shared_session("/12-game-onlayn.html"));
        assert!(is_shared_session("/12-game-multiplayer.html"));
        assert!(!is_shared_session("/12-game-singleplayer.html"));
    }

    #[test]
    fn russian_dates_normalize_with_zero_padding() {
        assert_eq!(
            normalize_update_date("Обновлено: 17 мая 2021, 7:21"),
            "2021-05-17 07:21"
        );
        assert_eq!(
            normalize_update_date("3 Декабря 2023, 15:05"),
            "2023-12-03 15:05"
        );
    }

    #[test]
    fn missing_or_foreign_dates_degrade_gracefully() {
        assert_eq!(normalize_update_date("нет данных"), "unknown");
        // Recognizable shape, unknown month name: raw text passes through.
        assert_eq!(
            normalize_update_date("17 маяя 2021, 7:21"),
            "17 маяя 2021, 7:21"
        );
    }

    #[test]
    fn detail_extracts_link_and_date() {
        let html = r#"
        <html><body>
          <div class="tupd">Обновлено 17 мая 2021, 17:21</div>
          <a class="itemtop_games" href="/torrents/terraria.torrent">Скачать</a>
        </body></html>"#;
        let detail = parse_coop_detail(html, "https://tracker.example");
        assert_eq!(detail.updated, "2021-05-17 17:21");
        assert_eq!(
            detail.resource_link.as_deref(),
            Some("https://tracker.example/torrents/terraria.torrent")
        );
    }

    #[test]
    fn detail_falls_back_to_anchor_text_match() {
        let html = r#"
        <html><body>
          <a href="https://cdn.example/t.torrent">Скачать торрент</a>
        </body></html>"#;
        let detail = parse_coop_detail(html, "https://tracker.example");
        assert_eq!(detail.updated, "unknown");
        assert_eq!(
            detail.resource_link.as_deref(),
            Some("https://cdn.example/t.torrent")
        );
    }

    #[test]
    fn detail_without_link_is_not_an_error() {
        let detail = parse_coop_detail("<html></html>", "https://tracker.example");
        assert_eq!(detail.updated, "unknown");
        assert!(detail.resource_link.is_none());
    }
}
