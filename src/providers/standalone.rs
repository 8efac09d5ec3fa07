//! Single-instance catalog over HTTP.
//!
//! Search is a themed WordPress listing (`article.post-grid` cards); the
//! detail page carries a download region whose markup has shipped in at
//! least three shapes over time, so password extraction tries each known
//! shape in order before giving up.

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::Arc;
use url::Url;

use super::{ProviderError, StandaloneCatalog};
use crate::fetch::{FetchOptions, RetryingFetcher};
use crate::types::{Candidate, StandaloneLine};

const PASSWORD_MARKER: &str = "解压密码";
const PAN_MARKER: &str = "百度网盘";
/// Boilerplate row on some detail pages that looks like a password but is
/// explanatory text.
const PASSWORD_BOILERPLATE: &str = "解压密码=安装密码、激活码";

pub struct HttpStandaloneCatalog {
    fetcher: Arc<RetryingFetcher>,
    base_url: String,
    max_candidates: usize,
}

impl HttpStandaloneCatalog {
    pub fn new(fetcher: Arc<RetryingFetcher>, base_url: String, max_candidates: usize) -> Self {
        Self {
            fetcher,
            base_url,
            max_candidates,
        }
    }
}

#[async_trait]
impl StandaloneCatalog for HttpStandaloneCatalog {
    async fn search(&self, term: &str) -> Result<Vec<Candidate>, ProviderError> {
        let options = FetchOptions {
            query: vec![
                ("cat".to_string(), "1".to_string()),
                ("s".to_string(), term.to_string()),
                ("order".to_string(), "views".to_string()),
            ],
            ..Default::default()
        };
        let html = self.fetcher.fetch(&self.base_url, &options).await?;
        Ok(parse_search_results(&html, term, self.max_candidates))
    }

    async fn fetch_detail(&self, detail_url: &str) -> Result<Vec<StandaloneLine>, ProviderError> {
        let html = self
            .fetcher
            .fetch(detail_url, &FetchOptions::default())
            .await?;
        let parsed = parse_detail(&html, detail_url)?;

        let mut lines = Vec::new();
        match parsed.password {
            Some(password) => lines.push(StandaloneLine::Password(password)),
            None => lines.push(StandaloneLine::Note("password: not found".to_string())),
        }
        match parsed.extract_code {
            Some(code) => lines.push(StandaloneLine::ExtractCode(code)),
            None => lines.push(StandaloneLine::Note("pan extract code: not found".to_string())),
        }
        // Jump links redirect through the catalog; resolve each to its real
        // target, keeping the jump link when resolution fails.
        for (label, jump_url) in parsed.links {
            let real_url = self.fetcher.resolve_redirect(&jump_url).await;
            lines.push(StandaloneLine::Link {
                label,
                url: real_url,
            });
        }
        Ok(lines)
    }
}

fn selector(css: &'static str) -> Selector {
    // Selectors are compile-time literals; a typo is a programmer error.
    Selector::parse(css).unwrap_or_else(|_| panic!("invalid selector: {css}"))
}

fn join_url(base: &str, href: &str) -> String {
    match Url::parse(base).and_then(|b| b.join(href)) {
        Ok(url) => url.to_string(),
        Err(_) => href.to_string(),
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Search-page extraction: title/link/thumbnail per result card,
/// de-duplicated by detail URL, order preserved, filtered to titles that
/// actually contain the query term (the upstream pads results with loose
/// matches).
pub fn parse_search_results(html: &str, term: &str, cap: usize) -> Vec<Candidate> {
    let document = Html::parse_document(html);
    let card = selector("article.post-grid a[href][title]");
    let img = selector("img");

    let mut out = Vec::new();
    let mut seen = HashSet::new();
    for anchor in document.select(&card) {
        if out.len() >= cap {
            break;
        }
        let title = anchor.value().attr("title").unwrap_or("").trim();
        let href = anchor.value().attr("href").unwrap_or("").trim();
        if title.is_empty() || href.is_empty() || !title.contains(term) {
            continue;
        }
        if !seen.insert(href.to_string()) {
            continue;
        }
        let thumbnail = anchor
            .select(&img)
            .next()
            .and_then(|img| img.value().attr("src"))
            .map(str::to_string);
        out.push(Candidate {
            raw_title: title.to_string(),
            detail_url: href.to_string(),
            thumbnail,
        });
    }
    out
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ParsedDetail {
    pub password: Option<String>,
    pub extract_code: Option<String>,
    /// (label, jump URL) pairs, absolute.
    pub links: Vec<(String, String)>,
}

/// Detail-page extraction. The download region is required; everything
/// inside it is best-effort.
pub(crate) fn parse_detail(html: &str, page_url: &str) -> Result<ParsedDetail, ProviderError> {
    let document = Html::parse_document(html);
    let region_sel = selector(r#"div[id^="ripro_v2_shop_down"]"#);
    let region = document
        .select(&region_sel)
        .next()
        .ok_or(ProviderError::Parse("download region missing"))?;

    Ok(ParsedDetail {
        password: extract_password(region),
        extract_code: extract_pan_code(region),
        links: extract_links(region, page_url),
    })
}

fn extract_password(region: ElementRef<'_>) -> Option<String> {
    // Shape 1: copy button inside a button group, labelled by its own text
    // or by the adjacent anchor.
    let copy_button = selector("div.btn-group button.go-copy[data-clipboard-text]");
    for button in region.select(&copy_button) {
        let label = element_text(button);
        let sibling_label = button
            .prev_siblings()
            .filter_map(ElementRef::wrap)
            .find(|e| e.value().name() == "a")
            .map(element_text)
            .unwrap_or_default();
        if label.contains(PASSWORD_MARKER) || sibling_label.contains(PASSWORD_MARKER) {
            let clipboard = button
                .value()
                .attr("data-clipboard-text")
                .unwrap_or("")
                .trim();
            if !clipboard.is_empty() {
                return Some(clipboard.to_string());
            }
        }
    }

    // Shape 2: labelled rows in the down-info list.
    let info_row = selector("div.down-info ul.infos li");
    let data_label = selector("p.data-label");
    let info_value = selector("p.info");
    let span = selector("span");
    let bold = selector("b");
    for row in region.select(&info_row) {
        let labelled = row
            .select(&data_label)
            .next()
            .map(|label| element_text(label).contains(PASSWORD_MARKER))
            .unwrap_or(false);
        if !labelled {
            continue;
        }
        if let Some(info) = row.select(&info_value).next() {
            let password = info
                .select(&span)
                .next()
                .or_else(|| info.select(&bold).next())
                .map(element_text)
                .unwrap_or_else(|| element_text(info));
            if !password.is_empty() && password != PASSWORD_BOILERPLATE {
                return Some(password);
            }
        }
    }

    // Shape 3: any clipboard attribute near password-ish text.
    let any_clipboard = selector("[data-clipboard-text]");
    for element in region.select(&any_clipboard) {
        let clipboard = element
            .value()
            .attr("data-clipboard-text")
            .unwrap_or("")
            .trim();
        let text = element_text(element);
        let looks_like_link = ["百度", "网盘", "提取", "https", "http"]
            .iter()
            .any(|marker| clipboard.contains(marker));
        if clipboard.len() >= 4
            && !looks_like_link
            && (text.contains("密码") || text.contains("解压"))
        {
            return Some(clipboard.to_string());
        }
    }

    None
}

fn extract_pan_code(region: ElementRef<'_>) -> Option<String> {
    let group_sel = selector("div.btn-group");
    let pan_anchor = selector(r#"a[href*="goto?down="]"#);
    let copy_button = selector("button.go-copy[data-clipboard-text]");

    for group in region.select(&group_sel) {
        let is_pan = group
            .select(&pan_anchor)
            .next()
            .map(|a| element_text(a).contains(PAN_MARKER))
            .unwrap_or(false);
        if !is_pan {
            continue;
        }
        if let Some(button) = group.select(&copy_button).next() {
            let code = button
                .value()
                .attr("data-clipboard-text")
                .unwrap_or("")
                .trim();
            if !code.is_empty() {
                return Some(code.to_string());
            }
        }
    }
    None
}

fn extract_links(region: ElementRef<'_>, page_url: &str) -> Vec<(String, String)> {
    let link_sel = selector(r#"a[target="_blank"][href*="goto?down="]"#);
    region
        .select(&link_sel)
        .filter_map(|anchor| {
            let label = element_text(anchor);
            if label.is_empty() || label.contains(PASSWORD_MARKER) {
                return None;
            }
            let href = anchor.value().attr("href")?;
            Some((label, join_url(page_url, href)))
        })
        .collect()
}
