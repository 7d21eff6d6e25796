//! Landing-page scraping for literature-index URLs.
//!
//! Given a paper's index page (e.g. a PubMed entry), this module extracts
//! the abstract text and the ordered list of full-text candidate links.

use crate::error::{DigestError, Result};
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// User agent string for requests
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Fixed timeout for landing-page requests
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// What a landing page yields: an abstract (possibly empty) and the
/// full-text candidate links in document order.
#[derive(Debug, Clone, Default)]
pub struct Located {
    pub abstract_text: String,
    pub full_text_candidates: Vec<String>,
}

impl Located {
    pub fn is_empty(&self) -> bool {
        self.abstract_text.is_empty() && self.full_text_candidates.is_empty()
    }
}

/// Locates the abstract and full-text links on index landing pages.
pub struct SourceLocator {
    client: reqwest::Client,
}

impl SourceLocator {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| DigestError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Fetch `source_url` and extract the abstract plus full-text links.
    ///
    /// Transport failures and non-200 responses are logged and yield an
    /// empty [`Located`]; they are never raised to the caller. Retries for
    /// full-text hosts live in the fetcher, not here.
    pub async fn locate(&self, source_url: &str) -> Located {
        let response = match self.client.get(source_url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(url = source_url, error = %e, "Failed to fetch landing page");
                return Located::default();
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(url = source_url, status = %status, "Landing page returned non-200");
            return Located::default();
        }

        // Redirects may land on a different origin; relative links resolve
        // against the final URL, not the one we were given.
        let final_url = response.url().clone();

        let html = match response.text().await {
            Ok(t) => t,
            Err(e) => {
                warn!(url = source_url, error = %e, "Failed to read landing page body");
                return Located::default();
            }
        };

        let located = parse_landing_page(&html, &final_url);
        info!(
            url = source_url,
            abstract_chars = located.abstract_text.len(),
            candidates = located.full_text_candidates.len(),
            "Landing page parsed"
        );
        located
    }
}

/// Parse a landing page for its abstract and full-text link regions.
///
/// Absence of either region is not an error; each part is extracted
/// independently.
pub fn parse_landing_page(html: &str, base_url: &Url) -> Located {
    let document = Html::parse_document(html);

    let mut located = Located::default();

    // Abstract region. PubMed-style pages use a handful of markups for it.
    for css in ["div.abstract-content", "div#abstract", "div.abstract"] {
        if let Ok(selector) = Selector::parse(css) {
            if let Some(elem) = document.select(&selector).next() {
                let text = elem.text().collect::<String>();
                located.abstract_text = normalize_ws(&text);
                break;
            }
        }
    }

    // Full-text link region, in document order.
    if let Ok(selector) = Selector::parse("div.full-text-links-list a[href]") {
        for link in document.select(&selector) {
            if let Some(href) = link.value().attr("href") {
                match resolve_href(href, base_url) {
                    Some(resolved) => located.full_text_candidates.push(resolved),
                    None => debug!(href = href, "Skipping unresolvable full-text href"),
                }
            }
        }
    }

    located
}

/// Resolve a (possibly relative) href against the page's final URL.
fn resolve_href(href: &str, base_url: &Url) -> Option<String> {
    base_url.join(href).ok().map(|u| u.to_string())
}

/// Collapse runs of whitespace into single spaces.
fn normalize_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
