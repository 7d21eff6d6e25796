//! Full-text PDF retrieval.
//!
//! Tries candidate links in order, probing HTML responses for nested PDF
//! links, retrying rate-limited hosts with linear backoff, and finally
//! synthesizing a PDF from the last scraped HTML page when no real PDF is
//! reachable.

use crate::error::{DigestError, Result};
use crate::synth;
use futures::StreamExt;
use scraper::{Html, Selector};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

/// User agent string for requests
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// How a PDF landed on disk. Extraction quality differs materially between
/// the two, so callers must not conflate them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// A genuine publisher PDF was downloaded.
    RealPdf,
    /// No real PDF was reachable; the destination holds a PDF rendered from
    /// scraped HTML text.
    SynthesizedPdf,
}

/// Fetch behavior knobs.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Per-request timeout
    pub timeout: Duration,
    /// Total attempts per URL when rate limited
    pub max_attempts: u32,
    /// Linear backoff base; attempt `n` waits `base × n`
    pub retry_base_delay: Duration,
    /// Whether to synthesize a PDF from scraped HTML when no real PDF is found
    pub synthesize_fallback: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_attempts: 3,
            retry_base_delay: Duration::from_secs(5),
            synthesize_fallback: true,
        }
    }
}

/// What a single candidate request produced.
enum CandidateHit {
    /// PDF body streamed to the destination path.
    Pdf,
    /// An HTML page; body text plus the response's final URL for resolving
    /// nested links.
    Html(String, Url),
}

/// Downloads full-text PDFs from candidate links.
pub struct ContentFetcher {
    client: reqwest::Client,
    options: FetchOptions,
}

impl ContentFetcher {
    pub fn new(options: FetchOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(options.timeout)
            .build()
            .map_err(|e| DigestError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, options })
    }

    /// Try `candidates` in order until one yields a PDF at `dest`.
    ///
    /// The first candidate answering 200 with a PDF content type wins
    /// immediately; later candidates are never touched. HTML candidates are
    /// probed once for nested links mentioning "pdf". On total failure with
    /// the fallback enabled, the last visited HTML page is rendered into a
    /// synthetic PDF; with the fallback disabled nothing is written and
    /// `NotFound` is returned.
    pub async fn fetch(&self, candidates: &[String], dest: &Path) -> Result<FetchOutcome> {
        let mut last_html: Option<String> = None;

        for candidate in candidates {
            match self.try_candidate(candidate, dest).await {
                Ok(CandidateHit::Pdf) => {
                    info!(url = candidate, dest = %dest.display(), "Downloaded PDF");
                    return Ok(FetchOutcome::RealPdf);
                }
                Ok(CandidateHit::Html(body, final_url)) => {
                    let secondary = probe_pdf_links(&body, &final_url);
                    debug!(
                        url = candidate,
                        secondary = secondary.len(),
                        "Candidate returned HTML, probing nested links"
                    );
                    last_html = Some(body);

                    // Each nested link gets exactly one try; no recursion
                    // into further HTML.
                    for link in &secondary {
                        match self.try_candidate(link, dest).await {
                            Ok(CandidateHit::Pdf) => {
                                info!(url = link, dest = %dest.display(), "Downloaded PDF via nested link");
                                return Ok(FetchOutcome::RealPdf);
                            }
                            Ok(CandidateHit::Html(body, _)) => {
                                last_html = Some(body);
                            }
                            Err(e) => {
                                debug!(url = link, error = %e, "Nested link failed");
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(url = candidate, error = %e, "Candidate failed");
                }
            }
        }

        if self.options.synthesize_fallback {
            if let Some(html) = last_html {
                let text = html_to_text(&html);
                synth::write_text_pdf(&text, dest)?;
                info!(dest = %dest.display(), "No real PDF reachable, synthesized from scraped HTML");
                return Ok(FetchOutcome::SynthesizedPdf);
            }
        }

        Err(DigestError::NotFound(
            "no candidate yielded a full-text PDF".to_string(),
        ))
    }

    /// Request one URL, retrying only on HTTP 429.
    ///
    /// A PDF body is streamed straight to `dest`; an HTML body is returned
    /// for probing. Anything else fails the candidate.
    async fn try_candidate(&self, url: &str, dest: &Path) -> Result<CandidateHit> {
        for attempt in 1..=self.options.max_attempts {
            let response = self.client.get(url).send().await?;
            let status = response.status();

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                if attempt == self.options.max_attempts {
                    return Err(DigestError::RateLimited(self.options.max_attempts));
                }
                let wait = self.options.retry_base_delay * attempt;
                warn!(
                    url = url,
                    attempt = attempt,
                    wait_ms = wait.as_millis() as u64,
                    "Rate limited, backing off"
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            if !status.is_success() {
                return Err(DigestError::Api {
                    code: status.as_u16() as i32,
                    message: format!("HTTP error: {}", status),
                });
            }

            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_ascii_lowercase();

            if content_type.contains("application/pdf") {
                self.stream_to_file(response, dest).await?;
                return Ok(CandidateHit::Pdf);
            }

            if content_type.contains("text/html") {
                let final_url = response.url().clone();
                let body = response.text().await?;
                return Ok(CandidateHit::Html(body, final_url));
            }

            return Err(DigestError::Api {
                code: status.as_u16() as i32,
                message: format!("Unexpected content type: {}", content_type),
            });
        }

        Err(DigestError::RateLimited(self.options.max_attempts))
    }

    /// Stream a response body to `dest` chunk by chunk.
    ///
    /// A failed stream removes the partial file so total failure leaves
    /// nothing on disk.
    async fn stream_to_file(&self, response: reqwest::Response, dest: &Path) -> Result<()> {
        let result = async {
            let mut file = tokio::fs::File::create(dest).await?;
            let mut stream = response.bytes_stream();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                file.write_all(&chunk).await?;
            }
            file.flush().await?;
            Ok(())
        }
        .await;

        if result.is_err() {
            let _ = tokio::fs::remove_file(dest).await;
        }
        result
    }
}

/// Find nested links whose href or text mentions "pdf", resolved against
/// the page's final URL, in document order without duplicates.
fn probe_pdf_links(html: &str, base_url: &Url) -> Vec<String> {
    let document = Html::parse_document(html);
    let selector = match Selector::parse("a[href]") {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };

    let mut links = Vec::new();
    for anchor in document.select(&selector) {
        let href = anchor.value().attr("href").unwrap_or("");
        let text = anchor.text().collect::<String>();
        if href.to_ascii_lowercase().contains("pdf") || text.to_ascii_lowercase().contains("pdf") {
            if let Ok(resolved) = base_url.join(href) {
                let resolved = resolved.to_string();
                if !links.contains(&resolved) {
                    links.push(resolved);
                }
            }
        }
    }
    links
}

/// Flatten an HTML document to its visible text, one line per text node.
fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    document
        .root_element()
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
