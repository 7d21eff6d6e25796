//! Per-paper ingestion pipeline.
//!
//! Orchestrates locate → fetch → extract → summarize → persist for each
//! source URL, isolating failures per paper and running a batch under a
//! bounded worker pool.

use crate::error::Result;
use crate::extractor;
use crate::fetcher::{ContentFetcher, FetchOptions, FetchOutcome};
use crate::locator::SourceLocator;
use crate::store::{Artifacts, ResultStore};
use crate::summarizer::Summarizer;
use futures::stream::{self, StreamExt};
use regex::Regex;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};
use url::Url;

/// How a paper identifier is derived from its source URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierRule {
    /// Last non-empty path segment of the URL.
    LastSegment,
    /// Trailing run of digits, for index-style URLs.
    NumericSuffix,
}

/// One pipeline stage; failures are tagged with the stage that caused them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Locate,
    Fetch,
    Extract,
    Summarize,
    Persist,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Locate => "locate",
            Stage::Fetch => "fetch",
            Stage::Extract => "extract",
            Stage::Summarize => "summarize",
            Stage::Persist => "persist",
        };
        write!(f, "{}", name)
    }
}

/// Paper processing status; transitions are strictly forward, with `Failed`
/// absorbing from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaperStatus {
    Pending,
    Located,
    Fetched,
    TextExtracted,
    Summarized,
    Persisted,
    Failed(Stage),
}

impl PaperStatus {
    fn rank(&self) -> u8 {
        match self {
            PaperStatus::Pending => 0,
            PaperStatus::Located => 1,
            PaperStatus::Fetched => 2,
            PaperStatus::TextExtracted => 3,
            PaperStatus::Summarized => 4,
            PaperStatus::Persisted => 5,
            PaperStatus::Failed(_) => 6,
        }
    }

    /// Human/API-facing status string.
    pub fn label(&self) -> String {
        match self {
            PaperStatus::Pending => "Pending".to_string(),
            PaperStatus::Located => "Located".to_string(),
            PaperStatus::Fetched => "Fetched".to_string(),
            PaperStatus::TextExtracted => "TextExtracted".to_string(),
            PaperStatus::Summarized => "Summarized".to_string(),
            PaperStatus::Persisted => "Persisted".to_string(),
            PaperStatus::Failed(stage) => format!("Failed: {}", stage),
        }
    }
}

/// Transient per-paper state; created at pipeline start, mutated by each
/// stage, discarded after persistence.
#[derive(Debug, Clone)]
pub struct PaperRecord {
    pub identifier: String,
    pub source_url: String,
    pub abstract_text: Option<String>,
    pub full_text_candidates: Vec<String>,
    pub pdf_path: Option<PathBuf>,
    pub fetch_outcome: Option<FetchOutcome>,
    pub extracted_text: Option<String>,
    pub results_section: Option<String>,
    pub summary: Option<String>,
    pub table_rows: Option<Vec<Vec<String>>>,
    pub status: PaperStatus,
    /// Reason for the earliest failing stage, when any.
    pub failure: Option<String>,
}

impl PaperRecord {
    fn new(identifier: String, source_url: String) -> Self {
        Self {
            identifier,
            source_url,
            abstract_text: None,
            full_text_candidates: Vec::new(),
            pdf_path: None,
            fetch_outcome: None,
            extracted_text: None,
            results_section: None,
            summary: None,
            table_rows: None,
            status: PaperStatus::Pending,
            failure: None,
        }
    }

    /// Move status forward; regressions are ignored.
    fn advance(&mut self, status: PaperStatus) {
        if status.rank() > self.status.rank() {
            self.status = status;
        }
    }

    /// Freeze the paper at its current state, recording the earliest
    /// failing stage and reason.
    fn fail(&mut self, stage: Stage, reason: impl Into<String>) {
        if !matches!(self.status, PaperStatus::Failed(_)) {
            self.status = PaperStatus::Failed(stage);
            self.failure = Some(reason.into());
        }
    }
}

/// Every observed variation point, made explicit.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub identifier_rule: IdentifierRule,
    pub fallback_on_missing_pdf: bool,
    pub concurrency: usize,
    pub summarize_min_chars: usize,
    pub max_payload_chars: usize,
    pub output_dir: PathBuf,
    pub fetch_options: FetchOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            identifier_rule: IdentifierRule::LastSegment,
            fallback_on_missing_pdf: true,
            concurrency: 4,
            summarize_min_chars: 1000,
            max_payload_chars: 4000,
            output_dir: PathBuf::from("."),
            fetch_options: FetchOptions::default(),
        }
    }
}

/// The assembled pipeline; one instance serves a whole batch or server.
pub struct Pipeline {
    config: PipelineConfig,
    locator: SourceLocator,
    fetcher: ContentFetcher,
    summarizer: Summarizer,
    store: ResultStore,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, summarizer: Summarizer) -> Result<Self> {
        let mut fetch_options = config.fetch_options.clone();
        fetch_options.synthesize_fallback = config.fallback_on_missing_pdf;

        Ok(Self {
            locator: SourceLocator::new()?,
            fetcher: ContentFetcher::new(fetch_options)?,
            store: ResultStore::new(&config.output_dir)?,
            summarizer,
            config,
        })
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    /// Process a batch of source URLs under a bounded worker pool.
    ///
    /// Papers fail independently; completion order is not the input order.
    pub async fn run_batch(&self, urls: &[String]) -> Vec<PaperRecord> {
        let workers = self.config.concurrency.max(1);
        let semaphore = Arc::new(Semaphore::new(workers));

        stream::iter(urls.iter().cloned())
            .map(|url| {
                let semaphore = Arc::clone(&semaphore);
                async move {
                    let _permit = semaphore.acquire().await.ok();
                    let record = self.process(&url).await;
                    info!(
                        id = %record.identifier,
                        url = %record.source_url,
                        status = %record.status.label(),
                        "Paper processed"
                    );
                    record
                }
            })
            .buffer_unordered(workers)
            .collect()
            .await
    }

    /// Run the staged pipeline for one source URL.
    ///
    /// Each stage's failure is caught and recorded on the returned record;
    /// this method never errors.
    pub async fn process(&self, source_url: &str) -> PaperRecord {
        let identifier = match extract_identifier(source_url, self.config.identifier_rule) {
            Some(id) => id,
            None => {
                let mut record = PaperRecord::new(String::new(), source_url.to_string());
                record.fail(
                    Stage::Locate,
                    format!("could not derive identifier from {}", source_url),
                );
                return record;
            }
        };
        let mut record = PaperRecord::new(identifier, source_url.to_string());

        // Stage 1: locate abstract and full-text candidates.
        let located = self.locator.locate(source_url).await;
        if located.is_empty() {
            record.fail(Stage::Locate, "landing page yielded no abstract and no links");
            return record;
        }
        if !located.abstract_text.is_empty() {
            record.abstract_text = Some(located.abstract_text);
        }
        record.full_text_candidates = located.full_text_candidates;
        record.advance(PaperStatus::Located);

        // Stage 2: obtain a PDF, real or synthesized.
        let dest = self.store.pdf_path(&record.identifier);
        match self
            .fetcher
            .fetch(&record.full_text_candidates, &dest)
            .await
        {
            Ok(outcome) => {
                record.pdf_path = Some(dest);
                record.fetch_outcome = Some(outcome);
                record.advance(PaperStatus::Fetched);
            }
            Err(e) => {
                if !self.fallback_to_abstract(&record) {
                    record.fail(Stage::Fetch, e.to_string());
                    return record;
                }
                warn!(id = %record.identifier, error = %e, "No PDF; falling back to abstract");
            }
        }

        // Stage 3: extract text, table and results section.
        if let Some(pdf_path) = record.pdf_path.clone() {
            match extractor::extract_text(&pdf_path) {
                Ok(text) => {
                    record.results_section = extractor::extract_results_section(&text);
                    record.extracted_text = Some(text);
                    record.advance(PaperStatus::TextExtracted);

                    match extractor::extract_table(&pdf_path) {
                        Ok(table) => record.table_rows = table,
                        Err(e) => {
                            warn!(id = %record.identifier, error = %e, "Table extraction failed")
                        }
                    }
                }
                Err(e) => {
                    if !self.fallback_to_abstract(&record) {
                        record.fail(Stage::Extract, e.to_string());
                        return record;
                    }
                    warn!(id = %record.identifier, error = %e, "No usable text; falling back to abstract");
                }
            }
        }

        // Stage 4: summarize extracted text, or the abstract under the
        // fallback policy. Sentinel replies are still summaries.
        let input = match record
            .extracted_text
            .as_deref()
            .or(record.abstract_text.as_deref())
        {
            Some(text) => text.to_string(),
            None => {
                record.fail(Stage::Summarize, "no text available to summarize");
                return record;
            }
        };
        record.summary = Some(self.summarizer.summarize(&input).await);
        record.advance(PaperStatus::Summarized);

        // Stage 5: persist artifacts.
        let artifacts = Artifacts {
            summary: record.summary.clone(),
            table: record.table_rows.clone(),
            results_section: record.results_section.clone(),
        };
        match self.store.save(&record.identifier, &artifacts) {
            Ok(()) => record.advance(PaperStatus::Persisted),
            Err(e) => record.fail(Stage::Persist, e.to_string()),
        }

        record
    }

    /// Whether a paper without usable PDF text may continue on its abstract.
    fn fallback_to_abstract(&self, record: &PaperRecord) -> bool {
        self.config.fallback_on_missing_pdf
            && record
                .abstract_text
                .as_deref()
                .map(|a| !a.is_empty())
                .unwrap_or(false)
    }
}

/// Derive the opaque per-paper identifier from a source URL.
pub fn extract_identifier(source_url: &str, rule: IdentifierRule) -> Option<String> {
    match rule {
        IdentifierRule::LastSegment => {
            let url = Url::parse(source_url).ok()?;
            url.path_segments()?
                .filter(|s| !s.is_empty())
                .next_back()
                .map(str::to_string)
        }
        IdentifierRule::NumericSuffix => {
            let re = Regex::new(r"(\d+)/?$").ok()?;
            re.captures(source_url)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DigestError, Result as DigestResult};
    use crate::summarizer::ChatTransport;
    use async_trait::async_trait;
    use axum::http::header;
    use axum::routing::get;
    use axum::Router;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn test_identifier_last_segment() {
        assert_eq!(
            extract_identifier(
                "https://pubmed.ncbi.nlm.nih.gov/12345/",
                IdentifierRule::LastSegment
            ),
            Some("12345".to_string())
        );
        assert_eq!(
            extract_identifier(
                "https://example.com/articles/PMC999",
                IdentifierRule::LastSegment
            ),
            Some("PMC999".to_string())
        );
    }

    #[test]
    fn test_identifier_numeric_suffix() {
        assert_eq!(
            extract_identifier(
                "https://pubmed.ncbi.nlm.nih.gov/12345/",
                IdentifierRule::NumericSuffix
            ),
            Some("12345".to_string())
        );
        assert_eq!(
            extract_identifier(
                "https://example.com/articles/abc",
                IdentifierRule::NumericSuffix
            ),
            None
        );
    }

    #[test]
    fn test_status_never_regresses() {
        let mut record = PaperRecord::new("1".to_string(), "u".to_string());
        record.advance(PaperStatus::Summarized);
        record.advance(PaperStatus::Located);
        assert_eq!(record.status, PaperStatus::Summarized);

        record.fail(Stage::Persist, "disk full");
        record.fail(Stage::Fetch, "later failure must not overwrite");
        assert_eq!(record.status, PaperStatus::Failed(Stage::Persist));
        assert_eq!(record.failure.as_deref(), Some("disk full"));
    }

    struct StubTransport {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ChatTransport for StubTransport {
        async fn complete(&self, _system: &str, _user: &str) -> DigestResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("Stub summary of the paper.".to_string())
        }
    }

    async fn spawn_server(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, router)
                .await
                .expect("serve test routes");
        });
        format!("http://{}", addr)
    }

    /// Landing page with a 1500-char abstract and one dead full-text link.
    fn dead_link_router() -> Router {
        Router::new()
            .route(
                "/paper/12345",
                get(|| async {
                    let abstract_text = "Measured outcome sentence. ".repeat(56);
                    let html = format!(
                        r#"<html><body>
                        <div class="abstract-content"><p>{}</p></div>
                        <div class="full-text-links-list"><a href="/fulltext/12345">Publisher</a></div>
                        </body></html>"#,
                        abstract_text
                    );
                    ([(header::CONTENT_TYPE, "text/html")], html)
                }),
            )
            .route("/fulltext/12345", get(|| async { axum::http::StatusCode::NOT_FOUND }))
    }

    fn test_config(output_dir: PathBuf, fallback: bool) -> PipelineConfig {
        PipelineConfig {
            fallback_on_missing_pdf: fallback,
            output_dir,
            fetch_options: FetchOptions {
                timeout: Duration::from_secs(5),
                max_attempts: 3,
                retry_base_delay: Duration::from_millis(10),
                synthesize_fallback: fallback,
            },
            ..Default::default()
        }
    }

    fn stub_summarizer(calls: &Arc<AtomicUsize>) -> Summarizer {
        Summarizer::with_transport(
            Box::new(StubTransport {
                calls: Arc::clone(calls),
            }),
            1000,
            4000,
        )
    }

    #[tokio::test]
    async fn test_missing_pdf_without_fallback_fails_at_fetch() -> DigestResult<()> {
        let base = spawn_server(dead_link_router()).await;
        let dir = tempdir()?;
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::new(
            test_config(dir.path().to_path_buf(), false),
            stub_summarizer(&calls),
        )?;

        let record = pipeline.process(&format!("{}/paper/12345", base)).await;
        assert_eq!(record.identifier, "12345");
        assert_eq!(record.status, PaperStatus::Failed(Stage::Fetch));
        assert!(record.summary.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(matches!(
            pipeline.store().load("12345"),
            Err(DigestError::NotFound(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_pdf_with_fallback_summarizes_abstract() -> DigestResult<()> {
        let base = spawn_server(dead_link_router()).await;
        let dir = tempdir()?;
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::new(
            test_config(dir.path().to_path_buf(), true),
            stub_summarizer(&calls),
        )?;

        let record = pipeline.process(&format!("{}/paper/12345", base)).await;
        assert_eq!(record.identifier, "12345");
        assert_eq!(record.status, PaperStatus::Persisted);
        assert_eq!(record.summary.as_deref(), Some("Stub summary of the paper."));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stored = pipeline.store().load("12345")?;
        assert_eq!(stored.summary.as_deref(), Some("Stub summary of the paper."));
        Ok(())
    }

    #[tokio::test]
    async fn test_batch_isolates_failures() -> DigestResult<()> {
        let base = spawn_server(dead_link_router()).await;
        let dir = tempdir()?;
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::new(
            test_config(dir.path().to_path_buf(), true),
            stub_summarizer(&calls),
        )?;

        let urls = vec![
            format!("{}/paper/12345", base),
            format!("{}/nonexistent/777", base),
        ];
        let records = pipeline.run_batch(&urls).await;
        assert_eq!(records.len(), 2);

        let ok = records
            .iter()
            .find(|r| r.identifier == "12345")
            .expect("good paper present");
        assert_eq!(ok.status, PaperStatus::Persisted);

        let bad = records
            .iter()
            .find(|r| r.identifier == "777")
            .expect("bad paper present");
        assert_eq!(bad.status, PaperStatus::Failed(Stage::Locate));
        Ok(())
    }
}
