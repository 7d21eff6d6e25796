//! rustpaperdigest - Paper Ingestion & Summarization Pipeline
//!
//! A Rust microservice that fetches paper metadata from a literature index,
//! retrieves (or synthesizes) a full-text PDF, extracts its text and most
//! prominent table, and summarizes it via an OpenAI-compatible API.
//!
//! ## Usage
//!
//! ### CLI Mode
//! ```bash
//! rustpaperdigest run --input paper_urls.txt --output ./digest
//! ```
//!
//! ### HTTP Server Mode
//! ```bash
//! rustpaperdigest serve --port 3000
//! ```

use anyhow::{Context, Result};
use axum::{
    extract::{Path as AxumPath, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use rustpaperdigest::pipeline::{
    IdentifierRule, PaperRecord, PaperStatus, Pipeline, PipelineConfig,
};
use rustpaperdigest::summarizer::{Summarizer, SummarizerConfig};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable consulted when --llm-key is not given
const LLM_KEY_ENV: &str = "PAPERDIGEST_LLM_KEY";

// ============================================================================
// CLI Definition
// ============================================================================

/// Paper Ingestion & Summarization Pipeline - Rust Microservice
#[derive(Parser)]
#[command(name = "rustpaperdigest")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Pipeline and summarizer knobs shared by both front ends
#[derive(Args, Clone)]
struct PipelineArgs {
    /// Output directory for papers/summaries/tables/results
    #[arg(short, long, default_value = "./digest")]
    output: PathBuf,

    /// Identifier derivation rule
    #[arg(long, default_value = "last-segment", value_parser = ["last-segment", "numeric-suffix"])]
    id_rule: String,

    /// Disable the missing-PDF fallback (synthesized PDF / abstract input)
    #[arg(long)]
    no_fallback: bool,

    /// Bounded worker count for batch processing
    #[arg(long, default_value = "4")]
    concurrency: usize,

    /// Minimum characters before the remote summarization API is called
    #[arg(long, default_value = "1000")]
    min_chars: usize,

    /// Payload ceiling per summarization request, in characters
    #[arg(long, default_value = "4000")]
    max_payload: usize,

    /// LLM API base URL (OpenAI-compatible)
    #[arg(long, default_value = "https://api.openai.com/v1")]
    llm_base_url: String,

    /// LLM API key (falls back to PAPERDIGEST_LLM_KEY)
    #[arg(long)]
    llm_key: Option<String>,

    /// LLM model name
    #[arg(long, default_value = "gpt-4o-mini")]
    llm_model: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a batch of source URLs from a newline-delimited file
    Run {
        /// Input file, one source URL per line
        #[arg(short, long, default_value = "paper_urls.txt")]
        input: PathBuf,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Run as HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .init();

    match cli.command {
        Commands::Run { input, pipeline } => run_batch(input, pipeline).await,
        Commands::Serve {
            port,
            host,
            pipeline,
        } => run_server(host, port, pipeline).await,
    }
}

/// Build the pipeline from CLI args, failing fast on a missing credential.
fn build_pipeline(args: &PipelineArgs) -> Result<Pipeline> {
    // Credential is resolved once at startup and never logged.
    let api_key = args
        .llm_key
        .clone()
        .or_else(|| std::env::var(LLM_KEY_ENV).ok())
        .filter(|k| !k.trim().is_empty())
        .with_context(|| {
            format!(
                "Summarization API key missing: pass --llm-key or set {}",
                LLM_KEY_ENV
            )
        })?;

    let mut summarizer_config =
        SummarizerConfig::new(args.llm_base_url.clone(), api_key, args.llm_model.clone());
    summarizer_config.min_chars = args.min_chars;
    summarizer_config.max_payload_chars = args.max_payload;
    let summarizer = Summarizer::new(&summarizer_config)?;

    let identifier_rule = match args.id_rule.as_str() {
        "numeric-suffix" => IdentifierRule::NumericSuffix,
        _ => IdentifierRule::LastSegment,
    };

    let config = PipelineConfig {
        identifier_rule,
        fallback_on_missing_pdf: !args.no_fallback,
        concurrency: args.concurrency,
        summarize_min_chars: args.min_chars,
        max_payload_chars: args.max_payload,
        output_dir: args.output.clone(),
        ..Default::default()
    };

    Ok(Pipeline::new(config, summarizer)?)
}

// ============================================================================
// Batch Front End
// ============================================================================

async fn run_batch(input: PathBuf, args: PipelineArgs) -> Result<()> {
    // A missing input file is fatal for the whole run, not a per-paper
    // failure.
    let content = std::fs::read_to_string(&input)
        .with_context(|| format!("Failed to read input file {:?}", input))?;
    let urls: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();

    if urls.is_empty() {
        println!("No URLs in {:?}, nothing to do.", input);
        return Ok(());
    }

    let pipeline = build_pipeline(&args)?;
    println!(
        "Processing {} papers ({} workers) into {:?}",
        urls.len(),
        args.concurrency,
        args.output
    );

    let records = pipeline.run_batch(&urls).await;

    for record in &records {
        match &record.failure {
            Some(reason) => println!(
                "{}: {} ({})",
                record.identifier,
                record.status.label(),
                reason
            ),
            None => println!("{}: {}", record.identifier, record.status.label()),
        }
    }

    let report_path = args.output.join("run_report.csv");
    write_report(&report_path, &records)?;

    let persisted = records
        .iter()
        .filter(|r| matches!(r.status, PaperStatus::Persisted))
        .count();
    println!(
        "\n✓ Pipeline complete: {} / {} persisted. Report: {:?}",
        persisted,
        records.len(),
        report_path
    );
    Ok(())
}

/// One row of the batch report CSV
#[derive(Debug, Serialize)]
struct ReportRow {
    timestamp: String,
    paper_id: String,
    url: String,
    status: String,
    failure: String,
}

/// Save per-paper outcomes to a CSV report
fn write_report(path: &std::path::Path, records: &[PaperRecord]) -> Result<()> {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();

    let mut wtr = csv::WriterBuilder::new()
        .has_headers(true)
        .from_path(path)
        .context("Failed to create report CSV writer")?;

    for record in records {
        wtr.serialize(ReportRow {
            timestamp: timestamp.clone(),
            paper_id: record.identifier.clone(),
            url: record.source_url.clone(),
            status: record.status.label(),
            failure: record.failure.clone().unwrap_or_default(),
        })
        .context("Failed to write report record")?;
    }

    wtr.flush().context("Failed to flush report CSV")?;
    Ok(())
}

// ============================================================================
// HTTP Server
// ============================================================================

async fn run_server(host: String, port: u16, args: PipelineArgs) -> Result<()> {
    info!(host = %host, port = port, "Starting HTTP server");

    let pipeline = build_pipeline(&args)?;
    let app = build_router(AppState {
        pipeline: Arc::new(pipeline),
    });

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .context("Invalid host:port")?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    println!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}

#[derive(Clone)]
struct AppState {
    pipeline: Arc<Pipeline>,
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/analyze", post(analyze_handler))
        .route("/results/{paper_id}", get(results_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_handler() -> &'static str {
    "OK"
}

/// Analyze request body
#[derive(Debug, Deserialize)]
struct AnalyzeRequest {
    #[serde(default)]
    urls: Vec<String>,
}

/// Per-paper outcome in the analyze response
#[derive(Debug, Serialize)]
struct PaperOutcome {
    paper_id: String,
    status: String,
}

/// Run the pipeline synchronously for each submitted URL.
///
/// A paper's failure becomes its status string, never a process fault.
async fn analyze_handler(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeRequest>,
) -> Json<Vec<PaperOutcome>> {
    info!(count = req.urls.len(), "Analyze request");

    let records = state.pipeline.run_batch(&req.urls).await;
    let outcomes = records
        .into_iter()
        .map(|r| PaperOutcome {
            paper_id: r.identifier,
            status: r.status.label(),
        })
        .collect();

    Json(outcomes)
}

/// Stored-results response: summary inlined, table referenced by path
#[derive(Debug, Serialize)]
struct ResultsResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    table: Option<String>,
}

/// Look up stored artifacts for a paper id.
async fn results_handler(
    State(state): State<AppState>,
    AxumPath(paper_id): AxumPath<String>,
) -> impl IntoResponse {
    let stored = match state.pipeline.store().load(&paper_id) {
        Ok(stored) => stored,
        Err(_) => {
            return (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({"error": "Paper not found"})),
            )
                .into_response();
        }
    };

    // The endpoint serves summary and table; a paper with only a stored
    // results section reports not-found here.
    if stored.summary.is_none() && stored.table_path.is_none() {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "Paper not found"})),
        )
            .into_response();
    }

    Json(ResultsResponse {
        summary: stored.summary,
        table: stored
            .table_path
            .map(|p| p.display().to_string()),
    })
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use rustpaperdigest::error::Result as DigestResult;
    use rustpaperdigest::store::Artifacts;
    use rustpaperdigest::summarizer::ChatTransport;
    use tempfile::tempdir;
    use tower::ServiceExt;

    struct NoopTransport;

    #[async_trait::async_trait]
    impl ChatTransport for NoopTransport {
        async fn complete(&self, _system: &str, _user: &str) -> DigestResult<String> {
            Ok("noop".to_string())
        }
    }

    fn test_state(output_dir: &std::path::Path) -> AppState {
        let summarizer = Summarizer::with_transport(Box::new(NoopTransport), 1000, 4000);
        let config = PipelineConfig {
            output_dir: output_dir.to_path_buf(),
            ..Default::default()
        };
        let pipeline = Pipeline::new(config, summarizer).expect("pipeline builds");
        AppState {
            pipeline: Arc::new(pipeline),
        }
    }

    #[tokio::test]
    async fn test_results_endpoint_404_when_nothing_stored() {
        let dir = tempdir().expect("tempdir");
        let app = build_router(test_state(dir.path()));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/results/12345")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_results_endpoint_returns_stored_subset() {
        let dir = tempdir().expect("tempdir");
        let state = test_state(dir.path());
        state
            .pipeline
            .store()
            .save(
                "12345",
                &Artifacts {
                    summary: Some("Stored summary.".to_string()),
                    ..Default::default()
                },
            )
            .expect("save artifacts");

        let app = build_router(state);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/results/12345")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(json["summary"], "Stored summary.");
        assert!(json.get("table").is_none());
    }

    #[tokio::test]
    async fn test_analyze_endpoint_empty_batch() {
        let dir = tempdir().expect("tempdir");
        let app = build_router(test_state(dir.path()));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/analyze")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"urls": []}"#))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(json, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let dir = tempdir().expect("tempdir");
        let app = build_router(test_state(dir.path()));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
    }
}
