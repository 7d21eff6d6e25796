//! # rustpaperdigest
//!
//! Paper Ingestion & Summarization Pipeline - Rust Microservice
//!
//! ## Modules
//!
//! - [`locator`] - Landing-page scraping for abstract and full-text links
//! - [`fetcher`] - Candidate-ordered PDF download with synthesized fallback
//! - [`synth`] - Rendering scraped text into a minimal PDF
//! - [`extractor`] - PDF text, table and results-section extraction
//! - [`summarizer`] - LLM-backed summarization with sentinel fallbacks
//! - [`store`] - Per-identifier artifact persistence
//! - [`pipeline`] - Per-paper state machine and batch orchestration
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rustpaperdigest::pipeline::{Pipeline, PipelineConfig};
//! use rustpaperdigest::summarizer::{Summarizer, SummarizerConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = SummarizerConfig::new(
//!         "https://api.openai.com/v1".to_string(),
//!         std::env::var("PAPERDIGEST_LLM_KEY")?,
//!         "gpt-4o-mini".to_string(),
//!     );
//!     let pipeline = Pipeline::new(PipelineConfig::default(), Summarizer::new(&config)?)?;
//!     let records = pipeline
//!         .run_batch(&["https://pubmed.ncbi.nlm.nih.gov/12345/".to_string()])
//!         .await;
//!     println!("Processed {} papers", records.len());
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod locator;
pub mod pipeline;
pub mod prompts;
pub mod store;
pub mod summarizer;
pub mod synth;

pub use error::{DigestError, Result};
