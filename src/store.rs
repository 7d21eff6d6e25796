//! Per-paper artifact persistence.
//!
//! Summary, extracted table, and results-section text live as independent
//! files in sibling directories, joined only by the paper identifier. There
//! is no index; discovery is direct path construction, and re-runs
//! overwrite in place.

use crate::error::{DigestError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Artifacts produced by one pipeline run for one paper. Absent fields are
/// simply not written.
#[derive(Debug, Clone, Default)]
pub struct Artifacts {
    pub summary: Option<String>,
    pub table: Option<Vec<Vec<String>>>,
    pub results_section: Option<String>,
}

/// What `load` found for an identifier. Any subset may be present.
#[derive(Debug, Clone, Default)]
pub struct StoredArtifacts {
    pub summary: Option<String>,
    pub table_path: Option<PathBuf>,
    pub results_section: Option<String>,
}

/// Filesystem store keyed by paper identifier.
pub struct ResultStore {
    papers_dir: PathBuf,
    summaries_dir: PathBuf,
    tables_dir: PathBuf,
    results_dir: PathBuf,
}

impl ResultStore {
    /// Create the store rooted at `output_dir`, ensuring the artifact
    /// directories exist.
    pub fn new(output_dir: &Path) -> Result<Self> {
        let store = Self {
            papers_dir: output_dir.join("papers"),
            summaries_dir: output_dir.join("summaries"),
            tables_dir: output_dir.join("tables"),
            results_dir: output_dir.join("results"),
        };
        for dir in [
            &store.papers_dir,
            &store.summaries_dir,
            &store.tables_dir,
            &store.results_dir,
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(store)
    }

    /// Working path for a paper's downloaded (or synthesized) PDF.
    pub fn pdf_path(&self, identifier: &str) -> PathBuf {
        self.papers_dir.join(format!("{}.pdf", identifier))
    }

    pub fn summary_path(&self, identifier: &str) -> PathBuf {
        self.summaries_dir.join(format!("{}_summary.txt", identifier))
    }

    pub fn table_path(&self, identifier: &str) -> PathBuf {
        self.tables_dir.join(format!("{}_table.csv", identifier))
    }

    pub fn results_path(&self, identifier: &str) -> PathBuf {
        self.results_dir.join(format!("{}_results.txt", identifier))
    }

    /// Persist whichever artifacts are present; each file is written
    /// independently of the others.
    pub fn save(&self, identifier: &str, artifacts: &Artifacts) -> Result<()> {
        if let Some(summary) = &artifacts.summary {
            std::fs::write(self.summary_path(identifier), summary)?;
            debug!(id = identifier, "Summary saved");
        }

        if let Some(table) = &artifacts.table {
            self.write_table(identifier, table)?;
            debug!(id = identifier, rows = table.len(), "Table saved");
        }

        if let Some(results) = &artifacts.results_section {
            std::fs::write(self.results_path(identifier), results)?;
            debug!(id = identifier, "Results section saved");
        }

        info!(id = identifier, "Artifacts persisted");
        Ok(())
    }

    /// Load whatever subset exists for `identifier`.
    ///
    /// `NotFound` only when summary, table and results section are all
    /// absent; partial presence returns the existing subset.
    pub fn load(&self, identifier: &str) -> Result<StoredArtifacts> {
        let mut stored = StoredArtifacts::default();

        let summary_path = self.summary_path(identifier);
        if summary_path.exists() {
            stored.summary = Some(std::fs::read_to_string(summary_path)?);
        }

        let table_path = self.table_path(identifier);
        if table_path.exists() {
            stored.table_path = Some(table_path);
        }

        let results_path = self.results_path(identifier);
        if results_path.exists() {
            stored.results_section = Some(std::fs::read_to_string(results_path)?);
        }

        if stored.summary.is_none() && stored.table_path.is_none() && stored.results_section.is_none()
        {
            return Err(DigestError::NotFound(format!(
                "no stored artifacts for {}",
                identifier
            )));
        }

        Ok(stored)
    }

    /// Write table rows as CSV; rows may have uneven widths.
    fn write_table(&self, identifier: &str, table: &[Vec<String>]) -> Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .has_headers(false)
            .from_path(self.table_path(identifier))
            .map_err(|e| DigestError::Config(format!("Failed to create CSV writer: {}", e)))?;

        for row in table {
            writer
                .write_record(row)
                .map_err(|e| DigestError::Parse(format!("Failed to write CSV record: {}", e)))?;
        }

        writer.flush().map_err(DigestError::Io)?;
        Ok(())
    }
}
