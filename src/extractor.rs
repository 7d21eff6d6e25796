//! PDF text and table extraction.
//!
//! Wraps pdf-extract for page-ordered text, detects the most prominent
//! tabular block across the document, and slices out the results section.
//! "No text in a well-formed PDF" and "malformed PDF" are distinct failure
//! kinds; callers branch on them.

use crate::error::{DigestError, Result};
use regex::Regex;
use std::path::Path;
use tracing::{debug, warn};

/// Extract linear text, concatenating per-page output in page order.
///
/// Pages are joined with a newline; nothing is trimmed between pages. A page
/// with no text contributes nothing. An all-whitespace aggregate is an
/// [`DigestError::EmptyContent`] failure, distinct from
/// [`DigestError::Extraction`] on a malformed file.
pub fn extract_text(pdf_path: &Path) -> Result<String> {
    let pages = read_pages(pdf_path)?;
    let text = pages.join("\n");

    if text.trim().is_empty() {
        warn!(path = %pdf_path.display(), "PDF parsed but yielded no text");
        return Err(DigestError::EmptyContent(format!(
            "no extractable text in {}",
            pdf_path.display()
        )));
    }

    debug!(path = %pdf_path.display(), chars = text.len(), pages = pages.len(), "Text extracted");
    Ok(text)
}

/// Extract the most prominent table in the document.
///
/// Scans pages in order, collects every candidate tabular block, and picks
/// the one with the most rows; ties go to the first seen. No detected table
/// is `None`, not an error.
pub fn extract_table(pdf_path: &Path) -> Result<Option<Vec<Vec<String>>>> {
    let pages = read_pages(pdf_path)?;
    Ok(largest_table(&pages))
}

/// Slice the "Results" section out of extracted text, up to the next
/// section heading (Discussion, Conclusion or References).
pub fn extract_results_section(text: &str) -> Option<String> {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.iter().position(|l| is_heading(l, "results"))?;

    let end = lines[start + 1..]
        .iter()
        .position(|l| {
            is_heading(l, "discussion") || is_heading(l, "conclusion") || is_heading(l, "references")
        })
        .map(|i| start + 1 + i)
        .unwrap_or(lines.len());

    let section = lines[start..end].join("\n").trim().to_string();
    if section.is_empty() {
        None
    } else {
        Some(section)
    }
}

/// Per-page text in page order. Malformed/unreadable PDFs surface as
/// [`DigestError::Extraction`].
fn read_pages(pdf_path: &Path) -> Result<Vec<String>> {
    pdf_extract::extract_text_by_pages(pdf_path)
        .map_err(|e| DigestError::Extraction(format!("{}: {}", pdf_path.display(), e)))
}

/// Pick the candidate table with the most rows across all pages.
fn largest_table(pages: &[String]) -> Option<Vec<Vec<String>>> {
    let mut best: Option<Vec<Vec<String>>> = None;
    for page in pages {
        for table in detect_tables(page) {
            // Strictly-greater keeps the first-seen table on row-count ties.
            if best.as_ref().map(|b| table.len() > b.len()).unwrap_or(true) {
                best = Some(table);
            }
        }
    }
    best
}

/// Detect tabular blocks in one page of text.
///
/// A table line splits into at least two cells on tabs or runs of two or
/// more spaces; at least two consecutive table lines form a candidate.
fn detect_tables(page_text: &str) -> Vec<Vec<Vec<String>>> {
    let separator = match Regex::new(r"\t+|\s{2,}") {
        Ok(re) => re,
        Err(_) => return Vec::new(),
    };

    let mut tables = Vec::new();
    let mut current: Vec<Vec<String>> = Vec::new();

    for line in page_text.lines() {
        let cells = split_cells(line, &separator);
        if cells.len() >= 2 {
            current.push(cells);
        } else {
            if current.len() >= 2 {
                tables.push(std::mem::take(&mut current));
            }
            current.clear();
        }
    }
    if current.len() >= 2 {
        tables.push(current);
    }

    tables
}

fn split_cells(line: &str, separator: &Regex) -> Vec<String> {
    separator
        .split(line.trim())
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

/// A section heading is a short standalone line starting with the keyword.
fn is_heading(line: &str, word: &str) -> bool {
    let trimmed = line.trim().trim_end_matches(':').to_lowercase();
    trimmed == word || (trimmed.starts_with(word) && trimmed.len() <= word.len() + 20 && !trimmed.ends_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth;
    use tempfile::tempdir;

    #[test]
    fn test_extract_text_round_trip() -> Result<()> {
        let dir = tempdir()?;
        let pdf = dir.path().join("paper.pdf");
        synth::write_text_pdf(
            "Objective of the study was measured carefully.\nSamples were collected in 2020.",
            &pdf,
        )?;

        let text = extract_text(&pdf)?;
        assert!(text.contains("Objective"));
        assert!(text.contains("2020"));
        Ok(())
    }

    #[test]
    fn test_empty_pdf_is_empty_content_not_extraction_error() -> Result<()> {
        let dir = tempdir()?;
        let pdf = dir.path().join("blank.pdf");
        synth::write_text_pdf("", &pdf)?;

        let err = extract_text(&pdf).expect_err("blank PDF must not yield text");
        assert!(matches!(err, DigestError::EmptyContent(_)));
        Ok(())
    }

    #[test]
    fn test_corrupt_file_is_extraction_error() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("garbage.pdf");
        std::fs::write(&path, b"this is not a pdf at all")?;

        let err = extract_text(&path).expect_err("garbage must fail");
        assert!(matches!(err, DigestError::Extraction(_)));
        Ok(())
    }

    #[test]
    fn test_largest_table_prefers_most_rows() {
        let pages = vec![
            "Group A  12  0.5\nGroup B  15  0.7\n\nprose line".to_string(),
            "Dose  N  Mean  SD\n10mg  20  1.1  0.2\n20mg  19  1.4  0.3\n40mg  21  1.9  0.4".to_string(),
        ];
        let table = largest_table(&pages).expect("tables present");
        assert_eq!(table.len(), 4);
        assert_eq!(table[0], vec!["Dose", "N", "Mean", "SD"]);
        assert_eq!(table[3][0], "40mg");
    }

    #[test]
    fn test_table_tie_broken_by_first_seen() {
        let pages = vec![
            "a  1\nb  2".to_string(),
            "x  9\ny  8".to_string(),
        ];
        let table = largest_table(&pages).expect("tables present");
        assert_eq!(table[0], vec!["a", "1"]);
    }

    #[test]
    fn test_no_table_detected() {
        let pages = vec!["Plain paragraph text with single spaces only.".to_string()];
        assert!(largest_table(&pages).is_none());
    }

    #[test]
    fn test_extract_results_section() {
        let text = "Introduction\nSetup details.\nResults\nThe treatment arm improved.\nSecondary endpoints held.\nDiscussion\nCaveats apply.";
        let section = extract_results_section(text).expect("results present");
        assert!(section.starts_with("Results"));
        assert!(section.contains("Secondary endpoints"));
        assert!(!section.contains("Caveats"));
    }

    #[test]
    fn test_results_section_runs_to_end_without_following_heading() {
        let text = "Results:\nAll twelve subjects completed the protocol.";
        let section = extract_results_section(text).expect("results present");
        assert!(section.contains("twelve subjects"));
    }

    #[test]
    fn test_results_section_absent() {
        assert!(extract_results_section("Methods\nNothing else here.").is_none());
    }
}
