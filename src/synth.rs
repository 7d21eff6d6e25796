//! Synthesized-PDF fallback.
//!
//! When no publisher PDF is reachable, the fetcher renders the scraped page
//! text into a minimal PDF so the rest of the pipeline (extraction,
//! summarization) runs unchanged. Extraction fidelity is lower than a real
//! PDF; callers must track which kind they got.

use crate::error::{DigestError, Result};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::path::Path;
use tracing::debug;

/// Characters per rendered line before wrapping
const WRAP_COLS: usize = 95;

/// Text lines per page
const LINES_PER_PAGE: usize = 52;

/// A4 media box
const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;

/// Render plain text into a PDF at `dest`.
///
/// Characters outside the single-byte WinAnsi range are dropped. Produces
/// at least one page even for empty input.
pub fn write_text_pdf(text: &str, dest: &Path) -> Result<()> {
    let lines = layout_lines(text);

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    let pages: Vec<&[String]> = if lines.is_empty() {
        vec![&[] as &[String]]
    } else {
        lines.chunks(LINES_PER_PAGE).collect()
    };

    for page_lines in &pages {
        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 10.into()]),
            Operation::new("TL", vec![14.into()]),
            Operation::new("Td", vec![50.into(), 780.into()]),
        ];
        for line in *page_lines {
            operations.push(Operation::new("Tj", vec![Object::string_literal(encode_winansi(line))]));
            operations.push(Operation::new("T*", vec![]));
        }
        operations.push(Operation::new("ET", vec![]));

        let content = Content { operations };
        let encoded = content
            .encode()
            .map_err(|e| DigestError::Extraction(format!("Failed to encode page content: {}", e)))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        });
        kids.push(page_id.into());
    }

    let page_count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    doc.save(dest)
        .map_err(|e| DigestError::Extraction(format!("Failed to write synthesized PDF: {}", e)))?;

    debug!(dest = %dest.display(), pages = page_count, "Synthesized PDF written");
    Ok(())
}

/// Sanitize and wrap input text into renderable lines.
fn layout_lines(text: &str) -> Vec<String> {
    let mut lines = Vec::new();
    for raw_line in text.lines() {
        let sanitized = sanitize_line(raw_line);
        if sanitized.is_empty() {
            lines.push(String::new());
            continue;
        }
        let mut rest = sanitized.as_str();
        while rest.chars().count() > WRAP_COLS {
            let window_end = rest
                .char_indices()
                .nth(WRAP_COLS)
                .map(|(i, _)| i)
                .unwrap_or(rest.len());
            // Break on the last space inside the window when there is one.
            let window = &rest[..window_end];
            let cut = window.rfind(' ').filter(|&i| i > 0).unwrap_or(window_end);
            lines.push(rest[..cut].trim_end().to_string());
            rest = rest[cut..].trim_start();
        }
        lines.push(rest.to_string());
    }
    // Drop trailing blank lines so page count stays minimal.
    while lines.last().map(|l| l.is_empty()).unwrap_or(false) {
        lines.pop();
    }
    lines
}

/// Single-byte encoding of a sanitized line for the PDF literal string.
fn encode_winansi(line: &str) -> Vec<u8> {
    line.chars().map(|c| c as u32 as u8).collect()
}

/// Keep printable single-byte characters only; everything else is dropped.
fn sanitize_line(line: &str) -> String {
    line.chars()
        .map(|c| if c == '\t' { ' ' } else { c })
        .filter(|&c| {
            let code = c as u32;
            (0x20..0x7F).contains(&code) || (0xA0..=0xFF).contains(&code)
        })
        .collect::<String>()
        .trim_end()
        .to_string()
}
