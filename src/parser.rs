//! Document parsing seam.
//!
//! Text extraction is an external concern; the controller consumes it
//! through the [`BookParser`] trait. The built-in [`TextParser`] covers
//! plain-text and markdown inputs so the binary is usable without a
//! format-specific extractor.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};

use crate::state_machine::{Chapter, ParsedContent};

/// Extracts chapters and engine-ready formatted text from one document.
pub trait BookParser: Send {
    /// Extract the ordered chapters and per-chapter character counts.
    /// Any underlying failure surfaces to the controller as a parse error.
    fn process_content(&mut self) -> Result<ParsedContent>;

    /// The engine-ready text rendering of the processed content.
    /// Only meaningful after a successful `process_content`.
    fn formatted_text(&self) -> String;
}

/// Parser for plain-text and markdown documents.
///
/// Markdown chapters split on top-level `#` headings; a document without
/// headings becomes a single chapter.
pub struct TextParser {
    input: PathBuf,
    formatted: String,
}

impl TextParser {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            formatted: String::new(),
        }
    }

    fn split_chapters(raw: &str) -> Vec<Chapter> {
        let mut chapters: Vec<(String, String)> = Vec::new();
        let mut current_title: Option<String> = None;
        let mut current_body = String::new();

        for line in raw.lines() {
            let trimmed = line.trim_start();
            if trimmed.starts_with("# ") || trimmed.starts_with("## ") {
                if current_title.is_some() || !current_body.trim().is_empty() {
                    chapters.push((
                        current_title.take().unwrap_or_else(|| "Preface".into()),
                        std::mem::take(&mut current_body),
                    ));
                }
                current_title = Some(trimmed.trim_start_matches('#').trim().to_string());
            } else {
                current_body.push_str(line);
                current_body.push('\n');
            }
        }
        if current_title.is_some() || !current_body.trim().is_empty() {
            chapters.push((
                current_title.unwrap_or_else(|| "Chapter 1".into()),
                current_body,
            ));
        }

        chapters
            .into_iter()
            .enumerate()
            .map(|(i, (title, body))| Chapter {
                id: format!("{}: {title}", i + 1),
                text: body.trim().to_string(),
            })
            .collect()
    }
}

impl BookParser for TextParser {
    fn process_content(&mut self) -> Result<ParsedContent> {
        match extension_of(&self.input) {
            Some("txt") | Some("md") | Some("markdown") => {}
            Some(other) => bail!("unsupported input format: {other}"),
            None => bail!("cannot determine input format (no file extension)"),
        }

        let raw = std::fs::read_to_string(&self.input)?;
        let chapters = Self::split_chapters(&raw);
        if chapters.is_empty() {
            bail!("document contains no text");
        }

        let mut formatted = String::new();
        for chapter in &chapters {
            formatted.push_str(&chapter.id);
            formatted.push('\n');
            formatted.push_str(&chapter.text);
            formatted.push_str("\n\n");
        }
        self.formatted = formatted;

        Ok(ParsedContent::new(chapters))
    }

    fn formatted_text(&self) -> String {
        self.formatted.clone()
    }
}

fn extension_of(path: &Path) -> Option<&str> {
    path.extension().and_then(|e| e.to_str())
}
