//! System prompt template and review perspectives
//!
//! The system prompt is a text file with two placeholders, `{file_name}` and
//! `{diff_info}`, substituted for every review call. Literal braces are
//! written as `{{` and `}}`. Templates are parsed once at load time so that a
//! typo in a placeholder fails the run before any request is made.

use std::path::Path;

use tracing::debug;

use crate::{Error, Result};

/// Placeholder replaced by the reviewed file's path
pub const FILE_NAME: &str = "file_name";
/// Placeholder replaced by the unified diff text
pub const DIFF_INFO: &str = "diff_info";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    FileName,
    DiffInfo,
}

/// Parsed system prompt template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
}

impl PromptTemplate {
    /// Parse a template string
    pub fn parse(source: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut text = String::new();
        let mut chars = source.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    text.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    text.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(c) => name.push(c),
                            None => {
                                return Err(Error::Template(format!(
                                    "unclosed placeholder '{{{}'",
                                    name
                                )))
                            }
                        }
                    }
                    let placeholder = match name.as_str() {
                        FILE_NAME => Segment::FileName,
                        DIFF_INFO => Segment::DiffInfo,
                        other => {
                            return Err(Error::Template(format!(
                                "unknown placeholder '{{{}}}'",
                                other
                            )))
                        }
                    };
                    if !text.is_empty() {
                        segments.push(Segment::Text(std::mem::take(&mut text)));
                    }
                    segments.push(placeholder);
                }
                '}' => {
                    return Err(Error::Template(
                        "single '}' encountered; use '}}' for a literal brace".to_string(),
                    ))
                }
                c => text.push(c),
            }
        }

        if !text.is_empty() {
            segments.push(Segment::Text(text));
        }

        Ok(Self { segments })
    }

    /// Load and parse a template file
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(Error::Io)?;
        let template = Self::parse(&source)?;
        debug!(path = %path.display(), "Loaded system prompt template");
        Ok(template)
    }

    /// Substitute the placeholders for one file
    pub fn render(&self, file_name: &str, diff_info: &str) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::FileName => out.push_str(file_name),
                Segment::DiffInfo => out.push_str(diff_info),
            }
        }
        out
    }
}

/// Load review perspectives from a JSON array of strings
///
/// Order is preserved; it decides the order of sections in the review document.
pub fn load_perspectives(path: &Path) -> Result<Vec<String>> {
    let contents = std::fs::read_to_string(path).map_err(Error::Io)?;
    let perspectives: Vec<String> = serde_json::from_str(&contents)?;
    debug!(path = %path.display(), count = perspectives.len(), "Loaded review perspectives");
    Ok(perspectives)
}
