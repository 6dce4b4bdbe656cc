//! Turns ordered matches into a single context string

use serde::Serialize;
use tracing::warn;

use ragpipe_core::Match;

pub const PASSAGE_SEPARATOR: &str = "\n\n";

/// Assembled context plus a record of what went into it
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssembledContext {
    pub text: String,
    pub included_ids: Vec<String>,
    pub skipped: Vec<String>,
}

/// Joins the passage text of each match, in order.
///
/// Pure: the output depends only on the matches and the assembler's
/// settings.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    text_field: String,
    max_chars: Option<usize>,
}

impl ContextAssembler {
    pub fn new(text_field: impl Into<String>) -> Self {
        Self {
            text_field: text_field.into(),
            max_chars: None,
        }
    }

    /// Bound the context length, counted in chars
    pub fn with_max_chars(mut self, max_chars: Option<usize>) -> Self {
        self.max_chars = max_chars;
        self
    }

    pub fn assemble(&self, matches: &[Match]) -> String {
        self.assemble_detailed(matches).text
    }

    pub fn assemble_detailed(&self, matches: &[Match]) -> AssembledContext {
        let mut assembled = AssembledContext::default();
        let mut length = 0usize;
        let mut full = false;

        for m in matches {
            let Some(passage) = m.text_field(&self.text_field) else {
                warn!(
                    "Skipping match {}: no '{}' text in metadata",
                    m.id, self.text_field
                );
                assembled.skipped.push(m.id.clone());
                continue;
            };

            if full {
                assembled.skipped.push(m.id.clone());
                continue;
            }

            let passage_len = passage.chars().count();
            let separator_len = if assembled.included_ids.is_empty() {
                0
            } else {
                PASSAGE_SEPARATOR.len()
            };

            match self.max_chars {
                Some(max) if length + separator_len + passage_len > max => {
                    full = true;
                    if assembled.included_ids.is_empty() && max > 0 {
                        assembled.text = passage.chars().take(max).collect();
                        assembled.included_ids.push(m.id.clone());
                    } else {
                        assembled.skipped.push(m.id.clone());
                    }
                    continue;
                }
                _ => {}
            }

            if separator_len > 0 {
                assembled.text.push_str(PASSAGE_SEPARATOR);
            }
            assembled.text.push_str(passage);
            assembled.included_ids.push(m.id.clone());
            length += separator_len + passage_len;
        }

        assembled
    }
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new("text")
    }
}
