use std::collections::HashMap;

use crate::error::{FillError, TemplateError};
use crate::processor::DocumentProcessor;
use crate::template::placeholder::{replace_placeholders, PlaceholderSet};
use crate::template::TemplateKind;

/// Plain UTF-8 templates (txt, md, html, csv).
pub struct TextProcessor;

impl TextProcessor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TextProcessor {
    fn default() -> Self {
        Self::new()
    }
}

fn decode(content: &[u8]) -> Result<&str, String> {
    let content = content.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(content);
    std::str::from_utf8(content).map_err(|e| format!("Template is not valid UTF-8: {}", e))
}

impl DocumentProcessor for TextProcessor {
    fn extract(&self, content: &[u8]) -> Result<Vec<String>, TemplateError> {
        let text = decode(content).map_err(TemplateError::MalformedTemplate)?;
        let mut set = PlaceholderSet::new();
        set.scan(text);
        Ok(set.into_vec())
    }

    fn render(
        &self,
        content: &[u8],
        values: &HashMap<String, String>,
    ) -> Result<Vec<u8>, FillError> {
        let bom = content.starts_with(b"\xEF\xBB\xBF");
        let text = decode(content).map_err(|reason| FillError::Render { reason })?;
        let filled = replace_placeholders(text, |name| values.get(name).cloned());

        let mut out = Vec::with_capacity(content.len());
        if bom {
            out.extend_from_slice(b"\xEF\xBB\xBF");
        }
        out.extend_from_slice(filled.as_bytes());
        Ok(out)
    }

    fn supports(&self, kind: TemplateKind) -> bool {
        matches!(kind, TemplateKind::Text)
    }
}
