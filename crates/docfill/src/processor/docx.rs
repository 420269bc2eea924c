use std::collections::HashMap;

use crate::error::{FillError, TemplateError};
use crate::processor::package::Package;
use crate::processor::DocumentProcessor;
use crate::template::TemplateKind;

const MAIN_PART: &str = "word/document.xml";

pub struct DocxProcessor;

impl DocxProcessor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DocxProcessor {
    fn default() -> Self {
        Self::new()
    }
}

/// Body, headers, footers, footnotes and endnotes carry user text.
fn is_text_part(name: &str) -> bool {
    if name == MAIN_PART || name == "word/footnotes.xml" || name == "word/endnotes.xml" {
        return true;
    }
    let Some(file) = name.strip_prefix("word/") else {
        return false;
    };
    !file.contains('/')
        && (file.starts_with("header") || file.starts_with("footer"))
        && file.ends_with(".xml")
}

fn rank(name: &str) -> u8 {
    if name == MAIN_PART {
        0
    } else {
        1
    }
}

fn open(content: &[u8]) -> Result<(Package, Vec<String>), String> {
    let package = Package::open(content)?;
    if !package.contains(MAIN_PART) {
        return Err(format!("Not a Word document: missing '{}'", MAIN_PART));
    }
    let parts = package.text_parts(is_text_part, rank);
    Ok((package, parts))
}

impl DocumentProcessor for DocxProcessor {
    fn extract(&self, content: &[u8]) -> Result<Vec<String>, TemplateError> {
        let (package, parts) = open(content).map_err(TemplateError::MalformedTemplate)?;
        package
            .collect_placeholders(&parts)
            .map_err(TemplateError::MalformedTemplate)
    }

    fn render(
        &self,
        content: &[u8],
        values: &HashMap<String, String>,
    ) -> Result<Vec<u8>, FillError> {
        let render_err = |reason: String| FillError::Render { reason };

        let (mut package, parts) = open(content).map_err(render_err)?;
        package.substitute(&parts, values).map_err(render_err)?;
        package.to_bytes().map_err(render_err)
    }

    fn supports(&self, kind: TemplateKind) -> bool {
        matches!(kind, TemplateKind::Docx)
    }
}
