use std::collections::HashMap;

use crate::error::{FillError, TemplateError};
use crate::processor::package::Package;
use crate::processor::DocumentProcessor;
use crate::template::TemplateKind;

const WORKBOOK_PART: &str = "xl/workbook.xml";
const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";

/// Spreadsheet templates: placeholders live in the shared string table or
/// in inline strings of worksheet cells.
pub struct SpreadsheetProcessor;

impl SpreadsheetProcessor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SpreadsheetProcessor {
    fn default() -> Self {
        Self::new()
    }
}

fn is_text_part(name: &str) -> bool {
    if name == SHARED_STRINGS_PART {
        return true;
    }
    name.strip_prefix("xl/worksheets/")
        .is_some_and(|file| !file.contains('/') && file.ends_with(".xml"))
}

fn rank(name: &str) -> u8 {
    if name == SHARED_STRINGS_PART {
        0
    } else {
        1
    }
}

fn open(content: &[u8]) -> Result<(Package, Vec<String>), String> {
    let package = Package::open(content)?;
    if !package.contains(WORKBOOK_PART) {
        return Err(format!("Not a spreadsheet: missing '{}'", WORKBOOK_PART));
    }
    let parts = package.text_parts(is_text_part, rank);
    Ok((package, parts))
}

impl DocumentProcessor for SpreadsheetProcessor {
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
        matches!(kind, TemplateKind::Spreadsheet)
    }
}
