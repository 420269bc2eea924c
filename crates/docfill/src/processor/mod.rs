pub mod docx;
pub mod ooxml;
pub mod package;
pub mod text;
pub mod xlsx;

use std::collections::HashMap;

use crate::error::{FillError, TemplateError};
use crate::template::TemplateKind;

/// Reads and fills one kind of template document.
pub trait DocumentProcessor: Send + Sync {
    /// Returns the distinct placeholder names in first-occurrence order.
    fn extract(&self, content: &[u8]) -> Result<Vec<String>, TemplateError>;

    /// Substitutes every placeholder that has an entry in `values`.
    fn render(&self, content: &[u8], values: &HashMap<String, String>)
        -> Result<Vec<u8>, FillError>;

    fn supports(&self, kind: TemplateKind) -> bool;
}

pub struct ProcessorRegistry {
    processors: Vec<Box<dyn DocumentProcessor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        let processors: Vec<Box<dyn DocumentProcessor>> = vec![
            Box::new(text::TextProcessor::new()),
            Box::new(docx::DocxProcessor::new()),
            Box::new(xlsx::SpreadsheetProcessor::new()),
        ];

        Self { processors }
    }

    pub fn processor_for(&self, kind: TemplateKind) -> Option<&dyn DocumentProcessor> {
        self.processors
            .iter()
            .find(|p| p.supports(kind))
            .map(|p| p.as_ref())
    }

    pub fn extract(&self, kind: TemplateKind, content: &[u8]) -> Result<Vec<String>, TemplateError> {
        self.processor_for(kind)
            .ok_or_else(|| TemplateError::UnsupportedFormat(kind.to_string()))?
            .extract(content)
    }

    pub fn render(
        &self,
        kind: TemplateKind,
        content: &[u8],
        values: &HashMap<String, String>,
    ) -> Result<Vec<u8>, FillError> {
        self.processor_for(kind)
            .ok_or_else(|| FillError::Render {
                reason: format!("no processor for {} templates", kind),
            })?
            .render(content, values)
    }
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
