//! Turns one dataset row into a filled document.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::trace;

use crate::dataset::Row;
use crate::error::FillError;
use crate::mapping::Mapping;
use crate::processor::ProcessorRegistry;
use crate::template::Template;

/// Produces the document for one row. Implementations must be safe to call
/// from several worker threads at once.
pub trait RowFiller: Send + Sync {
    fn fill_row(&self, row_index: usize, row: &Row) -> Result<Vec<u8>, FillError>;
}

pub struct TemplateFiller {
    processors: Arc<ProcessorRegistry>,
}

impl TemplateFiller {
    pub fn new(processors: Arc<ProcessorRegistry>) -> Self {
        Self { processors }
    }

    pub fn processors(&self) -> &ProcessorRegistry {
        &self.processors
    }

    /// Fills `template` with the values of `row` as selected by `mapping`.
    pub fn fill(&self, template: &Template, row: &Row, mapping: &Mapping) -> Result<Vec<u8>, FillError> {
        let values = resolve_values(template.placeholders(), row, mapping)?;
        self.processors
            .render(template.kind(), template.content(), &values)
    }

    /// Pairs a template with a confirmed mapping for a batch run.
    pub fn bind(&self, template: Arc<Template>, mapping: Mapping) -> BoundTemplate {
        BoundTemplate {
            template,
            mapping,
            processors: Arc::clone(&self.processors),
        }
    }
}

impl Default for TemplateFiller {
    fn default() -> Self {
        Self::new(Arc::new(ProcessorRegistry::new()))
    }
}

/// Looks up the display value of every placeholder, in extraction order.
/// Null cells become empty strings; an absent column is an error.
pub fn resolve_values(
    placeholders: &[String],
    row: &Row,
    mapping: &Mapping,
) -> Result<HashMap<String, String>, FillError> {
    let mut values = HashMap::with_capacity(placeholders.len());

    for placeholder in placeholders {
        let column = mapping
            .column_for(placeholder)
            .ok_or_else(|| FillError::UnmappedPlaceholder {
                placeholder: placeholder.clone(),
            })?;

        let cell = row.get(column).ok_or_else(|| FillError::MissingColumn {
            placeholder: placeholder.clone(),
            column: column.to_string(),
        })?;

        values.insert(placeholder.clone(), cell.to_string());
    }

    Ok(values)
}

/// A template and its confirmed mapping, shared read-only by row workers.
#[derive(Clone)]
pub struct BoundTemplate {
    template: Arc<Template>,
    mapping: Mapping,
    processors: Arc<ProcessorRegistry>,
}

impl BoundTemplate {
    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }
}

impl RowFiller for BoundTemplate {
    fn fill_row(&self, row_index: usize, row: &Row) -> Result<Vec<u8>, FillError> {
        trace!(row_index, template_id = %self.template.id(), "Filling row");
        let values = resolve_values(self.template.placeholders(), row, &self.mapping)?;
        self.processors
            .render(self.template.kind(), self.template.content(), &values)
    }
}
