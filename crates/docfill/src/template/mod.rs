pub mod placeholder;

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::TemplateError;
use crate::processor::ProcessorRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateKind {
    Docx,
    Spreadsheet,
    Text,
}

impl TemplateKind {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "docx" | "docm" | "dotx" => Some(TemplateKind::Docx),
            "xlsx" | "xlsm" | "xltx" => Some(TemplateKind::Spreadsheet),
            "txt" | "md" | "html" | "htm" | "csv" => Some(TemplateKind::Text),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Declared kind names used by upload collaborators.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "docx" | "word" => Some(TemplateKind::Docx),
            "spreadsheet" | "xlsx" | "excel" => Some(TemplateKind::Spreadsheet),
            "text" | "txt" => Some(TemplateKind::Text),
            _ => None,
        }
    }

    /// Default extension for outputs of this kind.
    pub fn extension(&self) -> &'static str {
        match self {
            TemplateKind::Docx => "docx",
            TemplateKind::Spreadsheet => "xlsx",
            TemplateKind::Text => "txt",
        }
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TemplateKind::Docx => "docx",
            TemplateKind::Spreadsheet => "spreadsheet",
            TemplateKind::Text => "text",
        };
        f.write_str(name)
    }
}

/// A registered template: raw bytes plus the placeholder list computed once
/// at registration.
#[derive(Debug, Clone)]
pub struct Template {
    id: String,
    name: String,
    kind: TemplateKind,
    content: Arc<[u8]>,
    placeholders: Arc<[String]>,
}

impl Template {
    /// Parses `content` and caches its placeholders. Fails with
    /// `MalformedTemplate` when the container cannot be read at all.
    pub fn load(
        name: impl Into<String>,
        kind: TemplateKind,
        content: Vec<u8>,
        processors: &ProcessorRegistry,
    ) -> Result<Self, TemplateError> {
        let placeholders = processors.extract(kind, &content)?;

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            kind,
            content: content.into(),
            placeholders: placeholders.into(),
        })
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> TemplateKind {
        self.kind
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn placeholders(&self) -> &[String] {
        &self.placeholders
    }

    /// Extension used for generated outputs: the template's own extension
    /// when it has one, otherwise the kind's default.
    pub fn output_extension(&self) -> String {
        Path::new(&self.name)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| TemplateKind::from_extension(e) == Some(self.kind))
            .map(|e| e.to_lowercase())
            .unwrap_or_else(|| self.kind.extension().to_string())
    }
}

/// Registered templates by id.
#[derive(Default)]
pub struct TemplateRegistry {
    templates: RwLock<HashMap<String, Arc<Template>>>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, template: Template) -> Result<Arc<Template>, TemplateError> {
        let template = Arc::new(template);
        self.templates
            .write()
            .map_err(|_| TemplateError::RegistryPoisoned)?
            .insert(template.id().to_string(), Arc::clone(&template));
        debug!(
            template_id = %template.id(),
            kind = %template.kind(),
            placeholders = template.placeholders().len(),
            "Registered template"
        );
        Ok(template)
    }

    pub fn get(&self, id: &str) -> Result<Arc<Template>, TemplateError> {
        self.templates
            .read()
            .map_err(|_| TemplateError::RegistryPoisoned)?
            .get(id)
            .cloned()
            .ok_or_else(|| TemplateError::NotFound(id.to_string()))
    }

    pub fn remove(&self, id: &str) -> Result<bool, TemplateError> {
        Ok(self
            .templates
            .write()
            .map_err(|_| TemplateError::RegistryPoisoned)?
            .remove(id)
            .is_some())
    }

    pub fn len(&self) -> usize {
        self.templates.read().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_extension() {
        assert_eq!(TemplateKind::from_extension("DOCX"), Some(TemplateKind::Docx));
        assert_eq!(TemplateKind::from_extension("xlsx"), Some(TemplateKind::Spreadsheet));
        assert_eq!(TemplateKind::from_extension("md"), Some(TemplateKind::Text));
        assert_eq!(TemplateKind::from_extension("pdf"), None);
        assert_eq!(
            TemplateKind::from_path(Path::new("/tmp/invoice.docx")),
            Some(TemplateKind::Docx)
        );
    }

    #[test]
    fn test_kind_from_declared_name() {
        assert_eq!(TemplateKind::from_name("spreadsheet"), Some(TemplateKind::Spreadsheet));
        assert_eq!(TemplateKind::from_name("Docx"), Some(TemplateKind::Docx));
        assert_eq!(TemplateKind::from_name("pdf"), None);
    }

    #[test]
    fn test_template_caches_placeholders() {
        let processors = ProcessorRegistry::new();
        let template = Template::load(
            "letter.md",
            TemplateKind::Text,
            b"# {{title}}\n{{body}} {{title}}".to_vec(),
            &processors,
        )
        .unwrap();

        assert_eq!(template.placeholders(), &["title".to_string(), "body".to_string()]);
        assert_eq!(template.output_extension(), "md");
    }

    #[test]
    fn test_output_extension_falls_back_to_kind() {
        let processors = ProcessorRegistry::new();
        let template =
            Template::load("upload", TemplateKind::Text, b"x".to_vec(), &processors).unwrap();
        assert_eq!(template.output_extension(), "txt");
    }

    #[test]
    fn test_registry_lookup() {
        let processors = ProcessorRegistry::new();
        let registry = TemplateRegistry::new();
        let template = Template::load("a.txt", TemplateKind::Text, b"{{a}}".to_vec(), &processors)
            .unwrap()
            .with_id("tpl-1");
        registry.insert(template).unwrap();

        assert_eq!(registry.get("tpl-1").unwrap().placeholders(), &["a".to_string()]);
        assert!(matches!(registry.get("nope"), Err(TemplateError::NotFound(_))));
        assert!(registry.remove("tpl-1").unwrap());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_poisoned_registry_reports_error() {
        let processors = ProcessorRegistry::new();
        let registry = Arc::new(TemplateRegistry::new());

        let poisoner = Arc::clone(&registry);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.templates.write().unwrap();
            panic!("writer failed mid-update");
        })
        .join();

        let template = Template::load("a.txt", TemplateKind::Text, b"{{a}}".to_vec(), &processors).unwrap();
        assert!(matches!(registry.insert(template), Err(TemplateError::RegistryPoisoned)));
        assert!(matches!(registry.get("tpl-1"), Err(TemplateError::RegistryPoisoned)));
        assert!(matches!(registry.remove("tpl-1"), Err(TemplateError::RegistryPoisoned)));
    }
}
