mod cli;

use std::path::Path;

use anyhow::{bail, Context, Result};
use docfill::{
    Dataset, DocfillError, FillConfig, FillService, Mapping, OutputError, OutputSelector, Row,
    TemplateKind,
};
use serde::Deserialize;
use tracing::{info, warn};

/// Dataset file layout: column names plus rows keyed by column.
#[derive(Debug, Deserialize)]
struct DatasetFile {
    columns: Vec<String>,
    rows: Vec<Row>,
}

fn read_dataset(path: &Path) -> Result<Dataset> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read dataset {}", path.display()))?;
    let file: DatasetFile = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse dataset {}", path.display()))?;
    Ok(Dataset::new(file.columns, file.rows)?)
}

fn read_mapping(path: &Path) -> Result<Mapping> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read mapping {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse mapping {}", path.display()))
}

fn template_kind(args: &cli::CliArgs) -> Result<TemplateKind> {
    match &args.kind {
        Some(name) => TemplateKind::from_name(name).with_context(|| format!("unknown template kind '{name}'")),
        None => TemplateKind::from_path(&args.template).with_context(|| {
            format!(
                "cannot tell the template kind of {}; pass --kind",
                args.template.display()
            )
        }),
    }
}

fn main() -> Result<()> {
    let args = cli::parse_args();
    docfill::logging::init_logging("info", args.json_logs).context("failed to initialize logging")?;

    let config = match &args.config_path {
        Some(path) => docfill::load_config(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => FillConfig::default(),
    };
    let service = FillService::from_config(config)?;

    let content = std::fs::read(&args.template)
        .with_context(|| format!("failed to read template {}", args.template.display()))?;
    let name = args
        .template
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "template".to_string());
    let template = service.register_template(name, template_kind(&args)?, content)?;
    info!(placeholders = ?template.placeholders(), "Template registered");

    let dataset = read_dataset(&args.data)?;
    let mapping = match &args.mapping {
        Some(path) => read_mapping(path)?,
        None => {
            let (suggestions, draft) = service.draft_mapping(template.id(), dataset.columns())?;
            for suggestion in &suggestions {
                info!(
                    placeholder = %suggestion.placeholder,
                    column = suggestion.column.as_deref().unwrap_or("-"),
                    confidence = %suggestion.confidence,
                    "Suggested column"
                );
            }
            draft
        }
    };

    let validation = service.validate_mapping(template.id(), &mapping, dataset.columns())?;
    if args.dry_run {
        println!("{}", serde_json::to_string_pretty(&mapping)?);
        println!("{}", serde_json::to_string_pretty(&validation)?);
        return Ok(());
    }
    validation.into_result()?;

    let job = service.run_job(dataset, template.id(), mapping)?;
    for result in job.results().iter().filter(|r| !r.is_success()) {
        warn!(
            row = result.row_index,
            error = result.error.as_deref().unwrap_or("unknown"),
            "Row failed"
        );
    }
    info!(
        job_id = %job.id,
        status = %job.status(),
        succeeded = job.succeeded(),
        failed = job.failed(),
        "Job finished"
    );

    let Some(out) = &args.out else {
        return Ok(());
    };
    match service.download_output(&job.id, OutputSelector::All) {
        Ok(bundle) => {
            std::fs::write(out, &bundle.content)
                .with_context(|| format!("failed to write {}", out.display()))?;
            info!(path = %out.display(), bytes = bundle.content.len(), "Bundle written");
        }
        Err(DocfillError::Output(OutputError::EmptyResultSet(_))) => {
            bail!("no row produced a document; nothing written to {}", out.display())
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}
