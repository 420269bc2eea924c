use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgs {
    pub template: PathBuf,
    pub data: PathBuf,
    pub mapping: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
    pub out: Option<PathBuf>,
    /// Overrides the kind derived from the template's extension.
    pub kind: Option<String>,
    /// Print suggestions and validation, run nothing.
    pub dry_run: bool,
    pub json_logs: bool,
}

enum ParseOutcome {
    Args(CliArgs),
    Help,
}

fn usage() {
    eprintln!(
        "usage:
  docfill --template <file> --data <dataset.json> --out <bundle.zip>
          [--mapping <mapping.json>] [--config <config.json>] [--kind <docx|spreadsheet|text>]
          [--dry-run] [--json-logs]

dataset.json: {{ \"columns\": [..], \"rows\": [{{ column: value, .. }}, ..] }}
mapping.json: {{ placeholder: column, .. }}; suggested automatically when omitted
"
    );
}

fn value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String, String> {
    args.next().ok_or_else(|| format!("{flag} requires a value"))
}

fn parse_args_impl(mut args: impl Iterator<Item = String>) -> Result<ParseOutcome, String> {
    let mut template = None;
    let mut data = None;
    let mut mapping = None;
    let mut config_path = None;
    let mut out = None;
    let mut kind = None;
    let mut dry_run = false;
    let mut json_logs = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--template" => template = Some(PathBuf::from(value(&mut args, "--template")?)),
            "--data" => data = Some(PathBuf::from(value(&mut args, "--data")?)),
            "--mapping" => mapping = Some(PathBuf::from(value(&mut args, "--mapping")?)),
            "--config" => config_path = Some(PathBuf::from(value(&mut args, "--config")?)),
            "--out" => out = Some(PathBuf::from(value(&mut args, "--out")?)),
            "--kind" => kind = Some(value(&mut args, "--kind")?),
            "--dry-run" => dry_run = true,
            "--json-logs" => json_logs = true,
            "-h" | "--help" | "help" => return Ok(ParseOutcome::Help),
            other => return Err(format!("unknown argument '{other}'")),
        }
    }

    let template = template.ok_or_else(|| "--template is required".to_string())?;
    let data = data.ok_or_else(|| "--data is required".to_string())?;
    if out.is_none() && !dry_run {
        return Err("--out is required unless --dry-run is given".to_string());
    }

    Ok(ParseOutcome::Args(CliArgs {
        template,
        data,
        mapping,
        config_path,
        out,
        kind,
        dry_run,
        json_logs,
    }))
}

pub fn parse_args() -> CliArgs {
    match parse_args_impl(std::env::args().skip(1)) {
        Ok(ParseOutcome::Args(args)) => args,
        Ok(ParseOutcome::Help) => {
            usage();
            std::process::exit(0);
        }
        Err(error) => {
            eprintln!("error: {error}");
            usage();
            std::process::exit(2);
        }
    }
}
