//! Helpers for sanitizing data before it reaches file names or tracing
//! span attributes.
//!
//! Row values can be personal data: they may become file names, but they
//! are never logged.

use std::path::Path;

/// Longest file name stem produced from row data, in characters.
pub const MAX_STEM_CHARS: usize = 100;

/// Returns only the filename component of a path (no directory).
///
/// Safe for span fields: reveals the file name without the full path.
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Turns an arbitrary value into a single safe path component.
///
/// Path separators, characters reserved on common filesystems and control
/// characters become `_`; leading and trailing dots and whitespace are
/// removed. Returns `None` when nothing usable is left.
pub fn sanitize_file_stem(value: &str) -> Option<String> {
    let replaced: String = value
        .chars()
        .map(|c| match c {
            '/' | '\\' | '<' | '>' | ':' | '"' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .take(MAX_STEM_CHARS)
        .collect();

    let trimmed = replaced.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if trimmed.is_empty() || trimmed.chars().all(|c| c == '_') {
        return None;
    }
    Some(trimmed.to_string())
}

/// Splits a file name into stem and extension (without the dot).
pub fn split_extension(filename: &str) -> (&str, Option<&str>) {
    match filename.rfind('.') {
        Some(pos) if pos > 0 => (&filename[..pos], Some(&filename[pos + 1..])),
        _ => (filename, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_path_returns_filename() {
        assert_eq!(
            redact_path(Path::new("/home/user/outputs/job/1/output.docx")),
            "output.docx"
        );
    }

    #[test]
    fn test_redact_path_no_filename() {
        assert_eq!(redact_path(Path::new("/")), "<unknown>");
    }

    #[test]
    fn test_sanitize_keeps_unicode() {
        assert_eq!(sanitize_file_stem("张三 有限公司").as_deref(), Some("张三 有限公司"));
    }

    #[test]
    fn test_sanitize_replaces_separators() {
        assert_eq!(sanitize_file_stem("../etc/passwd").as_deref(), Some("_etc_passwd"));
        assert_eq!(sanitize_file_stem("a:b*c?").as_deref(), Some("a_b_c_"));
        assert_eq!(sanitize_file_stem("tab\there").as_deref(), Some("tab_here"));
    }

    #[test]
    fn test_sanitize_rejects_empty() {
        assert_eq!(sanitize_file_stem(""), None);
        assert_eq!(sanitize_file_stem(" .. "), None);
        assert_eq!(sanitize_file_stem("///"), None);
    }

    #[test]
    fn test_sanitize_truncates() {
        let long = "x".repeat(500);
        assert_eq!(sanitize_file_stem(&long).unwrap().chars().count(), MAX_STEM_CHARS);
    }

    #[test]
    fn test_split_extension() {
        assert_eq!(split_extension("report.docx"), ("report", Some("docx")));
        assert_eq!(split_extension("archive.tar.gz"), ("archive.tar", Some("gz")));
        assert_eq!(split_extension(".hidden"), (".hidden", None));
        assert_eq!(split_extension("plain"), ("plain", None));
    }
}
