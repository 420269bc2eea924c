//! Shared helpers for docfill integration tests.
//!
//! Templates are built in memory so the tests need no binary fixtures.

#![allow(dead_code)]

use std::io::{Cursor, Read, Write};

use docfill::{CellValue, Dataset, FillConfig, FillService, Mapping};
use zip::write::SimpleFileOptions;

const W: &str = r#"xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main""#;
const SS: &str = r#"xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main""#;

/// A `<w:p>` with one run per fragment, so placeholders can be split
/// across runs the way word processors do it.
pub fn paragraph(runs: &[&str]) -> String {
    let runs: String = runs
        .iter()
        .map(|text| format!(r#"<w:r><w:rPr><w:b/></w:rPr><w:t xml:space="preserve">{}</w:t></w:r>"#, text))
        .collect();
    format!("<w:p>{}</w:p>", runs)
}

/// Builder for in-memory DOCX packages.
pub struct DocxBuilder {
    body: Vec<String>,
    header: Option<String>,
    footer: Option<String>,
}

impl DocxBuilder {
    pub fn new() -> Self {
        Self {
            body: Vec::new(),
            header: None,
            footer: None,
        }
    }

    pub fn paragraph(mut self, runs: &[&str]) -> Self {
        self.body.push(paragraph(runs));
        self
    }

    pub fn header(mut self, text: &str) -> Self {
        self.header = Some(paragraph(&[text]));
        self
    }

    pub fn footer(mut self, text: &str) -> Self {
        self.footer = Some(paragraph(&[text]));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();

        writer.start_file("[Content_Types].xml", options).unwrap();
        writer.write_all(b"<Types/>").unwrap();
        writer.start_file("word/styles.xml", options).unwrap();
        write!(writer, "<w:styles {W}/>").unwrap();
        writer.start_file("word/document.xml", options).unwrap();
        write!(
            writer,
            "<w:document {W}><w:body>{}</w:body></w:document>",
            self.body.concat()
        )
        .unwrap();
        if let Some(header) = &self.header {
            writer.start_file("word/header1.xml", options).unwrap();
            write!(writer, "<w:hdr {W}>{}</w:hdr>", header).unwrap();
        }
        if let Some(footer) = &self.footer {
            writer.start_file("word/footer1.xml", options).unwrap();
            write!(writer, "<w:ftr {W}>{}</w:ftr>", footer).unwrap();
        }

        writer.finish().unwrap().into_inner()
    }
}

/// A workbook with one sheet: shared strings in column A, one inline
/// string in column B.
pub fn xlsx(shared: &[&str], inline: &str) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();

    writer.start_file("xl/workbook.xml", options).unwrap();
    write!(writer, "<workbook {SS}/>").unwrap();

    writer.start_file("xl/sharedStrings.xml", options).unwrap();
    write!(writer, "<sst {SS}>").unwrap();
    for s in shared {
        write!(writer, "<si><t>{}</t></si>", s).unwrap();
    }
    write!(writer, "</sst>").unwrap();

    writer.start_file("xl/worksheets/sheet1.xml", options).unwrap();
    write!(writer, "<worksheet {SS}><sheetData>").unwrap();
    for i in 0..shared.len() {
        write!(writer, r#"<row r="{n}"><c r="A{n}" t="s"><v>{i}</v></c></row>"#, n = i + 1).unwrap();
    }
    write!(
        writer,
        r#"<row r="99"><c r="B99" t="inlineStr"><is><t>{}</t></is></c></row></sheetData></worksheet>"#,
        inline
    )
    .unwrap();

    writer.finish().unwrap().into_inner()
}

/// Reads one entry of a zip archive as text.
pub fn zip_entry(bytes: &[u8], name: &str) -> String {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut file = archive.by_name(name).unwrap();
    let mut out = String::new();
    file.read_to_string(&mut out).unwrap();
    out
}

/// Entry names of a zip archive in archive order.
pub fn zip_names(bytes: &[u8]) -> Vec<String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

pub fn mapping(pairs: &[(&str, &str)]) -> Mapping {
    pairs.iter().copied().collect()
}

/// Dataset from positional records; `None` leaves the cell absent.
pub fn dataset(columns: &[&str], records: Vec<Vec<Option<CellValue>>>) -> Dataset {
    let columns = strings(columns);
    let rows = records
        .into_iter()
        .map(|record| {
            columns
                .iter()
                .cloned()
                .zip(record)
                .filter_map(|(column, value)| value.map(|value| (column, value)))
                .collect()
        })
        .collect();
    Dataset::new(columns, rows).unwrap()
}

/// In-memory service with a small, deterministic pool.
pub fn service() -> FillService {
    FillService::from_config(FillConfig {
        worker_count: 4,
        ..FillConfig::default()
    })
    .unwrap()
}
