//! Reading and rewriting OOXML zip packages.
//!
//! Only the selected text parts are touched; every other entry is copied
//! unchanged with its original compression method.

use std::collections::HashMap;
use std::io::{Cursor, Read, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use crate::processor::ooxml;
use crate::template::placeholder::PlaceholderSet;

struct Entry {
    name: String,
    compression: CompressionMethod,
    is_dir: bool,
    data: Vec<u8>,
}

/// An opened OOXML package held in memory.
pub struct Package {
    entries: Vec<Entry>,
}

impl Package {
    pub fn open(bytes: &[u8]) -> Result<Self, String> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| format!("Failed to open package: {}", e))?;

        let mut entries = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let mut file = archive
                .by_index(index)
                .map_err(|e| format!("Failed to read package entry {}: {}", index, e))?;

            let mut data = Vec::new();
            if !file.is_dir() {
                file.read_to_end(&mut data)
                    .map_err(|e| format!("Failed to read '{}': {}", file.name(), e))?;
            }

            entries.push(Entry {
                name: file.name().to_string(),
                compression: file.compression(),
                is_dir: file.is_dir(),
                data,
            });
        }

        Ok(Self { entries })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    /// Names of the parts selected by `is_text_part`, ordered by `rank`
    /// and then by name.
    pub fn text_parts<F, K>(&self, is_text_part: F, rank: K) -> Vec<String>
    where
        F: Fn(&str) -> bool,
        K: Fn(&str) -> u8,
    {
        let mut names: Vec<String> = self
            .entries
            .iter()
            .filter(|e| !e.is_dir && is_text_part(&e.name))
            .map(|e| e.name.clone())
            .collect();
        names.sort_by(|a, b| rank(a).cmp(&rank(b)).then_with(|| a.cmp(b)));
        names
    }

    fn part_str(&self, name: &str) -> Result<&str, String> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| format!("Missing part '{}'", name))?;
        std::str::from_utf8(&entry.data).map_err(|e| format!("Part '{}' is not UTF-8: {}", name, e))
    }

    /// Collects the placeholders of the given parts, in part order.
    pub fn collect_placeholders(&self, parts: &[String]) -> Result<Vec<String>, String> {
        let mut set = PlaceholderSet::new();
        for part in parts {
            let xml = self.part_str(part)?;
            ooxml::collect_placeholders(xml, &mut set)
                .map_err(|e| format!("Failed to parse '{}': {}", part, e))?;
        }
        Ok(set.into_vec())
    }

    /// Substitutes placeholders in the given parts.
    pub fn substitute(
        &mut self,
        parts: &[String],
        values: &HashMap<String, String>,
    ) -> Result<(), String> {
        for part in parts {
            let replaced = ooxml::substitute(self.part_str(part)?, values)
                .map_err(|e| format!("Failed to parse '{}': {}", part, e))?;

            if let Some(xml) = replaced {
                if let Some(entry) = self.entries.iter_mut().find(|e| &e.name == part) {
                    entry.data = xml.into_bytes();
                }
            }
        }
        Ok(())
    }

    /// Serializes the package, keeping the entry order.
    pub fn to_bytes(&self) -> Result<Vec<u8>, String> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

        for entry in &self.entries {
            let options = SimpleFileOptions::default()
                .compression_method(entry.compression)
                .last_modified_time(DateTime::default());

            if entry.is_dir {
                writer
                    .add_directory(entry.name.as_str(), options)
                    .map_err(|e| format!("Failed to write '{}': {}", entry.name, e))?;
                continue;
            }

            writer
                .start_file(entry.name.as_str(), options)
                .map_err(|e| format!("Failed to write '{}': {}", entry.name, e))?;
            writer
                .write_all(&entry.data)
                .map_err(|e| format!("Failed to write '{}': {}", entry.name, e))?;
        }

        let cursor = writer
            .finish()
            .map_err(|e| format!("Failed to finish package: {}", e))?;
        Ok(cursor.into_inner())
    }
}
