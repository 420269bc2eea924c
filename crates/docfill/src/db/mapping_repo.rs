//! Mapping repository: confirmed mappings in the `mappings` table.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Row};

use super::{Database, DatabaseError};
use crate::error::RepositoryError;
use crate::repository::{MappingRecord, MappingRepository};

#[derive(Debug, Clone)]
pub struct MappingRow {
    pub id: String,
    pub template_id: String,
    pub mapping: String,
    pub created_at: String,
}

impl MappingRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            template_id: row.get("template_id")?,
            mapping: row.get("mapping")?,
            created_at: row.get("created_at")?,
        })
    }
}

pub fn insert(db: &Database, row: &MappingRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO mappings (id, template_id, mapping, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![row.id, row.template_id, row.mapping, row.created_at],
        )?;
        Ok(())
    })
}

/// Replaces the template and mapping of a record; returns rows changed.
pub fn update(db: &Database, row: &MappingRow) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        Ok(conn.execute(
            "UPDATE mappings SET template_id = ?2, mapping = ?3 WHERE id = ?1",
            params![row.id, row.template_id, row.mapping],
        )?)
    })
}

pub fn find_by_id(db: &Database, id: &str) -> Result<Option<MappingRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM mappings WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], MappingRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Mappings saved for a template, newest first.
pub fn find_by_template(db: &Database, template_id: &str) -> Result<Vec<MappingRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM mappings WHERE template_id = ?1 ORDER BY created_at DESC",
        )?;
        let rows = stmt
            .query_map(params![template_id], MappingRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

fn record_to_row(record: &MappingRecord) -> Result<MappingRow, RepositoryError> {
    Ok(MappingRow {
        id: record.id.clone(),
        template_id: record.template_id.clone(),
        mapping: serde_json::to_string(&record.mapping)?,
        created_at: record.created_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
    })
}

fn row_to_record(row: MappingRow) -> Result<MappingRecord, RepositoryError> {
    let created_at = DateTime::parse_from_rfc3339(&row.created_at)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Corrupt {
            id: row.id.clone(),
            reason: format!("invalid timestamp '{}': {}", row.created_at, e),
        })?;

    Ok(MappingRecord {
        mapping: serde_json::from_str(&row.mapping)?,
        id: row.id,
        template_id: row.template_id,
        created_at,
    })
}

#[derive(Clone)]
pub struct SqliteMappingRepository {
    db: Database,
}

impl SqliteMappingRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn for_template(&self, template_id: &str) -> Result<Vec<MappingRecord>, RepositoryError> {
        find_by_template(&self.db, template_id)?
            .into_iter()
            .map(row_to_record)
            .collect()
    }
}

impl MappingRepository for SqliteMappingRepository {
    fn save(&self, record: &MappingRecord) -> Result<(), RepositoryError> {
        if find_by_id(&self.db, &record.id)?.is_some() {
            return Err(RepositoryError::AlreadyExists(record.id.clone()));
        }
        insert(&self.db, &record_to_row(record)?)?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<MappingRecord, RepositoryError> {
        let row = find_by_id(&self.db, id)?.ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        row_to_record(row)
    }

    fn update(&self, record: &MappingRecord) -> Result<(), RepositoryError> {
        if update(&self.db, &record_to_row(record)?)? == 0 {
            return Err(RepositoryError::NotFound(record.id.clone()));
        }
        Ok(())
    }
}
