//! Import pipeline for bulk initiative exports.
//!
//! Municipal offices deliver initiative listings as JSON files dropped into
//! an import directory (`iniziative_*.json`). Files are scanned, records
//! deduplicated and inserted into the database; re-importing the same file
//! is a no-op.

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::db;
use crate::types::Initiative;

/// One record as it appears in an export file. Only `title` is required;
/// everything else defaults to empty.
#[derive(Debug, Deserialize)]
pub struct ImportRecord {
    pub title: String,
    #[serde(default)]
    pub organization: String,
    #[serde(default)]
    pub location: String,
    #[serde(rename = "type", default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub end_date: Option<String>,
}

/// Outcome of an import scan
#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct ImportStats {
    pub files: usize,
    pub inserted: usize,
    pub skipped: usize,
}

impl ImportRecord {
    /// Convert into a database record with a derived source id, so the same
    /// listing is recognized across import batches
    fn into_initiative(self) -> Initiative {
        let source_id =
            Initiative::generate_source_id(&self.title, &self.organization, &self.date);
        let now = Utc::now().to_rfc3339();
        Initiative {
            id: source_id.replace("src_", "imp_"),
            source_id: Some(source_id),
            title: self.title,
            organization: self.organization,
            location: self.location,
            category: self.category,
            description: self.description,
            date: self.date,
            end_date: self.end_date,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// Scan the import directory and load every export file into the database.
/// Malformed files are logged and skipped.
pub fn process_all_imports(conn: &Connection, import_dir: &Path) -> Result<ImportStats> {
    let files = find_all_imports(import_dir)?;

    let mut records: Vec<ImportRecord> = Vec::new();
    let mut stats = ImportStats::default();

    for file in &files {
        debug!(file = %file.display(), "Processing import file");
        match load_import_file(file) {
            Ok(file_records) => {
                debug!(count = file_records.len(), "Found records");
                records.extend(file_records);
                stats.files += 1;
            }
            Err(e) => {
                warn!(file = %file.display(), error = %e, "Failed to parse import file");
            }
        }
    }

    for initiative in deduplicate(records) {
        if db::insert_if_not_exists(conn, &initiative)? {
            stats.inserted += 1;
        } else {
            stats.skipped += 1;
        }
    }

    if stats.files > 0 {
        info!(
            files = stats.files,
            inserted = stats.inserted,
            skipped = stats.skipped,
            "Import complete"
        );
    }

    Ok(stats)
}

/// Import a single export file
pub fn import_file(conn: &Connection, path: &Path) -> Result<ImportStats> {
    let records = load_import_file(path)?;
    let mut stats = ImportStats {
        files: 1,
        ..Default::default()
    };

    for initiative in deduplicate(records) {
        if db::insert_if_not_exists(conn, &initiative)? {
            stats.inserted += 1;
        } else {
            stats.skipped += 1;
        }
    }

    Ok(stats)
}

/// Find all export files in the import directory, sorted by name
pub fn find_all_imports(import_dir: &Path) -> Result<Vec<PathBuf>> {
    if !import_dir.exists() {
        return Ok(Vec::new());
    }

    let mut files: Vec<_> = std::fs::read_dir(import_dir)?
        .filter_map(|e| e.ok())
        .filter(|e| is_import_file(&e.path()))
        .map(|e| e.path())
        .collect();

    files.sort();
    Ok(files)
}

/// Whether a path looks like an export drop (`iniziative_*.json`)
pub fn is_import_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with("iniziative_") && n.ends_with(".json"))
        .unwrap_or(false)
}

fn load_import_file(path: &Path) -> Result<Vec<ImportRecord>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read import file: {}", path.display()))?;
    let records: Vec<ImportRecord> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse import file: {}", path.display()))?;
    Ok(records)
}

/// Drop duplicate records within a batch, keeping the first occurrence
fn deduplicate(records: Vec<ImportRecord>) -> Vec<Initiative> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut result: Vec<Initiative> = Vec::new();

    for record in records {
        let initiative = record.into_initiative();
        if seen.insert(initiative.dedup_key()) {
            result.push(initiative);
        }
    }

    result
}
