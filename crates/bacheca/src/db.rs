//! SQLite storage for initiative records.
//!
//! Handles database initialization, embedded schema migrations and CRUD on
//! the `iniziative` table. The directory listing is small (hundreds of
//! records), so every read loads full rows; filtering happens in memory.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use tracing::{debug, info};

use crate::types::Initiative;

/// Migrations compiled into the binary, applied in order
const MIGRATIONS: &[(&str, &str)] = &[(
    "001_initial_schema",
    include_str!("../db/migrations/001_initial_schema.sql"),
)];

/// Open the database at the given path and bring the schema up to date
pub fn init_db(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;

    conn.execute_batch("PRAGMA foreign_keys = ON;")?;

    let count = run_migrations(&conn)?;
    if count > 0 {
        info!(count = count, "Applied migrations");
    }

    Ok(conn)
}

/// Apply any migrations not yet recorded in `schema_migrations`.
/// Returns the number applied.
pub fn run_migrations(conn: &Connection) -> Result<usize> {
    let mut applied = 0;

    for (version, sql) in MIGRATIONS {
        let already_applied: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM schema_migrations WHERE version = ?1",
                [version],
                |row| row.get(0),
            )
            .unwrap_or(false);

        if already_applied {
            continue;
        }

        conn.execute_batch(sql)
            .with_context(|| format!("Failed to apply migration: {}", version))?;

        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, datetime('now'))",
            [version],
        )?;

        debug!(version = %version, "Applied migration");
        applied += 1;
    }

    Ok(applied)
}

const SELECT_COLUMNS: &str = "id, source_id, title, organization, location, category, \
     description, date, end_date, created_at, updated_at";

fn row_to_initiative(row: &Row) -> rusqlite::Result<Initiative> {
    Ok(Initiative {
        id: row.get(0)?,
        source_id: row.get(1)?,
        title: row.get(2)?,
        organization: row.get(3)?,
        location: row.get(4)?,
        category: row.get(5)?,
        description: row.get(6)?,
        date: row.get(7)?,
        end_date: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

/// Get all initiatives, ordered by creation time.
/// The calendar matcher preserves this order in its results.
pub fn list_initiatives(conn: &Connection) -> Result<Vec<Initiative>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM iniziative ORDER BY created_at ASC, id ASC",
        SELECT_COLUMNS
    ))?;

    let initiatives = stmt
        .query_map([], row_to_initiative)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(initiatives)
}

/// Get a single initiative by id
pub fn get_initiative(conn: &Connection, id: &str) -> Result<Option<Initiative>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM iniziative WHERE id = ?1",
        SELECT_COLUMNS
    ))?;

    let initiative = stmt.query_row([id], row_to_initiative).optional()?;
    Ok(initiative)
}

/// Insert a new initiative
pub fn insert_initiative(conn: &Connection, initiative: &Initiative) -> Result<()> {
    conn.execute(
        "INSERT INTO iniziative (id, source_id, title, organization, location, category, \
         description, date, end_date, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            initiative.id,
            initiative.source_id,
            initiative.title,
            initiative.organization,
            initiative.location,
            initiative.category,
            initiative.description,
            initiative.date,
            initiative.end_date,
            initiative.created_at,
            initiative.updated_at,
        ],
    )?;
    Ok(())
}

/// Insert an initiative only if no record with the same source_id exists.
/// Imported records keep their identity across re-imports even after staff
/// edit other fields.
pub fn insert_if_not_exists(conn: &Connection, initiative: &Initiative) -> Result<bool> {
    if let Some(ref source_id) = initiative.source_id {
        let exists: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM iniziative WHERE source_id = ?1",
            [source_id],
            |row| row.get(0),
        )?;
        if exists {
            return Ok(false);
        }
    }

    insert_initiative(conn, initiative)?;
    Ok(true)
}

/// Helper struct for partial updates. Fields left `None` are untouched.
#[derive(Debug, Default)]
pub struct InitiativeUpdate {
    pub title: Option<String>,
    pub organization: Option<String>,
    pub location: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub date: Option<String>,
    pub end_date: Option<String>,
}

/// Update an existing initiative. Returns false when the id is unknown.
pub fn update_initiative(conn: &Connection, id: &str, updates: &InitiativeUpdate) -> Result<bool> {
    let mut set_clauses = vec!["updated_at = datetime('now')"];
    let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(ref title) = updates.title {
        set_clauses.push("title = ?");
        params_vec.push(Box::new(title.clone()));
    }
    if let Some(ref organization) = updates.organization {
        set_clauses.push("organization = ?");
        params_vec.push(Box::new(organization.clone()));
    }
    if let Some(ref location) = updates.location {
        set_clauses.push("location = ?");
        params_vec.push(Box::new(location.clone()));
    }
    if let Some(ref category) = updates.category {
        set_clauses.push("category = ?");
        params_vec.push(Box::new(category.clone()));
    }
    if let Some(ref description) = updates.description {
        set_clauses.push("description = ?");
        params_vec.push(Box::new(description.clone()));
    }
    if let Some(ref date) = updates.date {
        set_clauses.push("date = ?");
        params_vec.push(Box::new(date.clone()));
    }
    if let Some(ref end_date) = updates.end_date {
        set_clauses.push("end_date = ?");
        params_vec.push(Box::new(end_date.clone()));
    }

    params_vec.push(Box::new(id.to_string()));

    let sql = format!(
        "UPDATE iniziative SET {} WHERE id = ?",
        set_clauses.join(", ")
    );

    let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
    let affected = conn.execute(&sql, params_refs.as_slice())?;
    Ok(affected > 0)
}

/// Delete an initiative by id. Returns false when the id is unknown.
pub fn delete_initiative(conn: &Connection, id: &str) -> Result<bool> {
    let affected = conn.execute("DELETE FROM iniziative WHERE id = ?1", [id])?;
    Ok(affected > 0)
}

/// Count all initiatives in the database
pub fn count_initiatives(conn: &Connection) -> Result<usize> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM iniziative", [], |row| row.get(0))?;
    Ok(count as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_test_db() -> (TempDir, Connection) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let conn = init_db(&db_path).unwrap();
        (temp_dir, conn)
    }

    fn make_initiative(title: &str, date: &str) -> Initiative {
        Initiative::new(
            title.to_string(),
            "CPIA Centro Levante".to_string(),
            "Genova".to_string(),
            "corso".to_string(),
            "Sostegno allo studio".to_string(),
            date.to_string(),
            None,
        )
    }

    // ========== init / migrations ==========

    #[test]
    fn test_init_db_creates_schema() {
        let (_dir, conn) = setup_test_db();
        assert_eq!(count_initiatives(&conn).unwrap(), 0);
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let (_dir, conn) = setup_test_db();
        // First run happened in init_db; a second run applies nothing
        assert_eq!(run_migrations(&conn).unwrap(), 0);
    }

    #[test]
    fn test_reopening_db_keeps_data() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        {
            let conn = init_db(&db_path).unwrap();
            insert_initiative(&conn, &make_initiative("Doposcuola", "Settembre 2024")).unwrap();
        }

        let conn = init_db(&db_path).unwrap();
        assert_eq!(count_initiatives(&conn).unwrap(), 1);
    }

    // ========== insert / get ==========

    #[test]
    fn test_insert_and_get() {
        let (_dir, conn) = setup_test_db();
        let initiative = make_initiative("Doposcuola", "Settembre 2024");

        insert_initiative(&conn, &initiative).unwrap();

        let loaded = get_initiative(&conn, &initiative.id).unwrap().unwrap();
        assert_eq!(loaded, initiative);
    }

    #[test]
    fn test_get_unknown_id() {
        let (_dir, conn) = setup_test_db();
        assert!(get_initiative(&conn, "missing").unwrap().is_none());
    }

    #[test]
    fn test_insert_preserves_end_date() {
        let (_dir, conn) = setup_test_db();
        let mut initiative = make_initiative("Doposcuola", "Settembre 2024");
        initiative.end_date = Some("2024-12-31T23:59:59+01:00".to_string());

        insert_initiative(&conn, &initiative).unwrap();

        let loaded = get_initiative(&conn, &initiative.id).unwrap().unwrap();
        assert_eq!(
            loaded.end_date.as_deref(),
            Some("2024-12-31T23:59:59+01:00")
        );
    }

    // ========== insert_if_not_exists ==========

    #[test]
    fn test_insert_if_not_exists_skips_duplicate_source() {
        let (_dir, conn) = setup_test_db();

        let mut first = make_initiative("Doposcuola", "Settembre 2024");
        first.source_id = Some("src_abc".to_string());
        let mut second = make_initiative("Doposcuola aggiornato", "Ottobre 2024");
        second.source_id = Some("src_abc".to_string());

        assert!(insert_if_not_exists(&conn, &first).unwrap());
        assert!(!insert_if_not_exists(&conn, &second).unwrap());
        assert_eq!(count_initiatives(&conn).unwrap(), 1);
    }

    #[test]
    fn test_insert_if_not_exists_without_source_id_always_inserts() {
        let (_dir, conn) = setup_test_db();

        assert!(insert_if_not_exists(&conn, &make_initiative("A", "Settembre 2024")).unwrap());
        assert!(insert_if_not_exists(&conn, &make_initiative("B", "Settembre 2024")).unwrap());
        assert_eq!(count_initiatives(&conn).unwrap(), 2);
    }

    // ========== list ==========

    #[test]
    fn test_list_ordered_by_creation() {
        let (_dir, conn) = setup_test_db();

        let mut first = make_initiative("Primo", "Settembre 2024");
        first.created_at = "2024-01-01T10:00:00+00:00".to_string();
        let mut second = make_initiative("Secondo", "Ottobre 2024");
        second.created_at = "2024-01-02T10:00:00+00:00".to_string();

        // Insert out of order
        insert_initiative(&conn, &second).unwrap();
        insert_initiative(&conn, &first).unwrap();

        let all = list_initiatives(&conn).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].title, "Primo");
        assert_eq!(all[1].title, "Secondo");
    }

    // ========== update ==========

    #[test]
    fn test_update_single_field() {
        let (_dir, conn) = setup_test_db();
        let initiative = make_initiative("Doposcuola", "Settembre 2024");
        insert_initiative(&conn, &initiative).unwrap();

        let updates = InitiativeUpdate {
            date: Some("Ottobre 2024".to_string()),
            ..Default::default()
        };
        assert!(update_initiative(&conn, &initiative.id, &updates).unwrap());

        let loaded = get_initiative(&conn, &initiative.id).unwrap().unwrap();
        assert_eq!(loaded.date, "Ottobre 2024");
        assert_eq!(loaded.title, "Doposcuola");
    }

    #[test]
    fn test_update_multiple_fields() {
        let (_dir, conn) = setup_test_db();
        let initiative = make_initiative("Doposcuola", "Settembre 2024");
        insert_initiative(&conn, &initiative).unwrap();

        let updates = InitiativeUpdate {
            title: Some("Doposcuola pomeridiano".to_string()),
            location: Some("Sampierdarena".to_string()),
            end_date: Some("2025-06-30T00:00:00+02:00".to_string()),
            ..Default::default()
        };
        assert!(update_initiative(&conn, &initiative.id, &updates).unwrap());

        let loaded = get_initiative(&conn, &initiative.id).unwrap().unwrap();
        assert_eq!(loaded.title, "Doposcuola pomeridiano");
        assert_eq!(loaded.location, "Sampierdarena");
        assert_eq!(loaded.end_date.as_deref(), Some("2025-06-30T00:00:00+02:00"));
    }

    #[test]
    fn test_update_unknown_id() {
        let (_dir, conn) = setup_test_db();
        let updates = InitiativeUpdate {
            title: Some("x".to_string()),
            ..Default::default()
        };
        assert!(!update_initiative(&conn, "missing", &updates).unwrap());
    }

    #[test]
    fn test_update_touches_updated_at() {
        let (_dir, conn) = setup_test_db();
        let mut initiative = make_initiative("Doposcuola", "Settembre 2024");
        initiative.updated_at = "2020-01-01T00:00:00+00:00".to_string();
        insert_initiative(&conn, &initiative).unwrap();

        let updates = InitiativeUpdate {
            title: Some("Doposcuola 2".to_string()),
            ..Default::default()
        };
        update_initiative(&conn, &initiative.id, &updates).unwrap();

        let loaded = get_initiative(&conn, &initiative.id).unwrap().unwrap();
        assert_ne!(loaded.updated_at, "2020-01-01T00:00:00+00:00");
    }

    // ========== delete ==========

    #[test]
    fn test_delete() {
        let (_dir, conn) = setup_test_db();
        let initiative = make_initiative("Doposcuola", "Settembre 2024");
        insert_initiative(&conn, &initiative).unwrap();

        assert!(delete_initiative(&conn, &initiative.id).unwrap());
        assert!(get_initiative(&conn, &initiative.id).unwrap().is_none());
        assert_eq!(count_initiatives(&conn).unwrap(), 0);
    }

    #[test]
    fn test_delete_unknown_id() {
        let (_dir, conn) = setup_test_db();
        assert!(!delete_initiative(&conn, "missing").unwrap());
    }
}
