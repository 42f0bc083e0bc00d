//! Durable template store for reuse across runs.
//!
//! Descriptors are stored as JSON text. The connection sits behind a mutex,
//! so each operation runs alone and per-key ordering follows lock order.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::eviction::{EntryStats, EvictionPolicy, Unbounded};
use super::types::ExtractionTemplate;
use super::{StoreError, TemplateStore};

const MIGRATIONS: &[(i64, &str)] = &[(
    1,
    include_str!("../../../resources/migrations/001_templates.sql"),
)];

pub struct SqliteTemplateStore {
    conn: Mutex<Connection>,
    policy: Box<dyn EvictionPolicy>,
}

impl SqliteTemplateStore {
    /// Open (or create) the store at `path` and run migrations.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        tracing::debug!(path = %path.display(), "Opened template store");
        Self::from_connection(conn)
    }

    /// In-memory store (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA journal_mode=DELETE;")?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            policy: Box::new(Unbounded),
        })
    }

    pub fn with_policy(mut self, policy: Box<dyn EvictionPolicy>) -> Self {
        self.policy = policy;
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn evict(&self, conn: &Connection) -> Result<(), StoreError> {
        let mut stmt =
            conn.prepare("SELECT fingerprint, last_used, hit_count FROM templates")?;
        let stats = stmt
            .query_map([], |row| {
                Ok(EntryStats {
                    fingerprint: row.get(0)?,
                    last_used: row.get::<_, i64>(1)?.max(0) as u64,
                    hit_count: row.get::<_, i64>(2)?.max(0) as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        for victim in self.policy.select_victims(&stats) {
            delete_template(conn, &victim)?;
            tracing::debug!(fingerprint = %victim, "Evicted template");
        }
        Ok(())
    }
}

fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    let current: i64 = conn
        .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
            row.get::<_, Option<i64>>(0)
        })
        .ok()
        .flatten()
        .unwrap_or(0);

    for (version, sql) in MIGRATIONS {
        if *version > current {
            tracing::info!("Running template store migration v{version}");
            conn.execute_batch(sql)?;
        }
    }
    Ok(())
}

fn delete_template(conn: &Connection, fingerprint: &str) -> Result<usize, StoreError> {
    conn.execute(
        "DELETE FROM template_aliases WHERE fingerprint = ?1",
        params![fingerprint],
    )?;
    Ok(conn.execute(
        "DELETE FROM templates WHERE fingerprint = ?1",
        params![fingerprint],
    )?)
}

struct TemplateRow {
    fingerprint: String,
    descriptor: String,
    rendered_prompt_body: String,
    schema_version: String,
    created_at: String,
    hit_count: i64,
}

impl TemplateRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            fingerprint: row.get(0)?,
            descriptor: row.get(1)?,
            rendered_prompt_body: row.get(2)?,
            schema_version: row.get(3)?,
            created_at: row.get(4)?,
            hit_count: row.get(5)?,
        })
    }

    fn into_template(self) -> Result<ExtractionTemplate, StoreError> {
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| StoreError::Corrupt(format!("created_at '{}': {e}", self.created_at)))?
            .with_timezone(&Utc);
        Ok(ExtractionTemplate {
            fingerprint: self.fingerprint,
            descriptor: serde_json::from_str(&self.descriptor)?,
            rendered_prompt_body: self.rendered_prompt_body,
            schema_version: self.schema_version,
            created_at,
            hit_count: self.hit_count.max(0) as u64,
        })
    }
}

const SELECT_TEMPLATE: &str = "SELECT fingerprint, descriptor, rendered_prompt_body, \
     schema_version, created_at, hit_count FROM templates";

impl TemplateStore for SqliteTemplateStore {
    fn lookup(&self, fingerprint: &str) -> Result<Option<ExtractionTemplate>, StoreError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!("{SELECT_TEMPLATE} WHERE fingerprint = ?1"),
                params![fingerprint],
                TemplateRow::from_row,
            )
            .optional()?;
        row.map(TemplateRow::into_template).transpose()
    }

    fn put(&self, fingerprint: &str, template: ExtractionTemplate) -> Result<(), StoreError> {
        let descriptor = serde_json::to_string(&template.descriptor)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO templates
             (fingerprint, descriptor, rendered_prompt_body, schema_version, created_at,
              hit_count, last_used)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6,
                     (SELECT COALESCE(MAX(last_used), 0) + 1 FROM templates))",
            params![
                fingerprint,
                descriptor,
                template.rendered_prompt_body,
                template.schema_version,
                template.created_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
                template.hit_count as i64,
            ],
        )?;
        self.evict(&conn)
    }

    fn record_hit(&self, fingerprint: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE templates
             SET hit_count = hit_count + 1,
                 last_used = (SELECT COALESCE(MAX(last_used), 0) + 1 FROM templates)
             WHERE fingerprint = ?1",
            params![fingerprint],
        )?;
        Ok(())
    }

    fn link_alias(&self, alias: &str, fingerprint: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO template_aliases (alias, fingerprint) VALUES (?1, ?2)",
            params![alias, fingerprint],
        )?;
        Ok(())
    }

    fn resolve_alias(&self, alias: &str) -> Result<Option<String>, StoreError> {
        let conn = self.lock()?;
        Ok(conn
            .query_row(
                "SELECT fingerprint FROM template_aliases WHERE alias = ?1",
                params![alias],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn remove(&self, fingerprint: &str) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        Ok(delete_template(&conn, fingerprint)? > 0)
    }

    fn len(&self) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM templates", [], |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }

    fn entries(&self) -> Result<Vec<ExtractionTemplate>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!("{SELECT_TEMPLATE} ORDER BY fingerprint ASC"))?;
        let rows = stmt
            .query_map([], TemplateRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(TemplateRow::into_template).collect()
    }

    fn clear(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute_batch("DELETE FROM template_aliases; DELETE FROM templates;")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::templates::eviction::LruCapacity;
    use crate::pipeline::templates::types::sample_template;
    use std::sync::Arc;

    #[test]
    fn put_lookup_round_trip() {
        let store = SqliteTemplateStore::open_in_memory().unwrap();
        let t = sample_template("State College", &["Course", "Credits", "Grade"]);
        let fp = t.fingerprint.clone();
        store.put(&fp, t.clone()).unwrap();

        let back = store.lookup(&fp).unwrap().unwrap();
        assert_eq!(back, t);
        assert!(store.lookup("unknown").unwrap().is_none());
    }

    #[test]
    fn put_is_last_write_wins() {
        let store = SqliteTemplateStore::open_in_memory().unwrap();
        let first = sample_template("State College", &["Course"]);
        let fp = first.fingerprint.clone();
        let mut second = first.clone();
        second.rendered_prompt_body = "second".into();
        store.put(&fp, first).unwrap();
        store.put(&fp, second).unwrap();
        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(store.lookup(&fp).unwrap().unwrap().rendered_prompt_body, "second");
    }

    #[test]
    fn hits_and_aliases() {
        let store = SqliteTemplateStore::open_in_memory().unwrap();
        let t = sample_template("State College", &["Course"]);
        let fp = t.fingerprint.clone();
        store.put(&fp, t).unwrap();
        store.record_hit(&fp).unwrap();
        assert_eq!(store.lookup(&fp).unwrap().unwrap().hit_count, 1);

        store.link_alias("alias", &fp).unwrap();
        assert_eq!(store.resolve_alias("alias").unwrap(), Some(fp.clone()));
        store.link_alias("alias", "other").unwrap();
        assert_eq!(store.resolve_alias("alias").unwrap().as_deref(), Some("other"));
        assert!(store.resolve_alias("nope").unwrap().is_none());
    }

    #[test]
    fn remove_drops_aliases() {
        let store = SqliteTemplateStore::open_in_memory().unwrap();
        let t = sample_template("State College", &["Course"]);
        let fp = t.fingerprint.clone();
        store.put(&fp, t).unwrap();
        store.link_alias("alias", &fp).unwrap();
        assert!(store.remove(&fp).unwrap());
        assert!(store.resolve_alias("alias").unwrap().is_none());
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("templates.db");
        let t = sample_template("State College", &["Course"]);
        let fp = t.fingerprint.clone();
        {
            let store = SqliteTemplateStore::open(&path).unwrap();
            store.put(&fp, t.clone()).unwrap();
            store.link_alias("alias", &fp).unwrap();
        }
        let store = SqliteTemplateStore::open(&path).unwrap();
        assert_eq!(store.lookup(&fp).unwrap(), Some(t));
        assert_eq!(store.resolve_alias("alias").unwrap(), Some(fp));
    }

    #[test]
    fn lru_capacity_applies() {
        let store = SqliteTemplateStore::open_in_memory()
            .unwrap()
            .with_policy(Box::new(LruCapacity::new(1)));
        let a = sample_template("A", &[]);
        let b = sample_template("B", &[]);
        store.put(&a.fingerprint, a.clone()).unwrap();
        store.put(&b.fingerprint, b.clone()).unwrap();
        assert_eq!(store.len().unwrap(), 1);
        assert!(store.lookup(&b.fingerprint).unwrap().is_some());
    }

    #[test]
    fn entries_and_clear() {
        let store = SqliteTemplateStore::open_in_memory().unwrap();
        for name in ["Zeta", "Alpha"] {
            let t = sample_template(name, &[]);
            store.put(&t.fingerprint.clone(), t).unwrap();
        }
        let entries = store.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].fingerprint < entries[1].fingerprint);
        store.clear().unwrap();
        assert_eq!(store.len().unwrap(), 0);
    }

    #[test]
    fn concurrent_access_from_threads() {
        let store = Arc::new(SqliteTemplateStore::open_in_memory().unwrap());
        let handles: Vec<_> = (0..6)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let t = sample_template(&format!("University {}", i % 3), &["Course"]);
                    let fp = t.fingerprint.clone();
                    store.put(&fp, t).unwrap();
                    store.record_hit(&fp).unwrap();
                    assert!(store.lookup(&fp).unwrap().is_some());
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.len().unwrap(), 3);
    }
}
