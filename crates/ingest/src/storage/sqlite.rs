//! SQLite-based document storage

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use rusqlite_migration::{M, Migrations};

use super::traits::DocumentStore;
use crate::error::StoreError;
use crate::models::Document;

/// How long a write waits on a locked database before giving up
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database migrations
///
/// Each migration is applied in order. The user_version pragma tracks which
/// migrations have been applied.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: Initial schema
        M::up(
            r#"
            -- One row per (endpoint, document id); body holds the full JSON
            CREATE TABLE documents (
                resource TEXT NOT NULL,
                id TEXT NOT NULL,
                aktualisiert TEXT NOT NULL,
                body TEXT NOT NULL,
                synced_at TEXT NOT NULL,
                PRIMARY KEY (resource, id)
            );

            CREATE INDEX idx_documents_aktualisiert
                ON documents(resource, aktualisiert DESC);
            "#,
        ),
    ])
}

/// Format a timestamp so that lexical order matches chronological order
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("Invalid timestamp in database: {}", value))?
        .with_timezone(&Utc))
}

/// SQLite-based document storage
pub struct SqliteDocumentStore {
    conn: Mutex<Connection>,
}

impl SqliteDocumentStore {
    /// Open (or create) a document store at `db_path`
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        Self::with_busy_timeout(db_path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Open a document store with a custom lock wait
    ///
    /// Writes that cannot acquire the lock within `busy_timeout` fail with
    /// "database is locked", which the sync engine treats as transient.
    pub fn with_busy_timeout(db_path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        let mut conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;

        // WAL lets readers continue while the sync writes; NORMAL sync is
        // safe with WAL.
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            "#,
        )?;
        conn.busy_timeout(busy_timeout)?;

        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl DocumentStore for SqliteDocumentStore {
    fn upsert_document(&self, resource: &str, document: &Document) -> Result<(), StoreError> {
        let body = serde_json::to_string(document)
            .map_err(|e| StoreError::permanent("serialize document", e))?;

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO documents (resource, id, aktualisiert, body, synced_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT (resource, id) DO UPDATE SET
                aktualisiert = excluded.aktualisiert,
                body = excluded.body,
                synced_at = excluded.synced_at",
            params![
                resource,
                document.id,
                format_timestamp(&document.aktualisiert),
                body,
                format_timestamp(&Utc::now()),
            ],
        )
        .map_err(|e| StoreError::from_sqlite("upsert document", &e))?;

        Ok(())
    }

    fn get_document(&self, resource: &str, id: &str) -> Result<Option<Document>> {
        let conn = self.conn.lock();

        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM documents WHERE resource = ? AND id = ?",
                params![resource, id],
                |row| row.get(0),
            )
            .optional()?;

        body.map(|body| serde_json::from_str(&body).context("Failed to parse stored document"))
            .transpose()
    }

    fn latest_updated(&self, resource: &str) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn.lock();

        let latest: Option<String> = conn.query_row(
            "SELECT MAX(aktualisiert) FROM documents WHERE resource = ?",
            [resource],
            |row| row.get(0),
        )?;

        latest.as_deref().map(parse_timestamp).transpose()
    }

    fn count_documents(&self, resource: &str) -> Result<usize> {
        let conn = self.conn.lock();

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE resource = ?",
            [resource],
            |row| row.get(0),
        )?;

        Ok(count as usize)
    }
}
