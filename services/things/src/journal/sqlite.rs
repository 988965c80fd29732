//! SQLite-backed journal.
//!
//! A single database file holds the event log and the latest snapshot per
//! thing. Blocking SQLite calls run on the blocking thread pool.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use tracing::debug;
use twin_events::{JournalEntry, Snapshot};
use twin_id::{EntityId, Revision};

use super::{check_append, Journal, JournalError};

impl From<rusqlite::Error> for JournalError {
    fn from(err: rusqlite::Error) -> Self {
        JournalError::Unavailable(err.to_string())
    }
}

/// Journal stored in a SQLite database.
#[derive(Clone)]
pub struct SqliteJournal {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteJournal {
    /// Open or create a journal at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, JournalError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::with_connection(conn)
    }

    /// Open an in-memory journal (for testing).
    pub fn open_in_memory() -> Result<Self, JournalError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, JournalError> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `f` with the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, JournalError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, JournalError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut conn)
        })
        .await
        .map_err(|e| JournalError::Unavailable(format!("journal task failed: {e}")))?
    }
}

fn init_schema(conn: &Connection) -> Result<(), JournalError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS journal (
            entity_id TEXT NOT NULL,
            namespace TEXT NOT NULL,
            revision INTEGER NOT NULL,
            event_type TEXT NOT NULL,
            occurred_at TEXT NOT NULL,
            correlation_id TEXT NOT NULL,
            payload TEXT NOT NULL,
            PRIMARY KEY (entity_id, revision)
        );

        CREATE INDEX IF NOT EXISTS idx_journal_namespace ON journal(namespace);

        CREATE TABLE IF NOT EXISTS snapshots (
            entity_id TEXT PRIMARY KEY,
            namespace TEXT NOT NULL,
            revision INTEGER NOT NULL,
            taken_at TEXT NOT NULL,
            state TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_snapshots_namespace ON snapshots(namespace);
        "#,
    )?;

    debug!("Journal schema initialized");
    Ok(())
}

fn to_sql_revision(revision: Revision) -> Result<i64, JournalError> {
    i64::try_from(revision.value())
        .map_err(|_| JournalError::Serialization(format!("revision {revision} out of range")))
}

fn from_sql_revision(value: i64) -> Result<Revision, JournalError> {
    u64::try_from(value)
        .map(Revision::new)
        .map_err(|_| JournalError::Serialization(format!("negative revision {value}")))
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

struct EntryRow {
    entity_id: String,
    revision: i64,
    event_type: String,
    occurred_at: String,
    correlation_id: String,
    payload: String,
}

impl EntryRow {
    fn into_entry(self) -> Result<JournalEntry, JournalError> {
        let entity_id = EntityId::parse(&self.entity_id)
            .map_err(|e| JournalError::Serialization(e.to_string()))?;
        let occurred_at = DateTime::parse_from_rfc3339(&self.occurred_at)
            .map_err(|e| JournalError::Serialization(e.to_string()))?
            .with_timezone(&Utc);
        Ok(JournalEntry {
            entity_id,
            revision: from_sql_revision(self.revision)?,
            event_type: self.event_type,
            occurred_at,
            correlation_id: self.correlation_id,
            payload: serde_json::from_str(&self.payload)?,
        })
    }
}

#[async_trait]
impl Journal for SqliteJournal {
    async fn append(
        &self,
        entry: JournalEntry,
        expected_prior: Revision,
    ) -> Result<Revision, JournalError> {
        self.with_conn(move |conn| {
            let entity_id = entry.entity_id.to_string();
            let payload = serde_json::to_string(&entry.payload)?;
            let revision = to_sql_revision(entry.revision)?;

            let tx = conn.transaction()?;
            let current: i64 = tx.query_row(
                "SELECT COALESCE(MAX(revision), 0) FROM journal WHERE entity_id = ?1",
                params![entity_id],
                |row| row.get(0),
            )?;
            check_append(&entry, expected_prior, from_sql_revision(current)?)?;

            tx.execute(
                r#"
                INSERT INTO journal (
                    entity_id, namespace, revision, event_type,
                    occurred_at, correlation_id, payload
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    entity_id,
                    entry.entity_id.namespace(),
                    revision,
                    entry.event_type,
                    entry.occurred_at.to_rfc3339(),
                    entry.correlation_id,
                    payload,
                ],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    return JournalError::Conflict {
                        entity_id: entity_id.clone(),
                        expected: expected_prior.value(),
                        actual: entry.revision.value(),
                    };
                }
                JournalError::from(e)
            })?;
            tx.commit()?;

            Ok(entry.revision)
        })
        .await
    }

    async fn load_events(
        &self,
        entity_id: &EntityId,
        after: Revision,
    ) -> Result<Vec<JournalEntry>, JournalError> {
        let entity_id = entity_id.to_string();
        let after = to_sql_revision(after)?;
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                r#"
                SELECT entity_id, revision, event_type, occurred_at, correlation_id, payload
                FROM journal
                WHERE entity_id = ?1 AND revision > ?2
                ORDER BY revision ASC
                "#,
            )?;
            let rows = stmt.query_map(params![entity_id, after], |row| {
                Ok(EntryRow {
                    entity_id: row.get(0)?,
                    revision: row.get(1)?,
                    event_type: row.get(2)?,
                    occurred_at: row.get(3)?,
                    correlation_id: row.get(4)?,
                    payload: row.get(5)?,
                })
            })?;

            let mut entries = Vec::new();
            for row in rows {
                entries.push(row?.into_entry()?);
            }
            Ok(entries)
        })
        .await
    }

    async fn load_latest_snapshot(
        &self,
        entity_id: &EntityId,
    ) -> Result<Option<Snapshot>, JournalError> {
        let entity_id = entity_id.to_string();
        self.with_conn(move |conn| {
            let state: Option<String> = conn
                .query_row(
                    "SELECT state FROM snapshots WHERE entity_id = ?1",
                    params![entity_id],
                    |row| row.get(0),
                )
                .optional()?;
            state
                .map(|s| serde_json::from_str(&s).map_err(JournalError::from))
                .transpose()
        })
        .await
    }

    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<(), JournalError> {
        self.with_conn(move |conn| {
            let state = serde_json::to_string(&snapshot)?;
            conn.execute(
                r#"
                INSERT INTO snapshots (entity_id, namespace, revision, taken_at, state)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(entity_id) DO UPDATE SET
                    revision = excluded.revision,
                    taken_at = excluded.taken_at,
                    state = excluded.state
                WHERE excluded.revision > snapshots.revision
                "#,
                params![
                    snapshot.entity_id().to_string(),
                    snapshot.entity_id().namespace(),
                    to_sql_revision(snapshot.revision())?,
                    snapshot.taken_at.to_rfc3339(),
                    state,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn purge_namespace(&self, namespace: &str) -> Result<usize, JournalError> {
        let namespace = namespace.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let count: i64 = tx.query_row(
                r#"
                SELECT COUNT(*) FROM (
                    SELECT entity_id FROM journal WHERE namespace = ?1
                    UNION
                    SELECT entity_id FROM snapshots WHERE namespace = ?1
                )
                "#,
                params![namespace],
                |row| row.get(0),
            )?;
            tx.execute("DELETE FROM journal WHERE namespace = ?1", params![namespace])?;
            tx.execute("DELETE FROM snapshots WHERE namespace = ?1", params![namespace])?;
            tx.commit()?;

            debug!(namespace = %namespace, things = count, "Purged namespace from journal");
            Ok(usize::try_from(count).unwrap_or_default())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use twin_events::{Lifecycle, Thing, ThingState};

    fn entity(id: &str) -> EntityId {
        EntityId::parse(id).unwrap()
    }

    fn entry(id: &str, revision: u64) -> JournalEntry {
        JournalEntry {
            entity_id: entity(id),
            revision: Revision::new(revision),
            event_type: "thing.attribute_modified".to_string(),
            occurred_at: Utc::now(),
            correlation_id: format!("c-{revision}"),
            payload: json!({"pointer": "/n", "value": revision}),
        }
    }

    #[tokio::test]
    async fn test_append_and_load_in_order() {
        let journal = SqliteJournal::open_in_memory().unwrap();
        for revision in 1..=3 {
            journal
                .append(entry("ns:a", revision), Revision::new(revision - 1))
                .await
                .unwrap();
        }

        let loaded = journal.load_events(&entity("ns:a"), Revision::new(1)).await.unwrap();
        let revisions: Vec<u64> = loaded.iter().map(|e| e.revision.value()).collect();
        assert_eq!(revisions, vec![2, 3]);
        assert_eq!(loaded[0].correlation_id, "c-2");
        assert_eq!(loaded[0].payload, json!({"pointer": "/n", "value": 2}));
    }

    #[tokio::test]
    async fn test_stale_append_is_conflict() {
        let journal = SqliteJournal::open_in_memory().unwrap();
        journal.append(entry("ns:a", 1), Revision::ZERO).await.unwrap();

        let err = journal.append(entry("ns:a", 1), Revision::ZERO).await.unwrap_err();
        assert!(matches!(err, JournalError::Conflict { expected: 0, actual: 1, .. }));
    }

    #[tokio::test]
    async fn test_snapshot_upsert_keeps_newest() {
        let journal = SqliteJournal::open_in_memory().unwrap();
        let state = |revision| ThingState {
            entity_id: entity("ns:a"),
            revision: Revision::new(revision),
            lifecycle: Lifecycle::Active(Thing::default()),
        };

        journal.save_snapshot(Snapshot::of(&state(4))).await.unwrap();
        journal.save_snapshot(Snapshot::of(&state(8))).await.unwrap();
        journal.save_snapshot(Snapshot::of(&state(6))).await.unwrap();

        let latest = journal.load_latest_snapshot(&entity("ns:a")).await.unwrap().unwrap();
        assert_eq!(latest.revision(), Revision::new(8));
        assert!(journal.load_latest_snapshot(&entity("ns:b")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_purge_namespace() {
        let journal = SqliteJournal::open_in_memory().unwrap();
        journal.append(entry("ns:a", 1), Revision::ZERO).await.unwrap();
        journal.append(entry("ns:b", 1), Revision::ZERO).await.unwrap();
        journal.append(entry("keep:a", 1), Revision::ZERO).await.unwrap();

        assert_eq!(journal.purge_namespace("ns").await.unwrap(), 2);
        assert_eq!(journal.purge_namespace("ns").await.unwrap(), 0);
        assert_eq!(
            journal.load_events(&entity("keep:a"), Revision::ZERO).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_reopen_file_keeps_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.db");

        let journal = SqliteJournal::open(&path).unwrap();
        journal.append(entry("ns:a", 1), Revision::ZERO).await.unwrap();
        drop(journal);

        let reopened = SqliteJournal::open(&path).unwrap();
        let loaded = reopened.load_events(&entity("ns:a"), Revision::ZERO).await.unwrap();
        assert_eq!(loaded.len(), 1);
    }
}
