//! SQLite record store implementation

use archive_poster_domain::{
    CommitOutcome, PostedRecord, RecordId, RecordStore, ScheduledRecord, StoreError,
    planning::pair_date_labels,
};
use async_trait::async_trait;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::path::Path;
use std::time::Duration;
use time::{Date, OffsetDateTime, PrimitiveDateTime};

/// How long a connection waits on a locked database before giving up
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// `CURRENT_TIMESTAMP` layout used by SQLite
const SQLITE_TIMESTAMP: &str = "[year]-[month]-[day] [hour]:[minute]:[second]";

/// Columns added after the first release: (table, column, declaration)
const ADDITIVE_COLUMNS: &[(&str, &str, &str)] = &[
    ("posted_nodes", "node_description", "TEXT"),
    ("scheduled_nodes", "post_date", "TEXT"),
];

type ScheduledRow = (i64, String, String, Option<String>);

/// SQLite-backed record store
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    /// Open (or create) the database at `db_path` and bring its schema up to date
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Database(format!("Failed to create directory: {}", e)))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing)
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS posted_nodes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                node_id TEXT UNIQUE,
                node_description TEXT,
                post_date TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scheduled_nodes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                node_id TEXT UNIQUE,
                node_description TEXT UNIQUE,
                post_date TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        for (table, column, declaration) in ADDITIVE_COLUMNS {
            self.ensure_column(table, column, declaration).await?;
        }

        Ok(())
    }

    async fn ensure_column(
        &self,
        table: &str,
        column: &str,
        declaration: &str,
    ) -> Result<(), StoreError> {
        let columns: Vec<(String,)> = sqlx::query_as("SELECT name FROM pragma_table_info(?)")
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        if columns.iter().any(|(name,)| name == column) {
            return Ok(());
        }

        // Identifiers come from ADDITIVE_COLUMNS, never from input
        sqlx::query(&format!(
            "ALTER TABLE {table} ADD COLUMN {column} {declaration}"
        ))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::info!(table, column, "Added missing column");
        Ok(())
    }
}

fn scheduled_from_row((position, id, description, post_date): ScheduledRow) -> ScheduledRecord {
    ScheduledRecord {
        position,
        id: RecordId::from(id),
        description,
        post_date,
    }
}

fn parse_sqlite_timestamp(value: &str) -> Result<OffsetDateTime, StoreError> {
    let format = time::format_description::parse(SQLITE_TIMESTAMP)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;

    PrimitiveDateTime::parse(value, &format)
        .map(PrimitiveDateTime::assume_utc)
        .map_err(|e| StoreError::Serialization(format!("Bad timestamp {value:?}: {e}")))
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn is_posted(&self, id: &RecordId) -> Result<bool, StoreError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posted_nodes WHERE node_id = ?")
            .bind(id.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(count.0 > 0)
    }

    async fn commit_posted(
        &self,
        id: &RecordId,
        description: Option<&str>,
    ) -> Result<CommitOutcome, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO posted_nodes (node_id, node_description)
            VALUES (?, ?)
            ON CONFLICT(node_id) DO NOTHING
            "#,
        )
        .bind(id.as_str())
        .bind(description)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            Ok(CommitOutcome::AlreadyPresent)
        } else {
            Ok(CommitOutcome::Inserted)
        }
    }

    async fn next_scheduled(&self) -> Result<Option<ScheduledRecord>, StoreError> {
        let row: Option<ScheduledRow> = sqlx::query_as(
            r#"
            SELECT id, node_id, node_description, post_date
            FROM scheduled_nodes
            ORDER BY id ASC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(row.map(scheduled_from_row))
    }

    async fn remove_scheduled(&self, id: &RecordId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM scheduled_nodes WHERE node_id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    async fn schedule(&self, id: &RecordId, description: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO scheduled_nodes (node_id, node_description) VALUES (?, ?)")
            .bind(id.as_str())
            .bind(description)
            .execute(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict(
                    format!("record {id} or description {description:?} is already queued"),
                ),
                other => StoreError::Database(other.to_string()),
            })?;

        Ok(())
    }

    async fn list_scheduled(&self, limit: usize) -> Result<Vec<ScheduledRecord>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<ScheduledRow> = sqlx::query_as(
            r#"
            SELECT id, node_id, node_description, post_date
            FROM scheduled_nodes
            ORDER BY id ASC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(scheduled_from_row).collect())
    }

    async fn scheduled_count(&self) -> Result<u64, StoreError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM scheduled_nodes")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(count.0.max(0) as u64)
    }

    async fn get_posted(&self, id: &RecordId) -> Result<Option<PostedRecord>, StoreError> {
        let row: Option<(String, Option<String>, Option<String>)> = sqlx::query_as(
            "SELECT node_id, node_description, post_date FROM posted_nodes WHERE node_id = ?",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        match row {
            Some((node_id, description, post_date)) => {
                let posted_at = match post_date {
                    Some(value) => parse_sqlite_timestamp(&value)?,
                    None => OffsetDateTime::UNIX_EPOCH,
                };

                Ok(Some(PostedRecord {
                    id: RecordId::from(node_id),
                    description,
                    posted_at,
                }))
            }
            None => Ok(None),
        }
    }

    async fn clear_scheduled_dates(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("UPDATE scheduled_nodes SET post_date = NULL")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn backfill_scheduled_dates(&self, start: Date) -> Result<u64, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let rows: Vec<(i64,)> =
            sqlx::query_as("SELECT id FROM scheduled_nodes WHERE post_date IS NULL ORDER BY id ASC")
                .fetch_all(&mut *tx)
                .await
                .map_err(|e| StoreError::Database(e.to_string()))?;

        let labels = pair_date_labels(start, rows.len());
        let mut updated = 0;
        for ((row_id,), label) in rows.iter().zip(labels.iter()) {
            let result = sqlx::query("UPDATE scheduled_nodes SET post_date = ? WHERE id = ?")
                .bind(label)
                .bind(row_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::Database(e.to_string()))?;
            updated += result.rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::info!(updated, start = %start, "Backfilled scheduled dates");
        Ok(updated)
    }

    async fn swap_scheduled(&self, first: i64, second: i64) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let mut rows = Vec::with_capacity(2);
        for position in [first, second] {
            let row: Option<ScheduledRow> = sqlx::query_as(
                "SELECT id, node_id, node_description, post_date FROM scheduled_nodes WHERE id = ?",
            )
            .bind(position)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

            match row {
                Some(row) => rows.push(row),
                None => {
                    return Err(StoreError::NotFound(format!(
                        "no scheduled record at position {position}"
                    )));
                }
            }
        }

        if first == second {
            return Ok(());
        }

        sqlx::query("DELETE FROM scheduled_nodes WHERE id IN (?, ?)")
            .bind(first)
            .bind(second)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        // Each position keeps its own date label and takes the other's record
        let (a, b) = (&rows[0], &rows[1]);
        for (slot, record) in [(a, b), (b, a)] {
            sqlx::query(
                r#"
                INSERT INTO scheduled_nodes (id, node_id, node_description, post_date)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(slot.0)
            .bind(&record.1)
            .bind(&record.2)
            .bind(&slot.3)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::info!(first, second, "Swapped scheduled records");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use time::Month;

    async fn store_with_queue(entries: &[(&str, &str)]) -> SqliteRecordStore {
        let store = SqliteRecordStore::in_memory().await.unwrap();
        for (id, description) in entries {
            store
                .schedule(&RecordId::from(*id), description)
                .await
                .unwrap();
        }
        store
    }

    async fn queued_ids(store: &SqliteRecordStore) -> Vec<String> {
        store
            .list_scheduled(100)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id.to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_queue_is_fifo() {
        let store =
            store_with_queue(&[("300", "third"), ("100", "first"), ("200", "second")]).await;

        let head = store.next_scheduled().await.unwrap().unwrap();
        assert_eq!(head.id.as_str(), "300");
        assert_eq!(head.description, "third");
        assert_eq!(queued_ids(&store).await, vec!["300", "100", "200"]);
        assert_eq!(store.scheduled_count().await.unwrap(), 3);

        store.remove_scheduled(&RecordId::from("300")).await.unwrap();
        let head = store.next_scheduled().await.unwrap().unwrap();
        assert_eq!(head.id.as_str(), "100");
    }

    #[tokio::test]
    async fn test_remove_scheduled_is_idempotent() {
        let store = store_with_queue(&[("100", "first")]).await;
        let id = RecordId::from("100");

        store.remove_scheduled(&id).await.unwrap();
        store.remove_scheduled(&id).await.unwrap();

        assert!(store.next_scheduled().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_schedule_rejects_duplicates() {
        let store = store_with_queue(&[("100", "first")]).await;

        let same_id = store.schedule(&RecordId::from("100"), "other").await;
        let same_description = store.schedule(&RecordId::from("200"), "first").await;

        assert!(matches!(same_id, Err(StoreError::Conflict(_))));
        assert!(matches!(same_description, Err(StoreError::Conflict(_))));
        assert_eq!(store.scheduled_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_commit_posted_inserts_once() {
        let store = SqliteRecordStore::in_memory().await.unwrap();
        let id = RecordId::from("100");

        let first = store.commit_posted(&id, Some("first")).await.unwrap();
        let second = store.commit_posted(&id, Some("changed")).await.unwrap();

        assert_eq!(first, CommitOutcome::Inserted);
        assert_eq!(second, CommitOutcome::AlreadyPresent);
        assert!(store.is_posted(&id).await.unwrap());

        let posted = store.get_posted(&id).await.unwrap().unwrap();
        assert_eq!(posted.description.as_deref(), Some("first"));
        let age = OffsetDateTime::now_utc() - posted.posted_at;
        assert!(age.whole_minutes().abs() < 5);
    }

    #[tokio::test]
    async fn test_is_posted_for_unknown_id() {
        let store = SqliteRecordStore::in_memory().await.unwrap();

        assert!(!store.is_posted(&RecordId::from("404")).await.unwrap());
        assert!(store.get_posted(&RecordId::from("404")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_backfill_labels_in_pairs() {
        let store = store_with_queue(&[
            ("1", "one"),
            ("2", "two"),
            ("3", "three"),
            ("4", "four"),
            ("5", "five"),
        ])
        .await;
        let start = Date::from_calendar_date(2024, Month::December, 20).unwrap();

        let updated = store.backfill_scheduled_dates(start).await.unwrap();

        assert_eq!(updated, 5);
        let labels: Vec<Option<String>> = store
            .list_scheduled(10)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.post_date)
            .collect();
        assert_eq!(
            labels,
            vec![
                Some("2024-12-20-1".to_string()),
                Some("2024-12-20-2".to_string()),
                Some("2024-12-21-1".to_string()),
                Some("2024-12-21-2".to_string()),
                Some("2024-12-22-1".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_backfill_only_touches_unlabelled_rows() {
        let store = store_with_queue(&[("1", "one"), ("2", "two")]).await;
        let start = Date::from_calendar_date(2024, Month::December, 20).unwrap();
        store.backfill_scheduled_dates(start).await.unwrap();
        store.schedule(&RecordId::from("3"), "three").await.unwrap();

        let later = Date::from_calendar_date(2025, Month::January, 5).unwrap();
        let updated = store.backfill_scheduled_dates(later).await.unwrap();

        assert_eq!(updated, 1);
        let records = store.list_scheduled(10).await.unwrap();
        assert_eq!(records[0].post_date.as_deref(), Some("2024-12-20-1"));
        assert_eq!(records[2].post_date.as_deref(), Some("2025-01-05-1"));
    }

    #[tokio::test]
    async fn test_clear_dates_resets_labels() {
        let store = store_with_queue(&[("1", "one"), ("2", "two")]).await;
        let start = Date::from_calendar_date(2024, Month::December, 20).unwrap();
        store.backfill_scheduled_dates(start).await.unwrap();

        let cleared = store.clear_scheduled_dates().await.unwrap();

        assert_eq!(cleared, 2);
        assert!(
            store
                .list_scheduled(10)
                .await
                .unwrap()
                .iter()
                .all(|r| r.post_date.is_none())
        );
    }

    #[tokio::test]
    async fn test_swap_exchanges_records_but_keeps_slot_labels() {
        let store =
            store_with_queue(&[("100", "first"), ("200", "second"), ("300", "third")]).await;
        let start = Date::from_calendar_date(2024, Month::December, 20).unwrap();
        store.backfill_scheduled_dates(start).await.unwrap();
        let before = store.list_scheduled(10).await.unwrap();

        store
            .swap_scheduled(before[0].position, before[2].position)
            .await
            .unwrap();

        let after = store.list_scheduled(10).await.unwrap();
        assert_eq!(after[0].position, before[0].position);
        assert_eq!(after[0].id.as_str(), "300");
        assert_eq!(after[0].description, "third");
        assert_eq!(after[0].post_date.as_deref(), Some("2024-12-20-1"));
        assert_eq!(after[2].id.as_str(), "100");
        assert_eq!(after[2].post_date.as_deref(), Some("2024-12-21-1"));
        assert_eq!(after[1], before[1]);
    }

    #[tokio::test]
    async fn test_swap_with_missing_position_changes_nothing() {
        let store = store_with_queue(&[("100", "first"), ("200", "second")]).await;
        let before = store.list_scheduled(10).await.unwrap();

        let result = store.swap_scheduled(before[0].position, 999).await;

        assert!(matches!(result, Err(StoreError::NotFound(_))));
        assert_eq!(store.list_scheduled(10).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_file_store_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("nodes.db");

        let store = SqliteRecordStore::new(&path).await.unwrap();
        store.schedule(&RecordId::from("100"), "first").await.unwrap();
        store.commit_posted(&RecordId::from("50"), None).await.unwrap();
        store.close().await;

        let reopened = SqliteRecordStore::new(&path).await.unwrap();
        assert_eq!(reopened.scheduled_count().await.unwrap(), 1);
        assert!(reopened.is_posted(&RecordId::from("50")).await.unwrap());
        reopened.close().await;
    }

    #[tokio::test]
    async fn test_opening_old_database_adds_columns_and_keeps_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("old.db");

        let legacy = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(
                SqliteConnectOptions::new()
                    .filename(&path)
                    .create_if_missing(true),
            )
            .await
            .unwrap();
        sqlx::query(
            "CREATE TABLE posted_nodes (id INTEGER PRIMARY KEY AUTOINCREMENT, node_id TEXT UNIQUE, post_date TIMESTAMP DEFAULT CURRENT_TIMESTAMP)",
        )
        .execute(&legacy)
        .await
        .unwrap();
        sqlx::query(
            "CREATE TABLE scheduled_nodes (id INTEGER PRIMARY KEY AUTOINCREMENT, node_id TEXT UNIQUE, node_description TEXT UNIQUE)",
        )
        .execute(&legacy)
        .await
        .unwrap();
        sqlx::query("INSERT INTO posted_nodes (node_id) VALUES ('10')")
            .execute(&legacy)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO scheduled_nodes (node_id, node_description) VALUES ('20', 'twenty')",
        )
        .execute(&legacy)
        .await
        .unwrap();
        legacy.close().await;

        let store = SqliteRecordStore::new(&path).await.unwrap();

        assert!(store.is_posted(&RecordId::from("10")).await.unwrap());
        let head = store.next_scheduled().await.unwrap().unwrap();
        assert_eq!(head.id.as_str(), "20");
        assert!(head.post_date.is_none());

        store
            .commit_posted(&RecordId::from("20"), Some("twenty"))
            .await
            .unwrap();
        let posted = store.get_posted(&RecordId::from("20")).await.unwrap().unwrap();
        assert_eq!(posted.description.as_deref(), Some("twenty"));
        store.close().await;

        // A second open finds nothing to upgrade
        let again = SqliteRecordStore::new(&path).await.unwrap();
        assert_eq!(again.scheduled_count().await.unwrap(), 1);
        again.close().await;
    }

    #[test]
    fn test_parse_sqlite_timestamp() {
        let parsed = parse_sqlite_timestamp("2024-12-20 13:45:01").unwrap();

        assert_eq!(parsed.year(), 2024);
        assert_eq!(parsed.month(), Month::December);
        assert_eq!(parsed.hour(), 13);
        assert!(parse_sqlite_timestamp("yesterday").is_err());
    }
}
