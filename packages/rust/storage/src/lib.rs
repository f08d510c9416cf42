//! libSQL storage layer for documents, conversation threads, and messages.
//!
//! The [`Storage`] struct wraps an embedded libSQL database holding three
//! independent keyed collections:
//! - `documents`: one row per source URL
//! - `threads`: one row per session
//! - `messages`: append-only transcript rows per session
//!
//! Every write is a single statement, so each call is atomic on its own and
//! no cross-call locking is needed when crawl units run concurrently.

mod migrations;

use std::path::Path;

use askdocs_shared::{AskDocsError, ConversationThread, Document, Message, Result};
use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use uuid::Uuid;

/// What a document upsert did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No document existed for the URL; a new one was inserted.
    Inserted,
    /// The stored text differed; it was replaced and the file id reset.
    Updated,
    /// The stored text was identical; nothing was written.
    Unchanged,
}

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AskDocsError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| AskDocsError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| AskDocsError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(AskDocsError::Storage(format!(
                "database not found at {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| AskDocsError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| AskDocsError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        AskDocsError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(AskDocsError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Document operations
    // -----------------------------------------------------------------------

    /// Make the store hold exactly one document for `url` with `text`.
    ///
    /// Inserts when the URL is new, replaces the text in place (keeping the
    /// id, clearing `file_id`) when it differs, and writes nothing when it is
    /// identical. The decision and the write happen in one statement, so two
    /// racing upserts for the same URL cannot both insert.
    pub async fn upsert_document(&self, url: &str, text: &str) -> Result<UpsertOutcome> {
        self.check_writable()?;
        let new_id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();

        let mut rows = self
            .conn
            .query(
                "INSERT INTO documents (id, url, text, file_id, updated_at)
                 VALUES (?1, ?2, ?3, NULL, ?4)
                 ON CONFLICT(url) DO UPDATE SET
                   text = excluded.text,
                   file_id = NULL,
                   updated_at = excluded.updated_at
                 WHERE documents.text IS NOT excluded.text
                 RETURNING id",
                params![new_id.as_str(), url, text, now.as_str()],
            )
            .await
            .map_err(|e| AskDocsError::Storage(e.to_string()))?;

        let mut written_id: Option<String> = None;
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| AskDocsError::Storage(e.to_string()))?
        {
            written_id = Some(
                row.get::<String>(0)
                    .map_err(|e| AskDocsError::Storage(e.to_string()))?,
            );
        }

        let outcome = match written_id {
            None => UpsertOutcome::Unchanged,
            Some(id) if id == new_id => UpsertOutcome::Inserted,
            Some(_) => UpsertOutcome::Updated,
        };
        tracing::debug!(url, ?outcome, "document upserted");
        Ok(outcome)
    }

    /// Get a document by its unique URL.
    pub async fn get_document_by_url(&self, url: &str) -> Result<Option<Document>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, url, text, file_id, updated_at FROM documents WHERE url = ?1",
                params![url],
            )
            .await
            .map_err(|e| AskDocsError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_document(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(AskDocsError::Storage(e.to_string())),
        }
    }

    /// Get a document by ID.
    pub async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, url, text, file_id, updated_at FROM documents WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(|e| AskDocsError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_document(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(AskDocsError::Storage(e.to_string())),
        }
    }

    /// List up to `limit` documents with an ID greater than `after`, in ID order.
    ///
    /// IDs are UUID v7, so pages come out in insertion order and paging stays
    /// stable while other rows are replaced.
    pub async fn list_documents(&self, after: Option<&str>, limit: u32) -> Result<Vec<Document>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, url, text, file_id, updated_at FROM documents
                 WHERE ?1 IS NULL OR id > ?1
                 ORDER BY id
                 LIMIT ?2",
                params![after, limit],
            )
            .await
            .map_err(|e| AskDocsError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| AskDocsError::Storage(e.to_string()))?
        {
            results.push(row_to_document(&row)?);
        }
        Ok(results)
    }

    /// Count stored documents.
    pub async fn count_documents(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM documents", params![])
            .await
            .map_err(|e| AskDocsError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get::<i64>(0)
                .map(|n| n.max(0) as u64)
                .map_err(|e| AskDocsError::Storage(e.to_string())),
            Ok(None) => Ok(0),
            Err(e) => Err(AskDocsError::Storage(e.to_string())),
        }
    }

    /// Record the remote file uploaded for a document.
    ///
    /// Returns `false` if the document no longer exists.
    pub async fn set_document_file_id(&self, id: &str, file_id: &str) -> Result<bool> {
        self.check_writable()?;
        let changed = self
            .conn
            .execute(
                "UPDATE documents SET file_id = ?1 WHERE id = ?2",
                params![file_id, id],
            )
            .await
            .map_err(|e| AskDocsError::Storage(e.to_string()))?;
        Ok(changed > 0)
    }

    // -----------------------------------------------------------------------
    // Thread operations
    // -----------------------------------------------------------------------

    /// Get the conversation thread bound to a session.
    pub async fn get_thread(&self, session_id: &str) -> Result<Option<ConversationThread>> {
        let mut rows = self
            .conn
            .query(
                "SELECT session_id, thread_id, created_at FROM threads WHERE session_id = ?1",
                params![session_id],
            )
            .await
            .map_err(|e| AskDocsError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(ConversationThread {
                session_id: row
                    .get::<String>(0)
                    .map_err(|e| AskDocsError::Storage(e.to_string()))?,
                remote_thread_id: row
                    .get::<String>(1)
                    .map_err(|e| AskDocsError::Storage(e.to_string()))?,
                created_at: parse_timestamp(
                    &row.get::<String>(2)
                        .map_err(|e| AskDocsError::Storage(e.to_string()))?,
                )?,
            })),
            Ok(None) => Ok(None),
            Err(e) => Err(AskDocsError::Storage(e.to_string())),
        }
    }

    /// Bind `session_id` to `thread_id` unless it is already bound.
    ///
    /// Returns the stored binding. When another writer got there first, the
    /// existing binding is returned and `thread_id` is discarded.
    pub async fn save_thread(
        &self,
        session_id: &str,
        thread_id: &str,
    ) -> Result<ConversationThread> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let inserted = self
            .conn
            .execute(
                "INSERT INTO threads (session_id, thread_id, created_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(session_id) DO NOTHING",
                params![session_id, thread_id, now.as_str()],
            )
            .await
            .map_err(|e| AskDocsError::Storage(e.to_string()))?;

        if inserted == 0 {
            tracing::warn!(session_id, thread_id, "session already bound, keeping existing thread");
        }

        self.get_thread(session_id).await?.ok_or_else(|| {
            AskDocsError::Storage(format!("thread for session {session_id} vanished after insert"))
        })
    }

    // -----------------------------------------------------------------------
    // Message operations
    // -----------------------------------------------------------------------

    /// Append a transcript message to a session.
    pub async fn insert_message(
        &self,
        session_id: &str,
        is_viewer: bool,
        text: &str,
    ) -> Result<Message> {
        self.check_writable()?;
        let created_at = Utc::now();
        let mut rows = self
            .conn
            .query(
                "INSERT INTO messages (session_id, is_viewer, text, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 RETURNING id",
                params![session_id, i64::from(is_viewer), text, created_at.to_rfc3339()],
            )
            .await
            .map_err(|e| AskDocsError::Storage(e.to_string()))?;

        let id = match rows.next().await {
            Ok(Some(row)) => row
                .get::<i64>(0)
                .map_err(|e| AskDocsError::Storage(e.to_string()))?,
            Ok(None) => {
                return Err(AskDocsError::Storage("message insert returned no id".into()));
            }
            Err(e) => return Err(AskDocsError::Storage(e.to_string())),
        };

        Ok(Message {
            id,
            session_id: session_id.to_string(),
            is_viewer,
            text: text.to_string(),
            created_at,
        })
    }

    /// List a session's messages in the order they were appended.
    pub async fn list_messages(&self, session_id: &str) -> Result<Vec<Message>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, session_id, is_viewer, text, created_at
                 FROM messages WHERE session_id = ?1 ORDER BY id",
                params![session_id],
            )
            .await
            .map_err(|e| AskDocsError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| AskDocsError::Storage(e.to_string()))?
        {
            results.push(Message {
                id: row
                    .get::<i64>(0)
                    .map_err(|e| AskDocsError::Storage(e.to_string()))?,
                session_id: row
                    .get::<String>(1)
                    .map_err(|e| AskDocsError::Storage(e.to_string()))?,
                is_viewer: row
                    .get::<i64>(2)
                    .map_err(|e| AskDocsError::Storage(e.to_string()))?
                    != 0,
                text: row
                    .get::<String>(3)
                    .map_err(|e| AskDocsError::Storage(e.to_string()))?,
                created_at: parse_timestamp(
                    &row.get::<String>(4)
                        .map_err(|e| AskDocsError::Storage(e.to_string()))?,
                )?,
            });
        }
        Ok(results)
    }
}

/// Convert a database row to a [`Document`].
fn row_to_document(row: &libsql::Row) -> Result<Document> {
    Ok(Document {
        id: row
            .get::<String>(0)
            .map_err(|e| AskDocsError::Storage(e.to_string()))?,
        url: row
            .get::<String>(1)
            .map_err(|e| AskDocsError::Storage(e.to_string()))?,
        text: row
            .get::<String>(2)
            .map_err(|e| AskDocsError::Storage(e.to_string()))?,
        external_file_id: row.get::<String>(3).ok(),
        updated_at: parse_timestamp(
            &row.get::<String>(4)
                .map_err(|e| AskDocsError::Storage(e.to_string()))?,
        )?,
    })
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AskDocsError::Storage(format!("invalid date: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ops::Deref;
    use std::path::PathBuf;
    use std::sync::Arc;

    /// Storage in its own temp directory, removed on drop.
    struct TestDb {
        storage: Storage,
        dir: PathBuf,
    }

    impl Deref for TestDb {
        type Target = Storage;

        fn deref(&self) -> &Storage {
            &self.storage
        }
    }

    impl Drop for TestDb {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.dir);
        }
    }

    fn test_dir() -> PathBuf {
        std::env::temp_dir().join(format!("askdocs-storage-{}", Uuid::now_v7()))
    }

    /// Create a temp file storage for testing.
    async fn test_storage() -> TestDb {
        let dir = test_dir();
        let storage = Storage::open(&dir.join("test.db")).await.expect("open test db");
        TestDb { storage, dir }
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        let version = storage.get_schema_version().await;
        assert_eq!(version, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let dir = test_dir();
        let tmp = dir.join("test.db");
        let _s1 = Storage::open(&tmp).await.expect("first open");
        drop(_s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);

        drop(s2);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn upsert_inserts_new_document() {
        let storage = test_storage().await;
        let url = "https://docs.convex.dev/home";

        let outcome = storage.upsert_document(url, "# Home").await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Inserted);

        let doc = storage.get_document_by_url(url).await.unwrap().unwrap();
        assert_eq!(doc.url, url);
        assert_eq!(doc.text, "# Home");
        assert!(doc.external_file_id.is_none());
    }

    #[tokio::test]
    async fn upsert_identical_text_is_noop() {
        let storage = test_storage().await;
        let url = "https://docs.convex.dev/home";

        storage.upsert_document(url, "# Home").await.unwrap();
        let before = storage.get_document_by_url(url).await.unwrap().unwrap();
        assert!(storage.set_document_file_id(&before.id, "file-abc").await.unwrap());
        let before = storage.get_document_by_url(url).await.unwrap().unwrap();

        let outcome = storage.upsert_document(url, "# Home").await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Unchanged);

        let after = storage.get_document_by_url(url).await.unwrap().unwrap();
        assert_eq!(after, before);
        assert_eq!(after.external_file_id.as_deref(), Some("file-abc"));
        assert_eq!(storage.count_documents().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn upsert_changed_text_replaces_and_resets_file_id() {
        let storage = test_storage().await;
        let url = "https://docs.convex.dev/database";

        storage.upsert_document(url, "old").await.unwrap();
        let original = storage.get_document_by_url(url).await.unwrap().unwrap();
        storage
            .set_document_file_id(&original.id, "file-old")
            .await
            .unwrap();

        let outcome = storage.upsert_document(url, "new").await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);

        let replaced = storage.get_document_by_url(url).await.unwrap().unwrap();
        assert_eq!(replaced.id, original.id);
        assert_eq!(replaced.text, "new");
        assert!(replaced.external_file_id.is_none());
        assert_eq!(storage.count_documents().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn concurrent_upserts_keep_one_document() {
        let storage = Arc::new(test_storage().await);
        let url = "https://docs.convex.dev/race";

        let mut handles = Vec::new();
        for i in 0..8 {
            let storage = storage.clone();
            handles.push(tokio::spawn(async move {
                storage.upsert_document(url, &format!("text {}", i % 2)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(storage.count_documents().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn list_documents_pages_by_id() {
        let storage = test_storage().await;
        for i in 0..5 {
            storage
                .upsert_document(&format!("https://docs.convex.dev/p{i}"), "text")
                .await
                .unwrap();
        }

        let first = storage.list_documents(None, 2).await.unwrap();
        assert_eq!(first.len(), 2);
        let second = storage
            .list_documents(Some(&first[1].id), 2)
            .await
            .unwrap();
        assert_eq!(second.len(), 2);
        let third = storage
            .list_documents(Some(&second[1].id), 2)
            .await
            .unwrap();
        assert_eq!(third.len(), 1);

        let urls: Vec<_> = first
            .iter()
            .chain(&second)
            .chain(&third)
            .map(|d| d.url.clone())
            .collect();
        assert_eq!(
            urls,
            (0..5)
                .map(|i| format!("https://docs.convex.dev/p{i}"))
                .collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn set_file_id_on_missing_document() {
        let storage = test_storage().await;
        assert!(!storage.set_document_file_id("missing", "file-1").await.unwrap());
    }

    #[tokio::test]
    async fn thread_first_writer_wins() {
        let storage = test_storage().await;
        assert!(storage.get_thread("session-a").await.unwrap().is_none());

        let first = storage.save_thread("session-a", "thread_1").await.unwrap();
        assert_eq!(first.remote_thread_id, "thread_1");

        let second = storage.save_thread("session-a", "thread_2").await.unwrap();
        assert_eq!(second.remote_thread_id, "thread_1");

        let found = storage.get_thread("session-a").await.unwrap().unwrap();
        assert_eq!(found, first);
    }

    #[tokio::test]
    async fn messages_append_in_order_per_session() {
        let storage = test_storage().await;
        storage.insert_message("s1", true, "question").await.unwrap();
        storage.insert_message("s2", true, "other").await.unwrap();
        storage.insert_message("s1", false, "answer").await.unwrap();

        let messages = storage.list_messages("s1").await.unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].is_viewer);
        assert_eq!(messages[0].text, "question");
        assert!(!messages[1].is_viewer);
        assert_eq!(messages[1].text, "answer");
        assert!(messages[0].id < messages[1].id);
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let dir = test_dir();
        let tmp = dir.join("test.db");
        let rw = Storage::open(&tmp).await.unwrap();
        rw.insert_message("s1", true, "hello").await.unwrap();
        drop(rw);

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        assert_eq!(ro.list_messages("s1").await.unwrap().len(), 1);

        let result = ro.upsert_document("https://docs.convex.dev/x", "x").await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));

        drop(ro);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn readonly_requires_existing_file() {
        let tmp = test_dir().join("missing.db");
        assert!(Storage::open_readonly(&tmp).await.is_err());
    }
}
