//! SQLite-backed, append-only review storage.
//!
//! A single connection behind a mutex serializes writers. Each insert is one
//! statement, so a review's fields commit together or not at all.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use serde::Serialize;
use uuid::Uuid;

use crate::FeedbackResult;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("store connection lock poisoned")]
    Poisoned,

    #[error("storage task failed: {0}")]
    Task(String),
}

/// A persisted review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Review {
    pub id: String,
    pub rating: u8,
    pub review_text: String,
    pub ai_response: String,
    pub ai_summary: String,
    pub ai_recommended_action: String,
    pub created_at: DateTime<Utc>,
}

/// Input for [`ReviewStore::insert`]; id and timestamp are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewReview {
    pub rating: u8,
    pub review_text: String,
    pub feedback: FeedbackResult,
}

#[derive(Clone)]
pub struct ReviewStore {
    conn: Arc<Mutex<Connection>>,
}

impl ReviewStore {
    /// Open (or create) the database file and ensure the schema exists.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!("Opened review store at {} (journal_mode={})", path.display(), mode);
        Self::init(conn)
    }

    /// Private in-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS reviews (
                id TEXT PRIMARY KEY,
                rating INTEGER NOT NULL,
                review_text TEXT NOT NULL,
                ai_response TEXT NOT NULL,
                ai_summary TEXT NOT NULL,
                ai_recommended_action TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_reviews_created_at ON reviews (created_at);",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Append a review, assigning its id and creation time.
    pub fn insert(&self, new: NewReview) -> Result<Review, StoreError> {
        // Timestamp under the lock so insertion order and created_at agree.
        let conn = self.lock()?;
        let review = Review {
            id: Uuid::new_v4().to_string(),
            rating: new.rating,
            review_text: new.review_text,
            ai_response: new.feedback.customer_reply,
            ai_summary: new.feedback.internal_summary,
            ai_recommended_action: new.feedback.recommended_action,
            // Stored at microsecond precision; keep the returned value identical.
            created_at: Utc::now().trunc_subsecs(6),
        };

        conn.execute(
            "INSERT INTO reviews (
                id, rating, review_text, ai_response, ai_summary,
                ai_recommended_action, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                review.id,
                review.rating,
                review.review_text,
                review.ai_response,
                review.ai_summary,
                review.ai_recommended_action,
                format_timestamp(&review.created_at),
            ],
        )?;

        Ok(review)
    }

    /// All reviews, or only those with `rating`, newest first.
    pub fn list(&self, rating: Option<u8>) -> Result<Vec<Review>, StoreError> {
        const COLUMNS: &str = "SELECT id, rating, review_text, ai_response, ai_summary, \
                               ai_recommended_action, created_at FROM reviews";

        let conn = self.lock()?;
        let reviews = match rating {
            Some(rating) => {
                let mut stmt = conn.prepare(&format!(
                    "{COLUMNS} WHERE rating = ?1 ORDER BY created_at DESC, rowid DESC"
                ))?;
                let rows = stmt.query_map(params![rating], review_from_row)?;
                let reviews = rows.collect::<Result<Vec<_>, _>>()?;
                reviews
            }
            None => {
                let mut stmt =
                    conn.prepare(&format!("{COLUMNS} ORDER BY created_at DESC, rowid DESC"))?;
                let rows = stmt.query_map([], review_from_row)?;
                let reviews = rows.collect::<Result<Vec<_>, _>>()?;
                reviews
            }
        };
        Ok(reviews)
    }

    /// [`insert`](Self::insert) on the blocking thread pool.
    pub async fn insert_async(&self, new: NewReview) -> Result<Review, StoreError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.insert(new))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }

    /// [`list`](Self::list) on the blocking thread pool.
    pub async fn list_async(&self, rating: Option<u8>) -> Result<Vec<Review>, StoreError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.list(rating))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

// Fixed width so lexical order in SQLite equals chronological order.
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn review_from_row(row: &Row<'_>) -> rusqlite::Result<Review> {
    let created_raw: String = row.get(6)?;
    let created_at = DateTime::parse_from_rfc3339(&created_raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;

    Ok(Review {
        id: row.get(0)?,
        rating: row.get(1)?,
        review_text: row.get(2)?,
        ai_response: row.get(3)?,
        ai_summary: row.get(4)?,
        ai_recommended_action: row.get(5)?,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback;

    fn new_review(rating: u8, text: &str) -> NewReview {
        NewReview {
            rating,
            review_text: text.to_string(),
            feedback: fallback::classify(rating),
        }
    }

    #[test]
    fn test_insert_assigns_id_and_timestamp() {
        let store = ReviewStore::open_in_memory().unwrap();
        let before = Utc::now().trunc_subsecs(6);
        let review = store.insert(new_review(4, "Nice")).unwrap();

        assert!(Uuid::parse_str(&review.id).is_ok());
        assert!(review.created_at >= before);
        assert_eq!(review.ai_recommended_action, "No immediate action required.");

        let stored = store.list(None).unwrap();
        assert_eq!(stored, vec![review]);
    }

    #[test]
    fn test_list_is_newest_first() {
        let store = ReviewStore::open_in_memory().unwrap();
        for text in ["first", "second", "third"] {
            store.insert(new_review(3, text)).unwrap();
        }

        let texts: Vec<_> = store
            .list(None)
            .unwrap()
            .into_iter()
            .map(|r| r.review_text)
            .collect();
        assert_eq!(texts, vec!["third", "second", "first"]);
    }

    #[test]
    fn test_rating_filter() {
        let store = ReviewStore::open_in_memory().unwrap();
        store.insert(new_review(1, "bad")).unwrap();
        store.insert(new_review(3, "meh one")).unwrap();
        store.insert(new_review(5, "great")).unwrap();
        store.insert(new_review(3, "meh two")).unwrap();

        let threes = store.list(Some(3)).unwrap();
        assert_eq!(threes.len(), 2);
        assert!(threes.iter().all(|r| r.rating == 3));
        assert_eq!(threes[0].review_text, "meh two");

        assert!(store.list(Some(2)).unwrap().is_empty());
        assert_eq!(store.list(None).unwrap().len(), 4);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reviews.db");

        let id = {
            let store = ReviewStore::open(&path).unwrap();
            store.insert(new_review(2, "Late delivery")).unwrap().id
        };

        let reopened = ReviewStore::open(&path).unwrap();
        let reviews = reopened.list(None).unwrap();
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].id, id);
        assert_eq!(reviews[0].review_text, "Late delivery");
    }

    #[test]
    fn test_concurrent_inserts_keep_rows_intact() {
        let store = ReviewStore::open_in_memory().unwrap();

        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let rating = i % 5 + 1;
                    for n in 0..10 {
                        store
                            .insert(new_review(rating, &format!("thread {} review {}", i, n)))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let reviews = store.list(None).unwrap();
        assert_eq!(reviews.len(), 80);
        for review in reviews {
            // Every row carries the feedback that belongs to its own rating.
            assert_eq!(
                review.ai_recommended_action,
                fallback::classify(review.rating).recommended_action
            );
        }
    }

    #[tokio::test]
    async fn test_async_wrappers() {
        let store = ReviewStore::open_in_memory().unwrap();
        let review = store.insert_async(new_review(5, "Loved it")).await.unwrap();
        let listed = store.list_async(Some(5)).await.unwrap();
        assert_eq!(listed, vec![review]);
    }
}
