//! SQLite-backed post store and destination registry.
//!
//! Two tables: `posts` (scheduled deliverables, monotonic pending→delivered)
//! and `destinations` (soft-deleted broadcast targets). All mutations are
//! atomic per row; no multi-row transactions are needed, so a plain mutexed
//! connection is enough.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use postcast_core::error::{PostcastError, Result};
use postcast_core::types::{DeliveryState, Destination, MediaKind, Post, PostPayload};

/// Counters returned by [`PostStore::stats`].
#[derive(Debug, Clone, Copy)]
pub struct StoreStats {
    pub total: u64,
    pub pending: u64,
    pub delivered: u64,
    pub db_size_bytes: u64,
}

/// SQLite-backed persistence for posts and destinations.
pub struct PostStore {
    conn: Mutex<Connection>,
}

impl PostStore {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(store_err)?;
        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        Ok(store)
    }

    /// In-memory store, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(store_err)?;
        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        self.lock()?
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS posts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                message TEXT,
                media_type TEXT,
                media_file_id TEXT,
                caption TEXT,
                scheduled_time TEXT NOT NULL,
                posted INTEGER NOT NULL DEFAULT 0,
                total_destinations INTEGER NOT NULL DEFAULT 0,
                successful_sends INTEGER NOT NULL DEFAULT 0,
                posted_at TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS destinations (
                destination_id TEXT PRIMARY KEY,
                name TEXT,
                active INTEGER NOT NULL DEFAULT 1,
                added_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_scheduled_posted
                ON posts(scheduled_time, posted);
            CREATE INDEX IF NOT EXISTS idx_posted_at ON posts(posted_at);
            CREATE INDEX IF NOT EXISTS idx_destination_active
                ON destinations(active);
         ",
            )
            .map_err(store_err)?;
        Ok(())
    }

    // ─── Posts ──────────────────────────────────────

    /// Insert a pending post; returns the assigned id.
    pub fn create(
        &self,
        payload: &PostPayload,
        scheduled_at: DateTime<Utc>,
        destination_count: u32,
    ) -> Result<i64> {
        let (message, media_type, media_file_id, caption) = match payload {
            PostPayload::Text(t) => (Some(t.as_str()), None, None, None),
            PostPayload::Media { kind, file_id, caption } => (
                None,
                Some(kind.as_str()),
                Some(file_id.as_str()),
                caption.as_deref(),
            ),
        };
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO posts
             (message, media_type, media_file_id, caption, scheduled_time,
              total_destinations, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                message,
                media_type,
                media_file_id,
                caption,
                scheduled_at.to_rfc3339(),
                destination_count,
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(store_err)?;
        Ok(conn.last_insert_rowid())
    }

    /// Pending posts with `scheduled_at <= now`, oldest first, capped at
    /// `limit`.
    pub fn due(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<Post>> {
        self.query_posts(
            "SELECT * FROM posts
             WHERE scheduled_time <= ?1 AND posted = 0
             ORDER BY scheduled_time LIMIT ?2",
            rusqlite::params![now.to_rfc3339(), limit],
        )
    }

    /// All pending posts, ascending by scheduled time.
    pub fn list_pending(&self) -> Result<Vec<Post>> {
        self.query_posts(
            "SELECT * FROM posts WHERE posted = 0 ORDER BY scheduled_time",
            [],
        )
    }

    /// Close a post after fan-out. The `posted = 0` guard keeps the
    /// transition monotonic: a post already delivered is never re-stamped.
    pub fn mark_delivered(
        &self,
        id: i64,
        success_count: u32,
        delivered_at: DateTime<Utc>,
    ) -> Result<()> {
        self.lock()?
            .execute(
                "UPDATE posts SET posted = 1, posted_at = ?1, successful_sends = ?2
                 WHERE id = ?3 AND posted = 0",
                rusqlite::params![delivered_at.to_rfc3339(), success_count, id],
            )
            .map_err(store_err)?;
        Ok(())
    }

    /// Delete a post by id. Returns whether a row was removed.
    pub fn delete(&self, id: i64) -> Result<bool> {
        let n = self
            .lock()?
            .execute("DELETE FROM posts WHERE id = ?1", [id])
            .map_err(store_err)?;
        Ok(n > 0)
    }

    /// Remove delivered posts older than `cutoff`. Pending posts are never
    /// touched regardless of age. Returns the number removed.
    pub fn purge_delivered_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.lock()?;
        let removed = conn
            .execute(
                "DELETE FROM posts WHERE posted = 1 AND posted_at < ?1",
                [cutoff.to_rfc3339()],
            )
            .map_err(store_err)?;
        if removed > 0 {
            conn.execute_batch("VACUUM").map_err(store_err)?;
        }
        Ok(removed)
    }

    /// Delete all pending posts (operator reset). Returns the count removed.
    pub fn clear_pending(&self) -> Result<usize> {
        self.lock()?
            .execute("DELETE FROM posts WHERE posted = 0", [])
            .map_err(store_err)
    }

    /// Post counters plus on-disk size.
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.lock()?;
        let count = |sql: &str| -> Result<u64> {
            conn.query_row(sql, [], |r| r.get::<_, i64>(0))
                .map(|n| n as u64)
                .map_err(store_err)
        };
        let total = count("SELECT COUNT(*) FROM posts")?;
        let pending = count("SELECT COUNT(*) FROM posts WHERE posted = 0")?;
        let delivered = count("SELECT COUNT(*) FROM posts WHERE posted = 1")?;
        let db_size_bytes = count(
            "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
        )?;
        Ok(StoreStats { total, pending, delivered, db_size_bytes })
    }

    fn query_posts<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<Post>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql).map_err(store_err)?;
        let rows = stmt
            .query_map(params, row_to_post)
            .map_err(store_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(store_err)?;
        Ok(rows)
    }

    // ─── Destinations ──────────────────────────────────────

    /// Register a destination, or reactivate it if it was soft-deleted.
    /// An existing active destination keeps its name unless a new one is
    /// given.
    pub fn add_or_reactivate(&self, id: &str, name: Option<&str>) -> Result<()> {
        self.lock()?
            .execute(
                "INSERT INTO destinations (destination_id, name, active, added_at)
                 VALUES (?1, ?2, 1, ?3)
                 ON CONFLICT(destination_id) DO UPDATE SET
                     active = 1,
                     name = COALESCE(excluded.name, destinations.name)",
                rusqlite::params![id, name, Utc::now().to_rfc3339()],
            )
            .map_err(store_err)?;
        Ok(())
    }

    /// Soft-delete a destination. Returns whether it existed and was active.
    pub fn deactivate(&self, id: &str) -> Result<bool> {
        let n = self
            .lock()?
            .execute(
                "UPDATE destinations SET active = 0
                 WHERE destination_id = ?1 AND active = 1",
                [id],
            )
            .map_err(store_err)?;
        Ok(n > 0)
    }

    /// The live fan-out set: every destination with `active = 1`, read at
    /// dispatch time.
    pub fn active_destinations(&self) -> Result<Vec<Destination>> {
        self.query_destinations("SELECT * FROM destinations WHERE active = 1 ORDER BY added_at")
    }

    /// Every destination, active or not, newest first.
    pub fn all_destinations(&self) -> Result<Vec<Destination>> {
        self.query_destinations("SELECT * FROM destinations ORDER BY added_at DESC")
    }

    pub fn active_destination_count(&self) -> Result<u32> {
        self.lock()?
            .query_row(
                "SELECT COUNT(*) FROM destinations WHERE active = 1",
                [],
                |r| r.get::<_, i64>(0),
            )
            .map(|n| n as u32)
            .map_err(store_err)
    }

    fn query_destinations(&self, sql: &str) -> Result<Vec<Destination>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql).map_err(store_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Destination {
                    id: row.get("destination_id")?,
                    name: row.get("name")?,
                    active: row.get::<_, i64>("active")? != 0,
                    added_at: parse_utc(row.get::<_, String>("added_at")?)?,
                })
            })
            .map_err(store_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(store_err)?;
        Ok(rows)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| PostcastError::Store(format!("connection lock poisoned: {e}")))
    }
}

fn row_to_post(row: &rusqlite::Row<'_>) -> rusqlite::Result<Post> {
    let message: Option<String> = row.get("message")?;
    let media_type: Option<String> = row.get("media_type")?;
    let payload = match media_type.as_deref().and_then(MediaKind::parse) {
        Some(kind) => PostPayload::Media {
            kind,
            file_id: row.get::<_, Option<String>>("media_file_id")?.unwrap_or_default(),
            caption: row.get("caption")?,
        },
        None => PostPayload::Text(message.unwrap_or_default()),
    };
    let posted: i64 = row.get("posted")?;
    let state = if posted != 0 {
        DeliveryState::Delivered
    } else {
        DeliveryState::Pending
    };
    Ok(Post {
        id: row.get("id")?,
        payload,
        scheduled_at: parse_utc(row.get::<_, String>("scheduled_time")?)?,
        state,
        destination_count: row.get::<_, i64>("total_destinations")? as u32,
        success_count: if posted != 0 {
            Some(row.get::<_, i64>("successful_sends")? as u32)
        } else {
            None
        },
        delivered_at: row
            .get::<_, Option<String>>("posted_at")?
            .map(parse_utc)
            .transpose()?,
        created_at: parse_utc(row.get::<_, String>("created_at")?)?,
    })
}

/// A timestamp that does not parse is a corrupt row; surfacing it beats
/// inventing a time that could make the post due immediately.
fn parse_utc(s: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn store_err(e: impl std::fmt::Display) -> PostcastError {
    PostcastError::Store(e.to_string())
}
