use crate::database::{self, SharedConnection};
use crate::error::AppError;
use crate::models::QueueEntry;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::atomic::{AtomicBool, Ordering};

pub const PRIMARY_QUEUE_NAME: &str = "obs-queue";
pub const DEPENDENT_QUEUE_NAME: &str = "obs-dependant-queue";

const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// A queue entry as persisted, with its bookkeeping columns
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntry {
    /// Row id, stable while the entry stays queued
    pub id: i64,
    pub entry: QueueEntry,
    /// Epoch ms of the push
    pub created_at: i64,
    pub attempts: u32,
}

/// Appends at the tail. Takes a plain connection so batches can share a transaction.
pub fn push_entry(conn: &Connection, queue_name: &str, entry: &QueueEntry) -> Result<(), AppError> {
    let text = serde_json::to_string(entry)?;
    conn.execute(
        "INSERT INTO request_queue (queue_name, position, created_at, attempts, entry)
         SELECT ?1, COALESCE(MAX(position), 0) + 1, ?2, 0, ?3
         FROM request_queue WHERE queue_name = ?1",
        params![queue_name, Utc::now().timestamp_millis(), text],
    )?;
    Ok(())
}

fn read_head(conn: &Connection, queue_name: &str) -> Result<Option<StoredEntry>, AppError> {
    let row: Option<(i64, i64, u32, String)> = conn
        .query_row(
            "SELECT id, created_at, attempts, entry FROM request_queue
             WHERE queue_name = ?1 ORDER BY position ASC LIMIT 1",
            params![queue_name],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .optional()?;

    let Some((id, created_at, attempts, text)) = row else {
        return Ok(None);
    };
    let entry: QueueEntry = serde_json::from_str(&text)?;
    Ok(Some(StoredEntry {
        id,
        entry,
        created_at,
        attempts,
    }))
}

fn delete_row(conn: &Connection, id: i64) -> Result<(), AppError> {
    conn.execute("DELETE FROM request_queue WHERE id = ?1", params![id])?;
    Ok(())
}

/// A persistent FIFO request queue with a per-queue in-progress flag
pub struct RequestQueue {
    name: String,
    db: SharedConnection,
    max_retention_ms: i64,
    sync_in_progress: AtomicBool,
}

/// Clears the in-progress flag when the drain ends, however it ends
pub struct SyncGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

impl RequestQueue {
    pub fn new(name: impl Into<String>, db: SharedConnection, max_retention_days: i64) -> Self {
        Self {
            name: name.into(),
            db,
            max_retention_ms: max_retention_days.saturating_mul(MS_PER_DAY),
            sync_in_progress: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn push(&self, entry: &QueueEntry) -> Result<(), AppError> {
        let conn = database::lock(&self.db)?;
        push_entry(&conn, &self.name, entry)?;
        log::debug!("[queue={}] pushed '{}'", self.name, entry.describe());
        Ok(())
    }

    /// Returns the oldest entry without removing it. Entries past the
    /// retention ceiling are dropped on the way.
    pub fn peek(&self) -> Result<Option<StoredEntry>, AppError> {
        let conn = database::lock(&self.db)?;
        loop {
            let Some(stored) = read_head(&conn, &self.name)? else {
                return Ok(None);
            };
            let age_ms = Utc::now().timestamp_millis() - stored.created_at;
            if age_ms > self.max_retention_ms {
                log::warn!(
                    "[queue={}] dropping '{}' for uuid={}, it exceeded the retention time",
                    self.name,
                    stored.entry.describe(),
                    stored.entry.metadata.obs_uuid
                );
                delete_row(&conn, stored.id)?;
                continue;
            }
            return Ok(Some(stored));
        }
    }

    /// Removes an entry once it has been dealt with
    pub fn remove(&self, stored: &StoredEntry) -> Result<(), AppError> {
        let conn = database::lock(&self.db)?;
        delete_row(&conn, stored.id)
    }

    /// Counts a failed send against an entry that stays at the head
    pub fn record_failed_attempt(&self, stored: &mut StoredEntry) -> Result<(), AppError> {
        stored.attempts += 1;
        let conn = database::lock(&self.db)?;
        conn.execute(
            "UPDATE request_queue SET attempts = ?1 WHERE id = ?2",
            params![stored.attempts, stored.id],
        )?;
        Ok(())
    }

    pub fn len(&self) -> Result<usize, AppError> {
        let conn = database::lock(&self.db)?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM request_queue WHERE queue_name = ?1",
            params![self.name],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    pub fn is_empty(&self) -> Result<bool, AppError> {
        Ok(self.len()? == 0)
    }

    /// All entries in replay order, without removing them
    pub fn entries(&self) -> Result<Vec<QueueEntry>, AppError> {
        let conn = database::lock(&self.db)?;
        let mut stmt = conn.prepare(
            "SELECT entry FROM request_queue WHERE queue_name = ?1 ORDER BY position ASC",
        )?;
        let rows = stmt
            .query_map(params![self.name], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<String>, _>>()?;

        let mut entries = Vec::with_capacity(rows.len());
        for text in rows {
            entries.push(serde_json::from_str(&text)?);
        }
        Ok(entries)
    }

    pub fn is_sync_in_progress(&self) -> bool {
        self.sync_in_progress.load(Ordering::SeqCst)
    }

    /// `None` while another drain holds the flag
    pub fn try_begin_sync(&self) -> Option<SyncGuard<'_>> {
        if self.sync_in_progress.swap(true, Ordering::SeqCst) {
            return None;
        }
        Some(SyncGuard {
            flag: &self.sync_in_progress,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HttpMethod, QueuedRequest};

    fn entry(uuid: &str, n: i64) -> QueueEntry {
        QueueEntry::new(
            uuid,
            Some(n),
            QueuedRequest::bare(HttpMethod::Delete, format!("https://api.test/observations/{}", n)),
        )
    }

    fn queue() -> RequestQueue {
        RequestQueue::new(PRIMARY_QUEUE_NAME, database::open_in_memory().unwrap(), 365)
    }

    fn take(q: &RequestQueue) -> Option<StoredEntry> {
        let head = q.peek().unwrap()?;
        q.remove(&head).unwrap();
        Some(head)
    }

    #[test]
    fn test_fifo_order() {
        let q = queue();
        q.push(&entry("a", 1)).unwrap();
        q.push(&entry("b", 2)).unwrap();
        q.push(&entry("c", 3)).unwrap();

        assert_eq!(q.len().unwrap(), 3);
        assert_eq!(take(&q).unwrap().entry, entry("a", 1));
        assert_eq!(take(&q).unwrap().entry, entry("b", 2));
        assert_eq!(take(&q).unwrap().entry, entry("c", 3));
        assert!(take(&q).is_none());
    }

    #[test]
    fn test_peek_leaves_entry_in_place() {
        let q = queue();
        q.push(&entry("a", 1)).unwrap();
        q.push(&entry("b", 2)).unwrap();

        let mut head = q.peek().unwrap().unwrap();
        q.record_failed_attempt(&mut head).unwrap();
        assert_eq!(head.attempts, 1);

        // a reader that never removes it, like a crashed drain, sees it again
        let again = q.peek().unwrap().unwrap();
        assert_eq!(again.id, head.id);
        assert_eq!(again.attempts, 1);
        assert_eq!(again.created_at, head.created_at);
        assert_eq!(q.entries().unwrap(), vec![entry("a", 1), entry("b", 2)]);
    }

    #[test]
    fn test_queues_are_separate() {
        let db = database::open_in_memory().unwrap();
        let primary = RequestQueue::new(PRIMARY_QUEUE_NAME, db.clone(), 365);
        let dependent = RequestQueue::new(DEPENDENT_QUEUE_NAME, db, 365);
        primary.push(&entry("a", 1)).unwrap();

        assert_eq!(primary.len().unwrap(), 1);
        assert!(dependent.is_empty().unwrap());
        assert!(dependent.peek().unwrap().is_none());
    }

    #[test]
    fn test_expired_entries_are_dropped() {
        let q = queue();
        q.push(&entry("old", 1)).unwrap();
        q.push(&entry("fresh", 2)).unwrap();
        {
            let conn = database::lock(&q.db).unwrap();
            conn.execute(
                "UPDATE request_queue SET created_at = ?1 WHERE position = 1",
                params![Utc::now().timestamp_millis() - 400 * MS_PER_DAY],
            )
            .unwrap();
        }

        assert_eq!(q.len().unwrap(), 2);
        assert_eq!(q.peek().unwrap().unwrap().entry, entry("fresh", 2));
        assert_eq!(q.len().unwrap(), 1);
    }

    #[test]
    fn test_sync_guard_is_exclusive() {
        let q = queue();
        let guard = q.try_begin_sync();
        assert!(guard.is_some());
        assert!(q.is_sync_in_progress());
        assert!(q.try_begin_sync().is_none());
        drop(guard);
        assert!(!q.is_sync_in_progress());
        assert!(q.try_begin_sync().is_some());
    }
}
