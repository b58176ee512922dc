//! Core Store implementation
//!
//! One SQLite database holds four tables: `ready` (per-agent priority
//! queues), `reservations` (in-flight leases), `dlq` (dead letters),
//! and `liveness` (TTL-expiring agent records). Mutating operations use
//! IMMEDIATE transactions so concurrent writers from other processes
//! serialize at the database instead of racing.

use std::fs;
use std::path::Path;

use eyre::{Context, Result};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS ready (
    seq          INTEGER PRIMARY KEY AUTOINCREMENT,
    message_id   TEXT NOT NULL UNIQUE,
    agent_key    TEXT NOT NULL,
    priority     INTEGER NOT NULL,
    available_at INTEGER NOT NULL,
    body         TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_ready_pop ON ready (agent_key, priority DESC, seq ASC);

CREATE TABLE IF NOT EXISTS reservations (
    token       TEXT PRIMARY KEY,
    message_id  TEXT NOT NULL UNIQUE,
    agent_key   TEXT NOT NULL,
    priority    INTEGER NOT NULL,
    reserved_at INTEGER NOT NULL,
    deadline    INTEGER NOT NULL,
    body        TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_reservations_deadline ON reservations (deadline);

CREATE TABLE IF NOT EXISTS dlq (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    message_id TEXT NOT NULL,
    agent_key  TEXT NOT NULL,
    error      TEXT NOT NULL,
    failed_at  INTEGER NOT NULL,
    body       TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_dlq_agent ON dlq (agent_key);

CREATE TABLE IF NOT EXISTS liveness (
    agent_key  TEXT PRIMARY KEY,
    record     TEXT NOT NULL,
    degraded   INTEGER NOT NULL DEFAULT 0,
    expires_at INTEGER NOT NULL
);
";

/// A message sitting in a ready queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyEntry {
    pub seq: i64,
    pub message_id: String,
    pub agent_key: String,
    pub priority: i64,
    pub available_at: i64,
    pub body: String,
}

/// A message under a time-bounded reservation lease
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservedMessage {
    pub token: String,
    pub message_id: String,
    pub agent_key: String,
    pub priority: i64,
    pub reserved_at: i64,
    pub deadline: i64,
    pub body: String,
}

/// A dead-lettered message, retained for inspection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqEntry {
    pub message_id: String,
    pub agent_key: String,
    pub error: String,
    pub failed_at: i64,
    pub body: String,
}

/// A liveness record with its TTL expiry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessRow {
    pub agent_key: String,
    pub record: String,
    pub degraded: bool,
    pub expires_at: i64,
}

/// Ready-queue depth for one agent/priority pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueDepth {
    pub agent_key: String,
    pub priority: i64,
    pub depth: u64,
}

/// The shared coordination store
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create a store at the given database path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create store directory")?;
        }
        let conn = Connection::open(path).context("Failed to open store database")?;
        Self::init(conn, Some(path))
    }

    /// Open an in-memory store (single-process, mostly for tests)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory store")?;
        Self::init(conn, None)
    }

    fn init(conn: Connection, path: Option<&Path>) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "busy_timeout", 5000)?;
        conn.execute_batch(SCHEMA).context("Failed to create store schema")?;
        if let Some(path) = path {
            debug!(path = %path.display(), "Opened store");
        }
        Ok(Self { conn })
    }

    // === Queue operations ===

    /// Enqueue a message body for an agent, returning its FIFO sequence
    ///
    /// `available_at` gates visibility: a message is not poppable before
    /// that timestamp, which is how retry backoff delays are expressed.
    pub fn enqueue(
        &mut self,
        agent_key: &str,
        message_id: &str,
        priority: i64,
        available_at: i64,
        body: &str,
    ) -> Result<i64> {
        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO ready (message_id, agent_key, priority, available_at, body)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![message_id, agent_key, priority, available_at, body],
        )?;
        let seq = tx.last_insert_rowid();
        tx.commit()?;
        debug!(%agent_key, %message_id, priority, seq, "enqueue: queued");
        Ok(seq)
    }

    /// Atomically claim the best ready message and lease it
    ///
    /// Selects the highest-priority, oldest-enqueued entry whose
    /// `available_at` has passed, removes it from the ready queue, and
    /// creates a reservation with `deadline = now + visibility_timeout`.
    /// The claim and the lease commit in one transaction, so no two
    /// callers can receive the same message while a lease is live.
    pub fn pop_ready(
        &mut self,
        agent_key: &str,
        now: i64,
        visibility_timeout_ms: i64,
    ) -> Result<Option<ReservedMessage>> {
        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let row = tx
            .query_row(
                "SELECT seq, message_id, priority, body FROM ready
                 WHERE agent_key = ?1 AND available_at <= ?2
                 ORDER BY priority DESC, seq ASC LIMIT 1",
                params![agent_key, now],
                |r| {
                    Ok((
                        r.get::<_, i64>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, i64>(2)?,
                        r.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((seq, message_id, priority, body)) = row else {
            return Ok(None);
        };

        tx.execute("DELETE FROM ready WHERE seq = ?1", params![seq])?;

        let token = Uuid::now_v7().to_string();
        let deadline = now + visibility_timeout_ms;
        tx.execute(
            "INSERT INTO reservations (token, message_id, agent_key, priority, reserved_at, deadline, body)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![token, message_id, agent_key, priority, now, deadline, body],
        )?;
        tx.commit()?;

        debug!(%agent_key, %message_id, %token, deadline, "pop_ready: reserved");
        Ok(Some(ReservedMessage {
            token,
            message_id,
            agent_key: agent_key.to_string(),
            priority,
            reserved_at: now,
            deadline,
            body,
        }))
    }

    /// Look up a live reservation without consuming it
    pub fn get_reserved(&self, token: &str, now: i64) -> Result<Option<ReservedMessage>> {
        let row = self
            .conn
            .query_row(
                "SELECT token, message_id, agent_key, priority, reserved_at, deadline, body
                 FROM reservations WHERE token = ?1 AND deadline > ?2",
                params![token, now],
                Self::reservation_from_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Acknowledge a reservation: remove the lease and the message forever
    ///
    /// Returns false for unknown or expired tokens, including a second
    /// ack on an already-acked token.
    pub fn ack(&mut self, token: &str, now: i64) -> Result<bool> {
        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let deleted = tx.execute(
            "DELETE FROM reservations WHERE token = ?1 AND deadline > ?2",
            params![token, now],
        )?;
        tx.commit()?;
        debug!(%token, acked = deleted == 1, "ack");
        Ok(deleted == 1)
    }

    /// Move a live reservation back to the ready queue with a new body
    ///
    /// The new body carries the caller's mutations (attempt count); the
    /// message keeps its original priority. Returns false if the token
    /// is unknown or expired - the caller must not assume anything moved.
    pub fn requeue_reserved(&mut self, token: &str, now: i64, body: &str, available_at: i64) -> Result<bool> {
        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let row = tx
            .query_row(
                "SELECT message_id, agent_key, priority FROM reservations
                 WHERE token = ?1 AND deadline > ?2",
                params![token, now],
                |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?, r.get::<_, i64>(2)?)),
            )
            .optional()?;

        let Some((message_id, agent_key, priority)) = row else {
            return Ok(false);
        };

        tx.execute("DELETE FROM reservations WHERE token = ?1", params![token])?;
        tx.execute(
            "INSERT INTO ready (message_id, agent_key, priority, available_at, body)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![message_id, agent_key, priority, available_at, body],
        )?;
        tx.commit()?;
        debug!(%token, %message_id, available_at, "requeue_reserved: back in queue");
        Ok(true)
    }

    /// Move a live reservation to the dead-letter queue
    ///
    /// Returns false if the token is unknown or expired.
    pub fn dead_letter_reserved(&mut self, token: &str, now: i64, body: &str, error: &str) -> Result<bool> {
        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let row = tx
            .query_row(
                "SELECT message_id, agent_key FROM reservations
                 WHERE token = ?1 AND deadline > ?2",
                params![token, now],
                |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)),
            )
            .optional()?;

        let Some((message_id, agent_key)) = row else {
            return Ok(false);
        };

        tx.execute("DELETE FROM reservations WHERE token = ?1", params![token])?;
        tx.execute(
            "INSERT INTO dlq (message_id, agent_key, error, failed_at, body)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![message_id, agent_key, error, now, body],
        )?;
        tx.commit()?;
        info!(%message_id, %agent_key, %error, "dead_letter_reserved: message dead-lettered");
        Ok(true)
    }

    /// Reclaim reservations whose deadline has elapsed
    ///
    /// Each expired reservation is deleted and its message re-enqueued
    /// at its original priority, immediately available. The whole sweep
    /// is one transaction, so concurrent callers reclaim each expired
    /// entry exactly once - the race loser sees nothing to reclaim.
    pub fn reclaim_expired(&mut self, agent_key: Option<&str>, now: i64) -> Result<Vec<String>> {
        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let expired: Vec<(String, String, String, i64, String)> = {
            let mut stmt = tx.prepare(
                "SELECT token, message_id, agent_key, priority, body FROM reservations
                 WHERE deadline <= ?1 AND (?2 IS NULL OR agent_key = ?2)",
            )?;
            let rows = stmt.query_map(params![now, agent_key], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, i64>(3)?,
                    r.get::<_, String>(4)?,
                ))
            })?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            out
        };

        let mut reclaimed = Vec::new();
        for (token, message_id, key, priority, body) in expired {
            let deleted = tx.execute("DELETE FROM reservations WHERE token = ?1", params![token])?;
            if deleted == 0 {
                continue;
            }
            tx.execute(
                "INSERT INTO ready (message_id, agent_key, priority, available_at, body)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![message_id, key, priority, now, body],
            )?;
            reclaimed.push(message_id);
        }
        tx.commit()?;

        if !reclaimed.is_empty() {
            info!(count = reclaimed.len(), "reclaim_expired: requeued expired reservations");
        }
        Ok(reclaimed)
    }

    // === Inspection ===

    /// Ready-queue depths grouped by agent and priority
    pub fn queue_depths(&self) -> Result<Vec<QueueDepth>> {
        let mut stmt = self.conn.prepare(
            "SELECT agent_key, priority, COUNT(*) FROM ready
             GROUP BY agent_key, priority ORDER BY agent_key, priority DESC",
        )?;
        let rows = stmt.query_map([], |r| {
            Ok(QueueDepth {
                agent_key: r.get(0)?,
                priority: r.get(1)?,
                depth: r.get::<_, i64>(2)? as u64,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Ready-queue depths for one agent, by priority
    pub fn queue_depths_for(&self, agent_key: &str) -> Result<Vec<(i64, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT priority, COUNT(*) FROM ready WHERE agent_key = ?1
             GROUP BY priority ORDER BY priority DESC",
        )?;
        let rows = stmt.query_map(params![agent_key], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)? as u64)))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// List ready entries, optionally filtered by agent
    pub fn list_ready(&self, agent_key: Option<&str>, limit: usize) -> Result<Vec<ReadyEntry>> {
        let sql = "SELECT seq, message_id, agent_key, priority, available_at, body FROM ready
                   WHERE (?1 IS NULL OR agent_key = ?1)
                   ORDER BY agent_key, priority DESC, seq ASC LIMIT ?2";
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params![agent_key, limit as i64], |r| {
            Ok(ReadyEntry {
                seq: r.get(0)?,
                message_id: r.get(1)?,
                agent_key: r.get(2)?,
                priority: r.get(3)?,
                available_at: r.get(4)?,
                body: r.get(5)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// List reservations, optionally filtered by agent
    pub fn list_reservations(&self, agent_key: Option<&str>) -> Result<Vec<ReservedMessage>> {
        let sql = "SELECT token, message_id, agent_key, priority, reserved_at, deadline, body
                   FROM reservations WHERE (?1 IS NULL OR agent_key = ?1) ORDER BY deadline ASC";
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params![agent_key], Self::reservation_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Number of live reservations, optionally filtered by agent
    pub fn reservation_count(&self, agent_key: Option<&str>) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM reservations WHERE (?1 IS NULL OR agent_key = ?1)",
            params![agent_key],
            |r| r.get(0),
        )?;
        Ok(count as u64)
    }

    /// Dead-letter queue length, optionally filtered by agent
    pub fn dlq_len(&self, agent_key: Option<&str>) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM dlq WHERE (?1 IS NULL OR agent_key = ?1)",
            params![agent_key],
            |r| r.get(0),
        )?;
        Ok(count as u64)
    }

    /// Dead-letter depths grouped by agent
    pub fn dlq_depths(&self) -> Result<Vec<(String, u64)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT agent_key, COUNT(*) FROM dlq GROUP BY agent_key ORDER BY agent_key")?;
        let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)? as u64)))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// List dead letters, newest first
    pub fn list_dlq(&self, agent_key: Option<&str>, limit: usize) -> Result<Vec<DlqEntry>> {
        let sql = "SELECT message_id, agent_key, error, failed_at, body FROM dlq
                   WHERE (?1 IS NULL OR agent_key = ?1) ORDER BY id DESC LIMIT ?2";
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params![agent_key, limit as i64], |r| {
            Ok(DlqEntry {
                message_id: r.get(0)?,
                agent_key: r.get(1)?,
                error: r.get(2)?,
                failed_at: r.get(3)?,
                body: r.get(4)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    // === Liveness ===

    /// Write or refresh a liveness record with its TTL expiry
    pub fn put_liveness(&mut self, agent_key: &str, record: &str, degraded: bool, expires_at: i64) -> Result<()> {
        self.conn.execute(
            "INSERT INTO liveness (agent_key, record, degraded, expires_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(agent_key) DO UPDATE SET record = ?2, degraded = ?3, expires_at = ?4",
            params![agent_key, record, degraded, expires_at],
        )?;
        Ok(())
    }

    /// Read an unexpired liveness record
    pub fn get_liveness(&self, agent_key: &str, now: i64) -> Result<Option<LivenessRow>> {
        let row = self
            .conn
            .query_row(
                "SELECT agent_key, record, degraded, expires_at FROM liveness
                 WHERE agent_key = ?1 AND expires_at > ?2",
                params![agent_key, now],
                Self::liveness_from_row,
            )
            .optional()?;
        Ok(row)
    }

    /// List unexpired liveness records, optionally for one agent kind
    ///
    /// Kind filtering matches the `kind:` prefix of the agent key.
    pub fn list_alive(&self, kind: Option<&str>, now: i64) -> Result<Vec<LivenessRow>> {
        let pattern = kind.map(|k| format!("{}:%", k));
        let mut stmt = self.conn.prepare(
            "SELECT agent_key, record, degraded, expires_at FROM liveness
             WHERE expires_at > ?1 AND (?2 IS NULL OR agent_key LIKE ?2)
             ORDER BY agent_key",
        )?;
        let rows = stmt.query_map(params![now, pattern], Self::liveness_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Flip the degraded flag without extending the record's TTL
    ///
    /// Returns false if no record exists for the agent.
    pub fn set_degraded(&mut self, agent_key: &str, degraded: bool) -> Result<bool> {
        let updated = self.conn.execute(
            "UPDATE liveness SET degraded = ?2 WHERE agent_key = ?1",
            params![agent_key, degraded],
        )?;
        Ok(updated == 1)
    }

    /// Remove a liveness record immediately
    pub fn remove_liveness(&mut self, agent_key: &str) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM liveness WHERE agent_key = ?1", params![agent_key])?;
        Ok(deleted == 1)
    }

    /// Delete liveness records whose TTL has elapsed
    pub fn purge_expired(&mut self, now: i64) -> Result<usize> {
        let deleted = self
            .conn
            .execute("DELETE FROM liveness WHERE expires_at <= ?1", params![now])?;
        if deleted > 0 {
            debug!(deleted, "purge_expired: removed expired liveness records");
        }
        Ok(deleted)
    }

    // === Row mappers ===

    fn reservation_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<ReservedMessage> {
        Ok(ReservedMessage {
            token: r.get(0)?,
            message_id: r.get(1)?,
            agent_key: r.get(2)?,
            priority: r.get(3)?,
            reserved_at: r.get(4)?,
            deadline: r.get(5)?,
            body: r.get(6)?,
        })
    }

    fn liveness_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<LivenessRow> {
        Ok(LivenessRow {
            agent_key: r.get(0)?,
            record: r.get(1)?,
            degraded: r.get(2)?,
            expires_at: r.get(3)?,
        })
    }
}
