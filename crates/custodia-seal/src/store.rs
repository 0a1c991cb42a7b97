//! Persistent audit storage: the [`AuditSink`] seam and its SQLite
//! implementation.
//!
//! The store is append-only. Sealed events and Merkle batches are inserted
//! and never updated; integrity verification reads rows back in insertion
//! order and replays the chain.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;
use uuid::Uuid;

use custodia_types::{ActorIdentity, CustodiaError, Severity};

use crate::chain::{verify_chain, ChainReport};
use crate::merkle::MerkleBatch;
use crate::sealed::{EncryptedPayload, SealedEvent, GENESIS_HASH};

/// Where sealed events and Merkle batches go. Assumed durable and
/// append-only.
pub trait AuditSink: Send {
    /// Persist one sealed event.
    fn append(&mut self, event: &SealedEvent) -> Result<(), CustodiaError>;

    /// Persist one Merkle batch record.
    fn append_batch(&mut self, batch: &MerkleBatch) -> Result<(), CustodiaError>;
}

/// Append-only SQLite audit store (WAL mode).
pub struct SqliteAuditStore {
    conn: Connection,
}

impl SqliteAuditStore {
    /// Open (or create) the audit store at the given path.
    pub fn open(path: &Path) -> Result<Self, CustodiaError> {
        let conn = Connection::open(path)
            .map_err(|e| CustodiaError::Store(format!("failed to open database: {e}")))?;
        Self::init(conn)
    }

    /// Open an in-memory store, useful for tests and ephemeral pipelines.
    pub fn open_memory() -> Result<Self, CustodiaError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| CustodiaError::Store(format!("failed to open in-memory db: {e}")))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, CustodiaError> {
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| CustodiaError::Store(format!("failed to set WAL mode: {e}")))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS audit_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id TEXT NOT NULL UNIQUE,
                timestamp TEXT NOT NULL,
                principal TEXT,
                address TEXT,
                role TEXT,
                session TEXT,
                resource TEXT NOT NULL,
                action TEXT NOT NULL,
                category TEXT NOT NULL,
                severity TEXT NOT NULL,
                metadata TEXT NOT NULL,
                payload_nonce TEXT,
                payload_ciphertext TEXT,
                nonce TEXT NOT NULL,
                prev_hash TEXT NOT NULL,
                event_hash TEXT NOT NULL,
                algorithm TEXT NOT NULL,
                signature TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_events_timestamp ON audit_events(timestamp);
            CREATE INDEX IF NOT EXISTS idx_events_principal ON audit_events(principal);
            CREATE INDEX IF NOT EXISTS idx_events_category ON audit_events(category);
            CREATE INDEX IF NOT EXISTS idx_events_severity ON audit_events(severity);

            CREATE TABLE IF NOT EXISTS merkle_batches (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                batch_id TEXT NOT NULL UNIQUE,
                root TEXT NOT NULL,
                size INTEGER NOT NULL,
                member_ids TEXT NOT NULL,
                created_at TEXT NOT NULL
            );",
        )
        .map_err(|e| CustodiaError::Store(format!("failed to create schema: {e}")))?;

        let store = Self { conn };
        info!(latest_hash = %store.latest_hash()?, "audit store opened");
        Ok(store)
    }

    /// The chain tip: the last stored event hash, or the genesis sentinel
    /// for an empty store.
    pub fn latest_hash(&self) -> Result<String, CustodiaError> {
        self.conn
            .query_row(
                "SELECT event_hash FROM audit_events ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| CustodiaError::Store(format!("failed to read chain tip: {e}")))
            .map(|hash| hash.unwrap_or_else(|| GENESIS_HASH.to_string()))
    }

    /// Number of stored events.
    pub fn count(&self) -> Result<usize, CustodiaError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM audit_events", [], |row| row.get(0))
            .map_err(|e| CustodiaError::Store(format!("count failed: {e}")))?;
        Ok(count as usize)
    }

    /// The most recent `n` events, oldest first.
    pub fn query_last(&self, n: usize) -> Result<Vec<SealedEvent>, CustodiaError> {
        let mut events = self.load_where(
            "SELECT * FROM (SELECT * FROM audit_events ORDER BY id DESC LIMIT ?1)
             ORDER BY id ASC",
            params![n as i64],
        )?;
        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }

    /// All events in insertion order.
    pub fn load_all(&self) -> Result<Vec<SealedEvent>, CustodiaError> {
        self.load_where("SELECT * FROM audit_events ORDER BY id ASC", params![])
    }

    /// Events with 1-based sequence numbers in `[from, to]`, insertion order.
    pub fn load_range(&self, from: u64, to: u64) -> Result<Vec<SealedEvent>, CustodiaError> {
        self.load_where(
            "SELECT * FROM audit_events WHERE id >= ?1 AND id <= ?2 ORDER BY id ASC",
            params![from as i64, to as i64],
        )
    }

    /// Verify the full hash chain from genesis.
    pub fn verify_integrity(&self) -> Result<ChainReport, CustodiaError> {
        let events = self.load_all()?;
        Ok(verify_chain(&events, GENESIS_HASH))
    }

    /// Verify the chain segment with sequence numbers in `[from, to]`.
    ///
    /// The first event's stored `prev_hash` is used as the trusted anchor,
    /// so this checks internal linkage and per-event hash integrity of the
    /// segment.
    pub fn verify_range(&self, from: u64, to: u64) -> Result<ChainReport, CustodiaError> {
        let events = self.load_range(from, to)?;
        let anchor = match events.first() {
            Some(first) => first.prev_hash.clone(),
            None => GENESIS_HASH.to_string(),
        };
        Ok(verify_chain(&events, &anchor))
    }

    /// Load a stored Merkle batch by id.
    pub fn load_merkle_batch(&self, batch_id: &Uuid) -> Result<Option<MerkleBatch>, CustodiaError> {
        self.conn
            .query_row(
                "SELECT batch_id, root, size, member_ids, created_at
                 FROM merkle_batches WHERE batch_id = ?1",
                params![batch_id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| CustodiaError::Store(format!("failed to load batch: {e}")))?
            .map(|(id, root, size, member_ids, created_at)| {
                Ok(MerkleBatch {
                    batch_id: parse_uuid(&id)?,
                    root,
                    size: size as usize,
                    member_ids: serde_json::from_str(&member_ids).map_err(|e| {
                        CustodiaError::Store(format!("bad member_ids json: {e}"))
                    })?,
                    created_at: parse_timestamp(&created_at)?,
                })
            })
            .transpose()
    }

    /// Number of stored Merkle batches.
    pub fn batch_count(&self) -> Result<usize, CustodiaError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM merkle_batches", [], |row| row.get(0))
            .map_err(|e| CustodiaError::Store(format!("batch count failed: {e}")))?;
        Ok(count as usize)
    }

    /// Re-verify a stored Merkle batch against the canonical event rows.
    ///
    /// Returns false if the batch is unknown, any member is missing, or the
    /// recomputed root no longer matches.
    pub fn verify_merkle_batch(&self, batch_id: &Uuid) -> Result<bool, CustodiaError> {
        let Some(batch) = self.load_merkle_batch(batch_id)? else {
            return Ok(false);
        };

        let mut members = Vec::with_capacity(batch.member_ids.len());
        for member_id in &batch.member_ids {
            let Some(event) = self.load_event(member_id)? else {
                return Ok(false);
            };
            members.push(event);
        }

        Ok(batch.verify(&members))
    }

    /// Load one event by its event id.
    pub fn load_event(&self, event_id: &Uuid) -> Result<Option<SealedEvent>, CustodiaError> {
        let mut events = self.load_where(
            "SELECT * FROM audit_events WHERE event_id = ?1",
            params![event_id.to_string()],
        )?;
        Ok(events.pop())
    }

    /// Event counts grouped by severity, for compliance reporting.
    pub fn count_by_severity(&self) -> Result<Vec<(String, usize)>, CustodiaError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT severity, COUNT(*) FROM audit_events
                 GROUP BY severity ORDER BY COUNT(*) DESC",
            )
            .map_err(|e| CustodiaError::Store(format!("failed to prepare query: {e}")))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
            })
            .map_err(|e| CustodiaError::Store(format!("severity query failed: {e}")))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| CustodiaError::Store(format!("failed to read severity row: {e}")))
    }

    fn load_where(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<SealedEvent>, CustodiaError> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| CustodiaError::Store(format!("failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map(params, row_to_tuple)
            .map_err(|e| CustodiaError::Store(format!("failed to query events: {e}")))?;

        let raw: Vec<RawEventRow> = rows
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CustodiaError::Store(format!("failed to read event row: {e}")))?;

        raw.into_iter().map(row_to_event).collect()
    }

    /// Read access to the underlying connection, for tests that need to
    /// tamper with stored rows.
    #[doc(hidden)]
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl AuditSink for SqliteAuditStore {
    fn append(&mut self, event: &SealedEvent) -> Result<(), CustodiaError> {
        self.conn
            .execute(
                "INSERT INTO audit_events (
                    event_id, timestamp, principal, address, role, session,
                    resource, action, category, severity, metadata,
                    payload_nonce, payload_ciphertext, nonce,
                    prev_hash, event_hash, algorithm, signature
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
                params![
                    event.event_id.to_string(),
                    event.timestamp.to_rfc3339(),
                    event.actor.principal,
                    event.actor.address,
                    event.actor.role,
                    event.actor.session,
                    event.resource,
                    event.action,
                    event.category,
                    event.severity.to_string(),
                    serde_json::to_string(&event.metadata)
                        .map_err(|e| CustodiaError::Store(format!("bad metadata: {e}")))?,
                    event.encrypted_payload.as_ref().map(|p| p.nonce.clone()),
                    event.encrypted_payload.as_ref().map(|p| p.ciphertext.clone()),
                    event.nonce,
                    event.prev_hash,
                    event.event_hash,
                    event.algorithm,
                    event.signature,
                ],
            )
            .map_err(|e| CustodiaError::Store(format!("failed to insert event: {e}")))?;
        Ok(())
    }

    fn append_batch(&mut self, batch: &MerkleBatch) -> Result<(), CustodiaError> {
        self.conn
            .execute(
                "INSERT INTO merkle_batches (batch_id, root, size, member_ids, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    batch.batch_id.to_string(),
                    batch.root,
                    batch.size as i64,
                    serde_json::to_string(&batch.member_ids)
                        .map_err(|e| CustodiaError::Store(format!("bad member_ids: {e}")))?,
                    batch.created_at.to_rfc3339(),
                ],
            )
            .map_err(|e| CustodiaError::Store(format!("failed to insert batch: {e}")))?;
        Ok(())
    }
}

type RawEventRow = (
    String,         // event_id
    String,         // timestamp
    Option<String>, // principal
    Option<String>, // address
    Option<String>, // role
    Option<String>, // session
    String,         // resource
    String,         // action
    String,         // category
    String,         // severity
    String,         // metadata
    Option<String>, // payload_nonce
    Option<String>, // payload_ciphertext
    String,         // nonce
    String,         // prev_hash
    String,         // event_hash
    String,         // algorithm
    Option<String>, // signature
);

fn row_to_tuple(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawEventRow> {
    Ok((
        row.get("event_id")?,
        row.get("timestamp")?,
        row.get("principal")?,
        row.get("address")?,
        row.get("role")?,
        row.get("session")?,
        row.get("resource")?,
        row.get("action")?,
        row.get("category")?,
        row.get("severity")?,
        row.get("metadata")?,
        row.get("payload_nonce")?,
        row.get("payload_ciphertext")?,
        row.get("nonce")?,
        row.get("prev_hash")?,
        row.get("event_hash")?,
        row.get("algorithm")?,
        row.get("signature")?,
    ))
}

fn row_to_event(raw: RawEventRow) -> Result<SealedEvent, CustodiaError> {
    let (
        event_id,
        timestamp,
        principal,
        address,
        role,
        session,
        resource,
        action,
        category,
        severity,
        metadata,
        payload_nonce,
        payload_ciphertext,
        nonce,
        prev_hash,
        event_hash,
        algorithm,
        signature,
    ) = raw;

    let encrypted_payload = match (payload_nonce, payload_ciphertext) {
        (Some(nonce), Some(ciphertext)) => Some(EncryptedPayload { nonce, ciphertext }),
        _ => None,
    };

    Ok(SealedEvent {
        event_id: parse_uuid(&event_id)?,
        timestamp: parse_timestamp(&timestamp)?,
        actor: ActorIdentity {
            principal,
            address,
            role,
            session,
        },
        resource,
        action,
        category,
        severity: parse_severity(&severity)?,
        metadata: serde_json::from_str(&metadata)
            .map_err(|e| CustodiaError::Store(format!("bad metadata json: {e}")))?,
        encrypted_payload,
        nonce,
        prev_hash,
        event_hash,
        algorithm,
        signature,
    })
}

fn parse_uuid(s: &str) -> Result<Uuid, CustodiaError> {
    Uuid::parse_str(s).map_err(|e| CustodiaError::Store(format!("invalid uuid '{s}': {e}")))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, CustodiaError> {
    DateTime::parse_from_rfc3339(s)
        .map(Into::into)
        .map_err(|e| CustodiaError::Store(format!("invalid timestamp '{s}': {e}")))
}

fn parse_severity(s: &str) -> Result<Severity, CustodiaError> {
    match s {
        "Info" => Ok(Severity::Info),
        "Low" => Ok(Severity::Low),
        "Medium" => Ok(Severity::Medium),
        "High" => Ok(Severity::High),
        "Critical" => Ok(Severity::Critical),
        other => Err(CustodiaError::Store(format!("invalid severity '{other}'"))),
    }
}
