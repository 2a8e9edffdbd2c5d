//! SQLite persistence for documents, chunks, agents, conversations, and the
//! usage ledger
//!
//! All document status flips go through [`Database::try_transition`] or the
//! transactional completion/failure writers, so illegal lifecycle edges are
//! rejected in one place.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{
    Agent, Conversation, DebitReceipt, Document, DocumentChunk, DocumentStatus, FileType,
    TransactionKind, UsageTransaction,
};

/// SQLite-backed relational store
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Create or open the database at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| Error::Database(format!("Failed to open database: {}", e)))?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("Failed to open in-memory database: {}", e)))?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        // WAL for better concurrency on file-backed databases
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA foreign_keys=ON;
        "#,
        )
        .map_err(|e| Error::Database(format!("Failed to set pragmas: {}", e)))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tenants (
                id TEXT PRIMARY KEY,
                balance INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS agents (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                name TEXT NOT NULL,
                model TEXT NOT NULL,
                system_prompt TEXT NOT NULL,
                confidence_threshold REAL NOT NULL,
                knowledge_base_ids TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                FOREIGN KEY (tenant_id) REFERENCES tenants(id)
            );

            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                knowledge_base_id TEXT NOT NULL,
                filename TEXT NOT NULL,
                file_type TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                storage_key TEXT,
                raw_text TEXT,
                content_hash TEXT,
                status TEXT NOT NULL,
                error_message TEXT,
                chunk_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (tenant_id) REFERENCES tenants(id)
            );

            CREATE INDEX IF NOT EXISTS idx_documents_status ON documents(status);
            CREATE INDEX IF NOT EXISTS idx_documents_tenant ON documents(tenant_id);
            CREATE INDEX IF NOT EXISTS idx_documents_kb ON documents(knowledge_base_id);

            CREATE TABLE IF NOT EXISTS document_chunks (
                document_id TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                page_number INTEGER,
                content TEXT NOT NULL,
                PRIMARY KEY (document_id, chunk_index),
                FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                agent_id TEXT NOT NULL,
                is_handed_off INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                FOREIGN KEY (tenant_id) REFERENCES tenants(id)
            );

            -- Append-only audit trail; rows are never updated or deleted
            CREATE TABLE IF NOT EXISTS usage_transactions (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                amount INTEGER NOT NULL,
                balance_after INTEGER NOT NULL,
                model TEXT,
                input_tokens INTEGER,
                output_tokens INTEGER,
                reason TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (tenant_id) REFERENCES tenants(id)
            );

            CREATE INDEX IF NOT EXISTS idx_usage_tenant ON usage_transactions(tenant_id, created_at);
        "#,
        )
        .map_err(|e| Error::Database(format!("Failed to run migrations: {}", e)))?;

        tracing::debug!("Database migrations complete");
        Ok(())
    }

    // ==================== Tenants ====================

    /// Create a tenant with an initial prepaid balance
    pub fn create_tenant(&self, tenant_id: Uuid, initial_balance: i64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO tenants (id, balance, created_at) VALUES (?1, ?2, ?3)",
            params![tenant_id.to_string(), initial_balance, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Current prepaid balance for a tenant
    pub fn balance(&self, tenant_id: Uuid) -> Result<i64> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT balance FROM tenants WHERE id = ?1",
            params![tenant_id.to_string()],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| Error::Database(format!("Unknown tenant: {}", tenant_id)))
    }

    /// Atomically debit a tenant balance and append the ledger row
    ///
    /// The read-check-write-append runs inside a single immediate transaction
    /// so two concurrent debits can never both succeed past a balance that
    /// only covers one of them.
    pub fn debit_balance(
        &self,
        tenant_id: Uuid,
        amount: i64,
        model: &str,
        input_tokens: u32,
        output_tokens: u32,
    ) -> Result<DebitReceipt> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| Error::Database(format!("Failed to begin transaction: {}", e)))?;

        let balance: i64 = tx
            .query_row(
                "SELECT balance FROM tenants WHERE id = ?1",
                params![tenant_id.to_string()],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| Error::Database(format!("Unknown tenant: {}", tenant_id)))?;

        if balance < amount {
            // Transaction dropped without commit, balance untouched
            return Err(Error::InsufficientBalance {
                required: amount,
                available: balance,
            });
        }

        let new_balance = balance - amount;
        tx.execute(
            "UPDATE tenants SET balance = ?1 WHERE id = ?2",
            params![new_balance, tenant_id.to_string()],
        )?;

        let transaction_id = Uuid::new_v4();
        tx.execute(
            r#"
            INSERT INTO usage_transactions
                (id, tenant_id, kind, amount, balance_after, model, input_tokens, output_tokens, reason, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL, ?9)
            "#,
            params![
                transaction_id.to_string(),
                tenant_id.to_string(),
                TransactionKind::Usage.as_str(),
                -amount,
                new_balance,
                model,
                input_tokens,
                output_tokens,
                Utc::now().to_rfc3339(),
            ],
        )?;

        tx.commit()
            .map_err(|e| Error::Database(format!("Failed to commit debit: {}", e)))?;

        Ok(DebitReceipt {
            transaction_id,
            units_charged: amount,
            new_balance,
        })
    }

    /// Credit a tenant balance and append the ledger row
    pub fn credit_balance(
        &self,
        tenant_id: Uuid,
        amount: i64,
        kind: TransactionKind,
        reason: Option<&str>,
    ) -> Result<i64> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| Error::Database(format!("Failed to begin transaction: {}", e)))?;

        let balance: i64 = tx
            .query_row(
                "SELECT balance FROM tenants WHERE id = ?1",
                params![tenant_id.to_string()],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| Error::Database(format!("Unknown tenant: {}", tenant_id)))?;

        let new_balance = balance + amount;
        tx.execute(
            "UPDATE tenants SET balance = ?1 WHERE id = ?2",
            params![new_balance, tenant_id.to_string()],
        )?;
        tx.execute(
            r#"
            INSERT INTO usage_transactions
                (id, tenant_id, kind, amount, balance_after, model, input_tokens, output_tokens, reason, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, NULL, NULL, NULL, ?6, ?7)
            "#,
            params![
                Uuid::new_v4().to_string(),
                tenant_id.to_string(),
                kind.as_str(),
                amount,
                new_balance,
                reason,
                Utc::now().to_rfc3339(),
            ],
        )?;
        tx.commit()
            .map_err(|e| Error::Database(format!("Failed to commit credit: {}", e)))?;

        Ok(new_balance)
    }

    /// List ledger entries for a tenant, newest first
    pub fn list_transactions(&self, tenant_id: Uuid) -> Result<Vec<UsageTransaction>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, tenant_id, kind, amount, balance_after, model, input_tokens,
                    output_tokens, reason, created_at
             FROM usage_transactions WHERE tenant_id = ?1 ORDER BY created_at DESC",
        )?;
        let rows = stmt
            .query_map(params![tenant_id.to_string()], row_to_transaction)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ==================== Agents ====================

    /// Insert an agent
    pub fn insert_agent(&self, agent: &Agent) -> Result<()> {
        let conn = self.conn.lock();
        let kb_json = serde_json::to_string(&agent.knowledge_base_ids)
            .map_err(|e| Error::Internal(format!("Failed to serialize knowledge bases: {}", e)))?;
        conn.execute(
            r#"
            INSERT INTO agents
                (id, tenant_id, name, model, system_prompt, confidence_threshold,
                 knowledge_base_ids, is_active, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                agent.id.to_string(),
                agent.tenant_id.to_string(),
                agent.name,
                agent.model,
                agent.system_prompt,
                agent.confidence_threshold as f64,
                kb_json,
                agent.is_active,
                agent.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Get an agent by ID
    pub fn get_agent(&self, agent_id: Uuid) -> Result<Option<Agent>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, tenant_id, name, model, system_prompt, confidence_threshold,
                    knowledge_base_ids, is_active, created_at
             FROM agents WHERE id = ?1",
        )?;
        let agent = stmt
            .query_row(params![agent_id.to_string()], row_to_agent)
            .optional()?;
        Ok(agent)
    }

    /// Update whether an agent accepts queries
    pub fn set_agent_active(&self, agent_id: Uuid, is_active: bool) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE agents SET is_active = ?1 WHERE id = ?2",
            params![is_active, agent_id.to_string()],
        )?;
        Ok(())
    }

    // ==================== Documents ====================

    /// Insert a document
    pub fn insert_document(&self, doc: &Document) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT INTO documents
                (id, tenant_id, knowledge_base_id, filename, file_type, file_size,
                 storage_key, raw_text, content_hash, status, error_message, chunk_count,
                 created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
            params![
                doc.id.to_string(),
                doc.tenant_id.to_string(),
                doc.knowledge_base_id.to_string(),
                doc.filename,
                file_type_to_str(&doc.file_type),
                doc.file_size as i64,
                doc.storage_key,
                doc.raw_text,
                doc.content_hash,
                doc.status.as_str(),
                doc.error_message,
                doc.chunk_count as i64,
                doc.created_at.to_rfc3339(),
                doc.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Get a document by ID
    pub fn get_document(&self, document_id: Uuid) -> Result<Option<Document>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM documents WHERE id = ?1",
            DOCUMENT_COLUMNS
        ))?;
        let doc = stmt
            .query_row(params![document_id.to_string()], row_to_document)
            .optional()?;
        Ok(doc)
    }

    /// Cache extracted raw text on a document
    pub fn set_raw_text(&self, document_id: Uuid, raw_text: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE documents SET raw_text = ?1, updated_at = ?2 WHERE id = ?3",
            params![raw_text, Utc::now().to_rfc3339(), document_id.to_string()],
        )?;
        Ok(())
    }

    /// Cache extracted text together with the hash of the bytes it came from
    pub fn set_extracted_text(
        &self,
        document_id: Uuid,
        raw_text: &str,
        content_hash: &str,
    ) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE documents SET raw_text = ?1, content_hash = ?2, updated_at = ?3 WHERE id = ?4",
            params![
                raw_text,
                content_hash,
                Utc::now().to_rfc3339(),
                document_id.to_string()
            ],
        )?;
        Ok(())
    }

    /// Conditionally transition a document's status
    ///
    /// The update only succeeds when the stored status still equals `from`,
    /// which is the guard against two concurrent invocations claiming the
    /// same document. Returns whether this caller won the claim. Illegal
    /// edges are rejected before touching the row.
    pub fn try_transition(
        &self,
        document_id: Uuid,
        from: DocumentStatus,
        to: DocumentStatus,
    ) -> Result<bool> {
        if !from.can_transition(to) {
            return Err(Error::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE documents SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
            params![
                to.as_str(),
                Utc::now().to_rfc3339(),
                document_id.to_string(),
                from.as_str(),
            ],
        )?;
        Ok(changed == 1)
    }

    /// Reset a document for reprocessing: status back to Pending, error cleared
    pub fn reset_for_reprocess(&self, document_id: Uuid) -> Result<()> {
        let doc = self
            .get_document(document_id)?
            .ok_or(Error::DocumentNotFound(document_id))?;
        if doc.status != DocumentStatus::Pending && !doc.status.can_transition(DocumentStatus::Pending)
        {
            return Err(Error::InvalidTransition {
                from: doc.status.to_string(),
                to: DocumentStatus::Pending.to_string(),
            });
        }
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE documents SET status = 'pending', error_message = NULL, updated_at = ?1
             WHERE id = ?2",
            params![Utc::now().to_rfc3339(), document_id.to_string()],
        )?;
        Ok(())
    }

    /// Complete a document: replace its chunks and flip Processing -> Completed
    /// in a single transaction
    ///
    /// A concurrent reader never observes a previously-successful document
    /// with zero chunks while a retry is refreshing content.
    pub fn complete_with_chunks(&self, document_id: Uuid, chunks: &[DocumentChunk]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| Error::Database(format!("Failed to begin transaction: {}", e)))?;

        let changed = tx.execute(
            "UPDATE documents
             SET status = 'completed', error_message = NULL, chunk_count = ?1, updated_at = ?2
             WHERE id = ?3 AND status = 'processing'",
            params![
                chunks.len() as i64,
                Utc::now().to_rfc3339(),
                document_id.to_string(),
            ],
        )?;
        if changed != 1 {
            return Err(Error::InvalidTransition {
                from: "unknown".to_string(),
                to: DocumentStatus::Completed.to_string(),
            });
        }

        tx.execute(
            "DELETE FROM document_chunks WHERE document_id = ?1",
            params![document_id.to_string()],
        )?;
        for chunk in chunks {
            tx.execute(
                "INSERT INTO document_chunks (document_id, chunk_index, page_number, content)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    chunk.document_id.to_string(),
                    chunk.chunk_index as i64,
                    chunk.page_number.map(|p| p as i64),
                    chunk.content,
                ],
            )?;
        }

        tx.commit()
            .map_err(|e| Error::Database(format!("Failed to commit chunk replacement: {}", e)))
    }

    /// Mark a document Failed with a human-readable message
    pub fn mark_failed(&self, document_id: Uuid, message: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE documents SET status = 'failed', error_message = ?1, updated_at = ?2
             WHERE id = ?3 AND status = 'processing'",
            params![message, Utc::now().to_rfc3339(), document_id.to_string()],
        )?;
        Ok(())
    }

    /// Get all chunks for a document, ordered by chunk index
    pub fn get_chunks(&self, document_id: Uuid) -> Result<Vec<DocumentChunk>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT document_id, chunk_index, page_number, content
             FROM document_chunks WHERE document_id = ?1 ORDER BY chunk_index",
        )?;
        let chunks = stmt
            .query_map(params![document_id.to_string()], |row| {
                let id: String = row.get(0)?;
                Ok(DocumentChunk {
                    document_id: Uuid::parse_str(&id).unwrap_or_default(),
                    chunk_index: row.get::<_, i64>(1)? as u32,
                    page_number: row.get::<_, Option<i64>>(2)?.map(|p| p as u32),
                    content: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(chunks)
    }

    /// Delete a document; chunks cascade
    pub fn delete_document(&self, document_id: Uuid) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM documents WHERE id = ?1",
            params![document_id.to_string()],
        )?;
        Ok(())
    }

    // ==================== Sweep queries ====================

    /// Documents stuck in Processing: untouched past the stuck timeout, but
    /// created within the recency window
    pub fn stuck_processing(
        &self,
        stuck_timeout: Duration,
        recency_window: Duration,
    ) -> Result<Vec<Document>> {
        let now = Utc::now();
        let stale_before = now - stuck_timeout;
        let window_start = now - recency_window;
        self.query_documents(
            "status = 'processing' AND updated_at < ?1 AND created_at >= ?2",
            params![stale_before.to_rfc3339(), window_start.to_rfc3339()],
        )
    }

    /// Pending documents created within the recency window, oldest first
    pub fn recent_pending(&self, recency_window: Duration) -> Result<Vec<Document>> {
        let window_start = Utc::now() - recency_window;
        self.query_documents(
            "status = 'pending' AND created_at >= ?1",
            params![window_start.to_rfc3339()],
        )
    }

    /// Unresolved documents older than the maximum retry age; never
    /// auto-retried, surfaced for manual attention
    pub fn aged_out(&self, max_age: Duration) -> Result<Vec<Document>> {
        let cutoff = Utc::now() - max_age;
        self.query_documents(
            "status IN ('pending', 'processing') AND created_at < ?1",
            params![cutoff.to_rfc3339()],
        )
    }

    fn query_documents(
        &self,
        where_clause: &str,
        args: impl rusqlite::Params,
    ) -> Result<Vec<Document>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM documents WHERE {} ORDER BY created_at",
            DOCUMENT_COLUMNS, where_clause
        ))?;
        let docs = stmt
            .query_map(args, row_to_document)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(docs)
    }

    // ==================== Conversations ====================

    /// Insert a conversation
    pub fn insert_conversation(&self, conversation: &Conversation) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO conversations (id, tenant_id, agent_id, is_handed_off, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                conversation.id.to_string(),
                conversation.tenant_id.to_string(),
                conversation.agent_id.to_string(),
                conversation.is_handed_off,
                conversation.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Whether a conversation is currently routed to a human
    pub fn is_handed_off(&self, conversation_id: Uuid) -> Result<bool> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT is_handed_off FROM conversations WHERE id = ?1",
            params![conversation_id.to_string()],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| Error::Database(format!("Unknown conversation: {}", conversation_id)))
    }

    /// Set or reset the handoff flag on a conversation
    pub fn set_handed_off(&self, conversation_id: Uuid, handed_off: bool) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE conversations SET is_handed_off = ?1 WHERE id = ?2",
            params![handed_off, conversation_id.to_string()],
        )?;
        Ok(())
    }
}

const DOCUMENT_COLUMNS: &str = "id, tenant_id, knowledge_base_id, filename, file_type, file_size, \
     storage_key, raw_text, content_hash, status, error_message, chunk_count, created_at, \
     updated_at";

fn file_type_to_str(file_type: &FileType) -> &'static str {
    match file_type {
        FileType::Pdf => "pdf",
        FileType::Txt => "txt",
        FileType::Markdown => "markdown",
        FileType::Html => "html",
        FileType::Csv => "csv",
        FileType::Json => "json",
        FileType::Unknown => "unknown",
    }
}

fn file_type_from_str(s: &str) -> FileType {
    match s {
        "pdf" => FileType::Pdf,
        "txt" => FileType::Txt,
        "markdown" => FileType::Markdown,
        "html" => FileType::Html,
        "csv" => FileType::Csv,
        "json" => FileType::Json,
        _ => FileType::Unknown,
    }
}

fn parse_uuid(s: String) -> Uuid {
    Uuid::parse_str(&s).unwrap_or_default()
}

fn parse_timestamp(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<Document> {
    let status: String = row.get(9)?;
    Ok(Document {
        id: parse_uuid(row.get(0)?),
        tenant_id: parse_uuid(row.get(1)?),
        knowledge_base_id: parse_uuid(row.get(2)?),
        filename: row.get(3)?,
        file_type: file_type_from_str(&row.get::<_, String>(4)?),
        file_size: row.get::<_, i64>(5)? as u64,
        storage_key: row.get(6)?,
        raw_text: row.get(7)?,
        content_hash: row.get(8)?,
        status: DocumentStatus::parse(&status).unwrap_or(DocumentStatus::Failed),
        error_message: row.get(10)?,
        chunk_count: row.get::<_, i64>(11)? as u32,
        created_at: parse_timestamp(row.get(12)?),
        updated_at: parse_timestamp(row.get(13)?),
    })
}

fn row_to_agent(row: &rusqlite::Row<'_>) -> rusqlite::Result<Agent> {
    let kb_json: String = row.get(6)?;
    Ok(Agent {
        id: parse_uuid(row.get(0)?),
        tenant_id: parse_uuid(row.get(1)?),
        name: row.get(2)?,
        model: row.get(3)?,
        system_prompt: row.get(4)?,
        confidence_threshold: row.get::<_, f64>(5)? as f32,
        knowledge_base_ids: serde_json::from_str(&kb_json).unwrap_or_default(),
        is_active: row.get(7)?,
        created_at: parse_timestamp(row.get(8)?),
    })
}

fn row_to_transaction(row: &rusqlite::Row<'_>) -> rusqlite::Result<UsageTransaction> {
    let kind: String = row.get(2)?;
    Ok(UsageTransaction {
        id: parse_uuid(row.get(0)?),
        tenant_id: parse_uuid(row.get(1)?),
        kind: TransactionKind::parse(&kind).unwrap_or(TransactionKind::Adjustment),
        amount: row.get(3)?,
        balance_after: row.get(4)?,
        model: row.get(5)?,
        input_tokens: row.get::<_, Option<i64>>(6)?.map(|t| t as u32),
        output_tokens: row.get::<_, Option<i64>>(7)?.map(|t| t as u32),
        reason: row.get(8)?,
        created_at: parse_timestamp(row.get(9)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (Database, Uuid, Document) {
        let db = Database::in_memory().unwrap();
        let tenant_id = Uuid::new_v4();
        db.create_tenant(tenant_id, 1000).unwrap();
        let doc = Document::new(
            tenant_id,
            Uuid::new_v4(),
            "handbook.txt".to_string(),
            FileType::Txt,
            64,
        );
        db.insert_document(&doc).unwrap();
        (db, tenant_id, doc)
    }

    #[test]
    fn test_insert_and_get_document() {
        let (db, _, doc) = fixture();
        let loaded = db.get_document(doc.id).unwrap().unwrap();
        assert_eq!(loaded.filename, "handbook.txt");
        assert_eq!(loaded.status, DocumentStatus::Pending);
        assert_eq!(loaded.chunk_count, 0);
    }

    #[test]
    fn test_guarded_transition_single_winner() {
        let (db, _, doc) = fixture();
        assert!(db
            .try_transition(doc.id, DocumentStatus::Pending, DocumentStatus::Processing)
            .unwrap());
        // Second claim against the same expected status loses
        assert!(!db
            .try_transition(doc.id, DocumentStatus::Pending, DocumentStatus::Processing)
            .unwrap());
    }

    #[test]
    fn test_illegal_transition_rejected() {
        let (db, _, doc) = fixture();
        let err = db
            .try_transition(doc.id, DocumentStatus::Pending, DocumentStatus::Completed)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
    }

    #[test]
    fn test_complete_with_chunks_requires_processing() {
        let (db, _, doc) = fixture();
        let chunks = vec![DocumentChunk {
            document_id: doc.id,
            chunk_index: 0,
            page_number: None,
            content: "hello".to_string(),
        }];
        // Not in Processing yet
        assert!(db.complete_with_chunks(doc.id, &chunks).is_err());

        db.try_transition(doc.id, DocumentStatus::Pending, DocumentStatus::Processing)
            .unwrap();
        db.complete_with_chunks(doc.id, &chunks).unwrap();

        let loaded = db.get_document(doc.id).unwrap().unwrap();
        assert_eq!(loaded.status, DocumentStatus::Completed);
        assert_eq!(loaded.chunk_count, 1);
        assert_eq!(db.get_chunks(doc.id).unwrap().len(), 1);
    }

    #[test]
    fn test_chunk_replacement_is_full_replace() {
        let (db, _, doc) = fixture();
        let make_chunks = |n: u32| -> Vec<DocumentChunk> {
            (0..n)
                .map(|i| DocumentChunk {
                    document_id: doc.id,
                    chunk_index: i,
                    page_number: None,
                    content: format!("chunk {}", i),
                })
                .collect()
        };

        db.try_transition(doc.id, DocumentStatus::Pending, DocumentStatus::Processing)
            .unwrap();
        db.complete_with_chunks(doc.id, &make_chunks(5)).unwrap();

        db.reset_for_reprocess(doc.id).unwrap();
        db.try_transition(doc.id, DocumentStatus::Pending, DocumentStatus::Processing)
            .unwrap();
        db.complete_with_chunks(doc.id, &make_chunks(2)).unwrap();

        assert_eq!(db.get_chunks(doc.id).unwrap().len(), 2);
        assert_eq!(db.get_document(doc.id).unwrap().unwrap().chunk_count, 2);
    }

    #[test]
    fn test_mark_failed_sets_message() {
        let (db, _, doc) = fixture();
        db.try_transition(doc.id, DocumentStatus::Pending, DocumentStatus::Processing)
            .unwrap();
        db.mark_failed(doc.id, "extraction failed: corrupt file").unwrap();

        let loaded = db.get_document(doc.id).unwrap().unwrap();
        assert_eq!(loaded.status, DocumentStatus::Failed);
        assert_eq!(
            loaded.error_message.as_deref(),
            Some("extraction failed: corrupt file")
        );
    }

    #[test]
    fn test_reset_for_reprocess_clears_error() {
        let (db, _, doc) = fixture();
        db.try_transition(doc.id, DocumentStatus::Pending, DocumentStatus::Processing)
            .unwrap();
        db.mark_failed(doc.id, "boom").unwrap();
        db.reset_for_reprocess(doc.id).unwrap();

        let loaded = db.get_document(doc.id).unwrap().unwrap();
        assert_eq!(loaded.status, DocumentStatus::Pending);
        assert!(loaded.error_message.is_none());
    }

    #[test]
    fn test_debit_insufficient_balance_untouched() {
        let (db, tenant_id, _) = fixture();
        let err = db.debit_balance(tenant_id, 1500, "llama3.1", 100, 50).unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientBalance { required: 1500, available: 1000 }
        ));
        assert_eq!(db.balance(tenant_id).unwrap(), 1000);
        assert!(db.list_transactions(tenant_id).unwrap().is_empty());
    }

    #[test]
    fn test_debit_appends_ledger_row() {
        let (db, tenant_id, _) = fixture();
        let receipt = db.debit_balance(tenant_id, 300, "llama3.1", 120, 80).unwrap();
        assert_eq!(receipt.units_charged, 300);
        assert_eq!(receipt.new_balance, 700);

        let history = db.list_transactions(tenant_id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, TransactionKind::Usage);
        assert_eq!(history[0].amount, -300);
        assert_eq!(history[0].balance_after, 700);
        assert_eq!(history[0].input_tokens, Some(120));
    }

    #[test]
    fn test_concurrent_debits_single_winner() {
        let (db, tenant_id, _) = fixture();
        // Balance 1000, two concurrent charges of 600: only one can succeed
        let db2 = db.clone();
        let handle = std::thread::spawn(move || db2.debit_balance(tenant_id, 600, "m", 1, 1));
        let local = db.debit_balance(tenant_id, 600, "m", 1, 1);
        let remote = handle.join().unwrap();

        let successes = [local.is_ok(), remote.is_ok()].iter().filter(|s| **s).count();
        assert_eq!(successes, 1);
        assert_eq!(db.balance(tenant_id).unwrap(), 400);
    }

    #[test]
    fn test_conversation_handoff_flag() {
        let db = Database::in_memory().unwrap();
        let tenant_id = Uuid::new_v4();
        db.create_tenant(tenant_id, 0).unwrap();
        let conversation = Conversation::new(tenant_id, Uuid::new_v4());
        db.insert_conversation(&conversation).unwrap();

        assert!(!db.is_handed_off(conversation.id).unwrap());
        db.set_handed_off(conversation.id, true).unwrap();
        assert!(db.is_handed_off(conversation.id).unwrap());
        db.set_handed_off(conversation.id, false).unwrap();
        assert!(!db.is_handed_off(conversation.id).unwrap());
    }

    #[test]
    fn test_agent_roundtrip() {
        let db = Database::in_memory().unwrap();
        let tenant_id = Uuid::new_v4();
        db.create_tenant(tenant_id, 0).unwrap();
        let kb = Uuid::new_v4();
        let agent = Agent::new(
            tenant_id,
            "Support".to_string(),
            "llama3.1".to_string(),
            "You are a helpful support agent.".to_string(),
            0.6,
            vec![kb],
        );
        db.insert_agent(&agent).unwrap();

        let loaded = db.get_agent(agent.id).unwrap().unwrap();
        assert_eq!(loaded.name, "Support");
        assert_eq!(loaded.knowledge_base_ids, vec![kb]);
        assert!(loaded.is_active);

        db.set_agent_active(agent.id, false).unwrap();
        assert!(!db.get_agent(agent.id).unwrap().unwrap().is_active);
    }
}
