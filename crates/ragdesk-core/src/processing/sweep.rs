//! Recovery sweep for documents left behind by crashed or slow workers
//!
//! Runs periodically from an outer scheduler. Each pass resets stuck
//! PROCESSING documents back to PENDING, retries a bounded batch of recent
//! pending documents, and surfaces anything too old to auto-retry.

use chrono::Duration;

use crate::config::ProcessingConfig;
use crate::error::Result;
use crate::processing::{DocumentProcessor, ProcessOutcome};
use crate::storage::Database;
use crate::types::{Document, DocumentStatus};

/// What one sweep pass did
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Stuck PROCESSING documents reset back to PENDING
    pub reset: Vec<uuid::Uuid>,
    /// Processing attempts made this pass
    pub outcomes: Vec<ProcessOutcome>,
    /// Unresolved documents too old to auto-retry
    pub needs_attention: Vec<Document>,
}

/// Periodic recovery pass over the document table
pub struct RecoverySweep {
    db: Database,
    processor: DocumentProcessor,
    stuck_timeout: Duration,
    recency_window: Duration,
    max_age: Duration,
    batch_size: usize,
}

impl RecoverySweep {
    pub fn new(db: Database, processor: DocumentProcessor, config: &ProcessingConfig) -> Self {
        Self {
            db,
            processor,
            stuck_timeout: Duration::seconds(config.stuck_timeout_secs as i64),
            recency_window: Duration::seconds(config.recency_window_secs as i64),
            max_age: Duration::seconds(config.max_age_secs as i64),
            batch_size: config.sweep_batch_size.max(1),
        }
    }

    /// One sweep pass: reset stuck documents, retry a bounded batch, report
    /// aged-out documents
    pub async fn run(&self) -> Result<SweepReport> {
        let mut report = SweepReport::default();

        for doc in self.db.stuck_processing(self.stuck_timeout, self.recency_window)? {
            // Conditional so a worker that just finished is not clobbered
            if self
                .db
                .try_transition(doc.id, DocumentStatus::Processing, DocumentStatus::Pending)?
            {
                tracing::warn!(
                    document_id = %doc.id,
                    filename = %doc.filename,
                    "Resetting stuck document for retry"
                );
                report.reset.push(doc.id);
            }
        }

        // Oldest first, bounded per pass so one sweep cannot monopolize the
        // embedding backend
        for doc in self
            .db
            .recent_pending(self.recency_window)?
            .into_iter()
            .take(self.batch_size)
        {
            report.outcomes.push(self.processor.process_document(doc.id).await);
        }

        for doc in self.db.aged_out(self.max_age)? {
            tracing::warn!(
                document_id = %doc.id,
                filename = %doc.filename,
                status = %doc.status,
                "Document too old for automatic retry, needs attention"
            );
            report.needs_attention.push(doc);
        }

        tracing::info!(
            reset = report.reset.len(),
            processed = report.outcomes.len(),
            needs_attention = report.needs_attention.len(),
            "Recovery sweep complete"
        );
        Ok(report)
    }
}
