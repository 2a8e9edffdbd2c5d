//! Query engine: grounded answering with confidence scoring, handoff, and
//! usage metering
//!
//! The order of operations matters. Retrieval runs before any model call so
//! an ungrounded question never spends model tokens. The charge runs after
//! the model call; if the balance no longer covers it, the answer is still
//! returned with a warning flag since the cost was already incurred.

use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use crate::billing::UsageLedger;
use crate::config::CoreConfig;
use crate::error::{Error, Result};
use crate::generation::confidence;
use crate::generation::PromptBuilder;
use crate::providers::{EmbeddingProvider, LlmResolver, VectorStoreProvider};
use crate::retrieval::Retriever;
use crate::storage::Database;
use crate::types::{Agent, AnswerResponse, Citation};

/// Answers questions for an agent from its tenant's indexed documents
pub struct QueryEngine {
    db: Database,
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn LlmResolver>,
    retriever: Retriever,
    ledger: UsageLedger,
    top_k: usize,
}

impl QueryEngine {
    pub fn new(
        db: Database,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmResolver>,
        vector_store: Arc<dyn VectorStoreProvider>,
        config: &CoreConfig,
    ) -> Self {
        Self {
            ledger: UsageLedger::new(db.clone(), config.billing.clone()),
            db,
            embedder,
            llm,
            retriever: Retriever::new(vector_store),
            top_k: config.retrieval.top_k,
        }
    }

    /// Answer a question for a tenant's agent
    ///
    /// When `conversation_id` is given and the answer falls below the agent's
    /// confidence threshold, the conversation is flagged for human handoff.
    pub async fn answer(
        &self,
        tenant_id: Uuid,
        agent_id: Uuid,
        conversation_id: Option<Uuid>,
        question: &str,
    ) -> Result<AnswerResponse> {
        let agent = self.load_agent(tenant_id, agent_id)?;

        let query_vector = self.embedder.embed(question).await?;
        let chunks = self
            .retriever
            .retrieve(tenant_id, &agent.knowledge_base_ids, &query_vector, self.top_k)
            .await?;

        // No grounding: canned answer, forced handoff, no model call, no charge
        if chunks.is_empty() {
            tracing::info!(agent_id = %agent_id, "No grounding found, forcing handoff");
            self.record_handoff(conversation_id)?;
            return Ok(AnswerResponse::no_grounding(&agent.model));
        }

        let context = PromptBuilder::build_context(&chunks);
        let prompt = PromptBuilder::build_grounded_prompt(question, &context);

        let llm = self.llm.resolve(&agent);
        let started = Instant::now();
        let completion = llm.complete(&agent.system_prompt, "", &prompt).await?;
        let latency_ms = started.elapsed().as_millis() as u64;

        let best_similarity = chunks.first().map(|c| c.similarity).unwrap_or(0.0);
        let model_uncertain = confidence::is_uncertain(&completion.text);
        let conf = confidence::score(best_similarity, model_uncertain);
        let should_handoff = confidence::should_handoff(conf, agent.confidence_threshold);
        if should_handoff {
            tracing::info!(
                agent_id = %agent_id,
                confidence = conf,
                threshold = agent.confidence_threshold,
                "Confidence below threshold, handing off"
            );
            self.record_handoff(conversation_id)?;
        }

        // The model already ran, so an uncovered charge warns instead of
        // voiding the answer
        let balance_warning = match self.ledger.charge(
            tenant_id,
            llm.model(),
            completion.input_tokens,
            completion.output_tokens,
        ) {
            Ok(_) => false,
            Err(Error::InsufficientBalance { required, available }) => {
                tracing::warn!(
                    tenant_id = %tenant_id,
                    required = required,
                    available = available,
                    "Balance did not cover completed model call"
                );
                true
            }
            Err(e) => return Err(e),
        };

        Ok(AnswerResponse {
            content: completion.text,
            confidence: conf,
            citations: chunks.iter().map(Citation::from_retrieved).collect(),
            should_handoff,
            model: llm.model().to_string(),
            tokens_used: completion.input_tokens + completion.output_tokens,
            latency_ms,
            balance_warning,
        })
    }

    /// Usage ledger for credit and history operations
    pub fn ledger(&self) -> &UsageLedger {
        &self.ledger
    }

    fn load_agent(&self, tenant_id: Uuid, agent_id: Uuid) -> Result<Agent> {
        let agent = self
            .db
            .get_agent(agent_id)?
            .ok_or(Error::AgentNotFound(agent_id))?;
        // A foreign tenant's agent is indistinguishable from a missing one
        if agent.tenant_id != tenant_id {
            return Err(Error::AgentNotFound(agent_id));
        }
        if !agent.is_active {
            return Err(Error::AgentInactive(agent_id));
        }
        Ok(agent)
    }

    fn record_handoff(&self, conversation_id: Option<Uuid>) -> Result<()> {
        if let Some(id) = conversation_id {
            self.db.set_handed_off(id, true)?;
        }
        Ok(())
    }
}
