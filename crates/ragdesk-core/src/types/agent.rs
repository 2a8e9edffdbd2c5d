//! Agent and conversation types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An AI agent configured by a tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// Unique agent ID
    pub id: Uuid,
    /// Owning tenant
    pub tenant_id: Uuid,
    /// Display name
    pub name: String,
    /// Language model identifier used for answering
    pub model: String,
    /// System prompt prepended to every grounded prompt
    pub system_prompt: String,
    /// Answers below this confidence are handed off to a human
    pub confidence_threshold: f32,
    /// Knowledge bases this agent may retrieve from
    pub knowledge_base_ids: Vec<Uuid>,
    /// Inactive agents reject queries
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Agent {
    /// Create a new active agent
    pub fn new(
        tenant_id: Uuid,
        name: String,
        model: String,
        system_prompt: String,
        confidence_threshold: f32,
        knowledge_base_ids: Vec<Uuid>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            name,
            model,
            system_prompt,
            confidence_threshold,
            knowledge_base_ids,
            is_active: true,
            created_at: Utc::now(),
        }
    }
}

/// A conversation between an end user and an agent
///
/// Once `is_handed_off` is set, subsequent messages route to a human until a
/// human or the user resets it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub agent_id: Uuid,
    pub is_handed_off: bool,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(tenant_id: Uuid, agent_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            agent_id,
            is_handed_off: false,
            created_at: Utc::now(),
        }
    }
}
