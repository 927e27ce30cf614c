//! Moderation gate — binary allow/flag decision from the provider's moderation endpoint.

use std::sync::Arc;

use tracing::warn;

use crate::llm_client::{LlmError, ModerationBackend};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModerationDecision {
    pub allowed: bool,
}

#[derive(Clone)]
pub struct ModerationGate {
    backend: Arc<dyn ModerationBackend>,
}

impl ModerationGate {
    pub fn new(backend: Arc<dyn ModerationBackend>) -> Self {
        Self { backend }
    }

    /// The provider verdict is final; transport errors propagate.
    pub async fn check(&self, text: &str) -> Result<ModerationDecision, LlmError> {
        let verdict = self.backend.moderate(text).await?;
        if verdict.flagged {
            warn!(categories = ?verdict.categories, "Input flagged by moderation");
        }
        Ok(ModerationDecision {
            allowed: !verdict.flagged,
        })
    }
}
