//! Completion client — builds the two-message exchange and returns text plus usage.

use std::sync::Arc;

use crate::extraction::models::{ModelKind, TokenUsage};
use crate::extraction::prompts::SENTINEL;
use crate::llm_client::{ChatBackend, ChatMessage, ChatRequest, ChatRole, LlmError};

/// Deterministic extraction: always sample at temperature 0.
pub const TEMPERATURE: f32 = 0.0;
pub const MAX_OUTPUT_TOKENS: u32 = 500;

#[derive(Clone)]
pub struct CompletionClient {
    backend: Arc<dyn ChatBackend>,
}

impl CompletionClient {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self { backend }
    }

    pub async fn complete(
        &self,
        model: ModelKind,
        instruction: &str,
        user_text: &str,
    ) -> Result<(String, TokenUsage), LlmError> {
        let request = build_request(model, instruction, user_text);
        let completion = self.backend.chat(&request).await?;
        Ok((completion.text, completion.usage))
    }
}

fn build_request(model: ModelKind, instruction: &str, user_text: &str) -> ChatRequest {
    ChatRequest {
        model: model.api_model().to_string(),
        messages: vec![
            ChatMessage {
                role: ChatRole::System,
                content: instruction.to_string(),
            },
            ChatMessage {
                role: ChatRole::User,
                content: format!("{SENTINEL}{user_text}{SENTINEL}"),
            },
        ],
        temperature: TEMPERATURE,
        max_tokens: MAX_OUTPUT_TOKENS,
    }
}
