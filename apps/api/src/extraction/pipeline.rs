//! Extraction pipeline — moderation → completion → classification → cost → persistence.
//!
//! Each run performs at most two provider calls, one after the other. Only the
//! completion call is billed; a flagged input returns before it is made.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::extraction::completion::CompletionClient;
use crate::extraction::cost::cost;
use crate::extraction::models::{ExtractionResult, ModelKind, RoleKind, TokenUsage};
use crate::extraction::moderation::ModerationGate;
use crate::extraction::prompts::instruction_for;
use crate::extraction::validation::{is_refusal, is_well_formed, missing_keys, parse_fields};
use crate::extraction::PipelineError;
use crate::storage::Storage;

#[derive(Clone)]
pub struct ExtractionPipeline {
    moderation: ModerationGate,
    completion: CompletionClient,
    /// `None` in deployed mode: successful extractions are not written anywhere.
    storage: Option<Arc<dyn Storage>>,
}

impl ExtractionPipeline {
    pub fn new(
        moderation: ModerationGate,
        completion: CompletionClient,
        storage: Option<Arc<dyn Storage>>,
    ) -> Self {
        Self {
            moderation,
            completion,
            storage,
        }
    }

    pub fn storage(&self) -> Option<&Arc<dyn Storage>> {
        self.storage.as_ref()
    }

    /// Resolves user-facing model and role names, then runs the pipeline.
    /// Unknown names fail before any provider call.
    pub async fn run_named(
        &self,
        model_name: &str,
        role_name: &str,
        text: &str,
    ) -> Result<ExtractionResult, PipelineError> {
        let model: ModelKind = model_name.parse()?;
        let role: RoleKind = role_name.parse()?;
        self.run(model, role, text).await
    }

    pub async fn run(
        &self,
        model: ModelKind,
        role: RoleKind,
        text: &str,
    ) -> Result<ExtractionResult, PipelineError> {
        if text.trim().is_empty() {
            return Err(PipelineError::EmptyInput);
        }
        let request_id = Uuid::new_v4();

        if !self.moderation.check(text).await?.allowed {
            info!(%request_id, %model, %role, tag = "flagged", cost = 0.0, "Extraction finished");
            return Ok(ExtractionResult::Flagged);
        }

        let (completion, usage) = self
            .completion
            .complete(model, instruction_for(role), text)
            .await?;
        let cost = cost(model, &usage);

        let result = self
            .classify(model, role, text, &completion, &usage, cost)
            .await?;

        info!(
            %request_id,
            %model,
            %role,
            tag = result.tag().map_or("none", |t| t.as_str()),
            cost,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            "Extraction finished"
        );
        Ok(result)
    }

    /// Refusal is checked before structure: the refusal is prose and would
    /// otherwise be reported as malformed output.
    async fn classify(
        &self,
        model: ModelKind,
        role: RoleKind,
        text: &str,
        completion: &str,
        usage: &TokenUsage,
        cost: f64,
    ) -> Result<ExtractionResult, PipelineError> {
        if is_refusal(completion, usage) {
            warn!("Model judged the input not to be a job description");
            return Ok(ExtractionResult::NotAJobDescription { cost });
        }

        if !is_well_formed(completion) {
            warn!("Model output is not valid JSON");
            return Ok(ExtractionResult::Malformed { cost });
        }
        let Some(fields) = parse_fields(completion) else {
            warn!("Model output is JSON but not an object");
            return Ok(ExtractionResult::Malformed { cost });
        };

        let missing = missing_keys(role, &fields);
        if !missing.is_empty() {
            warn!(?missing, "Model output is missing schema keys");
        }

        if let Some(storage) = &self.storage {
            self.persist(storage.as_ref(), model, text, &fields).await?;
        }

        Ok(ExtractionResult::Success { fields, cost })
    }

    /// The accumulation record is written first, so a failed append leaves
    /// no orphaned raw-input file behind.
    async fn persist(
        &self,
        storage: &dyn Storage,
        model: ModelKind,
        text: &str,
        fields: &Map<String, Value>,
    ) -> Result<(), PipelineError> {
        let company = fields
            .get("Company")
            .and_then(Value::as_str)
            .unwrap_or_default();
        storage.append_result(model, fields).await?;
        storage.save_raw_input(company, text).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use super::*;
    use crate::extraction::models::ExtractionTag;
    use crate::llm_client::{
        ChatBackend, ChatCompletion, ChatRequest, LlmError, ModerationBackend, ModerationVerdict,
    };
    use crate::storage::FileStorage;

    const ACME_JD: &str = r#"
        Acme Corp is hiring a Senior Data Engineer.
        Requirements: 5+ years of Python and SQL, Spark experience. Bachelor's degree required.
        We will not sponsor visas. Full time, based in Austin.
    "#;

    const ACME_EXTRACTION: &str = r#"{
        "Company": "Acme Corp",
        "Industry": "Retail",
        "Citizenship": "Not mentioned",
        "Visa_policy": "Will not provide",
        "JobType": "Full time",
        "YoE_year": "5",
        "YoE_level": "Senior",
        "DS_skills": ["Python", "SQL", "Spark"],
        "Domain_Knowledge": "Not mentioned",
        "Min_Education": "Bachelor"
    }"#;

    struct StubModeration {
        flagged: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ModerationBackend for StubModeration {
        async fn moderate(&self, _input: &str) -> Result<ModerationVerdict, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ModerationVerdict {
                flagged: self.flagged,
                categories: vec![],
            })
        }
    }

    struct StubChat {
        text: String,
        usage: TokenUsage,
        requests: Mutex<Vec<ChatRequest>>,
    }

    #[async_trait]
    impl ChatBackend for StubChat {
        async fn chat(&self, request: &ChatRequest) -> Result<ChatCompletion, LlmError> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(ChatCompletion {
                text: self.text.clone(),
                usage: self.usage,
            })
        }
    }

    struct FailingChat;

    #[async_trait]
    impl ChatBackend for FailingChat {
        async fn chat(&self, _request: &ChatRequest) -> Result<ChatCompletion, LlmError> {
            Err(LlmError::Api {
                status: 503,
                message: "overloaded".into(),
            })
        }
    }

    struct Harness {
        pipeline: ExtractionPipeline,
        moderation: Arc<StubModeration>,
        chat: Arc<StubChat>,
    }

    fn harness(flagged: bool, text: &str, usage: TokenUsage, storage: Option<Arc<dyn Storage>>) -> Harness {
        let moderation = Arc::new(StubModeration {
            flagged,
            calls: AtomicUsize::new(0),
        });
        let chat = Arc::new(StubChat {
            text: text.to_string(),
            usage,
            requests: Mutex::new(Vec::new()),
        });
        let pipeline = ExtractionPipeline::new(
            ModerationGate::new(moderation.clone()),
            CompletionClient::new(chat.clone()),
            storage,
        );
        Harness {
            pipeline,
            moderation,
            chat,
        }
    }

    fn chat_calls(h: &Harness) -> usize {
        h.chat.requests.lock().unwrap().len()
    }

    #[tokio::test]
    async fn test_flagged_input_costs_nothing_and_skips_completion() {
        let h = harness(true, ACME_EXTRACTION, TokenUsage::new(900, 120), None);

        let result = h
            .pipeline
            .run(ModelKind::Fast, RoleKind::DataRelevant, "hateful text")
            .await
            .unwrap();

        assert_eq!(result, ExtractionResult::Flagged);
        let outcome = result.into_outcome();
        assert_eq!(outcome.info, Some(ExtractionTag::Flagged));
        assert_eq!(outcome.result.len(), 1);
        assert_eq!(outcome.result["cost"], Value::from(0.0));
        assert_eq!(chat_calls(&h), 0);
    }

    #[tokio::test]
    async fn test_refusal_token_signature_is_not_job() {
        let usage = TokenUsage::new(700, 8);
        let h = harness(false, "Sorry, this is a recipe", usage, None);

        let result = h
            .pipeline
            .run(ModelKind::Fast, RoleKind::General, "How to bake bread")
            .await
            .unwrap();

        assert_eq!(result.tag(), Some(ExtractionTag::NotJob));
        assert!(result.cost() > 0.0);
        assert_eq!(result.cost(), cost(ModelKind::Fast, &usage));
        let outcome = result.into_outcome();
        assert_eq!(outcome.result.len(), 1);
        assert!(outcome.result.contains_key("cost"));
    }

    #[tokio::test]
    async fn test_refusal_phrase_is_not_job_regardless_of_token_count() {
        let h = harness(
            false,
            "The input is not a job description.",
            TokenUsage::new(700, 9),
            None,
        );

        let result = h
            .pipeline
            .run(ModelKind::Advanced, RoleKind::General, "Lorem ipsum")
            .await
            .unwrap();

        assert!(matches!(result, ExtractionResult::NotAJobDescription { .. }));
    }

    #[tokio::test]
    async fn test_prose_output_is_malformed_but_billed() {
        let usage = TokenUsage::new(700, 40);
        let h = harness(false, "Here is what I found: Acme, Retail...", usage, None);

        let result = h
            .pipeline
            .run(ModelKind::Fast, RoleKind::DataRelevant, ACME_JD)
            .await
            .unwrap();

        assert_eq!(result.tag(), Some(ExtractionTag::NotJson));
        assert_eq!(result.cost(), cost(ModelKind::Fast, &usage));
        assert_eq!(result.into_outcome().result.len(), 1);
    }

    #[tokio::test]
    async fn test_json_array_output_is_malformed() {
        let h = harness(false, r#"["Acme Corp"]"#, TokenUsage::new(700, 40), None);

        let result = h
            .pipeline
            .run(ModelKind::Fast, RoleKind::General, ACME_JD)
            .await
            .unwrap();

        assert!(matches!(result, ExtractionResult::Malformed { .. }));
    }

    #[tokio::test]
    async fn test_success_persists_input_and_accumulates() {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(FileStorage::new(dir.path()));
        let usage = TokenUsage::new(912, 118);
        let h = harness(false, ACME_EXTRACTION, usage, Some(storage.clone()));

        let before = storage.load_results(ModelKind::Fast).await.unwrap().len();
        let result = h
            .pipeline
            .run(ModelKind::Fast, RoleKind::DataRelevant, ACME_JD)
            .await
            .unwrap();
        let after = storage.load_results(ModelKind::Fast).await.unwrap().len();

        assert_eq!(after, before + 1);
        assert_eq!(result.tag(), None);
        assert_eq!(result.cost(), cost(ModelKind::Fast, &usage));

        let outcome = result.into_outcome();
        for key in RoleKind::DataRelevant.schema_keys() {
            assert!(outcome.result.contains_key(key), "missing {key}");
        }
        assert_eq!(outcome.result["Company"], "Acme Corp");

        let inputs: Vec<_> = std::fs::read_dir(dir.path().join("text_input"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(inputs.len(), 1);
        assert!(inputs[0].starts_with("Acme_Corp_"));
        assert!(inputs[0].ends_with(".txt"));
    }

    #[tokio::test]
    async fn test_failed_append_leaves_no_raw_input() {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(FileStorage::new(dir.path()));
        let accumulation = storage.accumulation_path(ModelKind::Fast);
        std::fs::create_dir_all(accumulation.parent().unwrap()).unwrap();
        std::fs::write(&accumulation, r#"{"corrupt": true}"#).unwrap();
        let h = harness(false, ACME_EXTRACTION, TokenUsage::new(912, 118), Some(storage));

        let err = h
            .pipeline
            .run(ModelKind::Fast, RoleKind::DataRelevant, ACME_JD)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Storage(crate::storage::StorageError::NotAnArray(_))
        ));
        assert!(!dir.path().join("text_input").exists());
    }

    #[tokio::test]
    async fn test_long_company_name_still_succeeds() {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(FileStorage::new(dir.path()));
        let reply = format!(r#"{{"Company": "{}\u0000Corp"}}"#, "A".repeat(300));
        let h = harness(false, &reply, TokenUsage::new(912, 118), Some(storage));

        let result = h
            .pipeline
            .run(ModelKind::Fast, RoleKind::General, ACME_JD)
            .await
            .unwrap();

        assert!(matches!(result, ExtractionResult::Success { .. }));
        assert!(result.cost() > 0.0);
        assert_eq!(std::fs::read_dir(dir.path().join("text_input")).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_success_without_storage_writes_nothing() {
        let h = harness(false, ACME_EXTRACTION, TokenUsage::new(900, 118), None);

        let result = h
            .pipeline
            .run(ModelKind::Advanced, RoleKind::DataRelevant, ACME_JD)
            .await
            .unwrap();

        assert!(matches!(result, ExtractionResult::Success { .. }));
        assert!(h.pipeline.storage().is_none());
    }

    #[tokio::test]
    async fn test_role_prompt_and_sentinel_reach_the_provider() {
        let h = harness(false, ACME_EXTRACTION, TokenUsage::new(900, 118), None);

        h.pipeline
            .run(ModelKind::Advanced, RoleKind::SoftwareEngineer, "Rust role at Acme")
            .await
            .unwrap();

        let requests = h.chat.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, "gpt-4");
        assert_eq!(
            requests[0].messages[0].content,
            instruction_for(RoleKind::SoftwareEngineer)
        );
        assert_eq!(requests[0].messages[1].content, "####Rust role at Acme####");
    }

    #[tokio::test]
    async fn test_unknown_names_fail_before_any_provider_call() {
        let h = harness(false, ACME_EXTRACTION, TokenUsage::new(900, 118), None);

        let bad_model = h.pipeline.run_named("GPT-9", "General", ACME_JD).await;
        let bad_role = h.pipeline.run_named("GPT-3.5", "Astronaut", ACME_JD).await;

        assert!(matches!(bad_model, Err(PipelineError::InvalidArgument(_))));
        assert!(matches!(bad_role, Err(PipelineError::InvalidArgument(_))));
        assert_eq!(h.moderation.calls.load(Ordering::SeqCst), 0);
        assert_eq!(chat_calls(&h), 0);
    }

    #[tokio::test]
    async fn test_empty_input_fails_before_any_provider_call() {
        let h = harness(false, ACME_EXTRACTION, TokenUsage::new(900, 118), None);

        let err = h
            .pipeline
            .run(ModelKind::Fast, RoleKind::General, "   \n")
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::EmptyInput));
        assert_eq!(h.moderation.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_provider_failure_propagates() {
        let moderation = Arc::new(StubModeration {
            flagged: false,
            calls: AtomicUsize::new(0),
        });
        let pipeline = ExtractionPipeline::new(
            ModerationGate::new(moderation),
            CompletionClient::new(Arc::new(FailingChat)),
            None,
        );

        let err = pipeline
            .run(ModelKind::Fast, RoleKind::General, ACME_JD)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Provider(LlmError::Api { status: 503, .. })
        ));
    }
}
