//! Phase runner
//!
//! One invocation runs a single phase end to end:
//!
//! 1. Resolve provider settings from the context metadata
//! 2. Load plan, conversation and the active template
//! 3. Build the prompt through the phase strategy
//! 4. Call the generative backend, racing the cancellation token
//! 5. Validate the reply and build the transcript
//! 6. Persist artifacts and the execution record in one transaction
//!
//! A rejected reply never reaches step 6's artifact writes; its execution
//! record is still stored so operators can inspect the transcript.

use crate::cancel::CancellationToken;
use crate::chat::{ChatClient, ChatRequest};
use crate::config::{PhaseInvocationConfig, RunnerConfig};
use crate::context::PhaseContext;
use crate::error::PhaseError;
use crate::phases::{PhaseEnv, PhaseRegistry};
use chrono::{DateTime, Utc};
use quill_store::{Store, Transaction};
use quill_types::{
    Clock, ConversationId, ExecutionId, ExecutionOutcome, PhaseKind, PhaseTemplate, PlanId,
    PlannerExecution, StructuredMap, StructuredValue, SystemClock, TranscriptEntry,
};
use quill_validator::ResponseValidator;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Caller-facing outcome of a phase run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlanningOutcome {
    /// All artifacts persisted
    Success,
    /// Some output could not be applied
    Partial,
    /// Cancellation observed
    Cancelled,
    /// The run failed
    Failed,
}

impl PlanningOutcome {
    /// Outcome stored on the execution record
    #[inline]
    #[must_use]
    pub fn execution_outcome(self) -> ExecutionOutcome {
        match self {
            Self::Success => ExecutionOutcome::Completed,
            Self::Partial => ExecutionOutcome::Blocked,
            Self::Cancelled => ExecutionOutcome::Cancelled,
            Self::Failed => ExecutionOutcome::Failed,
        }
    }
}

/// Result of one phase run
#[derive(Debug)]
pub struct PhaseRunResult {
    /// Phase run
    pub phase: PhaseKind,
    /// Caller-facing status
    pub status: PlanningOutcome,
    /// One-line summary
    pub summary: String,
    /// Phase-specific data
    pub data: StructuredValue,
    /// Recorded exchanges
    pub transcripts: Vec<TranscriptEntry>,
    /// Execution record id, when the run got far enough to record one
    pub execution_id: Option<ExecutionId>,
    /// Reasons a partial run could not apply everything
    pub blocked: Vec<String>,
    /// Failure, for `Failed` and `Cancelled` results
    pub error: Option<PhaseError>,
}

impl PhaseRunResult {
    pub(crate) fn from_error(phase: PhaseKind, error: PhaseError, snippet_chars: usize) -> Self {
        let status = if error.is_cancelled() {
            PlanningOutcome::Cancelled
        } else {
            PlanningOutcome::Failed
        };
        let summary = match error.transcript() {
            Some(transcript) if snippet_chars > 0 => {
                format!("{error} (reply: {})", transcript.reply_snippet(snippet_chars))
            }
            _ => error.to_string(),
        };
        Self {
            phase,
            status,
            summary,
            data: StructuredValue::Null,
            transcripts: error.transcript().cloned().into_iter().collect(),
            execution_id: None,
            blocked: Vec::new(),
            error: Some(error),
        }
    }

    /// Whether the run persisted its artifacts (fully or partially)
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.status, PlanningOutcome::Success | PlanningOutcome::Partial)
    }
}

/// Identity of the execution being recorded
struct Attempt<'a> {
    id: ExecutionId,
    phase: PhaseKind,
    ctx: &'a PhaseContext,
    started_at: DateTime<Utc>,
}

impl Attempt<'_> {
    fn record(
        &self,
        outcome: ExecutionOutcome,
        transcript: Option<&TranscriptEntry>,
        error: Option<&PhaseError>,
        now: DateTime<Utc>,
    ) -> PlannerExecution {
        let rejected = !matches!(outcome, ExecutionOutcome::Completed | ExecutionOutcome::Blocked);
        PlannerExecution {
            id: self.id,
            plan_id: self.ctx.plan_id,
            phase: self.phase,
            agent_id: self.ctx.agent_id,
            iteration_index: self.ctx.iteration_index,
            outcome,
            critique_status: self.ctx.critique_status(rejected),
            transcripts: transcript.cloned().into_iter().collect(),
            error: error.map(ToString::to_string),
            started_at: self.started_at,
            completed_at: now,
        }
    }
}

/// Runs pipeline phases against a store and a generative backend
pub struct PhaseRunner {
    store: Arc<dyn Store>,
    chat: Arc<dyn ChatClient>,
    validator: ResponseValidator,
    registry: PhaseRegistry,
    clock: Arc<dyn Clock>,
    config: RunnerConfig,
}

impl std::fmt::Debug for PhaseRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseRunner")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PhaseRunner {
    /// Runner with the built-in phases, schemas and the system clock
    #[must_use]
    pub fn new(store: Arc<dyn Store>, chat: Arc<dyn ChatClient>) -> Self {
        Self {
            store,
            chat,
            validator: ResponseValidator::new(),
            registry: PhaseRegistry::with_defaults(),
            clock: Arc::new(SystemClock),
            config: RunnerConfig::default(),
        }
    }

    /// With a custom validator
    #[inline]
    #[must_use]
    pub fn with_validator(mut self, validator: ResponseValidator) -> Self {
        self.validator = validator;
        self
    }

    /// With a custom phase registry
    #[inline]
    #[must_use]
    pub fn with_registry(mut self, registry: PhaseRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// With a clock
    #[inline]
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// With prompt limits
    #[inline]
    #[must_use]
    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// Backing store
    #[must_use]
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Runner configuration
    #[must_use]
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run a phase, folding every failure into the result
    pub async fn run(
        &self,
        phase: PhaseKind,
        ctx: &PhaseContext,
        cancel: &CancellationToken,
    ) -> PhaseRunResult {
        match self.execute(phase, ctx, cancel).await {
            Ok(result) => result,
            Err(error) => {
                tracing::warn!(%phase, plan_id = %ctx.plan_id, error = %error, "phase run failed");
                PhaseRunResult::from_error(phase, error, self.config.snippet_chars)
            }
        }
    }

    /// Run a phase
    ///
    /// # Errors
    ///
    /// - [`PhaseError::Configuration`] before any network call when the
    ///   metadata lacks a valid provider id
    /// - [`PhaseError::NotFound`] when the plan, conversation or a target
    ///   chapter record is missing
    /// - [`PhaseError::ValidationFailed`] when the reply is rejected; no
    ///   artifacts are written
    /// - [`PhaseError::Cancelled`] when the token fires
    /// - collaborator errors, unmodified
    #[instrument(
        skip(self, ctx, cancel),
        fields(plan_id = %ctx.plan_id, iteration = ctx.iteration_index)
    )]
    pub async fn execute(
        &self,
        phase: PhaseKind,
        ctx: &PhaseContext,
        cancel: &CancellationToken,
    ) -> Result<PhaseRunResult, PhaseError> {
        let invocation = PhaseInvocationConfig::from_metadata(&ctx.metadata)?;
        let strategy = self
            .registry
            .get(phase)
            .ok_or(PhaseError::UnknownPhase(phase))?;
        if cancel.is_cancelled() {
            return Err(PhaseError::Cancelled { transcript: None });
        }

        let attempt = Attempt {
            id: ExecutionId::new(),
            phase,
            ctx,
            started_at: self.clock.now(),
        };
        let plan = self
            .store
            .plan(ctx.plan_id)
            .await?
            .ok_or_else(|| PhaseError::not_found(PlanId::KIND, ctx.plan_id))?;
        let conversation = self
            .store
            .conversation(ctx.conversation_id)
            .await?
            .ok_or_else(|| PhaseError::not_found(ConversationId::KIND, ctx.conversation_id))?;
        let template = self.active_template(phase).await?;

        let env = PhaseEnv {
            store: self.store.as_ref(),
            ctx,
            plan: &plan,
            conversation: &conversation,
            template: template.as_ref(),
            config: &self.config,
            execution_id: attempt.id,
            now: attempt.started_at,
        };
        let prompt = strategy.build_prompt(&env).await?;
        tracing::debug!(
            prompt_chars = prompt.text.len(),
            salient_terms = prompt.salient_terms.len(),
            "prompt assembled"
        );

        let request = ChatRequest {
            conversation_id: ctx.conversation_id,
            agent_id: ctx.agent_id,
            provider_id: invocation.provider_id.clone(),
            model_id: invocation.model_id.clone(),
            prompt: prompt.text.clone(),
        };
        let started = Instant::now();
        let reply = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let error = PhaseError::Cancelled { transcript: None };
                self.record_failure(&attempt, ExecutionOutcome::Cancelled, &error).await;
                return Err(error);
            }
            reply = self.chat.chat(request, cancel) => reply,
        };
        let reply = match reply {
            Ok(reply) => reply,
            Err(chat_error) => {
                let error = PhaseError::from(chat_error);
                let outcome = if error.is_cancelled() {
                    ExecutionOutcome::Cancelled
                } else {
                    ExecutionOutcome::Failed
                };
                self.record_failure(&attempt, outcome, &error).await;
                return Err(error);
            }
        };
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let validation = strategy.validate(&self.validator, &reply.text, &prompt)?;
        let mut correlation = prompt.correlation.clone();
        correlation.conversation_id = Some(ctx.conversation_id);
        correlation.message_id.clone_from(&reply.message_id);
        let mut diagnostics = diagnostics_from([
            ("providerId", StructuredValue::from(invocation.provider_id.as_str())),
            ("modelId", StructuredValue::from(invocation.model_id.clone())),
            ("salientTerms", StructuredValue::from(prompt.salient_terms.len())),
        ]);
        if let Some(template) = &template {
            let name = StructuredValue::from(template.name.as_str());
            diagnostics.insert("template".to_string(), name);
        }
        let transcript = TranscriptEntry {
            phase,
            prompt: prompt.text.clone(),
            reply: reply.text.clone(),
            latency_ms,
            validation_status: validation.status,
            validation_details: validation.details(),
            correlation,
            diagnostics,
            recorded_at: self.clock.now(),
        };

        if !validation.is_passed() {
            tracing::info!(
                %phase,
                details = ?transcript.validation_details,
                reply = %transcript.reply_snippet(self.config.snippet_chars),
                "reply rejected by validator"
            );
            let error = PhaseError::ValidationFailed {
                result: Box::new(validation),
                transcript: Box::new(transcript),
            };
            self.record_failure(&attempt, ExecutionOutcome::Failed, &error).await;
            return Err(error);
        }

        if cancel.is_cancelled() {
            let error = PhaseError::Cancelled {
                transcript: Some(Box::new(transcript)),
            };
            self.record_failure(&attempt, ExecutionOutcome::Cancelled, &error).await;
            return Err(error);
        }

        let artifacts = match strategy
            .persist_artifacts(&env, &prompt, &reply.text, &validation)
            .await
        {
            Ok(artifacts) => artifacts,
            Err(source) => {
                let error = PhaseError::Persistence {
                    source: Box::new(source),
                    transcript: Box::new(transcript),
                };
                self.record_failure(&attempt, ExecutionOutcome::Failed, &error).await;
                return Err(error);
            }
        };

        let status = if artifacts.blocked.is_empty() {
            PlanningOutcome::Success
        } else {
            PlanningOutcome::Partial
        };
        let mut tx = artifacts.tx;
        tx.put(attempt.record(
            status.execution_outcome(),
            Some(&transcript),
            None,
            self.clock.now(),
        ));
        let writes = tx.len();
        if let Err(store_error) = self.store.commit(tx).await {
            let error = PhaseError::Persistence {
                source: Box::new(PhaseError::Store(store_error)),
                transcript: Box::new(transcript),
            };
            self.record_failure(&attempt, ExecutionOutcome::Failed, &error).await;
            return Err(error);
        }

        tracing::info!(
            %phase,
            execution_id = %attempt.id,
            ?status,
            writes,
            latency_ms,
            "phase completed"
        );

        Ok(PhaseRunResult {
            phase,
            status,
            summary: artifacts.summary,
            data: artifacts.data,
            transcripts: vec![transcript],
            execution_id: Some(attempt.id),
            blocked: artifacts.blocked,
            error: None,
        })
    }

    /// Most recently updated active template for a phase
    async fn active_template(&self, phase: PhaseKind) -> Result<Option<PhaseTemplate>, PhaseError> {
        Ok(self
            .store
            .templates()
            .await?
            .into_iter()
            .filter(|t| t.phase == phase && t.is_active)
            .max_by_key(|t| t.updated_at))
    }

    /// Store an execution record for a failed run; failures are logged only
    async fn record_failure(
        &self,
        attempt: &Attempt<'_>,
        outcome: ExecutionOutcome,
        error: &PhaseError,
    ) {
        let execution = attempt.record(outcome, error.transcript(), Some(error), self.clock.now());
        let id = execution.id;
        let mut tx = Transaction::new();
        tx.put(execution);
        if let Err(error) = self.store.commit(tx).await {
            tracing::warn!(execution_id = %id, error = %error, "failed to record execution");
        }
    }
}

fn diagnostics_from<const N: usize>(pairs: [(&str, StructuredValue); N]) -> StructuredMap {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}
