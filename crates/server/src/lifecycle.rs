//! Consult lifecycle: creation, background generation, and lookup.
//!
//! `submit` persists a `created` consult and hands generation to a spawned task that does not
//! belong to the request. The task claims the consult with a conditional `created -> processing`
//! write, so at most one generation ever runs per consult, then records the outcome and moves the
//! consult to `completed` or `failed`. Failures inside the task are written to the consult, never
//! returned to the submitter.

use std::sync::Arc;
use std::time::Duration;

use buycar_agent::{ProviderError, ProviderFactory};
use buycar_core::config::GenerationConfig;
use buycar_core::{
    build_prompt, ApplicationError, Consult, ConsultId, ConsultPreferences, ConsultStatus,
    GenerationFields,
};
use buycar_db::ConsultRepository;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const CLAIM_ATTEMPTS: u32 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GenerationOutcome {
    Completed,
    Failed,
    /// The consult was not claimed, either because another task holds it or because the claim
    /// could not be written.
    Skipped,
}

#[derive(Clone)]
pub struct ConsultLifecycle {
    repository: Arc<dyn ConsultRepository>,
    providers: Arc<dyn ProviderFactory>,
    permits: Arc<Semaphore>,
    generation_timeout: Duration,
}

impl ConsultLifecycle {
    pub fn new(
        repository: Arc<dyn ConsultRepository>,
        providers: Arc<dyn ProviderFactory>,
        generation: &GenerationConfig,
    ) -> Self {
        Self::with_limits(
            repository,
            providers,
            Duration::from_secs(generation.timeout_secs),
            generation.max_in_flight,
        )
    }

    pub fn with_limits(
        repository: Arc<dyn ConsultRepository>,
        providers: Arc<dyn ProviderFactory>,
        generation_timeout: Duration,
        max_in_flight: usize,
    ) -> Self {
        Self {
            repository,
            providers,
            permits: Arc::new(Semaphore::new(max_in_flight.clamp(1, Semaphore::MAX_PERMITS))),
            generation_timeout,
        }
    }

    pub async fn submit(
        &self,
        preferences: ConsultPreferences,
        user_id: Option<i64>,
    ) -> Result<Consult, ApplicationError> {
        let consult = Consult::new(preferences, user_id);
        self.repository
            .create(&consult)
            .await
            .map_err(|error| ApplicationError::Persistence(error.to_string()))?;

        info!(
            event_name = "consult.submitted",
            consult_id = %consult.id,
            anonymous = consult.user_id.is_none(),
            "consult created, scheduling generation"
        );

        self.dispatch(consult.clone());
        Ok(consult)
    }

    /// Spawns generation for `consult` on the runtime, detached from the caller.
    pub fn dispatch(&self, consult: Consult) -> JoinHandle<GenerationOutcome> {
        let lifecycle = self.clone();
        tokio::spawn(async move { lifecycle.generate(consult).await })
    }

    pub async fn query_by_id(&self, raw_id: &str) -> Result<Consult, ApplicationError> {
        let trimmed = raw_id.trim();
        if trimmed.is_empty() {
            return Err(ApplicationError::Validation("consult_id must not be empty".to_string()));
        }
        let id = ConsultId::parse(trimmed).ok_or_else(|| {
            ApplicationError::Validation(format!(
                "consult_id `{trimmed}` is not a valid identifier"
            ))
        })?;

        self.repository
            .find_by_id(&id)
            .await
            .map_err(|error| ApplicationError::Persistence(error.to_string()))?
            .ok_or_else(|| ApplicationError::NotFound(format!("consult `{id}` not found")))
    }

    async fn generate(&self, consult: Consult) -> GenerationOutcome {
        let Ok(_permit) = self.permits.clone().acquire_owned().await else {
            warn!(
                event_name = "consult.generation.rejected",
                consult_id = %consult.id,
                "generation limiter closed"
            );
            return GenerationOutcome::Skipped;
        };

        if !self.claim(&consult.id).await {
            return GenerationOutcome::Skipped;
        }

        let prompt = build_prompt(&consult);

        let client = match self.providers.create_client() {
            Ok(client) => client,
            Err(error) => {
                let fields = GenerationFields {
                    llm_prompt: Some(prompt),
                    llm_response: Some(format!("provider unavailable: {error}")),
                    ..GenerationFields::default()
                };
                let reason = error.to_string();
                return self.finish(&consult.id, fields, ConsultStatus::Failed, &reason).await;
            }
        };

        let generation = tokio::time::timeout(self.generation_timeout, client.generate(&prompt));
        let result = match generation.await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout {
                provider: client.provider(),
                seconds: self.generation_timeout.as_secs(),
            }),
        };

        match result {
            Ok(generation) if generation.has_content() => {
                let fields = GenerationFields {
                    llm_model: Some(generation.model),
                    llm_prompt: Some(prompt),
                    llm_response: Some(generation.content.clone()),
                    recommendations: Some(generation.content),
                };
                self.finish(&consult.id, fields, ConsultStatus::Completed, "generated").await
            }
            Ok(generation) => {
                let response = if generation.raw.is_empty() {
                    "provider returned no recommendation text".to_string()
                } else {
                    generation.raw
                };
                let fields = GenerationFields {
                    llm_model: Some(generation.model),
                    llm_prompt: Some(prompt),
                    llm_response: Some(response),
                    recommendations: None,
                };
                self.finish(&consult.id, fields, ConsultStatus::Failed, "empty provider content")
                    .await
            }
            Err(error) => {
                let fields = GenerationFields {
                    llm_model: Some(client.model().to_string()),
                    llm_prompt: Some(prompt),
                    llm_response: Some(failure_text(&error)),
                    recommendations: None,
                };
                self.finish(&consult.id, fields, ConsultStatus::Failed, &error.to_string()).await
            }
        }
    }

    /// Moves the consult from `created` to `processing`. A storage error is retried once; if the
    /// claim still cannot be written the consult is left untouched in `created`.
    async fn claim(&self, id: &ConsultId) -> bool {
        for attempt in 1..=CLAIM_ATTEMPTS {
            match self
                .repository
                .update_status(id, ConsultStatus::Created, ConsultStatus::Processing)
                .await
            {
                Ok(true) => return true,
                Ok(false) => {
                    info!(
                        event_name = "consult.generation.skipped",
                        consult_id = %id,
                        "consult already claimed by another generation"
                    );
                    return false;
                }
                Err(error) => warn!(
                    event_name = "consult.status.write_failed",
                    consult_id = %id,
                    status = ConsultStatus::Processing.as_str(),
                    attempt,
                    error = %error,
                    "could not mark consult processing"
                ),
            }
        }

        warn!(
            event_name = "consult.generation.abandoned",
            consult_id = %id,
            "claim failed, consult left in created state"
        );
        false
    }

    // Storage errors are logged and swallowed. The field write and the status write are
    // independent.
    async fn finish(
        &self,
        id: &ConsultId,
        fields: GenerationFields,
        terminal: ConsultStatus,
        reason: &str,
    ) -> GenerationOutcome {
        if let Err(error) = self.repository.update_generation_fields(id, &fields).await {
            warn!(
                event_name = "consult.generation.write_failed",
                consult_id = %id,
                error = %error,
                "could not store generation fields"
            );
        }

        match self.repository.update_status(id, ConsultStatus::Processing, terminal).await {
            Ok(true) => {}
            Ok(false) => warn!(
                event_name = "consult.status.conflict",
                consult_id = %id,
                status = terminal.as_str(),
                "consult was not in processing state"
            ),
            Err(error) => warn!(
                event_name = "consult.status.write_failed",
                consult_id = %id,
                status = terminal.as_str(),
                error = %error,
                "could not store terminal status"
            ),
        }

        if terminal == ConsultStatus::Completed {
            info!(
                event_name = "consult.generation.completed",
                consult_id = %id,
                "consult completed"
            );
            GenerationOutcome::Completed
        } else {
            warn!(
                event_name = "consult.generation.failed",
                consult_id = %id,
                reason,
                "consult failed"
            );
            GenerationOutcome::Failed
        }
    }
}

fn failure_text(error: &ProviderError) -> String {
    match error.raw() {
        Some(raw) if !raw.is_empty() => format!("generation failed: {error}\n{raw}"),
        _ => format!("generation failed: {error}"),
    }
}
