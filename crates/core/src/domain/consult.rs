use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConsultId(pub String);

impl ConsultId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Accepts only the canonical hyphenated UUID form that `generate` produces.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        Uuid::parse_str(trimmed)
            .ok()
            .map(|id| id.hyphenated().to_string())
            .filter(|canonical| canonical.eq_ignore_ascii_case(trimmed))
            .map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConsultId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsultStatus {
    Created,
    Processing,
    Completed,
    Failed,
}

impl ConsultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "created" => Some(Self::Created),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn can_transition_to(&self, next: ConsultStatus) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Processing)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
        )
    }

    pub fn ensure_transition(&self, next: ConsultStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            return Ok(());
        }

        Err(DomainError::InvalidConsultTransition { from: *self, to: next })
    }
}

/// Free-text purchase preferences. Every field is optional.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsultPreferences {
    pub budget_range: Option<String>,
    pub preferred_type: Option<String>,
    pub use_case: Option<String>,
    pub fuel_type: Option<String>,
    pub brand_preference: Option<String>,
}

/// Provider metadata written by the background generation task.
///
/// `None` means "leave the stored value unchanged".
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationFields {
    pub llm_model: Option<String>,
    pub llm_prompt: Option<String>,
    pub llm_response: Option<String>,
    pub recommendations: Option<String>,
}

impl GenerationFields {
    pub fn is_empty(&self) -> bool {
        self.llm_model.is_none()
            && self.llm_prompt.is_none()
            && self.llm_response.is_none()
            && self.recommendations.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consult {
    pub id: ConsultId,
    pub user_id: Option<i64>,
    pub preferences: ConsultPreferences,
    pub generation: GenerationFields,
    pub status: ConsultStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Consult {
    pub fn new(preferences: ConsultPreferences, user_id: Option<i64>) -> Self {
        let now = Utc::now();
        Self {
            id: ConsultId::generate(),
            user_id,
            preferences,
            generation: GenerationFields::default(),
            status: ConsultStatus::Created,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn transition_to(&mut self, next: ConsultStatus) -> Result<(), DomainError> {
        self.status.ensure_transition(next)?;
        self.status = next;
        Ok(())
    }

    /// Overwrites only the fields present in `fields`.
    pub fn apply_generation(&mut self, fields: GenerationFields) {
        let GenerationFields { llm_model, llm_prompt, llm_response, recommendations } = fields;
        if llm_model.is_some() {
            self.generation.llm_model = llm_model;
        }
        if llm_prompt.is_some() {
            self.generation.llm_prompt = llm_prompt;
        }
        if llm_response.is_some() {
            self.generation.llm_response = llm_response;
        }
        if recommendations.is_some() {
            self.generation.recommendations = recommendations;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Consult, ConsultId, ConsultPreferences, ConsultStatus, GenerationFields};
    use crate::errors::DomainError;

    #[test]
    fn new_consult_starts_created_without_provider_metadata() {
        let consult = Consult::new(ConsultPreferences::default(), None);

        assert_eq!(consult.status, ConsultStatus::Created);
        assert_eq!(consult.generation, GenerationFields::default());
        assert_eq!(consult.created_at, consult.updated_at);
        assert!(ConsultId::parse(consult.id.as_str()).is_some());
    }

    #[test]
    fn generated_ids_do_not_collide() {
        let ids: std::collections::HashSet<_> =
            (0..1_000).map(|_| ConsultId::generate()).collect();
        assert_eq!(ids.len(), 1_000);
    }

    #[test]
    fn parse_rejects_malformed_identifiers() {
        assert!(ConsultId::parse("").is_none());
        assert!(ConsultId::parse("1700000000000000000").is_none());
        assert!(ConsultId::parse("not-a-consult").is_none());
        assert!(ConsultId::parse("67e5504410b1426f9247bb680e5fe0c8").is_none());
        assert!(ConsultId::parse("67e55044-10b1-426f-9247-bb680e5fe0c8").is_some());
    }

    #[test]
    fn lifecycle_follows_the_forward_path() {
        let mut consult = Consult::new(ConsultPreferences::default(), Some(7));
        consult.transition_to(ConsultStatus::Processing).expect("created -> processing");
        consult.transition_to(ConsultStatus::Completed).expect("processing -> completed");
        assert!(consult.status.is_terminal());
    }

    #[test]
    fn lifecycle_blocks_skips_and_regressions() {
        let mut consult = Consult::new(ConsultPreferences::default(), None);
        let error = consult
            .transition_to(ConsultStatus::Completed)
            .expect_err("created -> completed skips processing");
        assert!(matches!(
            error,
            DomainError::InvalidConsultTransition {
                from: ConsultStatus::Created,
                to: ConsultStatus::Completed
            }
        ));

        consult.transition_to(ConsultStatus::Processing).expect("created -> processing");
        consult.transition_to(ConsultStatus::Failed).expect("processing -> failed");
        assert!(consult.transition_to(ConsultStatus::Processing).is_err());
        assert!(consult.transition_to(ConsultStatus::Completed).is_err());
    }

    #[test]
    fn status_round_trips_from_storage_encoding() {
        let cases = [
            ConsultStatus::Created,
            ConsultStatus::Processing,
            ConsultStatus::Completed,
            ConsultStatus::Failed,
        ];

        for status in cases {
            assert_eq!(ConsultStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ConsultStatus::parse("pending"), None);
    }

    #[test]
    fn apply_generation_only_overwrites_present_fields() {
        let mut consult = Consult::new(ConsultPreferences::default(), None);
        consult.apply_generation(GenerationFields {
            llm_model: Some("qwen-plus".to_string()),
            llm_prompt: Some("prompt".to_string()),
            ..GenerationFields::default()
        });
        consult.apply_generation(GenerationFields {
            llm_response: Some("Car A: reason".to_string()),
            ..GenerationFields::default()
        });

        assert_eq!(consult.generation.llm_model.as_deref(), Some("qwen-plus"));
        assert_eq!(consult.generation.llm_prompt.as_deref(), Some("prompt"));
        assert_eq!(consult.generation.llm_response.as_deref(), Some("Car A: reason"));
        assert_eq!(consult.generation.recommendations, None);
    }
}
