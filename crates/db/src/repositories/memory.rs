use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;

use buycar_core::domain::consult::{Consult, ConsultId, ConsultStatus, GenerationFields};

use super::{ConsultRepository, RepositoryError};

#[derive(Default)]
pub struct InMemoryConsultRepository {
    consults: RwLock<HashMap<String, Consult>>,
}

#[async_trait::async_trait]
impl ConsultRepository for InMemoryConsultRepository {
    async fn create(&self, consult: &Consult) -> Result<(), RepositoryError> {
        let mut consults = self.consults.write().await;
        if consults.contains_key(consult.id.as_str()) {
            return Err(RepositoryError::Duplicate(consult.id.0.clone()));
        }
        consults.insert(consult.id.0.clone(), consult.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &ConsultId) -> Result<Option<Consult>, RepositoryError> {
        let consults = self.consults.read().await;
        Ok(consults.get(id.as_str()).cloned())
    }

    async fn update_status(
        &self,
        id: &ConsultId,
        expected: ConsultStatus,
        next: ConsultStatus,
    ) -> Result<bool, RepositoryError> {
        let mut consults = self.consults.write().await;
        match consults.get_mut(id.as_str()) {
            Some(consult) if consult.status == expected => {
                if consult.transition_to(next).is_err() {
                    return Ok(false);
                }
                consult.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_generation_fields(
        &self,
        id: &ConsultId,
        fields: &GenerationFields,
    ) -> Result<(), RepositoryError> {
        if fields.is_empty() {
            return Ok(());
        }

        let mut consults = self.consults.write().await;
        if let Some(consult) = consults.get_mut(id.as_str()) {
            consult.apply_generation(fields.clone());
            consult.updated_at = Utc::now();
        }
        Ok(())
    }
}
