use async_trait::async_trait;
use thiserror::Error;

use buycar_core::domain::consult::{Consult, ConsultId, ConsultStatus, GenerationFields};

pub mod consult;
pub mod memory;

pub use consult::SqlConsultRepository;
pub use memory::InMemoryConsultRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("consult `{0}` already exists")]
    Duplicate(String),
}

#[async_trait]
pub trait ConsultRepository: Send + Sync {
    async fn create(&self, consult: &Consult) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: &ConsultId) -> Result<Option<Consult>, RepositoryError>;

    /// Moves `id` from `expected` to `next`. Returns `false` when the stored status was not
    /// `expected`, including when the consult does not exist.
    async fn update_status(
        &self,
        id: &ConsultId,
        expected: ConsultStatus,
        next: ConsultStatus,
    ) -> Result<bool, RepositoryError>;

    /// Writes the present fields in one statement. An update with no present fields performs no
    /// write at all.
    async fn update_generation_fields(
        &self,
        id: &ConsultId,
        fields: &GenerationFields,
    ) -> Result<(), RepositoryError>;
}
