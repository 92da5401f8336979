pub mod config;
pub mod domain;
pub mod errors;
pub mod prompt;

pub use domain::consult::{
    Consult, ConsultId, ConsultPreferences, ConsultStatus, GenerationFields,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use prompt::build_prompt;
