//! Recommendation generation for car purchase consults.
//!
//! This crate owns everything that talks to a text-generation vendor:
//! - `llm::ProviderClient` - uniform `generate(prompt)` over each vendor's wire format
//! - `llm::ProviderFactory` - picks a client from configuration and fails closed when generation
//!   is disabled, the provider is unknown, or credentials are missing
//!
//! Prompt rendering lives in `buycar_core::prompt`; the consult lifecycle that drives these
//! clients lives in the server crate.

pub mod llm;

pub use llm::{
    ConfigProviderFactory, Generation, ProviderClient, ProviderError, ProviderFactory,
    ProviderKind,
};
