use std::sync::Arc;

use buycar_core::config::LlmConfig;

use super::{OpenAiCompatClient, ProviderClient, ProviderError, TongyiClient};

/// Produces a provider client for one generation.
pub trait ProviderFactory: Send + Sync {
    fn create_client(&self) -> Result<Arc<dyn ProviderClient>, ProviderError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderKind {
    Tongyi,
    OpenAi,
}

impl ProviderKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tongyi" => Some(Self::Tongyi),
            "openai" => Some(Self::OpenAi),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tongyi => super::tongyi::PROVIDER,
            Self::OpenAi => super::openai::PROVIDER,
        }
    }
}

/// Builds clients from the configuration captured at construction time.
#[derive(Clone, Debug)]
pub struct ConfigProviderFactory {
    config: LlmConfig,
}

impl ConfigProviderFactory {
    pub fn new(config: LlmConfig) -> Self {
        Self { config }
    }
}

impl ProviderFactory for ConfigProviderFactory {
    fn create_client(&self) -> Result<Arc<dyn ProviderClient>, ProviderError> {
        if !self.config.enabled {
            return Err(ProviderError::Disabled);
        }

        match ProviderKind::parse(&self.config.provider) {
            Some(ProviderKind::Tongyi) => Ok(Arc::new(TongyiClient::new(&self.config.tongyi)?)),
            Some(ProviderKind::OpenAi) => {
                Ok(Arc::new(OpenAiCompatClient::new(&self.config.openai)?))
            }
            None => Err(ProviderError::UnknownProvider(self.config.provider.trim().to_string())),
        }
    }
}
