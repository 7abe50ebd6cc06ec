use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::LlmError;
use crate::provider::{ProviderAdapter, registered_factories};
use crate::stream::StreamEventStream;
use crate::types::{Request, Response};

/// Routes requests to named provider adapters.
#[derive(Clone, Default)]
pub struct Client {
    providers: HashMap<String, Arc<dyn ProviderAdapter>>,
    default_provider: Option<String>,
}

impl Client {
    pub fn new(
        providers: HashMap<String, Arc<dyn ProviderAdapter>>,
        default_provider: Option<String>,
    ) -> Self {
        Self {
            providers,
            default_provider,
        }
    }

    pub fn register_provider(&mut self, provider: Arc<dyn ProviderAdapter>) {
        let name = provider.name().to_string();
        if self.default_provider.is_none() {
            self.default_provider = Some(name.clone());
        }
        self.providers.insert(name, provider);
    }

    pub fn set_default_provider(&mut self, provider: impl Into<String>) {
        self.default_provider = Some(provider.into());
    }

    pub fn has_provider(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// Build a client from every factory whose environment is satisfied.
    pub fn from_env() -> Self {
        let mut client = Client::default();
        for factory in registered_factories() {
            if let Some(adapter) = factory.from_env() {
                client.register_provider(adapter);
            }
        }
        client
    }

    pub async fn complete(&self, mut request: Request) -> Result<Response, LlmError> {
        let adapter = self.resolve_adapter(&request)?;
        request.provider = Some(adapter.name().to_string());
        adapter.complete(request).await
    }

    pub async fn stream(&self, mut request: Request) -> Result<StreamEventStream, LlmError> {
        let adapter = self.resolve_adapter(&request)?;
        request.provider = Some(adapter.name().to_string());
        adapter.stream(request).await
    }

    fn resolve_adapter(&self, request: &Request) -> Result<Arc<dyn ProviderAdapter>, LlmError> {
        let name = request
            .provider
            .as_deref()
            .or(self.default_provider.as_deref())
            .ok_or_else(|| LlmError::Configuration("no provider configured".to_string()))?;
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| LlmError::Configuration(format!("provider '{}' not registered", name)))
    }
}
