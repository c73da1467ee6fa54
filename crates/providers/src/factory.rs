//! Build a [`ModelClient`] from provider configuration.

use kestrel_config::ProviderConfig;
use kestrel_core::error::ModelError;
use kestrel_core::model::ModelClient;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::anthropic::AnthropicClient;
use crate::openai_compat::{OpenAiCompatClient, OPENAI_BASE_URL};

/// Select and construct the client named by `config.name`.
///
/// "openai" and "anthropic" default to their hosted endpoints; any other
/// name is treated as an OpenAI-compatible server and needs `api_url`.
pub fn build_client(config: &ProviderConfig) -> Result<Arc<dyn ModelClient>, ModelError> {
    let timeout = Duration::from_secs(config.request_timeout_secs);
    let name = config.name.to_lowercase();

    let client: Arc<dyn ModelClient> = match name.as_str() {
        "anthropic" => {
            let key = config.api_key.clone().ok_or_else(|| {
                ModelError::NotConfigured("anthropic requires an API key".into())
            })?;
            let mut client = AnthropicClient::new(key, &config.model, timeout)?;
            if let Some(url) = &config.api_url {
                client = client.with_base_url(url);
            }
            Arc::new(client)
        }
        "openai" => {
            let url = config.api_url.as_deref().unwrap_or(OPENAI_BASE_URL);
            Arc::new(OpenAiCompatClient::new(
                "openai",
                url,
                config.api_key.clone(),
                &config.model,
                timeout,
            )?)
        }
        other => {
            let url = config.api_url.as_deref().ok_or_else(|| {
                ModelError::NotConfigured(format!("provider '{other}' requires api_url"))
            })?;
            Arc::new(OpenAiCompatClient::new(
                other,
                url,
                config.api_key.clone(),
                &config.model,
                timeout,
            )?)
        }
    };

    info!(provider = %client.provider_name(), model = %client.model_name(), "Model client ready");
    Ok(client)
}
