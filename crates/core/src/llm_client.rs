use anyhow::{Result, anyhow};
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs},
};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::pin::Pin;

/// A stream of incremental text chunks from the model.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A single-prompt completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub temperature: f32,
}

/// Streaming chat completion, injected into the engine so tests can replace
/// the live model with a deterministic stream.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn stream_complete(&self, request: GenerationRequest) -> Result<TextStream>;
}

/// An implementation of `GenerationProvider` for any OpenAI-compatible API.
pub struct OpenAICompatibleProvider {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAICompatibleProvider {
    /// Creates a new provider for an OpenAI-compatible service.
    ///
    /// # Arguments
    ///
    /// * `config` - The configuration for the OpenAI client, including API key and base URL.
    /// * `model` - The model identifier to use for chat completions (e.g., "gpt-4o").
    pub fn new(config: OpenAIConfig, model: String) -> Self {
        Self {
            client: Client::with_config(config),
            model,
        }
    }
}

#[async_trait]
impl GenerationProvider for OpenAICompatibleProvider {
    async fn stream_complete(&self, request: GenerationRequest) -> Result<TextStream> {
        let completion = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(request.temperature)
            .messages(vec![
                ChatCompletionRequestUserMessageArgs::default()
                    .content(request.prompt)
                    .build()?
                    .into(),
            ])
            .stream(true)
            .build()?;

        let stream = self.client.chat().create_stream(completion).await?;

        Ok(Box::pin(stream.filter_map(|result| async move {
            match result {
                Ok(response) => {
                    let content = response.choices.first()?.delta.content.clone()?;
                    if content.is_empty() { None } else { Some(Ok(content)) }
                }
                Err(e) => Some(Err(anyhow!(e))),
            }
        })))
    }
}
