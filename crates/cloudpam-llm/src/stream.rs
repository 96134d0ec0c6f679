//! `streamComplete`: a bounded channel of streaming events, built as a
//! typed event enum serialized the way `ChatMessage`/`ChatRole` are.

use aws_sdk_bedrockruntime::types::{
    ContentBlock, ContentBlockDelta, ConversationRole, ConverseStreamOutput, Message,
    SystemContentBlock,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::chat::{ChatMessage, ChatRole};
use crate::config::CompletionConfig;
use crate::error::LlmError;

/// Channel capacity for `streamComplete`.
pub const STREAM_CHANNEL_CAPACITY: usize = 64;

/// One event in a completion stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StreamEvent {
    /// An incremental chunk of assistant content.
    Delta(String),
    /// The stream is complete.
    Done { finish_reason: String },
    /// The upstream call failed mid-stream.
    Error(String),
}

/// `streamComplete(messages, options) -> channel<event>`.
///
/// Spawns a task that drives the Converse-stream API and forwards every
/// event to the returned receiver; the consumer must read until the
/// channel closes. The producer never persists anything itself —
/// persisting the assembled assistant message under an uncancellable
/// context is the consumer's responsibility once it has accumulated
/// every delta.
pub async fn stream_complete(
    config: &aws_config::SdkConfig,
    options: &CompletionConfig,
    system_prompt: &str,
    messages: &[ChatMessage],
) -> Result<mpsc::Receiver<StreamEvent>, LlmError> {
    let client = aws_sdk_bedrockruntime::Client::new(config);

    let mut converse_messages: Vec<Message> = Vec::with_capacity(messages.len());
    for msg in messages {
        let role = match msg.role {
            ChatRole::User => ConversationRole::User,
            ChatRole::Assistant => ConversationRole::Assistant,
        };
        let message = Message::builder()
            .role(role)
            .content(ContentBlock::Text(msg.content.clone()))
            .build()
            .map_err(|e| LlmError::Invocation(e.to_string()))?;
        converse_messages.push(message);
    }

    let response = client
        .converse_stream()
        .model_id(&options.model)
        .system(SystemContentBlock::Text(system_prompt.to_string()))
        .set_messages(Some(converse_messages))
        .inference_config(
            aws_sdk_bedrockruntime::types::InferenceConfiguration::builder()
                .max_tokens(options.max_tokens as i32)
                .temperature(options.temperature)
                .build(),
        )
        .send()
        .await
        .map_err(|e| LlmError::Invocation(e.into_service_error().to_string()))?;

    let mut stream = response.stream;
    let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
    let model = options.model.clone();

    tokio::spawn(async move {
        loop {
            match stream.recv().await {
                Ok(Some(ConverseStreamOutput::ContentBlockDelta(event))) => {
                    let Some(delta) = event.delta() else {
                        continue;
                    };
                    if let ContentBlockDelta::Text(text) = delta {
                        if tx.send(StreamEvent::Delta(text.clone())).await.is_err() {
                            return;
                        }
                    }
                }
                Ok(Some(ConverseStreamOutput::MessageStop(event))) => {
                    let finish_reason = event.stop_reason().as_str().to_string();
                    let _ = tx.send(StreamEvent::Done { finish_reason }).await;
                    return;
                }
                Ok(Some(_)) => continue,
                Ok(None) => return,
                Err(e) => {
                    warn!(model = %model, error = %e, "LLM stream ended with an error");
                    let _ = tx.send(StreamEvent::Error(e.to_string())).await;
                    return;
                }
            }
        }
    });

    info!(model = %options.model, "opened LLM completion stream");
    Ok(rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_capacity_is_at_least_64() {
        let (tx, _rx) = mpsc::channel::<StreamEvent>(STREAM_CHANNEL_CAPACITY);
        assert!(tx.capacity() >= 64);
    }
}
