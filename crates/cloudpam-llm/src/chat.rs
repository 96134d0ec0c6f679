//! The synchronous half of the LLM completion capability:
//! `complete(messages, options) -> {content, finish_reason, tokens}`.
//!
//! Same message-building loop, same Converse API call, and same
//! text-block extraction as the streaming half, generalized to return
//! token usage and finish reason alongside content.

use aws_sdk_bedrockruntime::types::{ContentBlock, ConversationRole, Message, SystemContentBlock};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::CompletionConfig;
use crate::error::LlmError;

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

/// Token accounting for one completion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Result of a synchronous completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResult {
    pub content: String,
    pub finish_reason: String,
    pub tokens: TokenUsage,
}

/// `complete(messages, options)` — a single non-streaming round trip.
pub async fn complete(
    config: &aws_config::SdkConfig,
    options: &CompletionConfig,
    system_prompt: &str,
    messages: &[ChatMessage],
) -> Result<CompletionResult, LlmError> {
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

    let mut request = client
        .converse()
        .model_id(&options.model)
        .system(SystemContentBlock::Text(system_prompt.to_string()))
        .set_messages(Some(converse_messages));
    request = request.inference_config(
        aws_sdk_bedrockruntime::types::InferenceConfiguration::builder()
            .max_tokens(options.max_tokens as i32)
            .temperature(options.temperature)
            .build(),
    );

    info!(model = %options.model, "sending completion request");

    let response = request
        .send()
        .await
        .map_err(|e| LlmError::Invocation(e.into_service_error().to_string()))?;

    let output_message = response
        .output()
        .and_then(|o| o.as_message().ok())
        .ok_or_else(|| LlmError::ResponseParse("no message in response".to_string()))?;

    let content = output_message
        .content()
        .iter()
        .filter_map(|block| {
            if let ContentBlock::Text(text) = block {
                Some(text.as_str())
            } else {
                None
            }
        })
        .collect::<Vec<_>>()
        .join("");

    let finish_reason = response.stop_reason().as_str().to_string();
    let tokens = response
        .usage()
        .map(|u| TokenUsage {
            input_tokens: u.input_tokens().max(0) as u32,
            output_tokens: u.output_tokens().max(0) as u32,
        })
        .unwrap_or(TokenUsage {
            input_tokens: 0,
            output_tokens: 0,
        });

    info!(
        model = %options.model,
        finish_reason = %finish_reason,
        output_tokens = tokens.output_tokens,
        "completion finished"
    );

    Ok(CompletionResult {
        content,
        finish_reason,
        tokens,
    })
}
