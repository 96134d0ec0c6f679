//! cloudpam-llm
//!
//! The LLM completion capability and the thin planning adapter built on
//! top of it: synchronous and streaming completion over Bedrock,
//! pool-context assembly, and fenced-JSON `GeneratedPlan` extraction from
//! assistant output.

pub mod chat;
pub mod config;
pub mod context;
pub mod error;
pub mod extract;
pub mod stream;

pub use chat::{complete, ChatMessage, ChatRole, CompletionResult, TokenUsage};
pub use config::CompletionConfig;
pub use context::{build_context_block, ContextPool};
pub use error::LlmError;
pub use extract::{extract_plan, GeneratedPlan, GeneratedPool};
pub use stream::{stream_complete, StreamEvent, STREAM_CHANNEL_CAPACITY};
