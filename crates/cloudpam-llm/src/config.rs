//! LLM completion configuration, read from the environment.

const DEFAULT_MODEL: &str = "gpt-4o";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Configuration for the LLM completion capability. Constructed via
/// [`CompletionConfig::from_env`], which never panics — a missing or
/// malformed value silently falls back to its default rather than
/// aborting construction.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub endpoint: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            endpoint: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

impl CompletionConfig {
    /// Reads `CLOUDPAM_LLM_API_KEY`, `CLOUDPAM_LLM_MODEL`,
    /// `CLOUDPAM_LLM_ENDPOINT`, `CLOUDPAM_LLM_MAX_TOKENS`,
    /// `CLOUDPAM_LLM_TEMPERATURE`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_key: std::env::var("CLOUDPAM_LLM_API_KEY").ok(),
            model: std::env::var("CLOUDPAM_LLM_MODEL").unwrap_or(defaults.model),
            endpoint: std::env::var("CLOUDPAM_LLM_ENDPOINT").ok(),
            max_tokens: std::env::var("CLOUDPAM_LLM_MAX_TOKENS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_tokens),
            temperature: std::env::var("CLOUDPAM_LLM_TEMPERATURE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.temperature),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_gpt4o_4096_tokens_0_7_temp() {
        let cfg = CompletionConfig::default();
        assert_eq!(cfg.model, "gpt-4o");
        assert_eq!(cfg.max_tokens, 4096);
        assert!((cfg.temperature - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn from_env_falls_back_on_malformed_numeric_value() {
        std::env::set_var("CLOUDPAM_LLM_MAX_TOKENS", "not-a-number");
        let cfg = CompletionConfig::from_env();
        assert_eq!(cfg.max_tokens, 4096);
        std::env::remove_var("CLOUDPAM_LLM_MAX_TOKENS");
    }
}
