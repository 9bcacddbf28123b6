//! LLM 层：补全客户端抽象与实现（OpenAI 兼容 / DeepSeek / 脚本化）

pub mod deepseek;
pub mod mock;
pub mod openai;
pub mod timeout;
pub mod traits;

use std::sync::Arc;

pub use deepseek::{create_deepseek_client, DEEPSEEK_CHAT, DEEPSEEK_REASONER};
pub use mock::ScriptedLlmClient;
pub use openai::OpenAiClient;
pub use timeout::TimeoutLlmClient;
pub use traits::{LlmClient, LlmError, TokenUsage};

use crate::config::AppConfig;
use crate::core::AnalystError;

/// 根据配置选择 LLM 后端（OpenAI 兼容 / DeepSeek），并套上有界等待
pub fn create_llm_from_config(cfg: &AppConfig) -> Result<Arc<dyn LlmClient>, AnalystError> {
    let api_key = cfg.llm.api_key.as_deref().ok_or_else(|| {
        AnalystError::Config(
            "no API key: set llm.api_key, ANALYST__LLM__API_KEY or OPENAI_API_KEY".to_string(),
        )
    })?;
    let timeout_secs = cfg.llm.timeouts.request;
    let base_url = cfg.llm.base_url.as_deref();

    match cfg.llm.provider.to_lowercase().as_str() {
        "deepseek" => {
            let client = create_deepseek_client(base_url, Some(&cfg.llm.model), api_key);
            tracing::info!("Using DeepSeek LLM ({})", client.model());
            Ok(Arc::new(TimeoutLlmClient::new(client, timeout_secs)))
        }
        "openai" => {
            tracing::info!("Using OpenAI LLM ({})", cfg.llm.model);
            let client = OpenAiClient::new(base_url, &cfg.llm.model, api_key);
            Ok(Arc::new(TimeoutLlmClient::new(client, timeout_secs)))
        }
        other => Err(AnalystError::Config(format!("unknown llm.provider '{}'", other))),
    }
}
