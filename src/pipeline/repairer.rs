//! Repairer：根据失败原因让 LLM 重写脚本
//!
//! 新脚本无条件替换旧脚本（不做 diff / 局部补丁）。失败原因可以是 stderr、超时或 "Invalid JSON Output"。

use std::sync::Arc;

use crate::llm::{LlmClient, LlmError};
use crate::pipeline::prompts::render;

pub struct Repairer {
    llm: Arc<dyn LlmClient>,
    template: String,
}

impl Repairer {
    pub fn new(llm: Arc<dyn LlmClient>, template: impl Into<String>) -> Self {
        Self {
            llm,
            template: template.into(),
        }
    }

    pub async fn repair(&self, previous_code: &str, failure_reason: &str) -> Result<String, LlmError> {
        let prompt = render(
            &self.template,
            &[("code", previous_code), ("error", failure_reason)],
        );
        self.llm.complete(&prompt).await
    }
}
