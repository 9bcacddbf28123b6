//! Planner：把自然语言问题拆成分析步骤
//!
//! 输出按不透明文本处理，不校验结构，只交给 CodeGenerator 消费一次。

use std::sync::Arc;

use crate::llm::{LlmClient, LlmError};
use crate::pipeline::prompts::render;

pub struct Planner {
    llm: Arc<dyn LlmClient>,
    template: String,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, template: impl Into<String>) -> Self {
        Self {
            llm,
            template: template.into(),
        }
    }

    pub async fn plan(&self, question_text: &str) -> Result<String, LlmError> {
        let prompt = render(&self.template, &[("question", question_text)]);
        self.llm.complete(&prompt).await
    }
}
