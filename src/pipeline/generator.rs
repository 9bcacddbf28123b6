//! CodeGenerator：根据步骤与文件引用生成候选脚本
//!
//! 回复原样作为 CandidateCode，执行前不做语法校验。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::llm::{LlmClient, LlmError};
use crate::pipeline::prompts::render;

pub struct CodeGenerator {
    llm: Arc<dyn LlmClient>,
    template: String,
}

impl CodeGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, template: impl Into<String>) -> Self {
        Self {
            llm,
            template: template.into(),
        }
    }

    pub async fn generate(
        &self,
        steps: &str,
        question_file: &Path,
        data_files: &[PathBuf],
    ) -> Result<String, LlmError> {
        let question_file = question_file.display().to_string();
        let data_files = format_file_list(data_files);
        let prompt = render(
            &self.template,
            &[
                ("steps", steps),
                ("question_file", &question_file),
                ("data_files", &data_files),
            ],
        );
        self.llm.complete(&prompt).await
    }
}

fn format_file_list(files: &[PathBuf]) -> String {
    if files.is_empty() {
        return "  (none)".to_string();
    }
    files
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n")
}
