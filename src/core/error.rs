//! 错误类型
//!
//! 致命错误（读取问题文件失败、规划/生成调用失败、执行器基础设施故障）沿 `?` 向上传播；
//! 脚本本身的失败不在这里，而是 `ExecutionOutcome::Failure`，由修复通道处理。

use std::path::PathBuf;

use thiserror::Error;

use crate::executor::ExecutorError;
use crate::llm::LlmError;

/// 一次分析调用中不可恢复的错误
#[derive(Error, Debug)]
pub enum AnalystError {
    #[error("Failed to read question file {}: {source}", path.display())]
    QuestionRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Executor error: {0}")]
    Executor(#[from] ExecutorError),

    #[error("Config error: {0}")]
    Config(String),

    /// 固定公式分析读取 / 解析数据文件失败
    #[error("Data error: {0}")]
    Data(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
