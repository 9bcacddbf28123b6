//! 代码执行器：生成脚本与宿主之间唯一的隔离边界
//!
//! 每次调用都在全新的运行目录中物化脚本并以子进程运行，带墙钟超时；
//! 只观察退出码与 stdout / stderr，不解析输出（JSON 解析属于流水线）。

pub mod limits;
pub mod subprocess;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

pub use limits::ResourceLimits;
pub use subprocess::{RunOutput, RunStatus, SubprocessExecutor, DATA_FILES_ENV};

/// 超时失败的固定原因
pub const TIMEOUT_REASON: &str = "Execution timed out";

/// 单次执行结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// 退出码 0；stdout 已去除首尾空白
    Success { stdout: String },
    /// stderr 文本、超时原因或退出状态描述
    Failure { reason: String },
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// 执行器基础设施故障（与脚本失败不同，不可修复）
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("failed to prepare run directory: {0}")]
    Workspace(#[source] std::io::Error),

    #[error("failed to launch interpreter '{interpreter}': {source}")]
    Spawn {
        interpreter: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for script: {0}")]
    Io(#[source] std::io::Error),
}

/// 代码执行器 trait
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    /// 在 scratch_root 下新建运行目录并执行 code；data_files 仅透传给脚本，由脚本自行打开
    async fn execute(
        &self,
        code: &str,
        data_files: &[PathBuf],
        scratch_root: &Path,
    ) -> Result<ExecutionOutcome, ExecutorError>;
}
