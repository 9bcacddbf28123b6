//! 流水线主循环（规划 → 生成 → 执行 →（修复 → 执行）* ）
//!
//! 规划与生成各调用一次，失败即致命；之后进入有界的执行 / 修复循环：
//! 首次执行不占预算，每次「修复并重新执行」消耗一个重试单位，预算耗尽返回固定的失败哨兵。
//! 执行错误、超时与非法 JSON 走同一条修复通道。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;

use crate::config::AppConfig;
use crate::core::{preview, AnalystError, PipelineEvent, PipelinePhase};
use crate::executor::{CodeExecutor, ExecutionOutcome};
use crate::llm::{LlmClient, LlmError, TokenUsage};
use crate::pipeline::{AnalysisRequest, CodeGenerator, Planner, PromptTemplates, Repairer};

/// 默认重试预算
pub const DEFAULT_MAX_RETRIES: usize = 3;
/// 退出码 0 但 stdout 不是单个 JSON 文档时的失败原因
pub const INVALID_JSON_REASON: &str = "Invalid JSON Output";
/// 预算耗尽时哨兵对象中的错误信息
pub const FAILURE_SENTINEL: &str = "Pipeline failed after retries";

/// 事件中失败原因的最大字符数
const REASON_PREVIEW_CHARS: usize = 500;

/// 流水线结果：解析后的 JSON 或预算耗尽
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineResult {
    Success(Value),
    Exhausted,
}

impl PipelineResult {
    /// 固定哨兵：`{"error": "Pipeline failed after retries"}`
    pub fn sentinel() -> Value {
        serde_json::json!({ "error": FAILURE_SENTINEL })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn into_json(self) -> Value {
        match self {
            Self::Success(value) => value,
            Self::Exhausted => Self::sentinel(),
        }
    }
}

/// 一次调用的结果与计数
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRun {
    pub result: PipelineResult,
    /// 实际执行脚本的次数
    pub executions: usize,
    /// 发出的修复调用次数（含超时的）
    pub repairs: usize,
    /// 本次调用期间 LLM 客户端计数器的增量；共享客户端并发运行时会混入其他请求的用量
    pub tokens: TokenUsage,
}

/// 流水线：持有三个 LLM 角色、执行器与重试预算，可被并发请求共享
pub struct Pipeline {
    llm: Arc<dyn LlmClient>,
    planner: Planner,
    generator: CodeGenerator,
    repairer: Repairer,
    executor: Arc<dyn CodeExecutor>,
    max_retries: usize,
    work_root: PathBuf,
    keep_workspace: bool,
}

impl Pipeline {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        executor: Arc<dyn CodeExecutor>,
        prompts: PromptTemplates,
        work_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            planner: Planner::new(llm.clone(), prompts.plan),
            generator: CodeGenerator::new(llm.clone(), prompts.generate),
            repairer: Repairer::new(llm.clone(), prompts.repair),
            llm,
            executor,
            max_retries: DEFAULT_MAX_RETRIES,
            work_root: work_root.into(),
            keep_workspace: false,
        }
    }

    pub fn from_config(
        cfg: &AppConfig,
        llm: Arc<dyn LlmClient>,
        executor: Arc<dyn CodeExecutor>,
    ) -> Self {
        let prompts = PromptTemplates::load(cfg.pipeline.prompts_dir.as_deref());
        Self::new(llm, executor, prompts, cfg.executor.work_root())
            .with_max_retries(cfg.pipeline.max_retries)
            .with_keep_workspace(cfg.pipeline.keep_workspace)
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_keep_workspace(mut self, keep: bool) -> Self {
        self.keep_workspace = keep;
        self
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    pub async fn run(&self, request: &AnalysisRequest) -> Result<PipelineRun, AnalystError> {
        self.run_with_events(request, None).await
    }

    /// 与 run 相同，额外通过 event_tx 推送阶段变化与失败原因
    pub async fn run_with_events(
        &self,
        request: &AnalysisRequest,
        event_tx: Option<&UnboundedSender<PipelineEvent>>,
    ) -> Result<PipelineRun, AnalystError> {
        tokio::fs::create_dir_all(&self.work_root).await?;
        let workspace = tempfile::Builder::new()
            .prefix("job-")
            .tempdir_in(&self.work_root)?;

        let before = self.llm.token_usage();
        let result = self
            .drive(request, workspace.path(), event_tx)
            .await
            .map(|run| PipelineRun {
                tokens: self.llm.token_usage().since(before),
                ..run
            });

        if self.keep_workspace {
            let kept = workspace.keep();
            tracing::info!(path = %kept.display(), "workspace kept");
        }
        result
    }

    async fn drive(
        &self,
        request: &AnalysisRequest,
        scratch: &Path,
        event_tx: Option<&UnboundedSender<PipelineEvent>>,
    ) -> Result<PipelineRun, AnalystError> {
        let emit = |ev: PipelineEvent| {
            if let Some(tx) = event_tx {
                let _ = tx.send(ev);
            }
        };
        let phase = |phase: PipelinePhase| {
            tracing::debug!(?phase, "pipeline phase");
            emit(PipelineEvent::PhaseChanged { phase });
        };

        phase(PipelinePhase::Planning);
        let steps = self.planner.plan(&request.question_text).await?;
        tracing::info!(chars = steps.len(), "analysis planned");
        emit(PipelineEvent::Planned {
            steps: steps.clone(),
        });

        phase(PipelinePhase::Generating);
        let mut code = self
            .generator
            .generate(&steps, &request.question_file, &request.data_files)
            .await?;

        let mut executions = 0;
        let mut repairs = 0;
        // 修复超时后保留的失败原因：候选代码未变，下一轮直接再次修复
        let mut unrepaired: Option<String> = None;

        loop {
            let reason = match unrepaired.take() {
                Some(reason) => reason,
                None => {
                    executions += 1;
                    phase(PipelinePhase::Executing {
                        attempt: executions,
                    });
                    let outcome = self
                        .executor
                        .execute(&code, &request.data_files, scratch)
                        .await?;
                    let reason = match outcome {
                        ExecutionOutcome::Success { stdout } => {
                            match serde_json::from_str::<Value>(&stdout) {
                                Ok(value) => {
                                    tracing::info!(executions, repairs, "pipeline succeeded");
                                    phase(PipelinePhase::DoneSuccess);
                                    return Ok(PipelineRun {
                                        result: PipelineResult::Success(value),
                                        executions,
                                        repairs,
                                        tokens: TokenUsage::default(),
                                    });
                                }
                                Err(e) => {
                                    tracing::debug!(error = %e, "stdout is not a single JSON document");
                                    INVALID_JSON_REASON.to_string()
                                }
                            }
                        }
                        ExecutionOutcome::Failure { reason } => reason,
                    };
                    tracing::warn!(attempt = executions, reason = %preview(&reason, REASON_PREVIEW_CHARS), "attempt failed");
                    emit(PipelineEvent::AttemptFailed {
                        attempt: executions,
                        reason: preview(&reason, REASON_PREVIEW_CHARS),
                    });
                    reason
                }
            };

            if repairs >= self.max_retries {
                break;
            }
            repairs += 1;
            phase(PipelinePhase::Repairing { attempt: repairs });

            match self.repairer.repair(&code, &reason).await {
                Ok(fixed) => code = fixed,
                Err(LlmError::Timeout(secs)) => {
                    tracing::warn!(attempt = repairs, timeout_secs = secs, "repair timed out, keeping current code");
                    emit(PipelineEvent::RepairTimedOut { attempt: repairs });
                    unrepaired = Some(reason);
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::warn!(executions, repairs, "retry budget exhausted");
        phase(PipelinePhase::DoneFailure);
        Ok(PipelineRun {
            result: PipelineResult::Exhausted,
            executions,
            repairs,
            tokens: TokenUsage::default(),
        })
    }
}

/// 规范入口：读取问题文件并跑一遍流水线，返回解析后的 JSON 或失败哨兵
pub async fn run_pipeline(
    pipeline: &Pipeline,
    question_file: &Path,
    data_files: &[PathBuf],
) -> Result<Value, AnalystError> {
    let request = AnalysisRequest::load(question_file, data_files).await?;
    Ok(pipeline.run(&request).await?.result.into_json())
}
