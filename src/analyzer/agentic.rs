use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::Analyzer;
use crate::config::AppConfig;
use crate::core::AnalystError;
use crate::executor::SubprocessExecutor;
use crate::llm::create_llm_from_config;
use crate::pipeline::{AnalysisRequest, Pipeline};

/// 基于流水线的分析器；预算耗尽时返回失败哨兵而不是错误
pub struct AgenticAnalyzer {
    pipeline: Pipeline,
}

impl AgenticAnalyzer {
    pub fn new(pipeline: Pipeline) -> Self {
        Self { pipeline }
    }

    /// 按配置组装：LLM 后端（带超时）+ 子进程执行器 + 流水线参数
    pub fn from_config(cfg: &AppConfig) -> Result<Self, AnalystError> {
        let llm = create_llm_from_config(cfg)?;
        let executor = Arc::new(SubprocessExecutor::from_config(&cfg.executor));
        let pipeline = Pipeline::from_config(cfg, llm, executor);
        tracing::info!(
            interpreter = %cfg.executor.interpreter,
            max_retries = pipeline.max_retries(),
            "agentic analyzer ready"
        );
        Ok(Self::new(pipeline))
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }
}

#[async_trait]
impl Analyzer for AgenticAnalyzer {
    fn name(&self) -> &str {
        "agentic"
    }

    async fn analyze(&self, request: &AnalysisRequest) -> Result<Value, AnalystError> {
        let run = self.pipeline.run(request).await?;
        tracing::info!(
            success = run.result.is_success(),
            executions = run.executions,
            repairs = run.repairs,
            prompt_tokens = run.tokens.prompt,
            completion_tokens = run.tokens.completion,
            "agentic analysis finished"
        );
        Ok(run.result.into_json())
    }
}
