//! 分析器：同一能力接口的两种实现
//!
//! - **agentic**: 规划 → 生成代码 → 隔离执行 → 自动修复（[`AgenticAnalyzer`]）
//! - **stats**: 固定公式的 CSV 统计报告，不调用 LLM（[`StatsAnalyzer`]）

pub mod agentic;
pub mod stats;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

pub use agentic::AgenticAnalyzer;
pub use stats::StatsAnalyzer;

use crate::config::AppConfig;
use crate::core::AnalystError;
use crate::pipeline::AnalysisRequest;

/// 分析能力：输入一次请求，输出一个 JSON 结果
#[async_trait]
pub trait Analyzer: Send + Sync {
    fn name(&self) -> &str;

    /// 返回 Err 仅表示致命错误；重试耗尽等可预期的失败以 JSON 结果表达
    async fn analyze(&self, request: &AnalysisRequest) -> Result<Value, AnalystError>;
}

/// 按 pipeline.analyzer 选择实现；agentic 需要可用的 LLM 凭据
pub fn create_analyzer(cfg: &AppConfig) -> Result<Arc<dyn Analyzer>, AnalystError> {
    match cfg.pipeline.analyzer.to_lowercase().as_str() {
        "agentic" => Ok(Arc::new(AgenticAnalyzer::from_config(cfg)?)),
        "stats" => {
            tracing::info!("stats analyzer ready");
            Ok(Arc::new(StatsAnalyzer::new()))
        }
        other => Err(AnalystError::Config(format!(
            "unknown analyzer '{}', expected agentic or stats",
            other
        ))),
    }
}
