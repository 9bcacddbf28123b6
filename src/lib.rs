//! Analyst - LLM 驱动的数据分析服务
//!
//! 模块划分：
//! - **analyzer**: 分析能力接口与两种实现（agentic 流水线 / 固定公式统计）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、流水线状态与事件、优雅关闭
//! - **executor**: 生成代码的隔离执行（子进程、超时、资源限制）
//! - **integrations**: HTTP API（`web` feature）
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / 脚本化）
//! - **pipeline**: Planner、CodeGenerator、Repairer 与带重试预算的主循环

pub mod analyzer;
pub mod config;
pub mod core;
pub mod executor;
pub mod integrations;
pub mod llm;
pub mod observability;
pub mod pipeline;

pub use analyzer::{create_analyzer, Analyzer};
pub use pipeline::{run_pipeline, Pipeline, PipelineResult};
