//! 分析流水线：Planner、CodeGenerator、Repairer 与带重试预算的主循环

pub mod generator;
pub mod loop_;
pub mod planner;
pub mod prompts;
pub mod repairer;
pub mod request;

pub use generator::CodeGenerator;
pub use loop_::{
    run_pipeline, Pipeline, PipelineResult, PipelineRun, DEFAULT_MAX_RETRIES, FAILURE_SENTINEL,
    INVALID_JSON_REASON,
};
pub use planner::Planner;
pub use prompts::{render, PromptTemplates};
pub use repairer::Repairer;
pub use request::AnalysisRequest;
