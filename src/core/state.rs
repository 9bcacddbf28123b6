//! 流水线状态机：阶段与进度事件
//!
//! PLANNING → GENERATING → EXECUTING → {DONE_SUCCESS, REPAIRING} → EXECUTING → … → {DONE_SUCCESS, DONE_FAILURE}

use serde::Serialize;

/// 流水线阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelinePhase {
    Planning,
    Generating,
    /// attempt 从 1 开始，首次执行为 1
    Executing { attempt: usize },
    Repairing { attempt: usize },
    DoneSuccess,
    DoneFailure,
}

impl PipelinePhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::DoneSuccess | Self::DoneFailure)
    }
}

/// 推送给前端（CLI 进度、测试观察）的事件
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    PhaseChanged { phase: PipelinePhase },
    /// 规划结果（完整文本）
    Planned { steps: String },
    /// 某次执行失败（执行错误、超时或非法 JSON），reason 为截断预览
    AttemptFailed { attempt: usize, reason: String },
    /// 修复调用超时，候选代码保持不变
    RepairTimedOut { attempt: usize },
}
