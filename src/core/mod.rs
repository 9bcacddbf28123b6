//! 核心层：错误、流水线状态、优雅关闭、文本截断

pub mod error;
pub mod shutdown;
pub mod state;
pub mod text;

pub use error::AnalystError;
pub use shutdown::{install_signal_handlers, wait_for_signal, ShutdownReason};
pub use state::{PipelineEvent, PipelinePhase};
pub use text::preview;
