//! LLM 客户端抽象
//!
//! 补全服务只有一个动作：一段 prompt 进，一段文本出；无会话状态，调用本身不重试（重试属于流水线）。

use async_trait::async_trait;
use thiserror::Error;

/// 补全调用失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("completion request failed: {0}")]
    Request(String),

    /// 在限定时间内没有响应
    #[error("no completion within {0}s")]
    Timeout(u64),
}

/// 累计 token 用量快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt: u64,
    pub completion: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.prompt + self.completion
    }

    /// 与更早的快照之差（计数器不会回退，饱和减法只防御误用）
    pub fn since(&self, earlier: TokenUsage) -> TokenUsage {
        TokenUsage {
            prompt: self.prompt.saturating_sub(earlier.prompt),
            completion: self.completion.saturating_sub(earlier.completion),
        }
    }
}

/// LLM 客户端 trait：单次阻塞式请求 / 响应
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 发送单条 user 消息，返回首个 choice 的文本
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;

    /// 客户端创建以来的累计 token 用量；不上报用量的实现返回零
    fn token_usage(&self) -> TokenUsage {
        TokenUsage::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_delta() {
        let before = TokenUsage { prompt: 100, completion: 40 };
        let after = TokenUsage { prompt: 130, completion: 55 };
        let delta = after.since(before);
        assert_eq!(delta, TokenUsage { prompt: 30, completion: 15 });
        assert_eq!(delta.total(), 45);
        assert_eq!(before.since(after), TokenUsage::default());
    }
}
