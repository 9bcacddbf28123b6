//! 有界等待包装
//!
//! 对任意 LlmClient 的 complete 施加 tokio 超时；超时统一映射为 `LlmError::Timeout`，
//! 由调用方决定是致命（规划 / 生成）还是进入修复重试通道（修复）。

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;

use crate::llm::{LlmClient, LlmError, TokenUsage};

pub struct TimeoutLlmClient<C> {
    inner: C,
    timeout: Duration,
}

impl<C: LlmClient> TimeoutLlmClient<C> {
    pub fn new(inner: C, timeout_secs: u64) -> Self {
        Self {
            inner,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<C: LlmClient> LlmClient for TimeoutLlmClient<C> {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        match timeout(self.timeout, self.inner.complete(prompt)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(timeout_secs = self.timeout.as_secs(), "completion timed out");
                Err(LlmError::Timeout(self.timeout.as_secs()))
            }
        }
    }

    fn token_usage(&self) -> TokenUsage {
        self.inner.token_usage()
    }
}
