//! Mock backend for testing
//!
//! Echoes the data section of the last user message so tests can assert on the
//! rendered facts. Can be made slow or failing to exercise fallbacks.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};

use super::types::{CompletionRequest, Role};
use super::AIBackend;

#[derive(Clone, Default)]
pub struct MockBackend {
    /// Whether health_check should return true
    pub healthy: bool,
    /// Sleep before answering
    pub delay: Option<Duration>,
    /// Fail every completion
    pub failing: bool,
}

impl MockBackend {
    /// Healthy, instant mock
    pub fn new() -> Self {
        Self {
            healthy: true,
            ..Default::default()
        }
    }

    pub fn unhealthy() -> Self {
        Self::default()
    }

    /// Answers only after `delay`
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new()
        }
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::new()
        }
    }
}

#[async_trait]
impl AIBackend for MockBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing {
            return Err(Error::InvalidData("Mock backend configured to fail".into()));
        }

        let last = request
            .messages
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .map(|t| t.content.as_str())
            .unwrap_or_default();
        let data = last
            .split_once("DATA:")
            .map(|(_, rest)| rest.split("QUESTION:").next().unwrap_or(rest))
            .unwrap_or(last)
            .trim();

        Ok(format!("Here is what I found:\n{}", data))
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn model(&self) -> &str {
        "mock"
    }

    fn host(&self) -> &str {
        "mock://localhost"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::ChatTurn;

    fn request(text: &str) -> CompletionRequest {
        CompletionRequest {
            system: String::new(),
            messages: vec![ChatTurn::user(text)],
            max_tokens: 50,
            temperature: 0.0,
        }
    }

    #[tokio::test]
    async fn test_failing_mock() {
        let mock = MockBackend::failing();
        assert!(mock.complete(&request("hi")).await.is_err());
        assert!(!MockBackend::unhealthy().health_check().await);
    }

    #[tokio::test]
    async fn test_echo_without_data_marker() {
        let text = MockBackend::new().complete(&request("plain")).await.unwrap();
        assert_eq!(text, "Here is what I found:\nplain");
    }
}
