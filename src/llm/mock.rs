//! Mock LLM 客户端（用于测试与无 API 运行）
//!
//! 取最后一条 User 消息，回显为一条 flight 委派 JSON，便于本地跑通监督循环。

use async_trait::async_trait;

use crate::llm::{ChatMessage, ChatRole, LlmClient};

/// Mock 客户端：把用户最后一条消息转成一条委派指令
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, String> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");

        // 已有 worker 结果时收尾，否则发起一次委派
        let has_result = messages.iter().any(|m| m.content.contains("[flight]"));
        if has_result {
            Ok("Here is what I found for your trip.".to_string())
        } else {
            Ok(format!(
                r#"{{"delegations": [{{"capability": "flight", "payload": "{}"}}]}}"#,
                last_user.replace('"', " ")
            ))
        }
    }
}
