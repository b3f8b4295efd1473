//! 会话状态：消息历史、注入上下文、待决委派、步数计数
//!
//! Message 追加后不可变；messages 在同一 thread 内严格 append-only，
//! 检查点落盘后不会再编辑或删除任何一条。

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 消息角色：用户 / 助手回复 / 工作单元结果
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Worker,
}

/// 消息内容块：纯文本或结构化工具结果（对齐前端的 content block 数组）
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ToolResult { capability: String, output: Value },
}

/// 单条消息，追加进历史后不可变
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: Vec<ContentBlock>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    fn new(role: Role, content: Vec<ContentBlock>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content,
            created_at: Utc::now(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![ContentBlock::Text { text: text.into() }])
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, vec![ContentBlock::Text { text: text.into() }])
    }

    /// 工作单元结果消息：委派结果折叠进历史时使用
    pub fn worker(capability: impl Into<String>, output: Value) -> Self {
        Self::new(
            Role::Worker,
            vec![ContentBlock::ToolResult {
                capability: capability.into(),
                output,
            }],
        )
    }

    /// 消息的纯文本视图（ToolResult 序列化为 JSON 文本），供 LLM 上下文拼接
    pub fn text(&self) -> String {
        self.content
            .iter()
            .map(|block| match block {
                ContentBlock::Text { text } => text.clone(),
                ContentBlock::ToolResult { capability, output } => {
                    format!("[{capability}] {output}")
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// 运行期注入上下文：随每次推理调用显式传递，不走全局状态
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct InjectedContext {
    pub user_id: Option<String>,
    /// 用户画像（缺 userId 时为空对象，不是错误）
    #[serde(default)]
    pub user_profile: Value,
    pub itinerary_id: Option<String>,
}

impl InjectedContext {
    /// 合并一次请求带来的上下文；已有字段仅在新值存在时覆盖
    pub fn merge(&mut self, other: InjectedContext) {
        if other.user_id.is_some() {
            self.user_id = other.user_id;
        }
        if !other.user_profile.is_null() {
            self.user_profile = other.user_profile;
        }
        if other.itinerary_id.is_some() {
            self.itinerary_id = other.itinerary_id;
        }
    }
}

/// 一个会话线程的累积状态；单次请求期间由监督循环独占
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversationState {
    pub thread_id: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub injected_context: InjectedContext,
    /// 在途委派指纹；Delegating 阶段结束即清空
    #[serde(default)]
    pub pending_delegations: HashSet<String>,
    /// 每个 推理→委派 周期递增一次，请求内单调不减，是失控循环上界的依据
    #[serde(default)]
    pub step_count: u32,
}

impl ConversationState {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            messages: Vec::new(),
            injected_context: InjectedContext::default(),
            pending_delegations: HashSet::new(),
            step_count: 0,
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// 最后一条助手消息（接口层取最终回复时使用）
    pub fn last_assistant(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::Assistant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_only_ordering() {
        let mut state = ConversationState::new("t1");
        state.push(Message::user("find flights"));
        state.push(Message::worker("flight", serde_json::json!({"offers": []})));
        state.push(Message::assistant("here are your options"));

        assert_eq!(state.messages.len(), 3);
        assert_eq!(state.messages[0].role, Role::User);
        assert_eq!(state.messages[1].role, Role::Worker);
        assert_eq!(state.messages[2].role, Role::Assistant);
        assert_eq!(state.last_assistant().unwrap().text(), "here are your options");
    }

    #[test]
    fn test_context_merge_keeps_existing() {
        let mut ctx = InjectedContext {
            user_id: Some("u1".into()),
            user_profile: serde_json::json!({"likes": "hiking"}),
            itinerary_id: None,
        };
        ctx.merge(InjectedContext {
            user_id: None,
            user_profile: Value::Null,
            itinerary_id: Some("it-9".into()),
        });
        assert_eq!(ctx.user_id.as_deref(), Some("u1"));
        assert_eq!(ctx.itinerary_id.as_deref(), Some("it-9"));
        assert_eq!(ctx.user_profile["likes"], "hiking");
    }

    #[test]
    fn test_worker_message_text_view() {
        let msg = Message::worker("lodging", serde_json::json!({"ok": true}));
        assert!(msg.text().starts_with("[lodging]"));
    }
}
