//! 决策引擎：一次推理步的抽象
//!
//! decide(state) 返回直接回复或一批委派请求。状态机、重复抑制、步数上界都只依赖
//! 该 trait，可用确定性脚本桩独立测试。LlmDecisionEngine 调 LLM 并从输出中提取
//! {"delegations": [...]} JSON；ScriptedDecisionEngine 按脚本出牌。

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::core::AgentError;
use crate::delegation::{Capability, DelegationRequest};
use crate::llm::{ChatMessage, LlmClient};
use crate::state::{ConversationState, Role};

/// 一次推理步的产出
#[derive(Clone, Debug)]
pub enum Decision {
    /// 无需再委派，给出最终自然语言回复
    Reply(String),
    /// 需要调用一个或多个能力；同一推理步产出的委派彼此独立，可并发分发
    Delegate(Vec<DelegationRequest>),
}

/// 推理引擎接口
#[async_trait]
pub trait DecisionEngine: Send + Sync {
    async fn decide(&self, state: &ConversationState) -> Result<Decision, AgentError>;
}

/// 监督者基础 prompt：搜索优先，仅在用户明确要求时改行程，不泄露内部 id
const SUPERVISOR_PROMPT: &str = "You are a travel assistant that helps users find \
flights, lodging, and activities, and manage their itinerary.\n\
Rules:\n\
- Help users SEARCH and EXPLORE travel options; present results clearly.\n\
- Modify the itinerary ONLY when the user explicitly asks (\"add this hotel\", \"save that flight\").\n\
- Never reveal internal identifiers (user ids, itinerary ids) or technical details; \
refer to an itinerary by its title.\n\
- Call each capability at most once per user request; when a result says the operation \
completed, do not repeat it.\n\
- If a search failed, apologize, explain briefly, and ask how to proceed.\n\
\n\
To delegate, answer with ONLY a JSON object:\n\
{\"delegations\": [{\"capability\": \"<name>\", \"payload\": \"<natural language instruction>\"}]}\n\
Otherwise answer the user directly in plain text.";

/// LLM 决策输出中的单条委派
#[derive(Debug, Deserialize)]
struct RawDelegation {
    capability: String,
    payload: String,
}

#[derive(Debug, Deserialize)]
struct RawDecision {
    delegations: Vec<RawDelegation>,
}

/// 从 LLM 输出提取决策：含 "delegations" JSON 则为 Delegate，否则原文即回复
pub fn parse_decision(output: &str, requester_step: u32) -> Result<Decision, AgentError> {
    let trimmed = output.trim();

    // 提取 JSON 块（```json ... ``` 或首个花括号到末个花括号）
    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim())
    } else if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        &trimmed[start..=end]
    } else {
        return Ok(Decision::Reply(trimmed.to_string()));
    };

    if !json_str.contains("\"delegations\"") {
        return Ok(Decision::Reply(trimmed.to_string()));
    }

    let raw: RawDecision = serde_json::from_str(json_str)
        .map_err(|e| AgentError::JsonParseError(format!("{e}: {json_str}")))?;

    if raw.delegations.is_empty() {
        return Ok(Decision::Reply(trimmed.to_string()));
    }

    let mut requests = Vec::with_capacity(raw.delegations.len());
    for d in raw.delegations {
        let capability: Capability = d
            .capability
            .parse()
            .map_err(AgentError::JsonParseError)?;
        requests.push(DelegationRequest::new(capability, d.payload, requester_step));
    }
    Ok(Decision::Delegate(requests))
}

/// LLM 决策引擎：拼 system（基础 prompt + 能力清单 + 注入上下文）后调 LLM
pub struct LlmDecisionEngine {
    llm: Arc<dyn LlmClient>,
    /// 能力清单（JSON），构造时从注册表渲染
    capability_schema: String,
}

impl LlmDecisionEngine {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        capabilities: &[(Capability, String, serde_json::Value)],
    ) -> Self {
        let list: Vec<serde_json::Value> = capabilities
            .iter()
            .map(|(cap, desc, schema)| {
                serde_json::json!({
                    "capability": cap.as_str(),
                    "description": desc,
                    "input_schema": schema,
                })
            })
            .collect();
        let capability_schema =
            serde_json::to_string_pretty(&list).unwrap_or_else(|_| "[]".to_string());
        Self {
            llm,
            capability_schema,
        }
    }

    fn render_system(&self, state: &ConversationState) -> String {
        let ctx = &state.injected_context;
        let mut system = format!(
            "{SUPERVISOR_PROMPT}\n\nAvailable capabilities:\n{}\n",
            self.capability_schema
        );
        if !ctx.user_profile.is_null() {
            system.push_str(&format!("\nUser profile: {}\n", ctx.user_profile));
        }
        if let Some(itinerary_id) = &ctx.itinerary_id {
            system.push_str(&format!(
                "\nThe active itinerary id is {itinerary_id}; pass it to itinerary operations, never show it to the user.\n"
            ));
        }
        system
    }

    /// 底层 LLM 的累计 token 用量 (prompt, completion, total)
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    fn to_chat_messages(&self, state: &ConversationState) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(self.render_system(state))];
        for m in &state.messages {
            messages.push(match m.role {
                Role::User => ChatMessage::user(m.text()),
                Role::Assistant => ChatMessage::assistant(m.text()),
                // 工作单元结果以 user 角色回注（观察值语义）
                Role::Worker => ChatMessage::user(m.text()),
            });
        }
        messages
    }
}

#[async_trait]
impl DecisionEngine for LlmDecisionEngine {
    async fn decide(&self, state: &ConversationState) -> Result<Decision, AgentError> {
        let output = self
            .llm
            .complete(&self.to_chat_messages(state))
            .await
            .map_err(AgentError::ReasoningUnavailable)?;

        let (prompt_tokens, completion_tokens, total_tokens) = self.llm.token_usage();
        tracing::debug!(
            thread_id = %state.thread_id,
            prompt_tokens,
            completion_tokens,
            total_tokens,
            "llm usage"
        );

        match parse_decision(&output, state.step_count) {
            Ok(decision) => Ok(decision),
            // 委派 JSON 坏掉视为推理步失败：请求级可重试，不进入历史
            Err(e) => Err(AgentError::ReasoningUnavailable(e.to_string())),
        }
    }
}

/// 脚本决策引擎：按顺序弹出预设决策，脚本耗尽后重复 fallback（测试与离线运行）
pub struct ScriptedDecisionEngine {
    script: Mutex<VecDeque<Decision>>,
    fallback: Decision,
}

impl ScriptedDecisionEngine {
    pub fn new(steps: Vec<Decision>) -> Self {
        Self {
            script: Mutex::new(steps.into()),
            fallback: Decision::Reply("Is there anything else I can help you with?".to_string()),
        }
    }

    /// 脚本耗尽后固定返回 fallback（如「永远委派」的失控桩）
    pub fn with_fallback(mut self, fallback: Decision) -> Self {
        self.fallback = fallback;
        self
    }
}

#[async_trait]
impl DecisionEngine for ScriptedDecisionEngine {
    async fn decide(&self, state: &ConversationState) -> Result<Decision, AgentError> {
        let next = self.script.lock().await.pop_front();
        match next {
            Some(decision) => Ok(decision),
            None => match &self.fallback {
                Decision::Reply(text) => Ok(Decision::Reply(text.clone())),
                // 重建请求使 requester_step 跟随当前状态
                Decision::Delegate(reqs) => Ok(Decision::Delegate(
                    reqs.iter()
                        .map(|r| {
                            DelegationRequest::new(r.capability, r.payload.clone(), state.step_count)
                        })
                        .collect(),
                )),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_reply() {
        let d = parse_decision("Here are three hotels I found.", 0).unwrap();
        assert!(matches!(d, Decision::Reply(_)));
    }

    #[test]
    fn test_delegation_json_parses() {
        let out = r#"{"delegations": [
            {"capability": "flight", "payload": "NYC to Tokyo, June, 1 adult"},
            {"capability": "hotels", "payload": "Tokyo, June 10-14"}
        ]}"#;
        let d = parse_decision(out, 2).unwrap();
        match d {
            Decision::Delegate(reqs) => {
                assert_eq!(reqs.len(), 2);
                assert_eq!(reqs[0].capability, Capability::Flight);
                assert_eq!(reqs[1].capability, Capability::Lodging);
                assert_eq!(reqs[0].requester_step, 2);
            }
            Decision::Reply(_) => panic!("expected delegation"),
        }
    }

    #[test]
    fn test_fenced_json_block() {
        let out = "Sure, let me search.\n```json\n{\"delegations\": [{\"capability\": \"activity\", \"payload\": \"Rome\"}]}\n```";
        let d = parse_decision(out, 0).unwrap();
        assert!(matches!(d, Decision::Delegate(reqs) if reqs.len() == 1));
    }

    #[test]
    fn test_malformed_delegation_json_is_error() {
        let out = r#"{"delegations": [{"capability": "flight"}]}"#;
        assert!(parse_decision(out, 0).is_err());
    }

    #[test]
    fn test_json_without_delegations_key_is_reply() {
        let out = r#"Your options: {"price": "$900"} and more."#;
        assert!(matches!(parse_decision(out, 0).unwrap(), Decision::Reply(_)));
    }

    struct UsageLlm;

    #[async_trait]
    impl LlmClient for UsageLlm {
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, String> {
            Ok("Here you go.".to_string())
        }

        fn token_usage(&self) -> (u64, u64, u64) {
            (10, 5, 15)
        }
    }

    #[tokio::test]
    async fn test_engine_surfaces_llm_token_usage() {
        let engine = LlmDecisionEngine::new(Arc::new(UsageLlm), &[]);
        let state = ConversationState::new("t1");
        let decision = engine.decide(&state).await.unwrap();
        assert!(matches!(decision, Decision::Reply(_)));
        assert_eq!(engine.token_usage(), (10, 5, 15));
    }
}
