//! 监督循环：系统核心状态机
//!
//! AwaitingInput -> Reasoning -> (Delegating <-> Reasoning) -> Finalizing -> Done。
//! 推理与委派分离：同一推理步产出的委派并发分发、按发出顺序折叠回历史；
//! step_count 每个 推理->委派 周期加一，超过上界强制用已收集结果收尾（失控保险，
//! 不是错误）。检查点在三个转移点落盘：用户消息入列后、每次委派折叠后、最终回复后。

use std::sync::Arc;

use crate::core::AgentError;
use crate::delegation::{DelegationRegistry, TurnCache};
use crate::state::{CheckpointStore, ConversationState, InjectedContext, Message, ThreadLocks};
use crate::supervisor::{Decision, DecisionEngine};

/// 单次对话内默认最大推理/委派周期数
pub const DEFAULT_MAX_STEPS: u32 = 15;

/// 监督循环阶段；转移轨迹随结果返回，便于审计与测试
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    AwaitingInput,
    Reasoning,
    Delegating,
    Finalizing,
    Done,
}

/// 一个完整回合的产出
#[derive(Debug)]
pub struct TurnOutcome {
    /// 最终助手回复（已追加进历史并落检查点）
    pub reply: Message,
    /// 本回合消耗的推理/委派周期数
    pub steps: u32,
    /// 是否由步数上界强制收尾
    pub forced: bool,
    /// 阶段转移轨迹
    pub phases: Vec<Phase>,
}

/// 监督者：持有决策引擎、委派注册表、检查点存储与线程锁表
pub struct Supervisor {
    decision: Arc<dyn DecisionEngine>,
    registry: Arc<DelegationRegistry>,
    store: Arc<dyn CheckpointStore>,
    locks: ThreadLocks,
    max_steps: u32,
}

impl Supervisor {
    pub fn new(
        decision: Arc<dyn DecisionEngine>,
        registry: Arc<DelegationRegistry>,
        store: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            decision,
            registry,
            store,
            locks: ThreadLocks::new(),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    /// 处理一条入站用户消息，驱动状态机直到 Done，返回最终回复。
    ///
    /// 同一 thread_id 的并发请求在锁表上排队；后到者看到先到者已落盘的历史。
    /// 推理步失败（ReasoningUnavailable）终止请求，最后一次成功转移之后不再写检查点；
    /// 单个委派失败只是折叠进历史的数据，循环继续。
    pub async fn handle_message(
        &self,
        thread_id: &str,
        content: &str,
        context: InjectedContext,
    ) -> Result<TurnOutcome, AgentError> {
        if content.trim().is_empty() {
            return Err(AgentError::InputError("empty message content".to_string()));
        }

        let _guard = self.locks.acquire(thread_id).await;

        let mut state = self.store.load(thread_id).await?;
        state.injected_context.merge(context);

        let mut phases = vec![Phase::AwaitingInput];
        state.push(Message::user(content));
        self.store.save(thread_id, &state).await?;

        let turn_start = state.step_count;
        let mut cache = TurnCache::new();
        let mut forced = false;

        let reply_text = loop {
            phases.push(Phase::Reasoning);

            if state.step_count - turn_start >= self.max_steps {
                tracing::warn!(
                    thread_id,
                    steps = self.max_steps,
                    "step bound reached, forcing finalization"
                );
                forced = true;
                break best_effort_reply(&cache);
            }

            match self.decision.decide(&state).await? {
                Decision::Reply(text) => break text,
                Decision::Delegate(requests) => {
                    phases.push(Phase::Delegating);
                    for request in &requests {
                        state.pending_delegations.insert(request.fingerprint.clone());
                    }

                    let results = self
                        .registry
                        .dispatch_batch(&requests, &state.injected_context, &mut cache)
                        .await;

                    // 按发出顺序折叠，历史可重放，与网络完成时序无关
                    for (request, result) in requests.iter().zip(results) {
                        state.pending_delegations.remove(&request.fingerprint);
                        state.push(Message::worker(request.capability.as_str(), result.to_output()));
                    }
                    state.step_count += 1;
                    self.store.save(thread_id, &state).await?;
                }
            }
        };

        phases.push(Phase::Finalizing);
        let reply = Message::assistant(reply_text);
        state.push(reply.clone());
        self.store.save(thread_id, &state).await?;
        phases.push(Phase::Done);

        tracing::info!(
            thread_id,
            steps = state.step_count - turn_start,
            forced,
            "turn complete"
        );

        Ok(TurnOutcome {
            reply,
            steps: state.step_count - turn_start,
            forced,
            phases,
        })
    }

    /// 线程历史查询：最新检查点中的消息序列（无检查点即空历史）
    pub async fn thread_history(&self, thread_id: &str) -> Result<ConversationState, AgentError> {
        self.store.load(thread_id).await
    }
}

/// 上界强制收尾时的兜底回复：用本轮已收集的结果拼出来，不再走 LLM
fn best_effort_reply(cache: &TurnCache) -> String {
    let gathered: Vec<&str> = cache
        .results()
        .filter(|r| r.succeeded)
        .map(|r| r.content.as_str())
        .collect();

    if gathered.is_empty() {
        "I wasn't able to complete that request. Could you rephrase or narrow it down?".to_string()
    } else {
        format!(
            "I couldn't fully finish the request, but here is what I found so far:\n\n{}",
            gathered.join("\n\n")
        )
    }
}
