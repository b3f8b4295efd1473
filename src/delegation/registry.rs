//! 委派注册表与工作单元契约
//!
//! 所有工作单元实现 WorkerUnit（capability / description / input_schema / execute），
//! DelegationRegistry 按能力注册与分发：校验 payload、加超时、统一把失败包成
//! DelegationResult（失败是数据不是控制流异常），每次分发输出结构化审计日志（JSON）。
//! 同一轮内指纹相同的请求命中 TurnCache 直接复用结果，不再触发外部调用。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::future::join_all;
use serde_json::Value;
use tokio::time::timeout;

use crate::core::AgentError;
use crate::delegation::{Capability, DelegationRequest, DelegationResult, ErrorKind};
use crate::state::InjectedContext;

/// 工作单元 trait：绑定一种能力，payload 解析方式由各实现自定
#[async_trait]
pub trait WorkerUnit: Send + Sync {
    fn capability(&self) -> Capability;

    /// 能力描述（进入监督者的决策 prompt）
    fn description(&self) -> &str;

    /// 输入 JSON Schema（供决策引擎生成结构化委派）
    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": { "payload": { "type": "string" } },
            "required": ["payload"]
        })
    }

    /// 执行委派；任何 provider 错误都规范化为 succeeded=false，不得越过边界抛出
    async fn execute(&self, payload: &str, context: &InjectedContext) -> DelegationResult;
}

/// 单轮委派结果缓存：fingerprint -> 已解析结果；order 记录首次插入顺序
#[derive(Default)]
pub struct TurnCache {
    resolved: HashMap<String, DelegationResult>,
    order: Vec<String>,
}

impl TurnCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, fingerprint: &str) -> Option<&DelegationResult> {
        self.resolved.get(fingerprint)
    }

    pub fn insert(&mut self, fingerprint: String, result: DelegationResult) {
        if self.resolved.insert(fingerprint.clone(), result).is_none() {
            self.order.push(fingerprint);
        }
    }

    /// 本轮已收集的全部结果，按首次插入顺序（上界强制收尾的兜底回复要求可重现）
    pub fn results(&self) -> impl Iterator<Item = &DelegationResult> {
        self.order.iter().filter_map(|f| self.resolved.get(f))
    }
}

/// 委派注册表：能力 -> 工作单元，一对一绑定
pub struct DelegationRegistry {
    workers: HashMap<Capability, Arc<dyn WorkerUnit>>,
    timeout: Duration,
}

impl DelegationRegistry {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            workers: HashMap::new(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 注册工作单元；同一能力重复注册是启动期配置错误
    pub fn register(&mut self, worker: Arc<dyn WorkerUnit>) -> Result<(), AgentError> {
        let capability = worker.capability();
        if self.workers.contains_key(&capability) {
            return Err(AgentError::ConfigError(format!(
                "capability already registered: {capability}"
            )));
        }
        self.workers.insert(capability, worker);
        Ok(())
    }

    /// (capability, description, schema) 列表，供决策 prompt 拼装
    pub fn capability_descriptions(&self) -> Vec<(Capability, String, Value)> {
        let mut list: Vec<_> = self
            .workers
            .values()
            .map(|w| (w.capability(), w.description().to_string(), w.input_schema()))
            .collect();
        list.sort_by_key(|(c, _, _)| c.as_str());
        list
    }

    /// 分发单个委派：payload 校验、超时、审计日志；一切失败都折成 DelegationResult
    pub async fn dispatch(
        &self,
        request: &DelegationRequest,
        context: &InjectedContext,
    ) -> DelegationResult {
        if request.payload.trim().is_empty() {
            return DelegationResult::fail(
                request.capability,
                ErrorKind::InvalidPayload {
                    detail: "empty payload".to_string(),
                },
            );
        }

        let Some(worker) = self.workers.get(&request.capability) else {
            return DelegationResult::fail(
                request.capability,
                ErrorKind::InvalidPayload {
                    detail: format!("no worker bound for capability {}", request.capability),
                },
            );
        };

        let start = Instant::now();
        let outcome = timeout(self.timeout, worker.execute(&request.payload, context)).await;
        let result = match outcome {
            Ok(result) => result,
            Err(_) => DelegationResult::fail(request.capability, ErrorKind::Timeout),
        };

        let audit = serde_json::json!({
            "event": "delegation_audit",
            "capability": request.capability.as_str(),
            "ok": result.succeeded,
            "outcome": result.error.as_ref().map_or("ok", |_| "error"),
            "duration_ms": start.elapsed().as_millis() as u64,
            "step": request.requester_step,
            "payload_preview": payload_preview(&request.payload),
        });
        tracing::info!(audit = %audit.to_string(), "delegation");

        result
    }

    /// 批量分发：同轮指纹去重（含本批内部重复），唯一请求并发执行，
    /// 返回顺序与请求发出顺序一致（与网络完成时序无关，保证历史可重放）。
    pub async fn dispatch_batch(
        &self,
        requests: &[DelegationRequest],
        context: &InjectedContext,
        cache: &mut TurnCache,
    ) -> Vec<DelegationResult> {
        // 本批内去重：第一个出现的指纹执行，后续复用
        let mut to_run: Vec<&DelegationRequest> = Vec::new();
        for request in requests {
            let cached = cache.get(&request.fingerprint).is_some();
            let queued = to_run.iter().any(|r| r.fingerprint == request.fingerprint);
            if cached || queued {
                tracing::info!(
                    capability = request.capability.as_str(),
                    fingerprint = %&request.fingerprint[..12],
                    "duplicate delegation suppressed"
                );
            } else {
                to_run.push(request);
            }
        }

        let fresh = join_all(to_run.iter().map(|r| self.dispatch(r, context))).await;
        for (request, result) in to_run.iter().zip(fresh) {
            cache.insert(request.fingerprint.clone(), result);
        }

        requests
            .iter()
            .map(|r| {
                cache
                    .get(&r.fingerprint)
                    .cloned()
                    // insert 覆盖了本批全部指纹，此分支不可达
                    .unwrap_or_else(|| {
                        DelegationResult::fail(r.capability, ErrorKind::Timeout)
                    })
            })
            .collect()
    }
}

fn payload_preview(payload: &str) -> String {
    if payload.len() > 200 {
        format!("{}...", payload.chars().take(200).collect::<String>())
    } else {
        payload.to_string()
    }
}
