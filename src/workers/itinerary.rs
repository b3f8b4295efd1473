//! 行程操作工作单元
//!
//! 查看、追加条目、行程级修改三类操作。itinerary_id 来自注入上下文，
//! 不向用户询问；回复中只出现行程标题，绝不出现内部 id。

use std::sync::Arc;

use async_trait::async_trait;
use schemars::{schema_for, JsonSchema};
use serde::Deserialize;
use serde_json::Value;

use crate::delegation::{Capability, DelegationResult, ErrorKind, WorkerUnit};
use crate::llm::LlmClient;
use crate::providers::{Itinerary, ItineraryItem, ItineraryProvider, ItineraryUpdate};
use crate::state::InjectedContext;
use crate::workers::{llm_extract, provider_error_kind};

/// LLM 从 payload 抽取出的行程操作
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(tag = "op", rename_all = "snake_case")]
enum ItineraryOp {
    /// 查看行程内容
    View,
    /// 追加一个条目
    AddItem { item: ItineraryItem },
    /// 行程级修改（重命名、备注）
    Update { update: ItineraryUpdate },
}

pub struct ItineraryWorker {
    llm: Arc<dyn LlmClient>,
    provider: Arc<dyn ItineraryProvider>,
}

impl ItineraryWorker {
    pub fn new(llm: Arc<dyn LlmClient>, provider: Arc<dyn ItineraryProvider>) -> Self {
        Self { llm, provider }
    }
}

fn format_itinerary(itinerary: &Itinerary) -> String {
    if itinerary.items.is_empty() {
        return format!("\"{}\" is empty so far.", itinerary.title);
    }
    let lines: Vec<String> = itinerary
        .items
        .iter()
        .map(|item| {
            let mut line = format!("- [{}] {}", item.kind, item.name);
            if let Some(city) = &item.city {
                line.push_str(&format!(", {city}"));
            }
            if let Some(starts) = &item.starts_at {
                line.push_str(&format!(" ({starts})"));
            }
            line
        })
        .collect();
    format!("\"{}\":\n{}", itinerary.title, lines.join("\n"))
}

#[async_trait]
impl WorkerUnit for ItineraryWorker {
    fn capability(&self) -> Capability {
        Capability::Itinerary
    }

    fn description(&self) -> &str {
        "View the user's itinerary or add an item to it (flight, hotel, activity, \
restaurant). Use ONLY when the user explicitly asks to view or modify their trip."
    }

    fn input_schema(&self) -> Value {
        serde_json::to_value(schema_for!(ItineraryItem)).unwrap_or_default()
    }

    async fn execute(&self, payload: &str, context: &InjectedContext) -> DelegationResult {
        let Some(itinerary_id) = context.itinerary_id.as_deref() else {
            return DelegationResult::fail(
                Capability::Itinerary,
                ErrorKind::InvalidPayload {
                    detail: "no active itinerary in context".to_string(),
                },
            );
        };

        let op: ItineraryOp = match llm_extract(
            self.llm.as_ref(),
            "an itinerary operation: {\"op\": \"view\"}, {\"op\": \"add_item\", \"item\": {...}} \
or {\"op\": \"update\", \"update\": {\"title\": ..., \"notes\": ...}}",
            payload,
        )
        .await
        {
            Ok(op) => op,
            Err(kind) => return DelegationResult::fail(Capability::Itinerary, kind),
        };

        match op {
            ItineraryOp::View => match self.provider.fetch(itinerary_id).await {
                Ok(itinerary) => {
                    DelegationResult::ok(Capability::Itinerary, format_itinerary(&itinerary))
                }
                Err(e) => DelegationResult::fail(Capability::Itinerary, provider_error_kind(e)),
            },
            ItineraryOp::AddItem { item } => {
                let name = item.name.clone();
                match self.provider.add_item(itinerary_id, item).await {
                    Ok(itinerary) => DelegationResult::ok(
                        Capability::Itinerary,
                        format!(
                            "Added \"{name}\" to \"{}\". The operation is complete; do not repeat it.",
                            itinerary.title
                        ),
                    ),
                    Err(e) => DelegationResult::fail(Capability::Itinerary, provider_error_kind(e)),
                }
            }
            ItineraryOp::Update { update } => {
                match self.provider.update(itinerary_id, update).await {
                    Ok(itinerary) => DelegationResult::ok(
                        Capability::Itinerary,
                        format!(
                            "Updated \"{}\". The operation is complete; do not repeat it.",
                            itinerary.title
                        ),
                    ),
                    Err(e) => DelegationResult::fail(Capability::Itinerary, provider_error_kind(e)),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderError;
    use crate::workers::test_support::StaticLlm;
    use tokio::sync::Mutex;

    struct StubItineraries {
        itinerary: Mutex<Itinerary>,
    }

    #[async_trait]
    impl ItineraryProvider for StubItineraries {
        async fn fetch(&self, itinerary_id: &str) -> Result<Itinerary, ProviderError> {
            let it = self.itinerary.lock().await;
            if it.id == itinerary_id {
                Ok(it.clone())
            } else {
                Err(ProviderError::NoResults)
            }
        }

        async fn add_item(
            &self,
            _itinerary_id: &str,
            item: ItineraryItem,
        ) -> Result<Itinerary, ProviderError> {
            let mut it = self.itinerary.lock().await;
            it.items.push(item);
            Ok(it.clone())
        }

        async fn update(
            &self,
            _itinerary_id: &str,
            update: ItineraryUpdate,
        ) -> Result<Itinerary, ProviderError> {
            let mut it = self.itinerary.lock().await;
            if let Some(title) = update.title {
                it.title = title;
            }
            Ok(it.clone())
        }
    }

    fn stub() -> Arc<StubItineraries> {
        Arc::new(StubItineraries {
            itinerary: Mutex::new(Itinerary {
                id: "it-1".into(),
                title: "Tokyo trip".into(),
                items: vec![],
            }),
        })
    }

    fn ctx_with_itinerary() -> InjectedContext {
        InjectedContext {
            user_id: Some("u1".into()),
            user_profile: Value::Null,
            itinerary_id: Some("it-1".into()),
        }
    }

    #[tokio::test]
    async fn test_add_item_confirms_with_title_not_id() {
        let llm = Arc::new(StaticLlm(
            r#"{"op": "add_item", "item": {"kind": "hotel", "name": "Grand Hyatt", "city": "Tokyo"}}"#
                .into(),
        ));
        let worker = ItineraryWorker::new(llm, stub());

        let result = worker
            .execute("add the Grand Hyatt to my trip", &ctx_with_itinerary())
            .await;
        assert!(result.succeeded);
        assert!(result.content.contains("Tokyo trip"));
        assert!(!result.content.contains("it-1"));
    }

    #[tokio::test]
    async fn test_update_renames_with_title_not_id() {
        let llm = Arc::new(StaticLlm(
            r#"{"op": "update", "update": {"title": "Kyoto trip"}}"#.into(),
        ));
        let worker = ItineraryWorker::new(llm, stub());

        let result = worker
            .execute("rename my trip to Kyoto trip", &ctx_with_itinerary())
            .await;
        assert!(result.succeeded);
        assert!(result.content.contains("Kyoto trip"));
        assert!(!result.content.contains("it-1"));
    }

    #[tokio::test]
    async fn test_missing_itinerary_context_fails_cleanly() {
        let llm = Arc::new(StaticLlm(r#"{"op": "view"}"#.into()));
        let worker = ItineraryWorker::new(llm, stub());

        let result = worker.execute("show my itinerary", &InjectedContext::default()).await;
        assert!(!result.succeeded);
        assert!(matches!(result.error, Some(ErrorKind::InvalidPayload { .. })));
    }

    #[tokio::test]
    async fn test_view_lists_items() {
        let provider = stub();
        provider.itinerary.lock().await.items.push(ItineraryItem {
            kind: "flight".into(),
            name: "UA79 JFK-NRT".into(),
            city: None,
            country: None,
            starts_at: Some("2026-06-01".into()),
            ends_at: None,
            notes: None,
        });
        let llm = Arc::new(StaticLlm(r#"{"op": "view"}"#.into()));
        let worker = ItineraryWorker::new(llm, provider);

        let result = worker.execute("what's in my trip?", &ctx_with_itinerary()).await;
        assert!(result.succeeded);
        assert!(result.content.contains("UA79"));
    }
}
