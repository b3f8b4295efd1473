//! 活动搜索工作单元
//!
//! 抽取步骤同时让 LLM 给出目的地的近似坐标（Amadeus 活动接口按坐标检索）。

use std::sync::Arc;

use async_trait::async_trait;
use schemars::schema_for;
use serde_json::Value;

use crate::delegation::{Capability, DelegationResult, WorkerUnit};
use crate::llm::LlmClient;
use crate::providers::{ActivityOffer, ActivityQuery, TravelSearchProvider};
use crate::state::InjectedContext;
use crate::workers::{llm_extract, provider_error_kind};

pub struct ActivityWorker {
    llm: Arc<dyn LlmClient>,
    provider: Arc<dyn TravelSearchProvider>,
}

impl ActivityWorker {
    pub fn new(llm: Arc<dyn LlmClient>, provider: Arc<dyn TravelSearchProvider>) -> Self {
        Self { llm, provider }
    }
}

fn format_offers(offers: &[ActivityOffer]) -> String {
    let lines: Vec<String> = offers
        .iter()
        .take(8)
        .map(|o| {
            let mut line = format!("- {}", o.name);
            if let Some(desc) = &o.description {
                line.push_str(&format!(": {desc}"));
            }
            if let Some(price) = &o.price {
                line.push_str(&format!(" (from {price})"));
            }
            line
        })
        .collect();
    format!("Activities found:\n{}", lines.join("\n"))
}

#[async_trait]
impl WorkerUnit for ActivityWorker {
    fn capability(&self) -> Capability {
        Capability::Activity
    }

    fn description(&self) -> &str {
        "Search local activities, tours and attractions near a destination, \
e.g. 'suggest fun activities near Rome'."
    }

    fn input_schema(&self) -> Value {
        serde_json::to_value(schema_for!(ActivityQuery)).unwrap_or_default()
    }

    async fn execute(&self, payload: &str, _context: &InjectedContext) -> DelegationResult {
        let query: ActivityQuery = match llm_extract(
            self.llm.as_ref(),
            "an activity search query (approximate latitude/longitude of the destination)",
            payload,
        )
        .await
        {
            Ok(q) => q,
            Err(kind) => return DelegationResult::fail(Capability::Activity, kind),
        };

        match self.provider.search_activities(&query).await {
            Ok(offers) => DelegationResult::ok(Capability::Activity, format_offers(&offers)),
            Err(e) => DelegationResult::fail(Capability::Activity, provider_error_kind(e)),
        }
    }
}
