//! 航班搜索工作单元
//!
//! payload -> FlightQuery（LLM 抽取）-> provider 搜索 -> 报价摘要。
//! 缺关键信息（出发地 / 目的地 / 日期）不追问用户，直接以 InvalidPayload 报告给监督者。

use std::sync::Arc;

use async_trait::async_trait;
use schemars::schema_for;
use serde_json::Value;

use crate::delegation::{Capability, DelegationResult, WorkerUnit};
use crate::llm::LlmClient;
use crate::providers::{FlightOffer, FlightQuery, TravelSearchProvider};
use crate::state::InjectedContext;
use crate::workers::{llm_extract, provider_error_kind};

pub struct FlightWorker {
    llm: Arc<dyn LlmClient>,
    provider: Arc<dyn TravelSearchProvider>,
}

impl FlightWorker {
    pub fn new(llm: Arc<dyn LlmClient>, provider: Arc<dyn TravelSearchProvider>) -> Self {
        Self { llm, provider }
    }
}

fn format_offers(offers: &[FlightOffer]) -> String {
    let lines: Vec<String> = offers
        .iter()
        .take(5)
        .map(|o| {
            let stops = match o.stops {
                0 => "nonstop".to_string(),
                1 => "1 stop".to_string(),
                n => format!("{n} stops"),
            };
            format!(
                "- {} {} -> {}, departs {}, arrives {}, {} ({}), {} {}",
                o.carrier, o.from, o.to, o.departure, o.arrival, o.duration, stops,
                o.price_total, o.currency
            )
        })
        .collect();
    format!("Flight options found:\n{}", lines.join("\n"))
}

#[async_trait]
impl WorkerUnit for FlightWorker {
    fn capability(&self) -> Capability {
        Capability::Flight
    }

    fn description(&self) -> &str {
        "Search flight options. Use for requests about flight availability, \
destinations or travel dates, e.g. 'find me flights to Paris next Friday'."
    }

    fn input_schema(&self) -> Value {
        serde_json::to_value(schema_for!(FlightQuery)).unwrap_or_default()
    }

    async fn execute(&self, payload: &str, _context: &InjectedContext) -> DelegationResult {
        let query: FlightQuery = match llm_extract(
            self.llm.as_ref(),
            "a flight search query (IATA codes, dates as YYYY-MM-DD)",
            payload,
        )
        .await
        {
            Ok(q) => q,
            Err(kind) => return DelegationResult::fail(Capability::Flight, kind),
        };

        match self.provider.search_flights(&query).await {
            Ok(offers) => DelegationResult::ok(Capability::Flight, format_offers(&offers)),
            Err(e) => DelegationResult::fail(Capability::Flight, provider_error_kind(e)),
        }
    }
}
