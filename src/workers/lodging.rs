//! 住宿搜索工作单元

use std::sync::Arc;

use async_trait::async_trait;
use schemars::schema_for;
use serde_json::Value;

use crate::delegation::{Capability, DelegationResult, WorkerUnit};
use crate::llm::LlmClient;
use crate::providers::{HotelOffer, HotelQuery, TravelSearchProvider};
use crate::state::InjectedContext;
use crate::workers::{llm_extract, provider_error_kind};

pub struct LodgingWorker {
    llm: Arc<dyn LlmClient>,
    provider: Arc<dyn TravelSearchProvider>,
}

impl LodgingWorker {
    pub fn new(llm: Arc<dyn LlmClient>, provider: Arc<dyn TravelSearchProvider>) -> Self {
        Self { llm, provider }
    }
}

fn format_offers(offers: &[HotelOffer]) -> String {
    let lines: Vec<String> = offers
        .iter()
        .take(8)
        .map(|o| {
            let mut line = format!("- {}", o.name);
            if let Some(rating) = &o.rating {
                line.push_str(&format!(" ({rating}-star)"));
            }
            if let (Some(price), Some(currency)) = (&o.price_total, &o.currency) {
                line.push_str(&format!(", total {price} {currency}"));
            }
            line
        })
        .collect();
    format!("Lodging options found:\n{}", lines.join("\n"))
}

#[async_trait]
impl WorkerUnit for LodgingWorker {
    fn capability(&self) -> Capability {
        Capability::Lodging
    }

    fn description(&self) -> &str {
        "Search hotels and accommodation for a destination and date range, \
e.g. 'find a 4-star hotel in Tokyo for three nights'."
    }

    fn input_schema(&self) -> Value {
        serde_json::to_value(schema_for!(HotelQuery)).unwrap_or_default()
    }

    async fn execute(&self, payload: &str, _context: &InjectedContext) -> DelegationResult {
        let query: HotelQuery = match llm_extract(
            self.llm.as_ref(),
            "a hotel search query (IATA city code, dates as YYYY-MM-DD)",
            payload,
        )
        .await
        {
            Ok(q) => q,
            Err(kind) => return DelegationResult::fail(Capability::Lodging, kind),
        };

        match self.provider.search_hotels(&query).await {
            Ok(offers) => DelegationResult::ok(Capability::Lodging, format_offers(&offers)),
            Err(e) => DelegationResult::fail(Capability::Lodging, provider_error_kind(e)),
        }
    }
}
