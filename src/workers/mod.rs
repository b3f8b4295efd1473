//! 工作单元：flight / lodging / activity / itinerary
//!
//! 每个工作单元自行决定如何把自由文本 payload 解析为结构化查询（借助 LLM 抽取），
//! 调用各自 provider 并把结果排版成可读摘要。所有 provider 错误都在边界内
//! 规范化为 DelegationResult，绝不向监督循环抛异常。

mod activity;
mod flight;
mod itinerary;
mod lodging;

pub use activity::ActivityWorker;
pub use flight::FlightWorker;
pub use itinerary::ItineraryWorker;
pub use lodging::LodgingWorker;

use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;

use crate::delegation::ErrorKind;
use crate::llm::{ChatMessage, LlmClient};
use crate::providers::ProviderError;

/// 用 LLM 从自由文本抽取结构化查询：schema 进 prompt，只接受 JSON 输出
pub(crate) async fn llm_extract<T: DeserializeOwned + JsonSchema>(
    llm: &dyn LlmClient,
    what: &str,
    payload: &str,
) -> Result<T, ErrorKind> {
    let schema = serde_json::to_string(&schema_for!(T)).unwrap_or_else(|_| "{}".to_string());
    let system = format!(
        "Extract {what} from the request below. Respond with ONLY a JSON object \
matching this schema:\n{schema}\n\
If a required field cannot be determined from the request, respond with \
{{\"missing\": \"<what is missing>\"}} instead."
    );

    let output = llm
        .complete(&[ChatMessage::system(system), ChatMessage::user(payload)])
        .await
        .map_err(|detail| ErrorKind::ProviderError { detail })?;

    let json_str = match (output.find('{'), output.rfind('}')) {
        (Some(start), Some(end)) if start < end => &output[start..=end],
        _ => {
            return Err(ErrorKind::InvalidPayload {
                detail: format!("no JSON in extraction output: {output}"),
            })
        }
    };

    if let Ok(missing) = serde_json::from_str::<serde_json::Value>(json_str) {
        if let Some(detail) = missing.get("missing").and_then(|v| v.as_str()) {
            return Err(ErrorKind::InvalidPayload {
                detail: detail.to_string(),
            });
        }
    }

    serde_json::from_str(json_str).map_err(|e| ErrorKind::InvalidPayload {
        detail: format!("{e}: {json_str}"),
    })
}

/// ProviderError 到委派错误分类的统一映射
pub(crate) fn provider_error_kind(e: ProviderError) -> ErrorKind {
    match e {
        ProviderError::NoResults => ErrorKind::NoResults,
        other => ErrorKind::ProviderError {
            detail: other.to_string(),
        },
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use async_trait::async_trait;

    use crate::llm::{ChatMessage, LlmClient};

    /// 固定输出的 LLM 桩
    pub struct StaticLlm(pub String);

    #[async_trait]
    impl LlmClient for StaticLlm {
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, String> {
            Ok(self.0.clone())
        }
    }
}
