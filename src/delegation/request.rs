//! 委派请求 / 结果类型
//!
//! 监督者与工作单元之间的类型化边界：自然语言 payload + 能力枚举 + 指纹。
//! 指纹对 (capability, 规范化 payload) 取 SHA-256，用于同一轮内的重复委派抑制。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// 可委派的能力类别
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Flight,
    Lodging,
    Activity,
    Itinerary,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Flight => "flight",
            Capability::Lodging => "lodging",
            Capability::Activity => "activity",
            Capability::Itinerary => "itinerary",
        }
    }

    pub const ALL: [Capability; 4] = [
        Capability::Flight,
        Capability::Lodging,
        Capability::Activity,
        Capability::Itinerary,
    ];
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "flight" | "flights" => Ok(Capability::Flight),
            "lodging" | "hotel" | "hotels" => Ok(Capability::Lodging),
            "activity" | "activities" => Ok(Capability::Activity),
            "itinerary" => Ok(Capability::Itinerary),
            other => Err(format!("unknown capability: {other}")),
        }
    }
}

/// 指纹规范化：trim + 小写 + 连续空白折叠，轻微措辞差异仍视为重复
fn normalize_payload(payload: &str) -> String {
    payload
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// 一次委派请求
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DelegationRequest {
    pub capability: Capability,
    /// 自由文本指令，由工作单元自行解析为结构化查询
    pub payload: String,
    /// 发起该委派的推理周期序号
    pub requester_step: u32,
    pub fingerprint: String,
}

impl DelegationRequest {
    pub fn new(capability: Capability, payload: impl Into<String>, requester_step: u32) -> Self {
        let payload = payload.into();
        let mut hasher = Sha256::new();
        hasher.update(capability.as_str().as_bytes());
        hasher.update(b"\n");
        hasher.update(normalize_payload(&payload).as_bytes());
        let fingerprint = format!("{:x}", hasher.finalize());
        Self {
            capability,
            payload,
            requester_step,
            fingerprint,
        }
    }
}

/// 工作单元层错误分类；全部作为数据进入对话历史，不上抛
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorKind {
    ProviderError { detail: String },
    NoResults,
    Timeout,
    /// payload 缺少必要信息或无法解析
    InvalidPayload { detail: String },
}

/// 委派结果：由工作单元产出，被监督循环消费一次后折叠为 worker 消息
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DelegationResult {
    pub capability: Capability,
    pub succeeded: bool,
    pub content: String,
    pub error: Option<ErrorKind>,
}

impl DelegationResult {
    pub fn ok(capability: Capability, content: impl Into<String>) -> Self {
        Self {
            capability,
            succeeded: true,
            content: content.into(),
            error: None,
        }
    }

    pub fn fail(capability: Capability, error: ErrorKind) -> Self {
        let content = match &error {
            ErrorKind::ProviderError { detail } => format!("Provider error: {detail}"),
            ErrorKind::NoResults => "No results found for this search.".to_string(),
            ErrorKind::Timeout => "The search timed out.".to_string(),
            ErrorKind::InvalidPayload { detail } => format!("Missing information: {detail}"),
        };
        Self {
            capability,
            succeeded: false,
            content,
            error: Some(error),
        }
    }

    /// 折叠进历史时的结构化视图
    pub fn to_output(&self) -> Value {
        serde_json::json!({
            "succeeded": self.succeeded,
            "content": self.content,
            "error": self.error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_ignores_whitespace_and_case() {
        let a = DelegationRequest::new(Capability::Flight, "NYC to  Tokyo in June", 0);
        let b = DelegationRequest::new(Capability::Flight, "  nyc to tokyo in june ", 3);
        assert_eq!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn test_fingerprint_distinguishes_capability_and_payload() {
        let flight = DelegationRequest::new(Capability::Flight, "rome", 0);
        let hotel = DelegationRequest::new(Capability::Lodging, "rome", 0);
        let other = DelegationRequest::new(Capability::Flight, "milan", 0);
        assert_ne!(flight.fingerprint, hotel.fingerprint);
        assert_ne!(flight.fingerprint, other.fingerprint);
    }

    #[test]
    fn test_capability_parse_aliases() {
        assert_eq!("hotels".parse::<Capability>().unwrap(), Capability::Lodging);
        assert_eq!("Flight".parse::<Capability>().unwrap(), Capability::Flight);
        assert!("cruise".parse::<Capability>().is_err());
    }
}
