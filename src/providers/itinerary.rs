//! 行程服务客户端
//!
//! 行程的查看与追加条目（机票 / 住宿 / 活动 / 餐厅）走外部行程服务的 REST 接口；
//! 核心只依赖 ItineraryProvider trait。

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::providers::ProviderError;

/// 行程条目
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct ItineraryItem {
    /// flight / hotel / activity / restaurant
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub starts_at: Option<String>,
    #[serde(default)]
    pub ends_at: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// 行程（标题对用户可见，id 仅内部使用）
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Itinerary {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub items: Vec<ItineraryItem>,
}

/// 行程级修改（重命名、备注）；None 字段保持不变
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct ItineraryUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// 行程服务接口
#[async_trait]
pub trait ItineraryProvider: Send + Sync {
    async fn fetch(&self, itinerary_id: &str) -> Result<Itinerary, ProviderError>;

    async fn add_item(
        &self,
        itinerary_id: &str,
        item: ItineraryItem,
    ) -> Result<Itinerary, ProviderError>;

    async fn update(
        &self,
        itinerary_id: &str,
        update: ItineraryUpdate,
    ) -> Result<Itinerary, ProviderError>;
}

/// REST 行程服务客户端
pub struct HttpItineraryProvider {
    http: reqwest::Client,
    base_url: String,
}

impl HttpItineraryProvider {
    pub fn new(base_url: &str, timeout_secs: u64) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(timeout_secs))
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ItineraryProvider for HttpItineraryProvider {
    async fn fetch(&self, itinerary_id: &str) -> Result<Itinerary, ProviderError> {
        let resp = self
            .http
            .get(format!("{}/itineraries/{itinerary_id}", self.base_url))
            .send()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ProviderError::NoResults);
        }
        let resp = resp
            .error_for_status()
            .map_err(|e| ProviderError::Http(e.to_string()))?;
        resp.json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))
    }

    async fn add_item(
        &self,
        itinerary_id: &str,
        item: ItineraryItem,
    ) -> Result<Itinerary, ProviderError> {
        let resp = self
            .http
            .post(format!("{}/itineraries/{itinerary_id}/items", self.base_url))
            .json(&item)
            .send()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?
            .error_for_status()
            .map_err(|e| ProviderError::Http(e.to_string()))?;
        resp.json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))
    }

    async fn update(
        &self,
        itinerary_id: &str,
        update: ItineraryUpdate,
    ) -> Result<Itinerary, ProviderError> {
        let resp = self
            .http
            .patch(format!("{}/itineraries/{itinerary_id}", self.base_url))
            .json(&update)
            .send()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ProviderError::NoResults);
        }
        let resp = resp
            .error_for_status()
            .map_err(|e| ProviderError::Http(e.to_string()))?;
        resp.json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))
    }
}
