//! 用户画像客户端
//!
//! 按 userId 拉取画像注入 ConversationState.injected_context；没有 userId 或
//! 画像缺失都返回 None（空画像是常态，记日志继续，不是错误）。

use async_trait::async_trait;
use serde_json::Value;

/// 用户画像接口
#[async_trait]
pub trait UserProfileClient: Send + Sync {
    async fn fetch(&self, user_id: &str) -> Option<Value>;
}

/// REST 画像服务客户端
pub struct HttpProfileClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpProfileClient {
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
impl UserProfileClient for HttpProfileClient {
    async fn fetch(&self, user_id: &str) -> Option<Value> {
        if user_id.is_empty() {
            return None;
        }
        let resp = self
            .http
            .get(format!("{}/users/{user_id}/profile", self.base_url))
            .send()
            .await;

        match resp {
            Ok(resp) if resp.status().is_success() => resp.json().await.ok(),
            Ok(resp) => {
                tracing::warn!(user_id, status = %resp.status(), "profile fetch failed");
                None
            }
            Err(e) => {
                tracing::warn!(user_id, error = %e, "profile service unreachable");
                None
            }
        }
    }
}

/// 空实现：未配置画像服务时使用
#[derive(Default)]
pub struct NoopProfileClient;

#[async_trait]
impl UserProfileClient for NoopProfileClient {
    async fn fetch(&self, _user_id: &str) -> Option<Value> {
        None
    }
}
