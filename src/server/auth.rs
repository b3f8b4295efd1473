//! 身份校验协作方
//!
//! 核心不做协议级验证，只消费验证得到的 user_id claim。Auth0 实现拿 bearer token
//! 调 userinfo 端点取 sub；未配置域名时保护路由一律拒绝。

use async_trait::async_trait;
use serde::Deserialize;

/// 验证通过后的身份断言
#[derive(Clone, Debug)]
pub struct Claims {
    pub sub: String,
}

/// 身份校验接口；Err 即 401
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, bearer_token: &str) -> Result<Claims, String>;
}

/// Auth0 userinfo 校验器
pub struct Auth0Verifier {
    http: reqwest::Client,
    domain: String,
}

impl Auth0Verifier {
    pub fn new(domain: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            domain: domain.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl IdentityVerifier for Auth0Verifier {
    async fn verify(&self, bearer_token: &str) -> Result<Claims, String> {
        #[derive(Deserialize)]
        struct UserInfo {
            sub: String,
        }

        let resp = self
            .http
            .get(format!("https://{}/userinfo", self.domain))
            .bearer_auth(bearer_token)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !resp.status().is_success() {
            return Err(format!("token rejected: {}", resp.status()));
        }

        let info: UserInfo = resp.json().await.map_err(|e| e.to_string())?;
        Ok(Claims { sub: info.sub })
    }
}

/// 未配置身份服务时的拒绝器
#[derive(Default)]
pub struct DenyAllVerifier;

#[async_trait]
impl IdentityVerifier for DenyAllVerifier {
    async fn verify(&self, _bearer_token: &str) -> Result<Claims, String> {
        Err("identity verification not configured".to_string())
    }
}
