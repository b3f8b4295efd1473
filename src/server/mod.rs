//! HTTP 服务：axum 路由与身份校验

mod auth;
mod routes;

pub use auth::{Auth0Verifier, Claims, DenyAllVerifier, IdentityVerifier};
pub use routes::{router, AppState, ChatRequest, MessageDto};
