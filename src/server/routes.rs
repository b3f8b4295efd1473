//! HTTP 路由
//!
//! - `POST /api/chat/{thread_id}`：对话（userId 随请求体可选传入）
//! - `POST /api/chat/pc/{thread_id}`：保护路由，user_id 取自验证后的 token
//! - `GET  /api/chat/threads/{thread_id}/messages`（及 /pc/ 变体）：线程历史
//! - `GET  /health`：存活检查
//!
//! 错误映射：InputError -> 400，身份失败 -> 401，推理/存储不可用 -> 503（可重试），
//! 其余 -> 500；致命失败返回通用「请重试」文案，不落部分会话状态。

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::AgentError;
use crate::providers::UserProfileClient;
use crate::server::auth::IdentityVerifier;
use crate::state::{ContentBlock, InjectedContext, Message, Role};
use crate::supervisor::Supervisor;

/// 路由共享状态
pub struct AppState {
    pub supervisor: Arc<Supervisor>,
    pub profile: Arc<dyn UserProfileClient>,
    pub verifier: Arc<dyn IdentityVerifier>,
}

/// 入站对话请求
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub role: String,
    pub content: String,
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
    #[serde(rename = "itineraryId")]
    pub itinerary_id: Option<String>,
}

/// 返回给前端的消息（content 为块数组）
#[derive(Debug, Serialize)]
pub struct MessageDto {
    pub id: String,
    pub role: String,
    pub content: Vec<Value>,
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

/// 对外错误：状态码 + 文案
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn unauthorized(detail: String) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            detail,
        }
    }
}

impl From<AgentError> for ApiError {
    fn from(e: AgentError) -> Self {
        let status = match &e {
            AgentError::InputError(_) => StatusCode::BAD_REQUEST,
            AgentError::ReasoningUnavailable(_) | AgentError::StorageUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let detail = if e.is_retryable() {
            "Something went wrong, please try again.".to_string()
        } else {
            e.to_string()
        };
        tracing::error!(error = %e, "request failed");
        Self { status, detail }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "detail": self.detail }))).into_response()
    }
}

fn role_str(role: &Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
        // 工作单元结果对前端呈现为 tool 消息
        Role::Worker => "tool",
    }
}

fn format_message(msg: &Message) -> MessageDto {
    let content = msg
        .content
        .iter()
        .map(|block| match block {
            ContentBlock::Text { text } => serde_json::json!({
                "type": "text",
                "text": text,
            }),
            ContentBlock::ToolResult { capability, output } => serde_json::json!({
                "type": "tool_result",
                "tool_result": {
                    "capability": capability,
                    "output": output,
                },
            }),
        })
        .collect();

    MessageDto {
        id: msg.id.clone(),
        role: role_str(&msg.role).to_string(),
        content,
        created_at: msg.created_at.to_rfc3339(),
    }
}

fn validate(request: &ChatRequest) -> Result<(), ApiError> {
    if request.role != "user" {
        return Err(AgentError::InputError(format!("unsupported role: {}", request.role)).into());
    }
    if request.content.trim().is_empty() {
        return Err(AgentError::InputError("empty content".to_string()).into());
    }
    Ok(())
}

/// 组装注入上下文：有 userId 时拉画像，失败留空继续
async fn build_context(
    state: &AppState,
    user_id: Option<String>,
    itinerary_id: Option<String>,
) -> InjectedContext {
    let user_profile = match &user_id {
        Some(id) => match state.profile.fetch(id).await {
            Some(profile) => profile,
            None => {
                tracing::warn!(user_id = %id, "no user profile, continuing without");
                Value::Null
            }
        },
        None => Value::Null,
    };
    InjectedContext {
        user_id,
        user_profile,
        itinerary_id,
    }
}

async fn run_chat(
    state: &AppState,
    thread_id: &str,
    request: &ChatRequest,
    user_id: Option<String>,
) -> Result<Json<MessageDto>, ApiError> {
    validate(request)?;
    let context = build_context(state, user_id, request.itinerary_id.clone()).await;
    let outcome = state
        .supervisor
        .handle_message(thread_id, &request.content, context)
        .await?;
    Ok(Json(format_message(&outcome.reply)))
}

async fn chat(
    State(state): State<Arc<AppState>>,
    Path(thread_id): Path<String>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<MessageDto>, ApiError> {
    run_chat(&state, &thread_id, &request, request.user_id.clone()).await
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::unauthorized("missing bearer token".to_string()))
}

async fn protected_chat(
    State(state): State<Arc<AppState>>,
    Path(thread_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<Json<MessageDto>, ApiError> {
    let token = bearer_token(&headers)?;
    let claims = state
        .verifier
        .verify(token)
        .await
        .map_err(ApiError::unauthorized)?;
    run_chat(&state, &thread_id, &request, Some(claims.sub)).await
}

async fn thread_messages_inner(
    state: &AppState,
    thread_id: &str,
) -> Result<Json<Value>, ApiError> {
    let conversation = state.supervisor.thread_history(thread_id).await?;
    let messages: Vec<MessageDto> = conversation.messages.iter().map(format_message).collect();
    Ok(Json(serde_json::json!({
        "thread_id": thread_id,
        "messages": messages,
    })))
}

async fn thread_messages(
    State(state): State<Arc<AppState>>,
    Path(thread_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    thread_messages_inner(&state, &thread_id).await
}

async fn protected_thread_messages(
    State(state): State<Arc<AppState>>,
    Path(thread_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let token = bearer_token(&headers)?;
    state
        .verifier
        .verify(token)
        .await
        .map_err(ApiError::unauthorized)?;
    thread_messages_inner(&state, &thread_id).await
}

async fn health() -> Json<Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// 构建路由
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/chat/:thread_id", post(chat))
        .route("/api/chat/pc/:thread_id", post(protected_chat))
        .route("/api/chat/threads/:thread_id/messages", get(thread_messages))
        .route(
            "/api/chat/pc/threads/:thread_id/messages",
            get(protected_thread_messages),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_worker_message_as_tool() {
        let msg = Message::worker("flight", serde_json::json!({"succeeded": true}));
        let dto = format_message(&msg);
        assert_eq!(dto.role, "tool");
        assert_eq!(dto.content[0]["type"], "tool_result");
    }

    #[test]
    fn test_validate_rejects_non_user_role() {
        let request = ChatRequest {
            role: "assistant".into(),
            content: "hi".into(),
            user_id: None,
            itinerary_id: None,
        };
        assert!(validate(&request).is_err());
    }
}
