//! 检查点存储：线程维度的状态快照 / 恢复
//!
//! load 对缺失线程返回全新空状态（新会话是常态不是错误）；save 幂等，
//! 重复保存完全相同的状态不推进版本号。存储不可达统一转 StorageUnavailable，
//! 绝不静默吞掉——丢检查点等于用户恢复会话时"丢历史"。

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use tokio::sync::RwLock;

use crate::core::AgentError;
use crate::state::ConversationState;

/// 一个线程的最新快照；每线程只保留当前一份
#[derive(Clone, Debug)]
pub struct Checkpoint {
    pub thread_id: String,
    pub state_json: String,
    pub version: u64,
    pub written_at: DateTime<Utc>,
}

/// 检查点存储接口
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// 读取最新检查点的状态；无检查点时返回初始化空状态
    async fn load(&self, thread_id: &str) -> Result<ConversationState, AgentError>;

    /// 持久化状态；对相同状态重复调用可观测为 no-op
    async fn save(&self, thread_id: &str, state: &ConversationState) -> Result<(), AgentError>;

    /// 当前版本号（无检查点为 None）；测试与审计用
    async fn version(&self, thread_id: &str) -> Result<Option<u64>, AgentError>;
}

fn serialize_state(state: &ConversationState) -> Result<String, AgentError> {
    serde_json::to_string(state)
        .map_err(|e| AgentError::StorageUnavailable(format!("serialize state: {e}")))
}

fn deserialize_state(json: &str) -> Result<ConversationState, AgentError> {
    serde_json::from_str(json)
        .map_err(|e| AgentError::StorageUnavailable(format!("corrupt checkpoint: {e}")))
}

/// 内存检查点存储（测试与无盘运行）
#[derive(Default)]
pub struct MemoryCheckpointStore {
    inner: RwLock<HashMap<String, Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self, thread_id: &str) -> Result<ConversationState, AgentError> {
        match self.inner.read().await.get(thread_id) {
            Some(cp) => deserialize_state(&cp.state_json),
            None => Ok(ConversationState::new(thread_id)),
        }
    }

    async fn save(&self, thread_id: &str, state: &ConversationState) -> Result<(), AgentError> {
        let state_json = serialize_state(state)?;
        let mut inner = self.inner.write().await;
        match inner.get_mut(thread_id) {
            Some(existing) if existing.state_json == state_json => Ok(()),
            Some(existing) => {
                existing.state_json = state_json;
                existing.version += 1;
                existing.written_at = Utc::now();
                Ok(())
            }
            None => {
                inner.insert(
                    thread_id.to_string(),
                    Checkpoint {
                        thread_id: thread_id.to_string(),
                        state_json,
                        version: 1,
                        written_at: Utc::now(),
                    },
                );
                Ok(())
            }
        }
    }

    async fn version(&self, thread_id: &str) -> Result<Option<u64>, AgentError> {
        Ok(self.inner.read().await.get(thread_id).map(|cp| cp.version))
    }
}

/// SQLite 检查点存储：跨重启恢复会话
pub struct SqliteCheckpointStore {
    pool: sqlx::sqlite::SqlitePool,
}

impl SqliteCheckpointStore {
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self, sqlx::Error> {
        let db_url = format!("sqlite:{}?mode=rwc", db_path.as_ref().display());
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                thread_id TEXT PRIMARY KEY,
                state_json TEXT NOT NULL,
                version INTEGER NOT NULL,
                written_at TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn load(&self, thread_id: &str) -> Result<ConversationState, AgentError> {
        let row = sqlx::query("SELECT state_json FROM checkpoints WHERE thread_id = ?")
            .bind(thread_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AgentError::StorageUnavailable(e.to_string()))?;

        match row {
            Some(row) => deserialize_state(&row.get::<String, _>("state_json")),
            None => Ok(ConversationState::new(thread_id)),
        }
    }

    async fn save(&self, thread_id: &str, state: &ConversationState) -> Result<(), AgentError> {
        let state_json = serialize_state(state)?;

        let existing: Option<String> =
            sqlx::query("SELECT state_json FROM checkpoints WHERE thread_id = ?")
                .bind(thread_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| AgentError::StorageUnavailable(e.to_string()))?
                .map(|row| row.get("state_json"));

        // 幂等：与现存快照逐字节相同则不写
        if existing.as_deref() == Some(state_json.as_str()) {
            return Ok(());
        }

        sqlx::query(
            "INSERT INTO checkpoints (thread_id, state_json, version, written_at)
             VALUES (?, ?, 1, ?)
             ON CONFLICT(thread_id) DO UPDATE SET
                 state_json = excluded.state_json,
                 version = checkpoints.version + 1,
                 written_at = excluded.written_at",
        )
        .bind(thread_id)
        .bind(&state_json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| AgentError::StorageUnavailable(e.to_string()))?;

        Ok(())
    }

    async fn version(&self, thread_id: &str) -> Result<Option<u64>, AgentError> {
        let row = sqlx::query("SELECT version FROM checkpoints WHERE thread_id = ?")
            .bind(thread_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AgentError::StorageUnavailable(e.to_string()))?;
        Ok(row.map(|r| r.get::<i64, _>("version") as u64))
    }
}

/// 创建检查点存储：提供 db_path 时用 SQLite，失败回退内存存储
pub async fn create_checkpoint_store(db_path: Option<&Path>) -> Arc<dyn CheckpointStore> {
    if let Some(path) = db_path {
        match SqliteCheckpointStore::new(path).await {
            Ok(store) => {
                tracing::info!("Using sqlite checkpoint store: {:?}", path);
                return Arc::new(store);
            }
            Err(e) => {
                tracing::warn!("Failed to open sqlite checkpoint store, falling back to memory: {}", e);
            }
        }
    }
    tracing::info!("Using in-memory checkpoint store");
    Arc::new(MemoryCheckpointStore::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Message;

    #[tokio::test]
    async fn test_load_missing_thread_is_fresh_state() {
        let store = MemoryCheckpointStore::new();
        let state = store.load("nope").await.unwrap();
        assert!(state.messages.is_empty());
        assert_eq!(state.step_count, 0);
        // 未保存时重复 load 结果一致
        let again = store.load("nope").await.unwrap();
        assert_eq!(again.messages.len(), state.messages.len());
        assert!(store.version("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_then_load_round_trips() {
        let store = MemoryCheckpointStore::new();
        let mut state = ConversationState::new("t1");
        state.push(Message::user("hello"));
        state.step_count = 2;
        store.save("t1", &state).await.unwrap();

        let loaded = store.load("t1").await.unwrap();
        assert_eq!(loaded.messages.len(), 1);
        assert_eq!(loaded.step_count, 2);
        assert_eq!(store.version("t1").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_identical_save_is_noop() {
        let store = MemoryCheckpointStore::new();
        let mut state = ConversationState::new("t1");
        state.push(Message::user("hello"));

        store.save("t1", &state).await.unwrap();
        store.save("t1", &state).await.unwrap();
        assert_eq!(store.version("t1").await.unwrap(), Some(1));

        state.push(Message::assistant("hi"));
        store.save("t1", &state).await.unwrap();
        assert_eq!(store.version("t1").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_sqlite_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoints.db");

        {
            let store = SqliteCheckpointStore::new(&path).await.unwrap();
            let mut state = ConversationState::new("t1");
            state.push(Message::user("find hotels in Rome"));
            store.save("t1", &state).await.unwrap();
            store.save("t1", &state).await.unwrap();
            assert_eq!(store.version("t1").await.unwrap(), Some(1));
        }

        let reopened = SqliteCheckpointStore::new(&path).await.unwrap();
        let loaded = reopened.load("t1").await.unwrap();
        assert_eq!(loaded.messages.len(), 1);
        assert_eq!(loaded.messages[0].text(), "find hotels in Rome");
    }
}
