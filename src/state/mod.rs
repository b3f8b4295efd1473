//! 会话状态与持久化
//!
//! - **conversation**: Message / InjectedContext / ConversationState
//! - **checkpoint**: 线程维度的快照存储（内存 / SQLite）
//! - **thread_lock**: 同线程请求串行化

mod checkpoint;
mod conversation;
mod thread_lock;

pub use checkpoint::{
    create_checkpoint_store, Checkpoint, CheckpointStore, MemoryCheckpointStore,
    SqliteCheckpointStore,
};
pub use conversation::{ContentBlock, ConversationState, InjectedContext, Message, Role};
pub use thread_lock::ThreadLocks;
