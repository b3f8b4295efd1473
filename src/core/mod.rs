//! 核心类型：错误

mod error;

pub use error::AgentError;
