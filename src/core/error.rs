//! Agent 错误类型
//!
//! 错误分三类：进入监督循环前的输入错误、请求级致命错误（推理 / 存储不可用，可重试）、
//! 被吸收为数据的委派失败（进入对话历史，不中断循环，见 delegation::DelegationResult）。

use thiserror::Error;

/// 编排核心运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    /// 入站请求格式错误（缺字段、空内容），进入监督循环之前被拒绝，无状态变更
    #[error("Invalid input: {0}")]
    InputError(String),

    /// 推理引擎失败或不可达，当前请求终止；最后一次成功转移之后不再写检查点
    #[error("Reasoning engine unavailable: {0}")]
    ReasoningUnavailable(String),

    /// 检查点存储读写失败，当前请求终止；save 幂等，调用方可安全重试
    #[error("Checkpoint storage unavailable: {0}")]
    StorageUnavailable(String),

    /// 能力重复注册等配置错误（进程启动时致命，不出现在请求期）
    #[error("Config error: {0}")]
    ConfigError(String),

    /// LLM 输出无法解析为决策
    #[error("JSON parse error: {0}")]
    JsonParseError(String),
}

impl AgentError {
    /// 调用方是否可以原样重试当前请求
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AgentError::ReasoningUnavailable(_) | AgentError::StorageUnavailable(_)
        )
    }
}
