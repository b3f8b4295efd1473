//! Voya - Rust 旅行对话智能体
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型
//! - **state**: 会话状态、检查点存储、线程锁
//! - **delegation**: 能力枚举、委派请求/结果、注册表与工作单元契约
//! - **supervisor**: 决策引擎与监督循环状态机
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **providers**: 外部协作方客户端（旅行搜索 / 行程 / 画像）
//! - **workers**: flight / lodging / activity / itinerary 工作单元
//! - **server**: axum HTTP 服务与身份校验

pub mod config;
pub mod core;
pub mod delegation;
pub mod llm;
pub mod providers;
pub mod server;
pub mod state;
pub mod supervisor;
pub mod workers;
