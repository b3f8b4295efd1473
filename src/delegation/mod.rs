//! 委派层：能力枚举、请求 / 结果类型、注册表与工作单元契约

mod registry;
mod request;

pub use registry::{DelegationRegistry, TurnCache, WorkerUnit};
pub use request::{Capability, DelegationRequest, DelegationResult, ErrorKind};
