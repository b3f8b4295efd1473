//! 监督者：决策引擎与主循环状态机

mod decision;
mod loop_;

pub use decision::{
    parse_decision, Decision, DecisionEngine, LlmDecisionEngine, ScriptedDecisionEngine,
};
pub use loop_::{Phase, Supervisor, TurnOutcome, DEFAULT_MAX_STEPS};
