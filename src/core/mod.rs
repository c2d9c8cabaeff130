//! 核心编排层：错误、预算与计费、熔断、会话、主控流水线

pub mod budget;
pub mod builder;
pub mod circuit_breaker;
pub mod cost_meter;
pub mod error;
pub mod orchestrator;
pub mod report;
pub mod session;

pub use budget::{BudgetTier, BudgetTiers};
pub use builder::OrchestratorBuilder;
pub use circuit_breaker::{BreakerState, CircuitBreakerRegistry, CircuitState};
pub use cost_meter::{CostLedger, CostMeter};
pub use error::AgentError;
pub use orchestrator::{create_llm_from_config, Orchestrator, PromptSet};
pub use report::{QueryReport, SourceSummary};
pub use session::{
    Classification, Complexity, Evaluation, ExecutionMode, Reflection, Session, Strategy,
};
