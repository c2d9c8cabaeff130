//! 流水线形态、精炼循环与过程事件

pub mod events;
pub mod refinement;
pub mod selector;

pub use events::PipelineEvent;
pub use refinement::{should_escalate, LoopExit, LoopOutcome, RefinementLoop, RefinementStages};
pub use selector::PipelineShape;
