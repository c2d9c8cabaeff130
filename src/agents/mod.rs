//! 模型驱动的流水线阶段：分类、规划、反思、合成
//!
//! 每个阶段只拿到自己需要的状态切片，渲染提示词后解析模型输出；失败原样以 AgentError 返回。

pub mod classifier;
pub mod json;
pub mod planner;
pub mod reflection;
pub mod synthesizer;

pub use classifier::{Classifier, DEFAULT_CLASSIFIER_PROMPT};
pub use json::extract_json;
pub use planner::{PlanRequest, Planner, DEFAULT_PLANNER_PROMPT};
pub use reflection::{Reflector, DEFAULT_REFLECTION_PROMPT};
pub use synthesizer::{Synthesizer, DEFAULT_SYNTHESIZER_PROMPT};
