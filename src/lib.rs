//! Forage - 自适应检索编排引擎
//!
//! 按查询复杂度在三种流水线形态间选择，在预算与工具级熔断约束下调度检索工具，
//! 用确定性质量闸门评估结果，必要时有界迭代重新规划，最后交给合成阶段。
//!
//! 模块划分：
//! - **agents**: 模型驱动的阶段（分类、规划、反思、合成）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 预算档位、费用计量、熔断器、会话、主控流水线与构建器
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **observability**: 日志初始化
//! - **quality**: 质量闸门
//! - **tools**: 工具 trait、注册表、执行器、上下文聚合、缓存与内置检索工具
//! - **workflow**: 流水线形态选择、精炼循环、过程事件

pub mod agents;
pub mod config;
pub mod core;
pub mod llm;
pub mod observability;
pub mod quality;
pub mod tools;
pub mod workflow;

pub use crate::core::{AgentError, Orchestrator, OrchestratorBuilder, QueryReport, Session};
