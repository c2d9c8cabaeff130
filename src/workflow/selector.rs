//! 流水线形态选择：按复杂度标签三选一，分类之后只选一次

use serde::{Deserialize, Serialize};

use crate::core::{Complexity, ExecutionMode};

/// 三种流水线形态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineShape {
    /// 分类 → 规划 → 执行一次 → 闸门 → 合成
    Sequential,
    /// 同上，但执行方式强制为并行
    ParallelFanOut,
    /// 分类 → 规划 → 迭代精炼 → 合成
    IterativeRefinement,
}

impl PipelineShape {
    /// 缺失或未知标签按 medium 处理
    pub fn select(complexity: Option<Complexity>) -> Self {
        match complexity.unwrap_or_default() {
            Complexity::Simple => Self::Sequential,
            Complexity::Medium => Self::ParallelFanOut,
            Complexity::Complex => Self::IterativeRefinement,
        }
    }

    /// 该形态强制的执行方式；None 表示沿用规划器给出的方式
    pub fn forced_mode(&self) -> Option<ExecutionMode> {
        match self {
            Self::ParallelFanOut => Some(ExecutionMode::Parallel),
            _ => None,
        }
    }

    pub fn is_iterative(&self) -> bool {
        matches!(self, Self::IterativeRefinement)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::ParallelFanOut => "parallel_fan_out",
            Self::IterativeRefinement => "iterative_refinement",
        }
    }
}
