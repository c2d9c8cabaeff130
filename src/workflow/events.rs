//! 流水线过程事件：供流式前端展示分类、规划、工具执行与质量判断

use serde::Serialize;

use crate::core::{Classification, Strategy};
use crate::quality::QualityMetrics;
use crate::tools::ToolStatus;
use crate::workflow::PipelineShape;

/// 单步过程事件（可序列化为 JSON）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    Classified { classification: Classification },
    ShapeSelected { shape: PipelineShape },
    StrategyPlanned { strategy: Strategy },
    /// 精炼循环进入新一轮
    Iteration { round: usize, max_rounds: usize },
    /// 单个工具调用结束（含跳过的 circuit_open）
    ToolFinished {
        tool: String,
        status: ToolStatus,
        item_count: usize,
        latency_ms: Option<u64>,
    },
    QualityEvaluated { passed: bool, metrics: QualityMetrics },
    Reflected {
        sufficient: bool,
        gaps: Vec<String>,
    },
    Synthesized { text: String },
}
