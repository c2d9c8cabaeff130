//! 查询会话：单次查询在各阶段之间传递的显式状态
//!
//! 每个字段都有明确的生产者：分类写 classification，规划写 strategy，执行写 tool_results /
//! context_items / context / metrics / quality_passed，反思写 reflection，合成写 final_response。
//! 会话只属于当前查询的流水线，不跨查询共享。

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::core::{BudgetTier, BudgetTiers, CostMeter};
use crate::quality::QualityMetrics;
use crate::tools::{ContextItem, ToolResult};
use crate::workflow::PipelineShape;

/// 查询复杂度标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    #[default]
    Medium,
    Complex,
}

impl Complexity {
    /// 宽松解析（大小写、首尾空白不敏感）；未知标签返回 None
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "simple" => Some(Self::Simple),
            "medium" => Some(Self::Medium),
            "complex" => Some(Self::Complex),
            _ => None,
        }
    }
}

/// 分类结果：intent / complexity / domain，保留模型原始字符串
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    #[serde(default)]
    pub intent: String,
    #[serde(default)]
    pub complexity: String,
    #[serde(default)]
    pub domain: String,
}

impl Classification {
    pub fn complexity(&self) -> Option<Complexity> {
        Complexity::from_label(&self.complexity)
    }
}

/// 工具执行方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum ExecutionMode {
    #[default]
    Sequential,
    Parallel,
}

impl From<String> for ExecutionMode {
    fn from(value: String) -> Self {
        if value.trim().eq_ignore_ascii_case("parallel") {
            Self::Parallel
        } else {
            Self::Sequential
        }
    }
}

/// 执行策略：要跑的工具列表与执行方式（由外部规划器产出）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    #[serde(default)]
    pub strategy_type: String,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    #[serde(default)]
    pub reasoning: String,
}

impl Strategy {
    pub fn new(tools: Vec<String>, execution_mode: ExecutionMode) -> Self {
        Self {
            strategy_type: String::new(),
            tools,
            execution_mode,
            reasoning: String::new(),
        }
    }
}

/// 反思结论
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Evaluation {
    Sufficient,
    #[default]
    Insufficient,
}

impl From<String> for Evaluation {
    fn from(value: String) -> Self {
        if value.trim().eq_ignore_ascii_case("sufficient") {
            Self::Sufficient
        } else {
            Self::Insufficient
        }
    }
}

/// 反思结果：是否足够回答 + 缺口列表
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reflection {
    #[serde(default)]
    pub evaluation: Evaluation,
    #[serde(default)]
    pub gaps: Vec<String>,
    #[serde(default)]
    pub reasoning: String,
}

impl Reflection {
    pub fn is_sufficient(&self) -> bool {
        self.evaluation == Evaluation::Sufficient
    }
}

/// 单次查询会话
#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub query: String,
    pub tenant_id: String,
    /// 调用方会话 ID（可选，透传到报告）
    pub session_id: Option<String>,
    pub classification: Option<Classification>,
    pub shape: Option<PipelineShape>,
    pub strategy: Option<Strategy>,
    pub budget_tier: Option<BudgetTier>,
    pub cost_meter: Option<Arc<CostMeter>>,
    /// 最近一轮的全部工具结果（每轮替换，不合并）
    pub tool_results: Vec<ToolResult>,
    pub context_items: Vec<ContextItem>,
    /// 渲染后的上下文文本，供合成阶段使用
    pub context: String,
    pub metrics: QualityMetrics,
    pub quality_passed: bool,
    pub reflection: Option<Reflection>,
    /// 已完成的执行轮数
    pub iteration: usize,
    pub final_response: Option<String>,
    pub created_at: i64,
    pub latency_ms: Option<u64>,
    started: Instant,
}

impl Session {
    pub fn new(query: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            query: query.into(),
            tenant_id: tenant_id.into(),
            session_id: None,
            classification: None,
            shape: None,
            strategy: None,
            budget_tier: None,
            cost_meter: None,
            tool_results: Vec::new(),
            context_items: Vec::new(),
            context: String::new(),
            metrics: QualityMetrics::default(),
            quality_passed: false,
            reflection: None,
            iteration: 0,
            final_response: None,
            created_at: chrono::Utc::now().timestamp_millis(),
            latency_ms: None,
            started: Instant::now(),
        }
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn complexity(&self) -> Option<Complexity> {
        self.classification.as_ref().and_then(Classification::complexity)
    }

    /// 没有 CostMeter 时按分类对应的预算档位创建；已有则原样返回
    pub fn ensure_cost_meter(&mut self, tiers: &BudgetTiers) -> (Arc<CostMeter>, BudgetTier) {
        let complexity = self.complexity();
        let tier = *self
            .budget_tier
            .get_or_insert_with(|| tiers.for_complexity(complexity));
        let meter = self
            .cost_meter
            .get_or_insert_with(|| Arc::new(CostMeter::new(tier.total_usd)))
            .clone();
        (meter, tier)
    }

    pub fn spent(&self) -> f64 {
        self.cost_meter.as_ref().map(|m| m.spent()).unwrap_or(0.0)
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    pub(crate) fn finish(&mut self) {
        self.latency_ms = Some(self.elapsed_ms());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complexity_from_label() {
        assert_eq!(Complexity::from_label(" Complex "), Some(Complexity::Complex));
        assert_eq!(Complexity::from_label("SIMPLE"), Some(Complexity::Simple));
        assert_eq!(Complexity::from_label("extreme"), None);
    }

    #[test]
    fn test_strategy_tolerates_unknown_mode() {
        let s: Strategy =
            serde_json::from_str(r#"{"tools": ["a"], "execution_mode": "fanout"}"#).unwrap();
        assert_eq!(s.execution_mode, ExecutionMode::Sequential);
        let s: Strategy =
            serde_json::from_str(r#"{"tools": ["a", "b"], "execution_mode": "Parallel"}"#)
                .unwrap();
        assert_eq!(s.execution_mode, ExecutionMode::Parallel);
        assert_eq!(s.tools.len(), 2);
    }

    #[test]
    fn test_reflection_parsing() {
        let r: Reflection =
            serde_json::from_str(r#"{"evaluation": "sufficient", "gaps": []}"#).unwrap();
        assert!(r.is_sufficient());
        let r: Reflection =
            serde_json::from_str(r#"{"evaluation": "unsure", "gaps": ["pricing"]}"#).unwrap();
        assert!(!r.is_sufficient());
        assert_eq!(r.gaps, vec!["pricing".to_string()]);
    }

    #[test]
    fn test_ensure_cost_meter_uses_classification_tier() {
        let tiers = BudgetTiers::default();
        let mut session = Session::new("q", "tenant-a");
        session.classification = Some(Classification {
            complexity: "complex".into(),
            ..Classification::default()
        });
        let (meter, tier) = session.ensure_cost_meter(&tiers);
        assert_eq!(tier, tiers.complex);
        meter.charge("x", 0.001);

        // 再次调用复用同一个 meter
        let (again, _) = session.ensure_cost_meter(&tiers);
        assert!((again.spent() - 0.001).abs() < 1e-12);
    }

    #[test]
    fn test_ensure_cost_meter_defaults_to_medium() {
        let tiers = BudgetTiers::default();
        let mut session = Session::new("q", "tenant-a");
        let (_, tier) = session.ensure_cost_meter(&tiers);
        assert_eq!(tier, tiers.medium);
    }
}
