//! 查询报告：把跑完的会话投影成可序列化的结果

use serde::Serialize;

use crate::core::{Classification, CostLedger, Reflection, Session, Strategy};
use crate::quality::QualityMetrics;
use crate::tools::ToolStatus;
use crate::workflow::PipelineShape;

/// 单个成功工具的来源摘要
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceSummary {
    pub tool: String,
    pub status: ToolStatus,
    pub count: usize,
    pub latency_ms: Option<u64>,
    pub confidence: Option<f64>,
    pub context_items: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryReport {
    pub id: String,
    pub session_id: Option<String>,
    pub tenant_id: String,
    pub query: String,
    pub answer: Option<String>,
    /// 只列出最后一轮成功的工具
    pub sources: Vec<SourceSummary>,
    pub cost: f64,
    pub ledger: Option<CostLedger>,
    pub latency_ms: Option<u64>,
    pub classification: Option<Classification>,
    pub shape: Option<PipelineShape>,
    pub strategy: Option<Strategy>,
    pub quality_passed: bool,
    pub metrics: QualityMetrics,
    pub iterations: usize,
    pub reflection: Option<Reflection>,
    pub created_at: i64,
}

impl Session {
    pub fn report(&self) -> QueryReport {
        let sources = self
            .tool_results
            .iter()
            .filter(|r| r.is_success())
            .map(|r| SourceSummary {
                tool: r.tool_name.clone(),
                status: r.status,
                count: r.item_count,
                latency_ms: r.latency_ms,
                confidence: r.confidence,
                context_items: r.context_items.len(),
            })
            .collect();

        QueryReport {
            id: self.id.clone(),
            session_id: self.session_id.clone(),
            tenant_id: self.tenant_id.clone(),
            query: self.query.clone(),
            answer: self.final_response.clone(),
            sources,
            cost: self.spent(),
            ledger: self.cost_meter.as_ref().map(|m| m.snapshot()),
            latency_ms: self.latency_ms,
            classification: self.classification.clone(),
            shape: self.shape,
            strategy: self.strategy.clone(),
            quality_passed: self.quality_passed,
            metrics: self.metrics.clone(),
            iterations: self.iteration,
            reflection: self.reflection.clone(),
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::BudgetTiers;
    use crate::tools::{ToolPayload, ToolResult};

    #[test]
    fn test_report_lists_only_successful_sources() {
        let mut session = Session::new("q", "tenant-a").with_session_id("caller-1");
        let (meter, _) = session.ensure_cost_meter(&BudgetTiers::default());
        meter.charge_tool("document_search", 0.0001);
        session.tool_results = vec![
            ToolResult::success("document_search", ToolPayload::Empty).with_item_count(2),
            ToolResult::failure("web_search", ToolStatus::Timeout, "deadline"),
        ];
        session.final_response = Some("answer".into());

        let report = session.report();
        assert_eq!(report.sources.len(), 1);
        assert_eq!(report.sources[0].count, 2);
        assert_eq!(report.session_id.as_deref(), Some("caller-1"));
        assert!((report.cost - 0.0001).abs() < 1e-12);
        assert_eq!(report.ledger.unwrap().tool_calls, 1);

        let json = serde_json::to_value(session.report()).unwrap();
        assert_eq!(json["answer"], "answer");
        assert_eq!(json["sources"][0]["status"], "success");
    }

    #[test]
    fn test_report_fields_are_pipeline_outputs() {
        let json = serde_json::to_value(Session::new("q", "tenant-a").report()).unwrap();
        let mut keys: Vec<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec![
                "answer",
                "classification",
                "cost",
                "created_at",
                "id",
                "iterations",
                "latency_ms",
                "ledger",
                "metrics",
                "quality_passed",
                "query",
                "reflection",
                "session_id",
                "shape",
                "sources",
                "strategy",
                "tenant_id",
            ]
        );
        assert_eq!(json["cost"], 0.0);
        assert!(json["ledger"].is_null());
    }
}
