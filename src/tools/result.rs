//! 工具结果与上下文条目
//!
//! 所有检索工具产出统一的 ToolResult：状态、负载、条目数、费用、置信度、上下文条目。
//! 条目数由工具自己声明（构造时从负载推导），编排层不再按工具名猜测。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 单次工具调用的结果状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Success,
    Error,
    Timeout,
    CircuitOpen,
    NoResults,
}

impl ToolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolStatus::Success => "success",
            ToolStatus::Error => "error",
            ToolStatus::Timeout => "timeout",
            ToolStatus::CircuitOpen => "circuit_open",
            ToolStatus::NoResults => "no_results",
        }
    }
}

/// 归一化的上下文条目：各类工具合并上下文时的公共单位
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextItem {
    #[serde(rename = "type")]
    pub kind: String,
    /// 来源工具名；为空时由编排层补上
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub score: Option<f64>,
}

impl ContextItem {
    pub fn new(kind: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            source: None,
            id: None,
            content: content.into(),
            metadata: Map::new(),
            score: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub score: f64,
    /// 设置时只对该租户可见
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub id: String,
    pub label: String,
    pub out_v: String,
    pub in_v: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebHit {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub snippet: String,
}

/// 工具专属负载
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolPayload {
    #[default]
    Empty,
    Documents { docs: Vec<Document> },
    Rows {
        columns: Vec<String>,
        rows: Vec<Map<String, Value>>,
    },
    Graph {
        nodes: Vec<GraphNode>,
        edges: Vec<GraphEdge>,
    },
    Web { results: Vec<WebHit> },
}

impl ToolPayload {
    /// 文档数 / 行数 / 节点+边数 / 网页结果数
    pub fn item_count(&self) -> usize {
        match self {
            ToolPayload::Empty => 0,
            ToolPayload::Documents { docs } => docs.len(),
            ToolPayload::Rows { rows, .. } => rows.len(),
            ToolPayload::Graph { nodes, edges } => nodes.len() + edges.len(),
            ToolPayload::Web { results } => results.len(),
        }
    }
}

/// 单次工具调用的输出
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub status: ToolStatus,
    /// 为空时由编排层补上实际调用的工具名
    #[serde(default)]
    pub tool_name: String,
    #[serde(default)]
    pub payload: ToolPayload,
    #[serde(default)]
    pub item_count: usize,
    /// 本次调用的费用（USD）
    #[serde(default)]
    pub cost: f64,
    /// [0, 1]；工具不给出时为 None，不参与平均
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub context_items: Vec<ContextItem>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub latency_ms: Option<u64>,
}

impl ToolResult {
    /// 成功结果；条目数由负载推导
    pub fn success(tool_name: impl Into<String>, payload: ToolPayload) -> Self {
        let item_count = payload.item_count();
        Self {
            status: ToolStatus::Success,
            tool_name: tool_name.into(),
            payload,
            item_count,
            cost: 0.0,
            confidence: None,
            context_items: Vec::new(),
            error: None,
            latency_ms: None,
        }
    }

    pub fn failure(
        tool_name: impl Into<String>,
        status: ToolStatus,
        error: impl Into<String>,
    ) -> Self {
        Self {
            status,
            tool_name: tool_name.into(),
            payload: ToolPayload::Empty,
            item_count: 0,
            cost: 0.0,
            confidence: None,
            context_items: Vec::new(),
            error: Some(error.into()),
            latency_ms: None,
        }
    }

    pub fn no_results(tool_name: impl Into<String>) -> Self {
        Self {
            error: None,
            ..Self::failure(tool_name, ToolStatus::NoResults, "")
        }
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    /// 置信度会被截到 [0, 1]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence.clamp(0.0, 1.0));
        self
    }

    pub fn with_context_items(mut self, items: Vec<ContextItem>) -> Self {
        self.context_items = items;
        self
    }

    /// 覆盖负载推导出的条目数（负载为空但工具另有计数时使用）
    pub fn with_item_count(mut self, item_count: usize) -> Self {
        self.item_count = item_count;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> GraphNode {
        GraphNode {
            id: id.to_string(),
            label: "entity".to_string(),
            properties: Map::new(),
        }
    }

    #[test]
    fn test_graph_item_count_is_nodes_plus_edges() {
        let payload = ToolPayload::Graph {
            nodes: vec![node("a"), node("b")],
            edges: vec![GraphEdge {
                id: "e1".into(),
                label: "owns".into(),
                out_v: "a".into(),
                in_v: "b".into(),
                properties: Map::new(),
            }],
        };
        let result = ToolResult::success("graph_lookup", payload);
        assert_eq!(result.item_count, 3);
    }

    #[test]
    fn test_rows_item_count() {
        let mut row = Map::new();
        row.insert("region".into(), Value::from("emea"));
        let payload = ToolPayload::Rows {
            columns: vec!["region".into()],
            rows: vec![row.clone(), row],
        };
        assert_eq!(ToolResult::success("sql", payload).item_count, 2);
    }

    #[test]
    fn test_confidence_is_clamped() {
        let r = ToolResult::success("t", ToolPayload::Empty).with_confidence(1.7);
        assert_eq!(r.confidence, Some(1.0));
    }

    #[test]
    fn test_no_results_has_no_error() {
        let r = ToolResult::no_results("web_search");
        assert_eq!(r.status, ToolStatus::NoResults);
        assert!(r.error.is_none());
        assert!(!r.is_success());
    }

    #[test]
    fn test_context_item_serializes_type_field() {
        let item = ContextItem::new("text", "hello").with_id("doc-1");
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["id"], "doc-1");
    }
}
