//! 规划阶段：根据分类、可用工具与预算给出执行策略
//!
//! 模板占位符：{tools}（工具名与描述列表）、{max_tools}（本档位的工具调用上限）。
//! 查询、分类与反思缺口放在 user 消息里。

use std::sync::Arc;

use crate::agents::extract_json;
use crate::core::{AgentError, Classification, Strategy};
use crate::llm::{LlmClient, Message};

pub const DEFAULT_PLANNER_PROMPT: &str = r#"Create an execution strategy for the user's query.

Max tools allowed: {max_tools}

Available tools:
{tools}

Strategy types:
- direct: Single tool, simple lookup
- multi-source: 2-3 tools for comprehensive answer
- iterative: Sequential with refinement

Execution modes:
- sequential: Tools run in order
- parallel: Independent tools run simultaneously

If gaps from a previous attempt are listed, choose tools that address them.

Respond ONLY with JSON:
{
    "strategy_type": "direct|multi-source|iterative",
    "tools": ["tool1", "tool2"],
    "execution_mode": "sequential|parallel",
    "reasoning": "brief explanation"
}"#;

const STAGE: &str = "planner";

/// 规划所需的状态切片
#[derive(Debug, Clone, Copy)]
pub struct PlanRequest<'a> {
    pub query: &'a str,
    pub classification: Option<&'a Classification>,
    pub max_tools: u32,
    /// 上一轮反思给出的缺口；首轮为空
    pub gaps: &'a [String],
}

pub struct Planner {
    llm: Arc<dyn LlmClient>,
    template: String,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, template: impl Into<String>) -> Self {
        Self {
            llm,
            template: template.into(),
        }
    }

    fn render_system(&self, tools: &[(String, String)], max_tools: u32) -> String {
        let tool_lines = tools
            .iter()
            .map(|(name, desc)| format!("- {name}: {desc}"))
            .collect::<Vec<_>>()
            .join("\n");
        self.template
            .replace("{tools}", &tool_lines)
            .replace("{max_tools}", &max_tools.to_string())
    }

    fn render_user(request: &PlanRequest<'_>) -> String {
        let classification = request
            .classification
            .and_then(|c| serde_json::to_string(c).ok())
            .unwrap_or_else(|| "{}".to_string());
        let mut out = format!(
            "Query: {}\nClassification: {}",
            request.query, classification
        );
        if !request.gaps.is_empty() {
            out.push_str("\nGaps from previous attempt:\n");
            for gap in request.gaps {
                out.push_str(&format!("- {gap}\n"));
            }
        }
        out
    }

    pub async fn plan(
        &self,
        request: &PlanRequest<'_>,
        tools: &[(String, String)],
    ) -> Result<Strategy, AgentError> {
        let messages = vec![
            Message::system(self.render_system(tools, request.max_tools)),
            Message::user(Self::render_user(request)),
        ];
        let output = self
            .llm
            .complete(&messages)
            .await
            .map_err(|e| AgentError::llm(STAGE, e))?;
        let strategy: Strategy = extract_json(STAGE, &output)?;
        tracing::info!(
            tools = ?strategy.tools,
            mode = ?strategy.execution_mode,
            strategy_type = %strategy.strategy_type,
            "Strategy planned"
        );
        Ok(strategy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ExecutionMode;
    use crate::llm::{MockLlmClient, MockStage};

    fn tools() -> Vec<(String, String)> {
        vec![
            ("document_search".into(), "search docs".into()),
            ("web_search".into(), "search web".into()),
        ]
    }

    #[test]
    fn test_render_fills_placeholders() {
        let planner = Planner::new(Arc::new(MockLlmClient::new()), DEFAULT_PLANNER_PROMPT);
        let system = planner.render_system(&tools(), 3);
        assert!(system.contains("- document_search: search docs"));
        assert!(system.contains("Max tools allowed: 3"));
        assert!(!system.contains("{tools}"));
    }

    #[test]
    fn test_gaps_are_listed_for_replanning() {
        let gaps = vec!["pricing for 2024".to_string()];
        let user = Planner::render_user(&PlanRequest {
            query: "q",
            classification: None,
            max_tools: 2,
            gaps: &gaps,
        });
        assert!(user.contains("- pricing for 2024"));
    }

    #[tokio::test]
    async fn test_plan_parses_strategy() {
        let llm = Arc::new(
            MockLlmClient::new()
                .with_tools(["web_search", "document_search"])
                .with_execution_mode("parallel"),
        );
        let planner = Planner::new(llm.clone(), DEFAULT_PLANNER_PROMPT);
        let strategy = planner
            .plan(
                &PlanRequest {
                    query: "q",
                    classification: None,
                    max_tools: 3,
                    gaps: &[],
                },
                &tools(),
            )
            .await
            .unwrap();
        assert_eq!(strategy.tools, vec!["web_search", "document_search"]);
        assert_eq!(strategy.execution_mode, ExecutionMode::Parallel);
        assert_eq!(llm.calls(MockStage::Plan), 1);
    }

    #[tokio::test]
    async fn test_unparseable_plan_is_json_error() {
        let llm = Arc::new(MockLlmClient::new().with_garbage(MockStage::Plan));
        let planner = Planner::new(llm, DEFAULT_PLANNER_PROMPT);
        let err = planner
            .plan(
                &PlanRequest {
                    query: "q",
                    classification: None,
                    max_tools: 3,
                    gaps: &[],
                },
                &tools(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::JsonParse { stage: "planner", .. }));
    }
}
