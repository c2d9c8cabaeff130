//! 反思阶段：判断本轮结果是否足够回答查询，并列出缺口

use std::sync::Arc;

use crate::agents::extract_json;
use crate::core::{AgentError, Reflection};
use crate::llm::{LlmClient, Message};
use crate::quality::QualityMetrics;

pub const DEFAULT_REFLECTION_PROMPT: &str = r#"Evaluate if the retrieved results are sufficient to answer the query.
You are given the query, the number of retrieved items, their average confidence and the source types.

Respond with JSON:
{
    "evaluation": "sufficient|insufficient",
    "gaps": ["gap1", "gap2"],
    "reasoning": "explanation"
}"#;

const STAGE: &str = "reflection";

pub struct Reflector {
    llm: Arc<dyn LlmClient>,
    instructions: String,
}

impl Reflector {
    pub fn new(llm: Arc<dyn LlmClient>, instructions: impl Into<String>) -> Self {
        Self {
            llm,
            instructions: instructions.into(),
        }
    }

    pub async fn evaluate(
        &self,
        query: &str,
        metrics: &QualityMetrics,
    ) -> Result<Reflection, AgentError> {
        let user = format!(
            "Query: {}\nNumber of sources: {}\nAverage confidence: {:.2}\nSource types: {}",
            query,
            metrics.total_items,
            metrics.average_confidence,
            if metrics.source_types.is_empty() {
                "none".to_string()
            } else {
                metrics.source_types.join(", ")
            }
        );
        let messages = vec![Message::system(self.instructions.clone()), Message::user(user)];
        let output = self
            .llm
            .complete(&messages)
            .await
            .map_err(|e| AgentError::llm(STAGE, e))?;
        let reflection: Reflection = extract_json(STAGE, &output)?;
        tracing::info!(
            sufficient = reflection.is_sufficient(),
            gaps = reflection.gaps.len(),
            "Reflection evaluated"
        );
        Ok(reflection)
    }
}
