//! 分类阶段：给查询打上 intent / complexity / domain 标签

use std::sync::Arc;

use crate::agents::extract_json;
use crate::core::{AgentError, Classification};
use crate::llm::{LlmClient, Message};

pub const DEFAULT_CLASSIFIER_PROMPT: &str = r#"Classify the query:
- intent: "lookup" (fact retrieval), "analysis" (data analysis), "generation" (create content)
- complexity: "simple" (1 source, direct), "medium" (2-3 sources), "complex" (4+ sources, synthesis)
- domain: "finance", "ops", "hr", "general"

Respond ONLY with JSON:
{"intent": "...", "complexity": "...", "domain": "..."}"#;

const STAGE: &str = "classifier";

pub struct Classifier {
    llm: Arc<dyn LlmClient>,
    instructions: String,
}

impl Classifier {
    pub fn new(llm: Arc<dyn LlmClient>, instructions: impl Into<String>) -> Self {
        Self {
            llm,
            instructions: instructions.into(),
        }
    }

    pub async fn classify(&self, query: &str) -> Result<Classification, AgentError> {
        let messages = vec![
            Message::system(self.instructions.clone()),
            Message::user(format!("Query: {query}")),
        ];
        let output = self
            .llm
            .complete(&messages)
            .await
            .map_err(|e| AgentError::llm(STAGE, e))?;
        let classification: Classification = extract_json(STAGE, &output)?;
        if classification.complexity().is_none() {
            tracing::warn!(
                complexity = %classification.complexity,
                "Unknown complexity label, falling back to medium"
            );
        }
        Ok(classification)
    }
}
