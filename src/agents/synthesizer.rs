//! 合成阶段：基于渲染好的上下文生成最终回复

use std::sync::Arc;

use crate::core::AgentError;
use crate::llm::{LlmClient, Message};

pub const DEFAULT_SYNTHESIZER_PROMPT: &str = r#"Synthesize a response using the retrieved context.

Guidelines:
- Answer directly and concisely
- Use ONLY information from context
- Include citations using the bracketed item numbers, e.g. [1], [2]
- If context is insufficient, state clearly
- Professional, helpful tone

Format:
1. Direct answer
2. Supporting details
3. Citations"#;

const STAGE: &str = "synthesizer";

pub struct Synthesizer {
    llm: Arc<dyn LlmClient>,
    instructions: String,
}

impl Synthesizer {
    pub fn new(llm: Arc<dyn LlmClient>, instructions: impl Into<String>) -> Self {
        Self {
            llm,
            instructions: instructions.into(),
        }
    }

    pub async fn synthesize(&self, query: &str, context: &str) -> Result<String, AgentError> {
        let context = if context.trim().is_empty() {
            "(no context retrieved)"
        } else {
            context
        };
        let messages = vec![
            Message::system(self.instructions.clone()),
            Message::user(format!("Query: {query}\n\nContext:\n{context}")),
        ];
        let text = self
            .llm
            .complete(&messages)
            .await
            .map_err(|e| AgentError::llm(STAGE, e))?;
        Ok(text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    #[tokio::test]
    async fn test_empty_context_is_marked() {
        let synth = Synthesizer::new(Arc::new(MockLlmClient::new()), DEFAULT_SYNTHESIZER_PROMPT);
        let text = synth.synthesize("what?", "").await.unwrap();
        assert!(text.contains("(no context retrieved)"));
    }
}
