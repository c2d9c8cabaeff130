//! Mock LLM 客户端（用于测试与本地运行，无需 API）
//!
//! 按系统提示里要求输出的 JSON 字段识别阶段（规划 / 反思 / 分类 / 合成），返回可配置的固定回复，
//! 并按阶段计数，便于断言调用次数。

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::llm::{LlmClient, Message, Role};

/// Mock 能识别的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockStage {
    Classify,
    Plan,
    Reflect,
    Synthesize,
}

impl MockStage {
    fn index(self) -> usize {
        match self {
            MockStage::Classify => 0,
            MockStage::Plan => 1,
            MockStage::Reflect => 2,
            MockStage::Synthesize => 3,
        }
    }

    /// 规划提示里可能出现 complexity，所以先认 execution_mode
    fn detect(messages: &[Message]) -> Self {
        let system: String = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        if system.contains("execution_mode") {
            MockStage::Plan
        } else if system.contains("\"evaluation\"") {
            MockStage::Reflect
        } else if system.contains("complexity") {
            MockStage::Classify
        } else {
            MockStage::Synthesize
        }
    }
}

#[derive(Debug)]
pub struct MockLlmClient {
    complexity: String,
    tools: Vec<String>,
    execution_mode: String,
    sufficient: bool,
    gaps: Vec<String>,
    answer: Option<String>,
    fail_stage: Option<MockStage>,
    garbage_stage: Option<MockStage>,
    calls: [AtomicUsize; 4],
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self {
            complexity: "medium".to_string(),
            tools: vec!["document_search".to_string()],
            execution_mode: "sequential".to_string(),
            sufficient: true,
            gaps: Vec::new(),
            answer: None,
            fail_stage: None,
            garbage_stage: None,
            calls: Default::default(),
        }
    }
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_complexity(mut self, complexity: impl Into<String>) -> Self {
        self.complexity = complexity.into();
        self
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_execution_mode(mut self, mode: impl Into<String>) -> Self {
        self.execution_mode = mode.into();
        self
    }

    /// 反思阶段固定返回的结论
    pub fn with_reflection(mut self, sufficient: bool, gaps: Vec<String>) -> Self {
        self.sufficient = sufficient;
        self.gaps = gaps;
        self
    }

    pub fn with_answer(mut self, answer: impl Into<String>) -> Self {
        self.answer = Some(answer.into());
        self
    }

    /// 指定阶段返回 Err
    pub fn with_failure(mut self, stage: MockStage) -> Self {
        self.fail_stage = Some(stage);
        self
    }

    /// 指定阶段返回无法解析的文本
    pub fn with_garbage(mut self, stage: MockStage) -> Self {
        self.garbage_stage = Some(stage);
        self
    }

    pub fn calls(&self, stage: MockStage) -> usize {
        self.calls[stage.index()].load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.iter().map(|c| c.load(Ordering::SeqCst)).sum()
    }

    fn reply(&self, stage: MockStage, messages: &[Message]) -> String {
        match stage {
            MockStage::Classify => serde_json::json!({
                "intent": "lookup",
                "complexity": self.complexity,
                "domain": "general",
            })
            .to_string(),
            MockStage::Plan => format!(
                "```json\n{}\n```",
                serde_json::json!({
                    "strategy_type": "mock",
                    "tools": self.tools,
                    "execution_mode": self.execution_mode,
                    "reasoning": "fixed mock plan",
                })
            ),
            MockStage::Reflect => serde_json::json!({
                "evaluation": if self.sufficient { "sufficient" } else { "insufficient" },
                "gaps": self.gaps,
                "reasoning": "fixed mock reflection",
            })
            .to_string(),
            MockStage::Synthesize => self.answer.clone().unwrap_or_else(|| {
                let last_user = messages
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::User)
                    .map(|m| m.content.as_str())
                    .unwrap_or("(no input)");
                format!("Mock answer based on: {last_user}")
            }),
        }
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        let stage = MockStage::detect(messages);
        self.calls[stage.index()].fetch_add(1, Ordering::SeqCst);

        if self.fail_stage == Some(stage) {
            return Err(format!("mock failure at {stage:?}"));
        }
        if self.garbage_stage == Some(stage) {
            return Ok("I cannot answer in JSON today.".to_string());
        }
        Ok(self.reply(stage, messages))
    }
}
