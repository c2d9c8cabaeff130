//! 主控流水线：分类 → 选形态 → 规划 → 执行（可能迭代）→ 合成
//!
//! 一次查询只在一个 Session 上顺序推进各阶段；只有工具执行会并发。
//! 编排自身不产生致命错误，只有模型调用失败或输出无法解析会原样返回给调用方。

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;

use crate::agents::{
    Classifier, PlanRequest, Planner, Reflector, Synthesizer, DEFAULT_CLASSIFIER_PROMPT,
    DEFAULT_PLANNER_PROMPT, DEFAULT_REFLECTION_PROMPT, DEFAULT_SYNTHESIZER_PROMPT,
};
use crate::config::AppConfig;
use crate::core::{AgentError, BudgetTier, BudgetTiers, CostMeter, Reflection, Session};
use crate::llm::{LlmClient, MockLlmClient, OpenAiClient};
use crate::quality::{QualityGate, QualityThresholds};
use crate::tools::{ContextBundle, ToolExecutor, ToolRequest};
use crate::workflow::{PipelineEvent, PipelineShape, RefinementLoop, RefinementStages};

/// 四个阶段的提示词
#[derive(Debug, Clone)]
pub struct PromptSet {
    pub classifier: String,
    pub planner: String,
    pub reflection: String,
    pub synthesizer: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            classifier: DEFAULT_CLASSIFIER_PROMPT.to_string(),
            planner: DEFAULT_PLANNER_PROMPT.to_string(),
            reflection: DEFAULT_REFLECTION_PROMPT.to_string(),
            synthesizer: DEFAULT_SYNTHESIZER_PROMPT.to_string(),
        }
    }
}

pub struct Orchestrator {
    classifier: Classifier,
    planner: Planner,
    reflector: Reflector,
    synthesizer: Synthesizer,
    executor: ToolExecutor,
    gate: QualityGate,
    tiers: BudgetTiers,
    refinement: RefinementLoop,
    /// 每次模型调用记到 llm 分类下的费用
    llm_call_cost: f64,
}

impl Orchestrator {
    pub fn new(llm: Arc<dyn LlmClient>, executor: ToolExecutor, prompts: PromptSet) -> Self {
        Self {
            classifier: Classifier::new(llm.clone(), prompts.classifier),
            planner: Planner::new(llm.clone(), prompts.planner),
            reflector: Reflector::new(llm.clone(), prompts.reflection),
            synthesizer: Synthesizer::new(llm, prompts.synthesizer),
            executor,
            gate: QualityGate::default(),
            tiers: BudgetTiers::default(),
            refinement: RefinementLoop::default(),
            llm_call_cost: 0.0,
        }
    }

    pub fn with_budget_tiers(mut self, tiers: BudgetTiers) -> Self {
        self.tiers = tiers;
        self
    }

    pub fn with_quality_thresholds(mut self, thresholds: QualityThresholds) -> Self {
        self.gate = QualityGate::new(thresholds);
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.refinement = RefinementLoop::new(max_iterations);
        self
    }

    pub fn with_llm_call_cost(mut self, cost: f64) -> Self {
        self.llm_call_cost = cost.max(0.0);
        self
    }

    pub fn executor(&self) -> &ToolExecutor {
        &self.executor
    }

    fn record_llm_call(&self, meter: &CostMeter) {
        meter.record_llm_call();
        if self.llm_call_cost > 0.0 {
            meter.charge("llm", self.llm_call_cost);
        }
    }

    pub async fn run_pipeline(&self, session: Session) -> Result<Session, AgentError> {
        self.run_pipeline_with_events(session, None).await
    }

    /// 同 run_pipeline，另把过程事件发到 events（接收端关闭时忽略）
    pub async fn run_pipeline_with_events(
        &self,
        mut session: Session,
        events: Option<&UnboundedSender<PipelineEvent>>,
    ) -> Result<Session, AgentError> {
        tracing::info!(session = %session.id, tenant = %session.tenant_id, "Pipeline started");

        let classification = self.classifier.classify(&session.query).await?;
        session.classification = Some(classification.clone());
        let (meter, tier) = session.ensure_cost_meter(&self.tiers);
        self.record_llm_call(&meter);
        emit(events, PipelineEvent::Classified { classification });

        let shape = PipelineShape::select(session.complexity());
        session.shape = Some(shape);
        tracing::info!(
            session = %session.id,
            shape = shape.as_str(),
            max_tool_calls = tier.max_tool_calls,
            budget_usd = tier.total_usd,
            "Pipeline shape selected"
        );
        emit(events, PipelineEvent::ShapeSelected { shape });

        {
            let mut run = PipelineRun {
                orchestrator: self,
                session: &mut session,
                meter: meter.clone(),
                tier,
                shape,
                events,
            };
            run.plan(&[]).await?;
            if shape.is_iterative() {
                let outcome = self.refinement.run(&mut run).await?;
                tracing::info!(rounds = outcome.rounds, exit = ?outcome.exit, "Refinement finished");
            } else {
                run.execute(1).await?;
            }
        }

        let text = self
            .synthesizer
            .synthesize(&session.query, &session.context)
            .await?;
        self.record_llm_call(&meter);
        emit(events, PipelineEvent::Synthesized { text: text.clone() });
        session.final_response = Some(text);
        session.finish();

        tracing::info!(
            session = %session.id,
            quality_passed = session.quality_passed,
            iterations = session.iteration,
            cost = meter.spent(),
            latency_ms = session.latency_ms.unwrap_or_default(),
            "Pipeline finished"
        );
        Ok(session)
    }
}

fn emit(events: Option<&UnboundedSender<PipelineEvent>>, event: PipelineEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event);
    }
}

/// 单次查询的可变运行状态；实现精炼循环需要的阶段
struct PipelineRun<'a> {
    orchestrator: &'a Orchestrator,
    session: &'a mut Session,
    meter: Arc<CostMeter>,
    tier: BudgetTier,
    shape: PipelineShape,
    events: Option<&'a UnboundedSender<PipelineEvent>>,
}

impl PipelineRun<'_> {
    async fn plan(&mut self, gaps: &[String]) -> Result<(), AgentError> {
        let tools = self.orchestrator.executor.registry().tool_descriptions();
        let request = PlanRequest {
            query: &self.session.query,
            classification: self.session.classification.as_ref(),
            max_tools: self.tier.max_tool_calls,
            gaps,
        };
        let mut strategy = self.orchestrator.planner.plan(&request, &tools).await?;
        self.orchestrator.record_llm_call(&self.meter);

        if let Some(mode) = self.shape.forced_mode() {
            strategy.execution_mode = mode;
        }
        emit(
            self.events,
            PipelineEvent::StrategyPlanned {
                strategy: strategy.clone(),
            },
        );
        self.session.strategy = Some(strategy);
        Ok(())
    }
}

#[async_trait]
impl<'a> RefinementStages for PipelineRun<'a> {
    async fn execute(&mut self, round: usize) -> Result<bool, AgentError> {
        if self.shape.is_iterative() {
            emit(
                self.events,
                PipelineEvent::Iteration {
                    round,
                    max_rounds: self.orchestrator.refinement.max_iterations(),
                },
            );
        }

        let strategy = self.session.strategy.clone().unwrap_or_default();
        let request = ToolRequest::new(self.session.query.clone(), self.session.tenant_id.clone());
        let results = self
            .orchestrator
            .executor
            .execute_round(&strategy, &request, &self.meter, &self.tier)
            .await;

        for r in &results {
            emit(
                self.events,
                PipelineEvent::ToolFinished {
                    tool: r.tool_name.clone(),
                    status: r.status,
                    item_count: r.item_count,
                    latency_ms: r.latency_ms,
                },
            );
        }

        let bundle = ContextBundle::collect(&results);
        let verdict = self.orchestrator.gate.evaluate(&results);

        // 每轮整体替换，不与上一轮合并
        self.session.tool_results = results;
        self.session.context_items = bundle.items;
        self.session.context = bundle.rendered;
        self.session.metrics = verdict.metrics.clone();
        self.session.quality_passed = verdict.passed;
        self.session.iteration = round;

        emit(
            self.events,
            PipelineEvent::QualityEvaluated {
                passed: verdict.passed,
                metrics: verdict.metrics,
            },
        );
        Ok(verdict.passed)
    }

    async fn reflect(&mut self) -> Result<Reflection, AgentError> {
        let reflection = self
            .orchestrator
            .reflector
            .evaluate(&self.session.query, &self.session.metrics)
            .await?;
        self.orchestrator.record_llm_call(&self.meter);
        emit(
            self.events,
            PipelineEvent::Reflected {
                sufficient: reflection.is_sufficient(),
                gaps: reflection.gaps.clone(),
            },
        );
        self.session.reflection = Some(reflection.clone());
        Ok(reflection)
    }

    async fn replan(&mut self, gaps: &[String]) -> Result<(), AgentError> {
        self.plan(gaps).await
    }
}

/// 根据配置与环境变量选择 LLM 后端（OpenAI 兼容 / Mock）
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let api_key = std::env::var("OPENAI_API_KEY").ok();

    match (provider.as_str(), api_key) {
        ("mock", _) => {
            tracing::info!("Using Mock LLM (configured)");
            Arc::new(MockLlmClient::new())
        }
        (_, Some(key)) => {
            tracing::info!("Using OpenAI-compatible LLM ({})", cfg.llm.model);
            Arc::new(
                OpenAiClient::new(cfg.llm.base_url.as_deref(), &cfg.llm.model, Some(&key))
                    .with_request_timeout(std::time::Duration::from_secs(
                        cfg.llm.request_timeout_secs,
                    )),
            )
        }
        (_, None) => {
            tracing::warn!("No API key set, using Mock LLM");
            Arc::new(MockLlmClient::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CircuitBreakerRegistry, ExecutionMode};
    use crate::llm::MockStage;
    use crate::tools::{ContextItem, Tool, ToolPayload, ToolRegistry, ToolResult};
    use std::time::Duration;

    struct Docs;

    #[async_trait]
    impl Tool for Docs {
        fn name(&self) -> &str {
            "document_search"
        }

        fn description(&self) -> &str {
            "docs"
        }

        async fn run(&self, request: &ToolRequest) -> Result<ToolResult, String> {
            Ok(ToolResult::success("document_search", ToolPayload::Empty)
                .with_item_count(2)
                .with_confidence(0.9)
                .with_cost(0.0001)
                .with_context_items(vec![
                    ContextItem::new("text", format!("about {}", request.query)).with_id("d1")
                ]))
        }
    }

    fn orchestrator(llm: Arc<MockLlmClient>) -> Orchestrator {
        let mut registry = ToolRegistry::new();
        registry.register(Docs);
        let executor = ToolExecutor::new(
            registry,
            Arc::new(CircuitBreakerRegistry::default()),
            Duration::from_secs(5),
        );
        Orchestrator::new(llm, executor, PromptSet::default())
    }

    #[tokio::test]
    async fn test_medium_query_forces_parallel_and_emits_events() {
        let llm = Arc::new(MockLlmClient::new().with_complexity("medium"));
        let orch = orchestrator(llm.clone());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let session = orch
            .run_pipeline_with_events(Session::new("forage", "tenant-a"), Some(&tx))
            .await
            .unwrap();
        drop(tx);

        assert_eq!(session.shape, Some(PipelineShape::ParallelFanOut));
        assert_eq!(
            session.strategy.as_ref().unwrap().execution_mode,
            ExecutionMode::Parallel
        );
        assert!(session.quality_passed);
        assert_eq!(session.iteration, 1);
        assert!(session.context.starts_with("[1] (document_search) d1: about forage"));
        assert!(session.final_response.is_some());
        // 非迭代形态不调用反思
        assert_eq!(llm.calls(MockStage::Reflect), 0);
        assert_eq!(session.cost_meter.as_ref().unwrap().llm_calls(), 3);

        let mut kinds = Vec::new();
        while let Some(event) = rx.recv().await {
            kinds.push(serde_json::to_value(&event).unwrap()["type"].clone());
        }
        assert_eq!(kinds.first().unwrap(), "classified");
        assert_eq!(kinds.last().unwrap(), "synthesized");
        assert!(kinds.iter().any(|k| k == "tool_finished"));
    }

    #[tokio::test]
    async fn test_llm_call_cost_is_charged() {
        let llm = Arc::new(MockLlmClient::new().with_complexity("simple"));
        let orch = orchestrator(llm).with_llm_call_cost(0.0002);
        let session = orch.run_pipeline(Session::new("q", "t")).await.unwrap();
        let ledger = session.cost_meter.as_ref().unwrap().snapshot();
        assert!((ledger.breakdown["llm"] - 0.0006).abs() < 1e-12);
        assert!((ledger.breakdown["document_search"] - 0.0001).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_synthesis_failure_propagates() {
        let llm = Arc::new(MockLlmClient::new().with_failure(MockStage::Synthesize));
        let err = orchestrator(llm)
            .run_pipeline(Session::new("q", "t"))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Llm { stage: "synthesizer", .. }));
    }
}
