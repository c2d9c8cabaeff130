//! 工具执行器
//!
//! 持有 ToolRegistry、共享的熔断器注册表与超时配置。一轮执行按策略给出的工具列表顺序或并行派发：
//! 每次派发前检查预算（allow_tool）与熔断状态，派发时施加超时；超时、Err、任务 panic 都记为熔断失败，
//! 正常完成则记账并记为熔断成功。每次调用输出结构化审计日志（JSON）。本模块不向外抛错。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::time::{timeout, Instant};

use crate::core::{BudgetTier, CircuitBreakerRegistry, CostMeter, ExecutionMode, Strategy};
use crate::tools::{Tool, ToolRegistry, ToolRequest, ToolResult, ToolStatus};

/// 派发前的准入结论
enum Admission {
    Ready(Arc<dyn Tool>),
    Unknown,
    CircuitOpen,
}

pub struct ToolExecutor {
    registry: ToolRegistry,
    breakers: Arc<CircuitBreakerRegistry>,
    default_timeout: Duration,
    /// 按工具名覆盖的超时，优先于工具自己声明的超时
    timeouts: HashMap<String, Duration>,
}

impl ToolExecutor {
    pub fn new(
        registry: ToolRegistry,
        breakers: Arc<CircuitBreakerRegistry>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            breakers,
            default_timeout,
            timeouts: HashMap::new(),
        }
    }

    pub fn with_tool_timeout(mut self, tool: impl Into<String>, deadline: Duration) -> Self {
        self.timeouts.insert(tool.into(), deadline);
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    /// 配置覆盖 > 工具声明 > 默认值
    pub fn timeout_for(&self, name: &str, tool: &dyn Tool) -> Duration {
        self.timeouts
            .get(name)
            .copied()
            .or_else(|| tool.timeout())
            .unwrap_or(self.default_timeout)
    }

    fn admit(&self, name: &str) -> Admission {
        match self.registry.get(name) {
            None => Admission::Unknown,
            Some(_) if !self.breakers.is_closed(name) => Admission::CircuitOpen,
            Some(tool) => Admission::Ready(tool),
        }
    }

    /// 按策略执行一轮，返回本轮全部结果（含失败与跳过记录）
    pub async fn execute_round(
        &self,
        strategy: &Strategy,
        request: &ToolRequest,
        meter: &Arc<CostMeter>,
        tier: &BudgetTier,
    ) -> Vec<ToolResult> {
        match strategy.execution_mode {
            ExecutionMode::Sequential => self.run_sequential(strategy, request, meter, tier).await,
            ExecutionMode::Parallel => self.run_parallel(strategy, request, meter, tier).await,
        }
    }

    async fn run_sequential(
        &self,
        strategy: &Strategy,
        request: &ToolRequest,
        meter: &Arc<CostMeter>,
        tier: &BudgetTier,
    ) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(strategy.tools.len());
        for name in &strategy.tools {
            if !meter.allow_tool(tier.max_tool_calls) {
                tracing::info!(
                    tool = %name,
                    tool_calls = meter.tool_calls(),
                    spent = meter.spent(),
                    "Tool budget exhausted, stopping round"
                );
                break;
            }
            let result = match self.admit(name) {
                Admission::Ready(tool) => {
                    self.dispatch(name, tool, request.clone(), meter.clone()).await
                }
                Admission::Unknown => {
                    tracing::warn!(tool = %name, "Unknown tool in strategy");
                    ToolResult::failure(name.as_str(), ToolStatus::CircuitOpen, "unknown tool")
                }
                Admission::CircuitOpen => {
                    tracing::warn!(tool = %name, "Circuit open, skipping tool");
                    ToolResult::failure(name.as_str(), ToolStatus::CircuitOpen, "circuit open")
                }
            };
            results.push(result);
        }
        results
    }

    async fn run_parallel(
        &self,
        strategy: &Strategy,
        request: &ToolRequest,
        meter: &Arc<CostMeter>,
        tier: &BudgetTier,
    ) -> Vec<ToolResult> {
        // 预检时为已准入的工具预留调用名额，并发派发不会超过档位上限
        let mut admitted: Vec<(String, Arc<dyn Tool>)> = Vec::new();
        for name in &strategy.tools {
            let remaining = tier.max_tool_calls.saturating_sub(admitted.len() as u32);
            if !meter.allow_tool(remaining) {
                tracing::info!(
                    tool = %name,
                    admitted = admitted.len(),
                    "Tool budget exhausted, not admitting further tools"
                );
                break;
            }
            match self.admit(name) {
                Admission::Ready(tool) => admitted.push((name.clone(), tool)),
                Admission::Unknown => tracing::warn!(tool = %name, "Unknown tool excluded"),
                Admission::CircuitOpen => {
                    tracing::warn!(tool = %name, "Circuit open, tool excluded")
                }
            }
        }

        let tasks = admitted
            .into_iter()
            .map(|(name, tool)| async move {
                self.dispatch(&name, tool, request.clone(), meter.clone()).await
            });
        join_all(tasks).await
    }

    /// 单次派发：独立任务 + 超时；超时后放弃等待，任务可能仍在后台运行
    async fn dispatch(
        &self,
        name: &str,
        tool: Arc<dyn Tool>,
        request: ToolRequest,
        meter: Arc<CostMeter>,
    ) -> ToolResult {
        let deadline = self.timeout_for(name, tool.as_ref());
        let start = Instant::now();
        let handle = tokio::spawn(async move { tool.run(&request).await });
        let outcome = timeout(deadline, handle).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        let mut result = match outcome {
            Ok(Ok(Ok(mut result))) => {
                if result.tool_name.is_empty() {
                    result.tool_name = name.to_string();
                }
                meter.charge_tool(name, result.cost);
                self.breakers.record_success(name);
                result
            }
            Ok(Ok(Err(e))) => {
                self.breakers.record_failure(name);
                ToolResult::failure(name, ToolStatus::Error, e)
            }
            Ok(Err(join_err)) => {
                self.breakers.record_failure(name);
                ToolResult::failure(name, ToolStatus::Error, format!("tool task failed: {join_err}"))
            }
            Err(_) => {
                self.breakers.record_failure(name);
                ToolResult::failure(
                    name,
                    ToolStatus::Timeout,
                    format!("timed out after {}ms", deadline.as_millis()),
                )
            }
        };
        result.latency_ms = Some(latency_ms);

        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": name,
            "ok": result.status != ToolStatus::Error && result.status != ToolStatus::Timeout,
            "outcome": result.status.as_str(),
            "duration_ms": latency_ms,
            "cost": result.cost,
            "item_count": result.item_count,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        result
    }
}

impl std::fmt::Debug for ToolExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolExecutor")
            .field("registry", &self.registry)
            .field("default_timeout", &self.default_timeout)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}
