//! 工具熔断器注册表
//!
//! 每个工具一份熔断状态，进程内所有会话共享：
//! - closed：正常放行
//! - open：失败率（EMA）超过阈值后阻断
//! - half_open：open 超过 timeout 后放行下一次尝试，成功即 closed
//!
//! 状态只由 record_success / record_failure 与 open 之后流逝的时间驱动。
//! 锁粒度为单个工具：外层 map 只在查找/插入条目时加锁，不同工具的状态互不阻塞。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::config::CircuitBreakerSection;
use crate::core::AgentError;

/// 熔断状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    #[default]
    Closed,
    Open,
    HalfOpen,
}

/// 单个工具的熔断记录
#[derive(Debug, Clone, Default)]
pub struct BreakerState {
    /// 指数滑动平均失败率，范围 [0, 1]
    pub failure_rate: f64,
    pub state: CircuitState,
    pub opened_at: Option<Instant>,
    pub consecutive_failures: u32,
}

/// 熔断器注册表：显式构造后以 Arc 注入 ToolExecutor
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    threshold: f64,
    timeout: Duration,
    alpha: f64,
    breakers: RwLock<HashMap<String, Arc<Mutex<BreakerState>>>>,
}

impl CircuitBreakerRegistry {
    pub fn new(threshold: f64, timeout: Duration, alpha: f64) -> Self {
        Self {
            threshold,
            timeout,
            alpha,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &CircuitBreakerSection) -> Result<Self, AgentError> {
        Ok(Self::new(config.threshold, config.open_timeout()?, config.alpha))
    }

    fn lookup(&self, tool: &str) -> Option<Arc<Mutex<BreakerState>>> {
        self.breakers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(tool)
            .cloned()
    }

    fn entry(&self, tool: &str) -> Arc<Mutex<BreakerState>> {
        if let Some(existing) = self.lookup(tool) {
            return existing;
        }
        self.breakers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(tool.to_string())
            .or_default()
            .clone()
    }

    /// 派发前的读闸门；open 超时后在这里转为 half_open
    pub fn is_closed(&self, tool: &str) -> bool {
        let Some(cell) = self.lookup(tool) else {
            return true;
        };
        let mut breaker = cell.lock().unwrap_or_else(|e| e.into_inner());
        if breaker.state == CircuitState::Open {
            let elapsed = breaker
                .opened_at
                .map(|at| Instant::now().saturating_duration_since(at))
                .unwrap_or(Duration::MAX);
            if elapsed > self.timeout {
                breaker.state = CircuitState::HalfOpen;
                tracing::info!(tool = tool, "Circuit half-open (testing recovery)");
            }
        }
        matches!(breaker.state, CircuitState::Closed | CircuitState::HalfOpen)
    }

    pub fn record_success(&self, tool: &str) {
        let cell = self.entry(tool);
        let mut breaker = cell.lock().unwrap_or_else(|e| e.into_inner());
        breaker.consecutive_failures = 0;
        breaker.failure_rate *= 1.0 - self.alpha;
        if breaker.state == CircuitState::HalfOpen {
            breaker.state = CircuitState::Closed;
            tracing::info!(tool = tool, "Circuit closed (recovered)");
        }
    }

    pub fn record_failure(&self, tool: &str) {
        let cell = self.entry(tool);
        let mut breaker = cell.lock().unwrap_or_else(|e| e.into_inner());
        breaker.consecutive_failures += 1;
        breaker.failure_rate = (1.0 - self.alpha) * breaker.failure_rate + self.alpha;
        if breaker.failure_rate > self.threshold && breaker.state != CircuitState::Open {
            breaker.state = CircuitState::Open;
            breaker.opened_at = Some(Instant::now());
            tracing::warn!(
                tool = tool,
                failure_rate = breaker.failure_rate,
                consecutive_failures = breaker.consecutive_failures,
                "Circuit opened"
            );
        }
    }

    /// 只读快照；未见过的工具返回初始 closed 状态
    pub fn snapshot(&self, tool: &str) -> BreakerState {
        self.lookup(tool)
            .map(|cell| cell.lock().unwrap_or_else(|e| e.into_inner()).clone())
            .unwrap_or_default()
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(0.5, Duration::from_secs(30), 0.2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_failure_stays_closed() {
        let registry = CircuitBreakerRegistry::default();
        registry.record_failure("search");
        let snap = registry.snapshot("search");
        assert!((snap.failure_rate - 0.2).abs() < 1e-9);
        assert_eq!(snap.state, CircuitState::Closed);
        assert!(registry.is_closed("search"));
    }

    #[test]
    fn test_fourth_failure_opens() {
        let registry = CircuitBreakerRegistry::default();
        for _ in 0..3 {
            registry.record_failure("search");
        }
        let snap = registry.snapshot("search");
        assert!((snap.failure_rate - 0.488).abs() < 1e-9);
        assert_eq!(snap.state, CircuitState::Closed);
        assert_eq!(snap.consecutive_failures, 3);

        registry.record_failure("search");
        assert_eq!(registry.snapshot("search").state, CircuitState::Open);
        assert!(!registry.is_closed("search"));
    }

    #[test]
    fn test_success_decays_rate_and_resets_streak() {
        let registry = CircuitBreakerRegistry::default();
        registry.record_failure("sql");
        registry.record_failure("sql");
        registry.record_success("sql");
        let snap = registry.snapshot("sql");
        assert_eq!(snap.consecutive_failures, 0);
        assert!((snap.failure_rate - 0.36 * 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_tool_is_closed() {
        let registry = CircuitBreakerRegistry::default();
        assert!(registry.is_closed("never_seen"));
        assert_eq!(registry.snapshot("never_seen").state, CircuitState::Closed);
    }

    #[test]
    fn test_tools_are_isolated() {
        let registry = CircuitBreakerRegistry::default();
        for _ in 0..4 {
            registry.record_failure("web_search");
        }
        assert!(!registry.is_closed("web_search"));
        assert!(registry.is_closed("document_search"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_transitions_to_half_open_after_timeout() {
        let registry = CircuitBreakerRegistry::default();
        for _ in 0..4 {
            registry.record_failure("graph");
        }
        assert!(!registry.is_closed("graph"));

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(!registry.is_closed("graph"));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(registry.is_closed("graph"));
        assert_eq!(registry.snapshot("graph").state, CircuitState::HalfOpen);

        registry.record_success("graph");
        assert_eq!(registry.snapshot("graph").state, CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_while_half_open_reopens() {
        let registry = CircuitBreakerRegistry::default();
        for _ in 0..4 {
            registry.record_failure("graph");
        }
        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(registry.is_closed("graph"));

        registry.record_failure("graph");
        let snap = registry.snapshot("graph");
        assert_eq!(snap.state, CircuitState::Open);
        assert!(!registry.is_closed("graph"));
    }
}
