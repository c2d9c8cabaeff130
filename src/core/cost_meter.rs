//! 费用计量：单次查询的预算账本
//!
//! charge 无条件记账（调用方负责事先检查 allow_*）；allow_tool / allow_llm 每次调用前实时判断，
//! 不缓存结果。并行工具任务共享同一个 CostMeter，账本放在 Mutex 后面保证记账不丢。

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;

/// 账本快照（可序列化，用于报告与日志）
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CostLedger {
    pub spent: f64,
    pub limit: f64,
    pub tool_calls: u32,
    pub llm_calls: u32,
    pub breakdown: BTreeMap<String, f64>,
}

/// 每个会话一个 CostMeter；从不返回错误，超预算时只是不再放行
#[derive(Debug)]
pub struct CostMeter {
    ledger: Mutex<CostLedger>,
}

impl CostMeter {
    pub fn new(limit: f64) -> Self {
        Self {
            ledger: Mutex::new(CostLedger {
                limit,
                ..CostLedger::default()
            }),
        }
    }

    fn ledger(&self) -> MutexGuard<'_, CostLedger> {
        // 记账只做加法，中途 panic 不会留下半更新的状态
        self.ledger.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 记一笔费用到总额与分类桶
    pub fn charge(&self, category: &str, amount: f64) {
        self.apply(category, amount, false);
    }

    pub fn record_tool_call(&self) {
        self.ledger().tool_calls += 1;
    }

    pub fn record_llm_call(&self) {
        self.ledger().llm_calls += 1;
    }

    /// 工具调用完成后的一次性记账：费用与计数在同一把锁内完成
    pub fn charge_tool(&self, tool: &str, amount: f64) {
        self.apply(tool, amount, true);
    }

    fn apply(&self, category: &str, amount: f64, tool_call: bool) {
        let mut ledger = self.ledger();
        // 负数费用视为 0，保证 spent 单调不减
        let amount = amount.max(0.0);
        ledger.spent += amount;
        *ledger.breakdown.entry(category.to_string()).or_insert(0.0) += amount;
        if tool_call {
            ledger.tool_calls += 1;
        }

        let event = serde_json::json!({
            "event": "cost_meter",
            "category": category,
            "amount": amount,
            "spent": ledger.spent,
            "limit": ledger.limit,
            "breakdown": ledger.breakdown,
            "tool_calls": ledger.tool_calls,
            "llm_calls": ledger.llm_calls,
        });
        tracing::info!(cost = %event, "cost_meter");
    }

    pub fn allow_tool(&self, max_tools: u32) -> bool {
        let ledger = self.ledger();
        ledger.tool_calls < max_tools && ledger.spent < ledger.limit
    }

    pub fn allow_llm(&self, max_llm: u32) -> bool {
        let ledger = self.ledger();
        ledger.llm_calls < max_llm && ledger.spent < ledger.limit
    }

    pub fn spent(&self) -> f64 {
        self.ledger().spent
    }

    pub fn tool_calls(&self) -> u32 {
        self.ledger().tool_calls
    }

    pub fn llm_calls(&self) -> u32 {
        self.ledger().llm_calls
    }

    pub fn snapshot(&self) -> CostLedger {
        self.ledger().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_charge_accumulates_by_category() {
        let meter = CostMeter::new(1.0);
        meter.charge("search", 0.1);
        meter.charge("search", 0.2);
        meter.charge("llm", 0.05);
        let snap = meter.snapshot();
        assert!((snap.spent - 0.35).abs() < 1e-9);
        assert!((snap.breakdown["search"] - 0.3).abs() < 1e-9);
        assert!((snap.breakdown["llm"] - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_charge_never_rejects_over_limit() {
        let meter = CostMeter::new(0.001);
        meter.charge("search", 0.5);
        assert!((meter.spent() - 0.5).abs() < 1e-9);
        assert!(!meter.allow_tool(10));
        assert!(!meter.allow_llm(10));
    }

    #[test]
    fn test_allow_tool_respects_call_count() {
        let meter = CostMeter::new(1.0);
        assert!(meter.allow_tool(2));
        meter.record_tool_call();
        assert!(meter.allow_tool(2));
        meter.record_tool_call();
        assert!(!meter.allow_tool(2));
        // 模型调用计数独立
        assert!(meter.allow_llm(1));
    }

    #[test]
    fn test_negative_amount_keeps_spend_monotonic() {
        let meter = CostMeter::new(1.0);
        meter.charge("a", 0.2);
        meter.charge("a", -0.1);
        assert!((meter.spent() - 0.2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_concurrent_charges_are_not_lost() {
        let meter = Arc::new(CostMeter::new(1000.0));
        let mut handles = Vec::new();
        for _ in 0..16 {
            let m = meter.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    m.charge_tool("t", 0.01);
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(meter.tool_calls(), 1600);
        assert!((meter.spent() - 16.0).abs() < 1e-6);
    }
}
