//! 预算档位：按复杂度划分的费用与调用次数上限
//!
//! 会话开始时根据分类结果选一次，之后只读。

use serde::{Deserialize, Serialize};

use crate::core::Complexity;

/// 单个预算档位：总费用上限（USD）、工具调用上限、模型调用上限
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BudgetTier {
    pub total_usd: f64,
    pub max_tool_calls: u32,
    pub max_llm_calls: u32,
}

impl BudgetTier {
    pub const fn new(total_usd: f64, max_tool_calls: u32, max_llm_calls: u32) -> Self {
        Self {
            total_usd,
            max_tool_calls,
            max_llm_calls,
        }
    }
}

/// 三个固定档位（simple / medium / complex）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetTiers {
    #[serde(default = "default_simple")]
    pub simple: BudgetTier,
    #[serde(default = "default_medium")]
    pub medium: BudgetTier,
    #[serde(default = "default_complex")]
    pub complex: BudgetTier,
}

fn default_simple() -> BudgetTier {
    BudgetTier::new(0.001, 1, 1)
}

fn default_medium() -> BudgetTier {
    BudgetTier::new(0.005, 3, 2)
}

fn default_complex() -> BudgetTier {
    BudgetTier::new(0.010, 5, 3)
}

impl Default for BudgetTiers {
    fn default() -> Self {
        Self {
            simple: default_simple(),
            medium: default_medium(),
            complex: default_complex(),
        }
    }
}

impl BudgetTiers {
    /// 分类缺失时落到 medium 档
    pub fn for_complexity(&self, complexity: Option<Complexity>) -> BudgetTier {
        match complexity.unwrap_or_default() {
            Complexity::Simple => self.simple,
            Complexity::Medium => self.medium,
            Complexity::Complex => self.complex,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tiers() {
        let tiers = BudgetTiers::default();
        assert_eq!(tiers.simple.max_tool_calls, 1);
        assert_eq!(tiers.medium.max_tool_calls, 3);
        assert_eq!(tiers.complex.max_llm_calls, 3);
    }

    #[test]
    fn test_missing_complexity_uses_medium() {
        let tiers = BudgetTiers::default();
        assert_eq!(tiers.for_complexity(None), tiers.medium);
        assert_eq!(tiers.for_complexity(Some(Complexity::Complex)), tiers.complex);
    }
}
