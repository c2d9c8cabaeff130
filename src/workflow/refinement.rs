//! 迭代精炼循环：execute → gate → reflect → decide
//!
//! 闸门通过且反思认为足够时升级退出；否则带着缺口重新规划再跑一轮，
//! 直到达到 max_iterations 后强制退出并保留最后一轮结果。

use async_trait::async_trait;
use serde::Serialize;

use crate::core::{AgentError, Reflection};

/// 循环每一轮要调用的阶段，由流水线实现
#[async_trait]
pub trait RefinementStages: Send {
    /// 执行当前策略并过质量闸门，返回闸门是否通过；round 从 1 开始
    async fn execute(&mut self, round: usize) -> Result<bool, AgentError>;

    async fn reflect(&mut self) -> Result<Reflection, AgentError>;

    /// 带着反思给出的缺口重新规划，替换当前策略
    async fn replan(&mut self, gaps: &[String]) -> Result<(), AgentError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopExit {
    /// 质量足够，提前退出
    Escalated,
    /// 到达轮数上限，带着最后一轮结果退出
    IterationCap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoopOutcome {
    pub rounds: usize,
    pub exit: LoopExit,
}

/// 唯一的退出信号：闸门通过且反思为 sufficient
pub fn should_escalate(quality_passed: bool, reflection: &Reflection) -> bool {
    quality_passed && reflection.is_sufficient()
}

#[derive(Debug, Clone)]
pub struct RefinementLoop {
    max_iterations: usize,
}

impl RefinementLoop {
    /// max_iterations 至少为 1
    pub fn new(max_iterations: usize) -> Self {
        Self {
            max_iterations: max_iterations.max(1),
        }
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub async fn run<S: RefinementStages + ?Sized>(
        &self,
        stages: &mut S,
    ) -> Result<LoopOutcome, AgentError> {
        let mut round = 0;
        loop {
            round += 1;
            tracing::info!(round, max = self.max_iterations, "Refinement round started");

            let passed = stages.execute(round).await?;
            let reflection = stages.reflect().await?;

            if should_escalate(passed, &reflection) {
                tracing::info!(round, "Quality sufficient, leaving refinement loop");
                return Ok(LoopOutcome {
                    rounds: round,
                    exit: LoopExit::Escalated,
                });
            }

            if round >= self.max_iterations {
                tracing::warn!(
                    round,
                    quality_passed = passed,
                    "Refinement iteration cap reached, continuing with last results"
                );
                return Ok(LoopOutcome {
                    rounds: round,
                    exit: LoopExit::IterationCap,
                });
            }

            tracing::info!(round, gaps = ?reflection.gaps, "Quality insufficient, re-planning");
            stages.replan(&reflection.gaps).await?;
        }
    }
}

impl Default for RefinementLoop {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Evaluation;

    /// 脚本化阶段：每轮闸门结果与反思结论按顺序取
    struct Scripted {
        gate: Vec<bool>,
        sufficient: Vec<bool>,
        executed: usize,
        replans: Vec<Vec<String>>,
        fail_reflect_at: Option<usize>,
    }

    impl Scripted {
        fn new(gate: Vec<bool>, sufficient: Vec<bool>) -> Self {
            Self {
                gate,
                sufficient,
                executed: 0,
                replans: Vec::new(),
                fail_reflect_at: None,
            }
        }
    }

    #[async_trait]
    impl RefinementStages for Scripted {
        async fn execute(&mut self, round: usize) -> Result<bool, AgentError> {
            self.executed += 1;
            assert_eq!(round, self.executed);
            Ok(self.gate.get(round - 1).copied().unwrap_or(false))
        }

        async fn reflect(&mut self) -> Result<Reflection, AgentError> {
            if self.fail_reflect_at == Some(self.executed) {
                return Err(AgentError::llm("reflection", "boom"));
            }
            let sufficient = self
                .sufficient
                .get(self.executed - 1)
                .copied()
                .unwrap_or(false);
            Ok(Reflection {
                evaluation: if sufficient {
                    Evaluation::Sufficient
                } else {
                    Evaluation::Insufficient
                },
                gaps: vec![format!("gap-{}", self.executed)],
                reasoning: String::new(),
            })
        }

        async fn replan(&mut self, gaps: &[String]) -> Result<(), AgentError> {
            self.replans.push(gaps.to_vec());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_always_insufficient_runs_exactly_cap_rounds() {
        let mut stages = Scripted::new(vec![true; 5], vec![false; 5]);
        let outcome = RefinementLoop::new(3).run(&mut stages).await.unwrap();
        assert_eq!(outcome.rounds, 3);
        assert_eq!(outcome.exit, LoopExit::IterationCap);
        assert_eq!(stages.executed, 3);
        // 最后一轮之后不再重新规划
        assert_eq!(stages.replans.len(), 2);
        assert_eq!(stages.replans[0], vec!["gap-1".to_string()]);
    }

    #[tokio::test]
    async fn test_escalates_when_gate_and_reflection_agree() {
        let mut stages = Scripted::new(vec![false, true], vec![true, true]);
        let outcome = RefinementLoop::new(3).run(&mut stages).await.unwrap();
        assert_eq!(outcome.rounds, 2);
        assert_eq!(outcome.exit, LoopExit::Escalated);
    }

    #[tokio::test]
    async fn test_sufficient_reflection_alone_does_not_escalate() {
        let mut stages = Scripted::new(vec![false; 3], vec![true; 3]);
        let outcome = RefinementLoop::new(3).run(&mut stages).await.unwrap();
        assert_eq!(outcome.exit, LoopExit::IterationCap);
    }

    #[tokio::test]
    async fn test_zero_cap_still_runs_once() {
        let mut stages = Scripted::new(vec![], vec![]);
        let outcome = RefinementLoop::new(0).run(&mut stages).await.unwrap();
        assert_eq!(outcome.rounds, 1);
    }

    #[tokio::test]
    async fn test_stage_error_propagates() {
        let mut stages = Scripted::new(vec![true; 3], vec![false; 3]);
        stages.fail_reflect_at = Some(2);
        let err = RefinementLoop::new(3).run(&mut stages).await.unwrap_err();
        assert!(matches!(err, AgentError::Llm { stage: "reflection", .. }));
    }
}
