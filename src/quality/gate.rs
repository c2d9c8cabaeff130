//! 质量闸门：对一轮成功结果做确定性的通过/不通过判断
//!
//! 只看条目数、平均置信度、来源工具数三个指标，不调用模型。

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::tools::ToolResult;

/// 闸门阈值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityThresholds {
    #[serde(default = "default_min_items")]
    pub min_items: usize,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    #[serde(default = "default_min_source_types")]
    pub min_source_types: usize,
}

fn default_min_items() -> usize {
    2
}

fn default_min_confidence() -> f64 {
    0.6
}

fn default_min_source_types() -> usize {
    1
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            min_items: default_min_items(),
            min_confidence: default_min_confidence(),
            min_source_types: default_min_source_types(),
        }
    }
}

/// 一轮结果的聚合指标
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub total_items: usize,
    /// 报告了置信度的工具的算术平均；都没报告时为 0
    pub average_confidence: f64,
    /// 成功结果里出现过的工具名（去重、排序）
    pub source_types: Vec<String>,
}

impl QualityMetrics {
    /// 只统计 status = success 的结果
    pub fn from_results(results: &[ToolResult]) -> Self {
        let successes = results.iter().filter(|r| r.is_success());

        let mut total_items = 0;
        let mut confidences = Vec::new();
        let mut sources = BTreeSet::new();
        for result in successes {
            total_items += result.item_count;
            if let Some(c) = result.confidence {
                confidences.push(c);
            }
            sources.insert(result.tool_name.clone());
        }

        let average_confidence = if confidences.is_empty() {
            0.0
        } else {
            confidences.iter().sum::<f64>() / confidences.len() as f64
        };

        Self {
            total_items,
            average_confidence,
            source_types: sources.into_iter().collect(),
        }
    }

    pub fn num_source_types(&self) -> usize {
        self.source_types.len()
    }
}

/// 闸门结论
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityVerdict {
    pub passed: bool,
    pub metrics: QualityMetrics,
}

#[derive(Debug, Clone, Default)]
pub struct QualityGate {
    thresholds: QualityThresholds,
}

impl QualityGate {
    pub fn new(thresholds: QualityThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &QualityThresholds {
        &self.thresholds
    }

    pub fn evaluate(&self, results: &[ToolResult]) -> QualityVerdict {
        let metrics = QualityMetrics::from_results(results);
        let t = &self.thresholds;
        let passed = metrics.total_items >= t.min_items
            && metrics.num_source_types() >= t.min_source_types
            && metrics.average_confidence >= t.min_confidence;

        tracing::info!(
            passed,
            total_items = metrics.total_items,
            average_confidence = metrics.average_confidence,
            source_types = metrics.num_source_types(),
            "Quality gate evaluated"
        );

        QualityVerdict { passed, metrics }
    }
}
