//! 质量评估

pub mod gate;

pub use gate::{QualityGate, QualityMetrics, QualityThresholds, QualityVerdict};
