//! 编排错误类型
//!
//! 编排引擎自身没有致命错误：工具失败、预算耗尽、熔断、质量不足都编码在结果状态里。
//! 这里只列出外部协作者（LLM 调用、配置、解析）抛出的、需要原样传给调用方的错误。

use thiserror::Error;

/// 流水线运行过程中可能传播给调用方的错误
#[derive(Error, Debug)]
pub enum AgentError {
    /// 模型调用失败（分类 / 规划 / 反思 / 合成）
    #[error("LLM error in {stage}: {message}")]
    Llm { stage: &'static str, message: String },

    /// 模型输出无法解析为约定的 JSON 结构
    #[error("JSON parse error in {stage}: {message}")]
    JsonParse { stage: &'static str, message: String },

    #[error("Config error: {0}")]
    Config(String),

    /// 构建时引用了注册表中不存在的工具
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
}

impl AgentError {
    pub fn llm(stage: &'static str, message: impl Into<String>) -> Self {
        Self::Llm {
            stage,
            message: message.into(),
        }
    }

    pub fn json(stage: &'static str, message: impl Into<String>) -> Self {
        Self::JsonParse {
            stage,
            message: message.into(),
        }
    }
}
