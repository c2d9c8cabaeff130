//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `FORAGE__*` 覆盖（双下划线表示嵌套，如 `FORAGE__QUALITY__MIN_ITEMS=3`）。

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::core::{AgentError, BudgetTiers};
use crate::quality::QualityThresholds;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub budgets: BudgetTiers,
    pub tools: ToolsSection,
    pub circuit_breaker: CircuitBreakerSection,
    pub quality: QualityThresholds,
    pub refinement: RefinementSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 命令行未指定租户时使用
    pub default_tenant: Option<String>,
    /// 提示词模板目录，未设置时用 config/prompts
    pub prompts_dir: Option<PathBuf>,
}

/// [llm] 段：后端选择、超时与单次调用的预估费用
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// openai / mock；openai 需要 OPENAI_API_KEY
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// 每次模型调用记到 llm 分类下的费用（USD）；0 表示只计次数
    #[serde(default)]
    pub call_cost_usd: f64,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            request_timeout_secs: default_request_timeout(),
            call_cost_usd: 0.0,
        }
    }
}

/// [tools] 段：默认超时、按工具覆盖的超时、内置工具与缓存
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 单次工具调用的默认超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub default_timeout_secs: f64,
    /// 按工具名覆盖超时（秒）
    #[serde(default)]
    pub timeouts: HashMap<String, f64>,
    #[serde(default)]
    pub document_search: DocumentSearchSection,
    #[serde(default)]
    pub web_search: WebSearchSection,
    #[serde(default)]
    pub cache: CacheSection,
}

fn default_tool_timeout_secs() -> f64 {
    20.0
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            default_timeout_secs: default_tool_timeout_secs(),
            timeouts: HashMap::new(),
            document_search: DocumentSearchSection::default(),
            web_search: WebSearchSection::default(),
            cache: CacheSection::default(),
        }
    }
}

/// 秒数转 Duration：只接受有限的正数，且不能超出 Duration 的表示范围
pub fn timeout_from_secs(key: &str, secs: f64) -> Result<Duration, AgentError> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(AgentError::Config(format!(
            "{key} must be a finite positive number of seconds, got {secs}"
        )));
    }
    Duration::try_from_secs_f64(secs)
        .map_err(|e| AgentError::Config(format!("{key} is out of range ({secs}): {e}")))
}

impl ToolsSection {
    pub fn default_timeout(&self) -> Result<Duration, AgentError> {
        timeout_from_secs("tools.default_timeout_secs", self.default_timeout_secs)
    }

    /// 按工具名排序的超时覆盖
    pub fn timeout_overrides(&self) -> Result<Vec<(String, Duration)>, AgentError> {
        let mut overrides = self
            .timeouts
            .iter()
            .map(|(name, secs)| {
                timeout_from_secs(&format!("tools.timeouts.{name}"), *secs)
                    .map(|deadline| (name.clone(), deadline))
            })
            .collect::<Result<Vec<_>, _>>()?;
        overrides.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(overrides)
    }
}

/// [tools.document_search] 段
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentSearchSection {
    /// JSON 语料文件；未设置时语料为空
    pub corpus_path: Option<PathBuf>,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_top_k() -> usize {
    5
}

impl Default for DocumentSearchSection {
    fn default() -> Self {
        Self {
            corpus_path: None,
            top_k: default_top_k(),
        }
    }
}

/// [tools.web_search] 段：未配置 endpoint 时不注册该工具
#[derive(Debug, Clone, Deserialize)]
pub struct WebSearchSection {
    pub endpoint: Option<String>,
    /// 存放 API Key 的环境变量名
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_web_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_key_env() -> String {
    "WEB_SEARCH_API_KEY".to_string()
}

fn default_max_results() -> usize {
    10
}

fn default_web_timeout_secs() -> u64 {
    10
}

impl Default for WebSearchSection {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key_env: default_api_key_env(),
            max_results: default_max_results(),
            timeout_secs: default_web_timeout_secs(),
        }
    }
}

/// [tools.cache] 段：工具结果缓存的 TTL（秒）
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    #[serde(default = "default_cache_ttl")]
    pub default_ttl_secs: u64,
    #[serde(default = "default_cache_ttls")]
    pub ttls: HashMap<String, u64>,
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_ttl() -> u64 {
    600
}

fn default_cache_ttls() -> HashMap<String, u64> {
    HashMap::from([
        ("document_search".to_string(), 1800),
        ("web_search".to_string(), 600),
    ])
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            default_ttl_secs: default_cache_ttl(),
            ttls: default_cache_ttls(),
        }
    }
}

/// [circuit_breaker] 段
#[derive(Debug, Clone, Deserialize)]
pub struct CircuitBreakerSection {
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// open 之后多久转 half_open（秒）
    #[serde(default = "default_open_timeout")]
    pub timeout_secs: f64,
    /// EMA 平滑系数
    #[serde(default = "default_alpha")]
    pub alpha: f64,
}

fn default_threshold() -> f64 {
    0.5
}

fn default_open_timeout() -> f64 {
    30.0
}

fn default_alpha() -> f64 {
    0.2
}

impl Default for CircuitBreakerSection {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            timeout_secs: default_open_timeout(),
            alpha: default_alpha(),
        }
    }
}

impl CircuitBreakerSection {
    pub fn open_timeout(&self) -> Result<Duration, AgentError> {
        timeout_from_secs("circuit_breaker.timeout_secs", self.timeout_secs)
    }
}

/// [refinement] 段
#[derive(Debug, Clone, Deserialize)]
pub struct RefinementSection {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

fn default_max_iterations() -> usize {
    3
}

impl Default for RefinementSection {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
        }
    }
}

impl AppConfig {
    /// 启动时校验阈值范围
    pub fn validate(&self) -> Result<(), AgentError> {
        let q = &self.quality;
        if !(0.0..=1.0).contains(&q.min_confidence) {
            return Err(AgentError::Config(format!(
                "quality.min_confidence must be within [0, 1], got {}",
                q.min_confidence
            )));
        }
        if q.min_items < 1 {
            return Err(AgentError::Config("quality.min_items must be >= 1".into()));
        }
        if self.refinement.max_iterations < 1 {
            return Err(AgentError::Config(
                "refinement.max_iterations must be >= 1".into(),
            ));
        }
        let cb = &self.circuit_breaker;
        if !(cb.threshold > 0.0 && cb.threshold <= 1.0) {
            return Err(AgentError::Config(format!(
                "circuit_breaker.threshold must be within (0, 1], got {}",
                cb.threshold
            )));
        }
        if !(cb.alpha > 0.0 && cb.alpha <= 1.0) {
            return Err(AgentError::Config(format!(
                "circuit_breaker.alpha must be within (0, 1], got {}",
                cb.alpha
            )));
        }
        cb.open_timeout()?;
        self.tools.default_timeout()?;
        self.tools.timeout_overrides()?;
        Ok(())
    }
}

/// 从 config 目录加载配置，环境变量 FORAGE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 FORAGE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("FORAGE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
