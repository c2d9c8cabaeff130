//! 编排器构建器：从 AppConfig 统一组装 LLM、工具注册表、熔断器、缓存与提示词

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::agents::{
    DEFAULT_CLASSIFIER_PROMPT, DEFAULT_PLANNER_PROMPT, DEFAULT_REFLECTION_PROMPT,
    DEFAULT_SYNTHESIZER_PROMPT,
};
use crate::config::AppConfig;
use crate::core::orchestrator::create_llm_from_config;
use crate::core::{AgentError, CircuitBreakerRegistry, Orchestrator, PromptSet};
use crate::llm::LlmClient;
use crate::tools::{
    DocumentSearchTool, InMemoryToolCache, NoopToolCache, ToolCache, ToolExecutor, ToolRegistry,
    WebSearchTool,
};

pub struct OrchestratorBuilder {
    config: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
    registry: Option<ToolRegistry>,
    breakers: Option<Arc<CircuitBreakerRegistry>>,
}

impl OrchestratorBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            llm: None,
            registry: None,
            breakers: None,
        }
    }

    /// 指定 LLM；不指定时按配置与环境变量选择
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// 指定工具注册表；不指定时注册内置工具
    pub fn with_tools(mut self, registry: ToolRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// 共享熔断器注册表（多个编排器共用同一份工具健康状态）
    pub fn with_breakers(mut self, breakers: Arc<CircuitBreakerRegistry>) -> Self {
        self.breakers = Some(breakers);
        self
    }

    /// 依次查找 prompts_dir、config/prompts、../config/prompts 下的 `<stage>.md`
    fn load_prompt(&self, stage: &str, fallback: &str) -> String {
        let file = format!("{stage}.md");
        let mut candidates: Vec<PathBuf> = Vec::new();
        if let Some(dir) = &self.config.app.prompts_dir {
            candidates.push(dir.join(&file));
        }
        candidates.push(PathBuf::from("config/prompts").join(&file));
        candidates.push(PathBuf::from("../config/prompts").join(&file));

        candidates
            .into_iter()
            .find_map(|p| std::fs::read_to_string(p).ok())
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| fallback.to_string())
    }

    pub fn build_prompts(&self) -> PromptSet {
        PromptSet {
            classifier: self.load_prompt("classifier", DEFAULT_CLASSIFIER_PROMPT),
            planner: self.load_prompt("planner", DEFAULT_PLANNER_PROMPT),
            reflection: self.load_prompt("reflection", DEFAULT_REFLECTION_PROMPT),
            synthesizer: self.load_prompt("synthesizer", DEFAULT_SYNTHESIZER_PROMPT),
        }
    }

    pub fn build_cache(&self) -> Arc<dyn ToolCache> {
        let cfg = &self.config.tools.cache;
        if !cfg.enabled {
            return Arc::new(NoopToolCache);
        }
        let cache = cfg.ttls.iter().fold(
            InMemoryToolCache::new(Duration::from_secs(cfg.default_ttl_secs)),
            |cache, (tool, secs)| cache.with_ttl(tool.clone(), Duration::from_secs(*secs)),
        );
        Arc::new(cache)
    }

    /// 内置工具：document_search 总是注册；web_search 只在配置了 endpoint 时注册
    pub fn build_tool_registry(&self) -> Result<ToolRegistry, AgentError> {
        let tools_cfg = &self.config.tools;
        let cache = self.build_cache();
        let mut registry = ToolRegistry::new();

        let docs = match &tools_cfg.document_search.corpus_path {
            Some(path) => DocumentSearchTool::load_corpus(path)?,
            None => Vec::new(),
        };
        let document_search = DocumentSearchTool::new(docs)
            .with_top_k(tools_cfg.document_search.top_k)
            .with_cache(cache.clone());
        tracing::info!(documents = document_search.len(), "document_search ready");
        registry.register(document_search);

        if let Some(endpoint) = &tools_cfg.web_search.endpoint {
            let api_key = std::env::var(&tools_cfg.web_search.api_key_env).ok();
            let web = WebSearchTool::new(
                endpoint.clone(),
                api_key,
                tools_cfg.web_search.max_results,
                Duration::from_secs(tools_cfg.web_search.timeout_secs),
            )?
            .with_cache(cache);
            registry.register(web);
        }

        Ok(registry)
    }

    /// 校验配置并组装编排器
    pub fn build(self) -> Result<Orchestrator, AgentError> {
        self.config.validate()?;

        let registry = match self.registry.clone() {
            Some(r) => r,
            None => self.build_tool_registry()?,
        };
        let overrides = self.config.tools.timeout_overrides()?;
        for (name, _) in &overrides {
            if !registry.contains(name) {
                tracing::warn!(tool = %name, "Timeout configured for unregistered tool");
            }
        }

        let breakers = match self.breakers.clone() {
            Some(shared) => shared,
            None => Arc::new(CircuitBreakerRegistry::from_config(
                &self.config.circuit_breaker,
            )?),
        };
        let executor = overrides.into_iter().fold(
            ToolExecutor::new(registry, breakers, self.config.tools.default_timeout()?),
            |exec, (name, deadline)| exec.with_tool_timeout(name, deadline),
        );

        let llm = self
            .llm
            .clone()
            .unwrap_or_else(|| create_llm_from_config(&self.config));
        let prompts = self.build_prompts();

        Ok(Orchestrator::new(llm, executor, prompts)
            .with_budget_tiers(self.config.budgets.clone())
            .with_quality_thresholds(self.config.quality.clone())
            .with_max_iterations(self.config.refinement.max_iterations)
            .with_llm_call_cost(self.config.llm.call_cost_usd))
    }
}
