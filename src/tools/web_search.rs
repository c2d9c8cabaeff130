//! web_search：调用 HTTP JSON 搜索接口（Bing 风格响应）
//!
//! GET `{endpoint}?q=...&count=...`，有 API Key 时放在 Ocp-Apim-Subscription-Key 头里。
//! 响应没有 webPages 时返回 no_results；传输或解析失败返回 status = error 的结果。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::core::AgentError;
use crate::tools::cache::{params_hash, NoopToolCache, ToolCache};
use crate::tools::{ContextItem, Tool, ToolPayload, ToolRequest, ToolResult, ToolStatus, WebHit};

pub const WEB_SEARCH: &str = "web_search";

/// 单次搜索的大致费用（USD）
const COST_PER_QUERY: f64 = 0.005;
/// 网页摘要没有相关度分数，统一给中等置信度
const WEB_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SearchResponse {
    #[serde(default)]
    web_pages: Option<WebPages>,
}

#[derive(Debug, Deserialize)]
struct WebPages {
    #[serde(default)]
    value: Vec<WebHit>,
}

pub struct WebSearchTool {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    max_results: usize,
    timeout: Duration,
    cache: Arc<dyn ToolCache>,
}

impl WebSearchTool {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        max_results: usize,
        timeout: Duration,
    ) -> Result<Self, AgentError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("forage/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AgentError::Config(format!("web_search client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
            max_results: max_results.max(1),
            timeout,
            cache: Arc::new(NoopToolCache),
        })
    }

    pub fn with_cache(mut self, cache: Arc<dyn ToolCache>) -> Self {
        self.cache = cache;
        self
    }

    async fn fetch(&self, query: &str) -> Result<SearchResponse, String> {
        let count = self.max_results.to_string();
        let mut req = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query), ("count", count.as_str())]);
        if let Some(key) = &self.api_key {
            req = req.header("Ocp-Apim-Subscription-Key", key);
        }
        let resp = req.send().await.map_err(|e| e.to_string())?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        resp.json::<SearchResponse>().await.map_err(|e| e.to_string())
    }
}

/// 把搜索响应转成工具结果
pub(crate) fn into_result(response: SearchResponse) -> ToolResult {
    let hits = response
        .web_pages
        .map(|p| p.value)
        .unwrap_or_default();
    if hits.is_empty() {
        return ToolResult::no_results(WEB_SEARCH);
    }

    let items = hits
        .iter()
        .map(|hit| {
            let mut item = ContextItem::new("web", hit.snippet.clone())
                .with_source(WEB_SEARCH)
                .with_metadata("name", hit.name.clone().into())
                .with_metadata("url", hit.url.clone().into());
            item.id = hit.id.clone();
            item
        })
        .collect();

    ToolResult::success(WEB_SEARCH, ToolPayload::Web { results: hits })
        .with_cost(COST_PER_QUERY)
        .with_confidence(WEB_CONFIDENCE)
        .with_context_items(items)
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        WEB_SEARCH
    }

    fn description(&self) -> &str {
        "Search the web for current information and external data. \
         Use for recent events, news, or information beyond the knowledge base."
    }

    fn timeout(&self) -> Option<Duration> {
        Some(self.timeout)
    }

    async fn run(&self, request: &ToolRequest) -> Result<ToolResult, String> {
        let hash = params_hash(
            &ToolRequest::new(request.query.clone(), "")
                .with_option("count", self.max_results.into()),
        );
        if let Some(cached) = self.cache.get_tool_result(WEB_SEARCH, &hash).await {
            return Ok(cached);
        }

        match self.fetch(&request.query).await {
            Ok(response) => {
                let result = into_result(response);
                if result.is_success() {
                    self.cache
                        .set_tool_result(WEB_SEARCH, &hash, &result, None)
                        .await;
                }
                Ok(result)
            }
            Err(e) => {
                tracing::warn!(error = %e, "web_search request failed");
                Ok(ToolResult::failure(WEB_SEARCH, ToolStatus::Error, e))
            }
        }
    }
}
