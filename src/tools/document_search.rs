//! document_search：进程内语料的关键词检索
//!
//! 语料可从 JSON 文件加载（Document 数组）。打分为查询词覆盖率（中文走 jieba），
//! 带 tenant_id 的文档只对该租户可见。置信度取命中文档分数的平均值。

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::AgentError;
use crate::tools::cache::{params_hash, NoopToolCache, ToolCache};
use crate::tools::tokenizer::{coverage, tokenize_to_set};
use crate::tools::{ContextItem, Document, Tool, ToolPayload, ToolRequest, ToolResult};

pub const DOCUMENT_SEARCH: &str = "document_search";

struct IndexedDocument {
    doc: Document,
    tokens: HashSet<String>,
}

pub struct DocumentSearchTool {
    corpus: Vec<IndexedDocument>,
    top_k: usize,
    cost_per_query: f64,
    cache: Arc<dyn ToolCache>,
}

impl DocumentSearchTool {
    pub fn new(docs: Vec<Document>) -> Self {
        let corpus = docs
            .into_iter()
            .map(|doc| IndexedDocument {
                tokens: tokenize_to_set(&doc.content),
                doc,
            })
            .collect();
        Self {
            corpus,
            top_k: 5,
            cost_per_query: 0.0001,
            cache: Arc::new(NoopToolCache),
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn with_cost(mut self, cost_per_query: f64) -> Self {
        self.cost_per_query = cost_per_query;
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn ToolCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn len(&self) -> usize {
        self.corpus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.corpus.is_empty()
    }

    /// 读取 JSON 数组形式的语料文件
    pub fn load_corpus(path: &Path) -> Result<Vec<Document>, AgentError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| AgentError::Config(format!("read corpus {}: {e}", path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|e| AgentError::Config(format!("parse corpus {}: {e}", path.display())))
    }

    fn search(&self, request: &ToolRequest, top_k: usize) -> Vec<Document> {
        let query = tokenize_to_set(&request.query);
        let mut hits: Vec<Document> = self
            .corpus
            .iter()
            .filter(|d| {
                d.doc
                    .tenant_id
                    .as_deref()
                    .map_or(true, |t| t == request.tenant_id)
            })
            .filter_map(|d| {
                let score = coverage(&query, &d.tokens);
                (score > 0.0).then(|| Document {
                    score,
                    ..d.doc.clone()
                })
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        hits.truncate(top_k);
        hits
    }
}

#[async_trait]
impl Tool for DocumentSearchTool {
    fn name(&self) -> &str {
        DOCUMENT_SEARCH
    }

    fn description(&self) -> &str {
        "Search the knowledge base for documents matching the query. \
         Use for document retrieval and finding internal information."
    }

    async fn run(&self, request: &ToolRequest) -> Result<ToolResult, String> {
        let top_k = request
            .options
            .get("top_k")
            .and_then(Value::as_u64)
            .map(|k| k as usize)
            .unwrap_or(self.top_k);
        let hash = params_hash(&request.clone().with_option("top_k", top_k.into()));
        if let Some(cached) = self.cache.get_tool_result(DOCUMENT_SEARCH, &hash).await {
            return Ok(cached);
        }

        let docs = self.search(request, top_k);
        if docs.is_empty() {
            tracing::debug!(query = %request.query, "document_search found nothing");
            return Ok(ToolResult::no_results(DOCUMENT_SEARCH).with_cost(self.cost_per_query));
        }

        let average = docs.iter().map(|d| d.score).sum::<f64>() / docs.len() as f64;
        let items = docs
            .iter()
            .map(|d| {
                let mut item = ContextItem::new("text", d.content.clone())
                    .with_source(DOCUMENT_SEARCH)
                    .with_id(d.id.clone())
                    .with_score(d.score);
                item.metadata = d.metadata.clone();
                item
            })
            .collect();

        let result = ToolResult::success(DOCUMENT_SEARCH, ToolPayload::Documents { docs })
            .with_cost(self.cost_per_query)
            .with_confidence(average)
            .with_context_items(items);
        self.cache
            .set_tool_result(DOCUMENT_SEARCH, &hash, &result, None)
            .await;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{InMemoryToolCache, ToolStatus};
    use serde_json::Map;
    use std::io::Write;
    use std::time::Duration;

    fn doc(id: &str, content: &str, tenant: Option<&str>) -> Document {
        Document {
            id: id.to_string(),
            content: content.to_string(),
            score: 0.0,
            tenant_id: tenant.map(str::to_string),
            metadata: Map::new(),
        }
    }

    fn corpus() -> Vec<Document> {
        vec![
            doc("d1", "Circuit breakers isolate failing retrieval tools", None),
            doc("d2", "Budget tiers cap tool calls per query", None),
            doc("d3", "Tenant B private circuit notes", Some("tenant-b")),
        ]
    }

    #[tokio::test]
    async fn test_ranks_by_coverage() {
        let tool = DocumentSearchTool::new(corpus());
        let result = tool
            .run(&ToolRequest::new("circuit breakers tools", "tenant-a"))
            .await
            .unwrap();
        assert_eq!(result.status, ToolStatus::Success);
        assert_eq!(result.item_count, 1);
        assert_eq!(result.context_items[0].id.as_deref(), Some("d1"));
        assert!((result.confidence.unwrap() - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_tenant_scoped_documents() {
        let tool = DocumentSearchTool::new(corpus());
        let a = tool.run(&ToolRequest::new("circuit", "tenant-a")).await.unwrap();
        let b = tool.run(&ToolRequest::new("circuit", "tenant-b")).await.unwrap();
        assert_eq!(a.item_count, 1);
        assert_eq!(b.item_count, 2);
    }

    #[tokio::test]
    async fn test_no_match_is_no_results() {
        let tool = DocumentSearchTool::new(corpus());
        let result = tool.run(&ToolRequest::new("quantum", "tenant-a")).await.unwrap();
        assert_eq!(result.status, ToolStatus::NoResults);
        assert_eq!(result.item_count, 0);
    }

    #[tokio::test]
    async fn test_top_k_option_and_cache() {
        let cache = Arc::new(InMemoryToolCache::new(Duration::from_secs(60)));
        let tool = DocumentSearchTool::new(corpus()).with_cache(cache.clone());
        let request = ToolRequest::new("tool calls circuit", "tenant-a").with_option("top_k", 1.into());
        let first = tool.run(&request).await.unwrap();
        assert_eq!(first.item_count, 1);
        assert_eq!(cache.len().await, 1);
        let second = tool.run(&request).await.unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_load_corpus_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"id": "x", "content": "hello corpus"}}, {{"id": "y", "content": "second", "tenant_id": "t"}}]"#
        )
        .unwrap();
        let docs = DocumentSearchTool::load_corpus(file.path()).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1].tenant_id.as_deref(), Some("t"));

        let missing = DocumentSearchTool::load_corpus(Path::new("/nonexistent/corpus.json"));
        assert!(matches!(missing, Err(AgentError::Config(_))));
    }
}
