//! 工具结果缓存
//!
//! 由工具实现自己调用（执行器不感知缓存）。键为 `tool:{name}:{params_hash}`，
//! 写入时可显式给 TTL；不给则按工具名配置取，未配置时用默认 TTL。

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::tools::{ToolRequest, ToolResult};

#[async_trait]
pub trait ToolCache: Send + Sync {
    async fn get_tool_result(&self, tool: &str, params_hash: &str) -> Option<ToolResult>;

    /// `ttl` 为 None 时由缓存实现决定过期时间
    async fn set_tool_result(
        &self,
        tool: &str,
        params_hash: &str,
        result: &ToolResult,
        ttl: Option<Duration>,
    );
}

/// 不缓存
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopToolCache;

#[async_trait]
impl ToolCache for NoopToolCache {
    async fn get_tool_result(&self, _tool: &str, _params_hash: &str) -> Option<ToolResult> {
        None
    }

    async fn set_tool_result(
        &self,
        _tool: &str,
        _params_hash: &str,
        _result: &ToolResult,
        _ttl: Option<Duration>,
    ) {
    }
}

struct Entry {
    result: ToolResult,
    expires_at: Instant,
}

/// 进程内缓存，按工具名取 TTL
pub struct InMemoryToolCache {
    default_ttl: Duration,
    ttls: HashMap<String, Duration>,
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemoryToolCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            default_ttl,
            ttls: HashMap::new(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_ttl(mut self, tool: impl Into<String>, ttl: Duration) -> Self {
        self.ttls.insert(tool.into(), ttl);
        self
    }

    pub fn ttl_for(&self, tool: &str) -> Duration {
        self.ttls.get(tool).copied().unwrap_or(self.default_ttl)
    }

    fn key(tool: &str, params_hash: &str) -> String {
        format!("tool:{tool}:{params_hash}")
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl ToolCache for InMemoryToolCache {
    async fn get_tool_result(&self, tool: &str, params_hash: &str) -> Option<ToolResult> {
        let key = Self::key(tool, params_hash);
        {
            let entries = self.entries.read().await;
            match entries.get(&key) {
                Some(entry) if entry.expires_at > Instant::now() => {
                    tracing::debug!(tool, params_hash, "Tool cache hit");
                    return Some(entry.result.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }
        // 已过期，顺手清掉
        self.entries.write().await.remove(&key);
        None
    }

    async fn set_tool_result(
        &self,
        tool: &str,
        params_hash: &str,
        result: &ToolResult,
        ttl: Option<Duration>,
    ) {
        let ttl = ttl.unwrap_or_else(|| self.ttl_for(tool));
        let entry = Entry {
            result: result.clone(),
            expires_at: Instant::now() + ttl,
        };
        self.entries
            .write()
            .await
            .insert(Self::key(tool, params_hash), entry);
        tracing::debug!(tool, params_hash, ttl_secs = ttl.as_secs(), "Tool result cached");
    }
}

/// 请求参数的稳定哈希（十六进制）：查询、租户与排序后的选项
pub fn params_hash(request: &ToolRequest) -> String {
    let mut hasher = DefaultHasher::new();
    request.query.hash(&mut hasher);
    request.tenant_id.hash(&mut hasher);
    let mut keys: Vec<&String> = request.options.keys().collect();
    keys.sort();
    for key in keys {
        key.hash(&mut hasher);
        request.options[key].to_string().hash(&mut hasher);
    }
    format!("{:016x}", hasher.finish())
}
