pub mod cache;
pub mod context;
pub mod document_search;
pub mod executor;
pub mod registry;
pub mod result;
pub mod tokenizer;
pub mod web_search;

pub use cache::{params_hash, InMemoryToolCache, NoopToolCache, ToolCache};
pub use context::ContextBundle;
pub use document_search::{DocumentSearchTool, DOCUMENT_SEARCH};
pub use executor::ToolExecutor;
pub use registry::{Tool, ToolRegistry, ToolRequest};
pub use result::{
    ContextItem, Document, GraphEdge, GraphNode, ToolPayload, ToolResult, ToolStatus, WebHit,
};
pub use web_search::{WebSearchTool, WEB_SEARCH};
