//! 上下文聚合：把一轮成功结果的上下文条目拍平并渲染成合成阶段使用的文本

use crate::tools::{ContextItem, ToolResult};

/// 一轮执行产出的上下文
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextBundle {
    pub items: Vec<ContextItem>,
    pub rendered: String,
}

impl ContextBundle {
    /// 只收集成功结果；缺少来源的条目补上产出它的工具名
    pub fn collect(results: &[ToolResult]) -> Self {
        let items: Vec<ContextItem> = results
            .iter()
            .filter(|r| r.is_success())
            .flat_map(|r| {
                r.context_items.iter().cloned().map(move |mut item| {
                    if item.source.is_none() {
                        item.source = Some(r.tool_name.clone());
                    }
                    item
                })
            })
            .collect();
        let rendered = render(&items);
        Self { items, rendered }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// 每条一行：`[序号] (来源) 标识: 内容`，序号从 1 开始；无标识时为 `[序号] (来源): 内容`
pub fn render(items: &[ContextItem]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            let source = item.source.as_deref().unwrap_or("unknown");
            match item.id.as_deref() {
                Some(id) if !id.is_empty() => {
                    format!("[{}] ({}) {}: {}", idx + 1, source, id, item.content)
                }
                _ => format!("[{}] ({}): {}", idx + 1, source, item.content),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{ToolPayload, ToolStatus};

    #[test]
    fn test_collect_tags_source_and_renders() {
        let docs = ToolResult::success("document_search", ToolPayload::Empty).with_context_items(vec![
            ContextItem::new("text", "Forage routes queries").with_id("doc-1"),
            ContextItem::new("text", "Budgets are tiered").with_source("archive"),
        ]);
        let failed = ToolResult::failure("web_search", ToolStatus::Timeout, "deadline")
            .with_context_items(vec![ContextItem::new("web", "stale")]);

        let bundle = ContextBundle::collect(&[docs, failed]);
        assert_eq!(bundle.items.len(), 2);
        assert_eq!(bundle.items[0].source.as_deref(), Some("document_search"));
        assert_eq!(
            bundle.rendered,
            "[1] (document_search) doc-1: Forage routes queries\n[2] (archive): Budgets are tiered"
        );
    }

    #[test]
    fn test_blank_id_keeps_colon_separator() {
        let rendered = render(&[ContextItem::new("web", "Tiered budgets")
            .with_source("web_search")
            .with_id("")]);
        assert_eq!(rendered, "[1] (web_search): Tiered budgets");
    }

    #[test]
    fn test_empty_round_renders_empty() {
        let bundle = ContextBundle::collect(&[]);
        assert!(bundle.is_empty());
        assert_eq!(bundle.rendered, "");
    }
}
