//! 从模型输出中提取 JSON：优先 ```json 代码块，否则取第一个 '{' 到最后一个 '}'

use serde::de::DeserializeOwned;

use crate::core::AgentError;

pub fn extract_json<T: DeserializeOwned>(stage: &'static str, output: &str) -> Result<T, AgentError> {
    let trimmed = output.trim();

    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```")
            .map(|end| rest[..end].trim())
            .unwrap_or(rest.trim())
    } else if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start <= end {
            &trimmed[start..=end]
        } else {
            trimmed
        }
    } else {
        return Err(AgentError::json(stage, format!("no JSON object in output: {trimmed}")));
    };

    serde_json::from_str(json_str).map_err(|e| AgentError::json(stage, format!("{e}: {json_str}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Probe {
        a: u32,
    }

    #[test]
    fn test_fenced_block() {
        let p: Probe = extract_json("t", "Sure!\n```json\n{\"a\": 1}\n```\nDone").unwrap();
        assert_eq!(p, Probe { a: 1 });
    }

    #[test]
    fn test_bare_object_with_prose() {
        let p: Probe = extract_json("t", "Here you go: {\"a\": 7} hope it helps").unwrap();
        assert_eq!(p.a, 7);
    }

    #[test]
    fn test_no_json_is_parse_error() {
        let err = extract_json::<Probe>("planner", "no idea").unwrap_err();
        assert!(matches!(err, AgentError::JsonParse { stage: "planner", .. }));
    }
}
