/// Pull the first JSON object out of a model response. Tolerates code
/// fences and prose around the object; returns `None` when no object is
/// present at all.
pub fn extract_json_object(raw: &str) -> Option<String> {
    if raw.trim_start().starts_with('{') {
        return Some(trim_symmetric(raw));
    }

    let fence = "```";
    if let Some(start) = raw.find(fence) {
        let after_fence = &raw[start + fence.len()..];
        let after_lang = after_fence.trim_start_matches(|c: char| c.is_alphanumeric() || c == '_');
        if let Some(end) = after_lang.find(fence) {
            let block = &after_lang[..end];
            if block.contains('{') {
                return Some(trim_symmetric(block));
            }
        }
    }

    raw.split('{').nth(1).and_then(|rest| {
        let mut depth = 1i32;
        for (idx, ch) in rest.char_indices() {
            match ch {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        let mut candidate = String::from("{");
                        candidate.push_str(&rest[..=idx]);
                        return Some(trim_symmetric(&candidate));
                    }
                }
                _ => {}
            }
        }
        None
    })
}

fn trim_symmetric(value: &str) -> String {
    value.trim().trim_matches('`').trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_from_fenced_block() {
        let input = "Chosen action:\n```json\n{\"action\":\"no_op\"}\n```";
        let extracted = extract_json_object(input).expect("json");
        assert!(extracted.starts_with('{'));
        assert!(extracted.contains("\"action\""));
    }

    #[test]
    fn extracts_from_inline_object() {
        let input = "text { \"foo\": 1 } more";
        let extracted = extract_json_object(input).expect("json");
        assert_eq!(extracted, "{ \"foo\": 1 }");
    }

    #[test]
    fn handles_nested_objects() {
        let input = "result: {\"a\": {\"b\": 2}} trailing";
        let extracted = extract_json_object(input).expect("json");
        assert_eq!(extracted, "{\"a\": {\"b\": 2}}");
    }

    #[test]
    fn returns_none_when_missing() {
        assert!(extract_json_object("no braces here").is_none());
    }
}
