// ABOUTME: Deterministic extraction of Lisp code from LLM responses
// Six rules applied in precedence order; the input is sanitized first so
// smart quotes and zero-width characters never defeat the fence scan.

use crate::parser::sanitize;

const CODE_TAGS: [&str; 4] = ["clojure", "lisp", "clj", "text"];

#[derive(Debug)]
struct Fence {
    tag: String,
    body: Option<String>,
    /// byte offset just past the opening fence line, for rule 3
    body_start: usize,
}

/// Scan ``` fences. An unterminated final fence yields `body: None`.
fn scan_fences(text: &str) -> Vec<Fence> {
    let mut fences = Vec::new();
    let mut rest = text;
    let mut offset = 0;

    while let Some(open) = rest.find("```") {
        let after_open = open + 3;
        let line_end = rest[after_open..]
            .find('\n')
            .map(|i| after_open + i)
            .unwrap_or(rest.len());
        let tag = rest[after_open..line_end].trim().to_lowercase();
        let body_start = (line_end + 1).min(rest.len());
        match rest[body_start..].find("```") {
            Some(close) => {
                let body = rest[body_start..body_start + close].to_string();
                fences.push(Fence {
                    tag,
                    body: Some(body),
                    body_start: offset + body_start,
                });
                let next = body_start + close + 3;
                offset += next;
                rest = &rest[next..];
            }
            None => {
                fences.push(Fence {
                    tag,
                    body: None,
                    body_start: offset + body_start,
                });
                break;
            }
        }
    }
    fences
}

fn starts_with_paren(body: &str) -> bool {
    body.trim_start().starts_with('(')
}

/// Last `<tag>…</tag>` block for the given tag name.
fn xml_block(text: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = text.rfind(&open)?;
    let body_start = start + open.len();
    let end = text[body_start..].find(&close)?;
    Some(text[body_start..body_start + end].trim().to_string())
}

/// Extract the program from an LLM response. Returns `None` when no rule
/// yields code (`no_code_found` at the agent layer).
pub fn extract_code(response: &str) -> Option<String> {
    let text = sanitize(response);
    let fences = scan_fences(&text);

    // 1. last tagged fence (clojure/lisp/clj/text) whose body opens with (
    if let Some(found) = fences
        .iter()
        .rev()
        .filter_map(|f| f.body.as_deref().map(|b| (f, b)))
        .find(|(f, b)| CODE_TAGS.contains(&f.tag.as_str()) && starts_with_paren(b))
    {
        return Some(found.1.trim().to_string());
    }

    // 2. a well-formed <clojure>…</clojure> or <lisp>…</lisp> block
    for tag in ["clojure", "lisp"] {
        if let Some(body) = xml_block(&text, tag) {
            if !body.is_empty() {
                return Some(body);
            }
        }
    }

    // 3. a ```clojure fence "closed" by an XML tag instead of a fence
    if let Some(fence) = fences
        .iter()
        .rev()
        .find(|f| f.body.is_none() && CODE_TAGS.contains(&f.tag.as_str()))
    {
        let tail = &text[fence.body_start..];
        for close in ["</clojure>", "</lisp>"] {
            if let Some(end) = tail.find(close) {
                let body = tail[..end].trim();
                if !body.is_empty() {
                    return Some(body.to_string());
                }
            }
        }
    }

    // 4. last untagged fence whose body opens with (
    if let Some(found) = fences
        .iter()
        .rev()
        .filter_map(|f| f.body.as_deref().map(|b| (f, b)))
        .find(|(f, b)| f.tag.is_empty() && starts_with_paren(b))
    {
        return Some(found.1.trim().to_string());
    }

    // 5. bare response that opens with (
    let trimmed = text.trim_start();
    if trimmed.starts_with('(') {
        return Some(trimmed.trim_end().to_string());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_fence() {
        let response = "Here:\n```clojure\n(+ 1 2)\n```\nthanks";
        assert_eq!(extract_code(response).unwrap(), "(+ 1 2)");
    }

    #[test]
    fn test_last_tagged_fence_wins() {
        let response = "```clojure\n(+ 1 1)\n```\nbetter:\n```lisp\n(+ 2 2)\n```";
        assert_eq!(extract_code(response).unwrap(), "(+ 2 2)");
    }

    #[test]
    fn test_tagged_fence_requires_paren_body() {
        let response = "```text\nnot code\n```\n```clj\n(inc 1)\n```";
        assert_eq!(extract_code(response).unwrap(), "(inc 1)");
    }

    #[test]
    fn test_xml_block() {
        let response = "Answer: <clojure>(count ctx/orders)</clojure>";
        assert_eq!(extract_code(response).unwrap(), "(count ctx/orders)");
        let response = "<lisp>\n(+ 1 2)\n</lisp>";
        assert_eq!(extract_code(response).unwrap(), "(+ 1 2)");
    }

    #[test]
    fn test_malformed_fence_closed_by_xml_tag() {
        let response = "```clojure\n(+ 3 4)\n</clojure>";
        assert_eq!(extract_code(response).unwrap(), "(+ 3 4)");
    }

    #[test]
    fn test_untagged_fence() {
        let response = "```\n(* 2 3)\n```";
        assert_eq!(extract_code(response).unwrap(), "(* 2 3)");
    }

    #[test]
    fn test_untagged_fence_without_paren_is_skipped() {
        let response = "```\nplain prose\n```";
        assert_eq!(extract_code(response), None);
    }

    #[test]
    fn test_bare_paren_response() {
        assert_eq!(extract_code("  (+ 5 6)\n").unwrap(), "(+ 5 6)");
    }

    #[test]
    fn test_no_code() {
        assert_eq!(extract_code("I could not find an answer."), None);
    }

    #[test]
    fn test_sanitizer_applies_before_rules() {
        // smart quotes inside the code normalize to plain quotes
        let response = "```clojure\n(str \u{201C}hi\u{201D})\n```";
        assert_eq!(extract_code(response).unwrap(), "(str \"hi\")");
    }

    #[test]
    fn test_fence_precedence_over_bare_paren() {
        let response = "(ignore this)\n```clojure\n(+ 9 9)\n```";
        assert_eq!(extract_code(response).unwrap(), "(+ 9 9)");
    }
}
