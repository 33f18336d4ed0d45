// ABOUTME: Prompt assembly: data/tool inventories, template expansion and
// the default template pack. Template content is not part of the contract;
// hosts replace any of these strings.

use crate::signature::{render_type, Signature};
use crate::tools::ToolSet;
use crate::value::Value;
use indexmap::IndexMap;

/// Pre-loaded prompt text used by the agent loop. Every field is plain
/// text; `{{key}}` placeholders expand from the context map.
#[derive(Debug, Clone)]
pub struct PromptTemplates {
    pub base_spec: String,
    pub single_shot_addon: String,
    pub multi_turn_addon: String,
    pub output_format: String,
    pub must_return: String,
    pub retry_feedback: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        PromptTemplates {
            base_spec: "\
You write programs in PTC-Lisp, a small Clojure subset. Available forms: \
if, when, cond, do, let (with destructuring), fn, defn, def, loop/recur, \
->, ->>, and, or, quote. Data: nil, booleans, ints, floats, strings, \
:keywords, vectors, maps, sets. Read host data as ctx/<name>, carried \
state as memory/<name>, and call tools as (tool/<name> …). *1 *2 *3 hold \
the previous turn results."
                .to_string(),
            single_shot_addon: "\
Respond with exactly one program. Its value is the answer; do not call \
return."
                .to_string(),
            multi_turn_addon: "\
Work in turns. Each turn submit one program. Finish with (return value) \
when done, or (fail {:reason :x :message \"…\"}) when the goal cannot be \
met. A top-level map return merges into memory for later turns."
                .to_string(),
            output_format: "\
Reply with a single fenced code block tagged `clojure` containing the \
program and nothing else."
                .to_string(),
            must_return: "\
You are out of exploration turns. This turn you MUST terminate with \
(return value) or (fail {:reason :x :message \"…\"}); do not call any \
more tools."
                .to_string(),
            retry_feedback: "The previous program failed: {{error}}. Fix it and try again."
                .to_string(),
        }
    }
}

/// Verbatim `{{key}}` substitution. Unknown keys stay in place.
pub fn expand_template(template: &str, vars: &IndexMap<String, Value>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find("}}") {
            Some(end) => {
                let key = &rest[start + 2..start + 2 + end];
                match vars.get(key.trim()) {
                    Some(value) => out.push_str(&value.display_string()),
                    None => {
                        out.push_str("{{");
                        out.push_str(key);
                        out.push_str("}}");
                    }
                }
                rest = &rest[start + 2 + end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Rough type description with element sampling, for the data inventory.
pub fn infer_type(value: &Value) -> String {
    match value {
        Value::Nil => "nil".to_string(),
        Value::Bool(_) => "bool".to_string(),
        Value::Int(_) => "int".to_string(),
        Value::Float(_) => "float".to_string(),
        Value::String(_) => "string".to_string(),
        Value::Keyword(_) => "keyword".to_string(),
        Value::Vector(items) => {
            if items.is_empty() {
                return "vector (empty)".to_string();
            }
            let sample: Vec<&Value> = items.iter().take(8).collect();
            let first = sample[0].type_name();
            let uniform = sample.iter().all(|v| v.type_name() == first);
            let element = if uniform { first } else { "mixed" };
            format!("vector of {} ({} items)", element, items.len())
        }
        Value::Set(items) => format!("set ({} items)", items.len()),
        Value::Map(m) => {
            let keys: Vec<String> = m.keys().take(8).map(|k| k.print_string()).collect();
            format!("map with keys {}", keys.join(", "))
        }
        other => other.type_name().to_string(),
    }
}

/// One line per ctx entry: `ctx/<name>  ; <type>, sample: <truncated>`.
pub fn render_data_inventory(ctx: &IndexMap<String, Value>, sample_budget: usize) -> String {
    let mut lines = Vec::with_capacity(ctx.len());
    for (name, value) in ctx {
        lines.push(format!(
            "ctx/{}  ; {}, sample: {}",
            name,
            infer_type(value),
            value.truncated(sample_budget)
        ));
    }
    lines.join("\n")
}

pub fn render_tool_inventory(tools: &ToolSet) -> String {
    tools
        .values()
        .map(|t| t.inventory_line())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_expected_output(signature: &Signature) -> String {
    format!("Expected return: {}", render_type(&signature.ret))
}

/// The system prompt: language spec + mode addon + output format.
pub fn assemble_system(templates: &PromptTemplates, single_shot: bool) -> String {
    let addon = if single_shot {
        &templates.single_shot_addon
    } else {
        &templates.multi_turn_addon
    };
    format!(
        "{}\n\n{}\n\n{}",
        templates.base_spec, addon, templates.output_format
    )
}

/// The per-turn user message: inventories, expected output, mission and
/// optional feedback from the previous turn.
pub fn assemble_user(
    ctx: &IndexMap<String, Value>,
    tools: &ToolSet,
    signature: Option<&Signature>,
    mission: &str,
    feedback: Option<&str>,
    sample_budget: usize,
) -> String {
    let mut sections = Vec::new();
    if !ctx.is_empty() {
        sections.push(format!(
            "Available data:\n{}",
            render_data_inventory(ctx, sample_budget)
        ));
    }
    if !tools.is_empty() {
        sections.push(format!("Available tools:\n{}", render_tool_inventory(tools)));
    }
    if let Some(sig) = signature {
        sections.push(render_expected_output(sig));
    }
    sections.push(format!("Mission:\n{}", mission));
    if let Some(feedback) = feedback {
        sections.push(feedback.to_string());
    }
    sections.join("\n\n")
}
