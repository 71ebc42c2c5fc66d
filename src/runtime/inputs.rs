/// Node input resolution
///
/// A node's input is built from its static config, the outputs of its direct
/// predecessors, and `{{nodeId.field}}` interpolation against the whole
/// execution context. When the node declares an input schema the merged
/// upstream data is scored against it.

use crate::blocks::BlockInput;
use crate::condition::EvalContext;
use crate::path::{display_value, whole_template};
use crate::schema::{compare_schemas, infer_schema, CompatibilityResult};
use crate::workflow::{ExecutionPlan, Node};
use regex::Regex;
use serde_json::{json, Map, Value};
use std::sync::OnceLock;

/// Matches one `{{ reference }}` inside a larger string
fn template_regex() -> &'static Regex {
    static TEMPLATE_REGEX: OnceLock<Regex> = OnceLock::new();
    TEMPLATE_REGEX.get_or_init(|| Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").expect("valid regex"))
}

/// Interpolate every string inside `value`
///
/// A string that is exactly one template takes the referenced value with its
/// JSON type (null when unresolved). Templates embedded in longer text are
/// rendered as text, unresolved ones as the empty string.
pub fn interpolate(value: &Value, eval: &EvalContext<'_>) -> Value {
    match value {
        Value::String(text) => interpolate_str(text, eval),
        Value::Array(items) => Value::Array(items.iter().map(|v| interpolate(v, eval)).collect()),
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(key, v)| (key.clone(), interpolate(v, eval)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn interpolate_str(text: &str, eval: &EvalContext<'_>) -> Value {
    if let Some(reference) = whole_template(text) {
        return match eval.resolve_reference(reference) {
            Some(value) => value.clone(),
            None => {
                tracing::warn!(reference, "Unresolved template reference, using null");
                Value::Null
            }
        };
    }

    if !text.contains("{{") {
        return Value::String(text.to_string());
    }

    let rendered = template_regex().replace_all(text, |caps: &regex::Captures| {
        let reference = &caps[1];
        match eval.resolve_reference(reference) {
            Some(value) => display_value(value),
            None => {
                tracing::warn!(reference, "Unresolved template reference, using empty text");
                String::new()
            }
        }
    });
    Value::String(rendered.into_owned())
}

/// Build the handler input for `node` from the current context snapshot
pub fn resolve_input(node: &Node, plan: &ExecutionPlan, snapshot: &[(String, Value)]) -> BlockInput {
    let eval = EvalContext::new(snapshot);

    let upstream: Map<String, Value> = plan
        .predecessors(&node.id)
        .into_iter()
        .filter_map(|pred| eval.output(pred).map(|output| (pred.to_string(), output.clone())))
        .collect();

    BlockInput::new(interpolate(&node.config, &eval), upstream)
}

/// Score the merged upstream data against the node's declared input schema
pub fn reconcile(node: &Node, input: &BlockInput) -> Option<CompatibilityResult> {
    let declared = node.input_schema.as_ref()?;
    let inferred = infer_schema(&input.merged_upstream(), &[]);
    Some(compare_schemas(&inferred, declared))
}

/// Snapshot persisted as `NodeExecution.input`
pub fn input_snapshot(input: &BlockInput, compatibility: Option<&CompatibilityResult>) -> Value {
    let mut snapshot = json!({
        "config": input.config,
        "upstream": input.upstream,
    });
    if let (Some(result), Some(fields)) = (compatibility, snapshot.as_object_mut()) {
        fields.insert("compatibility".to_string(), json!(result));
    }
    snapshot
}
