/// Data transform block: reshape upstream outputs into a new object
///
/// `{mappings: {outField: expr}}`. A string `expr` starting with `$` is a JSON
/// path evaluated against the merged upstream object, a `{{nodeId.field}}`
/// template reads the execution context, anything else is copied as a literal.

use super::{BlockHandler, BlockInput, NodeContext};
use crate::error::NodeError;
use crate::path::whole_template;
use async_trait::async_trait;
use serde_json::{Map, Value};

pub struct DataTransformBlock;

fn mappings(config: &Value) -> Result<&Map<String, Value>, NodeError> {
    config
        .get("mappings")
        .and_then(Value::as_object)
        .ok_or_else(|| NodeError::config("'mappings' must be an object of outField -> expression"))
}

/// Evaluate a JSON path; no match is null, one match is the value, more is an array
fn select_path(source: &Value, path: &str) -> Result<Value, NodeError> {
    let matches = jsonpath_lib::select(source, path)
        .map_err(|e| NodeError::config(format!("invalid JSON path '{}': {:?}", path, e)))?;

    Ok(match matches.as_slice() {
        [] => Value::Null,
        [single] => (*single).clone(),
        many => Value::Array(many.iter().map(|v| (*v).clone()).collect()),
    })
}

#[async_trait]
impl BlockHandler for DataTransformBlock {
    fn block_type(&self) -> &str {
        "data_transform"
    }

    fn description(&self) -> &str {
        "Builds a new object from JSON paths, templates and literals"
    }

    fn validate_config(&self, config: &Value) -> Result<(), NodeError> {
        let mappings = mappings(config)?;
        let empty = Value::Object(Map::new());
        for (field, expr) in mappings {
            if let Some(path) = expr.as_str().filter(|s| s.starts_with('$')) {
                select_path(&empty, path)
                    .map_err(|e| NodeError::config(format!("mapping '{}': {}", field, e)))?;
            }
        }
        Ok(())
    }

    async fn execute(&self, input: &BlockInput, ctx: &NodeContext) -> Result<Value, NodeError> {
        let source = input.merged_upstream();
        let eval = ctx.eval_context();
        let mut output = Map::new();

        for (field, expr) in mappings(&input.config)? {
            let value = match expr.as_str() {
                Some(path) if path.starts_with('$') => select_path(&source, path)?,
                Some(text) => match whole_template(text) {
                    Some(reference) => eval.resolve_reference(reference).cloned().unwrap_or(Value::Null),
                    None => expr.clone(),
                },
                None => expr.clone(),
            };
            output.insert(field.clone(), value);
        }

        Ok(Value::Object(output))
    }
}
