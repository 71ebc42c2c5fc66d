/// Schema Inference Engine
///
/// Stateless helpers used by the coordinator to reconcile what a producer node
/// emits with what a consumer node declares it expects:
/// - `infer_schema` / `infer_from_samples` build a `SchemaDefinition` from data
/// - `compare_schemas` scores a source schema against a target schema
///
/// Low scores are a signal, never an error; the caller decides what to do.

// Schema, issue and suggestion types
pub mod types;

// Inference from sample values
pub mod infer;

// Compatibility scoring and suggestions
pub mod compare;

pub use compare::compare_schemas;
pub use infer::{infer_from_samples, infer_schema};
pub use types::{
    CompatibilityIssue, CompatibilityResult, IssueType, SchemaDefinition, SchemaProperty,
    SchemaType, Severity, SuggestionType, TransformationSuggestion,
};
