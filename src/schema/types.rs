/// Schema and compatibility type definitions
///
/// Shapes inferred from node outputs (or declared by consumers) and the result
/// of comparing a producer's shape against a consumer's expectation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Primary JSON type of a schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    Object,
    Array,
    String,
    Number,
    Boolean,
    Null,
    Unknown,
}

impl SchemaType {
    /// JSON type of a concrete value
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Object(_) => SchemaType::Object,
            Value::Array(_) => SchemaType::Array,
            Value::String(_) => SchemaType::String,
            Value::Number(_) => SchemaType::Number,
            Value::Bool(_) => SchemaType::Boolean,
            Value::Null => SchemaType::Null,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaType::Object => "object",
            SchemaType::Array => "array",
            SchemaType::String => "string",
            SchemaType::Number => "number",
            SchemaType::Boolean => "boolean",
            SchemaType::Null => "null",
            SchemaType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inferred or declared data shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDefinition {
    #[serde(rename = "type")]
    pub schema_type: SchemaType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, SchemaProperty>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<SchemaDefinition>>,
    /// Confidence in `[0, 1]`; declared schemas default to 1
    #[serde(default = "full_confidence")]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub examples: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// True when null or missing samples were seen alongside typed ones
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub nullable: bool,
}

fn full_confidence() -> f64 {
    1.0
}

impl SchemaDefinition {
    /// Bare schema of the given type with full confidence
    pub fn of_type(schema_type: SchemaType) -> Self {
        Self {
            schema_type,
            properties: None,
            items: None,
            confidence: 1.0,
            examples: None,
            pattern: None,
            minimum: None,
            maximum: None,
            format: None,
            nullable: false,
        }
    }

    /// Schema with no information at all
    pub fn unknown() -> Self {
        Self {
            confidence: 0.0,
            ..Self::of_type(SchemaType::Unknown)
        }
    }

    /// Builder helper: add a property to an object schema
    pub fn with_property(mut self, name: &str, schema: SchemaDefinition, required: bool) -> Self {
        self.properties
            .get_or_insert_with(BTreeMap::new)
            .insert(name.to_string(), SchemaProperty { schema, required });
        self
    }

    /// Builder helper: set the element schema of an array schema
    pub fn with_items(mut self, items: SchemaDefinition) -> Self {
        self.items = Some(Box::new(items));
        self
    }
}

/// Object property: a schema plus whether the field must be present
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaProperty {
    #[serde(flatten)]
    pub schema: SchemaDefinition,
    #[serde(default)]
    pub required: bool,
}

/// Kind of compatibility problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    MissingField,
    TypeMismatch,
    FormatMismatch,
    ValidationError,
}

/// Issue severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// A single problem found while comparing schemas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompatibilityIssue {
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    /// Dotted path of the offending field (`""` is the root)
    pub field: String,
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<SchemaType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_type: Option<SchemaType>,
}

/// Kind of suggested transformation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionType {
    FieldMapping,
    TypeConversion,
    FormatTransformation,
}

/// A transformation that would repair an issue; `transformation` is consumed by data mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformationSuggestion {
    pub id: String,
    #[serde(rename = "type")]
    pub suggestion_type: SuggestionType,
    pub confidence: f64,
    pub description: String,
    pub transformation: Value,
}

/// Outcome of comparing a source schema against a target schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompatibilityResult {
    pub score: f64,
    pub issues: Vec<CompatibilityIssue>,
    pub suggestions: Vec<TransformationSuggestion>,
    pub auto_fixable: bool,
}
