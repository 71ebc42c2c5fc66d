/// Schema compatibility scoring
///
/// Compares a producer (source) schema to a consumer (target) schema,
/// recursively and path-tracked. The score starts at 1 and loses a fixed
/// amount per problem; the final score is clamped to `[0, 1]`.

use super::types::{
    CompatibilityIssue, CompatibilityResult, IssueType, SchemaDefinition, SchemaProperty,
    SchemaType, Severity, SuggestionType, TransformationSuggestion,
};
use serde_json::json;
use std::collections::BTreeMap;

const CONVERTIBLE_MISMATCH_PENALTY: f64 = 0.2;
const INCOMPATIBLE_MISMATCH_PENALTY: f64 = 0.5;
const MISSING_REQUIRED_PENALTY: f64 = 0.3;
const MISSING_OPTIONAL_PENALTY: f64 = 0.1;
const OPTIONAL_FOR_REQUIRED_PENALTY: f64 = 0.1;
const FORMAT_MISMATCH_PENALTY: f64 = 0.1;
const RANGE_PENALTY: f64 = 0.05;

const TYPE_CONVERSION_CONFIDENCE: f64 = 0.8;
const FIELD_MAPPING_CONFIDENCE: f64 = 0.9;
const FORMAT_TRANSFORMATION_CONFIDENCE: f64 = 0.6;

/// Compare `source` against what `target` expects
pub fn compare_schemas(source: &SchemaDefinition, target: &SchemaDefinition) -> CompatibilityResult {
    let mut comparison = Comparison::new();
    comparison.compare(source, target, "");

    let auto_fixable = !comparison.suggestions.is_empty();
    CompatibilityResult {
        score: comparison.score.clamp(0.0, 1.0),
        issues: comparison.issues,
        suggestions: comparison.suggestions,
        auto_fixable,
    }
}

/// Conversion operation that turns `from` into `to`, when one is documented
pub fn conversion_between(from: SchemaType, to: SchemaType) -> Option<&'static str> {
    use SchemaType::*;
    match (from, to) {
        (String, Number) => Some("parse_number"),
        (Number, String) => Some("to_string"),
        (String, Boolean) => Some("parse_boolean"),
        (Boolean, String) => Some("to_string"),
        (String, Object) => Some("parse_json"),
        (Object, String) | (Array, String) => Some("stringify"),
        (Number, Boolean) => Some("number_to_boolean"),
        (Boolean, Number) => Some("boolean_to_number"),
        _ => None,
    }
}

struct Comparison {
    score: f64,
    issues: Vec<CompatibilityIssue>,
    suggestions: Vec<TransformationSuggestion>,
}

impl Comparison {
    fn new() -> Self {
        Self {
            score: 1.0,
            issues: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    fn compare(&mut self, source: &SchemaDefinition, target: &SchemaDefinition, path: &str) {
        if target.schema_type == SchemaType::Unknown {
            return;
        }
        if source.schema_type == SchemaType::Unknown {
            self.issue(
                IssueType::ValidationError,
                path,
                Severity::Info,
                format!("Shape of '{}' could not be inferred", display_path(path)),
                None,
            );
            return;
        }

        if source.schema_type != target.schema_type {
            if source.schema_type == SchemaType::Null && target.nullable {
                return;
            }
            self.type_mismatch(source.schema_type, target.schema_type, path);
            return;
        }

        match target.schema_type {
            SchemaType::Object => {
                if let Some(target_props) = &target.properties {
                    let empty = BTreeMap::new();
                    let source_props = source.properties.as_ref().unwrap_or(&empty);
                    self.compare_objects(source_props, target_props, path);
                }
            }
            SchemaType::Array => {
                if let (Some(source_items), Some(target_items)) = (&source.items, &target.items) {
                    self.compare(source_items, target_items, &format!("{}[]", path));
                }
            }
            SchemaType::String => self.compare_formats(source, target, path),
            SchemaType::Number => self.compare_ranges(source, target, path),
            _ => {}
        }
    }

    fn type_mismatch(&mut self, from: SchemaType, to: SchemaType, path: &str) {
        let types = Some((from, to));
        match conversion_between(from, to) {
            Some(operation) => {
                self.score -= CONVERTIBLE_MISMATCH_PENALTY;
                self.issue(
                    IssueType::TypeMismatch,
                    path,
                    Severity::Warning,
                    format!("'{}' is {} but {} is expected (convertible)", display_path(path), from, to),
                    types,
                );
                self.suggest(
                    SuggestionType::TypeConversion,
                    TYPE_CONVERSION_CONFIDENCE,
                    format!("Convert '{}' from {} to {}", display_path(path), from, to),
                    json!({
                        "field": path,
                        "fromType": from,
                        "toType": to,
                        "operation": operation,
                    }),
                );
            }
            None => {
                self.score -= INCOMPATIBLE_MISMATCH_PENALTY;
                self.issue(
                    IssueType::TypeMismatch,
                    path,
                    Severity::Error,
                    format!("'{}' is {} but {} is expected", display_path(path), from, to),
                    types,
                );
            }
        }
    }

    fn compare_objects(
        &mut self,
        source: &BTreeMap<String, SchemaProperty>,
        target: &BTreeMap<String, SchemaProperty>,
        path: &str,
    ) {
        for (target_name, target_prop) in target {
            let field_path = join_path(path, target_name);

            let Some((source_name, source_prop)) = find_matching_property(source, target_name) else {
                if target_prop.required {
                    self.score -= MISSING_REQUIRED_PENALTY;
                    self.issue(
                        IssueType::MissingField,
                        &field_path,
                        Severity::Error,
                        format!("Required field '{}' is missing", field_path),
                        Some((SchemaType::Unknown, target_prop.schema.schema_type)),
                    );
                } else {
                    self.score -= MISSING_OPTIONAL_PENALTY;
                    self.issue(
                        IssueType::MissingField,
                        &field_path,
                        Severity::Warning,
                        format!("Optional field '{}' is missing", field_path),
                        Some((SchemaType::Unknown, target_prop.schema.schema_type)),
                    );
                }
                continue;
            };

            if source_name != target_name {
                let source_path = join_path(path, source_name);
                self.suggest(
                    SuggestionType::FieldMapping,
                    FIELD_MAPPING_CONFIDENCE,
                    format!("Map '{}' to '{}'", source_path, field_path),
                    json!({ "from": source_path, "to": field_path }),
                );
            }

            if target_prop.required && !source_prop.required {
                self.score -= OPTIONAL_FOR_REQUIRED_PENALTY;
                self.issue(
                    IssueType::ValidationError,
                    &field_path,
                    Severity::Warning,
                    format!("'{}' is required but not always present in the source", field_path),
                    None,
                );
            }

            if source_prop.schema != target_prop.schema {
                self.compare(&source_prop.schema, &target_prop.schema, &field_path);
            }
        }
    }

    fn compare_formats(&mut self, source: &SchemaDefinition, target: &SchemaDefinition, path: &str) {
        let Some(expected) = &target.format else {
            return;
        };
        if source.format.as_ref() == Some(expected) {
            return;
        }

        self.score -= FORMAT_MISMATCH_PENALTY;
        let found = source.format.as_deref().unwrap_or("free text");
        self.issue(
            IssueType::FormatMismatch,
            path,
            Severity::Warning,
            format!("'{}' is {} but {} format is expected", display_path(path), found, expected),
            Some((SchemaType::String, SchemaType::String)),
        );
        self.suggest(
            SuggestionType::FormatTransformation,
            FORMAT_TRANSFORMATION_CONFIDENCE,
            format!("Reformat '{}' as {}", display_path(path), expected),
            json!({ "field": path, "fromFormat": source.format, "toFormat": expected }),
        );
    }

    fn compare_ranges(&mut self, source: &SchemaDefinition, target: &SchemaDefinition, path: &str) {
        if let (Some(found), Some(bound)) = (source.minimum, target.minimum) {
            if found < bound {
                self.score -= RANGE_PENALTY;
                self.issue(
                    IssueType::ValidationError,
                    path,
                    Severity::Info,
                    format!("'{}' observed {} below minimum {}", display_path(path), found, bound),
                    None,
                );
            }
        }
        if let (Some(found), Some(bound)) = (source.maximum, target.maximum) {
            if found > bound {
                self.score -= RANGE_PENALTY;
                self.issue(
                    IssueType::ValidationError,
                    path,
                    Severity::Info,
                    format!("'{}' observed {} above maximum {}", display_path(path), found, bound),
                    None,
                );
            }
        }
    }

    fn issue(
        &mut self,
        issue_type: IssueType,
        path: &str,
        severity: Severity,
        message: String,
        types: Option<(SchemaType, SchemaType)>,
    ) {
        self.issues.push(CompatibilityIssue {
            issue_type,
            field: path.to_string(),
            severity,
            message,
            source_type: types.map(|(from, _)| from),
            target_type: types.map(|(_, to)| to),
        });
    }

    fn suggest(
        &mut self,
        suggestion_type: SuggestionType,
        confidence: f64,
        description: String,
        transformation: serde_json::Value,
    ) {
        self.suggestions.push(TransformationSuggestion {
            id: format!("suggestion-{}", self.suggestions.len() + 1),
            suggestion_type,
            confidence,
            description,
            transformation,
        });
    }
}

/// Exact name, then case-insensitive name, then substring containment either way
fn find_matching_property<'a>(
    source: &'a BTreeMap<String, SchemaProperty>,
    target_name: &str,
) -> Option<(&'a String, &'a SchemaProperty)> {
    if let Some(found) = source.get_key_value(target_name) {
        return Some(found);
    }

    let wanted = target_name.to_lowercase();
    if let Some(found) = source.iter().find(|(name, _)| name.to_lowercase() == wanted) {
        return Some(found);
    }

    source.iter().find(|(name, _)| {
        let candidate = name.to_lowercase();
        !candidate.is_empty() && (candidate.contains(&wanted) || wanted.contains(&candidate))
    })
}

fn join_path(parent: &str, child: &str) -> String {
    if parent.is_empty() {
        child.to_string()
    } else {
        format!("{}.{}", parent, child)
    }
}

fn display_path(path: &str) -> &str {
    if path.is_empty() {
        "<root>"
    } else {
        path
    }
}
