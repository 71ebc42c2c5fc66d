/// Schema inference from sample values
///
/// The primary type is a majority vote over non-null samples (ties go to the
/// type seen first). Objects union their keys, arrays infer one element schema
/// from all elements, strings get a best-effort format and a fixed-length
/// pattern, numbers record their observed range.

use super::types::{SchemaDefinition, SchemaProperty, SchemaType};
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

/// A key is required when present in at least `NUMERATOR / DENOMINATOR` of object samples (80%)
pub const REQUIRED_RATIO_NUMERATOR: usize = 4;
pub const REQUIRED_RATIO_DENOMINATOR: usize = 5;

/// Number of distinct examples kept on primitive schemas
const MAX_EXAMPLES: usize = 3;

/// Confidence multiplier applied to the element schema of mixed-type arrays
const HETEROGENEOUS_ITEMS_PENALTY: f64 = 0.5;

/// Infer a schema for `value`, or from `samples` when any are given
pub fn infer_schema(value: &Value, samples: &[Value]) -> SchemaDefinition {
    if samples.is_empty() {
        infer_from_samples(std::slice::from_ref(value))
    } else {
        infer_from_samples(samples)
    }
}

/// Infer a schema from a sample set
pub fn infer_from_samples(samples: &[Value]) -> SchemaDefinition {
    let refs: Vec<&Value> = samples.iter().collect();
    infer_refs(&refs)
}

/// Confidence driven purely by how many samples backed the inference
pub fn confidence_for(sample_count: usize) -> f64 {
    match sample_count {
        0 => 0.0,
        1 => 0.7,
        2..=4 => 0.8,
        _ => 0.95,
    }
}

fn infer_refs(samples: &[&Value]) -> SchemaDefinition {
    let present: Vec<&Value> = samples.iter().copied().filter(|v| !v.is_null()).collect();
    let saw_null = present.len() < samples.len();

    if present.is_empty() {
        if !saw_null {
            return SchemaDefinition::unknown();
        }
        let mut schema = SchemaDefinition::of_type(SchemaType::Null);
        schema.confidence = confidence_for(samples.len());
        schema.nullable = true;
        return schema;
    }

    let primary = primary_type(&present);
    let typed: Vec<&Value> = present
        .iter()
        .copied()
        .filter(|v| SchemaType::of(v) == primary)
        .collect();

    let mut schema = match primary {
        SchemaType::Object => infer_object(&typed),
        SchemaType::Array => infer_array(&typed),
        SchemaType::String => infer_string(&typed),
        SchemaType::Number => infer_number(&typed),
        other => SchemaDefinition::of_type(other),
    };
    schema.confidence = confidence_for(present.len());
    schema.nullable = saw_null;
    schema
}

/// Majority vote with ties broken by first appearance
fn primary_type(values: &[&Value]) -> SchemaType {
    let mut counts: HashMap<SchemaType, usize> = HashMap::new();
    let mut first_seen: Vec<SchemaType> = Vec::new();

    for value in values {
        let ty = SchemaType::of(value);
        let count = counts.entry(ty).or_insert(0);
        if *count == 0 {
            first_seen.push(ty);
        }
        *count += 1;
    }

    let mut best = SchemaType::Unknown;
    let mut best_count = 0;
    for ty in first_seen {
        let count = counts[&ty];
        if count > best_count {
            best = ty;
            best_count = count;
        }
    }
    best
}

fn infer_object(samples: &[&Value]) -> SchemaDefinition {
    let total = samples.len();
    let mut collected: BTreeMap<String, Vec<&Value>> = BTreeMap::new();

    for sample in samples {
        if let Value::Object(map) = sample {
            for (key, value) in map {
                collected.entry(key.clone()).or_default().push(value);
            }
        }
    }

    let properties = collected
        .into_iter()
        .map(|(key, values)| {
            let required =
                values.len() * REQUIRED_RATIO_DENOMINATOR >= total * REQUIRED_RATIO_NUMERATOR;
            let property = SchemaProperty {
                schema: infer_refs(&values),
                required,
            };
            (key, property)
        })
        .collect();

    SchemaDefinition {
        properties: Some(properties),
        ..SchemaDefinition::of_type(SchemaType::Object)
    }
}

fn infer_array(samples: &[&Value]) -> SchemaDefinition {
    let elements: Vec<&Value> = samples
        .iter()
        .filter_map(|sample| sample.as_array())
        .flatten()
        .collect();

    let mut distinct_types: Vec<SchemaType> = Vec::new();
    for element in elements.iter().filter(|e| !e.is_null()) {
        let ty = SchemaType::of(element);
        if !distinct_types.contains(&ty) {
            distinct_types.push(ty);
        }
    }

    let items = if distinct_types.len() > 1 {
        let mut degraded = SchemaDefinition::of_type(SchemaType::Unknown);
        degraded.confidence = confidence_for(elements.len()) * HETEROGENEOUS_ITEMS_PENALTY;
        degraded
    } else {
        infer_refs(&elements)
    };

    SchemaDefinition::of_type(SchemaType::Array).with_items(items)
}

fn infer_string(samples: &[&Value]) -> SchemaDefinition {
    let texts: Vec<&str> = samples.iter().filter_map(|v| v.as_str()).collect();
    let mut schema = SchemaDefinition::of_type(SchemaType::String);

    schema.format = detect_format(&texts).map(str::to_string);

    if let Some(first) = texts.first() {
        let length = first.chars().count();
        if texts.iter().all(|t| t.chars().count() == length) {
            schema.pattern = Some(format!("^.{{{}}}$", length));
        }
    }

    schema.examples = collect_examples(samples);
    schema
}

fn infer_number(samples: &[&Value]) -> SchemaDefinition {
    let numbers: Vec<f64> = samples.iter().filter_map(|v| v.as_f64()).collect();
    let mut schema = SchemaDefinition::of_type(SchemaType::Number);

    schema.minimum = numbers.iter().copied().reduce(f64::min);
    schema.maximum = numbers.iter().copied().reduce(f64::max);
    schema.examples = collect_examples(samples);
    schema
}

fn collect_examples(samples: &[&Value]) -> Option<Vec<Value>> {
    let mut examples: Vec<Value> = Vec::new();
    for sample in samples {
        if examples.len() == MAX_EXAMPLES {
            break;
        }
        if !examples.contains(sample) {
            examples.push((*sample).clone());
        }
    }
    (!examples.is_empty()).then_some(examples)
}

/// Format shared by every sample, checked in order email, url, date
fn detect_format(texts: &[&str]) -> Option<&'static str> {
    if texts.is_empty() {
        return None;
    }

    format_matchers()
        .iter()
        .find(|(_, regex)| texts.iter().all(|t| regex.is_match(t)))
        .map(|(name, _)| *name)
}

fn format_matchers() -> &'static [(&'static str, Regex); 3] {
    static MATCHERS: OnceLock<[(&'static str, Regex); 3]> = OnceLock::new();
    MATCHERS.get_or_init(|| {
        [
            (
                "email",
                Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"),
            ),
            (
                "url",
                Regex::new(r"^https?://[^\s/$.?#][^\s]*$").expect("valid url regex"),
            ),
            (
                "date",
                Regex::new(r"^\d{4}-\d{2}-\d{2}([T ][0-9:.]+(Z|[+-]\d{2}:?\d{2})?)?$")
                    .expect("valid date regex"),
            ),
        ]
    })
}
