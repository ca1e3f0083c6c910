//! First-non-empty-wins lookups over raw JSON payloads
//!
//! A path is a dotted list of object keys (`aggregate.dominant_emotion`).
//! [`resolve`] probes candidate paths in order and returns the first value
//! that coerces to something non-empty.

use serde_json::Value;

const TAG_OBJECT_KEYS: [&str; 4] = ["name", "label", "tag", "emotion"];
const COMMENT_OBJECT_KEYS: [&str; 3] = ["text", "comment", "body"];

/// Follow a dotted path through nested objects
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(value, |current, key| current.as_object()?.get(key))
}

/// First candidate path whose value `coerce` accepts
pub fn resolve<T>(value: &Value, paths: &[&str], coerce: impl Fn(&Value) -> Option<T>) -> Option<T> {
    paths
        .iter()
        .filter_map(|path| lookup(value, path))
        .find_map(coerce)
}

/// Non-blank text; numbers are rendered as text
pub fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Finite number from a JSON number or a numeric string such as `"85%"`
pub fn number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    }?;
    parsed.is_finite().then_some(parsed)
}

/// Ordered, duplicate-free tag list
///
/// Accepts arrays of strings, arrays of `{name|label|tag|emotion}` objects,
/// or a comma-separated string.
pub fn tags(value: &Value) -> Option<Vec<String>> {
    let raw: Vec<String> = match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::Object(object) => TAG_OBJECT_KEYS
                    .iter()
                    .find_map(|key| object.get(*key).and_then(text)),
                other => text(other),
            })
            .collect(),
        Value::String(s) => s.split(',').map(str::to_string).collect(),
        _ => return None,
    };

    let mut unique: Vec<String> = Vec::with_capacity(raw.len());
    for tag in raw {
        let tag = tag.trim();
        if !tag.is_empty() && !unique.iter().any(|seen| seen == tag) {
            unique.push(tag.to_string());
        }
    }
    (!unique.is_empty()).then_some(unique)
}

/// Ordered comment list; repeats are kept
pub fn comments(value: &Value) -> Option<Vec<String>> {
    let collected: Vec<String> = match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::Object(object) => COMMENT_OBJECT_KEYS
                    .iter()
                    .find_map(|key| object.get(*key).and_then(text)),
                Value::String(_) => text(item),
                _ => None,
            })
            .collect(),
        Value::String(_) => text(value).into_iter().collect(),
        _ => return None,
    };
    (!collected.is_empty()).then_some(collected)
}
