//! Parameter object rendering
//!
//! ASL marks a parameter value as a runtime JSONPath lookup by suffixing its
//! key with `.$` and keeping the raw path as the value. This module applies
//! that convention recursively: through nested objects and through objects
//! inside arrays. Bare strings inside arrays have no key to suffix and stay
//! literal.

use serde_json::{Map, Value};

/// True for strings ASL treats as runtime expressions: JSONPath references
/// (`$`, `$.`, `$[`, context paths `$$`) and intrinsic function invocations.
pub fn is_json_path_string(s: &str) -> bool {
    s == "$"
        || s.starts_with("$.")
        || s.starts_with("$[")
        || s.starts_with("$$")
        || (s.starts_with("States.") && s.contains('('))
}

/// Rewrite a parameters object into its rendered ASL form.
pub fn render_object(map: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, value) in map {
        // Keys already carrying the marker pass through untouched.
        if key.ends_with(".$") {
            out.insert(key.clone(), value.clone());
            continue;
        }
        match value {
            Value::String(s) if is_json_path_string(s) => {
                out.insert(format!("{}.$", key), value.clone());
            }
            Value::Object(nested) => {
                out.insert(key.clone(), Value::Object(render_object(nested)));
            }
            Value::Array(items) => {
                out.insert(key.clone(), Value::Array(render_array(items)));
            }
            other => {
                out.insert(key.clone(), other.clone());
            }
        }
    }
    out
}

fn render_array(items: &[Value]) -> Vec<Value> {
    items
        .iter()
        .map(|item| match item {
            Value::Object(nested) => Value::Object(render_object(nested)),
            Value::Array(inner) => Value::Array(render_array(inner)),
            other => other.clone(),
        })
        .collect()
}
