//! JSON Schema validation of function input and output.

use jsonschema::JSONSchema;
use serde_json::Value;

/// Whether a schema trivially accepts every value (`None`, `true` or `{}`).
pub fn accepts_anything(schema: Option<&Value>) -> bool {
    match schema {
        None | Some(Value::Bool(true)) => true,
        Some(Value::Object(map)) => map.is_empty(),
        Some(_) => false,
    }
}

/// Validate `instance` against `schema`. Errors are joined into one message.
pub fn validate(schema: Option<&Value>, instance: &Value) -> Result<(), String> {
    let Some(schema) = schema else {
        return Ok(());
    };
    if accepts_anything(Some(schema)) {
        return Ok(());
    }
    let compiled = JSONSchema::compile(schema).map_err(|e| format!("invalid schema: {e}"))?;
    let result = compiled.validate(instance).map_err(|errors| {
        errors
            .map(|e| {
                let path = e.instance_path.to_string();
                if path.is_empty() {
                    e.to_string()
                } else {
                    format!("{path}: {e}")
                }
            })
            .collect::<Vec<_>>()
            .join("; ")
    });
    result
}
