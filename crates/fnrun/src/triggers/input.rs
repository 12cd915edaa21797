//! Trigger input templates.
//!
//! A string leaf that is exactly `{{path}}` is replaced by the JSON value at
//! `path` (keeping its type). Placeholders embedded in longer strings are
//! interpolated as text. Unknown paths resolve to `null` / empty text.

use serde_json::{Map, Value};

use crate::types::trigger::template_scope;
use crate::types::{Trigger, TriggerEvent};

/// Effective input for an invocation: explicit `data`, else the resolved
/// template, else the event payload, else `{}`.
pub(crate) fn effective_input(
    trigger: &Trigger,
    event: Option<&TriggerEvent>,
    data: Option<Value>,
) -> Value {
    if let Some(data) = data {
        return data;
    }
    if let Some(template) = &trigger.input {
        let scope = template_scope(trigger, event);
        return resolve_template(template, &scope);
    }
    event
        .map(TriggerEvent::payload)
        .unwrap_or_else(|| Value::Object(Map::new()))
}

pub(crate) fn resolve_template(template: &Value, scope: &Value) -> Value {
    match template {
        Value::String(text) => resolve_string(text, scope),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| resolve_template(item, scope))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), resolve_template(value, scope)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn lookup<'a>(scope: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(scope, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

fn resolve_string(text: &str, scope: &Value) -> Value {
    let trimmed = text.trim();
    if let Some(path) = trimmed
        .strip_prefix("{{")
        .and_then(|rest| rest.strip_suffix("}}"))
    {
        if !path.contains("{{") && !path.contains("}}") {
            return lookup(scope, path.trim()).cloned().unwrap_or(Value::Null);
        }
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        let Some(len) = rest[start + 2..].find("}}") else {
            break;
        };
        out.push_str(&rest[..start]);
        let path = rest[start + 2..start + 2 + len].trim();
        match lookup(scope, path) {
            Some(Value::String(s)) => out.push_str(s),
            Some(Value::Null) | None => {}
            Some(other) => out.push_str(&other.to_string()),
        }
        rest = &rest[start + 2 + len + 2..];
    }
    out.push_str(rest);
    Value::String(out)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::types::TriggerSpec;

    fn queue_trigger() -> Trigger {
        Trigger::new(TriggerSpec::queue("jobs"))
            .with_id("t-1")
            .with_input(json!({
                "instructions": "summarize",
                "input": "{{event.item}}",
                "triggerId": "{{trigger.id}}",
                "label": "item at {{event.cursor}} from {{event.queue}}",
            }))
    }

    #[test]
    fn test_template_preserves_types_and_interpolates() {
        let event = TriggerEvent::Queue {
            queue: "jobs".into(),
            item: json!({"text": "hello"}),
            cursor: 3,
        };
        let input = effective_input(&queue_trigger(), Some(&event), None);
        assert_eq!(
            input,
            json!({
                "instructions": "summarize",
                "input": {"text": "hello"},
                "triggerId": "t-1",
                "label": "item at 3 from jobs",
            })
        );
    }

    #[test]
    fn test_explicit_data_wins() {
        let input = effective_input(&queue_trigger(), None, Some(json!({"direct": true})));
        assert_eq!(input, json!({"direct": true}));
    }

    #[test]
    fn test_event_payload_without_template() {
        let trigger = Trigger::new(TriggerSpec::timer("* * * * *"));
        let input = effective_input(&trigger, Some(&TriggerEvent::Timer { tick: 42 }), None);
        assert_eq!(input, json!({"tick": 42}));
        assert_eq!(effective_input(&trigger, None, None), json!({}));
    }

    #[test]
    fn test_unknown_path_is_null() {
        let scope = json!({"event": {}});
        assert_eq!(resolve_template(&json!("{{event.missing}}"), &scope), Value::Null);
        assert_eq!(
            resolve_template(&json!("x{{event.missing}}y"), &scope),
            json!("xy")
        );
    }
}
