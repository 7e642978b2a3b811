//! JSON context tree that expressions and templates read from

use serde_json::{json, Map, Value};

use crate::core::types::Vec2;
use crate::entity::emotion::Emotion;

/// Walk a dotted path; numeric segments index into arrays
pub fn lookup<'a>(root: &'a Value, path: &[String]) -> Option<&'a Value> {
    let mut current = root;
    for segment in path {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Human-facing rendering: whole numbers print without a fraction
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            Some(f) => {
                // Trim float noise for display
                let rounded = format!("{:.4}", f);
                rounded.trim_end_matches('0').trim_end_matches('.').to_string()
            }
            None => n.to_string(),
        },
        other => other.to_string(),
    }
}

pub fn emotion_value(emotion: &Emotion) -> Value {
    json!({
        "valence": emotion.valence,
        "arousal": emotion.arousal,
        "dominance": emotion.dominance,
        "label": emotion.label(),
    })
}

pub fn position_value(position: &Vec2) -> Value {
    json!({ "x": position.x, "y": position.y })
}

/// Mutable context for one trigger firing
///
/// Built once per firing; actions refresh the parts they change so later
/// actions in the same firing observe them.
#[derive(Debug, Clone)]
pub struct FiringContext {
    root: Value,
}

impl FiringContext {
    pub fn new(mut root: Map<String, Value>) -> Self {
        root.entry("vars").or_insert_with(|| Value::Object(Map::new()));
        Self {
            root: Value::Object(root),
        }
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn get(&self, dotted: &str) -> Option<&Value> {
        let path: Vec<String> = dotted.split('.').map(str::to_string).collect();
        lookup(&self.root, &path)
    }

    fn root_map(&mut self) -> Option<&mut Map<String, Value>> {
        self.root.as_object_mut()
    }

    pub fn set_var(&mut self, name: &str, value: Value) {
        if let Some(root) = self.root_map() {
            if let Some(Value::Object(vars)) = root.get_mut("vars") {
                vars.insert(name.to_string(), value);
            }
        }
    }

    /// Replace a top-level key
    pub fn insert(&mut self, key: &str, value: Value) {
        if let Some(root) = self.root_map() {
            root.insert(key.to_string(), value);
        }
    }

    /// Update `emotion` and `self.emotion` after an emotion action
    pub fn refresh_emotion(&mut self, emotion: &Emotion) {
        let value = emotion_value(emotion);
        if let Some(root) = self.root_map() {
            if let Some(Value::Object(me)) = root.get_mut("self") {
                me.insert("emotion".into(), value.clone());
            }
            root.insert("emotion".into(), value);
        }
    }

    /// Update `context` and `self.context` after a context write
    pub fn refresh_context(&mut self, context: &Map<String, Value>) {
        let value = Value::Object(context.clone());
        if let Some(root) = self.root_map() {
            if let Some(Value::Object(me)) = root.get_mut("self") {
                me.insert("context".into(), value.clone());
            }
            root.insert("context".into(), value);
        }
    }
}
