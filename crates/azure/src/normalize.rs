//! Location and tag handling shared by every resource kind.

use serde_json::{Map, Value as Json};

use r2arm_core::schema::CustomCoercion;
use r2arm_core::{Attributes, Value};

pub const MAX_TAGS: usize = 50;
pub const MAX_TAG_KEY_LEN: usize = 512;
pub const MAX_TAG_VALUE_LEN: usize = 256;

/// ARM reports locations as lowercase names without spaces ("West US" is "westus").
pub fn normalize_location(location: &str) -> String {
    location.replace(' ', "").to_lowercase()
}

fn expand_location(value: &Value) -> Result<Json, String> {
    match value.as_str() {
        Some(location) if !location.trim().is_empty() => Ok(Json::String(normalize_location(location))),
        Some(_) => Err("must not be empty".to_owned()),
        None => Err(format!("expected a string, found a {}", value.type_name())),
    }
}

fn flatten_location(json: &Json) -> Result<Value, String> {
    json.as_str()
        .map(|location| Value::from(normalize_location(location)))
        .ok_or_else(|| format!("expected a string, found {json}"))
}

pub static LOCATION: CustomCoercion = CustomCoercion {
    name: "location",
    expand: expand_location,
    flatten: flatten_location,
    absent: None,
};

pub fn expand_tags(value: &Value) -> Result<Json, String> {
    let tags = value
        .as_block()
        .ok_or_else(|| format!("expected a map of tags, found a {}", value.type_name()))?;
    if tags.len() > MAX_TAGS {
        return Err(format!("a maximum of {MAX_TAGS} tags can be applied to each resource, found {}", tags.len()));
    }

    let mut out = Map::new();
    for (key, value) in tags {
        if key.len() > MAX_TAG_KEY_LEN {
            return Err(format!("tag key {key:?} exceeds the maximum length of {MAX_TAG_KEY_LEN}"));
        }
        let value = match value {
            Value::String(s) => s.clone(),
            Value::Int(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            other => return Err(format!("tag {key:?} must be a string, found a {}", other.type_name())),
        };
        if value.len() > MAX_TAG_VALUE_LEN {
            return Err(format!("value of tag {key:?} exceeds the maximum length of {MAX_TAG_VALUE_LEN}"));
        }
        out.insert(key.clone(), Json::String(value));
    }
    Ok(Json::Object(out))
}

pub fn flatten_tags(json: &Json) -> Result<Value, String> {
    let tags = json.as_object().ok_or_else(|| format!("expected an object, found {json}"))?;
    let mut out = Attributes::new();
    for (key, value) in tags {
        let value = match value {
            Json::String(s) => s.clone(),
            Json::Null => String::new(),
            other => other.to_string(),
        };
        out.insert(key.clone(), Value::String(value));
    }
    Ok(Value::Block(out))
}

fn no_tags() -> Value {
    Value::Block(Attributes::new())
}

pub static TAGS: CustomCoercion = CustomCoercion {
    name: "tags",
    expand: expand_tags,
    flatten: flatten_tags,
    absent: Some(no_tags),
};
