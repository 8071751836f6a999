use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use thiserror::Error;

use crate::error::Error;

pub type Attributes = BTreeMap<String, Value>;

/// One configuration value: a scalar, an ordered list, or a nested block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    String(String),
    List(Vec<Value>),
    Block(Attributes),
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("unsupported configuration value {0}")]
pub struct UnsupportedValue(pub Json);

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "number",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Block(_) => "block",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_block(&self) -> Option<&Attributes> {
        match self {
            Value::Block(block) => Some(block),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Json {
        match self {
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(n) => Json::from(*n),
            Value::String(s) => Json::String(s.clone()),
            Value::List(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Block(block) => Json::Object(block.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()),
        }
    }
}

impl TryFrom<Json> for Value {
    type Error = UnsupportedValue;

    fn try_from(json: Json) -> Result<Self, Self::Error> {
        match json {
            Json::Bool(b) => Ok(Value::Bool(b)),
            Json::Number(n) => n.as_i64().map(Value::Int).ok_or(UnsupportedValue(Json::Number(n))),
            Json::String(s) => Ok(Value::String(s)),
            Json::Array(items) => items.into_iter().map(Value::try_from).collect::<Result<_, _>>().map(Value::List),
            Json::Object(map) => map
                .into_iter()
                .map(|(k, v)| Value::try_from(v).map(|v| (k, v)))
                .collect::<Result<_, _>>()
                .map(Value::Block),
            Json::Null => Err(UnsupportedValue(Json::Null)),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self { Value::Bool(b) }
}
impl From<i64> for Value {
    fn from(n: i64) -> Self { Value::Int(n) }
}
impl From<i32> for Value {
    fn from(n: i32) -> Self { Value::Int(n.into()) }
}
impl From<&str> for Value {
    fn from(s: &str) -> Self { Value::String(s.to_owned()) }
}
impl From<String> for Value {
    fn from(s: String) -> Self { Value::String(s) }
}
impl From<Attributes> for Value {
    fn from(block: Attributes) -> Self { Value::Block(block) }
}
impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self { Value::List(items.into_iter().map(Into::into).collect()) }
}

/// The caller-owned state of one resource instance: the declared attributes and,
/// once the resource exists remotely, its id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default)]
    attributes: Attributes,
}

impl ResourceData {
    pub fn new(attributes: Attributes) -> Self {
        Self { id: None, attributes }
    }

    /// Builds configuration from a JSON object; handy for fixtures and for stack files.
    pub fn from_json(json: Json) -> Result<Self, UnsupportedValue> {
        match Value::try_from(json)? {
            Value::Block(attributes) => Ok(Self::new(attributes)),
            other => Err(UnsupportedValue(other.to_json())),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = Some(id.into());
    }

    pub fn clear_id(&mut self) {
        self.id = None;
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.attributes.remove(key)
    }

    pub fn get_str(&self, key: &str) -> Result<Option<&str>, Error> {
        self.typed(key, Value::as_str, "a string")
    }

    pub fn get_int(&self, key: &str) -> Result<Option<i64>, Error> {
        self.typed(key, Value::as_int, "a number")
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, Error> {
        self.typed(key, Value::as_bool, "a bool")
    }

    pub fn get_list(&self, key: &str) -> Result<Option<&[Value]>, Error> {
        self.typed(key, Value::as_list, "a list")
    }

    pub fn require_str(&self, key: &str) -> Result<&str, Error> {
        self.get_str(key)?.ok_or_else(|| Error::validation(key, "is required"))
    }

    /// Stores the id and the remote's view of the resource in one step.
    ///
    /// Every attribute named in `remote_owned` is replaced by its entry in
    /// `attributes`, or dropped when the remote no longer reports it. Other
    /// attributes (write-only secrets, configuration-only identity) are kept.
    pub fn commit(&mut self, id: String, attributes: Attributes, remote_owned: &[&str]) {
        self.id = Some(id);
        self.attributes.retain(|key, _| !remote_owned.contains(&key.as_str()));
        self.attributes.extend(attributes);
    }

    /// Forgets the resource entirely: no id and no attributes.
    pub fn clear(&mut self) {
        self.id = None;
        self.attributes.clear();
    }

    fn typed<'a, T>(&'a self, key: &str, pick: impl Fn(&'a Value) -> Option<T>, expected: &str) -> Result<Option<T>, Error> {
        match self.attributes.get(key) {
            None => Ok(None),
            Some(value) => pick(value)
                .map(Some)
                .ok_or_else(|| Error::validation(key, format!("expected {expected}, found a {}", value.type_name()))),
        }
    }
}
