//! Table-driven mapping between flat configuration and nested API bodies.
//!
//! A resource kind is described by a list of [`FieldMapping`]s. Each entry names
//! a configuration attribute, where it lives in the request and response JSON,
//! and how its value is coerced. `expand` and `flatten` walk the same table, so
//! adding a kind adds data rather than another pair of conversion functions.

use serde_json::{Map, Value as Json};

use crate::data::{Attributes, Value};
use crate::error::Error;

/// Which fields a request body carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Every writable field, as for create or a full replace.
    Full,
    /// Only fields that may change on an existing resource.
    Patch,
}

/// A closed set of legal values: configuration spelling paired with the remote spelling.
#[derive(Debug)]
pub struct EnumTable {
    pub name: &'static str,
    pub variants: &'static [(&'static str, &'static str)],
}

impl EnumTable {
    pub fn to_remote(&self, value: &str) -> Option<&'static str> {
        self.variants
            .iter()
            .find(|(config, _)| config.eq_ignore_ascii_case(value))
            .map(|(_, remote)| *remote)
    }

    pub fn from_remote(&self, value: &str) -> Option<&'static str> {
        self.variants
            .iter()
            .find(|(_, remote)| remote.eq_ignore_ascii_case(value))
            .map(|(config, _)| *config)
    }

    pub fn config_values(&self) -> Vec<&'static str> {
        self.variants.iter().map(|(config, _)| *config).collect()
    }
}

/// Conversion hooks for values whose shape is owned by the provider (locations, tags).
#[derive(Debug)]
pub struct CustomCoercion {
    pub name: &'static str,
    pub expand: fn(&Value) -> Result<Json, String>,
    pub flatten: fn(&Json) -> Result<Value, String>,
    /// Value to report when the remote omits the field entirely. Patch bodies
    /// send it for an unset attribute, so removing the last entry takes effect.
    pub absent: Option<fn() -> Value>,
}

#[derive(Debug, Clone, Copy)]
pub enum Coercion {
    String,
    /// A number that must fit the API's 32-bit integer.
    Int32,
    Bool,
    Enum(&'static EnumTable),
    /// A bool carried remotely as a two-valued enum.
    Toggle { on: &'static str, off: &'static str },
    /// A list of strings, each optionally wrapped as `{ item_key: value }`.
    StringList { item_key: Option<&'static str> },
    /// A list of nested blocks, each mapped by its own table relative to the element.
    Blocks(&'static [FieldMapping]),
    Custom(&'static CustomCoercion),
}

#[derive(Debug, Clone, Copy)]
pub enum Fallback {
    Bool(bool),
    Int(i64),
    Str(&'static str),
}

impl Fallback {
    fn to_value(self) -> Value {
        match self {
            Fallback::Bool(b) => Value::Bool(b),
            Fallback::Int(n) => Value::Int(n),
            Fallback::Str(s) => Value::String(s.to_owned()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Check {
    Str(fn(&str) -> Result<(), String>),
    IntRange(i64, i64),
    OneOf(&'static [i64]),
}

impl Check {
    fn run(self, attribute: &str, value: &Value) -> Result<(), Error> {
        let outcome = match (self, value) {
            (Check::Str(rule), Value::String(s)) => rule(s),
            (Check::IntRange(min, max), Value::Int(n)) if !(min..=max).contains(n) => {
                Err(format!("must be between {min} and {max}, got {n}"))
            }
            (Check::OneOf(allowed), Value::Int(n)) if !allowed.contains(n) => Err(format!("must be one of {allowed:?}, got {n}")),
            _ => Ok(()),
        };
        outcome.map_err(|reason| Error::validation(attribute, reason))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldMapping {
    pub attribute: &'static str,
    /// Location in request bodies; empty for attributes that never leave the configuration.
    pub write: &'static [&'static str],
    pub read: &'static [&'static str],
    pub coercion: Coercion,
    pub fallback: Option<Fallback>,
    pub check: Option<Check>,
    pub required: bool,
    /// Excluded from patch bodies; changing it means replacing the resource.
    pub immutable: bool,
    /// Sent but never read back.
    pub write_only: bool,
    /// Read back but never sent; users may not set it.
    pub computed: bool,
    /// The API may normalize this value (e.g. casing), so it is exempt from round-trip equality.
    pub normalized: bool,
}

pub const fn field(attribute: &'static str, path: &'static [&'static str], coercion: Coercion) -> FieldMapping {
    FieldMapping {
        attribute,
        write: path,
        read: path,
        coercion,
        fallback: None,
        check: None,
        required: false,
        immutable: false,
        write_only: false,
        computed: false,
        normalized: false,
    }
}

impl FieldMapping {
    pub const fn read_from(mut self, path: &'static [&'static str]) -> Self {
        self.read = path;
        self
    }

    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub const fn default_to(mut self, fallback: Fallback) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub const fn check(mut self, check: Check) -> Self {
        self.check = Some(check);
        self
    }

    pub const fn immutable(mut self) -> Self {
        self.immutable = true;
        self
    }

    pub const fn write_only(mut self) -> Self {
        self.write_only = true;
        self
    }

    pub const fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    pub const fn normalized(mut self) -> Self {
        self.normalized = true;
        self
    }

    fn writes(&self, mode: WriteMode) -> bool {
        !self.computed && (mode == WriteMode::Full || !self.immutable)
    }

    fn reads(&self) -> bool {
        !self.write_only && !self.read.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Schema {
    pub fields: &'static [FieldMapping],
}

impl Schema {
    pub const fn new(fields: &'static [FieldMapping]) -> Self {
        Self { fields }
    }

    /// Checks a configuration at the boundary: unknown or computed attributes,
    /// missing required ones, value types, enum membership and field rules.
    pub fn validate(&self, attributes: &Attributes) -> Result<(), Error> {
        reject_unsettable(self.fields, attributes, "")?;
        expand_fields(self.fields, attributes, WriteMode::Full, "").map(drop)
    }

    pub fn expand(&self, attributes: &Attributes, mode: WriteMode) -> Result<Json, Error> {
        expand_fields(self.fields, attributes, mode, "").map(Json::Object)
    }

    /// Maps a remote body back to configuration. Absent collections come back as
    /// empty lists, so repeated reads of the same remote state agree.
    pub fn flatten(&self, remote: &Json) -> Result<Attributes, Error> {
        flatten_fields(self.fields, remote, "")
    }

    /// Drops attributes the remote owns, so state read back can be sent again.
    pub fn without_computed(&self, attributes: &Attributes) -> Attributes {
        attributes
            .iter()
            .filter(|(key, _)| !self.fields.iter().any(|f| f.attribute == key.as_str() && f.computed))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Attributes whose value the remote owns: a read replaces them, or drops
    /// them when the remote stops reporting them.
    pub fn remote_attributes(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.fields.iter().filter(|f| f.reads()).map(|f| f.attribute).collect();
        names.dedup();
        names
    }

    /// Attributes that survive `flatten(expand(c))` unchanged.
    pub fn round_trip_attributes(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self
            .fields
            .iter()
            .filter(|f| f.reads() && !f.normalized && !f.computed)
            .map(|f| f.attribute)
            .collect();
        names.dedup();
        names
    }
}

fn reject_unsettable(fields: &[FieldMapping], attributes: &Attributes, prefix: &str) -> Result<(), Error> {
    for key in attributes.keys() {
        let mut mappings = fields.iter().filter(|f| f.attribute == key).peekable();
        if mappings.peek().is_none() {
            return Err(Error::validation(format!("{prefix}{key}"), "unsupported attribute"));
        }
        if mappings.all(|f| f.computed) {
            return Err(Error::validation(format!("{prefix}{key}"), "is computed and cannot be set"));
        }
    }
    Ok(())
}

fn expand_fields(fields: &[FieldMapping], attributes: &Attributes, mode: WriteMode, prefix: &str) -> Result<Map<String, Json>, Error> {
    let mut body = Map::new();
    for field in fields.iter().filter(|f| f.writes(mode)) {
        let path = format!("{prefix}{}", field.attribute);
        let fallback;
        let value = match (attributes.get(field.attribute), field.fallback) {
            (Some(value), _) => value,
            (None, Some(default)) => {
                fallback = default.to_value();
                &fallback
            }
            (None, None) if field.required => return Err(Error::validation(path, "is required")),
            (None, None) => match (mode, absent_value(field)) {
                // a patch that leaves a collection out would keep the remote's entries
                (WriteMode::Patch, Some(empty)) => {
                    fallback = empty;
                    &fallback
                }
                _ => continue,
            },
        };
        let json = expand_value(field, value, &path)?;
        if let Json::Object(nested) = nest(field.write, json) {
            merge_objects(&mut body, nested);
        }
    }
    Ok(body)
}

fn expand_value(field: &FieldMapping, value: &Value, path: &str) -> Result<Json, Error> {
    let json = match field.coercion {
        Coercion::String => Json::String(expect_str(value, path)?.to_owned()),
        Coercion::Int32 => {
            let n = expect(value.as_int(), value, path, "a number")?;
            i32::try_from(n).map_err(|_| Error::validation(path, format!("{n} does not fit a 32-bit integer")))?;
            Json::from(n)
        }
        Coercion::Bool => Json::Bool(expect(value.as_bool(), value, path, "a bool")?),
        Coercion::Enum(table) => {
            let s = expect_str(value, path)?;
            let remote = table
                .to_remote(s)
                .ok_or_else(|| Error::validation(path, format!("{s:?} is not a valid {}, expected one of {}", table.name, table.config_values().join(", "))))?;
            Json::String(remote.to_owned())
        }
        Coercion::Toggle { on, off } => {
            let enabled = expect(value.as_bool(), value, path, "a bool")?;
            Json::String(if enabled { on } else { off }.to_owned())
        }
        Coercion::StringList { item_key } => {
            let items = expect(value.as_list(), value, path, "a list")?;
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                let item_path = format!("{path}.{i}");
                let s = expect_str(item, &item_path)?;
                if let Some(check) = field.check {
                    check.run(&item_path, item)?;
                }
                out.push(match item_key {
                    Some(key) => Json::Object(Map::from_iter([(key.to_owned(), Json::String(s.to_owned()))])),
                    None => Json::String(s.to_owned()),
                });
            }
            return Ok(Json::Array(out));
        }
        Coercion::Blocks(nested) => {
            let items = expect(value.as_list(), value, path, "a list")?;
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                let item_prefix = format!("{path}.{i}.");
                let block = expect(item.as_block(), item, &format!("{path}.{i}"), "a block")?;
                reject_unsettable(nested, block, &item_prefix)?;
                out.push(Json::Object(expand_fields(nested, block, WriteMode::Full, &item_prefix)?));
            }
            return Ok(Json::Array(out));
        }
        Coercion::Custom(custom) => (custom.expand)(value).map_err(|reason| Error::validation(path, reason))?,
    };
    if let Some(check) = field.check {
        check.run(path, value)?;
    }
    Ok(json)
}

fn flatten_fields(fields: &[FieldMapping], remote: &Json, prefix: &str) -> Result<Attributes, Error> {
    let mut out = Attributes::new();
    for field in fields.iter().filter(|f| f.reads()) {
        let path = format!("{prefix}{}", field.attribute);
        let value = match lookup(remote, field.read) {
            Some(json) => flatten_value(field, json, &path)?,
            None => match absent_value(field) {
                Some(value) => value,
                None => continue,
            },
        };
        out.insert(field.attribute.to_owned(), value);
    }
    Ok(out)
}

fn flatten_value(field: &FieldMapping, json: &Json, path: &str) -> Result<Value, Error> {
    let value = match field.coercion {
        Coercion::String => Value::String(remote_str(json, path)?.to_owned()),
        Coercion::Int32 => Value::Int(json.as_i64().ok_or_else(|| unexpected(json, path, "a number"))?),
        Coercion::Bool => Value::Bool(json.as_bool().ok_or_else(|| unexpected(json, path, "a bool"))?),
        Coercion::Enum(table) => {
            let s = remote_str(json, path)?;
            let config = table
                .from_remote(s)
                .ok_or_else(|| Error::mapping(path, format!("unrecognized {} {s:?}", table.name)))?;
            Value::String(config.to_owned())
        }
        Coercion::Toggle { on, off } => {
            let s = remote_str(json, path)?;
            if s.eq_ignore_ascii_case(on) {
                Value::Bool(true)
            } else if s.eq_ignore_ascii_case(off) {
                Value::Bool(false)
            } else {
                return Err(Error::mapping(path, format!("expected {on:?} or {off:?}, found {s:?}")));
            }
        }
        Coercion::StringList { item_key } => {
            let items = json.as_array().ok_or_else(|| unexpected(json, path, "an array"))?;
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                let item_path = format!("{path}.{i}");
                let inner = match item_key {
                    Some(key) => item.get(key).ok_or_else(|| Error::mapping(&item_path, format!("missing `{key}`")))?,
                    None => item,
                };
                out.push(Value::String(remote_str(inner, &item_path)?.to_owned()));
            }
            Value::List(out)
        }
        Coercion::Blocks(nested) => {
            let items = json.as_array().ok_or_else(|| unexpected(json, path, "an array"))?;
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                out.push(Value::Block(flatten_fields(nested, item, &format!("{path}.{i}."))?));
            }
            Value::List(out)
        }
        Coercion::Custom(custom) => (custom.flatten)(json).map_err(|reason| Error::mapping(path, reason))?,
    };
    Ok(value)
}

fn absent_value(field: &FieldMapping) -> Option<Value> {
    match field.coercion {
        Coercion::StringList { .. } | Coercion::Blocks(_) => Some(Value::List(Vec::new())),
        Coercion::Custom(custom) => custom.absent.map(|absent| absent()),
        _ => None,
    }
}

fn lookup<'a>(json: &'a Json, path: &[&str]) -> Option<&'a Json> {
    path.iter()
        .try_fold(json, |current, key| current.get(key))
        .filter(|found| !found.is_null())
}

fn nest(path: &[&str], value: Json) -> Json {
    path.iter().rev().fold(value, |inner, key| Json::Object(Map::from_iter([((*key).to_owned(), inner)])))
}

/// Deep-merges `source` into `target`; objects merge key by key, everything else is replaced.
pub fn merge_objects(target: &mut Map<String, Json>, source: Map<String, Json>) {
    for (key, value) in source {
        if let Json::Object(incoming) = value {
            if let Some(Json::Object(existing)) = target.get_mut(&key) {
                merge_objects(existing, incoming);
                continue;
            }
            target.insert(key, Json::Object(incoming));
        } else {
            target.insert(key, value);
        }
    }
}

fn expect<T>(found: Option<T>, value: &Value, path: &str, expected: &str) -> Result<T, Error> {
    found.ok_or_else(|| Error::validation(path, format!("expected {expected}, found a {}", value.type_name())))
}

fn expect_str<'a>(value: &'a Value, path: &str) -> Result<&'a str, Error> {
    expect(value.as_str(), value, path, "a string")
}

fn remote_str<'a>(json: &'a Json, path: &str) -> Result<&'a str, Error> {
    json.as_str().ok_or_else(|| unexpected(json, path, "a string"))
}

fn unexpected(json: &Json, path: &str, expected: &str) -> Error {
    Error::mapping(path, format!("expected {expected}, found {json}"))
}
