use std::any::Any;
use std::fmt;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

/// Insertion-ordered property map of a plain object.
pub type Object = IndexMap<String, Value>;

/// A dynamically shaped value, the input and output of every transform.
///
/// Containers are reference counted so clones are cheap and an untouched
/// container can be handed back by identity (see [`Value::same`]).
#[derive(Clone, Debug)]
pub enum Value {
    /// Absent value. Distinct from `Null`.
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    BigInt(i128),
    String(String),
    Date(DateTime<Utc>),
    Array(Rc<Vec<Value>>),
    /// Plain object with string keys.
    Object(Rc<Object>),
    /// Insertion-ordered set without duplicate members.
    Set(Rc<Vec<Value>>),
    /// Insertion-ordered map with arbitrary keys and no duplicate keys.
    Map(Rc<Vec<(Value, Value)>>),
    /// Non-plain object. Never traversed.
    Instance(Instance),
}

/// An opaque host object carried through transforms untouched.
#[derive(Clone)]
pub struct Instance {
    class: &'static str,
    inner: Rc<dyn Any>,
}

impl Instance {
    pub fn new<T: Any>(class: &'static str, value: T) -> Self {
        Instance {
            class,
            inner: Rc::new(value),
        }
    }

    /// Name of the host type, used in diagnostics only.
    pub fn class(&self) -> &'static str {
        self.class
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref()
    }

    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Instance({})", self.class)
    }
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn array(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Array(Rc::new(items.into_iter().collect()))
    }

    pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Object(Rc::new(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    /// Builds a set, keeping the first occurrence of equal members.
    pub fn set(members: impl IntoIterator<Item = Value>) -> Self {
        let mut out: Vec<Value> = Vec::new();
        for member in members {
            if !out.contains(&member) {
                out.push(member);
            }
        }
        Value::Set(Rc::new(out))
    }

    /// Builds a map. A repeated key keeps its first position and takes the
    /// last value, like repeated `Map#set`.
    pub fn map(entries: impl IntoIterator<Item = (Value, Value)>) -> Self {
        let mut out: Vec<(Value, Value)> = Vec::new();
        for (key, value) in entries {
            match out.iter_mut().find(|(k, _)| *k == key) {
                Some(slot) => slot.1 = value,
                None => out.push((key, value)),
            }
        }
        Value::Map(Rc::new(out))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Looks up a property of a plain object.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|map| map.get(key))
    }

    /// Short type name used in validation messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(n) if n.is_nan() => "nan",
            Value::Number(_) => "number",
            Value::BigInt(_) => "bigint",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Set(_) => "set",
            Value::Map(_) => "map",
            Value::Instance(_) => "instance",
        }
    }

    /// Identity comparison: containers must be the same allocation, scalars
    /// must be equal.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Array(a), Value::Array(b)) | (Value::Set(a), Value::Set(b)) => {
                Rc::ptr_eq(a, b)
            }
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Map(a), Value::Map(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => a.ptr_eq(b),
            (a, b) if a.is_container() || b.is_container() => false,
            (a, b) => a == b,
        }
    }

    pub(crate) fn is_container(&self) -> bool {
        matches!(
            self,
            Value::Array(_)
                | Value::Object(_)
                | Value::Set(_)
                | Value::Map(_)
                | Value::Instance(_)
        )
    }
}

fn unordered_eq<T, F>(a: &[T], b: &[T], eq: F) -> bool
where
    F: Fn(&T, &T) -> bool,
{
    a.len() == b.len() && a.iter().all(|x| b.iter().any(|y| eq(x, y)))
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::BigInt(a), Value::BigInt(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b) || a == b,
            // IndexMap equality ignores insertion order.
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b) || a == b,
            (Value::Set(a), Value::Set(b)) => unordered_eq(a, b, |x, y| x == y),
            (Value::Map(a), Value::Map(b)) => {
                unordered_eq(a, b, |(k1, v1), (k2, v2)| k1 == k2 && v1 == v2)
            }
            (Value::Instance(a), Value::Instance(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Undefined | Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::BigInt(n) => serializer.serialize_i128(*n),
            Value::String(s) => serializer.serialize_str(s),
            Value::Date(d) => serializer.serialize_str(&d.to_rfc3339()),
            Value::Array(items) | Value::Set(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Object(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map.iter() {
                    out.serialize_entry(k, v)?;
                }
                out.end()
            }
            Value::Map(entries) => {
                let mut seq = serializer.serialize_seq(Some(entries.len()))?;
                for pair in entries.iter() {
                    seq.serialize_element(&[&pair.0, &pair.1])?;
                }
                seq.end()
            }
            Value::Instance(instance) => serializer.serialize_str(instance.class()),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => Value::array(items.into_iter().map(Value::from)),
            serde_json::Value::Object(map) => {
                Value::object(map.into_iter().map(|(k, v)| (k, Value::from(v))))
            }
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(value.into())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Date(value)
    }
}
