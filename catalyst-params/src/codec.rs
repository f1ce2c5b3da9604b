//! Schema-aware encoding of values as query parameters, and back.

use serde::Deserialize;

use catalyst_core::{
    postprocess, preprocess, ArrayRemoval, Processors, Remove, Schema, SchemaKind, TransformError,
    Value,
};

use crate::error::ParamsError;
use crate::format::{format_date, format_number, parse_date, parse_number, scalar_string};
use crate::search_params::SearchParams;
use crate::tree::ParamsTree;

/// Index-keyed objects with more missing slots than this are not arrays.
const MAX_ARRAY_HOLES: usize = 1000;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct EncodeOptions {
    /// Decode the output again and fail unless it matches the input.
    pub validate: bool,
}

/// Serializers run by [`encode`]: every schema-described leaf becomes a
/// string, sets become arrays and maps become objects.
pub fn encoders() -> Processors {
    let undefined = Remove::new()
        .in_array(ArrayRemoval::Substitute(Value::from("undefined")))
        .in_tuple("undefined");

    Processors::new()
        .on(SchemaKind::Date, |value, _| match value {
            Value::Date(d) => {
                let text = format_date(&d).ok_or_else(|| {
                    TransformError::invalid(format!("date {d} is outside years 0 to 9999"))
                })?;
                Ok(Value::String(text).into())
            }
            other => Ok(other.into()),
        })
        .on(SchemaKind::Number, |value, _| match value {
            Value::Number(n) => Ok(Value::String(format_number(n)).into()),
            other => Ok(other.into()),
        })
        .on(SchemaKind::BigInt, |value, _| match value {
            Value::BigInt(n) => Ok(Value::String(n.to_string()).into()),
            other => Ok(other.into()),
        })
        .on(SchemaKind::Boolean, |value, _| match value {
            Value::Bool(b) => Ok(Value::String(b.to_string()).into()),
            other => Ok(other.into()),
        })
        .on(SchemaKind::Literal, |value, _| match &value {
            Value::Undefined | Value::String(_) => Ok(value.into()),
            other => Ok(scalar_string(other).map(Value::String).unwrap_or(value).into()),
        })
        .on(SchemaKind::Null, |value, _| match value {
            Value::Null => Ok(Value::from("null").into()),
            other => Ok(other.into()),
        })
        .on(SchemaKind::Undefined, move |value, _| match value {
            Value::Undefined => Ok(undefined.clone().into()),
            other => Ok(other.into()),
        })
        .on(SchemaKind::Set, |value, _| match &value {
            Value::Set(members) => Ok(Value::array(members.iter().cloned()).into()),
            _ => Ok(value.into()),
        })
        .on(SchemaKind::Map, |value, _| match &value {
            Value::Map(entries) => {
                let mut out = catalyst_core::Object::with_capacity(entries.len());
                for (key, child) in entries.iter() {
                    let key = scalar_string(key).ok_or_else(|| {
                        TransformError::invalid(format!(
                            "map key of type {} has no string form",
                            key.type_name()
                        ))
                    })?;
                    out.insert(key, child.clone());
                }
                Ok(Value::Object(out.into()).into())
            }
            _ => Ok(value.into()),
        })
}

/// Parsers run by [`decode`]. Input leaves are strings; anything that does
/// not parse is left for validation to reject.
pub fn decoders() -> Processors {
    Processors::new()
        .on(SchemaKind::Date, |value, _| {
            Ok(parse_str(value, |s| parse_date(s).map(Value::Date)).into())
        })
        .on(SchemaKind::Number, |value, _| {
            Ok(parse_str(value, |s| parse_number(s).map(Value::Number)).into())
        })
        .on(SchemaKind::BigInt, |value, _| {
            Ok(parse_str(value, |s| s.parse().ok().map(Value::BigInt)).into())
        })
        .on(SchemaKind::Boolean, |value, _| {
            Ok(parse_str(value, |s| match s {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            })
            .into())
        })
        .on(SchemaKind::Literal, |value, schema| {
            let Schema::Literal(literal) = schema else {
                return Ok(value.into());
            };
            let matches = value.as_str().is_some_and(|s| {
                scalar_string(literal).is_some_and(|expected| expected == s)
            });
            Ok(if matches { literal.clone() } else { value }.into())
        })
        .on(SchemaKind::Null, |value, _| {
            Ok(parse_str(value, |s| (s == "null").then_some(Value::Null)).into())
        })
        .on(SchemaKind::Undefined, |value, _| {
            Ok(parse_str(value, |s| (s == "undefined").then_some(Value::Undefined)).into())
        })
        .on(SchemaKind::Array, |value, _| Ok(as_array(value).into()))
        .on(SchemaKind::Tuple, |value, _| Ok(as_array(value).into()))
        .on(SchemaKind::Set, |value, _| {
            Ok(match as_array(value) {
                Value::Array(items) => Value::set(items.iter().cloned()),
                other => other,
            }
            .into())
        })
        .on(SchemaKind::Map, |value, _| match &value {
            Value::Object(map) => Ok(Value::map(
                map.iter()
                    .map(|(k, v)| (Value::string(k.clone()), v.clone())),
            )
            .into()),
            _ => Ok(value.into()),
        })
}

fn parse_str(value: Value, parse: impl FnOnce(&str) -> Option<Value>) -> Value {
    match value.as_str().and_then(parse) {
        Some(parsed) => parsed,
        None => value,
    }
}

/// Reads an index-keyed object as an array, filling holes with undefined.
fn as_array(value: Value) -> Value {
    let Value::Object(map) = &value else {
        return value;
    };
    let mut indexed = Vec::with_capacity(map.len());
    for (key, child) in map.iter() {
        match key.parse::<usize>() {
            Ok(i) if i.to_string() == *key => indexed.push((i, child)),
            _ => return value,
        }
    }
    let Some(len) = indexed
        .iter()
        .map(|(i, _)| i.checked_add(1))
        .try_fold(0, |len, end| end.map(|end| len.max(end)))
    else {
        return value;
    };
    if len.saturating_sub(indexed.len()) > MAX_ARRAY_HOLES {
        return value;
    }
    let mut items = vec![Value::Undefined; len];
    for (i, child) in indexed {
        items[i] = child.clone();
    }
    Value::array(items)
}

/// Encodes `value` as query parameters.
///
/// With a schema, leaves are serialized by [`encoders`] first. Without one,
/// the value is walked structurally and a container reached twice is an
/// error. The root must be an object or an array (or undefined, which
/// encodes to nothing).
pub fn encode(
    value: &Value,
    schema: Option<&Schema>,
    options: EncodeOptions,
) -> Result<SearchParams, ParamsError> {
    let tree = match schema {
        Some(schema) => {
            let serialized = postprocess(value.clone(), schema, &encoders(), None)?;
            ParamsTree::from_value(&serialized, false)?
        }
        None => ParamsTree::from_value(value, true)?,
    };
    let params = tree.flatten()?;

    if options.validate {
        match schema {
            Some(schema) => {
                let decoded = decode(&params, schema)?;
                if !equivalent(value, &decoded) {
                    return Err(ParamsError::RoundTrip {
                        expected: format!("{value:?}"),
                        actual: format!("{decoded:?}"),
                    });
                }
            }
            None => {
                let expected = tree.normalized();
                let actual = ParamsTree::unflatten(&SearchParams::parse(&params.to_query_string()))
                    .normalized();
                if expected != actual {
                    return Err(ParamsError::RoundTrip {
                        expected: format!("{expected:?}"),
                        actual: format!("{actual:?}"),
                    });
                }
            }
        }
    }
    Ok(params)
}

/// Decodes query parameters against `schema`.
pub fn decode(params: &SearchParams, schema: &Schema) -> Result<Value, ParamsError> {
    let raw = ParamsTree::unflatten(params).into_value();
    Ok(preprocess(raw, schema, &decoders(), None)?)
}

/// [`decode`] for a raw query string, with or without the leading `?`.
pub fn decode_str(query: &str, schema: &Schema) -> Result<Value, ParamsError> {
    decode(&SearchParams::parse(query), schema)
}

/// Deep equality where an undefined property equals a missing one.
fn equivalent(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Object(a), Value::Object(b)) => {
            fn defined(map: &catalyst_core::Object) -> usize {
                map.values().filter(|v| !v.is_undefined()).count()
            }
            defined(a) == defined(b)
                && a.iter()
                    .filter(|(_, v)| !v.is_undefined())
                    .all(|(k, v)| b.get(k).is_some_and(|other| equivalent(v, other)))
        }
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| equivalent(x, y))
        }
        _ => a == b,
    }
}
