//! Schema-driven recursive value transformation.
//!
//! [`preprocess`] moves raw input toward the shape a schema describes;
//! [`postprocess`] moves a value of that shape toward an external
//! representation. Both walk the value alongside the schema and call the
//! processor registered for each node's [`SchemaKind`].
//!
//! Ordering: preprocess runs a node's processor before descending into its
//! children, so a parser can reshape a container first. Postprocess runs it
//! after the children, so a serializer sees already-serialized children.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use log::trace;

use crate::error::{AlternativeIssues, TransformError, UnionError};
use crate::remove::{Processed, RemoveContext};
use crate::schema::{CatchContext, Schema, SchemaKind};
use crate::value::{Object, Value};

/// Conversion callback for one schema kind.
///
/// Must be pure: union and intersection nodes may run it several times on
/// the same input.
pub type ProcessFn = Rc<dyn Fn(Value, &Schema) -> Result<Processed, TransformError>>;

/// Processor table keyed by schema kind.
#[derive(Clone, Default)]
pub struct Processors {
    by_kind: HashMap<SchemaKind, ProcessFn>,
}

impl Processors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `f` for `kind`, replacing any previous processor.
    pub fn on(
        mut self,
        kind: SchemaKind,
        f: impl Fn(Value, &Schema) -> Result<Processed, TransformError> + 'static,
    ) -> Self {
        self.insert(kind, f);
        self
    }

    pub fn insert(
        &mut self,
        kind: SchemaKind,
        f: impl Fn(Value, &Schema) -> Result<Processed, TransformError> + 'static,
    ) {
        self.by_kind.insert(kind, Rc::new(f));
    }

    pub fn get(&self, kind: SchemaKind) -> Option<&ProcessFn> {
        self.by_kind.get(&kind)
    }

    pub fn contains(&self, kind: SchemaKind) -> bool {
        self.by_kind.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.by_kind.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_kind.is_empty()
    }
}

impl fmt::Debug for Processors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.by_kind.keys()).finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Preprocess,
    Postprocess,
}

/// Transforms raw input toward the shape of `schema`.
///
/// `shared` processors take precedence over `processors`. The only error
/// raised by the walk itself is a union with no matching alternative;
/// processors may raise [`TransformError::Invalid`].
pub fn preprocess(
    value: Value,
    schema: &Schema,
    processors: &Processors,
    shared: Option<&Processors>,
) -> Result<Value, TransformError> {
    transform(Direction::Preprocess, value, schema, processors, shared)
}

/// Transforms a value of the shape of `schema` toward its external form.
///
/// Values under a `catch` node are assumed to already satisfy the caught
/// schema; nothing is caught in this direction.
pub fn postprocess(
    value: Value,
    schema: &Schema,
    processors: &Processors,
    shared: Option<&Processors>,
) -> Result<Value, TransformError> {
    transform(Direction::Postprocess, value, schema, processors, shared)
}

/// Runs a walk in `direction`. A removal surviving to the top becomes
/// `undefined`.
pub fn transform(
    direction: Direction,
    value: Value,
    schema: &Schema,
    processors: &Processors,
    shared: Option<&Processors>,
) -> Result<Value, TransformError> {
    let walker = Walker {
        direction,
        processors,
        shared,
    };
    Ok(walker.walk(value, schema)?.strip_or(Value::Undefined))
}

struct Walker<'a> {
    direction: Direction,
    processors: &'a Processors,
    shared: Option<&'a Processors>,
}

impl Walker<'_> {
    fn processor(&self, kind: SchemaKind) -> Option<&ProcessFn> {
        self.shared
            .and_then(|shared| shared.get(kind))
            .or_else(|| self.processors.get(kind))
    }

    fn convert_as(
        &self,
        kind: SchemaKind,
        value: Value,
        schema: &Schema,
    ) -> Result<Processed, TransformError> {
        match self.processor(kind) {
            Some(f) => f(value, schema),
            None => Ok(Processed::Value(value)),
        }
    }

    fn walk(&self, value: Value, schema: &Schema) -> Result<Processed, TransformError> {
        match self.direction {
            Direction::Preprocess => {
                // Leave undefined for the default to fill in during validation.
                if matches!(schema, Schema::Default { .. }) && value.is_undefined() {
                    return Ok(Processed::Value(value));
                }
                match self.convert_as(schema.kind(), value, schema)? {
                    Processed::Value(value) => self.descend(value, schema),
                    removed => Ok(removed),
                }
            }
            Direction::Postprocess => match self.descend(value, schema)? {
                Processed::Value(value) => self.convert_as(schema.kind(), value, schema),
                removed => Ok(removed),
            },
        }
    }

    fn descend(&self, value: Value, schema: &Schema) -> Result<Processed, TransformError> {
        let out = match schema {
            Schema::String
            | Schema::Number
            | Schema::Boolean
            | Schema::BigInt
            | Schema::Date
            | Schema::Null
            | Schema::Undefined
            | Schema::Any
            | Schema::Unknown
            | Schema::Never
            | Schema::Void
            | Schema::Literal(_)
            | Schema::Enum(_) => value,

            Schema::Object(object) => {
                let Value::Object(map) = &value else {
                    return Ok(Processed::Value(value));
                };
                let extra = object.shape.keys().filter(|k| !map.contains_key(k.as_str()));
                let keys: Vec<String> = map.keys().chain(extra).cloned().collect();

                let mut out = Object::with_capacity(keys.len());
                let mut changed = false;
                for key in keys {
                    let present = map.get(&key);
                    let Some(child) = object.child(&key) else {
                        if let Some(original) = present {
                            out.insert(key, original.clone());
                        }
                        continue;
                    };
                    let input = present.cloned().unwrap_or(Value::Undefined);
                    match (self.walk(input, child)?, present) {
                        (Processed::Remove(_), original) => changed |= original.is_some(),
                        (Processed::Value(v), None) if v.is_undefined() => {}
                        (Processed::Value(v), original) => {
                            changed |= original.is_none_or(|o| !o.same(&v));
                            out.insert(key, v);
                        }
                    }
                }
                if changed {
                    Value::Object(Rc::new(out))
                } else {
                    value
                }
            }

            Schema::Array(element) => {
                let Value::Array(items) = &value else {
                    return Ok(Processed::Value(value));
                };
                let mut out = Vec::with_capacity(items.len());
                let mut changed = false;
                for item in items.iter() {
                    match self
                        .walk(item.clone(), element)?
                        .strip(RemoveContext::Array)
                    {
                        Some(v) => {
                            changed |= !v.same(item);
                            out.push(v);
                        }
                        None => changed = true,
                    }
                }
                if changed {
                    Value::Array(Rc::new(out))
                } else {
                    value
                }
            }

            Schema::Tuple(children) => {
                let Value::Array(items) = &value else {
                    return Ok(Processed::Value(value));
                };
                let mut out = Vec::with_capacity(items.len());
                let mut changed = false;
                for (i, item) in items.iter().enumerate() {
                    let v = match children.get(i) {
                        Some(child) => self
                            .walk(item.clone(), child)?
                            .strip(RemoveContext::Tuple)
                            .unwrap_or(Value::Undefined),
                        None => item.clone(),
                    };
                    changed |= !v.same(item);
                    out.push(v);
                }
                if changed {
                    Value::Array(Rc::new(out))
                } else {
                    value
                }
            }

            Schema::Set(element) => {
                let Value::Set(members) = &value else {
                    return Ok(Processed::Value(value));
                };
                let mut out = Vec::with_capacity(members.len());
                let mut changed = false;
                for member in members.iter() {
                    match self.walk(member.clone(), element)? {
                        Processed::Value(v) => {
                            changed |= !v.same(member);
                            out.push(v);
                        }
                        Processed::Remove(_) => changed = true,
                    }
                }
                if changed { Value::set(out) } else { value }
            }

            Schema::Map { key, value: child } => {
                let Value::Map(entries) = &value else {
                    return Ok(Processed::Value(value));
                };
                let mut out = Vec::with_capacity(entries.len());
                let mut changed = false;
                for (k, v) in entries.iter() {
                    let new_key = self.walk(k.clone(), key)?;
                    let new_value = self.walk(v.clone(), child)?;
                    match (new_key, new_value) {
                        (Processed::Value(nk), Processed::Value(nv)) => {
                            changed |= !nk.same(k) || !nv.same(v);
                            out.push((nk, nv));
                        }
                        _ => changed = true,
                    }
                }
                if changed { Value::map(out) } else { value }
            }

            Schema::Record { value: child, .. } => {
                let Value::Object(map) = &value else {
                    return Ok(Processed::Value(value));
                };
                let mut out = Object::with_capacity(map.len());
                let mut changed = false;
                for (k, v) in map.iter() {
                    match self.walk(v.clone(), child)? {
                        Processed::Value(nv) => {
                            changed |= !nv.same(v);
                            out.insert(k.clone(), nv);
                        }
                        Processed::Remove(_) => changed = true,
                    }
                }
                if changed {
                    Value::Object(Rc::new(out))
                } else {
                    value
                }
            }

            Schema::Union(alternatives) => return self.union(value, alternatives),

            Schema::Intersection(left, right) => {
                let l = self.walk(value.clone(), left)?.strip_or(Value::Undefined);
                let r = self.walk(value.clone(), right)?.strip_or(Value::Undefined);
                if l.same(&value) && r.same(&value) {
                    value
                } else {
                    merge(l, r)
                }
            }

            Schema::Nullable(inner) => {
                return match self.direction {
                    Direction::Preprocess => {
                        match self.convert_as(SchemaKind::Null, value, schema)? {
                            Processed::Value(Value::Null) => Ok(Processed::Value(Value::Null)),
                            Processed::Value(v) => self.walk(v, inner),
                            removed => Ok(removed),
                        }
                    }
                    Direction::Postprocess if value.is_null() => {
                        self.convert_as(SchemaKind::Null, value, schema)
                    }
                    Direction::Postprocess => self.walk(value, inner),
                };
            }

            Schema::Optional(inner) => {
                return match self.direction {
                    Direction::Preprocess => {
                        match self.convert_as(SchemaKind::Undefined, value, schema)? {
                            Processed::Value(Value::Undefined) => {
                                Ok(Processed::Value(Value::Undefined))
                            }
                            Processed::Value(v) => self.walk(v, inner),
                            removed => Ok(removed),
                        }
                    }
                    Direction::Postprocess if value.is_undefined() => {
                        self.convert_as(SchemaKind::Undefined, value, schema)
                    }
                    Direction::Postprocess => self.walk(value, inner),
                };
            }

            Schema::Default { inner, .. } | Schema::Readonly(inner) => {
                return self.walk(value, inner);
            }

            Schema::Catch { inner, catch_value } => {
                return match self.direction {
                    Direction::Preprocess => match self.walk(value.clone(), inner) {
                        Err(error) => {
                            trace!("catch node recovered from: {error}");
                            let ctx = CatchContext {
                                error: &error,
                                input: &value,
                            };
                            Ok(Processed::Value(catch_value.produce(&ctx)))
                        }
                        ok => ok,
                    },
                    Direction::Postprocess => self.walk(value, inner),
                };
            }

            Schema::Pipe { input, output } => {
                return match self.direction {
                    Direction::Preprocess => self.walk(value, input),
                    Direction::Postprocess => self.walk(value, output),
                };
            }

            Schema::Lazy(getter) => return self.walk(value, &getter.resolve()),
        };
        Ok(Processed::Value(out))
    }

    fn union(&self, value: Value, alternatives: &[Schema]) -> Result<Processed, TransformError> {
        let mut tried = Vec::with_capacity(alternatives.len());
        match self.direction {
            Direction::Preprocess => {
                if let [only] = alternatives {
                    return self.walk(value, only);
                }
                for alternative in alternatives {
                    let issues = match self.walk(value.clone(), alternative) {
                        Ok(Processed::Value(v)) => match alternative.check(&v) {
                            Ok(()) => return Ok(Processed::Value(v)),
                            Err(issues) => issues,
                        },
                        Ok(removed) => return Ok(removed),
                        Err(err) => err.issues(),
                    };
                    trace!("union alternative {} rejected", alternative.kind());
                    tried.push(AlternativeIssues {
                        kind: alternative.kind(),
                        issues,
                    });
                }
            }
            Direction::Postprocess => {
                for alternative in alternatives {
                    match alternative.check(&value) {
                        Ok(()) => return self.walk(value, alternative),
                        Err(issues) => tried.push(AlternativeIssues {
                            kind: alternative.kind(),
                            issues,
                        }),
                    }
                }
            }
        }
        Err(UnionError { alternatives: tried }.into())
    }
}

/// Shallow merge of intersection results; right-hand keys win.
fn merge(left: Value, right: Value) -> Value {
    match (left, right) {
        (Value::Object(l), Value::Object(r)) => {
            let mut out = (*l).clone();
            for (k, v) in r.iter() {
                out.insert(k.clone(), v.clone());
            }
            Value::Object(Rc::new(out))
        }
        (left, Value::Undefined) => left,
        (_, right) => right,
    }
}
