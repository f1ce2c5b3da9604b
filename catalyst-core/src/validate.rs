//! Structural validation of values against schemas.
//!
//! Used by the transformer to pick union alternatives. Validation never
//! rewrites the value: defaults are not substituted and catch nodes accept
//! anything.

use crate::error::{AlternativeIssues, Issue, IssueCode};
use crate::schema::{Schema, UnknownKeys};
use crate::value::Value;

impl Schema {
    /// Checks `value` against this schema, collecting every issue found.
    pub fn check(&self, value: &Value) -> Result<(), Vec<Issue>> {
        let mut checker = Checker::default();
        checker.visit(self, value);
        if checker.issues.is_empty() {
            Ok(())
        } else {
            Err(checker.issues)
        }
    }

    /// Whether `value` passes [`Schema::check`].
    pub fn accepts(&self, value: &Value) -> bool {
        self.check(value).is_ok()
    }
}

#[derive(Default)]
struct Checker {
    path: Vec<String>,
    issues: Vec<Issue>,
}

impl Checker {
    fn report(&mut self, mut issue: Issue) {
        let mut path = self.path.clone();
        path.append(&mut issue.path);
        issue.path = path;
        self.issues.push(issue);
    }

    fn expect(&mut self, ok: bool, expected: &'static str, value: &Value) {
        if !ok {
            self.report(Issue::invalid_type(expected, value.type_name()));
        }
    }

    fn nested(&mut self, segment: impl Into<String>, schema: &Schema, value: &Value) {
        self.path.push(segment.into());
        self.visit(schema, value);
        self.path.pop();
    }

    fn visit(&mut self, schema: &Schema, value: &Value) {
        match schema {
            Schema::String => self.expect(matches!(value, Value::String(_)), "string", value),
            Schema::Number => self.expect(
                matches!(value, Value::Number(n) if !n.is_nan()),
                "number",
                value,
            ),
            Schema::Boolean => self.expect(matches!(value, Value::Bool(_)), "boolean", value),
            Schema::BigInt => self.expect(matches!(value, Value::BigInt(_)), "bigint", value),
            Schema::Date => self.expect(matches!(value, Value::Date(_)), "date", value),
            Schema::Null => self.expect(value.is_null(), "null", value),
            Schema::Undefined | Schema::Void => {
                self.expect(value.is_undefined(), "undefined", value)
            }
            Schema::Any | Schema::Unknown => {}
            Schema::Never => self.report(Issue::invalid_type("never", value.type_name())),
            Schema::Literal(expected) => {
                if value != expected {
                    self.report(Issue::new(
                        IssueCode::InvalidLiteral,
                        format!("expected literal {expected:?}"),
                    ));
                }
            }
            Schema::Enum(variants) => {
                let ok = value
                    .as_str()
                    .is_some_and(|s| variants.iter().any(|v| v == s));
                if !ok {
                    self.report(Issue::new(
                        IssueCode::InvalidEnumValue,
                        format!("expected one of {}", variants.join(" | ")),
                    ));
                }
            }
            Schema::Object(object) => {
                let Some(map) = value.as_object() else {
                    return self.report(Issue::invalid_type("object", value.type_name()));
                };
                for (key, child) in &object.shape {
                    self.nested(key.clone(), child, map.get(key).unwrap_or(&Value::Undefined));
                }
                let extra: Vec<&String> = map
                    .keys()
                    .filter(|k| !object.shape.contains_key(k.as_str()))
                    .collect();
                if let Some(catchall) = &object.catchall {
                    for key in extra {
                        self.nested(key.clone(), catchall, &map[key.as_str()]);
                    }
                } else if object.unknown_keys == UnknownKeys::Strict && !extra.is_empty() {
                    let keys: Vec<String> = extra.into_iter().cloned().collect();
                    let message = format!("unrecognized keys: {}", keys.join(", "));
                    self.report(Issue::new(IssueCode::UnrecognizedKeys(keys), message));
                }
            }
            Schema::Array(element) => {
                let Some(items) = value.as_array() else {
                    return self.report(Issue::invalid_type("array", value.type_name()));
                };
                for (i, item) in items.iter().enumerate() {
                    self.nested(i.to_string(), element, item);
                }
            }
            Schema::Tuple(children) => {
                let Some(items) = value.as_array() else {
                    return self.report(Issue::invalid_type("tuple", value.type_name()));
                };
                if items.len() != children.len() {
                    self.report(Issue::new(
                        IssueCode::InvalidArity {
                            expected: children.len(),
                            received: items.len(),
                        },
                        format!(
                            "expected {} elements, received {}",
                            children.len(),
                            items.len()
                        ),
                    ));
                }
                for (i, (child, item)) in children.iter().zip(items.iter()).enumerate() {
                    self.nested(i.to_string(), child, item);
                }
            }
            Schema::Record { key, value: child } => {
                let Some(map) = value.as_object() else {
                    return self.report(Issue::invalid_type("record", value.type_name()));
                };
                for (k, v) in map.iter() {
                    self.nested(k.clone(), key, &Value::String(k.clone()));
                    self.nested(k.clone(), child, v);
                }
            }
            Schema::Map { key, value: child } => {
                let Value::Map(entries) = value else {
                    return self.report(Issue::invalid_type("map", value.type_name()));
                };
                for (i, (k, v)) in entries.iter().enumerate() {
                    self.nested(i.to_string(), key, k);
                    self.nested(i.to_string(), child, v);
                }
            }
            Schema::Set(element) => {
                let Value::Set(members) = value else {
                    return self.report(Issue::invalid_type("set", value.type_name()));
                };
                for (i, member) in members.iter().enumerate() {
                    self.nested(i.to_string(), element, member);
                }
            }
            Schema::Union(alternatives) => {
                let mut tried = Vec::with_capacity(alternatives.len());
                for alternative in alternatives {
                    match alternative.check(value) {
                        Ok(()) => return,
                        Err(issues) => tried.push(AlternativeIssues {
                            kind: alternative.kind(),
                            issues,
                        }),
                    }
                }
                self.report(Issue::new(
                    IssueCode::InvalidUnion(tried),
                    "no union alternative matched",
                ));
            }
            Schema::Intersection(left, right) => {
                self.visit(left, value);
                self.visit(right, value);
            }
            Schema::Nullable(inner) => {
                if !value.is_null() {
                    self.visit(inner, value);
                }
            }
            Schema::Optional(inner) | Schema::Default { inner, .. } => {
                if !value.is_undefined() {
                    self.visit(inner, value);
                }
            }
            Schema::Catch { .. } => {}
            Schema::Readonly(inner) => self.visit(inner, value),
            Schema::Pipe { input, output } => {
                self.visit(input, value);
                self.visit(output, value);
            }
            Schema::Lazy(getter) => self.visit(&getter.resolve(), value),
        }
    }
}
