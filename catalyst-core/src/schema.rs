use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::TransformError;
use crate::value::Value;

/// Tag of a schema node. Processor tables are keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaKind {
    String,
    Number,
    Boolean,
    BigInt,
    Date,
    Null,
    Undefined,
    Any,
    Unknown,
    Never,
    Void,
    Literal,
    Enum,
    Object,
    Array,
    Tuple,
    Record,
    Map,
    Set,
    Union,
    Intersection,
    Nullable,
    Optional,
    Default,
    Catch,
    Readonly,
    Pipe,
    Lazy,
}

impl SchemaKind {
    pub fn name(self) -> &'static str {
        match self {
            SchemaKind::String => "string",
            SchemaKind::Number => "number",
            SchemaKind::Boolean => "boolean",
            SchemaKind::BigInt => "bigint",
            SchemaKind::Date => "date",
            SchemaKind::Null => "null",
            SchemaKind::Undefined => "undefined",
            SchemaKind::Any => "any",
            SchemaKind::Unknown => "unknown",
            SchemaKind::Never => "never",
            SchemaKind::Void => "void",
            SchemaKind::Literal => "literal",
            SchemaKind::Enum => "enum",
            SchemaKind::Object => "object",
            SchemaKind::Array => "array",
            SchemaKind::Tuple => "tuple",
            SchemaKind::Record => "record",
            SchemaKind::Map => "map",
            SchemaKind::Set => "set",
            SchemaKind::Union => "union",
            SchemaKind::Intersection => "intersection",
            SchemaKind::Nullable => "nullable",
            SchemaKind::Optional => "optional",
            SchemaKind::Default => "default",
            SchemaKind::Catch => "catch",
            SchemaKind::Readonly => "readonly",
            SchemaKind::Pipe => "pipe",
            SchemaKind::Lazy => "lazy",
        }
    }
}

impl fmt::Display for SchemaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What an object does with keys its shape does not declare.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnknownKeys {
    /// Accept and ignore.
    #[default]
    Strip,
    /// Accept and keep.
    Passthrough,
    /// Reject.
    Strict,
}

/// Object node: ordered named children plus an optional catchall.
#[derive(Debug, Clone, Default)]
pub struct ObjectSchema {
    pub shape: IndexMap<String, Schema>,
    pub catchall: Option<Box<Schema>>,
    pub unknown_keys: UnknownKeys,
}

impl ObjectSchema {
    pub fn new<K: Into<String>>(fields: impl IntoIterator<Item = (K, Schema)>) -> Self {
        ObjectSchema {
            shape: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            catchall: None,
            unknown_keys: UnknownKeys::Strip,
        }
    }

    /// Schema for keys not named in the shape.
    pub fn catchall(mut self, schema: Schema) -> Self {
        self.catchall = Some(Box::new(schema));
        self
    }

    pub fn strict(mut self) -> Self {
        self.unknown_keys = UnknownKeys::Strict;
        self
    }

    pub fn passthrough(mut self) -> Self {
        self.unknown_keys = UnknownKeys::Passthrough;
        self
    }

    /// Child node responsible for `key`, falling back to the catchall.
    pub fn child(&self, key: &str) -> Option<&Schema> {
        self.shape.get(key).or(self.catchall.as_deref())
    }
}

impl From<ObjectSchema> for Schema {
    fn from(object: ObjectSchema) -> Self {
        Schema::Object(object)
    }
}

/// Input handed to a `catch` producer.
pub struct CatchContext<'a> {
    pub error: &'a TransformError,
    pub input: &'a Value,
}

/// Produces the fallback value of a `catch` node.
#[derive(Clone)]
pub struct CatchValue(Rc<dyn Fn(&CatchContext<'_>) -> Value>);

impl CatchValue {
    pub fn new(f: impl Fn(&CatchContext<'_>) -> Value + 'static) -> Self {
        CatchValue(Rc::new(f))
    }

    pub fn produce(&self, ctx: &CatchContext<'_>) -> Value {
        (self.0)(ctx)
    }
}

impl fmt::Debug for CatchValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CatchValue(..)")
    }
}

/// Deferred schema, used to describe recursive shapes.
#[derive(Clone)]
pub struct LazySchema(Rc<dyn Fn() -> Schema>);

impl LazySchema {
    pub fn resolve(&self) -> Schema {
        (self.0)()
    }
}

impl fmt::Debug for LazySchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LazySchema(..)")
    }
}

/// Description of a value's expected shape.
///
/// The transformer only inspects the tag and the children of each node;
/// how a schema was built is irrelevant to it.
#[derive(Debug, Clone)]
pub enum Schema {
    // Leaves
    String,
    Number,
    Boolean,
    BigInt,
    Date,
    Null,
    Undefined,
    Any,
    Unknown,
    Never,
    Void,
    /// Exactly this value.
    Literal(Value),
    /// One of these strings.
    Enum(Vec<String>),

    // Containers
    Object(ObjectSchema),
    Array(Box<Schema>),
    /// Fixed-arity positional list.
    Tuple(Vec<Schema>),
    /// Plain object used as a dictionary. Keys are never transformed.
    Record {
        key: Box<Schema>,
        value: Box<Schema>,
    },
    /// Keyed collection whose keys are transformed as well as its values.
    Map {
        key: Box<Schema>,
        value: Box<Schema>,
    },
    Set(Box<Schema>),

    // Combinators
    /// Alternatives tried in declared order.
    Union(Vec<Schema>),
    Intersection(Box<Schema>, Box<Schema>),

    // Wrappers
    Nullable(Box<Schema>),
    Optional(Box<Schema>),
    Default {
        inner: Box<Schema>,
        value: Value,
    },
    Catch {
        inner: Box<Schema>,
        catch_value: CatchValue,
    },
    Readonly(Box<Schema>),
    Pipe {
        input: Box<Schema>,
        output: Box<Schema>,
    },
    Lazy(LazySchema),
}

impl Schema {
    pub fn kind(&self) -> SchemaKind {
        match self {
            Schema::String => SchemaKind::String,
            Schema::Number => SchemaKind::Number,
            Schema::Boolean => SchemaKind::Boolean,
            Schema::BigInt => SchemaKind::BigInt,
            Schema::Date => SchemaKind::Date,
            Schema::Null => SchemaKind::Null,
            Schema::Undefined => SchemaKind::Undefined,
            Schema::Any => SchemaKind::Any,
            Schema::Unknown => SchemaKind::Unknown,
            Schema::Never => SchemaKind::Never,
            Schema::Void => SchemaKind::Void,
            Schema::Literal(_) => SchemaKind::Literal,
            Schema::Enum(_) => SchemaKind::Enum,
            Schema::Object(_) => SchemaKind::Object,
            Schema::Array(_) => SchemaKind::Array,
            Schema::Tuple(_) => SchemaKind::Tuple,
            Schema::Record { .. } => SchemaKind::Record,
            Schema::Map { .. } => SchemaKind::Map,
            Schema::Set(_) => SchemaKind::Set,
            Schema::Union(_) => SchemaKind::Union,
            Schema::Intersection(..) => SchemaKind::Intersection,
            Schema::Nullable(_) => SchemaKind::Nullable,
            Schema::Optional(_) => SchemaKind::Optional,
            Schema::Default { .. } => SchemaKind::Default,
            Schema::Catch { .. } => SchemaKind::Catch,
            Schema::Readonly(_) => SchemaKind::Readonly,
            Schema::Pipe { .. } => SchemaKind::Pipe,
            Schema::Lazy(_) => SchemaKind::Lazy,
        }
    }

    /// Creates an object schema that strips unknown keys.
    pub fn object<K: Into<String>>(fields: impl IntoIterator<Item = (K, Schema)>) -> Self {
        Schema::Object(ObjectSchema::new(fields))
    }

    pub fn array(element: Schema) -> Self {
        Schema::Array(Box::new(element))
    }

    pub fn tuple(items: impl IntoIterator<Item = Schema>) -> Self {
        Schema::Tuple(items.into_iter().collect())
    }

    pub fn record(key: Schema, value: Schema) -> Self {
        Schema::Record {
            key: Box::new(key),
            value: Box::new(value),
        }
    }

    pub fn map(key: Schema, value: Schema) -> Self {
        Schema::Map {
            key: Box::new(key),
            value: Box::new(value),
        }
    }

    pub fn set(element: Schema) -> Self {
        Schema::Set(Box::new(element))
    }

    pub fn union(alternatives: impl IntoIterator<Item = Schema>) -> Self {
        Schema::Union(alternatives.into_iter().collect())
    }

    pub fn intersection(left: Schema, right: Schema) -> Self {
        Schema::Intersection(Box::new(left), Box::new(right))
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Schema::Literal(value.into())
    }

    pub fn enumeration<S: Into<String>>(variants: impl IntoIterator<Item = S>) -> Self {
        Schema::Enum(variants.into_iter().map(Into::into).collect())
    }

    pub fn lazy(getter: impl Fn() -> Schema + 'static) -> Self {
        Schema::Lazy(LazySchema(Rc::new(getter)))
    }

    pub fn optional(self) -> Self {
        Schema::Optional(Box::new(self))
    }

    pub fn nullable(self) -> Self {
        Schema::Nullable(Box::new(self))
    }

    pub fn readonly(self) -> Self {
        Schema::Readonly(Box::new(self))
    }

    /// Substitutes `value` when the input is `undefined`.
    pub fn default_to(self, value: impl Into<Value>) -> Self {
        Schema::Default {
            inner: Box::new(self),
            value: value.into(),
        }
    }

    pub fn catch_with(self, f: impl Fn(&CatchContext<'_>) -> Value + 'static) -> Self {
        Schema::Catch {
            inner: Box::new(self),
            catch_value: CatchValue::new(f),
        }
    }

    /// Catch that always falls back to a constant.
    pub fn catch_value(self, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.catch_with(move |_| value.clone())
    }

    /// Feeds values accepted by `self` into `output`.
    pub fn pipe(self, output: Schema) -> Self {
        Schema::Pipe {
            input: Box::new(self),
            output: Box::new(output),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_preserves_field_order() {
        let schema = Schema::object([
            ("first", Schema::Boolean),
            ("second", Schema::Number),
            ("third", Schema::String),
        ]);

        if let Schema::Object(object) = schema {
            let keys: Vec<_> = object.shape.keys().collect();
            assert_eq!(keys, vec!["first", "second", "third"]);
        } else {
            panic!("Expected Object");
        }
    }

    #[test]
    fn wrappers_report_their_own_kind() {
        assert_eq!(Schema::String.optional().kind(), SchemaKind::Optional);
        assert_eq!(Schema::String.nullable().kind(), SchemaKind::Nullable);
        assert_eq!(Schema::Number.default_to(1).kind(), SchemaKind::Default);
        assert_eq!(Schema::Number.catch_value(0).kind(), SchemaKind::Catch);
        assert_eq!(Schema::String.pipe(Schema::String).kind(), SchemaKind::Pipe);
        assert_eq!(Schema::lazy(|| Schema::String).kind(), SchemaKind::Lazy);
    }

    #[test]
    fn object_child_falls_back_to_catchall() {
        let object = ObjectSchema::new([("a", Schema::String)]).catchall(Schema::Number);
        assert_eq!(object.child("a").map(Schema::kind), Some(SchemaKind::String));
        assert_eq!(object.child("zzz").map(Schema::kind), Some(SchemaKind::Number));

        let plain = ObjectSchema::new([("a", Schema::String)]);
        assert!(plain.child("zzz").is_none());
    }

    #[test]
    fn lazy_resolves_on_demand() {
        let schema = Schema::lazy(|| Schema::array(Schema::String));
        let Schema::Lazy(getter) = schema else {
            panic!("Expected Lazy");
        };
        assert_eq!(getter.resolve().kind(), SchemaKind::Array);
    }

    #[test]
    fn kind_display_is_lowercase() {
        assert_eq!(SchemaKind::BigInt.to_string(), "bigint");
        assert_eq!(SchemaKind::Intersection.to_string(), "intersection");
    }
}
