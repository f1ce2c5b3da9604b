//! Catalyst is a schema-driven value transformer.
//!
//! Core concepts:
//! - **Value**: A dynamically shaped value (objects, arrays, sets, maps, dates, ...)
//! - **Schema**: A tagged description of a value's shape
//! - **Processors**: Conversion callbacks keyed by schema kind
//! - **Remove**: A request, returned by a processor, to drop a value from its container
//!
//! # Example
//!
//! ```
//! use catalyst_core::{postprocess, Processors, Remove, Schema, SchemaKind, Value};
//!
//! let schema = Schema::object([("name", Schema::String), ("age", Schema::Number)]);
//! let hide_numbers = Processors::new().on(SchemaKind::Number, |_, _| Ok(Remove::new().into()));
//!
//! let value = Value::object([("name", Value::from("Ada")), ("age", Value::from(36))]);
//! let out = postprocess(value, &schema, &hide_numbers, None).unwrap();
//!
//! assert_eq!(out, Value::object([("name", Value::from("Ada"))]));
//! ```

mod error;
mod remove;
mod schema;
mod transform;
mod validate;
mod value;

pub use error::{AlternativeIssues, Issue, IssueCode, TransformError, UnionError};
pub use remove::{ArrayRemoval, Processed, Remove, RemoveContext};
pub use schema::{
    CatchContext, CatchValue, LazySchema, ObjectSchema, Schema, SchemaKind, UnknownKeys,
};
pub use transform::{postprocess, preprocess, transform, Direction, ProcessFn, Processors};
pub use value::{Instance, Object, Value};
