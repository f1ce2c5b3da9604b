//! The remove protocol.
//!
//! A processor returns [`Processed::Remove`] to ask the enclosing container
//! to drop the value. What "drop" means is decided by the container:
//! objects, records, sets and maps omit the entry; arrays shrink or
//! substitute; tuples substitute because their arity is fixed. A removal
//! must be consumed by the container one level up and never reaches the
//! caller of [`preprocess`](crate::preprocess)/[`postprocess`](crate::postprocess).

use crate::value::Value;

/// Array behavior for a removed element.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayRemoval {
    /// Filter the element out, shrinking the array.
    Delete,
    /// Keep the slot, holding this value instead.
    Substitute(Value),
}

/// Request to drop a value from its container.
#[derive(Debug, Clone, PartialEq)]
pub struct Remove {
    array: ArrayRemoval,
    tuple: Value,
    default: Value,
}

impl Default for Remove {
    fn default() -> Self {
        Remove {
            array: ArrayRemoval::Delete,
            tuple: Value::Undefined,
            default: Value::Undefined,
        }
    }
}

impl Remove {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_array(mut self, behavior: ArrayRemoval) -> Self {
        self.array = behavior;
        self
    }

    pub fn in_tuple(mut self, substitute: impl Into<Value>) -> Self {
        self.tuple = substitute.into();
        self
    }

    /// Substitute used by every other consumer. Arrays and tuples use their
    /// own settings; object properties, intersections and the top level
    /// drop the value instead, so only custom callers of
    /// [`Processed::strip`] with [`RemoveContext::Default`] read this.
    pub fn otherwise(mut self, substitute: impl Into<Value>) -> Self {
        self.default = substitute.into();
        self
    }
}

/// The container kind consuming a removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveContext {
    Array,
    Tuple,
    Default,
}

/// Outcome of one transform step.
#[derive(Debug, Clone, PartialEq)]
pub enum Processed {
    Value(Value),
    Remove(Remove),
}

impl Processed {
    pub fn is_remove(&self) -> bool {
        matches!(self, Processed::Remove(_))
    }

    /// Resolves a removal for `context`. `None` means the value vanishes.
    pub fn strip(self, context: RemoveContext) -> Option<Value> {
        match self {
            Processed::Value(value) => Some(value),
            Processed::Remove(remove) => match context {
                RemoveContext::Array => match remove.array {
                    ArrayRemoval::Delete => None,
                    ArrayRemoval::Substitute(value) => Some(value),
                },
                RemoveContext::Tuple => Some(remove.tuple),
                RemoveContext::Default => Some(remove.default),
            },
        }
    }

    /// Resolves a removal to `default`, whatever its options say.
    pub fn strip_or(self, default: Value) -> Value {
        match self {
            Processed::Value(value) => value,
            Processed::Remove(_) => default,
        }
    }
}

impl From<Value> for Processed {
    fn from(value: Value) -> Self {
        Processed::Value(value)
    }
}

impl From<Remove> for Processed {
    fn from(remove: Remove) -> Self {
        Processed::Remove(remove)
    }
}
