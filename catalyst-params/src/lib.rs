//! Query-string codec for catalyst values.
//!
//! A value is flattened into dotted keys (`a.b.0=x`) whose values are
//! strings. Given a schema, dates, numbers, sets and maps are serialized on
//! the way out and parsed on the way back in.
//!
//! # Example
//!
//! ```
//! use catalyst_core::{Schema, Value};
//! use catalyst_params::{decode_str, encode, EncodeOptions};
//!
//! let schema = Schema::object([
//!     ("page", Schema::Number),
//!     ("tags", Schema::array(Schema::String)),
//! ]);
//! let value = Value::object([
//!     ("page", Value::from(2)),
//!     ("tags", Value::array([Value::from("a"), Value::from("b")])),
//! ]);
//!
//! let params = encode(&value, Some(&schema), EncodeOptions::default()).unwrap();
//! assert_eq!(params.to_string(), "page=2&tags.0=a&tags.1=b");
//!
//! assert_eq!(decode_str("?page=2&tags.0=a&tags.1=b", &schema).unwrap(), value);
//! ```

mod codec;
mod error;
mod format;
mod search_params;
mod tree;

pub use codec::{decode, decode_str, decoders, encode, encoders, EncodeOptions};
pub use error::ParamsError;
pub use format::{format_date, format_number, parse_date, parse_number};
pub use search_params::SearchParams;
pub use tree::{escape_segment, unescape_segment, ParamsTree};
