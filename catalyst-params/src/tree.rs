//! The string-leaved intermediate tree and its dotted-key flattening.

use std::collections::HashSet;
use std::rc::Rc;

use indexmap::IndexMap;
use log::debug;

use catalyst_core::Value;

use crate::error::{display_path, ParamsError};
use crate::format::scalar_string;
use crate::search_params::SearchParams;

const SEPARATOR: char = '.';

/// A document whose leaves are strings, one step away from query pairs.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamsTree {
    Leaf(String),
    Undefined,
    List(Vec<ParamsTree>),
    Node(IndexMap<String, ParamsTree>),
}

impl ParamsTree {
    /// Builds a tree from a value, stringifying scalars.
    ///
    /// Undefined object properties are kept as [`ParamsTree::Undefined`] and
    /// vanish when flattened; undefined array items become the literal
    /// `"undefined"` so later indices keep their position. With
    /// `track_identity`, reaching a container a second time is an error.
    pub fn from_value(value: &Value, track_identity: bool) -> Result<Self, ParamsError> {
        let mut builder = Builder {
            seen: track_identity.then(HashSet::new),
            path: Vec::new(),
        };
        builder.build(value)
    }

    /// Writes every leaf as a `a.b.0=value` pair.
    ///
    /// The root must be a node or a list; an undefined root writes nothing.
    pub fn flatten(&self) -> Result<SearchParams, ParamsError> {
        let mut params = SearchParams::new();
        match self {
            ParamsTree::Undefined => {}
            ParamsTree::Leaf(_) => return Err(ParamsError::RootNotContainer),
            ParamsTree::List(_) | ParamsTree::Node(_) => {
                let mut prefix = Vec::new();
                self.flatten_into(&mut prefix, &mut params);
            }
        }
        Ok(params)
    }

    fn flatten_into(&self, prefix: &mut Vec<String>, params: &mut SearchParams) {
        match self {
            ParamsTree::Undefined => {}
            ParamsTree::Leaf(s) => params.append(prefix.join("."), s.as_str()),
            ParamsTree::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    prefix.push(i.to_string());
                    item.flatten_into(prefix, params);
                    prefix.pop();
                }
            }
            ParamsTree::Node(entries) => {
                for (key, child) in entries {
                    prefix.push(escape_segment(key));
                    child.flatten_into(prefix, params);
                    prefix.pop();
                }
            }
        }
    }

    /// Rebuilds a tree from dotted keys. Lists are never produced: numeric
    /// segments stay object keys.
    ///
    /// When a key addresses both a leaf and a node, the later pair wins.
    pub fn unflatten(params: &SearchParams) -> Self {
        let mut root = IndexMap::new();
        for (key, value) in params.iter() {
            let segments: Vec<String> = key.split(SEPARATOR).map(unescape_segment).collect();
            insert(&mut root, &segments, value);
        }
        ParamsTree::Node(root)
    }

    /// The shape this tree takes after a flatten/unflatten round trip:
    /// lists become index-keyed nodes, and undefined entries and empty
    /// containers are gone.
    pub fn normalized(&self) -> Option<ParamsTree> {
        let entries: IndexMap<String, ParamsTree> = match self {
            ParamsTree::Undefined => return None,
            ParamsTree::Leaf(s) => return Some(ParamsTree::Leaf(s.clone())),
            ParamsTree::List(items) => items
                .iter()
                .enumerate()
                .filter_map(|(i, item)| Some((i.to_string(), item.normalized()?)))
                .collect(),
            ParamsTree::Node(entries) => entries
                .iter()
                .filter_map(|(k, child)| Some((k.clone(), child.normalized()?)))
                .collect(),
        };
        (!entries.is_empty()).then_some(ParamsTree::Node(entries))
    }

    pub fn into_value(self) -> Value {
        match self {
            ParamsTree::Leaf(s) => Value::String(s),
            ParamsTree::Undefined => Value::Undefined,
            ParamsTree::List(items) => Value::array(items.into_iter().map(ParamsTree::into_value)),
            ParamsTree::Node(entries) => Value::object(
                entries
                    .into_iter()
                    .map(|(k, child)| (k, child.into_value())),
            ),
        }
    }
}

fn insert(node: &mut IndexMap<String, ParamsTree>, segments: &[String], value: &str) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        if let Some(ParamsTree::Node(_)) = node.get(head) {
            debug!("leaf at {head:?} replaces nested parameters");
        }
        node.insert(head.clone(), ParamsTree::Leaf(value.to_string()));
        return;
    }
    let child = node
        .entry(head.clone())
        .or_insert_with(|| ParamsTree::Node(IndexMap::new()));
    if !matches!(child, ParamsTree::Node(_)) {
        debug!("nested parameters at {head:?} replace a leaf");
        *child = ParamsTree::Node(IndexMap::new());
    }
    if let ParamsTree::Node(entries) = child {
        insert(entries, rest, value);
    }
}

/// Escapes a key segment so it cannot contain the separator.
pub fn escape_segment(segment: &str) -> String {
    segment.replace('%', "%25").replace(SEPARATOR, "%2e")
}

pub fn unescape_segment(segment: &str) -> String {
    match urlencoding::decode(segment) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => {
            debug!("segment {segment:?} is not valid percent-encoded UTF-8; keeping it verbatim");
            segment.to_string()
        }
    }
}

struct Builder {
    seen: Option<HashSet<*const ()>>,
    path: Vec<String>,
}

impl Builder {
    fn build(&mut self, value: &Value) -> Result<ParamsTree, ParamsError> {
        self.visit(value)?;
        Ok(match value {
            Value::Undefined => ParamsTree::Undefined,
            Value::Array(items) | Value::Set(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    self.path.push(i.to_string());
                    out.push(match item {
                        Value::Undefined => ParamsTree::Leaf("undefined".to_string()),
                        _ => self.build(item)?,
                    });
                    self.path.pop();
                }
                ParamsTree::List(out)
            }
            Value::Object(map) => {
                let mut out = IndexMap::with_capacity(map.len());
                for (key, child) in map.iter() {
                    self.path.push(key.clone());
                    out.insert(key.clone(), self.build(child)?);
                    self.path.pop();
                }
                ParamsTree::Node(out)
            }
            Value::Map(entries) => {
                let mut out = IndexMap::with_capacity(entries.len());
                for (key, child) in entries.iter() {
                    let Some(key) = scalar_string(key) else {
                        return Err(self.unsupported(key));
                    };
                    self.path.push(key.clone());
                    out.insert(key, self.build(child)?);
                    self.path.pop();
                }
                ParamsTree::Node(out)
            }
            Value::Instance(_) => return Err(self.unsupported(value)),
            scalar => match scalar_string(scalar) {
                Some(s) => ParamsTree::Leaf(s),
                None => return Err(self.unsupported(scalar)),
            },
        })
    }

    fn visit(&mut self, value: &Value) -> Result<(), ParamsError> {
        let Some(seen) = self.seen.as_mut() else {
            return Ok(());
        };
        let ptr = match value {
            Value::Array(items) | Value::Set(items) => Rc::as_ptr(items) as *const (),
            Value::Object(map) => Rc::as_ptr(map) as *const (),
            Value::Map(entries) => Rc::as_ptr(entries) as *const (),
            _ => return Ok(()),
        };
        if seen.insert(ptr) {
            Ok(())
        } else {
            Err(ParamsError::Cycle {
                path: display_path(&self.path),
            })
        }
    }

    fn unsupported(&self, value: &Value) -> ParamsError {
        ParamsError::Unsupported {
            path: display_path(&self.path),
            kind: value.type_name(),
        }
    }
}
