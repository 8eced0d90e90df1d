//! gNMI wire messages.
//!
//! These are hand-annotated prost messages rather than build-script output;
//! the field tags match the upstream `gnmi.proto` for the fields we carry, so
//! the encoding stays compatible with standard gNMI peers. Deprecated and
//! unused fields of the upstream schema are omitted.

use std::collections::HashMap;
use std::fmt;

/// A path through the state tree, rooted at the target's origin.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Path {
    #[prost(string, tag = "2")]
    pub origin: String,
    #[prost(message, repeated, tag = "3")]
    pub elem: Vec<PathElem>,
    #[prost(string, tag = "4")]
    pub target: String,
}

/// One element of a [`Path`], optionally keyed for list entries.
#[derive(Clone, PartialEq, prost::Message)]
pub struct PathElem {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(map = "string, string", tag = "2")]
    pub key: HashMap<String, String>,
}

/// A value at a leaf of the state tree.
#[derive(Clone, PartialEq, prost::Message)]
pub struct TypedValue {
    #[prost(oneof = "typed_value::Value", tags = "1, 2, 3, 4, 5, 10, 11")]
    pub value: Option<typed_value::Value>,
}

pub mod typed_value {
    /// The set of value encodings a [`super::TypedValue`] can carry.
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Value {
        #[prost(string, tag = "1")]
        StringVal(String),
        #[prost(int64, tag = "2")]
        IntVal(i64),
        #[prost(uint64, tag = "3")]
        UintVal(u64),
        #[prost(bool, tag = "4")]
        BoolVal(bool),
        #[prost(bytes, tag = "5")]
        BytesVal(Vec<u8>),
        #[prost(bytes, tag = "10")]
        JsonVal(Vec<u8>),
        #[prost(bytes, tag = "11")]
        JsonIetfVal(Vec<u8>),
    }
}

/// A new value for a single path.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Update {
    #[prost(message, optional, tag = "1")]
    pub path: Option<Path>,
    #[prost(message, optional, tag = "3")]
    pub val: Option<TypedValue>,
}

/// A timestamped batch of updates and deletes sharing a prefix.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Notification {
    #[prost(int64, tag = "1")]
    pub timestamp: i64,
    #[prost(message, optional, tag = "2")]
    pub prefix: Option<Path>,
    #[prost(message, repeated, tag = "4")]
    pub update: Vec<Update>,
    #[prost(message, repeated, tag = "5")]
    pub delete: Vec<Path>,
}

/// Request to change state on the target: deletions are applied first,
/// then replacements, then updates.
#[derive(Clone, PartialEq, prost::Message)]
pub struct SetRequest {
    #[prost(message, optional, tag = "1")]
    pub prefix: Option<Path>,
    #[prost(message, repeated, tag = "2")]
    pub delete: Vec<Path>,
    #[prost(message, repeated, tag = "3")]
    pub replace: Vec<Update>,
    #[prost(message, repeated, tag = "4")]
    pub update: Vec<Update>,
}

/// Per-operation result of a [`SetRequest`].
#[derive(Clone, PartialEq, prost::Message)]
pub struct UpdateResult {
    #[prost(message, optional, tag = "2")]
    pub path: Option<Path>,
    #[prost(enumeration = "UpdateOperation", tag = "4")]
    pub op: i32,
}

/// The operation an [`UpdateResult`] reports on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum UpdateOperation {
    Invalid = 0,
    Delete = 1,
    Replace = 2,
    Update = 3,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SetResponse {
    #[prost(message, optional, tag = "1")]
    pub prefix: Option<Path>,
    #[prost(message, repeated, tag = "2")]
    pub response: Vec<UpdateResult>,
    #[prost(int64, tag = "4")]
    pub timestamp: i64,
}

/// Request for a snapshot of state under the given paths.
#[derive(Clone, PartialEq, prost::Message)]
pub struct GetRequest {
    #[prost(message, optional, tag = "1")]
    pub prefix: Option<Path>,
    #[prost(message, repeated, tag = "2")]
    pub path: Vec<Path>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct GetResponse {
    #[prost(message, repeated, tag = "1")]
    pub notification: Vec<Notification>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CapabilityRequest {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CapabilityResponse {
    #[prost(string, tag = "3")]
    pub gnmi_version: String,
}

impl Path {
    /// Builds a keyless path from element names, e.g.
    /// `Path::from_elements(["interfaces", "interface"])`.
    pub fn from_elements<I, S>(elements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Path {
            elem: elements
                .into_iter()
                .map(|name| PathElem {
                    name: name.into(),
                    key: HashMap::new(),
                })
                .collect(),
            ..Default::default()
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for elem in &self.elem {
            write!(f, "/{}", elem.name)?;
            // Render list keys in the conventional bracketed form.
            let mut keys: Vec<_> = elem.key.iter().collect();
            keys.sort();
            for (k, v) in keys {
                write!(f, "[{}={}]", k, v)?;
            }
        }
        Ok(())
    }
}

impl TypedValue {
    pub fn string(value: impl Into<String>) -> Self {
        TypedValue {
            value: Some(typed_value::Value::StringVal(value.into())),
        }
    }

    pub fn uint(value: u64) -> Self {
        TypedValue {
            value: Some(typed_value::Value::UintVal(value)),
        }
    }
}

impl Update {
    pub fn new(path: Path, val: TypedValue) -> Self {
        Update {
            path: Some(path),
            val: Some(val),
        }
    }
}
