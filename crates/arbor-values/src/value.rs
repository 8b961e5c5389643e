use std::collections::BTreeMap;
use std::fmt;

use arbor_types::Hash;
use serde::{Deserialize, Serialize};

use crate::codec;
use crate::error::ValueResult;

/// The kind of value a [`Ref`] points at.
///
/// Structs carry their name so that, for example, a ref to a commit can be
/// recognised without reading the commit.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TypeTag {
    Bool,
    Number,
    String,
    Blob,
    List,
    Map,
    Set,
    Ref,
    Struct(String),
}

impl TypeTag {
    /// Returns `true` if this is a struct with the given name.
    pub fn is_struct(&self, name: &str) -> bool {
        matches!(self, Self::Struct(n) if n == name)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Struct(name) => write!(f, "Struct<{name}>"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// A typed pointer to another value, addressed by the hash of its chunk.
///
/// `height` is 1 plus the greatest height among the refs nested in the
/// pointee, or 1 if the pointee contains no refs. Height strictly decreases
/// along every chain of refs.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Ref {
    height: u64,
    target: Hash,
    target_type: TypeTag,
}

impl Ref {
    pub fn new(target: Hash, height: u64, target_type: TypeTag) -> Self {
        Self {
            height,
            target,
            target_type,
        }
    }

    pub fn target(&self) -> Hash {
        self.target
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn target_type(&self) -> &TypeTag {
        &self.target_type
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.target.short_hex(), self.height, self.target_type)
    }
}

/// A typed, immutable value.
///
/// Map and Set contents are kept in canonical order (ascending by the hash of
/// the key or element) with no duplicates, and Struct fields are sorted by
/// name, so equal values always encode to identical bytes. Build collections
/// through [`Value::map`], [`Value::set`] and [`Value::new_struct`] to get
/// canonical values; [`codec::decode`] rejects anything else.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Number(f64),
    String(String),
    Blob(Vec<u8>),
    List(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Set(Vec<Value>),
    Struct {
        name: String,
        fields: Vec<(String, Value)>,
    },
    Ref(Ref),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Self::String(s.into())
    }

    pub fn blob(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Blob(bytes.into())
    }

    /// Build a canonical map. On duplicate keys the last entry wins.
    pub fn map(entries: impl IntoIterator<Item = (Value, Value)>) -> ValueResult<Self> {
        let mut sorted = BTreeMap::new();
        for (k, v) in entries {
            sorted.insert(codec::hash_of(&k)?, (k, v));
        }
        Ok(Self::Map(sorted.into_values().collect()))
    }

    /// Build a canonical set.
    pub fn set(items: impl IntoIterator<Item = Value>) -> ValueResult<Self> {
        let mut sorted = BTreeMap::new();
        for item in items {
            sorted.insert(codec::hash_of(&item)?, item);
        }
        Ok(Self::Set(sorted.into_values().collect()))
    }

    /// Build a struct with fields sorted by name. On duplicate names the last
    /// field wins.
    pub fn new_struct<S: Into<String>>(
        name: impl Into<String>,
        fields: impl IntoIterator<Item = (S, Value)>,
    ) -> Self {
        let fields: BTreeMap<String, Value> =
            fields.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Self::Struct {
            name: name.into(),
            fields: fields.into_iter().collect(),
        }
    }

    pub fn type_tag(&self) -> TypeTag {
        match self {
            Self::Bool(_) => TypeTag::Bool,
            Self::Number(_) => TypeTag::Number,
            Self::String(_) => TypeTag::String,
            Self::Blob(_) => TypeTag::Blob,
            Self::List(_) => TypeTag::List,
            Self::Map(_) => TypeTag::Map,
            Self::Set(_) => TypeTag::Set,
            Self::Struct { name, .. } => TypeTag::Struct(name.clone()),
            Self::Ref(_) => TypeTag::Ref,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Self::Blob(b) => Some(b),
            _ => None,
        }
    }

    pub fn ref_value(&self) -> Option<&Ref> {
        match self {
            Self::Ref(r) => Some(r),
            _ => None,
        }
    }

    pub fn map_entries(&self) -> Option<&[(Value, Value)]> {
        match self {
            Self::Map(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn set_items(&self) -> Option<&[Value]> {
        match self {
            Self::Set(items) => Some(items),
            _ => None,
        }
    }

    /// Look up a map entry by key.
    pub fn map_get(&self, key: &Value) -> Option<&Value> {
        self.map_entries()?
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// The name of a struct value.
    pub fn struct_name(&self) -> Option<&str> {
        match self {
            Self::Struct { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Look up a struct field by name.
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Self::Struct { fields, .. } => fields
                .binary_search_by(|(n, _)| n.as_str().cmp(name))
                .ok()
                .map(|i| &fields[i].1),
            _ => None,
        }
    }

    /// Every ref directly contained in this value, without following refs.
    pub fn refs(&self) -> Vec<Ref> {
        let mut out = Vec::new();
        self.collect_refs(&mut out);
        out
    }

    fn collect_refs(&self, out: &mut Vec<Ref>) {
        match self {
            Self::Ref(r) => out.push(r.clone()),
            Self::List(items) | Self::Set(items) => {
                items.iter().for_each(|v| v.collect_refs(out));
            }
            Self::Map(entries) => {
                for (k, v) in entries {
                    k.collect_refs(out);
                    v.collect_refs(out);
                }
            }
            Self::Struct { fields, .. } => {
                fields.iter().for_each(|(_, v)| v.collect_refs(out));
            }
            Self::Bool(_) | Self::Number(_) | Self::String(_) | Self::Blob(_) => {}
        }
    }

    /// Height of a ref pointing at this value.
    pub fn ref_height(&self) -> u64 {
        1 + self.refs().iter().map(Ref::height).max().unwrap_or(0)
    }

    /// A ref addressing this value's encoded chunk.
    pub fn to_ref(&self) -> ValueResult<Ref> {
        Ok(Ref::new(codec::hash_of(self)?, self.ref_height(), self.type_tag()))
    }

    /// Whether every collection in this value is in canonical order.
    pub fn is_canonical(&self) -> ValueResult<bool> {
        match self {
            Self::List(items) => all_canonical(items.iter()),
            Self::Set(items) => {
                if !strictly_ascending(items.iter())? {
                    return Ok(false);
                }
                all_canonical(items.iter())
            }
            Self::Map(entries) => {
                if !strictly_ascending(entries.iter().map(|(k, _)| k))? {
                    return Ok(false);
                }
                all_canonical(entries.iter().flat_map(|(k, v)| [k, v]))
            }
            Self::Struct { fields, .. } => {
                if fields.windows(2).any(|w| w[0].0 >= w[1].0) {
                    return Ok(false);
                }
                all_canonical(fields.iter().map(|(_, v)| v))
            }
            Self::Bool(_) | Self::Number(_) | Self::String(_) | Self::Blob(_) | Self::Ref(_) => {
                Ok(true)
            }
        }
    }
}

fn strictly_ascending<'a>(values: impl Iterator<Item = &'a Value>) -> ValueResult<bool> {
    let mut prev: Option<Hash> = None;
    for v in values {
        let h = codec::hash_of(v)?;
        if prev.is_some_and(|p| p >= h) {
            return Ok(false);
        }
        prev = Some(h);
    }
    Ok(true)
}

fn all_canonical<'a>(values: impl Iterator<Item = &'a Value>) -> ValueResult<bool> {
    for v in values {
        if !v.is_canonical()? {
            return Ok(false);
        }
    }
    Ok(true)
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Ref> for Value {
    fn from(r: Ref) -> Self {
        Self::Ref(r)
    }
}
