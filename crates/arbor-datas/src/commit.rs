use arbor_values::{Ref, Value};

use crate::error::{DatasError, DatasResult};

/// Struct name of commit values.
pub const COMMIT_STRUCT: &str = "Commit";
/// Struct name of commit metadata.
pub const META_STRUCT: &str = "Meta";

/// Returns `true` if `r` points at a commit.
pub fn is_commit_ref(r: &Ref) -> bool {
    r.target_type().is_struct(COMMIT_STRUCT)
}

/// A point in a dataset's history.
///
/// Stored as the struct `Commit { meta, parents, value }`, where `parents`
/// is a set of refs to commits. A commit's ref height always exceeds its
/// parents' heights.
#[derive(Clone, Debug, PartialEq)]
pub struct Commit {
    pub value: Value,
    pub parents: Vec<Ref>,
    pub meta: Value,
}

impl Commit {
    pub fn new(value: Value, parents: impl IntoIterator<Item = Ref>) -> Self {
        Self {
            value,
            parents: parents.into_iter().collect(),
            meta: Value::new_struct(META_STRUCT, std::iter::empty::<(String, Value)>()),
        }
    }

    /// Replace the metadata with a `Meta` struct holding `fields`.
    pub fn with_meta<S: Into<String>>(mut self, fields: impl IntoIterator<Item = (S, Value)>) -> Self {
        self.meta = Value::new_struct(META_STRUCT, fields);
        self
    }

    pub fn has_parent(&self, r: &Ref) -> bool {
        self.parents.iter().any(|p| p.target() == r.target())
    }

    pub fn to_value(&self) -> DatasResult<Value> {
        let parents = Value::set(self.parents.iter().cloned().map(Value::Ref))?;
        Ok(Value::new_struct(
            COMMIT_STRUCT,
            [
                ("meta", self.meta.clone()),
                ("parents", parents),
                ("value", self.value.clone()),
            ],
        ))
    }

    pub fn from_value(value: &Value) -> DatasResult<Self> {
        if value.struct_name() != Some(COMMIT_STRUCT) {
            return Err(DatasError::NotACommit(format!("found {}", value.type_tag())));
        }
        let field = |name: &str| {
            value
                .field(name)
                .ok_or_else(|| DatasError::NotACommit(format!("missing field {name:?}")))
        };
        let parents = field("parents")?
            .set_items()
            .ok_or_else(|| DatasError::NotACommit("parents is not a set".into()))?
            .iter()
            .map(|p| match p.ref_value() {
                Some(r) if is_commit_ref(r) => Ok(r.clone()),
                _ => Err(DatasError::NotACommit("parent is not a commit ref".into())),
            })
            .collect::<DatasResult<Vec<_>>>()?;
        Ok(Self {
            value: field("value")?.clone(),
            parents,
            meta: field("meta")?.clone(),
        })
    }
}
