use std::collections::BTreeMap;
use std::sync::Arc;

use arbor_store::ChunkStore;
use arbor_types::Hash;
use arbor_values::{BatchConfig, BatchStore, Ref, Value, ValueStore};
use tracing::{debug, info};

use crate::commit::{is_commit_ref, Commit};
use crate::error::{DatasError, DatasResult};

/// How many times a dataset update re-reads the root after losing a CAS to
/// a write on another dataset.
pub const MAX_ROOT_RETRIES: usize = 16;

/// A versioned store of named datasets.
///
/// The store root addresses a map from dataset id to the ref of its head
/// commit. Every head change reads the root, checks the head the caller
/// expects, writes a new map and compare-and-swaps the root.
pub struct Database {
    values: Arc<ValueStore>,
}

impl Database {
    pub fn new(store: Arc<dyn ChunkStore>) -> Self {
        Self::with_config(store, BatchConfig::default())
    }

    pub fn with_config(store: Arc<dyn ChunkStore>, config: BatchConfig) -> Self {
        Self::from_values(Arc::new(ValueStore::new(store, config)))
    }

    pub fn from_values(values: Arc<ValueStore>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &Arc<ValueStore> {
        &self.values
    }

    pub fn batch(&self) -> &Arc<BatchStore> {
        self.values.batch()
    }

    pub fn is_local(&self) -> bool {
        self.values.is_local()
    }

    pub fn dataset(&self, id: impl Into<String>) -> Dataset<'_> {
        Dataset {
            db: self,
            id: id.into(),
        }
    }

    pub async fn read_value(&self, hash: &Hash) -> DatasResult<Option<Value>> {
        Ok(self.values.read_value(hash).await?)
    }

    pub async fn write_value(&self, value: &Value) -> DatasResult<Ref> {
        Ok(self.values.write_value(value).await?)
    }

    pub async fn flush(&self) -> DatasResult<()> {
        Ok(self.values.flush().await?)
    }

    async fn load_map(&self, root: &Hash) -> DatasResult<BTreeMap<String, Ref>> {
        if root.is_empty() {
            return Ok(BTreeMap::new());
        }
        let value = self
            .values
            .read_value(root)
            .await?
            .ok_or(DatasError::MissingChunk(*root))?;
        dataset_map(&value)
    }

    /// Every dataset and the ref of its head commit.
    pub async fn datasets(&self) -> DatasResult<BTreeMap<String, Ref>> {
        let root = self.values.root().await?;
        self.load_map(&root).await
    }

    pub async fn head_ref(&self, id: &str) -> DatasResult<Option<Ref>> {
        Ok(self.datasets().await?.remove(id))
    }

    pub async fn head(&self, id: &str) -> DatasResult<Option<Commit>> {
        match self.head_ref(id).await? {
            Some(r) => Ok(Some(self.read_commit(&r).await?)),
            None => Ok(None),
        }
    }

    pub async fn read_commit(&self, r: &Ref) -> DatasResult<Commit> {
        let value = self.values.read_ref(r).await?;
        Commit::from_value(&value)
    }

    /// Make `commit` the head of `id`.
    ///
    /// Fails with [`DatasError::Conflict`] unless the current head is
    /// `expected_parent`, and with [`DatasError::MergeNeeded`] if the commit
    /// does not list `expected_parent` among its parents.
    pub async fn commit(
        &self,
        id: &str,
        commit: Commit,
        expected_parent: Option<Ref>,
    ) -> DatasResult<Ref> {
        if let Some(parent) = &expected_parent {
            if !commit.has_parent(parent) {
                return Err(DatasError::MergeNeeded { dataset: id.to_string() });
            }
        }
        let commit_ref = self.values.write_value(&commit.to_value()?).await?;
        self.update_head(id, expected_parent, Some(commit_ref.clone())).await?;
        info!(dataset = id, head = %commit_ref, "committed");
        Ok(commit_ref)
    }

    /// Commit `value` on top of the current head of `id`.
    pub async fn commit_value(&self, id: &str, value: Value) -> DatasResult<Ref> {
        let head = self.head_ref(id).await?;
        let commit = Commit::new(value, head.clone());
        self.commit(id, commit, head).await
    }

    /// Point `id` at a commit that is already stored, for example one that
    /// was just pulled. Same head check as [`Database::commit`].
    pub async fn set_head(&self, id: &str, head: Ref, expected: Option<Ref>) -> DatasResult<()> {
        if !is_commit_ref(&head) {
            return Err(DatasError::NotACommit(format!("{head} is a {}", head.target_type())));
        }
        if !self.values.batch().has(&head.target()).await? {
            return Err(DatasError::MissingChunk(head.target()));
        }
        self.update_head(id, expected, Some(head)).await
    }

    /// Remove `id`. Same head check as [`Database::commit`].
    pub async fn delete(&self, id: &str, expected: Option<Ref>) -> DatasResult<()> {
        self.update_head(id, expected, None).await
    }

    async fn update_head(&self, id: &str, expected: Option<Ref>, new: Option<Ref>) -> DatasResult<()> {
        for attempt in 1..=MAX_ROOT_RETRIES {
            let root = self.values.root().await?;
            let mut map = self.load_map(&root).await?;
            let actual = map.get(id).cloned();
            if actual != expected {
                return Err(DatasError::Conflict {
                    dataset: id.to_string(),
                    expected,
                    actual,
                });
            }
            if actual == new {
                return Ok(());
            }
            match &new {
                Some(r) => map.insert(id.to_string(), r.clone()),
                None => map.remove(id),
            };

            let map_ref = self.values.write_value(&map_value(&map)?).await?;
            if self.values.update_root(root, map_ref.target()).await? {
                debug!(dataset = id, root = %map_ref.target().short_hex(), attempt, "root updated");
                return Ok(());
            }
            debug!(dataset = id, attempt, "root moved, retrying");
        }
        Err(DatasError::RootContention {
            dataset: id.to_string(),
            attempts: MAX_ROOT_RETRIES,
        })
    }
}

fn map_value(map: &BTreeMap<String, Ref>) -> DatasResult<Value> {
    Ok(Value::map(
        map.iter()
            .map(|(k, r)| (Value::string(k.as_str()), Value::Ref(r.clone()))),
    )?)
}

/// Interpret a root value as a dataset map: string keys, commit-ref values.
pub fn dataset_map(value: &Value) -> DatasResult<BTreeMap<String, Ref>> {
    let entries = value
        .map_entries()
        .ok_or_else(|| DatasError::InvalidRoot(format!("root is a {}, not a map", value.type_tag())))?;
    entries
        .iter()
        .map(|(k, v)| -> DatasResult<(String, Ref)> {
            let id = k
                .as_str()
                .ok_or_else(|| DatasError::InvalidRoot(format!("dataset id is a {}", k.type_tag())))?;
            match v.ref_value() {
                Some(r) if is_commit_ref(r) => Ok((id.to_string(), r.clone())),
                _ => Err(DatasError::InvalidRoot(format!("head of {id:?} is not a commit ref"))),
            }
        })
        .collect()
}

/// Check that `root` addresses a well-formed dataset map. The empty hash is
/// valid: it names a store with no datasets.
pub async fn validate_root(values: &ValueStore, root: &Hash) -> DatasResult<()> {
    if root.is_empty() {
        return Ok(());
    }
    let value = values
        .read_value(root)
        .await?
        .ok_or(DatasError::MissingChunk(*root))?;
    dataset_map(&value).map(|_| ())
}

/// A named dataset within a [`Database`].
pub struct Dataset<'a> {
    db: &'a Database,
    id: String,
}

impl Dataset<'_> {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn head_ref(&self) -> DatasResult<Option<Ref>> {
        self.db.head_ref(&self.id).await
    }

    pub async fn head(&self) -> DatasResult<Option<Commit>> {
        self.db.head(&self.id).await
    }

    pub async fn commit_value(&self, value: Value) -> DatasResult<Ref> {
        self.db.commit_value(&self.id, value).await
    }
}

#[cfg(test)]
mod tests {
    use arbor_store::MemoryStore;

    use super::*;

    fn db() -> Database {
        Database::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn new_database_is_empty() {
        let db = db();
        assert!(db.datasets().await.unwrap().is_empty());
        assert!(db.head("main").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn commit_value_builds_history() {
        let db = db();
        let first = db.commit_value("main", Value::from(1.0)).await.unwrap();
        let second = db.commit_value("main", Value::from(2.0)).await.unwrap();

        assert_eq!(db.head_ref("main").await.unwrap(), Some(second.clone()));
        let head = db.head("main").await.unwrap().unwrap();
        assert_eq!(head.value, Value::from(2.0));
        assert_eq!(head.parents, vec![first.clone()]);
        assert!(second.height() > first.height());
        assert_eq!(db.datasets().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stale_parent_conflicts() {
        let db = db();
        let first = db.commit_value("main", Value::from(1.0)).await.unwrap();
        db.commit_value("main", Value::from(2.0)).await.unwrap();

        let late = Commit::new(Value::from(3.0), [first.clone()]);
        let err = db.commit("main", late, Some(first)).await.unwrap_err();
        assert!(matches!(err, DatasError::Conflict { ref dataset, .. } if dataset == "main"));

        let orphan = Commit::new(Value::from(4.0), []);
        assert!(matches!(
            db.commit("main", orphan, None).await,
            Err(DatasError::Conflict { actual: Some(_), .. })
        ));
    }

    #[tokio::test]
    async fn commit_must_descend_from_expected_parent() {
        let db = db();
        let head = db.commit_value("main", Value::from(1.0)).await.unwrap();
        let unrelated = Commit::new(Value::from(2.0), []);
        assert!(matches!(
            db.commit("main", unrelated, Some(head)).await,
            Err(DatasError::MergeNeeded { .. })
        ));
    }

    #[tokio::test]
    async fn concurrent_commits_to_different_datasets_both_land() {
        let db = Arc::new(db());
        let (a, b) = tokio::join!(
            db.commit_value("a", Value::from("a")),
            db.commit_value("b", Value::from("b")),
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        let datasets = db.datasets().await.unwrap();
        assert_eq!(datasets.get("a"), Some(&a));
        assert_eq!(datasets.get("b"), Some(&b));
    }

    #[tokio::test]
    async fn set_head_requires_a_stored_commit() {
        let db = db();
        let leaf = db.write_value(&Value::from("not a commit")).await.unwrap();
        assert!(matches!(
            db.set_head("main", leaf, None).await,
            Err(DatasError::NotACommit(_))
        ));

        let phantom = Commit::new(Value::from(0.0), []).to_value().unwrap().to_ref().unwrap();
        assert!(matches!(
            db.set_head("main", phantom, None).await,
            Err(DatasError::MissingChunk(_))
        ));

        let other = db.commit_value("other", Value::from(5.0)).await.unwrap();
        db.set_head("main", other.clone(), None).await.unwrap();
        assert_eq!(db.head_ref("main").await.unwrap(), Some(other));
    }

    #[tokio::test]
    async fn delete_removes_dataset() {
        let db = db();
        let head = db.commit_value("tmp", Value::from(1.0)).await.unwrap();
        assert!(matches!(db.delete("tmp", None).await, Err(DatasError::Conflict { .. })));
        db.delete("tmp", Some(head)).await.unwrap();
        assert!(db.datasets().await.unwrap().is_empty());
        // Deleting an absent dataset is a no-op.
        db.delete("tmp", None).await.unwrap();
    }

    #[tokio::test]
    async fn validate_root_checks_shape() {
        let db = db();
        validate_root(db.values(), &Hash::empty()).await.unwrap();

        db.commit_value("main", Value::from(1.0)).await.unwrap();
        let root = db.values().root().await.unwrap();
        validate_root(db.values(), &root).await.unwrap();

        let not_map = db.write_value(&Value::from("x")).await.unwrap();
        let leaf = db.write_value(&Value::from(1.0)).await.unwrap();
        let bad_value = Value::map([(Value::from("main"), Value::Ref(leaf))]).unwrap();
        let bad_map = db.write_value(&bad_value).await.unwrap();
        db.flush().await.unwrap();

        assert!(matches!(
            validate_root(db.values(), &not_map.target()).await,
            Err(DatasError::InvalidRoot(_))
        ));
        assert!(matches!(
            validate_root(db.values(), &bad_map.target()).await,
            Err(DatasError::InvalidRoot(_))
        ));
        assert!(matches!(
            validate_root(db.values(), &Hash::of(b"absent")).await,
            Err(DatasError::MissingChunk(_))
        ));
    }

    #[tokio::test]
    async fn dataset_handle() {
        let db = db();
        let ds = db.dataset("main");
        assert_eq!(ds.id(), "main");
        assert!(ds.head_ref().await.unwrap().is_none());
        let r = ds.commit_value(Value::from("v")).await.unwrap();
        assert_eq!(ds.head_ref().await.unwrap(), Some(r));
        assert_eq!(ds.head().await.unwrap().unwrap().value, Value::from("v"));
    }
}
