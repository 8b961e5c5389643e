#![allow(dead_code)]

use std::sync::Arc;

use arbor_datas::Database;
use arbor_server::{ArborServer, ServerConfig};
use arbor_store::{ChunkStore, CountingStore, MemoryStore};
use arbor_sync::RemoteStore;
use arbor_types::HashSet;
use arbor_values::{codec, Ref, Value};

/// One side of a pull: a database and the counted store holding its chunks.
/// For a remote side the store sits behind an in-process server.
pub struct Side {
    pub db: Database,
    pub counts: Arc<CountingStore<MemoryStore>>,
}

impl Side {
    pub fn local() -> Self {
        let counts = Arc::new(CountingStore::new(MemoryStore::new()));
        Self {
            db: Database::new(counts.clone()),
            counts,
        }
    }

    pub fn remote() -> Self {
        Self::remote_with(ServerConfig::default())
    }

    pub fn remote_with(config: ServerConfig) -> Self {
        let counts = Arc::new(CountingStore::new(MemoryStore::new()));
        let server = ArborServer::with_store(config, counts.clone());
        let remote = RemoteStore::new(Arc::new(server.transport()));
        Self {
            db: Database::new(Arc::new(remote)),
            counts,
        }
    }

    pub fn reads(&self) -> u64 {
        self.counts.reads()
    }

    pub fn store(&self) -> &MemoryStore {
        self.counts.inner()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Topology {
    LocalToLocal,
    RemoteToLocal,
    LocalToRemote,
    RemoteToRemote,
}

impl Topology {
    pub const ALL: [Topology; 4] = [
        Topology::LocalToLocal,
        Topology::RemoteToLocal,
        Topology::LocalToRemote,
        Topology::RemoteToRemote,
    ];

    /// `(source, sink)`.
    pub fn build(self) -> (Side, Side) {
        let side = |remote: bool| if remote { Side::remote() } else { Side::local() };
        match self {
            Topology::LocalToLocal => (side(false), side(false)),
            Topology::RemoteToLocal => (side(true), side(false)),
            Topology::LocalToRemote => (side(false), side(true)),
            Topology::RemoteToRemote => (side(true), side(true)),
        }
    }

    pub fn sink_is_local(self) -> bool {
        matches!(self, Topology::LocalToLocal | Topology::RemoteToLocal)
    }
}

/// A list `height` refs deep. Every level holds a ref to a fresh number and
/// a ref to the level below, so two calls build identical prefixes.
pub async fn list_of_height(height: usize, db: &Database) -> Value {
    let mut unique = 0.0;
    let mut l = Value::List(vec![Value::from(unique), Value::from(unique + 1.0)]);
    unique += 2.0;
    for _ in 0..height {
        let r1 = db.write_value(&Value::from(unique)).await.unwrap();
        let r2 = db.write_value(&l).await.unwrap();
        unique += 1.0;
        l = Value::List(vec![Value::Ref(r1), Value::Ref(r2)]);
    }
    l
}

/// Element `i` of a list value.
pub fn item(list: &Value, i: usize) -> Value {
    match list {
        Value::List(items) => items[i].clone(),
        other => panic!("not a list: {other:?}"),
    }
}

pub fn with_item(list: &Value, i: usize, v: Value) -> Value {
    match list {
        Value::List(items) => {
            let mut items = items.clone();
            items[i] = v;
            Value::List(items)
        }
        other => panic!("not a list: {other:?}"),
    }
}

pub fn appended(list: &Value, v: Value) -> Value {
    match list {
        Value::List(items) => {
            let mut items = items.clone();
            items.push(v);
            Value::List(items)
        }
        other => panic!("not a list: {other:?}"),
    }
}

pub async fn deref(db: &Database, v: &Value) -> Value {
    let r = v.ref_value().expect("not a ref");
    db.read_value(&r.target()).await.unwrap().unwrap()
}

/// Every chunk reachable from `r` is in `store`.
pub async fn assert_closed(store: &MemoryStore, r: &Ref) {
    let mut stack = vec![r.clone()];
    let mut seen = HashSet::new();
    while let Some(r) = stack.pop() {
        if !seen.insert(r.target()) {
            continue;
        }
        let chunk = store
            .get(&r.target())
            .await
            .unwrap()
            .unwrap_or_else(|| panic!("store lacks {r}"));
        stack.extend(codec::decode_chunk(&chunk).unwrap().refs());
    }
}
