use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

use arbor_store::StoreResult;
use arbor_types::Hash;
use tokio::sync::oneshot;

type Waiter<T> = oneshot::Sender<StoreResult<T>>;

struct Queue<T> {
    waiting: HashMap<Hash, Vec<Waiter<T>>>,
    leader: bool,
}

/// Merges concurrent single-hash lookups into batched round trips.
///
/// The first caller that finds no batch in flight leads: it yields once so
/// concurrent callers can queue behind it, then sends everything queued as
/// one request and repeats until the queue is empty. The others wait for
/// their answer. If a leader is dropped mid-flight its followers retry.
pub(crate) struct ReadBatcher<T> {
    queue: Mutex<Queue<T>>,
}

impl<T: Clone + Default> ReadBatcher<T> {
    pub(crate) fn new() -> Self {
        Self {
            queue: Mutex::new(Queue {
                waiting: HashMap::new(),
                leader: false,
            }),
        }
    }

    /// Look `hash` up through `fetch`, sharing the request with concurrent
    /// callers. Hashes missing from the fetched map answer `T::default()`.
    pub(crate) async fn lookup<F, Fut>(&self, hash: Hash, fetch: F) -> StoreResult<T>
    where
        F: Fn(Vec<Hash>) -> Fut,
        Fut: Future<Output = StoreResult<HashMap<Hash, T>>>,
    {
        loop {
            let (tx, rx) = oneshot::channel();
            let lead = {
                let mut queue = self.queue.lock().expect("lock poisoned");
                queue.waiting.entry(hash).or_default().push(tx);
                !std::mem::replace(&mut queue.leader, true)
            };
            if lead {
                let mut guard = Leadership {
                    queue: &self.queue,
                    active: true,
                };
                tokio::task::yield_now().await;
                self.drain(&fetch).await;
                guard.active = false;
            }
            if let Ok(answer) = rx.await {
                return answer;
            }
        }
    }

    async fn drain<F, Fut>(&self, fetch: &F)
    where
        F: Fn(Vec<Hash>) -> Fut,
        Fut: Future<Output = StoreResult<HashMap<Hash, T>>>,
    {
        loop {
            let batch = {
                let mut queue = self.queue.lock().expect("lock poisoned");
                if queue.waiting.is_empty() {
                    queue.leader = false;
                    return;
                }
                std::mem::take(&mut queue.waiting)
            };
            let hashes: Vec<Hash> = batch.keys().copied().collect();
            let result = fetch(hashes).await;
            for (hash, waiters) in batch {
                let answer = match &result {
                    Ok(found) => Ok(found.get(&hash).cloned().unwrap_or_default()),
                    Err(e) => Err(e.clone()),
                };
                for waiter in waiters {
                    let _ = waiter.send(answer.clone());
                }
            }
        }
    }
}

/// Hands leadership back if the leading future is dropped before it drains
/// the queue. Dropping the queued senders wakes the followers.
struct Leadership<'a, T> {
    queue: &'a Mutex<Queue<T>>,
    active: bool,
}

impl<T> Drop for Leadership<'_, T> {
    fn drop(&mut self) {
        if self.active {
            let mut queue = self.queue.lock().expect("lock poisoned");
            queue.leader = false;
            queue.waiting.clear();
        }
    }
}
