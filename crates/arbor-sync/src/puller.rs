use std::collections::HashMap;

use arbor_datas::{is_commit_ref, Commit, Database};
use arbor_types::{Hash, HashSet};
use arbor_values::{codec, Ref, Value};
use futures::stream::{self, StreamExt, TryStreamExt};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

use crate::error::{SyncError, SyncResult};
use crate::queue::RefQueue;

/// Receives a [`PullProgress`] after every completed unit of work.
pub type ProgressSender = UnboundedSender<PullProgress>;

/// Running totals of a pull in flight.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PullProgress {
    pub done_count: u64,
    /// Completed plus currently known outstanding work.
    pub known_count: u64,
    pub done_bytes: u64,
}

/// Summary of a finished pull.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PullReport {
    pub chunks_copied: u64,
    pub bytes_copied: u64,
    pub source_work: u64,
    pub sink_work: u64,
    pub common_work: u64,
    /// Hints handed to the sink for chunks it already held.
    pub hints: usize,
}

impl PullReport {
    /// Returns `true` if the pull found nothing to do.
    pub fn is_noop(&self) -> bool {
        self.source_work + self.sink_work + self.common_work == 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WorkKind {
    Source,
    Sink,
    Common,
}

#[derive(Debug)]
struct Work {
    kind: WorkKind,
    r: Ref,
}

struct Traversed {
    kind: WorkKind,
    read_hash: Hash,
    reachables: Vec<Ref>,
    /// Bytes of the chunk copied to the sink, if one was.
    copied: Option<usize>,
}

/// Split off the next round of work: everything at the greatest height
/// present in either queue. Refs at that height in both queues are common.
fn plan_work(src_q: &mut RefQueue, sink_q: &mut RefQueue) -> Vec<Work> {
    let src_height = src_q.max_height();
    let sink_height = sink_q.max_height();
    let tag = |kind| move |r| Work { kind, r };

    if src_height > sink_height {
        return src_q.pop_tallest().into_iter().map(tag(WorkKind::Source)).collect();
    }
    if sink_height > src_height {
        return sink_q.pop_tallest().into_iter().map(tag(WorkKind::Sink)).collect();
    }

    let srcs = src_q.pop_tallest();
    let sinks = sink_q.pop_tallest();
    let mut work = Vec::with_capacity(srcs.len() + sinks.len());
    for r in &srcs {
        let kind = if sinks.contains(r) { WorkKind::Common } else { WorkKind::Source };
        work.push(Work { kind, r: r.clone() });
    }
    for r in sinks {
        if !srcs.contains(&r) {
            work.push(Work { kind: WorkKind::Sink, r });
        }
    }
    work
}

struct Walk<'a> {
    source: &'a Database,
    sink: &'a Database,
    most_local: &'a Database,
    sink_head: Option<Hash>,
}

impl Walk<'_> {
    async fn run(&self, work: Work) -> SyncResult<Traversed> {
        match work.kind {
            WorkKind::Source => self.traverse_source(work.r).await,
            WorkKind::Sink => self.traverse_sink(work.r).await,
            WorkKind::Common => self.traverse_common(work.r).await,
        }
    }

    /// Copy a chunk the sink lacks and return its children.
    async fn traverse_source(&self, r: Ref) -> SyncResult<Traversed> {
        let hash = r.target();
        let mut done = Traversed {
            kind: WorkKind::Source,
            read_hash: hash,
            reachables: Vec::new(),
            copied: None,
        };
        if self.sink.batch().has(&hash).await? {
            return Ok(done);
        }
        let chunk = self
            .source
            .batch()
            .get(&hash)
            .await?
            .ok_or(SyncError::MissingChunk(hash))?;
        let value = codec::decode_chunk(&chunk)?;
        done.copied = Some(chunk.len());
        done.reachables = value.refs();
        self.sink
            .batch()
            .schedule_put(chunk, r.height(), &HashSet::new())
            .await?;
        Ok(done)
    }

    async fn traverse_sink(&self, r: Ref) -> SyncResult<Traversed> {
        let reachables = if r.height() > 1 {
            self.read_most_local(&r).await?.refs()
        } else {
            Vec::new()
        };
        Ok(Traversed {
            kind: WorkKind::Sink,
            read_hash: r.target(),
            reachables,
            copied: None,
        })
    }

    /// Only commits are expanded: below a shared commit everything is
    /// shared. The sink head's parents are not followed.
    async fn traverse_common(&self, r: Ref) -> SyncResult<Traversed> {
        let mut reachables = Vec::new();
        if r.height() > 1 && is_commit_ref(&r) {
            let value = self.read_most_local(&r).await?;
            let excluded: Vec<Hash> = if self.sink_head == Some(r.target()) {
                Commit::from_value(&value)?
                    .parents
                    .iter()
                    .map(Ref::target)
                    .collect()
            } else {
                Vec::new()
            };
            reachables = value
                .refs()
                .into_iter()
                .filter(|c| !excluded.contains(&c.target()))
                .collect();
        }
        Ok(Traversed {
            kind: WorkKind::Common,
            read_hash: r.target(),
            reachables,
            copied: None,
        })
    }

    async fn read_most_local(&self, r: &Ref) -> SyncResult<Value> {
        self.most_local
            .read_value(&r.target())
            .await?
            .ok_or(SyncError::MissingChunk(r.target()))
    }
}

/// Copy everything reachable from `source_ref` that `sink` lacks.
///
/// Walks the source and sink graphs together, tallest refs first, so that
/// the walk stops descending wherever the two histories meet. Chunks are
/// scheduled on the sink's batch layer top-down and reach its store
/// bottom-up on flush. No root or dataset is touched.
///
/// `sink_head` is the sink's current head for the dataset being pulled,
/// if any. Reads of data both sides hold go to the sink when it is local,
/// otherwise to the source.
pub async fn pull(
    source: &Database,
    sink: &Database,
    source_ref: &Ref,
    sink_head: Option<&Ref>,
    concurrency: usize,
    progress: Option<ProgressSender>,
) -> SyncResult<PullReport> {
    let mut report = PullReport::default();
    if sink.batch().has(&source_ref.target()).await? {
        debug!(source_ref = %source_ref, "sink already holds source ref");
        return Ok(report);
    }

    let mut src_q: RefQueue = [source_ref.clone()].into_iter().collect();
    let mut sink_q = RefQueue::new();
    if let Some(head) = sink_head {
        if source.batch().has(&head.target()).await? {
            sink_q.push(head.clone());
        } else {
            debug!(sink_head = %head, "source lacks sink head, copying without common history");
        }
    }

    let walk = Walk {
        source,
        sink,
        most_local: if sink.is_local() { sink } else { source },
        sink_head: sink_head.map(Ref::target),
    };
    let concurrency = concurrency.max(1);
    let mut reachable = HashSet::new();
    let mut hint_cache: HashMap<Hash, Hash> = HashMap::new();
    let mut done = PullProgress::default();

    while !src_q.is_empty() {
        let round = plan_work(&mut src_q, &mut sink_q);
        let mut outstanding = round.len() as u64;
        let mut results = stream::iter(round)
            .map(|w| walk.run(w))
            .buffer_unordered(concurrency);

        while let Some(res) = results.try_next().await? {
            outstanding -= 1;
            match res.kind {
                WorkKind::Source => {
                    report.source_work += 1;
                    for r in res.reachables {
                        reachable.insert(r.target());
                        src_q.push(r);
                    }
                    if let Some(bytes) = res.copied {
                        reachable.remove(&res.read_hash);
                        report.chunks_copied += 1;
                        report.bytes_copied += bytes as u64;
                        done.done_bytes += bytes as u64;
                    }
                }
                WorkKind::Sink => {
                    report.sink_work += 1;
                    for r in res.reachables {
                        hint_cache.insert(r.target(), res.read_hash);
                        sink_q.push(r);
                    }
                }
                WorkKind::Common => {
                    report.common_work += 1;
                    let from_sink_head = walk.sink_head == Some(res.read_hash);
                    for r in res.reachables {
                        hint_cache.insert(r.target(), res.read_hash);
                        if !from_sink_head {
                            src_q.push(r.clone());
                        }
                        sink_q.push(r);
                    }
                }
            }

            done.done_count += 1;
            done.known_count =
                done.done_count + outstanding + (src_q.len() + sink_q.len()) as u64;
            if let Some(tx) = &progress {
                // A dropped receiver only means nobody is watching.
                let _ = tx.send(done);
            }
        }
    }

    let hints: HashSet = reachable
        .iter()
        .filter_map(|h| hint_cache.get(h).copied())
        .collect();
    report.hints = hints.len();
    sink.batch().add_hints(hints).await;

    info!(
        copied = report.chunks_copied,
        bytes = report.bytes_copied,
        source_work = report.source_work,
        sink_work = report.sink_work,
        common_work = report.common_work,
        hints = report.hints,
        "pull complete"
    );
    Ok(report)
}

/// Pull `source_ref` into `sink`, flush, and point the sink's `dataset` at
/// it. The sink head read before the pull is the expected head, so a
/// concurrent change to the dataset surfaces as a conflict.
pub async fn pull_dataset(
    source: &Database,
    sink: &Database,
    source_ref: &Ref,
    dataset: &str,
    concurrency: usize,
) -> SyncResult<PullReport> {
    let sink_head = sink.head_ref(dataset).await?;
    let report = pull(source, sink, source_ref, sink_head.as_ref(), concurrency, None).await?;
    sink.flush().await?;
    if sink_head.as_ref() != Some(source_ref) {
        sink.set_head(dataset, source_ref.clone(), sink_head).await?;
    }
    Ok(report)
}
