//! Windowed equi-join operator handlers (spec §4.4). The build side uses
//! paged vectors to avoid the cost of a growing `Vec`'s reallocation and
//! copy under heavy ingest; several concurrency strategies are offered for
//! the shared build-side map depending on how the query plan pins stages to
//! worker threads.

use crate::operators::window::WindowSpec;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

const PAGE_SIZE: usize = 1024;

/// An append-only vector of fixed-size pages. Appending never moves
/// previously-pushed elements, so a probe holding a reference into one page
/// is never invalidated by a later insert on another page.
#[derive(Debug, Default)]
pub struct PagedVec<T> {
    pages: Vec<Vec<T>>,
    len: usize,
}

impl<T> PagedVec<T> {
    pub fn new() -> Self {
        Self { pages: Vec::new(), len: 0 }
    }

    pub fn push(&mut self, value: T) {
        if self.pages.last().map(|p| p.len() == PAGE_SIZE).unwrap_or(true) {
            self.pages.push(Vec::with_capacity(PAGE_SIZE));
        }
        self.pages.last_mut().unwrap().push(value);
        self.len += 1;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.pages.iter().flat_map(|page| page.iter())
    }
}

/// One row on a join's build side: the event time used to assign it to a
/// window, plus the caller-supplied payload (typically an offset into a
/// retained [`crate::buffer::TupleBuffer`]).
#[derive(Debug, Clone)]
pub struct JoinRow<V> {
    pub event_time: u64,
    pub value: V,
}

/// A completed match: one row from each side plus the window it was
/// produced for.
#[derive(Debug, Clone)]
pub struct JoinResult<K, L, R> {
    pub window_start: u64,
    pub window_end: u64,
    pub key: K,
    pub left: L,
    pub right: R,
}

/// Build side for one window, keyed by join key. Thread-confined: used when
/// the query plan pins a join stage to a single worker so no internal
/// synchronization is needed (spec §4.4 "HashJoinLocal").
pub struct HashJoinLocal<K, L, R> {
    spec: WindowSpec,
    left: HashMap<(u64, K), PagedVec<JoinRow<L>>>,
    right: HashMap<(u64, K), PagedVec<JoinRow<R>>>,
    watermarks: HashMap<u64, u64>,
    current_watermark: u64,
    next_window_index: u64,
}

impl<K: Eq + Hash + Clone, L: Clone, R: Clone> HashJoinLocal<K, L, R> {
    pub fn new(spec: WindowSpec) -> Self {
        Self {
            spec,
            left: HashMap::new(),
            right: HashMap::new(),
            watermarks: HashMap::new(),
            current_watermark: 0,
            next_window_index: 0,
        }
    }

    fn window_start_for(&self, t: u64) -> u64 {
        (t / self.spec.slide) * self.spec.slide
    }

    pub fn insert_left(&mut self, key: K, event_time: u64, value: L) {
        let start = self.window_start_for(event_time);
        self.left.entry((start, key)).or_default().push(JoinRow { event_time, value });
    }

    pub fn insert_right(&mut self, key: K, event_time: u64, value: R) {
        let start = self.window_start_for(event_time);
        self.right.entry((start, key)).or_default().push(JoinRow { event_time, value });
    }

    pub fn advance_watermark(&mut self, origin: u64, watermark: u64) -> Vec<JoinResult<K, L, R>> {
        let entry = self.watermarks.entry(origin).or_insert(0);
        if watermark > *entry {
            *entry = watermark;
        }
        self.current_watermark = self.watermarks.values().copied().min().unwrap_or(0);

        let mut results = Vec::new();
        loop {
            let window_start = self.next_window_index * self.spec.slide;
            let window_end = window_start + self.spec.size;
            if window_end > self.current_watermark {
                break;
            }
            results.extend(self.probe_window(window_start));
            self.next_window_index += 1;
            self.left.retain(|(start, _), _| *start >= window_start + self.spec.slide);
            self.right.retain(|(start, _), _| *start >= window_start + self.spec.slide);
        }
        results
    }

    fn probe_window(&self, window_start: u64) -> Vec<JoinResult<K, L, R>> {
        let mut results = Vec::new();
        let window_end = window_start + self.spec.size;
        for ((start, key), left_rows) in self.left.iter().filter(|((s, _), _)| *s == window_start) {
            if let Some(right_rows) = self.right.get(&(*start, key.clone())) {
                for l in left_rows.iter() {
                    for r in right_rows.iter() {
                        results.push(JoinResult {
                            window_start,
                            window_end,
                            key: key.clone(),
                            left: l.value.clone(),
                            right: r.value.clone(),
                        });
                    }
                }
            }
        }
        results
    }
}

/// Same semantics as [`HashJoinLocal`] but behind an `Arc<RwLock<..>>` so
/// multiple worker threads can share one build side (spec §4.4
/// "HashJoinGlobalLocking") when the plan fans a join's input partitions
/// across several workers.
#[derive(Clone)]
pub struct HashJoinGlobalLocking<K, L, R> {
    inner: Arc<RwLock<HashJoinLocal<K, L, R>>>,
}

impl<K: Eq + Hash + Clone, L: Clone, R: Clone> HashJoinGlobalLocking<K, L, R> {
    pub fn new(spec: WindowSpec) -> Self {
        Self { inner: Arc::new(RwLock::new(HashJoinLocal::new(spec))) }
    }

    pub fn insert_left(&self, key: K, event_time: u64, value: L) {
        self.inner.write().insert_left(key, event_time, value);
    }

    pub fn insert_right(&self, key: K, event_time: u64, value: R) {
        self.inner.write().insert_right(key, event_time, value);
    }

    pub fn advance_watermark(&self, origin: u64, watermark: u64) -> Vec<JoinResult<K, L, R>> {
        self.inner.write().advance_watermark(origin, watermark)
    }
}

/// Build side for `HashJoinGlobalLockFree`'s one row bucket, guarded by
/// `DashMap`'s own per-shard lock rather than a lock owned by this operator
/// (spec §4.4 "HashJoinGlobalLockFree"). Two inserts land on the same
/// internal lock only when their `(window_start, key)` pair happens to hash
/// into the same `DashMap` shard; there is no single mutex serializing the
/// whole build side the way `HashJoinGlobalLocking` has one.
pub struct HashJoinGlobalLockFree<K: Eq + Hash, L, R> {
    spec: WindowSpec,
    left: DashMap<(u64, K), PagedVec<JoinRow<L>>>,
    right: DashMap<(u64, K), PagedVec<JoinRow<R>>>,
    trigger: parking_lot::Mutex<TriggerState>,
}

/// Watermark bookkeeping and the next-window cursor. Inserts never touch
/// this; only `advance_watermark` does, which is why it alone needs a lock
/// that serializes callers against each other.
struct TriggerState {
    watermarks: HashMap<u64, u64>,
    current_watermark: u64,
    next_window_index: u64,
}

impl<K: Eq + Hash + Clone, L: Clone, R: Clone> HashJoinGlobalLockFree<K, L, R> {
    pub fn new(spec: WindowSpec) -> Self {
        Self {
            spec,
            left: DashMap::new(),
            right: DashMap::new(),
            trigger: parking_lot::Mutex::new(TriggerState { watermarks: HashMap::new(), current_watermark: 0, next_window_index: 0 }),
        }
    }

    fn window_start_for(&self, t: u64) -> u64 {
        (t / self.spec.slide) * self.spec.slide
    }

    pub fn insert_left(&self, key: K, event_time: u64, value: L) {
        let start = self.window_start_for(event_time);
        self.left.entry((start, key)).or_insert_with(PagedVec::new).push(JoinRow { event_time, value });
    }

    pub fn insert_right(&self, key: K, event_time: u64, value: R) {
        let start = self.window_start_for(event_time);
        self.right.entry((start, key)).or_insert_with(PagedVec::new).push(JoinRow { event_time, value });
    }

    fn probe_window(&self, window_start: u64) -> Vec<JoinResult<K, L, R>> {
        let mut results = Vec::new();
        let window_end = window_start + self.spec.size;
        for entry in self.left.iter().filter(|e| e.key().0 == window_start) {
            let (start, key) = entry.key();
            if let Some(right_rows) = self.right.get(&(*start, key.clone())) {
                for l in entry.value().iter() {
                    for r in right_rows.iter() {
                        results.push(JoinResult {
                            window_start,
                            window_end,
                            key: key.clone(),
                            left: l.value.clone(),
                            right: r.value.clone(),
                        });
                    }
                }
            }
        }
        results
    }

    /// Serialized against other `advance_watermark` callers (via `trigger`)
    /// so the window cursor only ever moves forward once per window; the
    /// insert path above is untouched by this lock.
    pub fn advance_watermark(&self, origin: u64, watermark: u64) -> Vec<JoinResult<K, L, R>> {
        let mut trigger = self.trigger.lock();
        let entry = trigger.watermarks.entry(origin).or_insert(0);
        if watermark > *entry {
            *entry = watermark;
        }
        trigger.current_watermark = trigger.watermarks.values().copied().min().unwrap_or(0);

        let mut results = Vec::new();
        loop {
            let window_start = trigger.next_window_index * self.spec.slide;
            let window_end = window_start + self.spec.size;
            if window_end > trigger.current_watermark {
                break;
            }
            results.extend(self.probe_window(window_start));
            trigger.next_window_index += 1;
            let retain_from = window_start + self.spec.slide;
            self.left.retain(|(start, _), _| *start >= retain_from);
            self.right.retain(|(start, _), _| *start >= retain_from);
        }
        results
    }

    pub fn spec(&self) -> WindowSpec {
        self.spec
    }
}

/// Non-equi join fallback: every left row is compared against every right
/// row in the same window with a caller-supplied predicate (spec §4.4).
/// `O(n*m)` per window; used only when no equi-join key is available.
pub struct NestedLoopJoin<L, R> {
    spec: WindowSpec,
    left: HashMap<u64, PagedVec<JoinRow<L>>>,
    right: HashMap<u64, PagedVec<JoinRow<R>>>,
    watermarks: HashMap<u64, u64>,
    current_watermark: u64,
    next_window_index: u64,
}

impl<L: Clone, R: Clone> NestedLoopJoin<L, R> {
    pub fn new(spec: WindowSpec) -> Self {
        Self {
            spec,
            left: HashMap::new(),
            right: HashMap::new(),
            watermarks: HashMap::new(),
            current_watermark: 0,
            next_window_index: 0,
        }
    }

    fn window_start_for(&self, t: u64) -> u64 {
        (t / self.spec.slide) * self.spec.slide
    }

    pub fn insert_left(&mut self, event_time: u64, value: L) {
        let start = self.window_start_for(event_time);
        self.left.entry(start).or_default().push(JoinRow { event_time, value });
    }

    pub fn insert_right(&mut self, event_time: u64, value: R) {
        let start = self.window_start_for(event_time);
        self.right.entry(start).or_default().push(JoinRow { event_time, value });
    }

    pub fn advance_watermark(
        &mut self,
        origin: u64,
        watermark: u64,
        mut predicate: impl FnMut(&L, &R) -> bool,
    ) -> Vec<JoinResult<(), L, R>> {
        let entry = self.watermarks.entry(origin).or_insert(0);
        if watermark > *entry {
            *entry = watermark;
        }
        self.current_watermark = self.watermarks.values().copied().min().unwrap_or(0);

        let mut results = Vec::new();
        loop {
            let window_start = self.next_window_index * self.spec.slide;
            let window_end = window_start + self.spec.size;
            if window_end > self.current_watermark {
                break;
            }
            if let (Some(left_rows), Some(right_rows)) = (self.left.get(&window_start), self.right.get(&window_start)) {
                for l in left_rows.iter() {
                    for r in right_rows.iter() {
                        if predicate(&l.value, &r.value) {
                            results.push(JoinResult { window_start, window_end, key: (), left: l.value.clone(), right: r.value.clone() });
                        }
                    }
                }
            }
            self.next_window_index += 1;
            self.left.retain(|start, _| *start >= window_start + self.spec.slide);
            self.right.retain(|start, _| *start >= window_start + self.spec.slide);
        }
        results
    }
}
