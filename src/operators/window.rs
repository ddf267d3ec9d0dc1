//! Slice-based windowing aggregator (spec §4.4), plus the bucketing and
//! threshold alternatives. This is the hardest operator handler in the
//! core: it combines a time-ordered slice store, watermark-driven
//! triggering, and keyed/global partial-aggregate storage.

use super::aggregation::Aggregation;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

/// Greatest common divisor, used to pick the slice length `L = gcd(W, S)`
/// for a sliding window of size `W` and slide `S` (spec §4.4). Tumbling
/// windows have `S == W`, so `L == W` and slice == window.
pub fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSpec {
    pub size: u64,
    pub slide: u64,
}

impl WindowSpec {
    pub fn tumbling(size: u64) -> Self {
        Self { size, slide: size }
    }

    pub fn sliding(size: u64, slide: u64) -> Self {
        Self { size, slide }
    }

    pub fn slice_length(&self) -> u64 {
        gcd(self.size, self.slide)
    }

    /// Upper bound on the number of slices a slicing aggregator keeps alive
    /// at once (spec §8 testable property): `W / gcd(W, S)`.
    pub fn max_live_slices(&self) -> u64 {
        self.size / self.slice_length()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowResult<K> {
    pub start: u64,
    pub end: u64,
    pub key: K,
    pub value: f64,
}

/// Global (unkeyed) window marker type.
pub type Global = ();

/// The default windowing strategy: ingest assigns each tuple to a slice
/// `floor(t / L)`; on watermark advance past a window's end, the slices
/// covering `[window.start, window.end)` are combined and lowered to one
/// output row per (window [, key]).
pub struct SlicingWindowAggregator<K, A: Aggregation> {
    spec: WindowSpec,
    aggregation: A,
    slice_length: u64,
    /// slice_start -> (key -> partial state)
    slices: BTreeMap<u64, HashMap<K, A::Partial>>,
    next_window_index: u64,
    watermarks: HashMap<u64, u64>,
    current_watermark: u64,
}

impl<K: Eq + Hash + Clone, A: Aggregation> SlicingWindowAggregator<K, A> {
    pub fn new(spec: WindowSpec, aggregation: A) -> Self {
        let slice_length = spec.slice_length();
        Self {
            spec,
            aggregation,
            slice_length,
            slices: BTreeMap::new(),
            next_window_index: 0,
            watermarks: HashMap::new(),
            current_watermark: 0,
        }
    }

    fn slice_start_for(&self, t: u64) -> u64 {
        (t / self.slice_length) * self.slice_length
    }

    /// Update the slice covering `event_time` with `value`'s lifted partial
    /// state (spec §4.4 step 1-2).
    pub fn ingest(&mut self, event_time: u64, key: K, value: f64) {
        let slice_start = self.slice_start_for(event_time);
        let slice = self.slices.entry(slice_start).or_default();
        let entry = slice.entry(key).or_insert_with(|| self.aggregation.identity());
        *entry = self.aggregation.combine(entry, &self.aggregation.lift(value));
    }

    /// Advance `origin`'s watermark and recompute the per-stage watermark as
    /// the minimum over all known origins (spec §4.4 step 3), triggering any
    /// windows whose end is now covered.
    pub fn advance_watermark(&mut self, origin: u64, watermark: u64) -> Vec<WindowResult<K>> {
        let entry = self.watermarks.entry(origin).or_insert(0);
        if watermark > *entry {
            *entry = watermark;
        }
        self.current_watermark = self.watermarks.values().copied().min().unwrap_or(0);
        self.trigger()
    }

    fn trigger(&mut self) -> Vec<WindowResult<K>> {
        let mut results = Vec::new();
        loop {
            let window_start = self.next_window_index * self.spec.slide;
            let window_end = window_start + self.spec.size;
            if window_end > self.current_watermark {
                break;
            }
            results.extend(self.combine_window(window_start, window_end));
            self.next_window_index += 1;
            self.evict_unreferenced_slices();
        }
        results
    }

    fn combine_window(&self, window_start: u64, window_end: u64) -> Vec<WindowResult<K>> {
        let mut combined: HashMap<K, A::Partial> = HashMap::new();
        for (_, slice) in self.slices.range(window_start..window_end) {
            for (key, partial) in slice {
                let entry = combined.entry(key.clone()).or_insert_with(|| self.aggregation.identity());
                *entry = self.aggregation.combine(entry, partial);
            }
        }
        combined
            .into_iter()
            .map(|(key, partial)| WindowResult { start: window_start, end: window_end, key, value: self.aggregation.lower(&partial) })
            .collect()
    }

    /// Drop slices no longer covered by any pending (not-yet-triggered)
    /// window: every future window starts at or after
    /// `next_window_index * slide`, so anything strictly before that bound
    /// can never be read again.
    fn evict_unreferenced_slices(&mut self) {
        let floor = self.next_window_index * self.spec.slide;
        self.slices.retain(|&start, _| start >= floor);
    }

    pub fn live_slice_count(&self) -> usize {
        self.slices.len()
    }

    pub fn spec(&self) -> WindowSpec {
        self.spec
    }
}

/// Alternative trigger strategy: each window is its own bucket and every
/// ingested tuple updates every currently-open window containing its
/// timestamp, `O(W/S)` updates per tuple (spec §4.4). Simpler trigger logic,
/// preferred when `W/S` is small.
pub struct BucketingWindowAggregator<K, A: Aggregation> {
    spec: WindowSpec,
    aggregation: A,
    /// window_start -> (key -> partial)
    windows: BTreeMap<u64, HashMap<K, A::Partial>>,
    watermarks: HashMap<u64, u64>,
    current_watermark: u64,
}

impl<K: Eq + Hash + Clone, A: Aggregation> BucketingWindowAggregator<K, A> {
    pub fn new(spec: WindowSpec, aggregation: A) -> Self {
        Self { spec, aggregation, windows: BTreeMap::new(), watermarks: HashMap::new(), current_watermark: 0 }
    }

    /// Every window start `s` with `s <= t < s + size` and `s` a multiple of
    /// `slide` contains `t`; there are at most `size / slide` of them.
    pub fn ingest(&mut self, event_time: u64, key: K, value: f64) {
        let highest_start = (event_time / self.spec.slide) * self.spec.slide;
        let mut start = highest_start;
        loop {
            if start + self.spec.size > event_time {
                let window = self.windows.entry(start).or_default();
                let entry = window.entry(key.clone()).or_insert_with(|| self.aggregation.identity());
                *entry = self.aggregation.combine(entry, &self.aggregation.lift(value));
            }
            if start == 0 || start + self.spec.size <= event_time {
                break;
            }
            if start < self.spec.slide {
                break;
            }
            start -= self.spec.slide;
            if start + self.spec.size <= event_time {
                break;
            }
        }
    }

    pub fn advance_watermark(&mut self, origin: u64, watermark: u64) -> Vec<WindowResult<K>> {
        let entry = self.watermarks.entry(origin).or_insert(0);
        if watermark > *entry {
            *entry = watermark;
        }
        self.current_watermark = self.watermarks.values().copied().min().unwrap_or(0);

        let mut results = Vec::new();
        let ready: Vec<u64> = self
            .windows
            .keys()
            .copied()
            .filter(|&start| start + self.spec.size <= self.current_watermark)
            .collect();
        for start in ready {
            if let Some(window) = self.windows.remove(&start) {
                let end = start + self.spec.size;
                for (key, partial) in window {
                    results.push(WindowResult { start, end, key, value: self.aggregation.lower(&partial) });
                }
            }
        }
        results
    }

    pub fn open_window_count(&self) -> usize {
        self.windows.len()
    }
}

/// Non-time-based window: opens on a `false -> true` predicate transition,
/// closes on `true -> false`, optionally requiring a minimum tuple count
/// before it emits anything (spec §4.4).
pub struct ThresholdWindowAggregator<A: Aggregation> {
    aggregation: A,
    min_count: u64,
    open: Option<ThresholdWindowState<A::Partial>>,
}

struct ThresholdWindowState<P> {
    start: u64,
    count: u64,
    partial: P,
}

impl<A: Aggregation> ThresholdWindowAggregator<A> {
    pub fn new(aggregation: A, min_count: u64) -> Self {
        Self { aggregation, min_count, open: None }
    }

    /// Feed one tuple. `predicate` is the boolean condition that opens/closes
    /// the window; `event_time` timestamps the open/close for the emitted
    /// result; `value` is the aggregable field. Returns `Some` exactly when
    /// the predicate transitions `true -> false` and the minimum count was
    /// met.
    pub fn ingest(&mut self, event_time: u64, predicate: bool, value: f64) -> Option<WindowResult<Global>> {
        match (&mut self.open, predicate) {
            (None, true) => {
                self.open = Some(ThresholdWindowState {
                    start: event_time,
                    count: 1,
                    partial: self.aggregation.combine(&self.aggregation.identity(), &self.aggregation.lift(value)),
                });
                None
            }
            (Some(state), true) => {
                state.count += 1;
                state.partial = self.aggregation.combine(&state.partial, &self.aggregation.lift(value));
                None
            }
            (Some(_), false) => {
                let state = self.open.take().unwrap();
                if state.count >= self.min_count {
                    Some(WindowResult { start: state.start, end: event_time, key: (), value: self.aggregation.lower(&state.partial) })
                } else {
                    None
                }
            }
            (None, false) => None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }
}
