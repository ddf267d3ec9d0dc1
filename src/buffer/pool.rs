use super::control_block::ControlBlock;
use super::TupleBuffer;
use crate::error::{EngineError, Result};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub(crate) struct Segment {
    pub(crate) control: ControlBlock,
    pub(crate) data: Mutex<Vec<u8>>,
    pub(crate) child: Mutex<Vec<u8>>,
}

/// Global buffer pool state, shared by every [`super::BufferPool`] handle and
/// every [`super::SubPool`] carved out of it. Segments are allocated once at
/// construction and never freed individually; only their control block's
/// refcount transitions between pooled and leased.
pub(crate) struct PoolInner {
    pub(crate) segments: Vec<Segment>,
    free: Mutex<VecDeque<usize>>,
    not_empty: Condvar,
    pub(crate) buffer_size: usize,
    available: AtomicUsize,
}

impl PoolInner {
    fn try_take_free(&self) -> Option<usize> {
        let mut free = self.free.lock();
        free.pop_front()
    }

    pub(crate) fn recycle(&self, index: usize) {
        let mut free = self.free.lock();
        free.push_back(index);
        self.available.fetch_add(1, Ordering::Release);
        self.not_empty.notify_one();
    }

    /// Exposed for [`super::SubPool`] to carve segments out of the shared
    /// free list without blocking.
    pub(crate) fn try_take_free_for_subpool(&self) -> Option<usize> {
        self.try_take_free()
    }
}

fn lease(pool: &Arc<PoolInner>, index: usize) -> TupleBuffer {
    let segment = &pool.segments[index];
    if !segment.control.prepare() {
        panic!("free list handed out an already-leased segment {index}");
    }
    segment.control.stamp_creation_time();
    pool.available.fetch_sub(1, Ordering::AcqRel);
    TupleBuffer::new(Arc::clone(pool), index)
}

/// Exposed for [`super::SubPool`], which already popped `index` off its own
/// local free list and just needs the prepare/stamp/lease dance.
pub(crate) fn lease_for_subpool(pool: &Arc<PoolInner>, index: usize) -> TupleBuffer {
    lease(pool, index)
}

/// Fixed-size byte segments handed out in O(1), as leased, reference-counted
/// [`TupleBuffer`] handles (spec §4.1).
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl BufferPool {
    pub fn new(num_buffers: usize, buffer_size: usize) -> Self {
        let mut segments = Vec::with_capacity(num_buffers);
        let mut free = VecDeque::with_capacity(num_buffers);
        for i in 0..num_buffers {
            segments.push(Segment {
                control: ControlBlock::new(),
                data: Mutex::new(vec![0u8; buffer_size]),
                child: Mutex::new(Vec::new()),
            });
            free.push_back(i);
        }
        let inner = Arc::new(PoolInner {
            segments,
            free: Mutex::new(free),
            not_empty: Condvar::new(),
            buffer_size,
            available: AtomicUsize::new(num_buffers),
        });
        tracing::info!(num_buffers, buffer_size, "buffer pool initialized");
        Self { inner }
    }

    /// Blocks until a segment is free, up to `deadline` if given. Returns
    /// [`EngineError::PoolExhausted`] if the deadline elapses first. A
    /// blocked caller is, by construction, applying back-pressure upstream
    /// (spec §4.1 failure semantics).
    pub fn acquire(&self, deadline: Option<Duration>) -> Result<TupleBuffer> {
        if let Some(index) = self.inner.try_take_free() {
            return Ok(lease(&self.inner, index));
        }
        let deadline_at = deadline.map(|d| Instant::now() + d);
        let mut free = self.inner.free.lock();
        loop {
            if let Some(index) = free.pop_front() {
                drop(free);
                return Ok(lease(&self.inner, index));
            }
            match deadline_at {
                None => {
                    self.inner.not_empty.wait(&mut free);
                }
                Some(at) => {
                    let remaining = at.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(EngineError::PoolExhausted);
                    }
                    let timed_out = self.inner.not_empty.wait_for(&mut free, remaining).timed_out();
                    if timed_out && free.is_empty() {
                        return Err(EngineError::PoolExhausted);
                    }
                }
            }
        }
    }

    /// Never blocks: `None` if the pool is currently exhausted.
    pub fn try_acquire(&self) -> Option<TupleBuffer> {
        let index = self.inner.try_take_free()?;
        Some(lease(&self.inner, index))
    }

    /// Carves `n` segments out of the global free list into a per-worker
    /// [`SubPool`] to reduce contention on the shared free list (spec §4.1).
    pub fn create_subpool(&self, n: usize) -> super::SubPool {
        super::SubPool::new(Arc::clone(&self.inner), n)
    }

    pub fn size(&self) -> usize {
        self.inner.segments.len()
    }

    pub fn available(&self) -> usize {
        self.inner.available.load(Ordering::Acquire)
    }

    pub fn buffer_size(&self) -> usize {
        self.inner.buffer_size
    }

    pub(crate) fn inner(&self) -> &Arc<PoolInner> {
        &self.inner
    }

    pub(crate) fn from_inner(inner: Arc<PoolInner>) -> Self {
        Self { inner }
    }
}
