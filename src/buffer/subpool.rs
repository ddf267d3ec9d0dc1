use super::pool::{self, PoolInner};
use crate::error::Result;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// A per-worker free list carved out of the global pool, to reduce
/// contention on the shared free list under many concurrent workers (spec
/// §4.1 `create_subpool`). Refills from the global pool when exhausted.
pub struct SubPool {
    global: Arc<PoolInner>,
    local: Mutex<VecDeque<usize>>,
    refill_batch: usize,
}

impl SubPool {
    pub(crate) fn new(global: Arc<PoolInner>, n: usize) -> Self {
        let mut local = VecDeque::with_capacity(n);
        for _ in 0..n {
            if let Some(index) = global.try_take_free_for_subpool() {
                local.push_back(index);
            } else {
                break;
            }
        }
        Self { global, local: Mutex::new(local), refill_batch: n.max(1) }
    }

    pub fn try_acquire(&self) -> Option<super::TupleBuffer> {
        let mut local = self.local.lock();
        if let Some(index) = local.pop_front() {
            return Some(pool::lease_for_subpool(&self.global, index));
        }
        self.refill(&mut local);
        local.pop_front().map(|index| pool::lease_for_subpool(&self.global, index))
    }

    pub fn acquire(&self, deadline: Option<Duration>) -> Result<super::TupleBuffer> {
        if let Some(buf) = self.try_acquire() {
            return Ok(buf);
        }
        // Local and one refill attempt against the global pool both missed;
        // fall back to a blocking global acquire so a busy subpool still
        // benefits from whichever worker recycles a segment next.
        self.global_acquire(deadline)
    }

    fn global_acquire(&self, deadline: Option<Duration>) -> Result<super::TupleBuffer> {
        // Delegate to a full BufferPool handle sharing the same inner state.
        crate::buffer::BufferPool::from_inner(Arc::clone(&self.global)).acquire(deadline)
    }

    fn refill(&self, local: &mut VecDeque<usize>) {
        for _ in 0..self.refill_batch {
            match self.global.try_take_free_for_subpool() {
                Some(index) => local.push_back(index),
                None => break,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.local.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use crate::buffer::BufferPool;

    #[test]
    fn subpool_hands_out_carved_segments_and_refills() {
        let pool = BufferPool::new(8, 32);
        let sub = pool.create_subpool(4);
        assert_eq!(sub.len(), 4);
        assert_eq!(pool.available(), 4);

        let a = sub.try_acquire().unwrap();
        let b = sub.try_acquire().unwrap();
        let c = sub.try_acquire().unwrap();
        let d = sub.try_acquire().unwrap();
        assert!(sub.try_acquire().is_none() || pool.available() > 0);
        drop((a, b, c, d));
    }
}
