//! Buffer pool: fixed-size byte segments with reference-counted control
//! blocks (spec §3 "Buffer", §4.1 "Buffer pool").
//!
//! Lifecycle: pooled (refcount 0, payload inaccessible) -> leased (refcount
//! >= 1, `prepare`'d via CAS 0->1) -> in-flight (cloned/retained across
//! stages and tasks) -> recycled (refcount drops 1->0, metadata zeroed,
//! segment returned to the free list).

mod control_block;
mod pool;
mod subpool;

pub use control_block::BufferMetadata;
pub use pool::BufferPool;
pub use subpool::SubPool;

use control_block::ControlBlock;
use std::sync::Arc;

/// A leased, reference-counted handle to a fixed-size byte segment plus its
/// variable-length child region. Cloning calls `retain`; dropping releases,
/// and on the 1->0 transition the segment is zeroed and handed back to the
/// pool's free list.
pub struct TupleBuffer {
    pool: Arc<pool::PoolInner>,
    segment_index: usize,
}

impl TupleBuffer {
    pub(crate) fn new(pool: Arc<pool::PoolInner>, segment_index: usize) -> Self {
        Self { pool, segment_index }
    }

    fn control(&self) -> &ControlBlock {
        &self.pool.segments[self.segment_index].control
    }

    /// Current reference count. Only meaningful as a point-in-time estimate
    /// under concurrent access.
    pub fn reference_count(&self) -> u32 {
        self.control().reference_count()
    }

    pub fn buffer_size(&self) -> usize {
        self.pool.buffer_size
    }

    /// Read access to the fixed-size payload region.
    pub fn with_payload<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let data = self.pool.segments[self.segment_index].data.lock();
        f(&data)
    }

    /// Mutable access to the fixed-size payload region.
    pub fn with_payload_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let mut data = self.pool.segments[self.segment_index].data.lock();
        f(&mut data)
    }

    /// Read access to the variable-sized child region.
    pub fn with_child_region<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let child = self.pool.segments[self.segment_index].child.lock();
        f(&child)
    }

    /// Mutable access to the variable-sized child region.
    pub fn with_child_region_mut<R>(&self, f: impl FnOnce(&mut Vec<u8>) -> R) -> R {
        let mut child = self.pool.segments[self.segment_index].child.lock();
        f(&mut child)
    }

    pub fn tuple_size_in_bytes(&self) -> u32 {
        self.control().metadata().tuple_size_bytes
    }

    pub fn set_tuple_size_in_bytes(&self, size: u32) {
        self.control().metadata().tuple_size_bytes = size;
    }

    pub fn number_of_tuples(&self) -> u32 {
        self.control().metadata().number_of_tuples
    }

    pub fn set_number_of_tuples(&self, n: u32) {
        self.control().metadata().number_of_tuples = n;
    }

    pub fn origin_id(&self) -> u64 {
        self.control().metadata().origin_id
    }

    pub fn set_origin_id(&self, id: u64) {
        self.control().metadata().origin_id = id;
    }

    pub fn sequence_number(&self) -> u64 {
        self.control().metadata().sequence_number
    }

    pub fn set_sequence_number(&self, seq: u64) {
        self.control().metadata().sequence_number = seq;
    }

    pub fn watermark(&self) -> u64 {
        self.control().metadata().watermark
    }

    pub fn set_watermark(&self, wm: u64) {
        self.control().metadata().watermark = wm;
    }

    pub fn creation_timestamp(&self) -> u64 {
        self.control().metadata().creation_timestamp
    }

    /// Explicit retain, mirroring the original's `TupleBuffer::retain`. Most
    /// callers should just `.clone()`; this exists for call sites that want
    /// to bump the count without producing a second owned handle (e.g. a
    /// join build side that stores the buffer in a hash table while the
    /// probe side still holds its own handle).
    pub fn retain(&self) {
        self.control().retain();
    }
}

impl Clone for TupleBuffer {
    fn clone(&self) -> Self {
        self.control().retain();
        Self { pool: Arc::clone(&self.pool), segment_index: self.segment_index }
    }
}

impl Drop for TupleBuffer {
    fn drop(&mut self) {
        if self.control().release() {
            self.pool.recycle(self.segment_index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn acquire_yields_refcount_one_zeroed_metadata() {
        let pool = BufferPool::new(4, 64);
        let buf = pool.acquire(None).unwrap();
        assert_eq!(buf.reference_count(), 1);
        assert_eq!(buf.number_of_tuples(), 0);
        assert_eq!(buf.origin_id(), 0);
        assert_eq!(buf.buffer_size(), 64);
    }

    #[test]
    fn clone_retains_drop_releases_and_recycles() {
        let pool = BufferPool::new(1, 64);
        assert_eq!(pool.available(), 1);
        let buf = pool.acquire(None).unwrap();
        assert_eq!(pool.available(), 0);
        let clone = buf.clone();
        assert_eq!(buf.reference_count(), 2);
        drop(clone);
        assert_eq!(buf.reference_count(), 1);
        assert_eq!(pool.available(), 0);
        drop(buf);
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn try_acquire_never_blocks_when_exhausted() {
        let pool = BufferPool::new(1, 64);
        let _buf = pool.acquire(None).unwrap();
        assert!(pool.try_acquire().is_none());
    }

    #[test]
    fn acquire_with_deadline_fails_with_pool_exhausted() {
        let pool = BufferPool::new(1, 64);
        let _buf = pool.acquire(None).unwrap();
        let err = pool.acquire(Some(Duration::from_millis(20))).unwrap_err();
        assert!(matches!(err, crate::error::EngineError::PoolExhausted));
    }

    #[test]
    fn total_segments_never_exceed_configured_size() {
        let pool = BufferPool::new(16, 64);
        let mut held = Vec::new();
        for _ in 0..16 {
            held.push(pool.acquire(None).unwrap());
        }
        assert!(pool.try_acquire().is_none());
        assert_eq!(pool.size(), 16);
        drop(held);
        assert_eq!(pool.available(), 16);
    }

    #[test]
    fn metadata_is_zeroed_on_recycle() {
        let pool = BufferPool::new(1, 64);
        {
            let buf = pool.acquire(None).unwrap();
            buf.set_origin_id(7);
            buf.set_sequence_number(42);
            buf.set_watermark(100);
            buf.set_number_of_tuples(3);
        }
        let buf = pool.acquire(None).unwrap();
        assert_eq!(buf.origin_id(), 0);
        assert_eq!(buf.sequence_number(), 0);
        assert_eq!(buf.watermark(), 0);
        assert_eq!(buf.number_of_tuples(), 0);
    }
}
