//! The control block embedded alongside each segment: atomic refcount plus
//! the mutable metadata fields spec §3 requires (tuple size, tuple count,
//! origin id, sequence number, watermark, creation timestamp).

use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, Default)]
pub struct BufferMetadata {
    pub tuple_size_bytes: u32,
    pub number_of_tuples: u32,
    pub origin_id: u64,
    pub sequence_number: u64,
    pub watermark: u64,
    pub creation_timestamp: u64,
}

impl BufferMetadata {
    fn zeroed() -> Self {
        Self::default()
    }
}

pub struct ControlBlock {
    reference_counter: AtomicU32,
    metadata: Mutex<BufferMetadata>,
}

impl ControlBlock {
    pub fn new() -> Self {
        Self {
            reference_counter: AtomicU32::new(0),
            metadata: Mutex::new(BufferMetadata::zeroed()),
        }
    }

    /// CAS 0 -> 1: takes a pooled segment into the leased state. Returns
    /// `false` if the segment was already leased (a free-list bookkeeping
    /// bug, since only pooled segments should ever be handed to `prepare`).
    pub fn prepare(&self) -> bool {
        self.reference_counter
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn retain(&self) {
        self.reference_counter.fetch_add(1, Ordering::AcqRel);
    }

    pub fn reference_count(&self) -> u32 {
        self.reference_counter.load(Ordering::Acquire)
    }

    /// Decrements the reference count. Returns `true` exactly when this call
    /// performed the 1 -> 0 transition, in which case the caller must run the
    /// recycle callback. Faults if called on an already-pooled (refcount 0)
    /// segment: releasing a refcount of 0 is a programming error (spec §3).
    pub fn release(&self) -> bool {
        let previous = self.reference_counter.fetch_sub(1, Ordering::AcqRel);
        if previous == 0 {
            panic!("released a buffer control block with reference count already at 0");
        }
        if previous == 1 {
            let mut meta = self.metadata.lock();
            *meta = BufferMetadata::zeroed();
            true
        } else {
            false
        }
    }

    /// Lock the metadata for read or write; the guard derefs mutably so
    /// callers can both inspect and update fields through one acquisition.
    pub fn metadata(&self) -> MutexGuard<'_, BufferMetadata> {
        self.metadata.lock()
    }

    /// Called once, right after `prepare` succeeds, to stamp the creation
    /// timestamp on a freshly leased buffer.
    pub fn stamp_creation_time(&self) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        self.metadata.lock().creation_timestamp = now;
    }
}
