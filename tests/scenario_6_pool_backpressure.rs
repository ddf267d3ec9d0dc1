//! End-to-end scenario 6: a pool of 16 buffers, a producer faster than the
//! consumer. The producer blocks on `acquire` once the pool is exhausted;
//! the total number of buffers ever allocated never exceeds 16; no buffer
//! is ever released twice; production resumes once the consumer drains.

use nes_runtime_core::buffer::BufferPool;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn scenario_6_pool_exhaustion_applies_backpressure_and_never_over_allocates() {
    const POOL_SIZE: usize = 16;
    const TOTAL_PRODUCED: u64 = 500;

    let pool = BufferPool::new(POOL_SIZE, 64);
    assert_eq!(pool.size(), POOL_SIZE);

    let max_outstanding = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = mpsc::channel();

    let producer = {
        let pool = pool.clone();
        let max_outstanding = Arc::clone(&max_outstanding);
        std::thread::spawn(move || {
            for seq in 0..TOTAL_PRODUCED {
                // Blocks once the pool is exhausted and the consumer hasn't
                // yet dropped enough in-flight buffers to free a segment.
                let buf = pool
                    .acquire(Some(Duration::from_secs(5)))
                    .unwrap_or_else(|err| panic!("buffer {seq} never became available: {err}"));
                buf.set_sequence_number(seq);
                max_outstanding.fetch_max(POOL_SIZE - pool.available(), Ordering::SeqCst);
                tx.send(buf).expect("consumer dropped the channel");
            }
        })
    };

    let consumer = std::thread::spawn(move || {
        let mut received = Vec::new();
        // a slower consumer than the producer: sleeps every few buffers to
        // force the pool to run dry and the producer to block on acquire.
        while let Ok(buf) = rx.recv() {
            received.push(buf.sequence_number());
            if received.len() % 3 == 0 {
                std::thread::sleep(Duration::from_micros(200));
            }
            // dropping `buf` at end of scope releases its segment back to
            // the pool's free list exactly once.
        }
        received
    });

    producer.join().expect("producer thread panicked");
    let received = consumer.join().expect("consumer thread panicked");

    assert_eq!(received.len() as u64, TOTAL_PRODUCED);
    assert_eq!(received, (0..TOTAL_PRODUCED).collect::<Vec<_>>(), "every buffer is delivered exactly once, in order");
    assert!(
        max_outstanding.load(Ordering::SeqCst) <= POOL_SIZE,
        "producer must never hold more buffers in flight than the pool's total size"
    );
    assert_eq!(pool.size(), POOL_SIZE, "no segment is ever allocated beyond the configured pool size");
    assert_eq!(pool.available(), POOL_SIZE, "every buffer is released back to the pool once the consumer drains it");
}
