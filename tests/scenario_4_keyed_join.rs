//! End-to-end scenario 4: three CSV-backed streams joined on a shared key
//! over a tumbling 1s event-time window: `R1 join R2 on key`, then the
//! result joined again with `R3 on key`.
//!
//! The original benchmark fixtures this scenario is modeled on aren't part
//! of this retrieval pack, so the three CSVs here are a small synthetic
//! stand-in built to exercise the same shape: one key present on all three
//! sides (producing a match), one key missing from `R3` (producing no
//! third-stage match), and one key missing from `R2` entirely (producing no
//! first-stage match at all).

use nes_runtime_core::buffer::BufferPool;
use nes_runtime_core::operators::join::HashJoinLocal;
use nes_runtime_core::operators::window::WindowSpec;
use nes_runtime_core::schema::{Field, PhysicalType, Schema};
use nes_runtime_core::source::run_csv;

fn write_csv(rows: &[(u64, f64, u64)]) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!("nes-join-test-{}-{:p}.csv", std::process::id(), rows.as_ptr()));
    let body: String = rows.iter().map(|(k, v, t)| format!("{k},{v},{t}\n")).collect();
    std::fs::write(&path, body).unwrap();
    path
}

fn schema() -> Schema {
    Schema::new(vec![
        Field::new("key", PhysicalType::UInt64),
        Field::new("value", PhysicalType::Float64),
        Field::new("ts", PhysicalType::UInt64),
    ])
}

#[test]
fn scenario_4_three_way_keyed_join_tumbling_event_time() {
    let pool = BufferPool::new(16, 4096);
    let schema = schema();

    // key 1: present in R1, R2, R3 -> should survive both join stages.
    // key 2: present in R1, R2 but not R3 -> survives stage one, dropped at stage two.
    // key 3: present in R1 only -> dropped at stage one.
    let r1 = write_csv(&[(1, 10.0, 100), (2, 20.0, 150), (3, 30.0, 200)]);
    let r2 = write_csv(&[(1, 100.0, 110), (2, 200.0, 160)]);
    let r3 = write_csv(&[(1, 1000.0, 120)]);

    let spec = WindowSpec::tumbling(1000);
    let mut join12 = HashJoinLocal::<u64, f64, f64>::new(spec);

    run_csv(&pool, r1.to_str().unwrap(), &schema, 10, 0, |buf| {
        let count = buf.number_of_tuples() as usize;
        let tuple_size = schema.size_in_bytes();
        buf.with_payload(|payload| {
            for i in 0..count {
                let base = i * tuple_size;
                let key = u64::from_le_bytes(payload[base..base + 8].try_into().unwrap());
                let value = f64::from_le_bytes(payload[base + 8..base + 16].try_into().unwrap());
                let ts = u64::from_le_bytes(payload[base + 16..base + 24].try_into().unwrap());
                join12.insert_left(key, ts, value);
            }
        });
    })
    .unwrap();

    run_csv(&pool, r2.to_str().unwrap(), &schema, 10, 1, |buf| {
        let count = buf.number_of_tuples() as usize;
        let tuple_size = schema.size_in_bytes();
        buf.with_payload(|payload| {
            for i in 0..count {
                let base = i * tuple_size;
                let key = u64::from_le_bytes(payload[base..base + 8].try_into().unwrap());
                let value = f64::from_le_bytes(payload[base + 8..base + 16].try_into().unwrap());
                let ts = u64::from_le_bytes(payload[base + 16..base + 24].try_into().unwrap());
                join12.insert_right(key, ts, value);
            }
        });
    })
    .unwrap();

    let stage_one = join12.advance_watermark(0, 1000);
    let stage_one = {
        let mut r = stage_one;
        r.sort_by_key(|j| j.key);
        r
    };
    assert_eq!(stage_one.len(), 2, "keys 1 and 2 match between R1 and R2; key 3 has no R2 counterpart");
    assert_eq!(stage_one[0].key, 1);
    assert_eq!(stage_one[1].key, 2);

    let mut join123 = HashJoinLocal::<u64, (f64, f64), f64>::new(spec);
    for row in &stage_one {
        join123.insert_left(row.key, row.window_start, (row.left, row.right));
    }

    run_csv(&pool, r3.to_str().unwrap(), &schema, 10, 2, |buf| {
        let count = buf.number_of_tuples() as usize;
        let tuple_size = schema.size_in_bytes();
        buf.with_payload(|payload| {
            for i in 0..count {
                let base = i * tuple_size;
                let key = u64::from_le_bytes(payload[base..base + 8].try_into().unwrap());
                let value = f64::from_le_bytes(payload[base + 8..base + 16].try_into().unwrap());
                let ts = u64::from_le_bytes(payload[base + 16..base + 24].try_into().unwrap());
                join123.insert_right(key, ts, value);
            }
        });
    })
    .unwrap();

    let stage_two = join123.advance_watermark(0, 1000);
    assert_eq!(stage_two.len(), 1, "only key 1 has a match across all three streams");
    assert_eq!(stage_two[0].key, 1);
    assert_eq!(stage_two[0].left, (10.0, 100.0));
    assert_eq!(stage_two[0].right, 1000.0);

    for path in [r1, r2, r3] {
        std::fs::remove_file(path).ok();
    }
}
