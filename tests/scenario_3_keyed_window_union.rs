//! End-to-end scenario 3: two logical sources each emit 10 buffers of
//! `(key=1, value=1, ts)` rows; their outputs are unioned into the same
//! keyed tumbling 1s window — expect counts to double versus a single
//! source, since both origins' watermarks gate the same window trigger.

use nes_runtime_core::buffer::BufferPool;
use nes_runtime_core::operators::aggregation::Count;
use nes_runtime_core::operators::window::{SlicingWindowAggregator, WindowSpec};
use nes_runtime_core::schema::{Field, PhysicalType, Schema};
use nes_runtime_core::source::{run_lambda, RowPattern};

#[test]
fn scenario_3_union_of_two_keyed_streams_doubles_window_counts() {
    let pool = BufferPool::new(8, 1 << 16);
    let schema = Schema::new(vec![
        Field::new("key", PhysicalType::UInt64),
        Field::new("value", PhysicalType::Float64),
        Field::new("ts", PhysicalType::UInt64),
    ]);
    let tuple_size = schema.size_in_bytes();
    let key_offset = schema.offset_of(0);
    let ts_offset = schema.offset_of(2);

    let mut agg = SlicingWindowAggregator::<u64, _>::new(WindowSpec::tumbling(1000), Count);

    for origin in [0u64, 1u64] {
        run_lambda(
            &pool,
            10,
            100,
            &schema,
            &RowPattern::ConstantKeyedValue { key: 1, value: 1.0, tick_millis: 1 },
            origin,
            |buf| {
                let count = buf.number_of_tuples() as usize;
                buf.with_payload(|payload| {
                    for i in 0..count {
                        let base = i * tuple_size;
                        let key = u64::from_le_bytes(payload[base + key_offset..base + key_offset + 8].try_into().unwrap());
                        let ts = u64::from_le_bytes(payload[base + ts_offset..base + ts_offset + 8].try_into().unwrap());
                        agg.ingest(ts, key, 1.0);
                    }
                });
            },
        )
        .unwrap();
    }

    // Both origins produced ts 0..1000, so one origin's watermark alone
    // cannot trigger the window until the other also reports.
    let results_before_second_origin = agg.advance_watermark(0, 1000);
    assert!(results_before_second_origin.is_empty());
    let results = agg.advance_watermark(1, 1000);

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].key, 1);
    assert_eq!(results[0].value, 2000.0, "two unioned sources of 1000 rows each should double the single-source count");
}
