//! End-to-end scenario 1: one source, a single buffer of 10 records whose
//! value field is 1, a sum stage, and a text sink — expect one data line
//! reading `|10|`.

use nes_runtime_core::buffer::{BufferPool, TupleBuffer};
use nes_runtime_core::operators::OperatorHandler;
use nes_runtime_core::pipeline::{ExecutableStage, ExecutionContext, ExecutionResult, WorkerContext};
use nes_runtime_core::query_plan::StageId;
use nes_runtime_core::schema::{Field, PhysicalType, Schema};
use nes_runtime_core::sink::render_text_table;

struct SumStage;

impl ExecutableStage for SumStage {
    fn execute(&self, input: TupleBuffer, ctx: &mut ExecutionContext<'_>, _worker: &mut WorkerContext) -> ExecutionResult {
        let count = input.number_of_tuples() as usize;
        let sum = input.with_payload(|payload| {
            (0..count).map(|i| u32::from_le_bytes(payload[i * 4..i * 4 + 4].try_into().unwrap())).sum::<u32>()
        });

        let output = match ctx.pool().acquire(None) {
            Ok(b) => b,
            Err(_) => return ExecutionResult::Retry,
        };
        output.with_payload_mut(|p| p[0..4].copy_from_slice(&sum.to_le_bytes()));
        output.set_number_of_tuples(1);
        output.set_tuple_size_in_bytes(4);
        ctx.emit_to_successors(output);
        ExecutionResult::NeedsEmit
    }

    fn name(&self) -> &str {
        "sum"
    }
}

#[test]
fn scenario_1_simple_sum_end_to_end() {
    let pool = BufferPool::new(4, 64);
    let input = pool.acquire(None).unwrap();
    input.with_payload_mut(|p| {
        for i in 0..10u32 {
            let off = i as usize * 4;
            p[off..off + 4].copy_from_slice(&1u32.to_le_bytes());
        }
    });
    input.set_number_of_tuples(10);
    input.set_tuple_size_in_bytes(4);

    let stage = SumStage;
    let successors = vec![StageId(1)];
    let mut handlers: Vec<Box<dyn OperatorHandler>> = Vec::new();
    let mut ctx = ExecutionContext::new(&mut handlers, &pool, &successors);
    let mut worker = WorkerContext::new(0);

    let result = stage.execute(input, &mut ctx, &mut worker);
    assert!(matches!(result, ExecutionResult::NeedsEmit));

    let emitted = ctx.take_emitted();
    assert_eq!(emitted.len(), 1);
    let (successor, output) = &emitted[0];
    assert_eq!(*successor, StageId(1));
    let sum = output.with_payload(|p| u32::from_le_bytes(p[0..4].try_into().unwrap()));
    assert_eq!(sum, 10);

    let sink_schema = Schema::new(vec![Field::new("sum", PhysicalType::UInt32)]);
    let rendered = render_text_table(&sink_schema, &[vec![sum.to_string()]]);
    assert!(rendered.lines().any(|line| line == "|10|"), "rendered output:\n{rendered}");
}
