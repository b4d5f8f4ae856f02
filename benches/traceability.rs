//! This bench computes downstream and upstream traceability over a session
//! of interlinked scenarios and requirements.

#![allow(missing_docs)]

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use scenario::{ReqTraceability, Session, Tracker};

/// Defines scenarios verifying requirements directly and through steps.
fn preseed_session() -> (Session, ReqTraceability) {
    let mut session = Session::default();
    let mut traceability = ReqTraceability::new();
    for i in 1..=99 {
        let scenario = session
            .define(&format!("scenario{i:03}"), (), |asm| {
                asm.title(format!("Scenario {i}"))
                    .verifies([format!("REQ-{i:03}")])?;
                for j in 1..=5 {
                    let step = asm.step(&format!("step{j:03}"), |(), _| Ok(()))?;
                    asm.session().verifies(
                        Tracker::Step(step),
                        [format!("REQ-{i:03}/{j}"), format!("REQ-{:03}", 100 - i)],
                    )?;
                }
                Ok(())
            })
            .unwrap();
        traceability.push_scenario(scenario);
    }
    (session, traceability)
}

fn traceability(c: &mut Criterion) {
    c.bench_function("downstream traceability", |b| {
        b.iter_batched(
            preseed_session,
            |(session, traceability)| traceability.downstream(&session),
            BatchSize::SmallInput,
        );
    });
    c.bench_function("upstream traceability", |b| {
        b.iter_batched(
            preseed_session,
            |(session, traceability)| traceability.upstream(&session),
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, traceability);
criterion_main!(benches);
