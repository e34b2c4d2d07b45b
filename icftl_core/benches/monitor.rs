use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use icftl_core::*;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

#[inline(always)]
fn specifications() -> Vec<Specification> {
    let positive = RawSpecification::new("positive")
        .forall(
            RawQuantifier::new("x", "enter(f)")
                .field("value", Type::Integer)
                .until("exit(f)"),
        )
        .check(RawFormula::Compare(
            CmpOp::Gt,
            RawOperand::Field("x".into(), "value".into()),
            RawOperand::Literal(Val::Integer(0)),
        ));
    let ordered = RawSpecification::new("ordered")
        .forall(
            RawQuantifier::new("x", "enter(f)")
                .field("value", Type::Integer)
                .until("exit(f)"),
        )
        .forall(RawQuantifier::new("y", "enter(g)"))
        .check(RawFormula::And(vec![
            RawFormula::Apply(
                "before".into(),
                vec![RawArg::Variable("x".into()), RawArg::Variable("y".into())],
            ),
            RawFormula::Apply(
                "eventually".into(),
                vec![RawArg::Formula(RawFormula::Compare(
                    CmpOp::Le,
                    RawOperand::Field("x".into(), "value".into()),
                    RawOperand::Literal(Val::Integer(-3)),
                ))],
            ),
        ]));
    [positive, ordered]
        .into_iter()
        .map(|raw| compile(raw).expect("compile"))
        .collect()
}

#[inline(always)]
fn trace(len: u64) -> Vec<Arc<Event>> {
    let mut rng = SmallRng::from_seed([0; 32]);
    let points = ["enter(f)", "enter(g)", "exit(g)", "exit(f)", "enter(h)"];
    (0..len)
        .map(|t| {
            Arc::new(
                Event::new(t, points[rng.random_range(0..points.len())], rng.random_range(0..64))
                    .with_value("value", rng.random_range(-5i64..5)),
            )
        })
        .collect()
}

fn session_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("session");
    for len in [1_000u64, 10_000] {
        let events = trace(len);
        group.throughput(Throughput::Elements(len));
        for parallel in [false, true] {
            group.bench_with_input(
                BenchmarkId::new(if parallel { "parallel" } else { "sequential" }, len),
                &events,
                |b, events| {
                    b.iter(|| {
                        let mut session = Session::new(specifications(), ClosurePolicy::False)
                            .with_parallel(parallel);
                        for event in events {
                            session.process(Arc::clone(event));
                        }
                        session.close()
                    })
                },
            );
        }
    }
    group.finish();
}

fn monitor_benchmark(c: &mut Criterion) {
    let events = trace(10_000);
    c.bench_function("monitor 10000", |b| {
        b.iter(|| {
            let monitor =
                Monitor::start(specifications(), MonitorConfig::default(), ()).expect("start");
            for event in &events {
                monitor.submit(Arc::clone(event)).expect("submit");
            }
            monitor.stop().expect("stop")
        })
    });
}

criterion_group!(benches, session_benchmark, monitor_benchmark);
criterion_main!(benches);
