use carshare_core::executor::Executor;
use carshare_core::program::{compile_program, ProgramKind};
use carshare_core::{Address, AppArg, ApplicationCall, OnCompletion};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

fn trip_executor(participant: Address) -> Executor {
    let mut executor = Executor::default();
    let args = vec![
        AppArg::uint(1),
        "DepA".into(),
        "ArrA".into(),
        "2024-01-01".into(),
        "2024-01-02".into(),
        AppArg::uint(100),
        AppArg::uint(4),
    ];
    executor
        .execute_call(&ApplicationCall::create(participant, args))
        .expect("create");
    executor
        .execute_call(&ApplicationCall::new(1, OnCompletion::OptIn, participant))
        .expect("opt in");
    executor
}

fn bench_add_deduct(c: &mut Criterion) {
    let alice = Address::from_label("alice");
    let template = trip_executor(alice);
    let add = ApplicationCall::no_op(1, alice, "Add");
    let deduct = ApplicationCall::no_op(1, alice, "Deduct");

    // Each iteration starts from a fresh executor so the provenance log
    // stays at its post-setup length
    c.bench_function("add_then_deduct", |b| {
        b.iter_batched(
            || template.clone(),
            |mut executor| {
                executor.execute_call(black_box(&add)).expect("add");
                executor.execute_call(black_box(&deduct)).expect("deduct");
                executor
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_compile(c: &mut Criterion) {
    c.bench_function("compile_approval", |b| {
        b.iter(|| compile_program(black_box(ProgramKind::Approval)).expect("compile"))
    });
}

criterion_group!(benches, bench_add_deduct, bench_compile);
criterion_main!(benches);
