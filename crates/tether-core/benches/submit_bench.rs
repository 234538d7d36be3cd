//! Benchmarks for submission through connected hooks and owner chains.
//!
//! Run with: cargo bench -p tether-core --bench submit_bench

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use tether_core::{
    AnyValue, Hook, NexusManager, Owner, OwnerCallbacks, SubmitOptions, Submission, SyncMode,
    ValueMap, typed_value,
};

/// One group of `size` hooks.
fn make_group(manager: &NexusManager, size: usize) -> Vec<Hook<u64>> {
    let hooks: Vec<Hook<u64>> = (0..size).map(|_| Hook::new_in(manager, 0)).collect();
    for pair in hooks.windows(2) {
        pair[0]
            .connect(&pair[1], SyncMode::UseCallerValue)
            .expect("same manager and type");
    }
    hooks
}

/// `depth` owners where each owner's input is the previous owner's output.
fn make_owner_chain(manager: &NexusManager, depth: usize) -> Vec<Owner> {
    let mut owners: Vec<Owner> = Vec::with_capacity(depth);
    for _ in 0..depth {
        let builder = Owner::builder_in(manager).hook("output", 1_u64);
        let builder = match owners.last() {
            Some(prev) => builder.connected("input", &prev.any_hook("output").expect("declared")),
            None => builder.hook("input", 0_u64),
        };
        let owner = builder
            .behavior(OwnerCallbacks::new().on_complete(|submitted, _| {
                let mut extra = ValueMap::new();
                if let Some(input) = typed_value::<u64>(submitted, "input") {
                    extra.insert("output".into(), AnyValue::new(input + 1));
                }
                Ok(extra)
            }))
            .build()
            .expect("chain builds");
        owners.push(owner);
    }
    owners
}

fn bench_group_submit(c: &mut Criterion) {
    let mut group = c.benchmark_group("submit/group");

    for size in [1_usize, 8, 64, 512] {
        group.throughput(Throughput::Elements(size as u64));
        let manager = NexusManager::default();
        let hooks = make_group(&manager, size);
        let mut next = 0_u64;
        group.bench_with_input(BenchmarkId::new("hooks", size), &(), |b, _| {
            b.iter(|| {
                next += 1;
                black_box(hooks[0].submit(next).expect("no validators"))
            })
        });
    }

    group.finish();
}

fn bench_group_listeners(c: &mut Criterion) {
    let mut group = c.benchmark_group("submit/group_with_listeners");

    for size in [8_usize, 64] {
        let manager = NexusManager::default();
        let hooks = make_group(&manager, size);
        for hook in &hooks {
            tether_core::Listenable::add_listener(hook, || {
                black_box(());
            });
        }
        let mut next = 0_u64;
        group.bench_with_input(BenchmarkId::new("hooks", size), &(), |b, _| {
            b.iter(|| {
                next += 1;
                black_box(hooks[0].submit(next).expect("no validators"))
            })
        });
    }

    group.finish();
}

fn bench_owner_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("submit/owner_chain");

    for depth in [1_usize, 4, 16] {
        let manager = NexusManager::default();
        let owners = make_owner_chain(&manager, depth);
        let mut next = 0_u64;
        group.bench_with_input(BenchmarkId::new("depth", depth), &(), |b, _| {
            b.iter(|| {
                next += 1;
                black_box(owners[0].submit_value("input", next).expect("chain converges"))
            })
        });
    }

    group.finish();
}

fn bench_check_only(c: &mut Criterion) {
    let manager = NexusManager::default();
    let hooks = make_group(&manager, 64);
    c.bench_function("submit/check_only_64", |b| {
        b.iter(|| {
            let submission = Submission::new().with(&hooks[0], 7);
            black_box(manager.submit(submission, &SubmitOptions::new().check_only()))
        })
    });
}

criterion_group!(
    benches,
    bench_group_submit,
    bench_group_listeners,
    bench_owner_chain,
    bench_check_only
);
criterion_main!(benches);
