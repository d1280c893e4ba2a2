use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use referral_engine::{Amount, Engine, InMemoryStore, UserId};

/// Engine with a three-level chain; returns the leaf purchaser's id.
///
/// Every purchase above the threshold walks both ancestor levels, so this
/// measures the full distribution path: transaction, two earnings, two
/// balance updates.
fn chain_engine() -> (Engine<InMemoryStore>, UserId) {
    let engine = Engine::new(InMemoryStore::new(), ());
    let root = engine
        .register_user("grace", "grace@example.com", None)
        .unwrap();
    let mid = engine
        .register_user("adam", "adam@example.com", Some(&root.referral_code))
        .unwrap();
    let leaf = engine
        .register_user("piper", "piper@example.com", Some(&mid.referral_code))
        .unwrap();
    (engine, leaf.id)
}

fn bench_record_purchase(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_purchase");

    for (name, units) in [("below_threshold", 500), ("above_threshold", 5000)] {
        group.bench_with_input(BenchmarkId::from_parameter(name), &units, |b, &units| {
            let (engine, leaf) = chain_engine();
            let amount = Amount::from_units(units);
            b.iter(|| {
                black_box(engine.record_purchase(leaf, amount, None).unwrap());
            });
        });
    }

    group.finish();
}

fn bench_register_user(c: &mut Criterion) {
    c.bench_function("register_user", |b| {
        let engine = Engine::new(InMemoryStore::new(), ());
        let mut next = 0u64;
        b.iter(|| {
            next += 1;
            let username = format!("user{next}");
            let email = format!("user{next}@example.com");
            black_box(engine.register_user(&username, &email, None).unwrap());
        });
    });
}

criterion_group!(benches, bench_record_purchase, bench_register_user);
criterion_main!(benches);
