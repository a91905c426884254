use allotter::{
    Candidate, Engine, FixedClock, Identity, IdentityStatus, MemoryPoolStore, PoolCatalog,
    PoolKey, PoolSpec, Record, claim_remaining, merge_candidates,
};
use chrono::{TimeZone, Utc};
use core::hint::black_box;
use criterion::{BatchSize, Criterion, Throughput, criterion_group, criterion_main};

// Records in the pool for every benchmark iteration.
const POOL_SIZE: usize = 100_000;
const BASE_LIMIT: u32 = 250;

fn values(prefix: &str, n: usize) -> Vec<String> {
    (0..n).map(|i| format!("{prefix}-{i:07}@example.com")).collect()
}

/// The claim pass alone, on a fully free pool.
fn bench_claim_pass(c: &mut Criterion) {
    let at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    let pool: Vec<Record> = values("free", POOL_SIZE)
        .into_iter()
        .map(Record::unclaimed)
        .collect();

    let mut group = c.benchmark_group("claim_pass");
    group.throughput(Throughput::Elements(u64::from(BASE_LIMIT)));
    group.bench_function(format!("pool/{POOL_SIZE}"), |b| {
        b.iter_batched_ref(
            || pool.clone(),
            |records| {
                black_box(claim_remaining(
                    records,
                    Identity(1),
                    "bench",
                    u64::from(BASE_LIMIT),
                    at,
                ))
            },
            BatchSize::LargeInput,
        );
    });
    group.finish();
}

/// Dedup merge of a batch that is half new, half duplicates in a different
/// case.
fn bench_merge(c: &mut Criterion) {
    let existing: Vec<Record> = values("old", POOL_SIZE)
        .into_iter()
        .map(Record::unclaimed)
        .collect();
    let batch: Vec<Candidate> = values("OLD", POOL_SIZE / 2)
        .into_iter()
        .chain(values("new", POOL_SIZE / 2))
        .map(Candidate::from)
        .collect();

    let mut group = c.benchmark_group("merge_candidates");
    group.throughput(Throughput::Elements(batch.len() as u64));
    group.bench_function(format!("pool/{POOL_SIZE}"), |b| {
        b.iter_batched(
            || (existing.clone(), batch.clone()),
            |(mut records, batch)| black_box(merge_candidates(&mut records, batch)),
            BatchSize::LargeInput,
        );
    });
    group.finish();
}

/// Full engine round trip (load, claim, replace) against the in-memory store,
/// one fresh identity per iteration.
fn bench_engine_allocate(c: &mut Criterion) {
    let pool = PoolKey::from("vk");
    let engine = Engine::builder(MemoryPoolStore::new())
        .catalog(PoolCatalog::empty().with_pool(PoolSpec::new("vk", "VK", BASE_LIMIT)))
        .clock(FixedClock::new(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()))
        .build();
    engine.store().seed(&pool, values("vk", POOL_SIZE));

    let mut next_id = 0_i64;
    let mut group = c.benchmark_group("engine_allocate");
    group.throughput(Throughput::Elements(u64::from(BASE_LIMIT)));
    group.bench_function(format!("pool/{POOL_SIZE}"), |b| {
        b.iter_batched(
            || {
                next_id += 1;
                let free = engine
                    .store()
                    .snapshot(&pool)
                    .iter()
                    .filter(|r| r.is_free())
                    .count();
                if free < BASE_LIMIT as usize {
                    engine.store().seed(&pool, values(&format!("vk{next_id}"), POOL_SIZE));
                }
                let identity = Identity(next_id);
                engine
                    .set_status(identity, IdentityStatus::Approved)
                    .unwrap();
                identity
            },
            |identity| black_box(engine.allocate(&pool, identity, "bench").unwrap()),
            BatchSize::SmallInput,
        );
    });
    group.finish();
}

criterion_group!(benches, bench_claim_pass, bench_merge, bench_engine_allocate);
criterion_main!(benches);
