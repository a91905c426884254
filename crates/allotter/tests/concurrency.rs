use allotter::{
    AllocationOutcome, Engine, Identity, IdentityStatus, MemoryPoolStore, PoolCatalog, PoolKey,
    PoolSpec, Service, ServiceConfig,
};
use futures::future::join_all;
use std::{collections::HashSet, sync::Arc, thread};

const IDENTITIES: i64 = 16;
const LIMIT: u32 = 5;

fn engine(supply: usize) -> Engine<MemoryPoolStore> {
    let engine = Engine::in_memory(
        PoolCatalog::empty().with_pool(PoolSpec::new("tg", "Telegram", LIMIT)),
    );
    engine.add_manager(Identity(0)).unwrap();
    for id in 1..=IDENTITIES {
        engine
            .set_status(Identity(id), IdentityStatus::Approved)
            .unwrap();
    }
    engine
        .store()
        .seed(&PoolKey::from("tg"), (0..supply).map(|i| format!("@user{i:04}")));
    engine
}

fn assert_disjoint(batches: &[Vec<String>]) {
    let mut seen = HashSet::new();
    for value in batches.iter().flatten() {
        assert!(seen.insert(value.clone()), "{value} handed out twice");
    }
}

#[test]
fn threads_never_share_a_record() {
    let engine = Arc::new(engine(IDENTITIES as usize * LIMIT as usize));
    let pool = PoolKey::from("tg");

    let handles: Vec<_> = (1..=IDENTITIES)
        .map(|id| {
            let engine = Arc::clone(&engine);
            let pool = pool.clone();
            thread::spawn(move || engine.allocate(&pool, Identity(id), "").unwrap())
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    for result in &results {
        assert_eq!(result.outcome, AllocationOutcome::Granted);
        assert_eq!(result.values.len(), LIMIT as usize);
    }
    let batches: Vec<_> = results.into_iter().map(|r| r.values).collect();
    assert_disjoint(&batches);

    let stats = engine.get_stats().unwrap();
    assert_eq!(stats.total_free(), 0);
    for id in 1..=IDENTITIES {
        assert_eq!(engine.held_by(&pool, Identity(id)).unwrap(), LIMIT as usize);
    }
}

#[test]
fn short_supply_is_split_without_partial_grants() {
    // enough for half the identities
    let engine = Arc::new(engine(IDENTITIES as usize / 2 * LIMIT as usize));
    let pool = PoolKey::from("tg");

    let handles: Vec<_> = (1..=IDENTITIES)
        .map(|id| {
            let engine = Arc::clone(&engine);
            let pool = pool.clone();
            thread::spawn(move || engine.allocate(&pool, Identity(id), "").unwrap())
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let granted = results.iter().filter(|r| r.is_granted()).count();
    assert_eq!(granted, IDENTITIES as usize / 2);
    for result in &results {
        match result.outcome {
            AllocationOutcome::Granted => assert_eq!(result.values.len(), LIMIT as usize),
            AllocationOutcome::InsufficientSupply => assert!(result.values.is_empty()),
            AllocationOutcome::QuotaExhausted => panic!("nobody held anything yet"),
        }
    }
    let batches: Vec<_> = results.into_iter().map(|r| r.values).collect();
    assert_disjoint(&batches);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn service_serves_concurrent_identities() {
    let config = ServiceConfig {
        num_workers: 4,
        ..ServiceConfig::default()
    };
    let service = Service::new(engine(IDENTITIES as usize * LIMIT as usize), &config);
    let pool = PoolKey::from("tg");

    let results = join_all((1..=IDENTITIES).map(|id| {
        let service = service.clone();
        let pool = pool.clone();
        async move { service.allocate(&pool, Identity(id), "").await }
    }))
    .await;

    let batches: Vec<_> = results
        .into_iter()
        .map(|r| {
            let allocation = r.unwrap();
            assert!(allocation.is_granted());
            allocation.values
        })
        .collect();
    assert_disjoint(&batches);
    assert!(service.in_flight().is_empty());

    let stats = service.get_stats().await.unwrap();
    assert_eq!(stats.total_free(), 0);
    service.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn repeated_requests_never_exceed_the_allowance() {
    let config = ServiceConfig {
        num_workers: 2,
        ..ServiceConfig::default()
    };
    let service = Service::new(engine(100), &config);
    let pool = PoolKey::from("tg");
    let user = Identity(3);

    // the same identity hammering one pool: each attempt is either served,
    // refused as already in flight, or finds the quota used up
    let results = join_all((0..8).map(|_| {
        let service = service.clone();
        let pool = pool.clone();
        async move { service.allocate(&pool, user, "").await }
    }))
    .await;

    let mut granted = 0;
    for result in results {
        match result {
            Ok(allocation) if allocation.is_granted() => granted += 1,
            Ok(allocation) => assert_eq!(allocation.outcome, AllocationOutcome::QuotaExhausted),
            Err(err) => assert!(err.is_transient(), "{err}"),
        }
    }
    assert_eq!(granted, 1);
    assert_eq!(
        service.engine().held_by(&pool, user).unwrap(),
        LIMIT as usize
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_waits_for_queued_work() {
    let service = Service::new(engine(100), &ServiceConfig::default());
    let pool = PoolKey::from("tg");

    let pending: Vec<_> = (1..=4)
        .map(|id| {
            let service = service.clone();
            let pool = pool.clone();
            tokio::spawn(async move { service.allocate(&pool, Identity(id), "").await })
        })
        .collect();
    for task in pending {
        assert!(task.await.unwrap().unwrap().is_granted());
    }

    service.shutdown().await.unwrap();
    let err = service
        .allocate(&pool, Identity(5), "")
        .await
        .unwrap_err();
    assert!(matches!(err, allotter::Error::ServiceShutdown));
    assert!(service.in_flight().is_empty());
}
