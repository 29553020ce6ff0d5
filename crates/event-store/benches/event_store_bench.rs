use chrono::Utc;
use common::AggregateId;
use criterion::{Criterion, criterion_group, criterion_main};
use event_store::{
    DomainEvent, EventStore, EventStoreExt, ExtendedDomainEvent, InMemoryEventStore, Version,
};

fn make_event(aggregate_id: &AggregateId, version: i64) -> ExtendedDomainEvent {
    DomainEvent::new("incremented", aggregate_id.clone())
        .with_json(serde_json::json!({ "by": 1 }))
        .extend(Version::new(version), Utc::now())
}

fn bench_save_event(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("event_store/save_event", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryEventStore::new();
                let id = AggregateId::generate("counter");
                store.save_event(make_event(&id, 1)).await.unwrap();
            });
        });
    });
}

fn bench_load_stream(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();
    let id = AggregateId::generate("counter");

    rt.block_on(async {
        for v in 1..=1_000 {
            store.save_event(make_event(&id, v)).await.unwrap();
        }
    });

    c.bench_function("event_store/load_1000_events", |b| {
        b.iter(|| {
            rt.block_on(async {
                let events = store.get_all_events(&id).await.unwrap();
                assert_eq!(events.len(), 1_000);
            });
        });
    });

    c.bench_function("event_store/load_tail_after_900", |b| {
        b.iter(|| {
            rt.block_on(async {
                let events = store.get_events(&id, Version::new(901)).await.unwrap();
                assert_eq!(events.len(), 100);
            });
        });
    });
}

criterion_group!(benches, bench_save_event, bench_load_stream);
criterion_main!(benches);
