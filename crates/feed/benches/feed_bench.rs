use common::{LogPosition, StreamId};
use criterion::{Criterion, criterion_group, criterion_main};
use event_store::{
    EventStore, EventStoreExt, ExpectedVersion, InMemoryEventStore, NewEvent, ReadDirection,
    ReadResult,
};
use feed::{EmbedLevel, FeedCache, FeedUrls, PageCursor, ReadResultAdapter};
use serde_json::json;

fn bench_adapt_all_page(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();
    let read: ReadResult = rt.block_on(async {
        let stream = StreamId::new("orders-1").unwrap();
        for i in 0..100 {
            let event = NewEvent::builder()
                .event_type("Added")
                .data_raw(json!({ "i": i, "sku": "SKU-001" }))
                .build();
            store
                .append_event(&stream, event, ExpectedVersion::Any)
                .await
                .unwrap();
        }
        store
            .read_all_forward(LogPosition::START, 100)
            .await
            .unwrap()
            .into()
    });
    let adapter = ReadResultAdapter::new(FeedUrls::new("http://localhost:3000"));
    let cache = FeedCache::default();

    for embed in [EmbedLevel::None, EmbedLevel::Rich] {
        c.bench_function(&format!("feed/adapt_100_events_{embed}"), |b| {
            b.iter(|| adapter.adapt(&read, embed, ReadDirection::Forward, PageCursor::at(100)));
        });
    }

    c.bench_function("feed/cache_decide", |b| {
        b.iter(|| cache.decide(&read, EmbedLevel::Body, Some("\"$all:99;body\"")));
    });
}

criterion_group!(benches, bench_adapt_all_page);
criterion_main!(benches);
