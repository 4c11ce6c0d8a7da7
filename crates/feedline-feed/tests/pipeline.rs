// End-to-end: rows appended to a real SQLite log reach subscribers through
// the event source and broadcaster.

use std::sync::Arc;
use std::time::Duration;

use feedline_core::config::FeedConfig;
use feedline_feed::{Broadcaster, EventSource, Outbox, PollOutcome, SubscriberHandle, SubscriberRegistry};
use feedline_protocol::WireMessage;
use feedline_store::SqliteEventLog;
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn setup(config: &FeedConfig) -> (SqliteEventLog, Arc<SubscriberRegistry>, EventSource) {
    let log = SqliteEventLog::open_in_memory().unwrap();
    let registry = Arc::new(SubscriberRegistry::new());
    let broadcaster = Broadcaster::new(Arc::clone(&registry), config.send_timeout());
    let source = EventSource::new(Arc::new(log.clone()), broadcaster, config);
    (log, registry, source)
}

fn received(outbox: &mut Outbox) -> Vec<WireMessage> {
    std::iter::from_fn(|| outbox.try_next())
        .map(|text| serde_json::from_str(&text).unwrap())
        .collect()
}

#[tokio::test]
async fn appended_rows_reach_every_subscriber() {
    let config = FeedConfig::default();
    let (log, registry, mut source) = setup(&config);
    let root = CancellationToken::new();
    let (a, mut outbox_a) = SubscriberHandle::new(config.subscriber_buffer, &root);
    let (b, mut outbox_b) = SubscriberHandle::new(config.subscriber_buffer, &root);
    let _reg_a = registry.register(a);
    let _reg_b = registry.register(b);

    log.append("Order", "insert", &json!({"order_key": 1})).unwrap();
    log.append("OrderLineItem", "update", &json!({"quantity": 4})).unwrap();

    assert!(matches!(source.poll_once().await, PollOutcome::Dispatched(_)));

    for outbox in [&mut outbox_a, &mut outbox_b] {
        let got = received(outbox);
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].entity, "Order");
        assert_eq!(got[0].data["order_key"], 1);
        assert_eq!(got[1].event_type, "update");
        assert!(got[1].timestamp.ends_with('Z'));
    }
    assert_eq!(source.cursor().last_delivered_id(), 2);
}

#[tokio::test]
async fn disconnect_mid_stream_leaves_others_untouched() {
    let config = FeedConfig::default();
    let (log, registry, mut source) = setup(&config);
    let root = CancellationToken::new();
    let (a, mut outbox_a) = SubscriberHandle::new(config.subscriber_buffer, &root);
    let (b, _outbox_b) = SubscriberHandle::new(config.subscriber_buffer, &root);
    let _reg_a = registry.register(a);
    let reg_b = registry.register(b);

    log.append("Order", "insert", &json!({"n": 1})).unwrap();
    source.poll_once().await;
    drop(reg_b);
    log.append("Order", "insert", &json!({"n": 2})).unwrap();
    source.poll_once().await;

    assert_eq!(registry.current_subscriber_count(), 1);
    let got: Vec<_> = received(&mut outbox_a).iter().map(|m| m.data["n"].clone()).collect();
    assert_eq!(got, vec![json!(1), json!(2)]);
}

#[tokio::test]
async fn running_source_streams_until_shutdown() {
    let config = FeedConfig {
        poll_interval_ms: 10,
        batch_limit: 3,
        ..FeedConfig::default()
    };
    let (log, registry, source) = setup(&config);
    let root = CancellationToken::new();
    let (handle, mut outbox) = SubscriberHandle::new(config.subscriber_buffer, &root);
    let _registration = registry.register(handle);

    for n in 0..10 {
        log.append("Order", "insert", &json!({ "n": n })).unwrap();
    }
    let task = tokio::spawn(source.run(root.clone()));

    let mut seen = Vec::new();
    while seen.len() < 10 {
        let text = tokio::time::timeout(Duration::from_secs(5), outbox.next())
            .await
            .expect("feed stalled")
            .expect("subscriber closed early");
        let message: WireMessage = serde_json::from_str(&text).unwrap();
        seen.push(message.data["n"].as_i64().unwrap());
    }
    assert_eq!(seen, (0..10).collect::<Vec<_>>());

    // let the last cycle finish advancing the cursor before stopping
    tokio::time::sleep(Duration::from_millis(50)).await;
    root.cancel();
    let cursor = task.await.unwrap();
    assert_eq!(cursor.last_delivered_id(), 10);
}
