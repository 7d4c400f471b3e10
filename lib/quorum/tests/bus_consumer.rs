// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! End-to-end consumer scenarios over the in-memory stub bus.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

use nlpcore_quorum::bus::{
    BusError, BusTransport, MessageBusConsumer, MessageBusProducer, Record, StubBus,
    SETTING_CONNECTION_STRING, SETTING_GROUP_ID,
};
use nlpcore_quorum::ConsumerSettings;

fn settings_map() -> HashMap<String, String> {
    HashMap::from([
        (
            SETTING_CONNECTION_STRING.to_string(),
            "stub://local".to_string(),
        ),
        (SETTING_GROUP_ID.to_string(), "test".to_string()),
    ])
}

fn producer_for(bus: &StubBus) -> MessageBusProducer {
    let settings = ConsumerSettings::from_map(&settings_map()).unwrap();
    MessageBusProducer::new(Arc::new(bus.clone()), settings)
}

#[tokio::test]
async fn one_record_reaches_one_listener() {
    let bus = StubBus::default();
    let mut consumer = MessageBusConsumer::new(Arc::new(bus.clone()));
    consumer.connect(&settings_map()).await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    consumer.add_listener(move |delivery| {
        if let Ok(record) = delivery {
            let _ = tx.send(record.clone());
        }
    });

    consumer.listen("testTopic").unwrap();
    sleep(Duration::from_millis(100)).await;

    producer_for(&bus)
        .publish("testTopic", &Record::new("testKey", "testValue"))
        .await
        .unwrap();

    let record = timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("no delivery within the bounded wait")
        .unwrap();
    assert_eq!(record.key, "testKey");
    assert_eq!(record.value, "testValue");

    // Exactly one successful delivery for the single published record.
    assert!(timeout(Duration::from_millis(200), rx.recv()).await.is_err());

    consumer.teardown().unwrap();
    consumer.join_worker().await.unwrap();
}

#[tokio::test]
async fn teardown_stops_record_delivery() {
    let bus = StubBus::default();
    let mut consumer = MessageBusConsumer::new(Arc::new(bus.clone()));
    consumer.connect(&settings_map()).await.unwrap();

    let received = Arc::new(AtomicUsize::new(0));
    let received_clone = received.clone();
    consumer.add_listener(move |delivery| {
        if delivery.is_ok() {
            received_clone.fetch_add(1, Ordering::SeqCst);
        }
    });

    let id = consumer.listen("testTopic").unwrap();
    sleep(Duration::from_millis(100)).await;

    let producer = producer_for(&bus);
    producer
        .publish("testTopic", &Record::new("k1", "v1"))
        .await
        .unwrap();

    timeout(Duration::from_secs(1), async {
        while received.load(Ordering::SeqCst) < 1 {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("first record never delivered");

    assert_eq!(consumer.teardown().unwrap(), id);
    consumer.join_worker().await.unwrap();

    producer
        .publish("testTopic", &Record::new("k2", "v2"))
        .await
        .unwrap();
    sleep(Duration::from_millis(200)).await;

    assert_eq!(received.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn broker_errors_are_observable_and_not_fatal() {
    let bus = StubBus::default();
    let mut consumer = MessageBusConsumer::new(Arc::new(bus.clone()));
    consumer.connect(&settings_map()).await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    consumer.add_listener(move |delivery: &Result<Record, BusError>| {
        let _ = tx.send(delivery.as_ref().map(Clone::clone).map_err(|e| e.to_string()));
    });

    consumer.listen("testTopic").unwrap();
    sleep(Duration::from_millis(100)).await;

    bus.inject_broker_error("testTopic", "poll exploded");

    let failed = timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("failed delivery never surfaced")
        .unwrap();
    assert!(failed.is_err());

    // Polling continues after the failure.
    producer_for(&bus)
        .publish("testTopic", &Record::new("testKey", "testValue"))
        .await
        .unwrap();

    let delivered = timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("record after broker error never delivered")
        .unwrap();
    assert_eq!(delivered.unwrap(), Record::new("testKey", "testValue"));

    consumer.teardown().unwrap();
    consumer.join_worker().await.unwrap();
}

#[tokio::test]
async fn malformed_frames_surface_as_failed_deliveries() {
    let bus = StubBus::default();
    let mut consumer = MessageBusConsumer::new(Arc::new(bus.clone()));
    consumer.connect(&settings_map()).await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    consumer.add_listener(move |delivery| {
        let _ = tx.send(delivery.is_ok());
    });

    consumer.listen("testTopic").unwrap();
    sleep(Duration::from_millis(100)).await;

    let settings = ConsumerSettings::from_map(&settings_map()).unwrap();
    bus.publish(&settings, "testTopic", "{not a frame".into())
        .await
        .unwrap();

    let ok = timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("malformed frame never surfaced")
        .unwrap();
    assert!(!ok);

    consumer.teardown().unwrap();
    consumer.join_worker().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_listener_churn_loses_nothing_for_stable_listeners() {
    let bus = StubBus::default();
    let mut consumer = MessageBusConsumer::new(Arc::new(bus.clone()));
    consumer.connect(&settings_map()).await.unwrap();

    const STABLE_LISTENERS: usize = 100;
    const RECORDS: usize = 10;

    let counters: Vec<Arc<AtomicUsize>> = (0..STABLE_LISTENERS)
        .map(|_| Arc::new(AtomicUsize::new(0)))
        .collect();
    for counter in &counters {
        let counter = counter.clone();
        consumer.add_listener(move |delivery| {
            if delivery.is_ok() {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
    }

    consumer.listen("testTopic").unwrap();
    sleep(Duration::from_millis(100)).await;

    let consumer = Arc::new(consumer);

    // Churn transient listeners from another thread while records flow.
    let churn_consumer = consumer.clone();
    let churn = tokio::task::spawn_blocking(move || {
        for _ in 0..200 {
            let id = churn_consumer.add_listener(|_| {});
            assert!(churn_consumer.remove_listener(id));
        }
    });

    let producer = producer_for(&bus);
    for i in 0..RECORDS {
        producer
            .publish("testTopic", &Record::new(format!("k{i}"), format!("v{i}")))
            .await
            .unwrap();
    }

    churn.await.unwrap();

    timeout(Duration::from_secs(2), async {
        loop {
            let done = counters
                .iter()
                .all(|counter| counter.load(Ordering::SeqCst) >= RECORDS);
            if done {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("stable listeners did not observe every record");

    // No duplicates either: each stable listener saw each record exactly once.
    for counter in &counters {
        assert_eq!(counter.load(Ordering::SeqCst), RECORDS);
    }

    let mut consumer = Arc::try_unwrap(consumer).unwrap_or_else(|_| panic!("consumer still shared"));
    consumer.teardown().unwrap();
    consumer.join_worker().await.unwrap();
}
