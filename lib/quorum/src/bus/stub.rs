// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! In-memory transport for tests: one broadcast channel per topic, plus
//! switches to simulate an unreachable broker and to inject broker-level
//! errors into live subscriptions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use super::transport::{BusTransport, RawSubscription};
use super::{BusError, ConsumerSettings};

type FrameResult = Result<Bytes, String>;

/// Shared in-memory bus. Clones share the same channels, so a producer and
/// any number of consumers wired to clones of one `StubBus` see each other.
#[derive(Clone)]
pub struct StubBus {
    inner: Arc<StubBusInner>,
}

struct StubBusInner {
    channels: RwLock<HashMap<String, broadcast::Sender<FrameResult>>>,
    capacity: usize,
    unreachable: AtomicBool,
}

impl Default for StubBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl StubBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(StubBusInner {
                channels: RwLock::new(HashMap::new()),
                capacity,
                unreachable: AtomicBool::new(false),
            }),
        }
    }

    /// Make subsequent probes fail as if the broker were down.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.inner.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Inject a broker-level error into every live subscription on `topic`.
    pub fn inject_broker_error(&self, topic: &str, reason: impl Into<String>) {
        let tx = self.get_or_create_channel(topic);
        let _ = tx.send(Err(reason.into()));
    }

    fn get_or_create_channel(&self, topic: &str) -> broadcast::Sender<FrameResult> {
        let channels = self.inner.channels.read();
        if let Some(tx) = channels.get(topic) {
            return tx.clone();
        }
        drop(channels);

        let mut channels = self.inner.channels.write();
        // Double-check after acquiring the write lock
        if let Some(tx) = channels.get(topic) {
            return tx.clone();
        }

        let (tx, _) = broadcast::channel(self.inner.capacity);
        channels.insert(topic.to_string(), tx.clone());
        tx
    }
}

#[async_trait]
impl BusTransport for StubBus {
    async fn probe(&self, settings: &ConsumerSettings) -> Result<(), BusError> {
        if self.inner.unreachable.load(Ordering::SeqCst) {
            return Err(BusError::Unreachable {
                address: settings.connection_string.clone(),
                reason: "stub broker marked unreachable".to_string(),
            });
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        _settings: &ConsumerSettings,
        topic: &str,
    ) -> Result<RawSubscription, BusError> {
        let rx = self.get_or_create_channel(topic).subscribe();

        let stream = BroadcastStream::new(rx).map(|item| match item {
            Ok(Ok(frame)) => Ok(frame),
            Ok(Err(reason)) => Err(BusError::Broker(reason)),
            Err(lagged) => Err(BusError::Broker(lagged.to_string())),
        });

        Ok(stream.boxed())
    }

    async fn publish(
        &self,
        _settings: &ConsumerSettings,
        topic: &str,
        frame: Bytes,
    ) -> Result<(), BusError> {
        // No receivers is not an error; the broker retains nothing here.
        let _ = self.get_or_create_channel(topic).send(Ok(frame));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_settings() -> ConsumerSettings {
        ConsumerSettings {
            connection_string: "stub://local".to_string(),
            group_id: "test".to_string(),
            defaults: Default::default(),
        }
    }

    #[tokio::test]
    async fn publish_reaches_subscriber() {
        let bus = StubBus::default();
        let settings = test_settings();

        let mut sub = bus.subscribe(&settings, "topic").await.unwrap();
        bus.publish(&settings, "topic", Bytes::from_static(b"hello"))
            .await
            .unwrap();

        let frame = sub.next().await.unwrap().unwrap();
        assert_eq!(frame.as_ref(), b"hello");
    }

    #[tokio::test]
    async fn probe_honours_unreachable_switch() {
        let bus = StubBus::default();
        let settings = test_settings();

        bus.probe(&settings).await.unwrap();

        bus.set_unreachable(true);
        let err = bus.probe(&settings).await.unwrap_err();
        assert!(matches!(err, BusError::Unreachable { .. }));
    }

    #[tokio::test]
    async fn injected_error_surfaces_in_stream() {
        let bus = StubBus::default();
        let settings = test_settings();

        let mut sub = bus.subscribe(&settings, "topic").await.unwrap();
        bus.inject_broker_error("topic", "poll exploded");

        let item = sub.next().await.unwrap();
        assert!(matches!(item, Err(BusError::Broker(ref r)) if r == "poll exploded"));
    }
}
