// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Single-topic bus consumer with a cancellable background worker.
//!
//! State machine: `Unconnected → Connected → Listening → Stopping → Stopped`.
//! `connect` validates and merges settings, then probes the broker.
//! `listen` may be called at most once per instance and spawns the worker.
//! `teardown` cancels the worker cooperatively; the worker observes the
//! signal at its next loop iteration and releases its subscription on exit.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::transport::BusTransport;
use super::{BusError, ConsumerSettings, Delivery, ListenerId, ListenerRegistry, Record, WorkerId};

/// Delay before re-opening a subscription after a broker-level failure.
const RESUBSCRIBE_DELAY: Duration = Duration::from_millis(250);

struct WorkerHandle {
    id: WorkerId,
    token: CancellationToken,
    join: Option<JoinHandle<()>>,
}

pub struct MessageBusConsumer {
    transport: Arc<dyn BusTransport>,
    settings: Option<ConsumerSettings>,
    topic: Option<String>,
    listeners: Arc<ListenerRegistry>,
    worker: Option<WorkerHandle>,
}

impl MessageBusConsumer {
    /// A consumer starts unconnected; `connect` must succeed before
    /// `listen`.
    pub fn new(transport: Arc<dyn BusTransport>) -> Self {
        Self {
            transport,
            settings: None,
            topic: None,
            listeners: Arc::new(ListenerRegistry::default()),
            worker: None,
        }
    }

    /// Validate the settings bundle (required keys `connection_string` and
    /// `group_id`), merge in the protocol defaults, then run an eager
    /// reachability probe against the broker. The settings are fully merged
    /// before the probe so the probe sees exactly what `listen` will use.
    pub async fn connect(&mut self, settings: &HashMap<String, String>) -> Result<(), BusError> {
        if self.settings.is_some() {
            return Err(BusError::AlreadyConnected);
        }

        let merged = ConsumerSettings::from_map(settings)?;
        self.transport.probe(&merged).await?;

        self.settings = Some(merged);
        Ok(())
    }

    /// Subscribe to `topic` and start the background worker. One consumer
    /// instance serves one topic for its lifetime; a second call fails with
    /// a state error and spawns nothing.
    pub fn listen(&mut self, topic: &str) -> Result<WorkerId, BusError> {
        if let Some(assigned) = &self.topic {
            return Err(BusError::TopicAssigned(assigned.clone()));
        }
        let settings = self.settings.clone().ok_or(BusError::NotConnected)?;

        self.topic = Some(topic.to_string());

        let id = WorkerId::next();
        let token = CancellationToken::new();
        info!(worker = %id, topic, "listening to message bus");

        let join = tokio::spawn(run_worker(
            self.transport.clone(),
            settings,
            topic.to_string(),
            self.listeners.clone(),
            token.clone(),
            id,
        ));

        self.worker = Some(WorkerHandle {
            id,
            token,
            join: Some(join),
        });
        Ok(id)
    }

    /// Register a listener; it receives every subsequent delivery on the
    /// worker task, in registration order. Returns the handle used to
    /// remove it.
    pub fn add_listener(&self, listener: impl Fn(&Delivery) + Send + Sync + 'static) -> ListenerId {
        self.listeners.add(Box::new(listener))
    }

    /// Remove a previously registered listener. Returns false if the handle
    /// was not registered (or already removed).
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Deliver one record-or-error to every registered listener,
    /// synchronously and in registration order, under the registry lock.
    /// The worker calls this for every received frame; it is public so
    /// callers can inject deliveries of their own.
    pub fn dispatch(&self, delivery: &Delivery) {
        self.listeners.dispatch(delivery);
    }

    /// Signal the worker to stop. Cooperative: the worker observes the
    /// signal at its next poll-loop iteration, releases its subscription and
    /// exits; this call does not wait for that. Fails with a state error if
    /// `listen` was never called.
    pub fn teardown(&mut self) -> Result<WorkerId, BusError> {
        let worker = self.worker.as_ref().ok_or(BusError::NeverStarted)?;

        warn!(worker = %worker.id, "interrupting message bus worker");
        worker.token.cancel();
        Ok(worker.id)
    }

    /// Wait for a torn-down worker to finish. No-op when no worker was
    /// started or it was already awaited.
    pub async fn join_worker(&mut self) -> Result<(), BusError> {
        if let Some(worker) = self.worker.as_mut() {
            if let Some(join) = worker.join.take() {
                join.await
                    .map_err(|err| BusError::Broker(err.to_string()))?;
            }
        }
        Ok(())
    }

    /// Identifier of the running worker, if `listen` has been called.
    pub fn worker_id(&self) -> Option<WorkerId> {
        self.worker.as_ref().map(|worker| worker.id)
    }
}

/// The poll loop. Runs until cancelled; broker-level errors become failed
/// deliveries and the subscription is re-opened after a short delay, so a
/// flaky broker is observable to listeners without being fatal to the
/// worker.
async fn run_worker(
    transport: Arc<dyn BusTransport>,
    settings: ConsumerSettings,
    topic: String,
    listeners: Arc<ListenerRegistry>,
    token: CancellationToken,
    id: WorkerId,
) {
    'poll: while !token.is_cancelled() {
        let subscription = tokio::select! {
            biased;
            _ = token.cancelled() => break 'poll,
            result = transport.subscribe(&settings, &topic) => result,
        };

        let mut subscription = match subscription {
            Ok(subscription) => subscription,
            Err(err) => {
                warn!(worker = %id, topic = %topic, error = %err, "subscribe failed");
                listeners.dispatch(&Err(err));
                if pause(&token).await {
                    break 'poll;
                }
                continue 'poll;
            }
        };

        loop {
            let item = tokio::select! {
                biased;
                _ = token.cancelled() => break 'poll,
                item = subscription.next() => item,
            };

            match item {
                Some(Ok(frame)) => {
                    let delivery: Delivery =
                        serde_json::from_slice::<Record>(&frame).map_err(BusError::from);
                    listeners.dispatch(&delivery);
                }
                Some(Err(err)) => {
                    warn!(worker = %id, topic = %topic, error = %err, "broker error mid-poll");
                    listeners.dispatch(&Err(err));
                }
                None => {
                    listeners.dispatch(&Err(BusError::Broker(
                        "subscription closed by broker".to_string(),
                    )));
                    if pause(&token).await {
                        break 'poll;
                    }
                    continue 'poll;
                }
            }
        }
    }

    // Dropping the subscription on the way out releases the broker-side
    // resource before the worker reaches its terminal state.
    info!(worker = %id, topic = %topic, "message bus worker interrupted");
}

/// Sleep between subscription attempts, waking early on cancellation.
/// Returns true when the worker should exit.
async fn pause(token: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = token.cancelled() => true,
        _ = tokio::time::sleep(RESUBSCRIBE_DELAY) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{StubBus, SETTING_CONNECTION_STRING, SETTING_GROUP_ID};

    fn full_settings() -> HashMap<String, String> {
        HashMap::from([
            (
                SETTING_CONNECTION_STRING.to_string(),
                "stub://local".to_string(),
            ),
            (SETTING_GROUP_ID.to_string(), "test".to_string()),
        ])
    }

    #[tokio::test]
    async fn connect_rejects_missing_group_id_before_broker_contact() {
        let bus = StubBus::default();
        // If the consumer touched the broker first, this would surface as
        // Unreachable rather than the configuration error.
        bus.set_unreachable(true);

        let mut consumer = MessageBusConsumer::new(Arc::new(bus));
        let mut settings = full_settings();
        settings.remove(SETTING_GROUP_ID);

        let err = consumer.connect(&settings).await.unwrap_err();
        assert!(matches!(err, BusError::MissingSetting(SETTING_GROUP_ID)));
    }

    #[tokio::test]
    async fn connect_surfaces_unreachable_broker() {
        let bus = StubBus::default();
        bus.set_unreachable(true);

        let mut consumer = MessageBusConsumer::new(Arc::new(bus));
        let err = consumer.connect(&full_settings()).await.unwrap_err();
        assert!(matches!(err, BusError::Unreachable { .. }));

        // The failed probe leaves the consumer unconnected.
        assert!(matches!(
            consumer.listen("testTopic").unwrap_err(),
            BusError::NotConnected
        ));
    }

    #[tokio::test]
    async fn second_connect_is_rejected() {
        let mut consumer = MessageBusConsumer::new(Arc::new(StubBus::default()));
        consumer.connect(&full_settings()).await.unwrap();

        let err = consumer.connect(&full_settings()).await.unwrap_err();
        assert!(matches!(err, BusError::AlreadyConnected));
    }

    #[tokio::test]
    async fn listen_before_connect_is_rejected() {
        let mut consumer = MessageBusConsumer::new(Arc::new(StubBus::default()));
        assert!(matches!(
            consumer.listen("testTopic").unwrap_err(),
            BusError::NotConnected
        ));
    }

    #[tokio::test]
    async fn second_listen_is_rejected_and_spawns_no_worker() {
        let mut consumer = MessageBusConsumer::new(Arc::new(StubBus::default()));
        consumer.connect(&full_settings()).await.unwrap();

        let first = consumer.listen("testTopic").unwrap();
        let err = consumer.listen("otherTopic").unwrap_err();

        assert!(matches!(err, BusError::TopicAssigned(ref topic) if topic == "testTopic"));
        assert_eq!(consumer.worker_id(), Some(first));

        consumer.teardown().unwrap();
    }

    #[tokio::test]
    async fn teardown_before_listen_is_rejected() {
        let mut consumer = MessageBusConsumer::new(Arc::new(StubBus::default()));
        let err = consumer.teardown().unwrap_err();
        assert!(matches!(err, BusError::NeverStarted));
    }

    #[tokio::test]
    async fn teardown_returns_the_worker_id_and_stops_the_worker() {
        let mut consumer = MessageBusConsumer::new(Arc::new(StubBus::default()));
        consumer.connect(&full_settings()).await.unwrap();

        let id = consumer.listen("testTopic").unwrap();
        assert_eq!(consumer.teardown().unwrap(), id);

        consumer.join_worker().await.unwrap();
    }
}
