// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! NATS JetStream transport.
//!
//! The consumer-group defaults map onto JetStream as follows: the durable
//! consumer is named by `group_id` (group semantics), earliest-offset reset
//! is `DeliverPolicy::All`, and auto-commit is `AckPolicy::None`. Record
//! frames are UTF-8 JSON payloads.

use async_nats::jetstream;
use async_nats::jetstream::consumer::{pull, AckPolicy, DeliverPolicy};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;

use super::transport::{BusTransport, RawSubscription};
use super::{BusError, ConsumerSettings, OffsetReset};

/// Stateless NATS transport; each operation opens its own client so that the
/// worker task exclusively owns its subscription's connection.
#[derive(Debug, Default, Clone, Copy)]
pub struct NatsBus;

impl NatsBus {
    pub fn new() -> Self {
        Self
    }

    async fn client(settings: &ConsumerSettings) -> Result<async_nats::Client, BusError> {
        async_nats::connect(&settings.connection_string)
            .await
            .map_err(|err| BusError::Unreachable {
                address: settings.connection_string.clone(),
                reason: err.to_string(),
            })
    }

    fn deliver_policy(settings: &ConsumerSettings) -> DeliverPolicy {
        match settings.defaults.offset_reset {
            OffsetReset::Earliest => DeliverPolicy::All,
            OffsetReset::Latest => DeliverPolicy::New,
        }
    }

    fn ack_policy(settings: &ConsumerSettings) -> AckPolicy {
        if settings.defaults.auto_commit {
            AckPolicy::None
        } else {
            AckPolicy::Explicit
        }
    }
}

#[async_trait]
impl BusTransport for NatsBus {
    async fn probe(&self, settings: &ConsumerSettings) -> Result<(), BusError> {
        let client = Self::client(settings).await?;
        let outcome = client.flush().await.map_err(|err| BusError::Unreachable {
            address: settings.connection_string.clone(),
            reason: err.to_string(),
        });
        drop(client);
        outcome
    }

    async fn subscribe(
        &self,
        settings: &ConsumerSettings,
        topic: &str,
    ) -> Result<RawSubscription, BusError> {
        let client = Self::client(settings).await?;
        let context = jetstream::new(client);

        let stream = context
            .get_or_create_stream(jetstream::stream::Config {
                name: topic.to_string(),
                subjects: vec![topic.to_string()],
                ..Default::default()
            })
            .await
            .map_err(|err| BusError::Broker(err.to_string()))?;

        let consumer = stream
            .create_consumer(pull::Config {
                durable_name: Some(settings.group_id.clone()),
                deliver_policy: Self::deliver_policy(settings),
                ack_policy: Self::ack_policy(settings),
                ..Default::default()
            })
            .await
            .map_err(|err| BusError::Broker(err.to_string()))?;

        let messages = consumer
            .messages()
            .await
            .map_err(|err| BusError::Broker(err.to_string()))?;

        let frames = messages.map(|item| {
            item.map(|message| message.message.payload)
                .map_err(|err| BusError::Broker(err.to_string()))
        });

        Ok(frames.boxed())
    }

    async fn publish(
        &self,
        settings: &ConsumerSettings,
        topic: &str,
        frame: Bytes,
    ) -> Result<(), BusError> {
        let client = Self::client(settings).await?;
        let context = jetstream::new(client);

        context
            .publish(topic.to_string(), frame)
            .await
            .map_err(|err| BusError::Broker(err.to_string()))?
            .await
            .map_err(|err| BusError::Broker(err.to_string()))?;

        Ok(())
    }
}
