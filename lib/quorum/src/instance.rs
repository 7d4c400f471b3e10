// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Instance bootstrap: pick a quorum role, wire a bus consumer, codec and
//! task-id allocator together, and own shutdown.
//!
//! An Interface instance creates tasks and waits for their resolution; a
//! Compute instance is reachable only over the bus, performs the NLP work
//! and sends results back. Either way the coordinator subscribes to its
//! role's topic, decodes incoming record values into [`QuorumMessage`]s and
//! hands them to the owning process through an inbox channel; what the
//! process does with them is business logic outside this crate.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::sync::mpsc;
use tracing::warn;

use crate::bus::{BusTransport, MessageBusConsumer, MessageBusProducer, Record, WorkerId};
use crate::codec::{JsonMessageCodec, MessageCodec};
use crate::message::{Group, QuorumMessage};
use crate::task_id::UuidTaskIdAllocator;

/// Role a process joins the quorum as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceRole {
    Interface,
    Compute,
}

impl InstanceRole {
    pub const fn group(&self) -> Group {
        match self {
            InstanceRole::Interface => Group::Interface,
            InstanceRole::Compute => Group::Compute,
        }
    }
}

pub struct InstanceCoordinator {
    transport: Arc<dyn BusTransport>,
    settings: HashMap<String, String>,
    codec: JsonMessageCodec,
    allocator: Arc<UuidTaskIdAllocator>,
    consumer: Option<MessageBusConsumer>,
    producer: Option<MessageBusProducer>,
    role: Option<InstanceRole>,
    inbox: Option<mpsc::UnboundedReceiver<QuorumMessage>>,
}

impl InstanceCoordinator {
    pub fn new(transport: Arc<dyn BusTransport>, settings: HashMap<String, String>) -> Self {
        Self {
            transport,
            settings,
            codec: JsonMessageCodec::new(),
            allocator: Arc::new(UuidTaskIdAllocator::new()),
            consumer: None,
            producer: None,
            role: None,
            inbox: None,
        }
    }

    pub async fn bootstrap_as_interface(&mut self) -> Result<WorkerId> {
        self.bootstrap(InstanceRole::Interface).await
    }

    pub async fn bootstrap_as_compute(&mut self) -> Result<WorkerId> {
        self.bootstrap(InstanceRole::Compute).await
    }

    async fn bootstrap(&mut self, role: InstanceRole) -> Result<WorkerId> {
        if let Some(current) = self.role {
            bail!("instance already bootstrapped as {:?}", current);
        }

        let mut consumer = MessageBusConsumer::new(self.transport.clone());
        consumer
            .connect(&self.settings)
            .await
            .context("failed to connect quorum bus consumer")?;

        let (tx, rx) = mpsc::unbounded_channel();
        let codec = self.codec;
        consumer.add_listener(move |delivery| match delivery {
            Ok(record) => match codec.decode(&record.value) {
                Ok(message) => {
                    let _ = tx.send(message);
                }
                Err(err) => {
                    warn!(key = %record.key, error = %err, "dropping undecodable quorum record");
                }
            },
            Err(err) => {
                warn!(error = %err, "bus delivery failed");
            }
        });

        let worker = consumer
            .listen(role.group().topic())
            .context("failed to subscribe quorum bus consumer")?;

        let producer_settings = crate::bus::ConsumerSettings::from_map(&self.settings)
            .context("failed to validate producer settings")?;

        self.producer = Some(MessageBusProducer::new(
            self.transport.clone(),
            producer_settings,
        ));
        self.consumer = Some(consumer);
        self.role = Some(role);
        self.inbox = Some(rx);
        Ok(worker)
    }

    /// Decoded messages addressed to this instance's group. Available once
    /// after bootstrap.
    pub fn take_inbox(&mut self) -> Option<mpsc::UnboundedReceiver<QuorumMessage>> {
        self.inbox.take()
    }

    /// Encode `message` and publish it to its recipient group's topic,
    /// keyed by task id.
    pub async fn send(&self, message: &QuorumMessage) -> Result<()> {
        let producer = match &self.producer {
            Some(producer) => producer,
            None => bail!("instance not bootstrapped"),
        };

        let wire = self
            .codec
            .encode(message)
            .context("failed to encode quorum message")?;
        let record = Record::new(message.task_id(), wire);

        producer
            .publish(message.recipient().topic(), &record)
            .await
            .context("failed to publish quorum message")?;
        Ok(())
    }

    pub fn role(&self) -> Option<InstanceRole> {
        self.role
    }

    /// Task-id allocator shared with message builders on this instance.
    pub fn allocator(&self) -> Arc<UuidTaskIdAllocator> {
        self.allocator.clone()
    }

    /// Tear the bus consumer down and report the stopped worker.
    pub async fn cleanup(&mut self) -> Result<WorkerId> {
        let consumer = match self.consumer.as_mut() {
            Some(consumer) => consumer,
            None => bail!("instance not bootstrapped"),
        };

        let worker = consumer.teardown()?;
        consumer.join_worker().await?;
        Ok(worker)
    }
}
