// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Transport seam between the consumer state machine and a concrete broker.
//!
//! The consumer owns the protocol invariants (single topic, listener
//! broadcast, cooperative shutdown); a [`BusTransport`] owns the wire. The
//! NATS implementation talks to a real broker, the stub implementation backs
//! the test suite with in-memory channels.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use super::{BusError, ConsumerSettings};

/// Stream of raw record frames from one subscription. Mid-stream broker
/// errors surface as items so the consumer can report them as failed
/// deliveries instead of tearing down the worker. Dropping the stream
/// releases the broker-side subscription.
pub type RawSubscription = BoxStream<'static, Result<Bytes, BusError>>;

#[async_trait]
pub trait BusTransport: Send + Sync {
    /// Eager reachability check against the broker named by `settings`. Any
    /// resource acquired for the probe is released before returning,
    /// regardless of outcome.
    async fn probe(&self, settings: &ConsumerSettings) -> Result<(), BusError>;

    /// Open a group subscription to `topic` and return its frame stream.
    async fn subscribe(
        &self,
        settings: &ConsumerSettings,
        topic: &str,
    ) -> Result<RawSubscription, BusError>;

    /// Publish one raw frame to `topic`.
    async fn publish(
        &self,
        settings: &ConsumerSettings,
        topic: &str,
        frame: Bytes,
    ) -> Result<(), BusError>;
}
