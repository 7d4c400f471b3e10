// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Thin publish path: encode the record frame, hand it to the transport.
//! No batching, no retry; callers that need either wrap this themselves.

use std::sync::Arc;

use super::transport::BusTransport;
use super::{BusError, ConsumerSettings, Record};

pub struct MessageBusProducer {
    transport: Arc<dyn BusTransport>,
    settings: ConsumerSettings,
}

impl MessageBusProducer {
    pub fn new(transport: Arc<dyn BusTransport>, settings: ConsumerSettings) -> Self {
        Self {
            transport,
            settings,
        }
    }

    pub async fn publish(&self, topic: &str, record: &Record) -> Result<(), BusError> {
        let frame = serde_json::to_vec(record)?;
        self.transport
            .publish(&self.settings, topic, frame.into())
            .await
    }
}
