// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Two quorum instances on one in-memory bus: the Interface issues a
//! tokenize request, the Compute instance answers it.
//!
//! Run with: cargo run --example quorum_node

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use nlpcore_quorum::bus::{StubBus, SETTING_CONNECTION_STRING, SETTING_GROUP_ID};
use nlpcore_quorum::{InstanceCoordinator, QuorumMessage, TaskKind};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    nlpcore_quorum::logging::init();

    let settings = HashMap::from([
        (
            SETTING_CONNECTION_STRING.to_string(),
            "stub://local".to_string(),
        ),
        (SETTING_GROUP_ID.to_string(), "nlpcore-demo".to_string()),
    ]);

    let bus = StubBus::default();

    let mut compute = InstanceCoordinator::new(Arc::new(bus.clone()), settings.clone());
    compute.bootstrap_as_compute().await?;
    let mut compute_inbox = compute.take_inbox().expect("fresh compute inbox");

    let mut interface = InstanceCoordinator::new(Arc::new(bus), settings);
    interface.bootstrap_as_interface().await?;
    let mut interface_inbox = interface.take_inbox().expect("fresh interface inbox");

    // Let both workers open their subscriptions.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let request = QuorumMessage::builder()
        .request()
        .task(TaskKind::Tokenize)
        .param("text", "colorless green ideas sleep furiously")
        .build(interface.allocator().as_ref())?;
    tracing::info!(task_id = request.task_id(), "interface sending request");
    interface.send(&request).await?;

    let incoming = compute_inbox.recv().await.expect("request on compute inbox");
    tracing::info!(
        task = %incoming.task(),
        text = incoming.param("text").unwrap_or_default(),
        "compute received request"
    );

    let response = QuorumMessage::builder()
        .response()
        .task(incoming.task())
        .param("tokens", "colorless|green|ideas|sleep|furiously")
        .build(compute.allocator().as_ref())?;
    compute.send(&response).await?;

    let resolved = interface_inbox
        .recv()
        .await
        .expect("response on interface inbox");
    tracing::info!(
        tokens = resolved.param("tokens").unwrap_or_default(),
        "interface received response"
    );

    interface.cleanup().await?;
    compute.cleanup().await?;
    Ok(())
}
