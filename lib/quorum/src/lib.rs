// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! # nlpcore-quorum
//!
//! Coordination layer for a distributed NLP-processing quorum split into two
//! roles: an **Interface group** that faces clients and issues tasks, and a
//! **Compute group** that executes NLP work and returns results. The two
//! groups communicate exclusively through an asynchronous message bus.
//!
//! This crate provides the quorum messaging subsystem:
//!
//! - [`QuorumMessage`] and its builder: the validated envelope exchanged
//!   between the groups.
//! - [`TaskIdAllocator`]: the contract that makes every envelope uniquely
//!   addressable per originating client.
//! - [`MessageCodec`] / [`JsonMessageCodec`]: wire (de)serialization with a
//!   numeric-stable millisecond timestamp.
//! - [`MessageBusConsumer`]: a single-topic broker subscription that fans
//!   records out to registered listeners from a cancellable background
//!   worker.
//! - [`InstanceCoordinator`]: process bootstrap that picks a role, wires the
//!   pieces together, and owns shutdown.

pub mod bus;
pub mod codec;
pub mod instance;
pub mod logging;
pub mod message;
pub mod task_id;

pub use bus::{
    BusError, ConsumerSettings, Delivery, ListenerId, MessageBusConsumer, MessageBusProducer,
    Record, WorkerId,
};
pub use codec::{CodecError, JsonMessageCodec, MessageCodec};
pub use instance::{InstanceCoordinator, InstanceRole};
pub use message::{BuildError, Group, MessageBuilder, QuorumMessage, TaskKind};
pub use task_id::{TaskIdAllocator, TaskIdError, UuidTaskIdAllocator};

pub use tokio_util::sync::CancellationToken;
