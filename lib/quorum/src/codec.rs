// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Wire (de)serialization for [`QuorumMessage`].
//!
//! The wire shape is a JSON object `{sender, recipient, task, taskId, time,
//! params}` where `time` is integer milliseconds since the epoch. The
//! timestamp is numeric on the wire on purpose: default date-string formats
//! are not guaranteed to round-trip across processes, integer milliseconds
//! are.

use thiserror::Error;

use crate::message::QuorumMessage;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode quorum message: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode quorum message: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Serialize / deserialize quorum messages on and off the bus transport.
pub trait MessageCodec: Send + Sync {
    fn encode(&self, message: &QuorumMessage) -> Result<String, CodecError>;

    fn decode(&self, wire: &str) -> Result<QuorumMessage, CodecError>;
}

/// JSON implementation of [`MessageCodec`].
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonMessageCodec;

impl JsonMessageCodec {
    pub fn new() -> Self {
        Self
    }
}

impl MessageCodec for JsonMessageCodec {
    fn encode(&self, message: &QuorumMessage) -> Result<String, CodecError> {
        serde_json::to_string(message).map_err(CodecError::Encode)
    }

    fn decode(&self, wire: &str) -> Result<QuorumMessage, CodecError> {
        serde_json::from_str(wire).map_err(CodecError::Decode)
    }
}
