// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! The quorum message envelope.
//!
//! A [`QuorumMessage`] is the unit of inter-group communication: a request to
//! run some NLP-based computation, a response to such a request, or an
//! analytics message. Sender, recipient and task kind are closed sum types,
//! so an envelope with an out-of-set member is unrepresentable; everything
//! else the envelope promises (task id assigned once, creation time captured
//! once, params fixed at build) is enforced by constructing envelopes only
//! through [`MessageBuilder`] and keeping every field private thereafter.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::task_id::{TaskIdAllocator, TaskIdError};

/// The two quorum roles. Wire names are fixed by the bus protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Group {
    /// Client-facing group; creates tasks and waits for their resolution.
    #[serde(rename = "nlpcore_interface")]
    Interface,
    /// Message-bus-only group; performs the NLP computation.
    #[serde(rename = "nlpcore_compute")]
    Compute,
}

impl Group {
    pub const fn wire_name(&self) -> &'static str {
        match self {
            Group::Interface => "nlpcore_interface",
            Group::Compute => "nlpcore_compute",
        }
    }

    /// Bus topic this group consumes from.
    pub const fn topic(&self) -> &'static str {
        self.wire_name()
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for Group {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nlpcore_interface" => Ok(Group::Interface),
            "nlpcore_compute" => Ok(Group::Compute),
            other => Err(BuildError::UnknownGroup(other.to_string())),
        }
    }
}

/// Closed enumeration of the operations a quorum message may request:
/// analytics, the NLP pipeline stages, and the lexical-resource lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    #[serde(rename = "stream_analytics")]
    StreamAnalytics,
    #[serde(rename = "batch_analytics")]
    BatchAnalytics,
    #[serde(rename = "convergence_radius")]
    ConvergenceRadius,
    #[serde(rename = "nlp_tokenize")]
    Tokenize,
    #[serde(rename = "nlp_sentence")]
    SentenceSplit,
    #[serde(rename = "nlp_pos")]
    PartOfSpeech,
    #[serde(rename = "nlp_ner")]
    NamedEntityRecognition,
    #[serde(rename = "nlp_constituency")]
    ConstituencyParse,
    #[serde(rename = "nlp_dependency")]
    DependencyParse,
    #[serde(rename = "nlp_coreference")]
    CoreferenceResolution,
    #[serde(rename = "nlp_natlog_polarity")]
    NaturalLogicPolarity,
    #[serde(rename = "nlp_openinfo_extract")]
    OpenInfoExtraction,
    #[serde(rename = "wordnet")]
    WordNet,
    #[serde(rename = "framenet")]
    FrameNet,
}

impl TaskKind {
    /// Every member of the closed task set, in wire order.
    pub const ALL: [TaskKind; 14] = [
        TaskKind::StreamAnalytics,
        TaskKind::BatchAnalytics,
        TaskKind::ConvergenceRadius,
        TaskKind::Tokenize,
        TaskKind::SentenceSplit,
        TaskKind::PartOfSpeech,
        TaskKind::NamedEntityRecognition,
        TaskKind::ConstituencyParse,
        TaskKind::DependencyParse,
        TaskKind::CoreferenceResolution,
        TaskKind::NaturalLogicPolarity,
        TaskKind::OpenInfoExtraction,
        TaskKind::WordNet,
        TaskKind::FrameNet,
    ];

    pub const fn wire_name(&self) -> &'static str {
        match self {
            TaskKind::StreamAnalytics => "stream_analytics",
            TaskKind::BatchAnalytics => "batch_analytics",
            TaskKind::ConvergenceRadius => "convergence_radius",
            TaskKind::Tokenize => "nlp_tokenize",
            TaskKind::SentenceSplit => "nlp_sentence",
            TaskKind::PartOfSpeech => "nlp_pos",
            TaskKind::NamedEntityRecognition => "nlp_ner",
            TaskKind::ConstituencyParse => "nlp_constituency",
            TaskKind::DependencyParse => "nlp_dependency",
            TaskKind::CoreferenceResolution => "nlp_coreference",
            TaskKind::NaturalLogicPolarity => "nlp_natlog_polarity",
            TaskKind::OpenInfoExtraction => "nlp_openinfo_extract",
            TaskKind::WordNet => "wordnet",
            TaskKind::FrameNet => "framenet",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid sender/recipient for quorum message: roles were never set")]
    MissingRoles,

    #[error("invalid task for quorum message: task kind was never set")]
    MissingTask,

    #[error("unknown quorum group `{0}`")]
    UnknownGroup(String),

    #[error(transparent)]
    TaskId(#[from] TaskIdError),
}

/// Immutable envelope for inter-group messages.
///
/// Field-wise equality (via `PartialEq`) includes the millisecond-precision
/// creation time, which is exactly what travels on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuorumMessage {
    sender: Group,
    recipient: Group,
    task: TaskKind,
    #[serde(rename = "taskId")]
    task_id: String,
    #[serde(rename = "time", with = "chrono::serde::ts_milliseconds")]
    created_at: DateTime<Utc>,
    #[serde(default)]
    params: HashMap<String, String>,
}

impl QuorumMessage {
    /// Start building an envelope. [`MessageBuilder::build`] is the only way
    /// to obtain a `QuorumMessage`.
    pub fn builder() -> MessageBuilder {
        MessageBuilder::default()
    }

    pub fn sender(&self) -> Group {
        self.sender
    }

    pub fn recipient(&self) -> Group {
        self.recipient
    }

    pub fn task(&self) -> TaskKind {
        self.task
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Wall-clock capture time, millisecond precision.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

/// Staged construction of a [`QuorumMessage`]. Setters accumulate; `build`
/// is the single fallible boundary where validation runs, the task id is
/// minted and the creation time is captured.
#[derive(Debug, Default)]
pub struct MessageBuilder {
    sender: Option<Group>,
    recipient: Option<Group>,
    task: Option<TaskKind>,
    params: HashMap<String, String>,
}

impl MessageBuilder {
    /// Preset for a request: Interface → Compute.
    pub fn request(mut self) -> Self {
        self.sender = Some(Group::Interface);
        self.recipient = Some(Group::Compute);
        self
    }

    /// Preset for a response: Compute → Interface.
    pub fn response(mut self) -> Self {
        self.sender = Some(Group::Compute);
        self.recipient = Some(Group::Interface);
        self
    }

    pub fn from_to(mut self, sender: Group, recipient: Group) -> Self {
        self.sender = Some(sender);
        self.recipient = Some(recipient);
        self
    }

    pub fn task(mut self, task: TaskKind) -> Self {
        self.task = Some(task);
        self
    }

    /// Accumulate a task parameter; last write wins per key.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Validate the staged roles and task, mint a task id from `allocator`,
    /// capture the creation time and produce the envelope. Allocator failure
    /// is the build's failure; no partial envelope escapes.
    pub fn build(self, allocator: &dyn TaskIdAllocator) -> Result<QuorumMessage, BuildError> {
        let (sender, recipient) = match (self.sender, self.recipient) {
            (Some(sender), Some(recipient)) => (sender, recipient),
            _ => return Err(BuildError::MissingRoles),
        };
        let task = self.task.ok_or(BuildError::MissingTask)?;

        let task_id = allocator.generate_id()?;

        // Truncate to the wire's millisecond precision so an encoded copy
        // compares equal to the original.
        let now = Utc::now();
        let created_at = now
            .with_nanosecond(now.timestamp_subsec_millis() * 1_000_000)
            .unwrap_or(now);

        Ok(QuorumMessage {
            sender,
            recipient,
            task,
            task_id,
            created_at,
            params: self.params,
        })
    }
}
