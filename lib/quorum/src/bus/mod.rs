// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Message-bus consumption and publication.
//!
//! A [`MessageBusConsumer`] maintains a live subscription to exactly one
//! topic and delivers every received record to every currently-registered
//! listener, decoupled from how listeners process the payload. Records
//! travel as JSON `{key, value}` frames; a delivery handed to a listener is
//! a tagged result: either a decoded [`Record`] or a wrapped [`BusError`],
//! so consumer-side failures are observable rather than silently dropped.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod consumer;
#[cfg(feature = "nats")]
mod nats;
mod producer;
mod stub;
mod transport;

pub use consumer::MessageBusConsumer;
#[cfg(feature = "nats")]
pub use nats::NatsBus;
pub use producer::MessageBusProducer;
pub use stub::StubBus;
pub use transport::{BusTransport, RawSubscription};

/// Required settings key: broker address.
pub const SETTING_CONNECTION_STRING: &str = "connection_string";
/// Required settings key: consumer group identifier.
pub const SETTING_GROUP_ID: &str = "group_id";

#[derive(Debug, Error)]
pub enum BusError {
    #[error("missing required consumer setting `{0}`")]
    MissingSetting(&'static str),

    #[error("broker unreachable at `{address}`: {reason}")]
    Unreachable { address: String, reason: String },

    #[error("consumer is already connected")]
    AlreadyConnected,

    #[error("consumer is not connected")]
    NotConnected,

    #[error("cannot listen/switch to another topic: `{0}` already assigned")]
    TopicAssigned(String),

    #[error("consumer worker was never started")]
    NeverStarted,

    #[error("broker error: {0}")]
    Broker(String),

    #[error("malformed record frame: {0}")]
    MalformedRecord(#[from] serde_json::Error),
}

/// One key/value record as it travels on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub key: String,
    pub value: String,
}

impl Record {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// One unit handed from the consumer's worker to a listener.
pub type Delivery = Result<Record, BusError>;

/// Callback registered on a consumer. Runs on the worker task; must not
/// block on I/O.
pub type Listener = Box<dyn Fn(&Delivery) + Send + Sync>;

/// Handle returned by `add_listener`, used to remove the listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Identifier for a consumer's background worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(u64);

impl WorkerId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Offset position a fresh consumer group starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetReset {
    Earliest,
    Latest,
}

/// Broker-protocol defaults injected into every consumer. Callers supply
/// only `connection_string` and `group_id`; these are fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolDefaults {
    /// Fresh groups consume from the earliest retained record.
    pub offset_reset: OffsetReset,
    /// Broker-side acknowledgement is automatic; listeners never commit.
    pub auto_commit: bool,
}

impl Default for ProtocolDefaults {
    fn default() -> Self {
        Self {
            offset_reset: OffsetReset::Earliest,
            auto_commit: true,
        }
    }
}

/// Validated, fully-merged consumer settings: the two required keys plus the
/// injected protocol defaults. Merging happens here, before any broker
/// contact, so the reachability probe always sees the final settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerSettings {
    pub connection_string: String,
    pub group_id: String,
    pub defaults: ProtocolDefaults,
}

impl ConsumerSettings {
    /// Validate a key/value settings bundle. Fails with a configuration
    /// error naming the first missing required key.
    pub fn from_map(settings: &HashMap<String, String>) -> Result<Self, BusError> {
        let connection_string = settings
            .get(SETTING_CONNECTION_STRING)
            .ok_or(BusError::MissingSetting(SETTING_CONNECTION_STRING))?
            .clone();
        let group_id = settings
            .get(SETTING_GROUP_ID)
            .ok_or(BusError::MissingSetting(SETTING_GROUP_ID))?
            .clone();

        Ok(Self {
            connection_string,
            group_id,
            defaults: ProtocolDefaults::default(),
        })
    }

    /// Read settings from `NLPCORE_CONNECTION_STRING` / `NLPCORE_GROUP_ID`.
    pub fn from_env() -> Result<Self, BusError> {
        let mut map = HashMap::new();
        if let Ok(v) = std::env::var("NLPCORE_CONNECTION_STRING") {
            map.insert(SETTING_CONNECTION_STRING.to_string(), v);
        }
        if let Ok(v) = std::env::var("NLPCORE_GROUP_ID") {
            map.insert(SETTING_GROUP_ID.to_string(), v);
        }
        Self::from_map(&map)
    }
}

/// Listener registry shared between the caller and the worker task.
///
/// One mutex guards both mutation and the iterate-and-dispatch step, so no
/// listener is added or removed mid-broadcast and every listener present
/// when a broadcast begins observes the whole broadcast.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    entries: Mutex<Vec<(ListenerId, Listener)>>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    pub(crate) fn add(&self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.lock().push((id, listener));
        id
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Deliver one record-or-error to every registered listener,
    /// synchronously and in registration order.
    pub(crate) fn dispatch(&self, delivery: &Delivery) {
        let entries = self.entries.lock();
        for (_, listener) in entries.iter() {
            listener(delivery);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn settings_map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn settings_require_connection_string() {
        let err = ConsumerSettings::from_map(&settings_map(&[("group_id", "g1")])).unwrap_err();
        assert!(matches!(
            err,
            BusError::MissingSetting(SETTING_CONNECTION_STRING)
        ));
    }

    #[test]
    fn settings_require_group_id() {
        let err =
            ConsumerSettings::from_map(&settings_map(&[("connection_string", "nats://b:4222")]))
                .unwrap_err();
        assert!(matches!(err, BusError::MissingSetting(SETTING_GROUP_ID)));
    }

    #[test]
    fn settings_merge_protocol_defaults() {
        let settings = ConsumerSettings::from_map(&settings_map(&[
            ("connection_string", "nats://broker:4222"),
            ("group_id", "nlpcore"),
        ]))
        .unwrap();

        assert_eq!(settings.connection_string, "nats://broker:4222");
        assert_eq!(settings.group_id, "nlpcore");
        assert_eq!(settings.defaults.offset_reset, OffsetReset::Earliest);
        assert!(settings.defaults.auto_commit);
    }

    #[test]
    fn record_frame_round_trips() {
        let record = Record::new("testKey", "testValue");
        let frame = serde_json::to_vec(&record).unwrap();
        let back: Record = serde_json::from_slice(&frame).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn registry_dispatches_in_registration_order() {
        let registry = ListenerRegistry::default();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = order.clone();
            registry.add(Box::new(move |_| order.lock().push(tag)));
        }

        registry.dispatch(&Ok(Record::new("k", "v")));
        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn removed_listener_is_not_invoked() {
        let registry = ListenerRegistry::default();
        let hits = Arc::new(AtomicUsize::new(0));

        let hits_clone = hits.clone();
        let id = registry.add(Box::new(move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(registry.remove(id));
        assert!(!registry.remove(id));

        registry.dispatch(&Ok(Record::new("k", "v")));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
