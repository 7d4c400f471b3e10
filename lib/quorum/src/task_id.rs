// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Task identifier allocation.
//!
//! Every [`QuorumMessage`](crate::QuorumMessage) carries a task id that,
//! combined with its task kind, uniquely identifies an atomic NLP task for a
//! single client. The allocation strategy (random, sequence, distributed
//! counter) is an implementation choice behind the [`TaskIdAllocator`]
//! contract; the only invariant asserted across implementations is that ids
//! returned while not destroyed are unique within the issuing scope.

use std::collections::HashSet;

use parking_lot::Mutex;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum TaskIdError {
    #[error("task id `{0}` is not live in this allocator")]
    UnknownId(String),

    #[error("task id allocation failed: {0}")]
    AllocationFailed(String),
}

/// Contract for generating uniquely identifiable task ids and destroying
/// them so they can be reissued.
pub trait TaskIdAllocator: Send + Sync {
    /// Mint a task id that is unique among the ids this allocator has
    /// issued and not yet destroyed.
    fn generate_id(&self) -> Result<String, TaskIdError>;

    /// Destroy a live task id, freeing it for reuse by the issuing scope.
    fn destroy_id(&self, task_id: &str) -> Result<(), TaskIdError>;
}

/// UUID-v4 backed allocator. Tracks the set of live ids so that uniqueness
/// holds even across the (vanishingly unlikely) collision, and so that
/// destroying an id the allocator never issued is an observable error.
#[derive(Debug, Default)]
pub struct UuidTaskIdAllocator {
    live: Mutex<HashSet<String>>,
}

impl UuidTaskIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of ids currently live.
    pub fn live_count(&self) -> usize {
        self.live.lock().len()
    }
}

impl TaskIdAllocator for UuidTaskIdAllocator {
    fn generate_id(&self) -> Result<String, TaskIdError> {
        let mut live = self.live.lock();
        loop {
            let id = Uuid::new_v4().simple().to_string();
            if live.insert(id.clone()) {
                return Ok(id);
            }
        }
    }

    fn destroy_id(&self, task_id: &str) -> Result<(), TaskIdError> {
        if self.live.lock().remove(task_id) {
            Ok(())
        } else {
            Err(TaskIdError::UnknownId(task_id.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique_while_live() {
        let allocator = UuidTaskIdAllocator::new();
        let a = allocator.generate_id().unwrap();
        let b = allocator.generate_id().unwrap();

        assert_ne!(a, b);
        assert_eq!(allocator.live_count(), 2);
    }

    #[test]
    fn destroy_frees_an_id() {
        let allocator = UuidTaskIdAllocator::new();
        let id = allocator.generate_id().unwrap();

        allocator.destroy_id(&id).unwrap();
        assert_eq!(allocator.live_count(), 0);
    }

    #[test]
    fn destroying_an_unknown_id_fails() {
        let allocator = UuidTaskIdAllocator::new();
        let err = allocator.destroy_id("not-issued").unwrap_err();

        assert!(matches!(err, TaskIdError::UnknownId(_)));
    }

    #[test]
    fn double_destroy_fails() {
        let allocator = UuidTaskIdAllocator::new();
        let id = allocator.generate_id().unwrap();

        allocator.destroy_id(&id).unwrap();
        assert!(allocator.destroy_id(&id).is_err());
    }
}
