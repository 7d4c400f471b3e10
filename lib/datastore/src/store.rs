// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! The datastore contract.
//!
//! Implementations abstract over a concrete relational-store technology.
//! Queries return mapped rows; the multi-statement form runs as one atomic
//! unit — every statement commits or none does, and the store is back in
//! its default autocommit mode afterwards regardless of outcome.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

/// Required settings key: store address.
pub const SETTING_CONNECTION_STRING: &str = "connection_string";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("missing required datastore setting `{0}`")]
    MissingSetting(&'static str),

    #[error("datastore connection already initialized")]
    AlreadyConnected,

    #[error("datastore connection not initiated")]
    NotConnected,

    #[error("datastore error: {0}")]
    Backend(#[from] tokio_postgres::Error),
}

/// Contract for implementations that abstract over some datastore
/// technology.
#[async_trait]
pub trait DataStore: Send {
    type Row: Send;

    /// Connect using a key/value settings bundle; `connection_string` is
    /// required. Fails with a state error if already connected.
    async fn connect(&mut self, settings: &HashMap<String, String>) -> Result<(), StoreError>;

    /// Run one statement and lazily map each raw row through `mapper`.
    async fn query<T, F>(
        &mut self,
        statement: &str,
        mapper: F,
    ) -> Result<BoxStream<'static, Result<T, StoreError>>, StoreError>
    where
        T: Send + 'static,
        F: FnMut(Self::Row) -> T + Send + 'static;

    /// Run `statements` in order as one atomic unit and return the
    /// concatenation of their mapped rows. `mapper` receives the statement
    /// index alongside each raw row. All statements commit or none does;
    /// the store's default autocommit mode is restored either way.
    async fn query_transaction<T, F>(
        &mut self,
        statements: &[&str],
        mapper: F,
    ) -> Result<Vec<T>, StoreError>
    where
        T: Send + 'static,
        F: FnMut(usize, Self::Row) -> T + Send + 'static;

    /// Disconnect from the store. Fails if `connect` never succeeded.
    async fn disconnect(&mut self) -> Result<(), StoreError>;
}
