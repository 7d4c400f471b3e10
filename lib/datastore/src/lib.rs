// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! # nlpcore-datastore
//!
//! Relational-store boundary consumed by the quorum when persisting task
//! results. The quorum core never implements storage; it assumes only the
//! [`DataStore`] contract: connect, lazily-mapped queries, atomic
//! multi-statement transactions, disconnect.

pub mod postgres;
pub mod store;

pub use postgres::PostgresDataStore;
pub use store::{DataStore, StoreError, SETTING_CONNECTION_STRING};
