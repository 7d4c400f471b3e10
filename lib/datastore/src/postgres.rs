// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Postgres implementation of [`DataStore`] over tokio-postgres.
//!
//! The atomic multi-statement form maps onto a real transaction: commit is
//! explicit, an early error drops the transaction (rolling it back), and
//! the session is back in autocommit mode either way.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use tokio::task::JoinHandle;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls, Row};
use tracing::error;

use crate::store::{DataStore, StoreError, SETTING_CONNECTION_STRING};

fn no_params() -> std::iter::Empty<&'static (dyn ToSql + Sync)> {
    std::iter::empty()
}

#[derive(Default)]
pub struct PostgresDataStore {
    client: Option<Client>,
    driver: Option<JoinHandle<()>>,
}

impl PostgresDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn client(&self) -> Result<&Client, StoreError> {
        self.client.as_ref().ok_or(StoreError::NotConnected)
    }

    fn client_mut(&mut self) -> Result<&mut Client, StoreError> {
        self.client.as_mut().ok_or(StoreError::NotConnected)
    }
}

#[async_trait]
impl DataStore for PostgresDataStore {
    type Row = Row;

    async fn connect(&mut self, settings: &HashMap<String, String>) -> Result<(), StoreError> {
        let connection_string = settings
            .get(SETTING_CONNECTION_STRING)
            .ok_or(StoreError::MissingSetting(SETTING_CONNECTION_STRING))?;

        if self.client.is_some() {
            return Err(StoreError::AlreadyConnected);
        }

        let (client, connection) = tokio_postgres::connect(connection_string, NoTls).await?;

        // The connection object drives the wire protocol; it runs until the
        // client is dropped.
        self.driver = Some(tokio::spawn(async move {
            if let Err(err) = connection.await {
                error!(error = %err, "datastore connection terminated");
            }
        }));
        self.client = Some(client);
        Ok(())
    }

    async fn query<T, F>(
        &mut self,
        statement: &str,
        mut mapper: F,
    ) -> Result<BoxStream<'static, Result<T, StoreError>>, StoreError>
    where
        T: Send + 'static,
        F: FnMut(Row) -> T + Send + 'static,
    {
        let rows = self.client()?.query_raw(statement, no_params()).await?;

        let mapped = rows.map(move |row| row.map(&mut mapper).map_err(StoreError::from));
        Ok(mapped.boxed())
    }

    async fn query_transaction<T, F>(
        &mut self,
        statements: &[&str],
        mut mapper: F,
    ) -> Result<Vec<T>, StoreError>
    where
        T: Send + 'static,
        F: FnMut(usize, Row) -> T + Send + 'static,
    {
        let transaction = self.client_mut()?.transaction().await?;

        let mut results = Vec::new();
        for (index, statement) in statements.iter().enumerate() {
            let rows = transaction.query_raw(*statement, no_params()).await?;
            futures::pin_mut!(rows);
            while let Some(row) = rows.try_next().await? {
                results.push(mapper(index, row));
            }
        }

        transaction.commit().await?;
        Ok(results)
    }

    async fn disconnect(&mut self) -> Result<(), StoreError> {
        let client = self.client.take().ok_or(StoreError::NotConnected)?;
        drop(client);

        if let Some(driver) = self.driver.take() {
            let _ = driver.await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_requires_connection_string() {
        let mut store = PostgresDataStore::new();
        let err = store.connect(&HashMap::new()).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::MissingSetting(SETTING_CONNECTION_STRING)
        ));
    }

    #[tokio::test]
    async fn disconnect_before_connect_fails() {
        let mut store = PostgresDataStore::new();
        assert!(matches!(
            store.disconnect().await.unwrap_err(),
            StoreError::NotConnected
        ));
    }

    #[tokio::test]
    async fn query_before_connect_fails() {
        let mut store = PostgresDataStore::new();
        let err = store
            .query("SELECT 1", |row| row)
            .await
            .err()
            .expect("query without a connection must fail");
        assert!(matches!(err, StoreError::NotConnected));
    }

    #[tokio::test]
    async fn transaction_before_connect_fails() {
        let mut store = PostgresDataStore::new();
        let err = store
            .query_transaction(&["SELECT 1"], |_, row| row)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotConnected));
    }
}
