// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory store implementation.
//!
//! Rows are kept in insertion order behind a `RwLock`. Every conditional update runs
//! under the write lock, which gives the same row-level atomicity a database update
//! statement would.
//!
//! ## Limitations
//!
//! - No persistence: state is lost on restart
//! - Single-process only

use super::{Mutation, Predicate, Record, Store};
use crate::errors::{Result, ServiceError};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

/// Converts a lock poison error to a service error.
fn poison_err<T>(_: PoisonError<T>) -> ServiceError {
    ServiceError::general("store lock poisoned")
}

/// Thread-safe in-memory [`Store`].
#[derive(Debug)]
pub struct InMemoryStore<T> {
    rows: RwLock<Vec<T>>,
    writes: AtomicUsize,
}

impl<T> Default for InMemoryStore<T> {
    fn default() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
            writes: AtomicUsize::new(0),
        }
    }
}

impl<T: Record> InMemoryStore<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `rows`. Seeding does not count as writes.
    #[must_use]
    pub fn with_rows(rows: impl IntoIterator<Item = T>) -> Self {
        Self {
            rows: RwLock::new(rows.into_iter().collect()),
            writes: AtomicUsize::new(0),
        }
    }

    /// Number of write operations that changed at least one row.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Fetch a row including soft-deleted ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn get_unscoped(&self, id: &str) -> Result<Option<T>> {
        let rows = self.rows.read().map_err(poison_err)?;
        Ok(rows.iter().find(|r| r.id() == id).cloned())
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl<T: Record> Store<T> for InMemoryStore<T> {
    async fn insert(&self, record: &T) -> Result<()> {
        let mut rows = self.rows.write().map_err(poison_err)?;
        if rows.iter().any(|r| r.id() == record.id() && !r.is_deleted()) {
            return Err(ServiceError::conflict(format!(
                "record with id '{}' already exists",
                record.id()
            )));
        }
        rows.push(record.clone());
        self.record_write();
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<T>> {
        let rows = self.rows.read().map_err(poison_err)?;
        Ok(rows
            .iter()
            .find(|r| r.id() == id && !r.is_deleted())
            .cloned())
    }

    async fn list(&self) -> Result<Vec<T>> {
        let rows = self.rows.read().map_err(poison_err)?;
        Ok(rows.iter().filter(|r| !r.is_deleted()).cloned().collect())
    }

    async fn update_where(
        &self,
        id: &str,
        when: Predicate<'_, T>,
        mutate: Mutation<'_, T>,
    ) -> Result<bool> {
        let mut rows = self.rows.write().map_err(poison_err)?;
        let Some(row) = rows
            .iter_mut()
            .find(|r| r.id() == id && !r.is_deleted() && when(r))
        else {
            return Ok(false);
        };
        mutate(row);
        row.touch(Utc::now());
        self.record_write();
        Ok(true)
    }

    async fn update_many(&self, when: Predicate<'_, T>, mutate: Mutation<'_, T>) -> Result<usize> {
        let mut rows = self.rows.write().map_err(poison_err)?;
        let now = Utc::now();
        let mut affected = 0;
        for row in rows.iter_mut().filter(|r| !r.is_deleted() && when(r)) {
            mutate(row);
            row.touch(now);
            affected += 1;
        }
        if affected > 0 {
            self.record_write();
        }
        Ok(affected)
    }

    async fn soft_delete(&self, id: &str) -> Result<()> {
        let mut rows = self.rows.write().map_err(poison_err)?;
        if let Some(row) = rows.iter_mut().find(|r| r.id() == id && !r.is_deleted()) {
            row.mark_deleted(Utc::now());
            self.record_write();
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod memory_tests;
