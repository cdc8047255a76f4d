// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Persistence seam of the fleet manager.
//!
//! Services never touch storage directly; they go through a [`Store`] of
//! [`DinosaurRequest`]s or [`Cluster`]s. A store offers row-level atomic
//! conditional updates, which are the only ordering guard between reconcilers
//! and the data-plane protocol acting on the same record.
//!
//! Soft-deleted rows are invisible to every read.

pub mod memory;

use crate::errors::Result;
use crate::models::{Cluster, DinosaurRequest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Row filter evaluated under the store lock.
pub type Predicate<'a, T> = &'a (dyn Fn(&T) -> bool + Send + Sync);

/// In-place row change applied under the store lock.
pub type Mutation<'a, T> = &'a (dyn Fn(&mut T) + Send + Sync);

/// A persisted row.
pub trait Record: Clone + Send + Sync + 'static {
    fn id(&self) -> &str;

    fn is_deleted(&self) -> bool;

    fn mark_deleted(&mut self, at: DateTime<Utc>);

    fn touch(&mut self, at: DateTime<Utc>);
}

impl Record for DinosaurRequest {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    fn mark_deleted(&mut self, at: DateTime<Utc>) {
        self.deleted_at = Some(at);
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
}

impl Record for Cluster {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    fn mark_deleted(&mut self, at: DateTime<Utc>) {
        self.deleted_at = Some(at);
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
}

/// Storage of one kind of record.
#[async_trait]
pub trait Store<T: Record>: Send + Sync {
    /// Insert a new row.
    ///
    /// # Errors
    ///
    /// Returns a conflict error if a live row with the same id exists.
    async fn insert(&self, record: &T) -> Result<()>;

    /// Fetch a live row by id.
    async fn get(&self, id: &str) -> Result<Option<T>>;

    /// List live rows in insertion order.
    async fn list(&self) -> Result<Vec<T>>;

    /// Atomically apply `mutate` to the row `id` if it matches `when`.
    ///
    /// Returns whether a row was changed.
    async fn update_where(
        &self,
        id: &str,
        when: Predicate<'_, T>,
        mutate: Mutation<'_, T>,
    ) -> Result<bool>;

    /// Atomically apply `mutate` to every live row matching `when`.
    ///
    /// Returns the number of rows changed.
    async fn update_many(&self, when: Predicate<'_, T>, mutate: Mutation<'_, T>) -> Result<usize>;

    /// Soft delete the row `id`. Deleting a missing row is a no-op.
    async fn soft_delete(&self, id: &str) -> Result<()>;
}

/// Storage of instance requests.
pub type DinosaurStore = dyn Store<DinosaurRequest>;

/// Storage of data-plane clusters.
pub type ClusterStore = dyn Store<Cluster>;
