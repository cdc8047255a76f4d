// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Short-circuiting pipeline of reconcile steps.
//!
//! A [`ReconcileChain`] runs its [`ReconcileAction`]s in order over one item, handing
//! every step the result accumulated so far. A step stops the pipeline either by
//! returning an error (a failure) or by returning [`ActionOutcome::Stop`] (not a failure).
//!
//! Steps tag their errors with [`ServiceError::recoverable`] when the whole chain may be
//! retried on the next tick; untagged errors are terminal.

use crate::errors::{Result, ServiceError};
use async_trait::async_trait;
use tracing::debug;

/// What the pipeline does after a successful step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Continue,
    Stop,
}

/// One step of a [`ReconcileChain`] over items of type `T` accumulating an `R`.
#[async_trait]
pub trait ReconcileAction<T: Sync, R: Send>: Send + Sync {
    fn name(&self) -> &'static str;

    async fn apply(&self, item: &T, result: &mut R) -> Result<ActionOutcome>;
}

/// Result of a chain run.
#[derive(Debug)]
pub struct ChainOutcome<R> {
    /// Result accumulated up to the last step that ran
    pub result: R,
    /// Error of the step that failed, if any
    pub error: Option<ServiceError>,
    /// Step that stopped the pipeline, `None` when every step ran
    pub stopped_at: Option<&'static str>,
}

impl<R> ChainOutcome<R> {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// True when a step failed with an error tagged recoverable.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        self.error.as_ref().is_some_and(ServiceError::is_recoverable)
    }
}

/// Ordered list of steps run against one item.
pub struct ReconcileChain<T, R> {
    actions: Vec<Box<dyn ReconcileAction<T, R>>>,
}

impl<T: Sync, R: Send> Default for ReconcileChain<T, R> {
    fn default() -> Self {
        Self {
            actions: Vec::new(),
        }
    }
}

impl<T: Sync, R: Send> ReconcileChain<T, R> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_action(mut self, action: impl ReconcileAction<T, R> + 'static) -> Self {
        self.actions.push(Box::new(action));
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Run every step over `item`, starting from `initial`.
    pub async fn run(&self, item: &T, initial: R) -> ChainOutcome<R> {
        let mut result = initial;
        for action in &self.actions {
            match action.apply(item, &mut result).await {
                Ok(ActionOutcome::Continue) => {}
                Ok(ActionOutcome::Stop) => {
                    debug!(step = action.name(), "reconcile chain stopped");
                    return ChainOutcome {
                        result,
                        error: None,
                        stopped_at: Some(action.name()),
                    };
                }
                Err(error) => {
                    debug!(step = action.name(), error = %error, "reconcile chain step failed");
                    return ChainOutcome {
                        result,
                        error: Some(error),
                        stopped_at: Some(action.name()),
                    };
                }
            }
        }
        ChainOutcome {
            result,
            error: None,
            stopped_at: None,
        }
    }
}
