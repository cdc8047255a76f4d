// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Worker runtime.
//!
//! Every registered [`Reconcile`] implementation runs in its own task: it ticks on a
//! fixed interval and can be woken early through the shared [`SignalBus`]. Workers
//! never coordinate with each other; a tick runs to completion before the worker
//! sleeps again.
//!
//! ```rust,no_run
//! # use fleet_manager::reconcilers::Reconcile;
//! # use fleet_manager::workers::Scheduler;
//! # use std::sync::Arc;
//! # use std::time::Duration;
//! # async fn example(worker: Arc<dyn Reconcile>) {
//! let scheduler = Scheduler::new(Duration::from_secs(30)).with_worker(worker);
//! let bus = scheduler.signal_bus();
//! let handle = scheduler.start();
//!
//! bus.signal("accepted_dinosaur");
//! handle.shutdown().await;
//! # }
//! ```

use crate::constants::SIGNAL_BUS_CAPACITY;
use crate::metrics::{record_reconciliation_error, record_reconciliation_success};
use crate::reconcilers::Reconcile;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Signal waking every worker.
pub const SIGNAL_ALL: &str = "*";

/// Broadcast channel waking workers ahead of their next tick.
#[derive(Clone)]
pub struct SignalBus {
    sender: broadcast::Sender<String>,
}

impl SignalBus {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(SIGNAL_BUS_CAPACITY);
        Self { sender }
    }

    /// Wake the worker named `worker`, or every worker with [`SIGNAL_ALL`].
    ///
    /// Signals sent while no worker listens are dropped.
    pub fn signal(&self, worker: &str) {
        if self.sender.send(worker.to_string()).is_err() {
            debug!(worker = %worker, "no worker listening for signal");
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Run one tick of `worker`, recording its outcome.
///
/// Returns the number of errors the tick reported.
pub async fn run_tick(worker: &dyn Reconcile) -> usize {
    let start = Instant::now();
    let errors = worker.reconcile().await;
    let duration = start.elapsed();

    if errors.is_empty() {
        record_reconciliation_success(worker.name(), duration);
        debug!(worker = worker.name(), duration_ms = duration.as_millis(), "tick completed");
    } else {
        record_reconciliation_error(worker.name(), duration);
        for e in &errors {
            error!(worker = worker.name(), error = %format!("{e:#}"), "reconciliation error");
        }
        warn!(
            worker = worker.name(),
            errors = errors.len(),
            duration_ms = duration.as_millis(),
            "tick completed with errors"
        );
    }
    errors.len()
}

async fn run_worker(
    worker: Arc<dyn Reconcile>,
    interval: Duration,
    mut signals: broadcast::Receiver<String>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(worker = worker.name(), interval_secs = interval.as_secs(), "starting worker");

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            signal = signals.recv() => match signal {
                Ok(name) if name == worker.name() || name == SIGNAL_ALL => {
                    debug!(worker = worker.name(), "woken by signal");
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(missed)) => {
                    warn!(worker = worker.name(), missed, "signal bus lagged, reconciling now");
                }
                Err(RecvError::Closed) => {
                    info!(worker = worker.name(), "signal bus closed, stopping worker");
                    return;
                }
            },
            _ = shutdown.changed() => {
                info!(worker = worker.name(), "stopping worker");
                return;
            }
        }
        run_tick(worker.as_ref()).await;
    }
}

/// Set of workers sharing one interval and signal bus.
pub struct Scheduler {
    workers: Vec<(Arc<dyn Reconcile>, Duration)>,
    interval: Duration,
    bus: SignalBus,
}

impl Scheduler {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            workers: Vec::new(),
            interval,
            bus: SignalBus::new(),
        }
    }

    /// Register a worker ticking on the scheduler's interval.
    #[must_use]
    pub fn with_worker(self, worker: Arc<dyn Reconcile>) -> Self {
        let interval = self.interval;
        self.with_worker_interval(worker, interval)
    }

    /// Register a worker ticking on its own interval.
    #[must_use]
    pub fn with_worker_interval(mut self, worker: Arc<dyn Reconcile>, interval: Duration) -> Self {
        self.workers.push((worker, interval));
        self
    }

    #[must_use]
    pub fn signal_bus(&self) -> SignalBus {
        self.bus.clone()
    }

    /// Names of the registered workers, in registration order.
    #[must_use]
    pub fn worker_names(&self) -> Vec<&'static str> {
        self.workers.iter().map(|(w, _)| w.name()).collect()
    }

    /// Spawn one task per worker. Each worker ticks immediately, then on its interval.
    #[must_use]
    pub fn start(self) -> SchedulerHandle {
        let (shutdown, _) = watch::channel(false);
        let tasks = self
            .workers
            .into_iter()
            .map(|(worker, interval)| {
                tokio::spawn(run_worker(
                    worker,
                    interval,
                    self.bus.subscribe(),
                    shutdown.subscribe(),
                ))
            })
            .collect();
        info!("all workers started");

        SchedulerHandle {
            tasks,
            shutdown,
            bus: self.bus,
        }
    }
}

/// Running workers.
pub struct SchedulerHandle {
    tasks: Vec<JoinHandle<()>>,
    shutdown: watch::Sender<bool>,
    bus: SignalBus,
}

impl SchedulerHandle {
    #[must_use]
    pub fn signal_bus(&self) -> SignalBus {
        self.bus.clone()
    }

    /// Stop every worker once its in-flight tick completes.
    pub async fn shutdown(self) {
        if self.shutdown.send(true).is_err() {
            debug!("workers already stopped");
        }
        for result in futures::future::join_all(self.tasks).await {
            if let Err(e) = result {
                error!(error = %e, "worker task failed");
            }
        }
        info!("all workers stopped");
    }
}
