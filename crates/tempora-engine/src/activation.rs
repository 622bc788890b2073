//! The activation scheduler: the background loop that promotes pending
//! revisions once their effective time arrives.
//!
//! All scheduling state lives in revision metadata, so the loop can be
//! stopped and restarted freely; a revision that came due while it was down
//! is activated on the next cycle.

use std::{sync::Arc, time::Duration};

use tempora_core::store::DocumentStore;
use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};

use crate::{Result, TemporalEngine};

/// What one cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivationReport {
  /// Abandoned write intents rolled back.
  pub recovered: usize,
  /// Documents whose current copy moved to a newly effective revision.
  pub activated: usize,
  /// Due documents left for the next cycle because they were busy or failed.
  pub skipped:   usize,
}

pub struct ActivationScheduler<S> {
  engine:   Arc<TemporalEngine<S>>,
  interval: Duration,
}

impl<S: DocumentStore + 'static> ActivationScheduler<S> {
  pub fn new(engine: Arc<TemporalEngine<S>>, interval: Duration) -> Self {
    Self { engine, interval }
  }

  /// Run a single cycle: recover stale intents, then activate every due
  /// document. A failure on one document does not stop the others.
  pub async fn run_once(&self) -> Result<ActivationReport> {
    let mut report = ActivationReport {
      recovered: self.engine.recover_stale_intents().await?,
      ..Default::default()
    };

    for id in self.engine.due_documents().await? {
      match self.engine.activate(&id).await {
        Ok(true) => report.activated += 1,
        Ok(false) => report.skipped += 1,
        Err(e) => {
          tracing::warn!(document_id = %id, error = %e, "activation failed");
          report.skipped += 1;
        }
      }
    }

    tracing::debug!(
      recovered = report.recovered,
      activated = report.activated,
      skipped = report.skipped,
      "activation cycle finished",
    );
    Ok(report)
  }

  /// Run cycles on the configured interval until the handle is stopped.
  pub fn spawn(self) -> ActivationHandle {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(async move {
      let mut ticker = tokio::time::interval(self.interval);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
      tracing::info!(interval = ?self.interval, "activation scheduler started");

      loop {
        tokio::select! {
          _ = ticker.tick() => {
            if let Err(e) = self.run_once().await {
              tracing::error!(error = %e, "activation cycle failed");
            }
          }
          changed = shutdown_rx.changed() => {
            if changed.is_err() || *shutdown_rx.borrow() {
              break;
            }
          }
        }
      }
      tracing::info!("activation scheduler stopped");
    });
    ActivationHandle { shutdown: shutdown_tx, task }
  }
}

/// Handle to a spawned [`ActivationScheduler`].
pub struct ActivationHandle {
  shutdown: watch::Sender<bool>,
  task:     JoinHandle<()>,
}

impl ActivationHandle {
  /// Signal the loop to stop and wait for the current cycle to finish.
  pub async fn stop(self) {
    let _ = self.shutdown.send(true);
    if let Err(e) = self.task.await {
      tracing::error!(error = %e, "activation scheduler task panicked");
    }
  }
}
