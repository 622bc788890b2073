//! Tuning knobs for the write path.

use std::time::Duration;

/// How the engine takes and recovers per-document write locks.
#[derive(Debug, Clone)]
pub struct EngineConfig {
  /// Attempts to take a document's write lock before giving up with
  /// [`crate::Error::Conflict`].
  pub lock_retries:       u32,
  /// Delay between lock attempts.
  pub lock_backoff:       Duration,
  /// Age after which an unfinished write intent is considered abandoned and
  /// rolled back by the activation scheduler.
  pub stale_intent_after: Duration,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      lock_retries:       5,
      lock_backoff:       Duration::from_millis(25),
      stale_intent_after: Duration::from_secs(30),
    }
  }
}
