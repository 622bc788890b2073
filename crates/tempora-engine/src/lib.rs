//! Bitemporal versioning engine.
//!
//! [`TemporalEngine`] implements the write path (new revisions and chain
//! repair), the read-path filter, and the activation step that the
//! [`ActivationScheduler`] drives in the background. It is generic over any
//! [`tempora_core::store::DocumentStore`].

pub mod activation;
pub mod chain;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod intent;
pub mod read;

#[cfg(test)]
mod tests;

pub use activation::{ActivationHandle, ActivationReport, ActivationScheduler};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use engine::{NewDocument, SaveOutcome, TemporalEngine};
pub use error::{Error, Result};
pub use read::{ReadFilter, ReadVeto, TemporalHistory};
