//! Which collections are temporally versioned.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::key::collection_of;

/// Per-collection switch for temporal versioning. Collections not listed in
/// `collections` fall back to `default_enabled`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersioningPolicy {
  #[serde(default = "default_enabled")]
  pub default_enabled: bool,
  #[serde(default)]
  pub collections:     HashMap<String, bool>,
}

fn default_enabled() -> bool { true }

impl Default for VersioningPolicy {
  fn default() -> Self {
    Self { default_enabled: true, collections: HashMap::new() }
  }
}

impl VersioningPolicy {
  /// Version every collection.
  pub fn all() -> Self { Self::default() }

  /// Version only the named collections.
  pub fn only<I, S>(collections: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      default_enabled: false,
      collections:     collections.into_iter().map(|c| (c.into(), true)).collect(),
    }
  }

  pub fn is_enabled(&self, document_id: &str) -> bool {
    self
      .collections
      .get(collection_of(document_id))
      .copied()
      .unwrap_or(self.default_enabled)
  }
}
