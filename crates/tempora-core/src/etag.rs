//! ETag computation for stored records.
//!
//! ETags are SHA-256 digests over the key, content and metadata of a record,
//! so rewriting a record with identical data yields the same ETag.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::{Result, metadata::Metadata};

pub fn compute_etag(
  key: &str,
  content: &Value,
  metadata: &Metadata,
) -> Result<String> {
  let mut hasher = Sha256::new();
  hasher.update(key.as_bytes());
  hasher.update([0]);
  hasher.update(serde_json::to_vec(content)?);
  hasher.update([0]);
  hasher.update(serde_json::to_vec(metadata)?);
  Ok(hex::encode(hasher.finalize()))
}
