//! Authority metadata cache.
//!
//! A plain key/value map of response bodies (keyed by request URL) that
//! lets the identity client skip repeated discovery calls. On disk it is an
//! opaque blob: a 4-byte magic, a format version byte, then the encoded map.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

const MAGIC: &[u8; 4] = b"PCHC";
const FORMAT_VERSION: u8 = 1;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct HttpCacheEntry {
    body: String,
    stored_at: i64,
}

/// Decoding failures for the on-disk blob.
#[derive(Debug, thiserror::Error)]
pub enum HttpCacheDecodeError {
    /// Missing or wrong magic prefix.
    #[error("not an http cache blob")]
    BadMagic,
    /// A version this build does not understand.
    #[error("unsupported http cache version {0}")]
    UnsupportedVersion(u8),
    /// The payload does not decode.
    #[error("corrupt http cache payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// In-memory HTTP metadata cache with change tracking.
#[derive(Clone, Debug, Default)]
pub struct HttpCache {
    entries: BTreeMap<String, HttpCacheEntry>,
    dirty: bool,
}

impl HttpCache {
    /// Body cached for `key` if it was stored no earlier than `now - max_age_secs`.
    pub fn get(&self, key: &str, now: i64, max_age_secs: i64) -> Option<&str> {
        self.entries
            .get(key)
            .filter(|e| now - e.stored_at <= max_age_secs)
            .map(|e| e.body.as_str())
    }

    /// Store `body` under `key`.
    pub fn insert(&mut self, key: impl Into<String>, body: impl Into<String>, now: i64) {
        let _ = self.entries.insert(
            key.into(),
            HttpCacheEntry {
                body: body.into(),
                stored_at: now,
            },
        );
        self.dirty = true;
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the cache changed since it was loaded or last persisted.
    pub fn has_state_changed(&self) -> bool {
        self.dirty
    }

    /// Clear the dirty flag after a successful write.
    pub fn mark_persisted(&mut self) {
        self.dirty = false;
    }

    /// Encode to the on-disk blob.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        let payload = serde_json::to_vec(&self.entries)?;
        let mut out = Vec::with_capacity(MAGIC.len() + 1 + payload.len());
        out.extend_from_slice(MAGIC);
        out.push(FORMAT_VERSION);
        out.extend_from_slice(&payload);
        Ok(out)
    }

    /// Decode an on-disk blob.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, HttpCacheDecodeError> {
        let rest = bytes
            .strip_prefix(MAGIC.as_slice())
            .ok_or(HttpCacheDecodeError::BadMagic)?;
        let (&version, payload) = rest.split_first().ok_or(HttpCacheDecodeError::BadMagic)?;
        if version != FORMAT_VERSION {
            return Err(HttpCacheDecodeError::UnsupportedVersion(version));
        }
        Ok(Self {
            entries: serde_json::from_slice(payload)?,
            dirty: false,
        })
    }
}
