//! Cache store: owns the on-disk caches and their in-memory instances.
//!
//! One store is created per process and shared by `Arc`. Each namespace has
//! two caches (token, HTTP metadata) with an explicit `Unloaded → Loaded`
//! state. The first access loads the file and registers the cache for
//! finalization; later accesses return the same shared instance.
//!
//! [`CacheStore::finalize`] writes every loaded cache whose dirty flag is
//! set, in reverse order of registration, and runs at most once. `Drop`
//! calls it too, so caches are flushed on error paths and while unwinding.
//!
//! No cross-process locking is attempted: the last process to exit wins.

use std::collections::HashMap;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use super::http_cache::HttpCache;
use super::token_cache::TokenCache;
use crate::errors::{AuthError, Result};

/// Shared handle to a namespace's token cache.
pub type SharedTokenCache = Arc<Mutex<TokenCache>>;

/// Shared handle to a namespace's HTTP metadata cache.
pub type SharedHttpCache = Arc<Mutex<HttpCache>>;

/// Cache namespace. Public (user) and confidential (application) clients
/// never share cache files.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Public client (device code / interactive).
    Public,
    /// Confidential client (client credentials).
    Confidential,
}

impl Namespace {
    /// File-name prefix.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Confidential => "confidential",
        }
    }

    /// Token cache file name.
    pub fn token_cache_file(self) -> String {
        format!("{}_token_cache.json", self.as_str())
    }

    /// HTTP cache file name.
    pub fn http_cache_file(self) -> String {
        format!("{}_http_cache.bin", self.as_str())
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CacheKind {
    Token,
    Http,
}

enum LoadState<T> {
    Unloaded,
    Loaded(Arc<Mutex<T>>),
}

impl<T> Default for LoadState<T> {
    fn default() -> Self {
        Self::Unloaded
    }
}

#[derive(Default)]
struct NamespaceSlots {
    token: LoadState<TokenCache>,
    http: LoadState<HttpCache>,
}

#[derive(Default)]
struct StoreState {
    slots: HashMap<Namespace, NamespaceSlots>,
    registrations: Vec<(Namespace, CacheKind)>,
}

/// Process-scoped owner of the token and HTTP caches.
pub struct CacheStore {
    dir: PathBuf,
    state: Mutex<StoreState>,
    finalized: AtomicBool,
}

impl fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore")
            .field("dir", &self.dir)
            .field("finalized", &self.finalized.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl CacheStore {
    /// Store rooted at `dir` (usually `paconn_settings::config_dir()`).
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            state: Mutex::new(StoreState::default()),
            finalized: AtomicBool::new(false),
        }
    }

    /// Token cache file path for `ns`.
    pub fn token_cache_path(&self, ns: Namespace) -> PathBuf {
        self.dir.join(ns.token_cache_file())
    }

    /// HTTP cache file path for `ns`.
    pub fn http_cache_path(&self, ns: Namespace) -> PathBuf {
        self.dir.join(ns.http_cache_file())
    }

    /// The token cache of `ns`, loading it on first access.
    ///
    /// A cache file that does not decode is reported as
    /// [`AuthError::CorruptTokenCache`]; the namespace stays unloaded so the
    /// file is never overwritten at exit.
    pub fn token_cache(&self, ns: Namespace) -> Result<SharedTokenCache> {
        let mut state = self.state.lock();
        let slots = state.slots.entry(ns).or_default();
        if let LoadState::Loaded(cache) = &slots.token {
            return Ok(Arc::clone(cache));
        }

        let path = self.token_cache_path(ns);
        tracing::debug!(namespace = %ns, path = %path.display(), "loading token cache");
        let cache = match std::fs::read_to_string(&path) {
            Ok(text) => {
                TokenCache::deserialize(&text).map_err(|e| AuthError::CorruptTokenCache {
                    path: path.clone(),
                    reason: e.to_string(),
                })?
            }
            Err(e) if e.kind() == ErrorKind::NotFound => TokenCache::default(),
            Err(source) => return Err(AuthError::Io { path, source }),
        };

        let shared = Arc::new(Mutex::new(cache));
        slots.token = LoadState::Loaded(Arc::clone(&shared));
        state.registrations.push((ns, CacheKind::Token));
        Ok(shared)
    }

    /// The HTTP cache of `ns`, loading it on first access.
    ///
    /// Never fails: an unreadable or undecodable blob is discarded and the
    /// cache starts empty.
    pub fn http_cache(&self, ns: Namespace) -> SharedHttpCache {
        let mut state = self.state.lock();
        let slots = state.slots.entry(ns).or_default();
        if let LoadState::Loaded(cache) = &slots.http {
            return Arc::clone(cache);
        }

        let path = self.http_cache_path(ns);
        tracing::debug!(namespace = %ns, path = %path.display(), "loading http cache");
        let cache = match std::fs::read(&path) {
            Ok(bytes) => HttpCache::from_bytes(&bytes).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "discarding corrupt http cache");
                HttpCache::default()
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => HttpCache::default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "discarding unreadable http cache");
                HttpCache::default()
            }
        };

        let shared = Arc::new(Mutex::new(cache));
        slots.http = LoadState::Loaded(Arc::clone(&shared));
        state.registrations.push((ns, CacheKind::Http));
        shared
    }

    /// Delete both cache files of `ns` and empty the in-memory caches.
    ///
    /// Handles already given out observe the empty caches. Idempotent.
    pub fn clear_caches(&self, ns: Namespace) -> Result<()> {
        for path in [self.http_cache_path(ns), self.token_cache_path(ns)] {
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::debug!(path = %path.display(), "removed cache file"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(source) => return Err(AuthError::Io { path, source }),
            }
        }

        let state = self.state.lock();
        if let Some(slots) = state.slots.get(&ns) {
            if let LoadState::Loaded(cache) = &slots.token {
                *cache.lock() = TokenCache::default();
            }
            if let LoadState::Loaded(cache) = &slots.http {
                *cache.lock() = HttpCache::default();
            }
        }
        tracing::info!(namespace = %ns, "cleared cached credentials");
        Ok(())
    }

    /// Persist every loaded, changed cache. Runs at most once per store.
    ///
    /// Every registered cache is attempted; the first error is returned.
    pub fn finalize(&self) -> Result<()> {
        if self.finalized.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let state = self.state.lock();
        let mut first_error = None;
        for &(ns, kind) in state.registrations.iter().rev() {
            let Some(slots) = state.slots.get(&ns) else {
                continue;
            };
            let outcome = match kind {
                CacheKind::Token => match &slots.token {
                    LoadState::Loaded(cache) => self.flush_token_cache(ns, cache),
                    LoadState::Unloaded => Ok(()),
                },
                CacheKind::Http => match &slots.http {
                    LoadState::Loaded(cache) => self.flush_http_cache(ns, cache),
                    LoadState::Unloaded => Ok(()),
                },
            };
            if let Err(e) = outcome {
                tracing::error!(namespace = %ns, error = %e, "failed to persist cache");
                let _ = first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn flush_token_cache(&self, ns: Namespace, cache: &SharedTokenCache) -> Result<()> {
        let mut cache = cache.lock();
        if !cache.has_state_changed() {
            return Ok(());
        }
        let path = self.token_cache_path(ns);
        let text = cache
            .serialize()
            .map_err(|e| AuthError::Protocol(format!("token cache encode: {e}")))?;
        write_atomic(&path, text.as_bytes())?;
        cache.mark_persisted();
        tracing::debug!(namespace = %ns, path = %path.display(), "token cache persisted");
        Ok(())
    }

    fn flush_http_cache(&self, ns: Namespace, cache: &SharedHttpCache) -> Result<()> {
        let mut cache = cache.lock();
        if !cache.has_state_changed() {
            return Ok(());
        }
        let path = self.http_cache_path(ns);
        let bytes = cache
            .to_bytes()
            .map_err(|e| AuthError::Protocol(format!("http cache encode: {e}")))?;
        write_atomic(&path, &bytes)?;
        cache.mark_persisted();
        tracing::debug!(namespace = %ns, path = %path.display(), "http cache persisted");
        Ok(())
    }
}

impl Drop for CacheStore {
    fn drop(&mut self) {
        if let Err(e) = self.finalize() {
            tracing::error!(error = %e, "cache finalization failed");
        }
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let io_err = |source| AuthError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes).map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(io_err)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
