//! Persistent caches: the OAuth token cache and the authority metadata cache.

pub mod http_cache;
pub mod store;
pub mod token_cache;

pub use http_cache::{HttpCache, HttpCacheDecodeError};
pub use store::{CacheStore, Namespace, SharedHttpCache, SharedTokenCache};
pub use token_cache::{
    AccessTokenEntry, AccessTokenQuery, AccountEntry, Owner, RefreshTokenEntry, TokenCache,
};
