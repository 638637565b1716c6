//! # paconn-auth
//!
//! Authentication and token-cache management for the paconn CLI.
//!
//! - [`cache`]: per-namespace token and HTTP metadata caches, lazily loaded
//!   and persisted once at shutdown when changed
//! - [`validator`]: raw provider response → [`AccessToken`] or [`AuthError`]
//! - [`resolver`]: which cached identity a command acts as
//! - [`UserTokenManager`]: device code and browser sign-in (`public` namespace)
//! - [`AppTokenManager`]: client credentials (`confidential` namespace)
//! - [`Authenticator`]: login, logout and identity routing for commands
//!
//! Network access goes through the [`IdentityClient`] trait;
//! [`EntraClient`] is the Microsoft Entra ID implementation.

#![deny(unsafe_code)]

pub mod application;
pub mod authority;
pub mod cache;
pub mod client;
pub mod confidential;
pub mod errors;
pub mod id_token;
pub mod interaction;
pub mod pkce;
pub mod provider;
pub mod public;
pub mod resolver;
pub mod session;
pub mod types;
pub mod validator;

#[cfg(test)]
pub(crate) mod testutil;

pub use application::ClientApplication;
pub use authority::{Authority, AuthorityMetadata};
pub use cache::{CacheStore, Namespace};
pub use client::{EntraClient, IdentityClient};
pub use confidential::AppTokenManager;
pub use errors::{AuthError, Result};
pub use interaction::{IdentityPrompt, MessageSink};
pub use provider::{CredentialProvider, ProviderKind};
pub use public::UserTokenManager;
pub use resolver::{Identity, IdentitySource, ResolvedIdentity};
pub use session::{Authenticator, LoginOutcome};
pub use types::{AccessToken, AppIdentity, CachedIdentity, UserAccount};
pub use validator::validate;
