//! Visitor identity as seen by the cart.
//!
//! [`IdentityResolver`] publishes the current [`CartIdentity`] through a
//! `tokio::sync::watch` channel. The external auth collaborator pushes
//! sign-in/sign-out through [`IdentityResolver::sign_in`] and
//! [`IdentityResolver::sign_out`]; the cart subscribes and reloads when the
//! storage backend changes. Anonymous identities are minted lazily through an
//! [`AuthProvider`].

mod http;
mod local;

pub use http::HttpAuthProvider;
pub use local::LocalAuthProvider;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use grocer_core::{CartIdentity, IdentityId};

/// Errors that can occur while minting an identity.
#[derive(Debug, Error)]
pub enum AuthError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Auth endpoint refused the request.
    #[error("auth endpoint returned {status}: {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Truncated response body.
        body: String,
    },

    /// Response body did not have the expected shape.
    #[error("malformed auth response: {0}")]
    MalformedResponse(#[from] serde_json::Error),

    /// Endpoint URL could not be built.
    #[error("invalid auth URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Issues identities on behalf of the cart.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Create a new credential-less identity bound to this device.
    async fn mint_anonymous(&self) -> Result<IdentityId, AuthError>;
}

/// Current visitor identity plus the transitions the cart may request.
#[derive(Clone)]
pub struct IdentityResolver {
    inner: Arc<ResolverInner>,
}

struct ResolverInner {
    auth: Arc<dyn AuthProvider>,
    identity: watch::Sender<CartIdentity>,
    minting: AtomicBool,
}

impl IdentityResolver {
    /// Create a resolver starting at `initial`.
    #[must_use]
    pub fn new(auth: Arc<dyn AuthProvider>, initial: CartIdentity) -> Self {
        let (identity, _) = watch::channel(initial);
        Self {
            inner: Arc::new(ResolverInner {
                auth,
                identity,
                minting: AtomicBool::new(false),
            }),
        }
    }

    /// The current identity.
    #[must_use]
    pub fn current(&self) -> CartIdentity {
        *self.inner.identity.borrow()
    }

    /// Subscribe to identity changes. The current value is marked as seen.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CartIdentity> {
        self.inner.identity.subscribe()
    }

    /// Publish a new identity. Subscribers are only notified on change.
    pub fn set(&self, identity: CartIdentity) {
        let changed = self.inner.identity.send_if_modified(|current| {
            if *current == identity {
                return false;
            }
            *current = identity;
            true
        });
        if changed {
            info!(?identity, "Visitor identity changed");
        }
    }

    /// Record a completed sign-in.
    pub fn sign_in(&self, id: IdentityId) {
        self.set(CartIdentity::Authenticated(id));
    }

    /// Record a sign-out; the visitor becomes a fresh guest.
    pub fn sign_out(&self) {
        self.set(CartIdentity::None);
    }

    /// Mint an anonymous identity in the background if there is none yet.
    ///
    /// Returns the minting task, or `None` if an identity already exists or a
    /// mint is already in flight. Must be called from within a Tokio runtime.
    /// Failures are logged and leave the identity at `None`.
    pub fn ensure_at_least_anonymous(&self) -> Option<JoinHandle<()>> {
        if self.current() != CartIdentity::None {
            return None;
        }
        if self.inner.minting.swap(true, Ordering::SeqCst) {
            debug!("Anonymous identity mint already in flight");
            return None;
        }

        let inner = Arc::clone(&self.inner);
        Some(tokio::spawn(async move {
            let result = inner.auth.mint_anonymous().await;
            inner.minting.store(false, Ordering::SeqCst);

            match result {
                Ok(id) => {
                    let applied = inner.identity.send_if_modified(|current| {
                        if *current != CartIdentity::None {
                            return false;
                        }
                        *current = CartIdentity::Anonymous(id);
                        true
                    });
                    if applied {
                        info!(identity_id = %id, "Anonymous identity minted");
                    } else {
                        debug!(identity_id = %id, "Identity set elsewhere, discarding minted id");
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to mint anonymous identity, cart stays device-local");
                }
            }
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    struct CountingAuth {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl AuthProvider for CountingAuth {
        async fn mint_anonymous(&self) -> Result<IdentityId, AuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            if self.fail {
                return Err(AuthError::Rejected {
                    status: 503,
                    body: "down".to_owned(),
                });
            }
            Ok(IdentityId::new_random())
        }
    }

    fn resolver(fail: bool) -> (Arc<CountingAuth>, IdentityResolver) {
        let auth = Arc::new(CountingAuth {
            calls: AtomicUsize::new(0),
            fail,
        });
        let resolver = IdentityResolver::new(auth.clone(), CartIdentity::None);
        (auth, resolver)
    }

    #[tokio::test]
    async fn test_mints_once_while_in_flight() {
        let (auth, resolver) = resolver(false);

        let task = resolver.ensure_at_least_anonymous().unwrap();
        assert!(resolver.ensure_at_least_anonymous().is_none());
        task.await.unwrap();

        assert!(matches!(resolver.current(), CartIdentity::Anonymous(_)));
        assert!(resolver.ensure_at_least_anonymous().is_none());
        assert_eq!(auth.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_mint_failure_keeps_none() {
        let (_, resolver) = resolver(true);
        resolver.ensure_at_least_anonymous().unwrap().await.unwrap();
        assert_eq!(resolver.current(), CartIdentity::None);
        // A later attempt is allowed after a failure.
        assert!(resolver.ensure_at_least_anonymous().is_some());
    }

    #[tokio::test]
    async fn test_sign_in_during_mint_wins() {
        let (_, resolver) = resolver(false);
        let user = IdentityId::new_random();

        let task = resolver.ensure_at_least_anonymous().unwrap();
        resolver.sign_in(user);
        task.await.unwrap();

        assert_eq!(resolver.current(), CartIdentity::Authenticated(user));
    }

    #[tokio::test]
    async fn test_subscribers_see_changes_only() {
        let (_, resolver) = resolver(false);
        let mut rx = resolver.subscribe();
        let user = IdentityId::new_random();

        resolver.sign_out();
        assert!(!rx.has_changed().unwrap());

        resolver.sign_in(user);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), CartIdentity::Authenticated(user));
    }
}
