//! Device-local identity minting.

use async_trait::async_trait;

use grocer_core::IdentityId;

use super::{AuthError, AuthProvider};

/// Mints random identities without contacting an auth service.
///
/// Used when no hosted auth endpoint is configured; the identity only ever
/// selects device-local cart storage.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalAuthProvider;

#[async_trait]
impl AuthProvider for LocalAuthProvider {
    async fn mint_anonymous(&self) -> Result<IdentityId, AuthError> {
        Ok(IdentityId::new_random())
    }
}
