//! Principal directory trait definition.

use skillrun_types::error::RepositoryError;
use skillrun_types::principal::{Principal, PrincipalId};

/// Lookup of authenticated principals.
///
/// Authentication proper is outside the run subsystem; this port only maps
/// an API key digest to the principal it was issued to.
pub trait PrincipalRepository: Send + Sync {
    /// Store a principal together with the SHA-256 digest of its API key.
    fn create(
        &self,
        principal: &Principal,
        key_hash: &str,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get(
        &self,
        id: &PrincipalId,
    ) -> impl std::future::Future<Output = Result<Option<Principal>, RepositoryError>> + Send;

    fn find_by_key_hash(
        &self,
        key_hash: &str,
    ) -> impl std::future::Future<Output = Result<Option<Principal>, RepositoryError>> + Send;

    /// All principals ordered by name.
    fn list(&self) -> impl std::future::Future<Output = Result<Vec<Principal>, RepositoryError>> + Send;
}
