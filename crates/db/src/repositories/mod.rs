use async_trait::async_trait;
use thiserror::Error;

use guichet_core::domain::claim::{ClaimRecord, NewClaim};
use guichet_core::domain::contract::{ContractDetails, ContractNumber};

pub mod claim;
pub mod contract;
pub mod memory;

pub use claim::SqlClaimRepository;
pub use contract::SqlContractRepository;
pub use memory::{InMemoryClaimRepository, InMemoryContractRepository};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait ContractRepository: Send + Sync {
    async fn find_details(
        &self,
        numero: &ContractNumber,
    ) -> Result<Option<ContractDetails>, RepositoryError>;
}

#[async_trait]
pub trait ClaimRepository: Send + Sync {
    /// `Ok(None)` means the contract number does not exist; no row is written.
    async fn open_claim(&self, claim: NewClaim) -> Result<Option<ClaimRecord>, RepositoryError>;
}
