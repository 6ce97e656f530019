use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;

use guichet_core::domain::claim::{ClaimRecord, ClaimReference, NewClaim, CLAIM_STATUS_RECORDED};
use guichet_core::domain::contract::{ContractDetails, ContractNumber};

use super::{ClaimRepository, ContractRepository, RepositoryError};

#[derive(Default)]
pub struct InMemoryContractRepository {
    contracts: RwLock<HashMap<String, ContractDetails>>,
}

impl InMemoryContractRepository {
    pub async fn insert(&self, details: ContractDetails) {
        let mut contracts = self.contracts.write().await;
        contracts.insert(details.numero_contrat.0.clone(), details);
    }
}

#[async_trait::async_trait]
impl ContractRepository for InMemoryContractRepository {
    async fn find_details(
        &self,
        numero: &ContractNumber,
    ) -> Result<Option<ContractDetails>, RepositoryError> {
        let contracts = self.contracts.read().await;
        Ok(contracts.get(&numero.0).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryClaimRepository {
    store: RwLock<ClaimStore>,
}

#[derive(Default)]
struct ClaimStore {
    known_contracts: Vec<String>,
    claims: Vec<ClaimRecord>,
}

impl InMemoryClaimRepository {
    pub async fn register_contract(&self, numero_contrat: &str) {
        let mut store = self.store.write().await;
        if !store.known_contracts.iter().any(|known| known == numero_contrat) {
            store.known_contracts.push(numero_contrat.to_string());
        }
    }

    pub async fn recorded_claims(&self) -> Vec<ClaimRecord> {
        self.store.read().await.claims.clone()
    }
}

#[async_trait::async_trait]
impl ClaimRepository for InMemoryClaimRepository {
    async fn open_claim(&self, claim: NewClaim) -> Result<Option<ClaimRecord>, RepositoryError> {
        let mut store = self.store.write().await;
        if !store.known_contracts.iter().any(|known| known == claim.numero_contrat.as_str()) {
            return Ok(None);
        }

        let record = ClaimRecord {
            id_sinistre: store.claims.len() as i64 + 1,
            claim_reference: ClaimReference::mint(),
            numero_contrat: claim.numero_contrat,
            type_sinistre: claim.type_sinistre,
            description_sinistre: claim.description_sinistre,
            date_survenance: claim.date_survenance,
            statut: CLAIM_STATUS_RECORDED.to_string(),
            date_declaration: Utc::now().date_naive(),
        };
        store.claims.push(record.clone());
        Ok(Some(record))
    }
}
