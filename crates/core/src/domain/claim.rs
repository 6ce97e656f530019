use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::contract::ContractNumber;

/// Status stamped on every claim captured by the assistant; downstream
/// processing by the insurer moves it on from there.
pub const CLAIM_STATUS_RECORDED: &str = "Information enregistrée par agent";

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClaimReference(pub String);

impl ClaimReference {
    /// Mint a reference of the form `CLAIM-` + 8 uppercase hex characters.
    pub fn mint() -> Self {
        let hex = Uuid::new_v4().simple().to_string();
        Self(format!("CLAIM-{}", hex[..8].to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Claim intake data as validated by the tool dispatcher.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewClaim {
    pub numero_contrat: ContractNumber,
    pub type_sinistre: String,
    pub description_sinistre: String,
    pub date_survenance: Option<NaiveDate>,
}

/// A persisted claim row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub id_sinistre: i64,
    pub claim_reference: ClaimReference,
    pub numero_contrat: ContractNumber,
    pub type_sinistre: String,
    pub description_sinistre: String,
    pub date_survenance: Option<NaiveDate>,
    pub statut: String,
    pub date_declaration: NaiveDate,
}
