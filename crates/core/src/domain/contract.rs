use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContractNumber(pub String);

impl ContractNumber {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdherentSummary {
    pub nom: String,
    pub prenom: String,
    pub email: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GarantieLine {
    pub libelle: String,
    pub description: Option<String>,
    pub plafond_remboursement: Option<Decimal>,
    pub taux_remboursement_pourcentage: Option<u32>,
    pub franchise: Option<Decimal>,
    pub conditions_specifiques: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FormuleDetails {
    pub nom_formule: String,
    pub description_formule: Option<String>,
    pub tarif_base_mensuel: Option<Decimal>,
    pub garanties_associees: Vec<GarantieLine>,
}

/// Full contract view handed to the model as a function response.
///
/// Field names are the wire contract: the system prompt teaches the model
/// these exact French keys, so they serialize as-is.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContractDetails {
    pub numero_contrat: ContractNumber,
    pub type_contrat: String,
    pub statut_contrat: String,
    pub date_debut_contrat: Option<NaiveDate>,
    pub date_fin_contrat: Option<NaiveDate>,
    pub adherent_principal: Option<AdherentSummary>,
    pub formule: Option<FormuleDetails>,
}
