//! Tool dispatch: model-requested operations against the portfolio backend.
//!
//! Every outcome is a [`ToolResult`]; argument problems, unknown contracts,
//! and backend failures all come back as error payloads the model can read
//! and apologize about. Nothing escapes into the turn loop as an error.

use std::sync::Arc;

use chrono::NaiveDate;
use guichet_core::{ContractNumber, NewClaim, ToolCall, ToolResult};
use guichet_db::repositories::{ClaimRepository, ContractRepository, RepositoryError};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::gateway::ToolSchema;

pub const TOOL_GET_CONTRACT_DETAILS: &str = "get_contrat_details";
pub const TOOL_OPEN_CLAIM: &str = "open_claim";

const ERR_MISSING_CONTRACT_NUMBER: &str = "numero_contrat manquant.";
const ERR_MISSING_CLAIM_PARAMS: &str = "Paramètres pour sinistre manquants.";
const ERR_BACKEND: &str = "Erreur interne lors de l'appel d'outil.";

pub struct ToolDispatcher {
    contracts: Arc<dyn ContractRepository>,
    claims: Arc<dyn ClaimRepository>,
}

#[derive(Debug, Deserialize)]
struct FetchContractArgs {
    numero_contrat: String,
}

#[derive(Debug, Deserialize)]
struct OpenClaimArgs {
    numero_contrat: String,
    type_sinistre: String,
    description_sinistre: String,
    #[serde(default)]
    date_survenance: Option<String>,
}

impl ToolDispatcher {
    pub fn new(contracts: Arc<dyn ContractRepository>, claims: Arc<dyn ClaimRepository>) -> Self {
        Self { contracts, claims }
    }

    /// The static tool table published to the gateway.
    pub fn catalogue() -> Vec<ToolSchema> {
        vec![
            ToolSchema {
                name: TOOL_GET_CONTRACT_DETAILS.to_string(),
                description: "Récupère des informations détaillées sur un contrat d'assurance \
                              (police d'assurance), y compris les détails de l'adhérent, la \
                              formule, et les garanties associées avec leurs conditions \
                              spécifiques (comme les plafonds de remboursement). Nécessite le \
                              numéro de contrat."
                    .to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "numero_contrat": {
                            "type": "string",
                            "description": "Le numéro unique de la police d'assurance (numéro de \
                                            contrat), par exemple 'POL001', 'AUTO-123'.",
                        },
                    },
                    "required": ["numero_contrat"],
                }),
            },
            ToolSchema {
                name: TOOL_OPEN_CLAIM.to_string(),
                description: "Enregistre une nouvelle déclaration de sinistre pour le compte \
                              d'un adhérent auprès d'Artex. Cela initie le processus \
                              d'enregistrement du sinistre. Le traitement et la validation du \
                              sinistre sont gérés ultérieurement par l'assureur partenaire."
                    .to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "numero_contrat": {
                            "type": "string",
                            "description": "Le numéro de la police d'assurance concernée par le \
                                            sinistre.",
                        },
                        "type_sinistre": {
                            "type": "string",
                            "description": "Le type de sinistre déclaré (par exemple, 'Accident \
                                            Auto', 'Dégât des eaux Habitation', 'Vol de \
                                            téléphone', 'Consultation médicale').",
                        },
                        "description_sinistre": {
                            "type": "string",
                            "description": "Une description détaillée de l'incident ou du \
                                            sinistre fournie par l'utilisateur.",
                        },
                        "date_survenance": {
                            "type": "string",
                            "description": "Optionnel. La date à laquelle l'incident s'est \
                                            produit, au format YYYY-MM-DD.",
                        },
                    },
                    "required": ["numero_contrat", "type_sinistre", "description_sinistre"],
                }),
            },
        ]
    }

    /// Run one tool call to completion. Never fails at the type level.
    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        match call.name.as_str() {
            TOOL_GET_CONTRACT_DETAILS => self.fetch_contract(call).await,
            TOOL_OPEN_CLAIM => self.open_claim(call).await,
            other => ToolResult::error(other, format!("Outil {other} inconnu.")),
        }
    }

    async fn fetch_contract(&self, call: &ToolCall) -> ToolResult {
        let Some(args) = decode_args::<FetchContractArgs>(call) else {
            return ToolResult::error(&call.name, ERR_MISSING_CONTRACT_NUMBER);
        };
        let numero = args.numero_contrat.trim();
        if numero.is_empty() {
            return ToolResult::error(&call.name, ERR_MISSING_CONTRACT_NUMBER);
        }

        let numero = ContractNumber(numero.to_string());
        match self.contracts.find_details(&numero).await {
            Ok(Some(details)) => match serde_json::to_value(&details) {
                Ok(payload) => ToolResult::ok(&call.name, payload),
                Err(serialize_error) => {
                    error!(
                        event_name = "dialogue.tool.payload_error",
                        tool = %call.name,
                        error = %serialize_error,
                        "contract details did not serialize"
                    );
                    ToolResult::error(&call.name, ERR_BACKEND)
                }
            },
            Ok(None) => ToolResult::error(
                &call.name,
                format!("Contrat {} non trouvé.", numero.as_str()),
            ),
            Err(backend_error) => backend_failure(&call.name, backend_error),
        }
    }

    async fn open_claim(&self, call: &ToolCall) -> ToolResult {
        let Some(args) = decode_args::<OpenClaimArgs>(call) else {
            return ToolResult::error(&call.name, ERR_MISSING_CLAIM_PARAMS);
        };
        let numero_contrat = args.numero_contrat.trim();
        let type_sinistre = args.type_sinistre.trim();
        let description_sinistre = args.description_sinistre.trim();
        if numero_contrat.is_empty() || type_sinistre.is_empty() || description_sinistre.is_empty()
        {
            return ToolResult::error(&call.name, ERR_MISSING_CLAIM_PARAMS);
        }

        let date_survenance = match args
            .date_survenance
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
        {
            None => None,
            Some(raw) => match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
                Ok(date) => Some(date),
                Err(_) => {
                    return ToolResult::error(
                        &call.name,
                        format!("Date invalide: {raw}. Use YYYY-MM-DD."),
                    );
                }
            },
        };

        let claim = NewClaim {
            numero_contrat: ContractNumber(numero_contrat.to_string()),
            type_sinistre: type_sinistre.to_string(),
            description_sinistre: description_sinistre.to_string(),
            date_survenance,
        };

        match self.claims.open_claim(claim).await {
            Ok(Some(record)) => {
                info!(
                    event_name = "dialogue.tool.claim_opened",
                    numero_contrat = %record.numero_contrat.as_str(),
                    claim_reference = %record.claim_reference.as_str(),
                    "claim recorded"
                );
                ToolResult::ok(
                    &call.name,
                    json!({
                        "id_sinistre_artex": record.id_sinistre,
                        "claim_id_ref": record.claim_reference.as_str(),
                        "message": "Sinistre enregistré.",
                    }),
                )
            }
            Ok(None) => ToolResult::error(
                &call.name,
                format!("Contrat {numero_contrat} non trouvé."),
            ),
            Err(backend_error) => backend_failure(&call.name, backend_error),
        }
    }
}

fn decode_args<T: for<'de> Deserialize<'de>>(call: &ToolCall) -> Option<T> {
    serde_json::from_value(call.arguments.clone()).ok()
}

fn backend_failure(tool: &str, error: RepositoryError) -> ToolResult {
    error!(
        event_name = "dialogue.tool.backend_failure",
        tool,
        error = %error,
        "tool backend call failed"
    );
    ToolResult::error(tool, ERR_BACKEND)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;
    use guichet_core::{
        AdherentSummary, ContractDetails, ContractNumber, NewClaim, ToolCall, ToolResult,
    };
    use guichet_db::repositories::{
        ClaimRepository, ContractRepository, InMemoryClaimRepository, InMemoryContractRepository,
        RepositoryError,
    };
    use serde_json::json;

    use super::ToolDispatcher;

    fn dispatcher_with(
        contracts: Arc<InMemoryContractRepository>,
        claims: Arc<InMemoryClaimRepository>,
    ) -> ToolDispatcher {
        ToolDispatcher::new(contracts, claims)
    }

    fn empty_dispatcher() -> ToolDispatcher {
        dispatcher_with(
            Arc::new(InMemoryContractRepository::default()),
            Arc::new(InMemoryClaimRepository::default()),
        )
    }

    fn nc123_details() -> ContractDetails {
        ContractDetails {
            numero_contrat: ContractNumber("NC123".to_string()),
            type_contrat: "Santé".to_string(),
            statut_contrat: "Actif".to_string(),
            date_debut_contrat: NaiveDate::from_ymd_opt(2023, 1, 1),
            date_fin_contrat: None,
            adherent_principal: Some(AdherentSummary {
                nom: "Dupont".to_string(),
                prenom: "Marie".to_string(),
                email: "marie.dupont@example.fr".to_string(),
            }),
            formule: None,
        }
    }

    fn claim_args() -> serde_json::Value {
        json!({
            "numero_contrat": "NC123",
            "type_sinistre": "Dégât des eaux",
            "description_sinistre": "Fuite dans la salle de bain.",
        })
    }

    #[test]
    fn catalogue_declares_both_tools() {
        let schemas = ToolDispatcher::catalogue();

        assert_eq!(schemas.len(), 2);
        assert_eq!(schemas[0].name, "get_contrat_details");
        assert_eq!(schemas[0].parameters["required"], json!(["numero_contrat"]));
        assert_eq!(schemas[1].name, "open_claim");
        assert_eq!(
            schemas[1].parameters["required"],
            json!(["numero_contrat", "type_sinistre", "description_sinistre"])
        );
    }

    #[tokio::test]
    async fn unknown_tool_names_are_reported() {
        let dispatcher = empty_dispatcher();

        let result =
            dispatcher.execute(&ToolCall::new("transfert_bancaire", json!({}))).await;

        assert_eq!(result.error_message(), Some("Outil transfert_bancaire inconnu."));
    }

    #[tokio::test]
    async fn missing_contract_number_is_rejected_before_the_backend() {
        let dispatcher = empty_dispatcher();

        let absent =
            dispatcher.execute(&ToolCall::new("get_contrat_details", json!({}))).await;
        let blank = dispatcher
            .execute(&ToolCall::new("get_contrat_details", json!({ "numero_contrat": "  " })))
            .await;

        assert_eq!(absent.error_message(), Some("numero_contrat manquant."));
        assert_eq!(blank.error_message(), Some("numero_contrat manquant."));
    }

    #[tokio::test]
    async fn unknown_contract_is_named_in_the_error() {
        let dispatcher = empty_dispatcher();

        let result = dispatcher
            .execute(&ToolCall::new("get_contrat_details", json!({ "numero_contrat": "NC999" })))
            .await;

        assert_eq!(result.error_message(), Some("Contrat NC999 non trouvé."));
    }

    #[tokio::test]
    async fn contract_details_are_returned_as_the_payload() {
        let contracts = Arc::new(InMemoryContractRepository::default());
        contracts.insert(nc123_details()).await;
        let dispatcher =
            dispatcher_with(contracts, Arc::new(InMemoryClaimRepository::default()));

        let result = dispatcher
            .execute(&ToolCall::new("get_contrat_details", json!({ "numero_contrat": "NC123" })))
            .await;

        assert!(!result.is_error());
        assert_eq!(result.payload["numero_contrat"], json!("NC123"));
        assert_eq!(result.payload["statut_contrat"], json!("Actif"));
        assert_eq!(result.payload["adherent_principal"]["prenom"], json!("Marie"));
    }

    #[tokio::test]
    async fn claim_requires_all_three_fields() {
        let dispatcher = empty_dispatcher();

        let result = dispatcher
            .execute(&ToolCall::new(
                "open_claim",
                json!({ "numero_contrat": "NC123", "type_sinistre": "Vol" }),
            ))
            .await;

        assert_eq!(result.error_message(), Some("Paramètres pour sinistre manquants."));
    }

    #[tokio::test]
    async fn malformed_dates_are_rejected_verbatim() {
        let claims = Arc::new(InMemoryClaimRepository::default());
        claims.register_contract("NC123").await;
        let dispatcher =
            dispatcher_with(Arc::new(InMemoryContractRepository::default()), claims);

        let mut args = claim_args();
        args["date_survenance"] = json!("31/12/2025");
        let result = dispatcher.execute(&ToolCall::new("open_claim", args)).await;

        assert_eq!(
            result.error_message(),
            Some("Date invalide: 31/12/2025. Use YYYY-MM-DD.")
        );
    }

    #[tokio::test]
    async fn opened_claim_reports_the_reference_and_message() {
        let claims = Arc::new(InMemoryClaimRepository::default());
        claims.register_contract("NC123").await;
        let dispatcher = dispatcher_with(
            Arc::new(InMemoryContractRepository::default()),
            Arc::clone(&claims),
        );

        let mut args = claim_args();
        args["date_survenance"] = json!("2025-03-14");
        let result = dispatcher.execute(&ToolCall::new("open_claim", args)).await;

        assert!(!result.is_error());
        assert_eq!(result.payload["id_sinistre_artex"], json!(1));
        assert_eq!(result.payload["message"], json!("Sinistre enregistré."));
        let reference = result.payload["claim_id_ref"].as_str().expect("reference string");
        assert!(reference.starts_with("CLAIM-"));

        let recorded = claims.recorded_claims().await;
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].date_survenance, NaiveDate::from_ymd_opt(2025, 3, 14));
    }

    #[tokio::test]
    async fn claim_for_unknown_contract_is_an_error_and_writes_nothing() {
        let claims = Arc::new(InMemoryClaimRepository::default());
        let dispatcher = dispatcher_with(
            Arc::new(InMemoryContractRepository::default()),
            Arc::clone(&claims),
        );

        let result = dispatcher.execute(&ToolCall::new("open_claim", claim_args())).await;

        assert_eq!(result.error_message(), Some("Contrat NC123 non trouvé."));
        assert!(claims.recorded_claims().await.is_empty());
    }

    struct FailingBackend;

    #[async_trait::async_trait]
    impl ContractRepository for FailingBackend {
        async fn find_details(
            &self,
            _numero: &ContractNumber,
        ) -> Result<Option<ContractDetails>, RepositoryError> {
            Err(RepositoryError::Decode("corrupt row".to_string()))
        }
    }

    #[async_trait::async_trait]
    impl ClaimRepository for FailingBackend {
        async fn open_claim(
            &self,
            _claim: NewClaim,
        ) -> Result<Option<guichet_core::ClaimRecord>, RepositoryError> {
            Err(RepositoryError::Decode("corrupt row".to_string()))
        }
    }

    #[tokio::test]
    async fn backend_failures_stay_generic() {
        let dispatcher = ToolDispatcher::new(Arc::new(FailingBackend), Arc::new(FailingBackend));

        let lookup = dispatcher
            .execute(&ToolCall::new("get_contrat_details", json!({ "numero_contrat": "NC123" })))
            .await;
        let claim = dispatcher.execute(&ToolCall::new("open_claim", claim_args())).await;

        assert_eq!(lookup.error_message(), Some("Erreur interne lors de l'appel d'outil."));
        assert_eq!(claim.error_message(), Some("Erreur interne lors de l'appel d'outil."));
    }

    #[tokio::test]
    async fn results_always_carry_the_tool_name() {
        let dispatcher = empty_dispatcher();

        let result: ToolResult =
            dispatcher.execute(&ToolCall::new("open_claim", json!(null))).await;

        assert_eq!(result.name, "open_claim");
        assert!(result.is_error());
    }
}
