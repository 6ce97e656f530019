use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};

use guichet_core::domain::contract::{
    AdherentSummary, ContractDetails, ContractNumber, FormuleDetails, GarantieLine,
};

use super::{ContractRepository, RepositoryError};
use crate::DbPool;

pub struct SqlContractRepository {
    pool: DbPool,
}

impl SqlContractRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_garanties(&self, id_formule: i64) -> Result<Vec<GarantieLine>, RepositoryError> {
        sqlx::query(
            "SELECT
                g.libelle,
                g.description,
                fg.plafond_remboursement,
                fg.taux_remboursement_pourcentage,
                fg.franchise,
                fg.conditions_specifiques
             FROM formule_garantie fg
             JOIN garantie g ON g.id_garantie = fg.id_garantie
             WHERE fg.id_formule = ?
             ORDER BY g.libelle ASC",
        )
        .bind(id_formule)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(garantie_from_row)
        .collect()
    }
}

#[async_trait::async_trait]
impl ContractRepository for SqlContractRepository {
    async fn find_details(
        &self,
        numero: &ContractNumber,
    ) -> Result<Option<ContractDetails>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                c.numero_contrat,
                c.type_contrat,
                c.statut_contrat,
                c.date_debut_contrat,
                c.date_fin_contrat,
                a.nom,
                a.prenom,
                a.email,
                f.id_formule,
                f.nom_formule,
                f.description_formule,
                f.tarif_base_mensuel
             FROM contrat c
             JOIN adherent a ON a.id_adherent = c.id_adherent_principal
             LEFT JOIN formule f ON f.id_formule = c.id_formule
             WHERE c.numero_contrat = ?",
        )
        .bind(numero.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let formule = match row.try_get::<Option<i64>, _>("id_formule")? {
            Some(id_formule) => Some(FormuleDetails {
                nom_formule: row.try_get("nom_formule")?,
                description_formule: row.try_get("description_formule")?,
                tarif_base_mensuel: parse_optional_decimal(
                    "tarif_base_mensuel",
                    row.try_get("tarif_base_mensuel")?,
                )?,
                garanties_associees: self.load_garanties(id_formule).await?,
            }),
            None => None,
        };

        Ok(Some(ContractDetails {
            numero_contrat: ContractNumber(row.try_get("numero_contrat")?),
            type_contrat: row.try_get("type_contrat")?,
            statut_contrat: row.try_get("statut_contrat")?,
            date_debut_contrat: parse_optional_date(
                "date_debut_contrat",
                row.try_get("date_debut_contrat")?,
            )?,
            date_fin_contrat: parse_optional_date(
                "date_fin_contrat",
                row.try_get("date_fin_contrat")?,
            )?,
            adherent_principal: Some(AdherentSummary {
                nom: row.try_get("nom")?,
                prenom: row.try_get("prenom")?,
                email: row.try_get("email")?,
            }),
            formule,
        }))
    }
}

fn garantie_from_row(row: SqliteRow) -> Result<GarantieLine, RepositoryError> {
    Ok(GarantieLine {
        libelle: row.try_get("libelle")?,
        description: row.try_get("description")?,
        plafond_remboursement: parse_optional_decimal(
            "plafond_remboursement",
            row.try_get("plafond_remboursement")?,
        )?,
        taux_remboursement_pourcentage: parse_optional_u32(
            "taux_remboursement_pourcentage",
            row.try_get("taux_remboursement_pourcentage")?,
        )?,
        franchise: parse_optional_decimal("franchise", row.try_get("franchise")?)?,
        conditions_specifiques: row.try_get("conditions_specifiques")?,
    })
}

fn parse_optional_decimal(
    column: &str,
    value: Option<String>,
) -> Result<Option<Decimal>, RepositoryError> {
    value
        .map(|raw| {
            raw.parse::<Decimal>().map_err(|error| {
                RepositoryError::Decode(format!("invalid decimal in `{column}`: `{raw}` ({error})"))
            })
        })
        .transpose()
}

fn parse_optional_u32(column: &str, value: Option<i64>) -> Result<Option<u32>, RepositoryError> {
    value
        .map(|raw| {
            u32::try_from(raw).map_err(|_| {
                RepositoryError::Decode(format!(
                    "invalid value for `{column}` (expected non-negative u32): {raw}"
                ))
            })
        })
        .transpose()
}

fn parse_optional_date(
    column: &str,
    value: Option<String>,
) -> Result<Option<NaiveDate>, RepositoryError> {
    value
        .map(|raw| {
            NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|error| {
                RepositoryError::Decode(format!("invalid date in `{column}`: `{raw}` ({error})"))
            })
        })
        .transpose()
}
