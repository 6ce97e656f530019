use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Canonical seed contracts and the properties `verify` checks for each.
const SEED_CONTRACTS: &[SeedContractRecord] = &[
    SeedContractRecord {
        numero_contrat: "NC123",
        type_contrat: "Santé",
        statut_contrat: "Actif",
        adherent_email: "marie.dupont@example.fr",
        nom_formule: Some("Confort"),
        garantie_count: 4,
        description: "Complémentaire santé active, formule Confort",
    },
    SeedContractRecord {
        numero_contrat: "NC456",
        type_contrat: "Santé",
        statut_contrat: "Actif",
        adherent_email: "paul.martin@example.fr",
        nom_formule: Some("Essentielle"),
        garantie_count: 2,
        description: "Complémentaire santé active, formule Essentielle",
    },
    SeedContractRecord {
        numero_contrat: "NC789",
        type_contrat: "Prévoyance",
        statut_contrat: "Résilié",
        adherent_email: "sophie.bernard@example.fr",
        nom_formule: None,
        garantie_count: 0,
        description: "Contrat prévoyance résilié, sans formule rattachée",
    },
];

const SEED_ADHERENT_IDS: &[i64] = &[1, 2, 3];
const SEED_FORMULE_IDS: &[i64] = &[1, 2, 3];
const SEED_GARANTIE_IDS: &[i64] = &[1, 2, 3, 4];

/// Demo portfolio backing local runs and scripted scenarios.
///
/// Seeds three adherents, three formules with their garanties, and the
/// contracts NC123, NC456 and NC789 the assistant can be asked about.
pub struct DemoPortfolio;

impl DemoPortfolio {
    /// SQL fixture content for the demo portfolio.
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_portfolio.sql");

    /// Load the demo portfolio into the database. Reloading is a no-op
    /// beyond refreshing the seeded rows.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;

        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        let contracts_seeded = SEED_CONTRACTS
            .iter()
            .map(|contract| ContractSeedInfo {
                numero_contrat: contract.numero_contrat,
                nom_formule: contract.nom_formule,
                description: contract.description,
            })
            .collect::<Vec<_>>();

        Ok(SeedResult { contracts_seeded })
    }

    /// Verify that the seeded rows exist and still match the canonical shape.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for contract in SEED_CONTRACTS {
            let contract_ok: i64 = sqlx::query_scalar(
                "SELECT EXISTS(
                    SELECT 1 FROM contrat
                    WHERE numero_contrat = ?1 AND statut_contrat = ?2 AND type_contrat = ?3
                 )",
            )
            .bind(contract.numero_contrat)
            .bind(contract.statut_contrat)
            .bind(contract.type_contrat)
            .fetch_one(pool)
            .await?;
            checks.push((contract.numero_contrat, contract_ok == 1));

            let adherent_ok: i64 = sqlx::query_scalar(
                "SELECT EXISTS(
                    SELECT 1 FROM contrat c
                    JOIN adherent a ON a.id_adherent = c.id_adherent_principal
                    WHERE c.numero_contrat = ?1 AND a.email = ?2
                 )",
            )
            .bind(contract.numero_contrat)
            .bind(contract.adherent_email)
            .fetch_one(pool)
            .await?;
            checks.push((contract.adherent_label(), adherent_ok == 1));

            let formule_ok: i64 = if let Some(nom_formule) = contract.nom_formule {
                sqlx::query_scalar(
                    "SELECT EXISTS(
                        SELECT 1 FROM contrat c
                        JOIN formule f ON f.id_formule = c.id_formule
                        WHERE c.numero_contrat = ?1 AND f.nom_formule = ?2
                     )",
                )
                .bind(contract.numero_contrat)
                .bind(nom_formule)
                .fetch_one(pool)
                .await?
            } else {
                sqlx::query_scalar(
                    "SELECT EXISTS(
                        SELECT 1 FROM contrat
                        WHERE numero_contrat = ?1 AND id_formule IS NULL
                     )",
                )
                .bind(contract.numero_contrat)
                .fetch_one(pool)
                .await?
            };
            checks.push((contract.formule_label(), formule_ok == 1));

            let garantie_count: i64 = sqlx::query_scalar(
                "SELECT COUNT(1)
                 FROM contrat c
                 JOIN formule_garantie fg ON fg.id_formule = c.id_formule
                 WHERE c.numero_contrat = ?1",
            )
            .bind(contract.numero_contrat)
            .fetch_one(pool)
            .await?;
            checks.push((contract.garanties_label(), garantie_count == contract.garantie_count));
        }

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    /// Remove the seeded rows, including any claims opened against the
    /// seeded contracts.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        let quoted_contracts = sql_list_from_strs(
            &SEED_CONTRACTS.iter().map(|contract| contract.numero_contrat).collect::<Vec<_>>(),
        );
        let adherent_ids = sql_list_from_ids(SEED_ADHERENT_IDS);
        let formule_ids = sql_list_from_ids(SEED_FORMULE_IDS);
        let garantie_ids = sql_list_from_ids(SEED_GARANTIE_IDS);

        sqlx::query(&format!(
            "DELETE FROM sinistre WHERE id_contrat IN
                (SELECT id_contrat FROM contrat WHERE numero_contrat IN {quoted_contracts})"
        ))
        .execute(&mut *tx)
        .await?;
        sqlx::query(&format!("DELETE FROM contrat WHERE numero_contrat IN {quoted_contracts}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM formule_garantie WHERE id_formule IN {formule_ids}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM garantie WHERE id_garantie IN {garantie_ids}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM formule WHERE id_formule IN {formule_ids}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM adherent WHERE id_adherent IN {adherent_ids}"))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedContractRecord {
    numero_contrat: &'static str,
    type_contrat: &'static str,
    statut_contrat: &'static str,
    adherent_email: &'static str,
    nom_formule: Option<&'static str>,
    garantie_count: i64,
    description: &'static str,
}

impl SeedContractRecord {
    fn adherent_label(&self) -> &'static str {
        match self.numero_contrat {
            "NC123" => "NC123-adherent",
            "NC456" => "NC456-adherent",
            _ => "NC789-adherent",
        }
    }

    fn formule_label(&self) -> &'static str {
        match self.numero_contrat {
            "NC123" => "NC123-formule",
            "NC456" => "NC456-formule",
            _ => "NC789-formule",
        }
    }

    fn garanties_label(&self) -> &'static str {
        match self.numero_contrat {
            "NC123" => "NC123-garanties",
            "NC456" => "NC456-garanties",
            _ => "NC789-garanties",
        }
    }
}

fn sql_list_from_strs(values: &[&str]) -> String {
    let quoted = values.iter().map(|value| format!("'{value}'")).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

fn sql_list_from_ids(ids: &[i64]) -> String {
    let joined = ids.iter().map(i64::to_string).collect::<Vec<_>>().join(",");
    format!("({joined})")
}

#[derive(Debug)]
pub struct SeedResult {
    pub contracts_seeded: Vec<ContractSeedInfo>,
}

#[derive(Debug)]
pub struct ContractSeedInfo {
    pub numero_contrat: &'static str,
    pub nom_formule: Option<&'static str>,
    pub description: &'static str,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
