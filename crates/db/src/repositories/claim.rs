use chrono::Utc;
use sqlx::Row;

use guichet_core::domain::claim::{ClaimRecord, ClaimReference, NewClaim, CLAIM_STATUS_RECORDED};

use super::{ClaimRepository, RepositoryError};
use crate::DbPool;

pub struct SqlClaimRepository {
    pool: DbPool,
}

impl SqlClaimRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ClaimRepository for SqlClaimRepository {
    async fn open_claim(&self, claim: NewClaim) -> Result<Option<ClaimRecord>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let target = sqlx::query(
            "SELECT id_contrat, id_adherent_principal
             FROM contrat
             WHERE numero_contrat = ?",
        )
        .bind(claim.numero_contrat.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(target) = target else {
            return Ok(None);
        };
        let id_contrat: i64 = target.try_get("id_contrat")?;
        let id_adherent: i64 = target.try_get("id_adherent_principal")?;

        let reference = ClaimReference::mint();
        let declared_on = Utc::now().date_naive();

        let inserted = sqlx::query(
            "INSERT INTO sinistre (
                claim_reference,
                id_contrat,
                id_adherent,
                type_sinistre,
                description_sinistre,
                date_survenance,
                statut_sinistre,
                date_declaration
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(reference.as_str())
        .bind(id_contrat)
        .bind(id_adherent)
        .bind(&claim.type_sinistre)
        .bind(&claim.description_sinistre)
        .bind(claim.date_survenance.map(|date| date.to_string()))
        .bind(CLAIM_STATUS_RECORDED)
        .bind(declared_on.to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(ClaimRecord {
            id_sinistre: inserted.last_insert_rowid(),
            claim_reference: reference,
            numero_contrat: claim.numero_contrat,
            type_sinistre: claim.type_sinistre,
            description_sinistre: claim.description_sinistre,
            date_survenance: claim.date_survenance,
            statut: CLAIM_STATUS_RECORDED.to_string(),
            date_declaration: declared_on,
        }))
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use sqlx::Row;

    use guichet_core::domain::claim::{NewClaim, CLAIM_STATUS_RECORDED};
    use guichet_core::domain::contract::ContractNumber;

    use super::SqlClaimRepository;
    use crate::migrations;
    use crate::repositories::ClaimRepository;
    use crate::{connect_with_settings, DbPool};

    #[tokio::test]
    async fn opening_claim_for_unknown_contract_writes_nothing() {
        let pool = setup_pool().await;
        let repo = SqlClaimRepository::new(pool.clone());

        let opened = repo.open_claim(sample_claim("NC404")).await.expect("open claim");
        assert!(opened.is_none());

        let row_count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM sinistre")
            .fetch_one(&pool)
            .await
            .expect("count sinistres");
        assert_eq!(row_count, 0);

        pool.close().await;
    }

    #[tokio::test]
    async fn opened_claim_is_persisted_with_minted_reference() {
        let pool = setup_pool().await;
        insert_contract(&pool).await;

        let repo = SqlClaimRepository::new(pool.clone());
        let record = repo
            .open_claim(sample_claim("NC123"))
            .await
            .expect("open claim")
            .expect("contract should be known");

        assert!(record.claim_reference.as_str().starts_with("CLAIM-"));
        assert_eq!(record.numero_contrat, ContractNumber("NC123".to_string()));
        assert_eq!(record.statut, CLAIM_STATUS_RECORDED);
        assert_eq!(record.date_survenance, NaiveDate::from_ymd_opt(2025, 3, 14));

        let row = sqlx::query(
            "SELECT claim_reference, type_sinistre, statut_sinistre, date_survenance
             FROM sinistre
             WHERE id_sinistre = ?",
        )
        .bind(record.id_sinistre)
        .fetch_one(&pool)
        .await
        .expect("read back sinistre");

        assert_eq!(row.get::<String, _>("claim_reference"), record.claim_reference.as_str());
        assert_eq!(row.get::<String, _>("type_sinistre"), "Dégât des eaux");
        assert_eq!(row.get::<String, _>("statut_sinistre"), CLAIM_STATUS_RECORDED);
        assert_eq!(row.get::<String, _>("date_survenance"), "2025-03-14");

        pool.close().await;
    }

    #[tokio::test]
    async fn claims_on_the_same_contract_get_distinct_references() {
        let pool = setup_pool().await;
        insert_contract(&pool).await;

        let repo = SqlClaimRepository::new(pool.clone());
        let first = repo
            .open_claim(sample_claim("NC123"))
            .await
            .expect("open first claim")
            .expect("contract should be known");
        let second = repo
            .open_claim(sample_claim("NC123"))
            .await
            .expect("open second claim")
            .expect("contract should be known");

        assert_ne!(first.claim_reference, second.claim_reference);
        assert_ne!(first.id_sinistre, second.id_sinistre);

        pool.close().await;
    }

    async fn setup_pool() -> DbPool {
        let pool =
            connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    async fn insert_contract(pool: &DbPool) {
        sqlx::query(
            "INSERT INTO adherent (id_adherent, nom, prenom, email)
             VALUES (1, 'Dupont', 'Marie', 'marie.dupont@example.fr')",
        )
        .execute(pool)
        .await
        .expect("insert adherent");

        sqlx::query(
            "INSERT INTO contrat (id_contrat, numero_contrat, id_adherent_principal, type_contrat)
             VALUES (1, 'NC123', 1, 'Santé')",
        )
        .execute(pool)
        .await
        .expect("insert contrat");
    }

    fn sample_claim(numero: &str) -> NewClaim {
        NewClaim {
            numero_contrat: ContractNumber(numero.to_string()),
            type_sinistre: "Dégât des eaux".to_string(),
            description_sinistre: "Fuite dans la salle de bain".to_string(),
            date_survenance: NaiveDate::from_ymd_opt(2025, 3, 14),
        }
    }
}
