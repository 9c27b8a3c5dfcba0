use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::Row;

use marginscout_core::domain::cost::{CostLookup, CostSource, VariantCost};

use super::decision::{parse_decimal, parse_rfc3339};
use super::{CostRepository, RepositoryError};
use crate::DbPool;

pub struct SqlCostRepository {
    pool: DbPool,
}

impl SqlCostRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CostRepository for SqlCostRepository {
    async fn upsert_batch(
        &self,
        merchant_id: &str,
        costs: Vec<VariantCost>,
    ) -> Result<u32, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let existing_rows = sqlx::query(
            "SELECT variant_id, source FROM variant_costs WHERE merchant_id = ?",
        )
        .bind(merchant_id)
        .fetch_all(&mut *tx)
        .await?;

        let mut existing: HashMap<String, CostSource> = HashMap::new();
        for row in &existing_rows {
            let variant_id: String = row.try_get("variant_id")?;
            let source = parse_source(&row.try_get::<String, _>("source")?)?;
            existing.insert(variant_id, source);
        }

        let mut written = 0u32;
        for cost in costs {
            // An entry from a stronger source is never overwritten.
            if let Some(current) = existing.get(&cost.variant_id) {
                if current.precedence() > cost.source.precedence() {
                    continue;
                }
            }

            sqlx::query(
                r#"
                INSERT INTO variant_costs (merchant_id, variant_id, unit_cost, source, updated_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(merchant_id, variant_id) DO UPDATE SET
                    unit_cost = excluded.unit_cost,
                    source = excluded.source,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(merchant_id)
            .bind(&cost.variant_id)
            .bind(cost.unit_cost.to_string())
            .bind(cost.source.as_str())
            .bind(cost.updated_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;

            existing.insert(cost.variant_id.clone(), cost.source);
            written += 1;
        }

        tx.commit().await?;
        Ok(written)
    }

    async fn lookup(&self, merchant_id: &str) -> Result<CostLookup, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT variant_id, unit_cost, source, updated_at
            FROM variant_costs
            WHERE merchant_id = ?
            ORDER BY variant_id ASC
            "#,
        )
        .bind(merchant_id)
        .fetch_all(&self.pool)
        .await?;

        let costs = rows
            .iter()
            .map(|row| {
                Ok(VariantCost {
                    variant_id: row.try_get("variant_id")?,
                    unit_cost: parse_decimal(
                        "variant unit_cost",
                        &row.try_get::<String, _>("unit_cost")?,
                    )?,
                    source: parse_source(&row.try_get::<String, _>("source")?)?,
                    updated_at: parse_rfc3339(
                        "variant cost updated_at",
                        &row.try_get::<String, _>("updated_at")?,
                    )?,
                })
            })
            .collect::<Result<Vec<_>, RepositoryError>>()?;

        Ok(CostLookup::from_costs(costs))
    }
}

fn parse_source(value: &str) -> Result<CostSource, RepositoryError> {
    CostSource::from_str(value)
        .map_err(|err| RepositoryError::Decode(format!("invalid cost source: {err}")))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use marginscout_core::domain::cost::{CostSource, VariantCost};

    use super::{CostRepository, SqlCostRepository};
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn cost(variant_id: &str, unit_cost: Decimal, source: CostSource) -> VariantCost {
        VariantCost { variant_id: variant_id.to_string(), unit_cost, source, updated_at: Utc::now() }
    }

    #[tokio::test]
    async fn imported_costs_round_trip() {
        let pool = setup_pool().await;
        let repo = SqlCostRepository::new(pool.clone());

        let written = repo
            .upsert_batch(
                "shop-1",
                vec![
                    cost("v-1", Decimal::new(450, 2), CostSource::Imported),
                    cost("v-2", Decimal::new(1_200, 2), CostSource::Imported),
                ],
            )
            .await
            .expect("upsert");
        assert_eq!(written, 2);

        let lookup = repo.lookup("shop-1").await.expect("lookup");
        assert_eq!(lookup.unit_cost("v-1"), Some(Decimal::new(450, 2)));
        assert_eq!(lookup.unit_cost("v-2"), Some(Decimal::new(1_200, 2)));
        assert_eq!(lookup.unit_cost("v-3"), None);

        pool.close().await;
    }

    #[tokio::test]
    async fn manual_costs_survive_later_imports() {
        let pool = setup_pool().await;
        let repo = SqlCostRepository::new(pool.clone());

        repo.upsert_batch("shop-1", vec![cost("v-1", Decimal::new(500, 2), CostSource::Manual)])
            .await
            .expect("manual upsert");

        let written = repo
            .upsert_batch(
                "shop-1",
                vec![
                    cost("v-1", Decimal::new(450, 2), CostSource::Imported),
                    cost("v-2", Decimal::new(300, 2), CostSource::Imported),
                ],
            )
            .await
            .expect("import upsert");
        assert_eq!(written, 1);

        let lookup = repo.lookup("shop-1").await.expect("lookup");
        assert_eq!(lookup.unit_cost("v-1"), Some(Decimal::new(500, 2)));
        assert_eq!(lookup.get("v-1").expect("v-1").source, CostSource::Manual);
        assert_eq!(lookup.unit_cost("v-2"), Some(Decimal::new(300, 2)));

        pool.close().await;
    }

    #[tokio::test]
    async fn equal_precedence_overwrites_in_place() {
        let pool = setup_pool().await;
        let repo = SqlCostRepository::new(pool.clone());

        repo.upsert_batch("shop-1", vec![cost("v-1", Decimal::new(450, 2), CostSource::Imported)])
            .await
            .expect("first import");
        repo.upsert_batch("shop-1", vec![cost("v-1", Decimal::new(475, 2), CostSource::Imported)])
            .await
            .expect("second import");

        let lookup = repo.lookup("shop-1").await.expect("lookup");
        assert_eq!(lookup.unit_cost("v-1"), Some(Decimal::new(475, 2)));

        pool.close().await;
    }
}
