use async_trait::async_trait;
use sqlx::Row;

use marginscout_core::config::{EngineDefaults, MerchantSettings};

use super::decision::{parse_decimal, parse_rfc3339};
use super::{RepositoryError, SettingsRepository};
use crate::DbPool;

pub struct SqlSettingsRepository {
    pool: DbPool,
}

impl SqlSettingsRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingsRepository for SqlSettingsRepository {
    async fn get_or_default(
        &self,
        merchant_id: &str,
        defaults: &EngineDefaults,
    ) -> Result<MerchantSettings, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT merchant_id, shipping_cost, min_impact, currency, order_count, last_run_at
            FROM merchant_settings
            WHERE merchant_id = ?
            "#,
        )
        .bind(merchant_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(MerchantSettings::new(merchant_id, defaults));
        };

        let last_run_at = row
            .try_get::<Option<String>, _>("last_run_at")?
            .as_deref()
            .map(|ts| parse_rfc3339("settings last_run_at", ts))
            .transpose()?;

        Ok(MerchantSettings {
            merchant_id: row.try_get("merchant_id")?,
            shipping_cost: parse_decimal(
                "settings shipping_cost",
                &row.try_get::<String, _>("shipping_cost")?,
            )?,
            min_impact: parse_decimal(
                "settings min_impact",
                &row.try_get::<String, _>("min_impact")?,
            )?,
            currency: row.try_get("currency")?,
            order_count: row.try_get::<i64, _>("order_count")? as u32,
            last_run_at,
        })
    }

    async fn save(&self, settings: &MerchantSettings) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO merchant_settings (
                merchant_id, shipping_cost, min_impact, currency, order_count, last_run_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(merchant_id) DO UPDATE SET
                shipping_cost = excluded.shipping_cost,
                min_impact = excluded.min_impact,
                currency = excluded.currency,
                order_count = excluded.order_count,
                last_run_at = excluded.last_run_at
            "#,
        )
        .bind(&settings.merchant_id)
        .bind(settings.shipping_cost.to_string())
        .bind(settings.min_impact.to_string())
        .bind(&settings.currency)
        .bind(settings.order_count)
        .bind(settings.last_run_at.map(|ts| ts.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use marginscout_core::config::EngineDefaults;

    use super::{SettingsRepository, SqlSettingsRepository};
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    #[tokio::test]
    async fn unknown_merchant_gets_defaults() {
        let pool = setup_pool().await;
        let repo = SqlSettingsRepository::new(pool.clone());

        let defaults = EngineDefaults::default();
        let settings = repo.get_or_default("shop-1", &defaults).await.expect("get");
        assert_eq!(settings.merchant_id, "shop-1");
        assert_eq!(settings.shipping_cost, defaults.shipping_cost);
        assert_eq!(settings.min_impact, defaults.min_impact);
        assert_eq!(settings.currency, "GBP");
        assert!(settings.last_run_at.is_none());

        pool.close().await;
    }

    #[tokio::test]
    async fn saved_settings_round_trip() {
        let pool = setup_pool().await;
        let repo = SqlSettingsRepository::new(pool.clone());

        let defaults = EngineDefaults::default();
        let mut settings = repo.get_or_default("shop-1", &defaults).await.expect("get");
        settings.shipping_cost = Decimal::new(425, 2);
        settings.min_impact = Decimal::new(2_000, 2);
        settings.order_count = 57;
        settings.last_run_at = Some(Utc::now());
        repo.save(&settings).await.expect("save");

        let reloaded = repo.get_or_default("shop-1", &defaults).await.expect("reload");
        assert_eq!(reloaded.shipping_cost, Decimal::new(425, 2));
        assert_eq!(reloaded.min_impact, Decimal::new(2_000, 2));
        assert_eq!(reloaded.order_count, 57);
        assert!(reloaded.last_run_at.is_some());

        pool.close().await;
    }
}
