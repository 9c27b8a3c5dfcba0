use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use marginscout_core::calibration::{BucketStats, ConfidenceStats};
use marginscout_core::domain::decision::{Confidence, RuleKind};
use marginscout_core::domain::outcome::{DecisionOutcome, MetricsSnapshot, OutcomeClass};

use super::decision::parse_rfc3339;
use super::{OutcomeRepository, RepositoryError};
use crate::DbPool;

pub struct SqlOutcomeRepository {
    pool: DbPool,
}

impl SqlOutcomeRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OutcomeRepository for SqlOutcomeRepository {
    async fn seed(&self, outcome: &DecisionOutcome) -> Result<(), RepositoryError> {
        let baseline = serde_json::to_string(&outcome.baseline)
            .map_err(|err| RepositoryError::Decode(format!("encode baseline: {err}")))?;

        sqlx::query(
            r#"
            INSERT INTO decision_outcomes (
                decision_id, merchant_id, rule, confidence, baseline,
                post, classification, window_days, created_at, evaluated_at
            ) VALUES (?, ?, ?, ?, ?, NULL, NULL, ?, ?, NULL)
            ON CONFLICT(decision_id) DO NOTHING
            "#,
        )
        .bind(&outcome.decision_id)
        .bind(&outcome.merchant_id)
        .bind(outcome.rule.as_str())
        .bind(outcome.confidence.as_str())
        .bind(baseline)
        .bind(outcome.window_days)
        .bind(outcome.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_decision(
        &self,
        decision_id: &str,
    ) -> Result<Option<DecisionOutcome>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT
                decision_id, merchant_id, rule, confidence, baseline,
                post, classification, window_days, created_at, evaluated_at
            FROM decision_outcomes
            WHERE decision_id = ?
            "#,
        )
        .bind(decision_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|value| outcome_from_row(&value)).transpose()
    }

    async fn list_pending(
        &self,
        merchant_id: &str,
    ) -> Result<Vec<DecisionOutcome>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT
                decision_id, merchant_id, rule, confidence, baseline,
                post, classification, window_days, created_at, evaluated_at
            FROM decision_outcomes
            WHERE merchant_id = ? AND evaluated_at IS NULL
            ORDER BY created_at ASC, decision_id ASC
            "#,
        )
        .bind(merchant_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(outcome_from_row).collect()
    }

    async fn record_evaluation(
        &self,
        decision_id: &str,
        post: &MetricsSnapshot,
        classification: OutcomeClass,
        evaluated_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let post = serde_json::to_string(post)
            .map_err(|err| RepositoryError::Decode(format!("encode post snapshot: {err}")))?;

        // The guard makes the first evaluation stick; repeat calls
        // touch nothing.
        let result = sqlx::query(
            r#"
            UPDATE decision_outcomes
            SET post = ?, classification = ?, evaluated_at = ?
            WHERE decision_id = ? AND evaluated_at IS NULL
            "#,
        )
        .bind(post)
        .bind(classification.as_str())
        .bind(evaluated_at.to_rfc3339())
        .bind(decision_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn confidence_stats(
        &self,
        merchant_id: &str,
    ) -> Result<ConfidenceStats, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT
                rule,
                confidence,
                COUNT(*) AS evaluated,
                SUM(CASE WHEN classification = 'improved' THEN 1 ELSE 0 END) AS improved
            FROM decision_outcomes
            WHERE merchant_id = ? AND evaluated_at IS NOT NULL
            GROUP BY rule, confidence
            "#,
        )
        .bind(merchant_id)
        .fetch_all(&self.pool)
        .await?;

        let mut stats = ConfidenceStats::new();
        for row in &rows {
            let rule_raw: String = row.try_get("rule")?;
            let rule = RuleKind::from_str(&rule_raw)
                .map_err(|err| RepositoryError::Decode(format!("invalid outcome rule: {err}")))?;
            let confidence_raw: String = row.try_get("confidence")?;
            let confidence = Confidence::from_str(&confidence_raw).map_err(|err| {
                RepositoryError::Decode(format!("invalid outcome confidence: {err}"))
            })?;
            let evaluated: i64 = row.try_get("evaluated")?;
            let improved: i64 = row.try_get("improved")?;

            stats.set_bucket(
                rule,
                confidence,
                BucketStats { evaluated: evaluated as u32, improved: improved as u32 },
            );
        }

        Ok(stats)
    }
}

fn outcome_from_row(row: &SqliteRow) -> Result<DecisionOutcome, RepositoryError> {
    let rule_raw: String = row.try_get("rule")?;
    let rule = RuleKind::from_str(&rule_raw)
        .map_err(|err| RepositoryError::Decode(format!("invalid outcome rule: {err}")))?;
    let confidence_raw: String = row.try_get("confidence")?;
    let confidence = Confidence::from_str(&confidence_raw)
        .map_err(|err| RepositoryError::Decode(format!("invalid outcome confidence: {err}")))?;

    let baseline_raw: String = row.try_get("baseline")?;
    let baseline: MetricsSnapshot = serde_json::from_str(&baseline_raw)
        .map_err(|err| RepositoryError::Decode(format!("invalid baseline snapshot: {err}")))?;
    let post = row
        .try_get::<Option<String>, _>("post")?
        .as_deref()
        .map(serde_json::from_str::<MetricsSnapshot>)
        .transpose()
        .map_err(|err| RepositoryError::Decode(format!("invalid post snapshot: {err}")))?;
    let classification = row
        .try_get::<Option<String>, _>("classification")?
        .as_deref()
        .map(OutcomeClass::from_str)
        .transpose()
        .map_err(|err| RepositoryError::Decode(format!("invalid outcome class: {err}")))?;
    let evaluated_at = row
        .try_get::<Option<String>, _>("evaluated_at")?
        .as_deref()
        .map(|ts| parse_rfc3339("outcome evaluated_at", ts))
        .transpose()?;

    Ok(DecisionOutcome {
        decision_id: row.try_get("decision_id")?,
        merchant_id: row.try_get("merchant_id")?,
        rule,
        confidence,
        baseline,
        post,
        classification,
        window_days: row.try_get::<i64, _>("window_days")? as u32,
        created_at: parse_rfc3339("outcome created_at", &row.try_get::<String, _>("created_at")?)?,
        evaluated_at,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use marginscout_core::domain::decision::{Confidence, RuleKind};
    use marginscout_core::domain::outcome::{DecisionOutcome, MetricsSnapshot, OutcomeClass};

    use super::{OutcomeRepository, SqlOutcomeRepository};
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    async fn insert_decision(pool: &DbPool, id: &str) {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO decision_runs (id, merchant_id, created_at, order_count, window_days)
             VALUES ('run-1', 'shop-1', ?, 35, 90)
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(&now)
        .execute(pool)
        .await
        .expect("insert run fixture");

        sqlx::query(
            "INSERT INTO decisions (
                id, merchant_id, run_id, rule, decision_key, status,
                headline, action, reason, impact, confidence, base_confidence, evidence,
                created_at
             ) VALUES (?, 'shop-1', 'run-1', 'best_seller_loss', ?, 'done',
                'h', 'a', 'r', '13.33', 'high', 'high', '{}', ?)",
        )
        .bind(id)
        .bind(format!("best_seller_loss:{id}"))
        .bind(&now)
        .execute(pool)
        .await
        .expect("insert decision fixture");
    }

    fn outcome(decision_id: &str) -> DecisionOutcome {
        DecisionOutcome {
            decision_id: decision_id.to_string(),
            merchant_id: "shop-1".to_string(),
            rule: RuleKind::BestSellerLoss,
            confidence: Confidence::Medium,
            baseline: MetricsSnapshot {
                profit_per_order: Decimal::new(-26, 2),
                refund_rate_pct: 12.0,
                shipping_loss_per_order: Decimal::new(110, 2),
            },
            post: None,
            classification: None,
            window_days: 30,
            created_at: Utc::now() - Duration::days(31),
            evaluated_at: None,
        }
    }

    fn post() -> MetricsSnapshot {
        MetricsSnapshot {
            profit_per_order: Decimal::new(18, 2),
            refund_rate_pct: 6.0,
            shipping_loss_per_order: Decimal::new(60, 2),
        }
    }

    #[tokio::test]
    async fn seed_is_idempotent() {
        let pool = setup_pool().await;
        insert_decision(&pool, "dec-1").await;
        let repo = SqlOutcomeRepository::new(pool.clone());

        let first = outcome("dec-1");
        repo.seed(&first).await.expect("first seed");

        let mut replay = first.clone();
        replay.confidence = Confidence::Low;
        repo.seed(&replay).await.expect("replayed seed");

        let stored = repo.find_by_decision("dec-1").await.expect("find").expect("exists");
        assert_eq!(stored.confidence, Confidence::Medium);
        assert_eq!(stored.baseline, first.baseline);

        pool.close().await;
    }

    #[tokio::test]
    async fn evaluation_is_recorded_at_most_once() {
        let pool = setup_pool().await;
        insert_decision(&pool, "dec-1").await;
        let repo = SqlOutcomeRepository::new(pool.clone());
        repo.seed(&outcome("dec-1")).await.expect("seed");

        let updated = repo
            .record_evaluation("dec-1", &post(), OutcomeClass::Improved, Utc::now())
            .await
            .expect("first evaluation");
        assert!(updated);

        let replayed = repo
            .record_evaluation("dec-1", &post(), OutcomeClass::Worsened, Utc::now())
            .await
            .expect("second evaluation");
        assert!(!replayed);

        let stored = repo.find_by_decision("dec-1").await.expect("find").expect("exists");
        assert_eq!(stored.classification, Some(OutcomeClass::Improved));
        assert!(repo.list_pending("shop-1").await.expect("pending").is_empty());

        pool.close().await;
    }

    #[tokio::test]
    async fn confidence_stats_group_by_rule_and_confidence() {
        let pool = setup_pool().await;
        let repo = SqlOutcomeRepository::new(pool.clone());

        for (id, class) in [
            ("dec-1", OutcomeClass::Improved),
            ("dec-2", OutcomeClass::Improved),
            ("dec-3", OutcomeClass::Worsened),
        ] {
            insert_decision(&pool, id).await;
            repo.seed(&outcome(id)).await.expect("seed");
            repo.record_evaluation(id, &post(), class, Utc::now()).await.expect("evaluate");
        }

        let stats = repo.confidence_stats("shop-1").await.expect("stats");
        let bucket = stats
            .bucket(RuleKind::BestSellerLoss, Confidence::Medium)
            .expect("bucket exists");
        assert_eq!(bucket.evaluated, 3);
        assert_eq!(bucket.improved, 2);
        assert!(stats.bucket(RuleKind::ShippingThreshold, Confidence::High).is_none());

        pool.close().await;
    }
}
