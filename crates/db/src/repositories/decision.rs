use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};

use marginscout_core::domain::decision::{
    CalibrationNote, Confidence, DecisionKey, DecisionRecord, DecisionStatus, Evidence, RuleKind,
};
use marginscout_core::engine::RunPlan;

use super::{DecisionRepository, RepositoryError};
use crate::DbPool;

pub struct SqlDecisionRepository {
    pool: DbPool,
}

impl SqlDecisionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DecisionRepository for SqlDecisionRepository {
    async fn persist_run(&self, plan: &RunPlan) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO decision_runs (id, merchant_id, created_at, order_count, window_days)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&plan.run.id)
        .bind(&plan.run.merchant_id)
        .bind(plan.run.created_at.to_rfc3339())
        .bind(plan.run.order_count)
        .bind(plan.run.window_days)
        .execute(&mut *tx)
        .await?;

        // The new active set replaces the previous one; still-open
        // actives from earlier runs close out as done.
        sqlx::query(
            r#"
            UPDATE decisions
            SET status = 'done', completed_at = ?
            WHERE merchant_id = ? AND status = 'active'
            "#,
        )
        .bind(plan.run.created_at.to_rfc3339())
        .bind(&plan.run.merchant_id)
        .execute(&mut *tx)
        .await?;

        for record in &plan.records {
            let evidence = serde_json::to_string(&record.evidence)
                .map_err(|err| RepositoryError::Decode(format!("encode evidence: {err}")))?;
            let calibration = record
                .calibration
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .map_err(|err| RepositoryError::Decode(format!("encode calibration: {err}")))?;

            sqlx::query(
                r#"
                INSERT INTO decisions (
                    id, merchant_id, run_id, rule, decision_key, status,
                    headline, action, reason, impact, confidence, base_confidence, evidence,
                    context, calibration, created_at, completed_at, ignored_at, resurfaced_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.id)
            .bind(&record.merchant_id)
            .bind(&record.run_id)
            .bind(record.rule.as_str())
            .bind(record.key.to_string())
            .bind(record.status.as_str())
            .bind(&record.headline)
            .bind(&record.action)
            .bind(&record.reason)
            .bind(record.impact.to_string())
            .bind(record.confidence.as_str())
            .bind(record.base_confidence.as_str())
            .bind(evidence)
            .bind(record.context.as_deref())
            .bind(calibration)
            .bind(record.created_at.to_rfc3339())
            .bind(record.completed_at.map(|ts| ts.to_rfc3339()))
            .bind(record.ignored_at.map(|ts| ts.to_rfc3339()))
            .bind(record.resurfaced_at.map(|ts| ts.to_rfc3339()))
            .execute(&mut *tx)
            .await?;
        }

        if let Some(resurfaced_id) = &plan.resurfaced_decision_id {
            sqlx::query(
                r#"
                UPDATE decisions
                SET resurfaced_at = ?
                WHERE id = ? AND status = 'ignored' AND resurfaced_at IS NULL
                "#,
            )
            .bind(plan.run.created_at.to_rfc3339())
            .bind(resurfaced_id)
            .execute(&mut *tx)
            .await?;
        }

        // Merchant run-to-run state lands in the same transaction, so a
        // run either persists whole or not at all.
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
        .bind(&plan.settings.merchant_id)
        .bind(plan.settings.shipping_cost.to_string())
        .bind(plan.settings.min_impact.to_string())
        .bind(&plan.settings.currency)
        .bind(plan.settings.order_count)
        .bind(plan.settings.last_run_at.map(|ts| ts.to_rfc3339()))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<DecisionRecord>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT
                id, merchant_id, run_id, rule, decision_key, status,
                headline, action, reason, impact, confidence, base_confidence, evidence,
                context, calibration, created_at, completed_at, ignored_at, resurfaced_at
            FROM decisions
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|value| decision_from_row(&value)).transpose()
    }

    async fn list_active(
        &self,
        merchant_id: &str,
    ) -> Result<Vec<DecisionRecord>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT
                id, merchant_id, run_id, rule, decision_key, status,
                headline, action, reason, impact, confidence, base_confidence, evidence,
                context, calibration, created_at, completed_at, ignored_at, resurfaced_at
            FROM decisions
            WHERE merchant_id = ? AND status = 'active'
            ORDER BY CAST(impact AS REAL) DESC, decision_key ASC
            "#,
        )
        .bind(merchant_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(decision_from_row).collect()
    }

    async fn list_ignored_unresurfaced(
        &self,
        merchant_id: &str,
    ) -> Result<Vec<DecisionRecord>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT
                id, merchant_id, run_id, rule, decision_key, status,
                headline, action, reason, impact, confidence, base_confidence, evidence,
                context, calibration, created_at, completed_at, ignored_at, resurfaced_at
            FROM decisions
            WHERE merchant_id = ? AND status = 'ignored' AND resurfaced_at IS NULL
            ORDER BY ignored_at DESC, id ASC
            "#,
        )
        .bind(merchant_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(decision_from_row).collect()
    }

    async fn save(&self, record: &DecisionRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE decisions
            SET status = ?, completed_at = ?, ignored_at = ?, resurfaced_at = ?
            WHERE id = ?
            "#,
        )
        .bind(record.status.as_str())
        .bind(record.completed_at.map(|ts| ts.to_rfc3339()))
        .bind(record.ignored_at.map(|ts| ts.to_rfc3339()))
        .bind(record.resurfaced_at.map(|ts| ts.to_rfc3339()))
        .bind(&record.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn decision_from_row(row: &SqliteRow) -> Result<DecisionRecord, RepositoryError> {
    let rule_raw: String = row.try_get("rule")?;
    let rule = RuleKind::from_str(&rule_raw)
        .map_err(|err| RepositoryError::Decode(format!("invalid decision rule: {err}")))?;
    let key_raw: String = row.try_get("decision_key")?;
    let key = DecisionKey::from_str(&key_raw)
        .map_err(|err| RepositoryError::Decode(format!("invalid decision key: {err}")))?;
    let status_raw: String = row.try_get("status")?;
    let status = DecisionStatus::from_str(&status_raw)
        .map_err(|err| RepositoryError::Decode(format!("invalid decision status: {err}")))?;
    let confidence_raw: String = row.try_get("confidence")?;
    let confidence = Confidence::from_str(&confidence_raw)
        .map_err(|err| RepositoryError::Decode(format!("invalid decision confidence: {err}")))?;
    let base_confidence_raw: String = row.try_get("base_confidence")?;
    let base_confidence = Confidence::from_str(&base_confidence_raw)
        .map_err(|err| RepositoryError::Decode(format!("invalid base confidence: {err}")))?;

    let evidence_raw: String = row.try_get("evidence")?;
    let evidence: Evidence = serde_json::from_str(&evidence_raw)
        .map_err(|err| RepositoryError::Decode(format!("invalid decision evidence: {err}")))?;
    let calibration = row
        .try_get::<Option<String>, _>("calibration")?
        .as_deref()
        .map(serde_json::from_str::<CalibrationNote>)
        .transpose()
        .map_err(|err| RepositoryError::Decode(format!("invalid calibration note: {err}")))?;

    Ok(DecisionRecord {
        id: row.try_get("id")?,
        merchant_id: row.try_get("merchant_id")?,
        run_id: row.try_get("run_id")?,
        rule,
        key,
        status,
        headline: row.try_get("headline")?,
        action: row.try_get("action")?,
        reason: row.try_get("reason")?,
        impact: parse_decimal("decision impact", &row.try_get::<String, _>("impact")?)?,
        confidence,
        base_confidence,
        evidence,
        context: row.try_get("context")?,
        calibration,
        created_at: parse_rfc3339("decision created_at", &row.try_get::<String, _>("created_at")?)?,
        completed_at: parse_optional_ts(row, "completed_at")?,
        ignored_at: parse_optional_ts(row, "ignored_at")?,
        resurfaced_at: parse_optional_ts(row, "resurfaced_at")?,
    })
}

pub(crate) fn parse_decimal(field: &str, value: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(value).map_err(|err| {
        RepositoryError::Decode(format!("invalid {} amount '{}': {}", field, value, err))
    })
}

pub(crate) fn parse_rfc3339(field: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value).map(|ts| ts.with_timezone(&Utc)).map_err(|err| {
        RepositoryError::Decode(format!("invalid {} timestamp '{}': {}", field, value, err))
    })
}

fn parse_optional_ts(
    row: &SqliteRow,
    column: &str,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    row.try_get::<Option<String>, _>(column)?
        .as_deref()
        .map(|ts| parse_rfc3339(column, ts))
        .transpose()
}
