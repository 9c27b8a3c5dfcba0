//! End-to-end lifecycle over sqlite: run the engine, ignore a finding,
//! watch it resurface once it grows, act on it, and grade the outcome.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use marginscout_core::config::EngineDefaults;
use marginscout_core::domain::cost::{CostSource, VariantCost};
use marginscout_core::domain::decision::{Confidence, DecisionStatus, RuleKind};
use marginscout_core::domain::order::{FinancialStatus, LineItem, OrderRecord};
use marginscout_core::domain::outcome::{DecisionOutcome, MetricsSnapshot, OutcomeClass};
use marginscout_db::repositories::{
    OutcomeRepository, SqlCostRepository, SqlDecisionRepository, SqlOutcomeRepository,
    SqlSettingsRepository,
};
use marginscout_db::{connect_with_settings, migrations, DbPool, DecisionService};

const MERCHANT: &str = "shop-1";

async fn setup() -> (DbPool, DecisionService) {
    let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
        .await
        .expect("connect test pool");
    migrations::run_pending(&pool).await.expect("run migrations");

    let service = DecisionService::new(
        Arc::new(SqlDecisionRepository::new(pool.clone())),
        Arc::new(SqlOutcomeRepository::new(pool.clone())),
        Arc::new(SqlCostRepository::new(pool.clone())),
        Arc::new(SqlSettingsRepository::new(pool.clone())),
        EngineDefaults::default(),
    );
    (pool, service)
}

fn order(id: usize, created_at: DateTime<Utc>) -> OrderRecord {
    let price = Decimal::new(10_000, 2);
    OrderRecord {
        id: format!("ord-{id}"),
        created_at,
        total: price,
        subtotal: price,
        total_discounts: Decimal::ZERO,
        financial_status: FinancialStatus::Paid,
        line_items: vec![LineItem {
            variant_id: "v-1".to_string(),
            sku: "SKU-v-1".to_string(),
            unit_price: price,
            discounted_unit_price: price,
            quantity: 1,
        }],
        refunds: vec![],
    }
}

fn cost(pence: i64) -> VariantCost {
    VariantCost {
        variant_id: "v-1".to_string(),
        unit_cost: Decimal::new(pence, 2),
        source: CostSource::Imported,
        updated_at: Utc::now(),
    }
}

#[tokio::test]
async fn ignored_decision_resurfaces_and_grades_through_the_full_lifecycle() {
    let (pool, service) = setup().await;
    let now = Utc::now();

    // 40 orders of a £100 best seller costing £97.50: £40 lost over the
    // 90-day window, £13.33 a month.
    service.import_costs(MERCHANT, vec![cost(9_750)]).await.expect("import costs");
    let orders: Vec<OrderRecord> = (0..40).map(|i| order(i, now)).collect();

    let first = service
        .run_decision_engine(MERCHANT, &orders, None)
        .await
        .expect("first engine run");
    assert_eq!(first.active.len(), 1);
    let finding = &first.active[0];
    assert_eq!(finding.rule, RuleKind::BestSellerLoss);
    assert_eq!(finding.impact, Decimal::new(1_333, 2));
    assert_eq!(finding.confidence, Confidence::High);

    // The merchant waves it away.
    let ignored = service.mark_ignored(&finding.id).await.expect("ignore");
    assert_eq!(ignored.status, DecisionStatus::Ignored);

    // The loss deepens: £98.50 cost means £26.67 a month, past the 1.5x
    // growth bar, so the ignored finding resurfaces.
    service.import_costs(MERCHANT, vec![cost(9_850)]).await.expect("update costs");
    let second = service
        .run_decision_engine(MERCHANT, &orders, None)
        .await
        .expect("second engine run");
    assert_eq!(second.resurfaced_decision_id.as_deref(), Some(finding.id.as_str()));
    assert_eq!(second.active.len(), 1);
    let resurfaced = &second.active[0];
    assert_eq!(resurfaced.impact, Decimal::new(2_667, 2));

    // Acting on it seeds an outcome baseline from the evidence.
    let done = service.mark_done(&resurfaced.id).await.expect("mark done");
    assert_eq!(done.status, DecisionStatus::Done);

    let outcome_repo = SqlOutcomeRepository::new(pool.clone());
    let seeded = outcome_repo
        .find_by_decision(&done.id)
        .await
        .expect("find outcome")
        .expect("outcome seeded");
    assert!(!seeded.is_evaluated());
    assert_eq!(seeded.window_days, 30);

    // The 30-day window has not elapsed, so grading stays quiet.
    let evaluated = service.evaluate_outcomes(MERCHANT, &orders).await.expect("evaluate early");
    assert_eq!(evaluated, 0);

    pool.close().await;
}

#[tokio::test]
async fn due_outcome_is_graded_against_post_window_orders() {
    let (pool, service) = setup().await;
    let completed_at = Utc::now() - Duration::days(40);

    // Establish a decision whose evidence scopes evaluation to v-1.
    service.import_costs(MERCHANT, vec![cost(9_750)]).await.expect("import costs");
    let run_orders: Vec<OrderRecord> = (0..40).map(|i| order(i, Utc::now())).collect();
    let summary = service
        .run_decision_engine(MERCHANT, &run_orders, None)
        .await
        .expect("engine run");
    let decision_id = summary.active[0].id.clone();

    // Backdated baseline: losing £1 an order with a 12% refund rate.
    let outcome_repo = SqlOutcomeRepository::new(pool.clone());
    outcome_repo
        .seed(&DecisionOutcome {
            decision_id: decision_id.clone(),
            merchant_id: MERCHANT.to_string(),
            rule: RuleKind::BestSellerLoss,
            confidence: Confidence::High,
            baseline: MetricsSnapshot {
                profit_per_order: Decimal::new(-100, 2),
                refund_rate_pct: 12.0,
                shipping_loss_per_order: Decimal::new(350, 2),
            },
            post: None,
            classification: None,
            window_days: 30,
            created_at: completed_at,
            evaluated_at: None,
        })
        .await
        .expect("seed backdated outcome");

    // Post-window economics are healthier: cost dropped to £90, so each
    // order clears £6.50, and no refunds came in.
    service.import_costs(MERCHANT, vec![cost(9_000)]).await.expect("lower costs");
    let post_orders: Vec<OrderRecord> = (0..10)
        .map(|i| order(100 + i, completed_at + Duration::days((i as i64 % 28) + 1)))
        .collect();

    let evaluated =
        service.evaluate_outcomes(MERCHANT, &post_orders).await.expect("evaluate");
    assert_eq!(evaluated, 1);

    let graded = outcome_repo
        .find_by_decision(&decision_id)
        .await
        .expect("find outcome")
        .expect("outcome exists");
    assert_eq!(graded.classification, Some(OutcomeClass::Improved));
    let post = graded.post.expect("post snapshot");
    assert_eq!(post.profit_per_order, Decimal::new(650, 2));
    assert!((post.refund_rate_pct - 0.0).abs() < 1e-9);

    // Grading is final: a second pass records nothing.
    let replay =
        service.evaluate_outcomes(MERCHANT, &post_orders).await.expect("replay evaluate");
    assert_eq!(replay, 0);

    pool.close().await;
}
