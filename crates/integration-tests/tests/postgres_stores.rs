//! Postgres-backed ledger and staging store.
//!
//! These tests require:
//! - A running `PostgreSQL` database reachable via `PANEL_DATABASE_URL`
//!   (falls back to `DATABASE_URL`)
//!
//! Migrations are applied on connect. Every test uses its own account and
//! order ids, so the suite can run against a shared development database.
//!
//! Run with: `cargo test -p spoti-boost-integration-tests -- --ignored`

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use spoti_boost_core::{Amount, Email, Msisdn, PaymentOrderId, PaymentStatus};
use spoti_boost_panel::db::{
    CreditOutcome, Ledger, LedgerError, LedgerRepository, PaymentBinRepository, PaymentBinStore,
    StoreError, UserRepository,
};
use spoti_boost_panel::models::{NewPaymentRecord, PaymentUpdate, UserAccount};

async fn pool() -> PgPool {
    let url = std::env::var("PANEL_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .expect("PANEL_DATABASE_URL or DATABASE_URL must be set");
    let pool = PgPool::connect(&url).await.expect("Failed to connect");
    sqlx::migrate!("../panel/migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");
    pool
}

async fn fresh_user(pool: &PgPool) -> UserAccount {
    let email = Email::parse(&format!("ledger-{}@example.com", Uuid::new_v4().simple())).unwrap();
    UserRepository::new(pool.clone())
        .create(&email, "Ledger Test")
        .await
        .unwrap()
}

fn fresh_order() -> PaymentOrderId {
    PaymentOrderId::from_external(&format!("SPOTIORD-T{}-345678", Uuid::new_v4().simple()))
        .unwrap()
}

fn staged(order_id: &PaymentOrderId) -> NewPaymentRecord {
    NewPaymentRecord {
        order_id: order_id.clone(),
        email: Email::parse("mteja@example.com").unwrap(),
        phone: Msisdn::from_trusted("+255712345678".to_owned()),
        metadata: serde_json::json!({"gateway": "ZenoPay", "amount": "1000"}),
    }
}

fn amount(value: i64) -> Amount {
    Amount::new(Decimal::from(value)).unwrap()
}

async fn age_record(pool: &PgPool, order_id: &PaymentOrderId, hours: i32) {
    sqlx::query(
        "UPDATE panel.payment_bin SET created_at = NOW() - make_interval(hours => $2) WHERE order_id = $1",
    )
    .bind(order_id.as_str())
    .bind(hours)
    .execute(pool)
    .await
    .unwrap();
}

// ============================================================================
// Ledger
// ============================================================================

#[tokio::test]
#[ignore = "Requires database"]
async fn test_concurrent_credit_once_applies_once() {
    let pool = pool().await;
    let user = fresh_user(&pool).await;
    let ledger = Arc::new(LedgerRepository::new(pool.clone()));
    let key = format!("zenopay:{}", fresh_order());

    let attempts: Vec<_> = (0..8)
        .map(|_| {
            let ledger = Arc::clone(&ledger);
            let key = key.clone();
            tokio::spawn(async move {
                ledger
                    .credit_once(user.id, amount(1000), "ZENO:REF1:TEST", &key)
                    .await
            })
        })
        .collect();

    let mut applied = 0;
    for attempt in attempts {
        match attempt.await.unwrap().unwrap() {
            CreditOutcome::Applied(_) => applied += 1,
            CreditOutcome::Duplicate => {}
        }
    }

    assert_eq!(applied, 1);
    assert_eq!(ledger.balance(user.id).await.unwrap(), Decimal::from(1000));
    let entries = ledger.recent_transactions(user.id, 10).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries.first().unwrap().idempotency_key.as_deref(), Some(key.as_str()));
}

#[tokio::test]
#[ignore = "Requires database"]
async fn test_idempotency_key_is_global_across_users() {
    let pool = pool().await;
    let first = fresh_user(&pool).await;
    let second = fresh_user(&pool).await;
    let ledger = LedgerRepository::new(pool.clone());
    let key = format!("zenopay:{}", fresh_order());

    let outcome = ledger
        .credit_once(first.id, amount(500), "ZENO:A", &key)
        .await
        .unwrap();
    assert!(matches!(outcome, CreditOutcome::Applied(_)));

    let outcome = ledger
        .credit_once(second.id, amount(500), "ZENO:B", &key)
        .await
        .unwrap();
    assert_eq!(outcome, CreditOutcome::Duplicate);
    assert_eq!(ledger.balance(second.id).await.unwrap(), Decimal::ZERO);
}

#[tokio::test]
#[ignore = "Requires database"]
async fn test_concurrent_debits_never_overdraw() {
    let pool = pool().await;
    let user = fresh_user(&pool).await;
    let ledger = Arc::new(LedgerRepository::new(pool.clone()));
    ledger.credit(user.id, amount(500), "SEED").await.unwrap();

    let attempts: Vec<_> = (0..10)
        .map(|i| {
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move {
                ledger
                    .debit(user.id, amount(100), &format!("ORDER:{i}"))
                    .await
            })
        })
        .collect();

    let mut succeeded = 0;
    let mut refused = 0;
    for attempt in attempts {
        match attempt.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(LedgerError::InsufficientFunds { .. }) => refused += 1,
            Err(e) => panic!("unexpected ledger error: {e}"),
        }
    }

    assert_eq!((succeeded, refused), (5, 5));
    assert_eq!(ledger.balance(user.id).await.unwrap(), Decimal::ZERO);

    let entries = ledger.recent_transactions(user.id, 20).await.unwrap();
    assert_eq!(entries.len(), 6);
    assert!(entries.iter().all(|entry| entry.balance_after >= Decimal::ZERO));
}

#[tokio::test]
#[ignore = "Requires database"]
async fn test_unknown_user_is_reported() {
    let pool = pool().await;
    let ledger = LedgerRepository::new(pool);
    let missing = spoti_boost_core::UserId::new(i32::MAX);

    assert!(matches!(
        ledger.credit(missing, amount(1), "X").await,
        Err(LedgerError::UserNotFound(id)) if id == missing
    ));
}

// ============================================================================
// Staging store
// ============================================================================

#[tokio::test]
#[ignore = "Requires database"]
async fn test_duplicate_order_is_rejected() {
    let pool = pool().await;
    let bins = PaymentBinRepository::new(pool);
    let order_id = fresh_order();

    let record = bins.create(staged(&order_id)).await.unwrap();
    assert_eq!(record.status, PaymentStatus::Pending);
    assert_eq!(record.requested_amount(), Some("1000"));

    assert!(matches!(
        bins.create(staged(&order_id)).await,
        Err(StoreError::DuplicateOrder(id)) if id == order_id
    ));
}

#[tokio::test]
#[ignore = "Requires database"]
async fn test_update_keeps_fields_left_unset() {
    let pool = pool().await;
    let bins = PaymentBinRepository::new(pool);
    let order_id = fresh_order();
    bins.create(staged(&order_id)).await.unwrap();

    let updated = bins
        .update(
            &order_id,
            PaymentUpdate {
                status: Some(PaymentStatus::Completed),
                reference: Some("0994780437".to_owned()),
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.status, PaymentStatus::Completed);

    let untouched = bins
        .update(&order_id, PaymentUpdate::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(untouched.status, PaymentStatus::Completed);
    assert_eq!(untouched.reference.as_deref(), Some("0994780437"));

    assert!(!bins.discard_pending(&order_id).await.unwrap());
    assert!(bins.find_by_order_id(&order_id).await.unwrap().is_some());
}

#[tokio::test]
#[ignore = "Requires database"]
async fn test_expired_records_are_invisible_and_purged() {
    let pool = pool().await;
    let bins = PaymentBinRepository::new(pool.clone());
    let expired = fresh_order();
    let live = fresh_order();
    bins.create(staged(&expired)).await.unwrap();
    bins.create(staged(&live)).await.unwrap();
    age_record(&pool, &expired, 25).await;
    age_record(&pool, &live, 23).await;

    assert!(bins.find_by_order_id(&expired).await.unwrap().is_none());
    let update = PaymentUpdate {
        status: Some(PaymentStatus::Completed),
        reference: None,
    };
    assert!(bins.update(&expired, update).await.unwrap().is_none());

    assert!(bins.purge_expired().await.unwrap() >= 1);

    let remaining: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM panel.payment_bin WHERE order_id = ANY($1)",
    )
    .bind(vec![expired.as_str().to_owned(), live.as_str().to_owned()])
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(remaining, 1);
    assert!(bins.find_by_order_id(&live).await.unwrap().is_some());
}
