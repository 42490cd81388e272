//! In-process stores.
//!
//! Same contracts as the Postgres repositories, kept in `tokio` locks. Used by
//! tests and local runs without a database. Ledger writes for one user are
//! serialized by that user's own mutex, so different users never contend.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, RwLock};

use spoti_boost_core::{
    Amount, Email, PaymentOrderId, PaymentStatus, TransactionId, TransactionKind, UserId,
};

use super::{
    CreditOutcome, Ledger, LedgerError, PaymentBinStore, RepositoryError, StoreError, UserDirectory,
};
use crate::models::{
    NewPaymentRecord, PaymentRecord, PaymentUpdate, Transaction, UserAccount, payment_bin_ttl,
};

/// In-memory [`PaymentBinStore`] with the same expiry rule as Postgres.
#[derive(Clone)]
pub struct MemoryPaymentBins {
    records: Arc<RwLock<HashMap<PaymentOrderId, PaymentRecord>>>,
    ttl: Duration,
}

impl Default for MemoryPaymentBins {
    fn default() -> Self {
        Self::with_ttl(payment_bin_ttl())
    }
}

impl MemoryPaymentBins {
    /// Creates an empty store with the standard 24 hour lifetime.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store whose records expire after `ttl`.
    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Number of stored rows, expired ones included.
    pub async fn stored_count(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl PaymentBinStore for MemoryPaymentBins {
    async fn create(&self, record: NewPaymentRecord) -> Result<PaymentRecord, StoreError> {
        let now = Utc::now();
        let mut records = self.records.write().await;

        if records
            .get(&record.order_id)
            .is_some_and(|existing| !existing.is_expired_at(now, self.ttl))
        {
            return Err(StoreError::DuplicateOrder(record.order_id));
        }

        let stored = PaymentRecord {
            order_id: record.order_id.clone(),
            email: record.email,
            phone: record.phone,
            status: PaymentStatus::Pending,
            reference: None,
            metadata: record.metadata,
            created_at: now,
            updated_at: now,
        };
        records.insert(record.order_id, stored.clone());
        Ok(stored)
    }

    async fn find_by_order_id(
        &self,
        order_id: &PaymentOrderId,
    ) -> Result<Option<PaymentRecord>, RepositoryError> {
        let now = Utc::now();
        let records = self.records.read().await;
        Ok(records
            .get(order_id)
            .filter(|record| !record.is_expired_at(now, self.ttl))
            .cloned())
    }

    async fn update(
        &self,
        order_id: &PaymentOrderId,
        update: PaymentUpdate,
    ) -> Result<Option<PaymentRecord>, RepositoryError> {
        let now = Utc::now();
        let mut records = self.records.write().await;
        let Some(record) = records
            .get_mut(order_id)
            .filter(|record| !record.is_expired_at(now, self.ttl))
        else {
            return Ok(None);
        };

        if let Some(status) = update.status {
            record.status = status;
        }
        if let Some(reference) = update.reference {
            record.reference = Some(reference);
        }
        record.updated_at = now;
        Ok(Some(record.clone()))
    }

    async fn discard_pending(&self, order_id: &PaymentOrderId) -> Result<bool, RepositoryError> {
        let mut records = self.records.write().await;
        let pending = records
            .get(order_id)
            .is_some_and(|record| record.status == PaymentStatus::Pending);
        if pending {
            records.remove(order_id);
        }
        Ok(pending)
    }

    async fn purge_expired(&self) -> Result<u64, RepositoryError> {
        let now = Utc::now();
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, record| !record.is_expired_at(now, self.ttl));
        Ok(u64::try_from(before - records.len()).unwrap_or(u64::MAX))
    }
}

struct Account {
    user: UserAccount,
    entries: Vec<Transaction>,
}

#[derive(Default)]
struct Directory {
    by_id: HashMap<UserId, Arc<Mutex<Account>>>,
    by_email: HashMap<Email, UserId>,
    last_id: i32,
}

/// In-memory [`Ledger`] that also serves as the [`UserDirectory`].
#[derive(Clone, Default)]
pub struct MemoryLedger {
    directory: Arc<RwLock<Directory>>,
    last_transaction_id: Arc<AtomicI32>,
}

impl MemoryLedger {
    /// Creates an empty ledger with no accounts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account with an opening balance.
    ///
    /// Re-registering an email replaces nothing and returns the existing
    /// account.
    pub async fn insert_user(&self, email: Email, name: &str, balance: Decimal) -> UserAccount {
        let mut directory = self.directory.write().await;
        if let Some(account) = directory
            .by_email
            .get(&email)
            .and_then(|id| directory.by_id.get(id))
        {
            return account.lock().await.user.clone();
        }

        directory.last_id += 1;
        let user = UserAccount {
            id: UserId::new(directory.last_id),
            email: email.clone(),
            name: name.to_owned(),
            balance,
            created_at: Utc::now(),
        };
        directory.by_email.insert(email, user.id);
        directory.by_id.insert(
            user.id,
            Arc::new(Mutex::new(Account {
                user: user.clone(),
                entries: Vec::new(),
            })),
        );
        user
    }

    async fn account(&self, user_id: UserId) -> Result<Arc<Mutex<Account>>, LedgerError> {
        self.directory
            .read()
            .await
            .by_id
            .get(&user_id)
            .cloned()
            .ok_or(LedgerError::UserNotFound(user_id))
    }

    fn record(
        &self,
        account: &mut Account,
        kind: TransactionKind,
        amount: Amount,
        reference: &str,
        idempotency_key: Option<&str>,
    ) -> Transaction {
        account.user.balance = match kind {
            TransactionKind::Credit => account.user.balance + amount.value(),
            TransactionKind::Debit => account.user.balance - amount.value(),
        };

        let id = self.last_transaction_id.fetch_add(1, Ordering::Relaxed) + 1;
        let entry = Transaction {
            id: TransactionId::new(id),
            user_id: account.user.id,
            kind,
            amount,
            balance_after: account.user.balance,
            reference: Some(reference.to_owned()),
            idempotency_key: idempotency_key.map(str::to_owned),
            created_at: Utc::now(),
        };
        account.entries.push(entry.clone());
        entry
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn credit(
        &self,
        user_id: UserId,
        amount: Amount,
        reference: &str,
    ) -> Result<Transaction, LedgerError> {
        let account = self.account(user_id).await?;
        let mut account = account.lock().await;
        Ok(self.record(&mut account, TransactionKind::Credit, amount, reference, None))
    }

    async fn credit_once(
        &self,
        user_id: UserId,
        amount: Amount,
        reference: &str,
        idempotency_key: &str,
    ) -> Result<CreditOutcome, LedgerError> {
        let account = self.account(user_id).await?;
        let mut account = account.lock().await;

        if account
            .entries
            .iter()
            .any(|entry| entry.idempotency_key.as_deref() == Some(idempotency_key))
        {
            return Ok(CreditOutcome::Duplicate);
        }

        Ok(CreditOutcome::Applied(self.record(
            &mut account,
            TransactionKind::Credit,
            amount,
            reference,
            Some(idempotency_key),
        )))
    }

    async fn debit(
        &self,
        user_id: UserId,
        amount: Amount,
        reference: &str,
    ) -> Result<Transaction, LedgerError> {
        let account = self.account(user_id).await?;
        let mut account = account.lock().await;

        if amount.value() > account.user.balance {
            return Err(LedgerError::InsufficientFunds {
                balance: account.user.balance,
                requested: amount,
            });
        }

        Ok(self.record(&mut account, TransactionKind::Debit, amount, reference, None))
    }

    async fn balance(&self, user_id: UserId) -> Result<Decimal, LedgerError> {
        let account = self.account(user_id).await?;
        let balance = account.lock().await.user.balance;
        Ok(balance)
    }

    async fn recent_transactions(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<Transaction>, LedgerError> {
        let account = self.account(user_id).await?;
        let account = account.lock().await;
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(account.entries.iter().rev().take(limit).cloned().collect())
    }
}

#[async_trait]
impl UserDirectory for MemoryLedger {
    async fn find_by_email(&self, email: &Email) -> Result<Option<UserAccount>, RepositoryError> {
        let account = {
            let directory = self.directory.read().await;
            directory
                .by_email
                .get(email)
                .and_then(|id| directory.by_id.get(id))
                .cloned()
        };

        match account {
            Some(account) => Ok(Some(account.lock().await.user.clone())),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;
    use spoti_boost_core::Msisdn;

    use super::*;

    fn order(id: &str) -> PaymentOrderId {
        PaymentOrderId::from_external(id).unwrap()
    }

    fn new_record(id: &str) -> NewPaymentRecord {
        NewPaymentRecord {
            order_id: order(id),
            email: Email::parse("buyer@example.com").unwrap(),
            phone: Msisdn::from_trusted("+255712345678".to_owned()),
            metadata: json!({"gateway": "ZenoPay", "amount": "1000"}),
        }
    }

    fn amount(value: i64) -> Amount {
        Amount::new(Decimal::from(value)).unwrap()
    }

    #[tokio::test]
    async fn test_create_starts_pending_and_rejects_duplicates() {
        let bins = MemoryPaymentBins::new();
        let record = bins.create(new_record("SPOTIORD-A-1")).await.unwrap();
        assert_eq!(record.status, PaymentStatus::Pending);
        assert!(record.reference.is_none());

        let err = bins.create(new_record("SPOTIORD-A-1")).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateOrder(id) if id.as_str() == "SPOTIORD-A-1"));
    }

    #[tokio::test]
    async fn test_update_keeps_unspecified_fields() {
        let bins = MemoryPaymentBins::new();
        bins.create(new_record("SPOTIORD-A-2")).await.unwrap();

        let updated = bins
            .update(
                &order("SPOTIORD-A-2"),
                PaymentUpdate {
                    status: None,
                    reference: Some("REF1".to_owned()),
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, PaymentStatus::Pending);
        assert_eq!(updated.reference.as_deref(), Some("REF1"));

        let updated = bins
            .update(
                &order("SPOTIORD-A-2"),
                PaymentUpdate {
                    status: Some(PaymentStatus::Completed),
                    reference: None,
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, PaymentStatus::Completed);
        assert_eq!(updated.reference.as_deref(), Some("REF1"));
    }

    #[tokio::test]
    async fn test_update_unknown_order_is_none() {
        let bins = MemoryPaymentBins::new();
        let result = bins
            .update(&order("SPOTIORD-NOPE-1"), PaymentUpdate::default())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_expired_records_are_invisible_and_purged() {
        let bins = MemoryPaymentBins::with_ttl(Duration::zero());
        bins.create(new_record("SPOTIORD-A-3")).await.unwrap();

        assert!(
            bins.find_by_order_id(&order("SPOTIORD-A-3"))
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            bins.update(&order("SPOTIORD-A-3"), PaymentUpdate::default())
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(bins.purge_expired().await.unwrap(), 1);
        assert_eq!(bins.stored_count().await, 0);
    }

    #[tokio::test]
    async fn test_purge_keeps_live_records() {
        let bins = MemoryPaymentBins::new();
        bins.create(new_record("SPOTIORD-A-4")).await.unwrap();
        assert_eq!(bins.purge_expired().await.unwrap(), 0);
        assert_eq!(bins.stored_count().await, 1);
    }

    #[tokio::test]
    async fn test_discard_only_removes_pending() {
        let bins = MemoryPaymentBins::new();
        bins.create(new_record("SPOTIORD-A-5")).await.unwrap();
        bins.create(new_record("SPOTIORD-A-6")).await.unwrap();
        bins.update(
            &order("SPOTIORD-A-6"),
            PaymentUpdate {
                status: Some(PaymentStatus::Completed),
                reference: None,
            },
        )
        .await
        .unwrap();

        assert!(bins.discard_pending(&order("SPOTIORD-A-5")).await.unwrap());
        assert!(!bins.discard_pending(&order("SPOTIORD-A-6")).await.unwrap());
        assert!(!bins.discard_pending(&order("SPOTIORD-A-7")).await.unwrap());
        assert_eq!(bins.stored_count().await, 1);
    }

    #[tokio::test]
    async fn test_credit_and_debit_track_balance_after() {
        let ledger = MemoryLedger::new();
        let user = ledger
            .insert_user(Email::parse("a@example.com").unwrap(), "A", Decimal::from(200))
            .await;

        let credit = ledger.credit(user.id, amount(1000), "ZENO:R:1").await.unwrap();
        assert_eq!(credit.balance_after, Decimal::from(1200));
        assert_eq!(credit.kind, TransactionKind::Credit);

        let debit = ledger.debit(user.id, amount(700), "ORDER:1").await.unwrap();
        assert_eq!(debit.balance_after, Decimal::from(500));
        assert_eq!(ledger.balance(user.id).await.unwrap(), Decimal::from(500));

        let recent = ledger.recent_transactions(user.id, 10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, debit.id);
    }

    #[tokio::test]
    async fn test_debit_rejects_overdraft() {
        let ledger = MemoryLedger::new();
        let user = ledger
            .insert_user(Email::parse("b@example.com").unwrap(), "B", Decimal::from(100))
            .await;

        let err = ledger.debit(user.id, amount(101), "ORDER:2").await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert_eq!(ledger.balance(user.id).await.unwrap(), Decimal::from(100));
        assert!(ledger.recent_transactions(user.id, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_credit_once_applies_once() {
        let ledger = MemoryLedger::new();
        let user = ledger
            .insert_user(Email::parse("c@example.com").unwrap(), "C", Decimal::ZERO)
            .await;

        let first = ledger
            .credit_once(user.id, amount(1000), "ZENO:REF1:X", "zenopay:X")
            .await
            .unwrap();
        assert!(matches!(first, CreditOutcome::Applied(_)));

        let second = ledger
            .credit_once(user.id, amount(1000), "ZENO:REF2:X", "zenopay:X")
            .await
            .unwrap();
        assert_eq!(second, CreditOutcome::Duplicate);
        assert_eq!(ledger.balance(user.id).await.unwrap(), Decimal::from(1000));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_credit_once_applies_once() {
        let ledger = MemoryLedger::new();
        let user = ledger
            .insert_user(Email::parse("d@example.com").unwrap(), "D", Decimal::ZERO)
            .await;

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let ledger = ledger.clone();
                tokio::spawn(async move {
                    ledger
                        .credit_once(user.id, amount(500), "ZENO:R:Y", "zenopay:Y")
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut applied = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), CreditOutcome::Applied(_)) {
                applied += 1;
            }
        }

        assert_eq!(applied, 1);
        assert_eq!(ledger.balance(user.id).await.unwrap(), Decimal::from(500));
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let ledger = MemoryLedger::new();
        let err = ledger.balance(UserId::new(99)).await.unwrap_err();
        assert!(matches!(err, LedgerError::UserNotFound(id) if id == UserId::new(99)));
        assert!(
            ledger
                .find_by_email(&Email::parse("nobody@example.com").unwrap())
                .await
                .unwrap()
                .is_none()
        );
    }
}
