//! Account and balance management commands.
//!
//! # Usage
//!
//! ```bash
//! # Create a reseller account
//! spoti-cli user create -e reseller@example.com -n "Reseller Name"
//!
//! # Show balance and recent ledger entries
//! spoti-cli balance show -e reseller@example.com
//!
//! # Manual adjustments (refunds, corrections)
//! spoti-cli balance credit -e reseller@example.com -a 5000 -r "REFUND:ORDER-991"
//! spoti-cli balance debit -e reseller@example.com -a 1200 -r "CORRECTION:2026-10-19"
//! ```

use spoti_boost_core::{Amount, Email};
use spoti_boost_panel::db::{Ledger, LedgerRepository, UserDirectory, UserRepository};
use spoti_boost_panel::models::UserAccount;

use super::{CommandError, connect};

/// Entries printed by `balance show`.
const SHOW_TRANSACTIONS: u32 = 20;

/// Direction of a manual adjustment.
#[derive(Debug, Clone, Copy)]
pub enum Adjustment {
    Credit,
    Debit,
}

fn parse_email(raw: &str) -> Result<Email, CommandError> {
    Email::normalize(raw).map_err(|e| CommandError::InvalidInput("email", e.to_string()))
}

async fn find_user(users: &UserRepository, email: &Email) -> Result<UserAccount, CommandError> {
    users
        .find_by_email(email)
        .await?
        .ok_or_else(|| CommandError::UnknownUser(email.to_string()))
}

/// Create a new account with a zero balance.
///
/// # Errors
///
/// Returns `CommandError` if the email is invalid or already registered.
pub async fn create_user(email: &str, name: &str) -> Result<UserAccount, CommandError> {
    let email = parse_email(email)?;
    let users = UserRepository::new(connect().await?);

    let account = users.create(&email, name.trim()).await?;
    tracing::info!(user_id = %account.id, email = %account.email, "Account created");
    Ok(account)
}

/// Log the balance and latest ledger entries for an account.
///
/// # Errors
///
/// Returns `CommandError` if the account does not exist.
pub async fn show(email: &str) -> Result<(), CommandError> {
    let email = parse_email(email)?;
    let pool = connect().await?;
    let account = find_user(&UserRepository::new(pool.clone()), &email).await?;
    let ledger = LedgerRepository::new(pool);

    let balance = ledger.balance(account.id).await?;
    tracing::info!(user_id = %account.id, email = %account.email, %balance, "Balance");

    for entry in ledger
        .recent_transactions(account.id, SHOW_TRANSACTIONS)
        .await?
    {
        tracing::info!(
            id = %entry.id,
            kind = %entry.kind,
            amount = %entry.amount,
            balance_after = %entry.balance_after,
            reference = entry.reference.as_deref().unwrap_or_default(),
            at = %entry.created_at,
            "Transaction"
        );
    }
    Ok(())
}

/// Apply a manual credit or debit.
///
/// # Errors
///
/// Returns `CommandError` for an invalid amount, an unknown account, or a
/// debit larger than the balance.
pub async fn adjust(
    direction: Adjustment,
    email: &str,
    amount: &str,
    reference: &str,
) -> Result<(), CommandError> {
    let email = parse_email(email)?;
    let amount =
        Amount::parse(amount).map_err(|e| CommandError::InvalidInput("amount", e.to_string()))?;
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(CommandError::InvalidInput(
            "reference",
            "must not be empty".to_owned(),
        ));
    }

    let pool = connect().await?;
    let account = find_user(&UserRepository::new(pool.clone()), &email).await?;
    let ledger = LedgerRepository::new(pool);

    let entry = match direction {
        Adjustment::Credit => ledger.credit(account.id, amount, reference).await?,
        Adjustment::Debit => ledger.debit(account.id, amount, reference).await?,
    };

    tracing::info!(
        user_id = %account.id,
        kind = %entry.kind,
        amount = %entry.amount,
        balance_after = %entry.balance_after,
        "Balance adjusted"
    );
    Ok(())
}
