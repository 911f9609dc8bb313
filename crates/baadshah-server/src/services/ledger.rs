use serde::Serialize;

use crate::auth::session::SessionStore;
use crate::error::{AppError, AppResult};
use crate::models::{Account, Money, NewTransaction, Session, Transaction, TransactionType};
use crate::store::Persistence;

#[derive(Debug, Serialize)]
pub struct LedgerReceipt {
    pub account: Account,
    pub transaction: Transaction,
}

fn require_positive(amount: Money) -> AppResult<()> {
    if !amount.is_positive() {
        return Err(AppError::InvalidAmount);
    }
    Ok(())
}

/// Reloads the caller's account into the session snapshot.
fn resync(store: &dyn Persistence, sessions: &SessionStore, session: &Session) -> AppResult<Account> {
    let fresh = store
        .find_account_by_user(&session.user.id)?
        .ok_or_else(|| AppError::NotFound("Account not found".into()))?;
    sessions.update_account(&session.token, fresh.clone());
    Ok(fresh)
}

/// Fast reject against the session's balance. A cached miss is rechecked
/// against a fresh read; credits from other parties never reach this
/// snapshot. The store repeats the check atomically either way.
fn require_funds(
    store: &dyn Persistence,
    sessions: &SessionStore,
    session: &Session,
    amount: Money,
) -> AppResult<()> {
    if amount <= session.account.balance {
        return Ok(());
    }
    if amount <= resync(store, sessions, session)?.balance {
        return Ok(());
    }
    Err(AppError::InsufficientBalance)
}

/// Refreshes the snapshot after a store-side `InsufficientBalance`.
fn resync_on_shortfall(
    store: &dyn Persistence,
    sessions: &SessionStore,
    session: &Session,
    err: AppError,
) -> AppError {
    if matches!(err, AppError::InsufficientBalance) {
        if let Err(e) = resync(store, sessions, session) {
            tracing::warn!("Could not resync account for user {}: {e}", session.user.id);
        }
    }
    err
}

fn description(raw: Option<&str>) -> String {
    raw.map(str::trim).unwrap_or_default().to_string()
}

/// Credits the caller's own account.
pub fn deposit(
    store: &dyn Persistence,
    sessions: &SessionStore,
    session: &Session,
    amount: Money,
    note: Option<&str>,
) -> AppResult<LedgerReceipt> {
    require_positive(amount)?;

    let entry = NewTransaction {
        sender_id: session.user.id.clone(),
        receiver_id: Some(session.user.id.clone()),
        amount,
        description: description(note),
        transaction_type: TransactionType::Credit,
    };
    let (account, transaction) = store.post_entry(&session.account.id, amount, entry)?;
    sessions.update_account(&session.token, account.clone());

    tracing::info!(
        "Deposit {} into account {} (tx {})",
        amount,
        account.account_number,
        transaction.id
    );
    Ok(LedgerReceipt { account, transaction })
}

pub fn withdraw(
    store: &dyn Persistence,
    sessions: &SessionStore,
    session: &Session,
    amount: Money,
    note: Option<&str>,
) -> AppResult<LedgerReceipt> {
    require_positive(amount)?;
    require_funds(store, sessions, session, amount)?;

    let entry = NewTransaction {
        sender_id: session.user.id.clone(),
        receiver_id: None,
        amount,
        description: description(note),
        transaction_type: TransactionType::Debit,
    };
    let (account, transaction) = store
        .post_entry(&session.account.id, amount.negate(), entry)
        .map_err(|e| resync_on_shortfall(store, sessions, session, e))?;
    sessions.update_account(&session.token, account.clone());

    tracing::info!(
        "Withdrawal {} from account {} (tx {})",
        amount,
        account.account_number,
        transaction.id
    );
    Ok(LedgerReceipt { account, transaction })
}

/// Sends money to whoever owns `receiver_phone`. Debit, credit and the
/// ledger row are one store call.
pub fn transfer(
    store: &dyn Persistence,
    sessions: &SessionStore,
    session: &Session,
    receiver_phone: &str,
    amount: Money,
    note: Option<&str>,
) -> AppResult<LedgerReceipt> {
    let receiver_phone = receiver_phone.trim();
    if receiver_phone.is_empty() {
        return Err(AppError::BadRequest("Recipient phone number is required".into()));
    }
    require_positive(amount)?;
    if receiver_phone == session.user.phone {
        return Err(AppError::SelfTransferNotAllowed);
    }
    require_funds(store, sessions, session, amount)?;

    let (account, transaction) = store
        .transfer_atomic(&session.user.id, receiver_phone, amount, &description(note))
        .map_err(|e| resync_on_shortfall(store, sessions, session, e))?;
    sessions.update_account(&session.token, account.clone());

    tracing::info!(
        "Transfer {} from account {} to {} (tx {})",
        amount,
        account.account_number,
        receiver_phone,
        transaction.id
    );
    Ok(LedgerReceipt { account, transaction })
}
