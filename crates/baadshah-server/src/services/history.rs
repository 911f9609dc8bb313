use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::models::{Money, TransactionRecord, TransactionType};
use crate::store::{Page, Persistence};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Credit,
    Debit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Deposit,
    Withdrawal,
    Sent,
    Received,
}

/// One ledger row as seen by a particular user.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub id: String,
    pub kind: EntryKind,
    pub direction: Direction,
    pub label: String,
    pub counterparty: Option<String>,
    pub amount: Money,
    pub description: String,
    pub transaction_type: TransactionType,
    pub created_at: String,
}

/// Derives kind, direction and label for `viewer_id`. Returns `None` for a
/// row the viewer is not party to.
pub fn present(record: &TransactionRecord, viewer_id: &str) -> Option<HistoryEntry> {
    let tx = &record.transaction;
    let (kind, direction, counterparty) = match tx.transaction_type {
        TransactionType::Credit => (EntryKind::Deposit, Direction::Credit, None),
        TransactionType::Debit => (EntryKind::Withdrawal, Direction::Debit, None),
        TransactionType::Transfer if tx.sender_id == viewer_id => (
            EntryKind::Sent,
            Direction::Debit,
            Some(record.receiver_name.clone().unwrap_or_default()),
        ),
        TransactionType::Transfer if tx.receiver_id.as_deref() == Some(viewer_id) => (
            EntryKind::Received,
            Direction::Credit,
            Some(record.sender_name.clone()),
        ),
        TransactionType::Transfer => return None,
    };

    let label = match (kind, &counterparty) {
        (EntryKind::Sent, Some(name)) => format!("To: {name}"),
        (EntryKind::Received, Some(name)) => format!("From: {name}"),
        (EntryKind::Withdrawal, _) => "Withdrawal".to_string(),
        _ => "Deposit".to_string(),
    };

    Some(HistoryEntry {
        id: tx.id.clone(),
        kind,
        direction,
        label,
        counterparty,
        amount: tx.amount,
        description: tx.description.clone(),
        transaction_type: tx.transaction_type,
        created_at: tx.created_at.clone(),
    })
}

/// Everything the user sent or received, newest first.
pub fn history(store: &dyn Persistence, user_id: &str) -> AppResult<Vec<HistoryEntry>> {
    let records = store.list_transactions_for_user(user_id, None)?;
    Ok(records.iter().filter_map(|r| present(r, user_id)).collect())
}

/// One window of `history` plus the user's total row count.
pub fn history_page(
    store: &dyn Persistence,
    user_id: &str,
    page: Page,
) -> AppResult<(Vec<HistoryEntry>, usize)> {
    let total = store.count_transactions_for_user(user_id)?;
    let records = store.list_transactions_for_user(user_id, Some(page))?;
    let entries = records.iter().filter_map(|r| present(r, user_id)).collect();
    Ok((entries, total))
}

/// Statement export of `history`.
/// Columns: Date, Description, Details, Direction, Amount
pub fn statement_csv(store: &dyn Persistence, user_id: &str) -> AppResult<String> {
    let entries = history(store, user_id)?;
    let mut wtr = csv::Writer::from_writer(Vec::new());

    wtr.write_record(["Date", "Description", "Details", "Direction", "Amount"])
        .map_err(|e| AppError::Internal(format!("CSV write error: {e}")))?;

    for entry in &entries {
        let direction = match entry.direction {
            Direction::Credit => "credit",
            Direction::Debit => "debit",
        };
        let amount = entry.amount.display_inr();
        wtr.write_record([
            &entry.created_at[..10.min(entry.created_at.len())],
            entry.label.as_str(),
            entry.description.as_str(),
            direction,
            amount.as_str(),
        ])
        .map_err(|e| AppError::Internal(format!("CSV write error: {e}")))?;
    }

    let data = wtr
        .into_inner()
        .map_err(|e| AppError::Internal(format!("CSV flush error: {e}")))?;

    String::from_utf8(data).map_err(|e| AppError::Internal(format!("CSV encoding error: {e}")))
}
