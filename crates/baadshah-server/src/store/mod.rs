//! Persistence capability set for users, accounts and the transaction ledger.
//!
//! Every method that moves money is a single unit in the backend: the
//! balance check, the balance write and the ledger row either all land or
//! none do.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::sync::Arc;

use crate::auth::session::{MemorySessions, SessionRecords, SqliteSessions};
use crate::config::{Config, StorageBackend};
use crate::error::{AppError, AppResult};
use crate::models::{Account, Money, NewTransaction, NewUser, Transaction, TransactionRecord, User};

/// Window over a newest-first listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

/// Balance after applying `delta`. Below zero is `InsufficientBalance`;
/// past `i64` paise is `AmountOutOfRange`.
pub(crate) fn next_balance(balance: Money, delta: Money) -> AppResult<Money> {
    match balance.checked_add(delta) {
        Some(b) if b >= Money::ZERO => Ok(b),
        Some(_) => Err(AppError::InsufficientBalance),
        None => Err(AppError::AmountOutOfRange),
    }
}

pub trait Persistence: Send + Sync {
    fn find_user_by_phone(&self, phone: &str) -> AppResult<Option<User>>;

    fn find_user_by_id(&self, user_id: &str) -> AppResult<Option<User>>;

    fn phone_exists(&self, phone: &str) -> AppResult<bool>;

    /// Creates the user and its account together. Fails with
    /// `PhoneAlreadyRegistered` if the phone is taken, leaving nothing behind.
    fn create_user_with_account(
        &self,
        user: NewUser,
        account_number: &str,
        initial_balance: Money,
    ) -> AppResult<(User, Account)>;

    fn find_account_by_user(&self, user_id: &str) -> AppResult<Option<Account>>;

    /// Writes back the mutable profile fields, PIN hash and phone.
    fn update_user(&self, user: &User) -> AppResult<User>;

    /// Applies `delta` to the balance and appends `entry`. A delta that would
    /// take the balance below zero fails with `InsufficientBalance`.
    fn post_entry(
        &self,
        account_id: &str,
        delta: Money,
        entry: NewTransaction,
    ) -> AppResult<(Account, Transaction)>;

    /// Moves `amount` from the sender's account to the account owned by
    /// `receiver_phone` and appends one transfer row. Returns the sender's
    /// updated account.
    fn transfer_atomic(
        &self,
        sender_id: &str,
        receiver_phone: &str,
        amount: Money,
        description: &str,
    ) -> AppResult<(Account, Transaction)>;

    /// All rows where the user is sender or receiver, newest first.
    fn list_transactions_for_user(
        &self,
        user_id: &str,
        page: Option<Page>,
    ) -> AppResult<Vec<TransactionRecord>>;

    fn count_transactions_for_user(&self, user_id: &str) -> AppResult<usize>;
}

/// Persistence plus the session record backend that lives beside it.
pub struct Backend {
    pub store: Arc<dyn Persistence>,
    pub sessions: Arc<dyn SessionRecords>,
}

pub fn open(config: &Config) -> Backend {
    match config.storage_backend {
        StorageBackend::Sqlite => {
            let pool = crate::db::create_pool(&config.sqlite_path);
            tracing::info!("Database initialized at {}", config.sqlite_path);
            Backend {
                store: Arc::new(SqliteStore::new(pool.clone())),
                sessions: Arc::new(SqliteSessions::new(pool)),
            }
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; all data is lost on restart");
            Backend {
                store: Arc::new(MemoryStore::default()),
                sessions: Arc::new(MemorySessions::default()),
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod conformance;
