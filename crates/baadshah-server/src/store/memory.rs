use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use uuid::Uuid;

use crate::db::now_timestamp;
use crate::error::{AppError, AppResult};
use crate::models::{
    Account, Money, NewTransaction, NewUser, Transaction, TransactionRecord, TransactionType, User,
};
use crate::store::{next_balance, Page, Persistence};

#[derive(Default)]
struct Tables {
    users: HashMap<String, User>,
    /// phone -> user id
    phones: HashMap<String, String>,
    /// user id -> account
    accounts: HashMap<String, Account>,
    /// append order is ledger order
    transactions: Vec<Transaction>,
}

impl Tables {
    fn account_mut(&mut self, account_id: &str) -> AppResult<&mut Account> {
        self.accounts
            .values_mut()
            .find(|a| a.id == account_id)
            .ok_or_else(|| AppError::NotFound("Account not found".into()))
    }

    fn full_name(&self, user_id: &str) -> Option<String> {
        self.users.get(user_id).map(|u| u.full_name.clone())
    }
}

fn push_transaction(tables: &mut Tables, entry: NewTransaction, now: &str) -> Transaction {
    let tx = Transaction {
        id: Uuid::new_v4().to_string(),
        sender_id: entry.sender_id,
        receiver_id: entry.receiver_id,
        amount: entry.amount,
        description: entry.description,
        transaction_type: entry.transaction_type,
        created_at: now.to_string(),
    };
    tables.transactions.push(tx.clone());
    tx
}

/// Process-local backend. One lock guards every table, so each call is
/// a single read-check-write unit.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    fn lock(&self) -> AppResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| AppError::Persistence("memory store lock poisoned".into()))
    }
}

impl Persistence for MemoryStore {
    fn find_user_by_phone(&self, phone: &str) -> AppResult<Option<User>> {
        let t = self.lock()?;
        Ok(t.phones.get(phone).and_then(|id| t.users.get(id)).cloned())
    }

    fn find_user_by_id(&self, user_id: &str) -> AppResult<Option<User>> {
        Ok(self.lock()?.users.get(user_id).cloned())
    }

    fn phone_exists(&self, phone: &str) -> AppResult<bool> {
        Ok(self.lock()?.phones.contains_key(phone))
    }

    fn create_user_with_account(
        &self,
        user: NewUser,
        account_number: &str,
        initial_balance: Money,
    ) -> AppResult<(User, Account)> {
        let mut t = self.lock()?;
        if t.phones.contains_key(&user.phone) {
            return Err(AppError::PhoneAlreadyRegistered);
        }
        if initial_balance < Money::ZERO {
            return Err(AppError::InvalidAmount);
        }

        let now = now_timestamp();
        let created = User {
            id: Uuid::new_v4().to_string(),
            phone: user.phone,
            username: user.username,
            full_name: user.full_name,
            age: user.age,
            address: user.address,
            pin_hash: user.pin_hash,
            created_at: now.clone(),
            updated_at: now.clone(),
        };
        let account = Account {
            id: Uuid::new_v4().to_string(),
            user_id: created.id.clone(),
            balance: initial_balance,
            account_number: account_number.to_string(),
            created_at: now.clone(),
            updated_at: now,
        };

        t.phones.insert(created.phone.clone(), created.id.clone());
        t.users.insert(created.id.clone(), created.clone());
        t.accounts.insert(created.id.clone(), account.clone());
        Ok((created, account))
    }

    fn find_account_by_user(&self, user_id: &str) -> AppResult<Option<Account>> {
        Ok(self.lock()?.accounts.get(user_id).cloned())
    }

    fn update_user(&self, user: &User) -> AppResult<User> {
        let mut t = self.lock()?;
        let old_phone = match t.users.get(&user.id) {
            Some(existing) => existing.phone.clone(),
            None => return Err(AppError::NotFound("User not found".into())),
        };

        if old_phone != user.phone {
            if t.phones.contains_key(&user.phone) {
                return Err(AppError::PhoneAlreadyRegistered);
            }
            t.phones.remove(&old_phone);
            t.phones.insert(user.phone.clone(), user.id.clone());
        }

        let updated = User {
            updated_at: now_timestamp(),
            ..user.clone()
        };
        t.users.insert(updated.id.clone(), updated.clone());
        Ok(updated)
    }

    fn post_entry(
        &self,
        account_id: &str,
        delta: Money,
        entry: NewTransaction,
    ) -> AppResult<(Account, Transaction)> {
        let mut t = self.lock()?;
        let now = now_timestamp();

        let account = t.account_mut(account_id)?;
        account.balance = next_balance(account.balance, delta)?;
        account.updated_at = now.clone();
        let account = account.clone();

        let transaction = push_transaction(&mut t, entry, &now);
        Ok((account, transaction))
    }

    fn transfer_atomic(
        &self,
        sender_id: &str,
        receiver_phone: &str,
        amount: Money,
        description: &str,
    ) -> AppResult<(Account, Transaction)> {
        let mut t = self.lock()?;
        let now = now_timestamp();

        let receiver_id = t
            .phones
            .get(receiver_phone)
            .filter(|id| t.accounts.contains_key(*id))
            .cloned()
            .ok_or(AppError::RecipientNotFound)?;
        if receiver_id == sender_id {
            return Err(AppError::SelfTransferNotAllowed);
        }

        let sender_balance = match t.accounts.get(sender_id) {
            Some(a) => next_balance(a.balance, amount.negate())?,
            None => return Err(AppError::NotFound("Account not found".into())),
        };
        let receiver_balance = match t.accounts.get(&receiver_id) {
            Some(a) => next_balance(a.balance, amount)?,
            None => return Err(AppError::RecipientNotFound),
        };

        // Both balances validated above; nothing below can fail.
        if let Some(a) = t.accounts.get_mut(&receiver_id) {
            a.balance = receiver_balance;
            a.updated_at = now.clone();
        }
        let sender_account = match t.accounts.get_mut(sender_id) {
            Some(a) => {
                a.balance = sender_balance;
                a.updated_at = now.clone();
                a.clone()
            }
            None => return Err(AppError::NotFound("Account not found".into())),
        };

        let transaction = push_transaction(
            &mut t,
            NewTransaction {
                sender_id: sender_id.to_string(),
                receiver_id: Some(receiver_id),
                amount,
                description: description.to_string(),
                transaction_type: TransactionType::Transfer,
            },
            &now,
        );
        Ok((sender_account, transaction))
    }

    fn list_transactions_for_user(
        &self,
        user_id: &str,
        page: Option<Page>,
    ) -> AppResult<Vec<TransactionRecord>> {
        let t = self.lock()?;
        let (offset, limit) = page.map_or((0, usize::MAX), |p| (p.offset, p.limit));
        let records = t
            .transactions
            .iter()
            .rev()
            .filter(|tx| tx.sender_id == user_id || tx.receiver_id.as_deref() == Some(user_id))
            .skip(offset)
            .take(limit)
            .map(|tx| TransactionRecord {
                transaction: tx.clone(),
                sender_name: t.full_name(&tx.sender_id).unwrap_or_default(),
                receiver_name: tx.receiver_id.as_deref().and_then(|id| t.full_name(id)),
            })
            .collect();
        Ok(records)
    }

    fn count_transactions_for_user(&self, user_id: &str) -> AppResult<usize> {
        let t = self.lock()?;
        Ok(t
            .transactions
            .iter()
            .filter(|tx| tx.sender_id == user_id || tx.receiver_id.as_deref() == Some(user_id))
            .count())
    }
}
