use rusqlite::{OptionalExtension, TransactionBehavior};
use uuid::Uuid;

use crate::db::{now_timestamp, DbPool};
use crate::error::{AppError, AppResult};
use crate::models::{
    Account, Money, NewTransaction, NewUser, Transaction, TransactionRecord, TransactionType, User,
};
use crate::store::{next_balance, Page, Persistence};

const USER_COLS: &str =
    "id, phone, username, full_name, age, address, pin_hash, created_at, updated_at";
const ACCOUNT_COLS: &str = "id, user_id, balance, account_number, created_at, updated_at";
const TX_COLS: &str =
    "t.id, t.sender_id, t.receiver_id, t.amount, t.description, t.transaction_type, t.created_at";

fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        phone: row.get(1)?,
        username: row.get(2)?,
        full_name: row.get(3)?,
        age: row.get(4)?,
        address: row.get(5)?,
        pin_hash: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn row_to_account(row: &rusqlite::Row) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        user_id: row.get(1)?,
        balance: row.get(2)?,
        account_number: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn row_to_transaction(row: &rusqlite::Row) -> rusqlite::Result<Transaction> {
    let kind: String = row.get(5)?;
    let transaction_type = TransactionType::parse(&kind).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            rusqlite::types::Type::Text,
            format!("unknown transaction_type {kind:?}").into(),
        )
    })?;

    Ok(Transaction {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        amount: row.get(3)?,
        description: row.get(4)?,
        transaction_type,
        created_at: row.get(6)?,
    })
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn load_account(conn: &rusqlite::Connection, account_id: &str) -> AppResult<Account> {
    conn.query_row(
        &format!("SELECT {ACCOUNT_COLS} FROM accounts WHERE id = ?1"),
        rusqlite::params![account_id],
        row_to_account,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => AppError::NotFound("Account not found".into()),
        e => AppError::Database(e),
    })
}

/// Read-check-write of one balance; callers hold an immediate transaction.
/// Arithmetic stays in `i64` since SQLite widens an overflowing
/// `balance + ?` to REAL.
fn apply_delta(
    conn: &rusqlite::Connection,
    account_id: &str,
    delta: Money,
    now: &str,
) -> AppResult<()> {
    let balance: Money = conn
        .query_row(
            "SELECT balance FROM accounts WHERE id = ?1",
            rusqlite::params![account_id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| AppError::NotFound("Account not found".into()))?;

    conn.execute(
        "UPDATE accounts SET balance = ?1, updated_at = ?2 WHERE id = ?3",
        rusqlite::params![next_balance(balance, delta)?, now, account_id],
    )?;
    Ok(())
}

fn insert_transaction(
    conn: &rusqlite::Connection,
    entry: NewTransaction,
    now: &str,
) -> AppResult<Transaction> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO transactions (id, sender_id, receiver_id, amount, description, transaction_type, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            id,
            entry.sender_id,
            entry.receiver_id,
            entry.amount,
            entry.description,
            entry.transaction_type.as_str(),
            now
        ],
    )?;

    Ok(Transaction {
        id,
        sender_id: entry.sender_id,
        receiver_id: entry.receiver_id,
        amount: entry.amount,
        description: entry.description,
        transaction_type: entry.transaction_type,
        created_at: now.to_string(),
    })
}

/// rusqlite + r2d2 backend. Each money movement runs in one
/// `BEGIN IMMEDIATE` transaction so concurrent writers serialize.
#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl Persistence for SqliteStore {
    fn find_user_by_phone(&self, phone: &str) -> AppResult<Option<User>> {
        let conn = self.pool.get()?;
        let user = conn
            .query_row(
                &format!("SELECT {USER_COLS} FROM users WHERE phone = ?1"),
                rusqlite::params![phone],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    fn find_user_by_id(&self, user_id: &str) -> AppResult<Option<User>> {
        let conn = self.pool.get()?;
        let user = conn
            .query_row(
                &format!("SELECT {USER_COLS} FROM users WHERE id = ?1"),
                rusqlite::params![user_id],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    fn phone_exists(&self, phone: &str) -> AppResult<bool> {
        let conn = self.pool.get()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE phone = ?1)",
            rusqlite::params![phone],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn create_user_with_account(
        &self,
        user: NewUser,
        account_number: &str,
        initial_balance: Money,
    ) -> AppResult<(User, Account)> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = now_timestamp();
        let user_id = Uuid::new_v4().to_string();
        let account_id = Uuid::new_v4().to_string();

        let inserted = tx.execute(
            &format!("INSERT INTO users ({USER_COLS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
            rusqlite::params![
                user_id,
                user.phone,
                user.username,
                user.full_name,
                user.age,
                user.address,
                user.pin_hash,
                now,
                now
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(e) if is_constraint_violation(&e) => return Err(AppError::PhoneAlreadyRegistered),
            Err(e) => return Err(AppError::Database(e)),
        }

        tx.execute(
            &format!("INSERT INTO accounts ({ACCOUNT_COLS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
            rusqlite::params![account_id, user_id, initial_balance, account_number, now, now],
        )?;

        tx.commit()?;

        let created = User {
            id: user_id.clone(),
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
            id: account_id,
            user_id,
            balance: initial_balance,
            account_number: account_number.to_string(),
            created_at: now.clone(),
            updated_at: now,
        };
        Ok((created, account))
    }

    fn find_account_by_user(&self, user_id: &str) -> AppResult<Option<Account>> {
        let conn = self.pool.get()?;
        let account = conn
            .query_row(
                &format!("SELECT {ACCOUNT_COLS} FROM accounts WHERE user_id = ?1"),
                rusqlite::params![user_id],
                row_to_account,
            )
            .optional()?;
        Ok(account)
    }

    fn update_user(&self, user: &User) -> AppResult<User> {
        let conn = self.pool.get()?;
        let now = now_timestamp();

        let result = conn.execute(
            "UPDATE users SET phone = ?1, username = ?2, full_name = ?3, age = ?4, address = ?5, pin_hash = ?6, updated_at = ?7 WHERE id = ?8",
            rusqlite::params![
                user.phone,
                user.username,
                user.full_name,
                user.age,
                user.address,
                user.pin_hash,
                now,
                user.id
            ],
        );

        match result {
            Ok(0) => Err(AppError::NotFound("User not found".into())),
            Ok(_) => Ok(User {
                updated_at: now,
                ..user.clone()
            }),
            Err(e) if is_constraint_violation(&e) => Err(AppError::PhoneAlreadyRegistered),
            Err(e) => Err(AppError::Database(e)),
        }
    }

    fn post_entry(
        &self,
        account_id: &str,
        delta: Money,
        entry: NewTransaction,
    ) -> AppResult<(Account, Transaction)> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = now_timestamp();

        apply_delta(&tx, account_id, delta, &now)?;
        let transaction = insert_transaction(&tx, entry, &now)?;
        let account = load_account(&tx, account_id)?;

        tx.commit()?;
        Ok((account, transaction))
    }

    fn transfer_atomic(
        &self,
        sender_id: &str,
        receiver_phone: &str,
        amount: Money,
        description: &str,
    ) -> AppResult<(Account, Transaction)> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = now_timestamp();

        let (receiver_id, receiver_account_id): (String, String) = tx
            .query_row(
                "SELECT u.id, a.id FROM users u JOIN accounts a ON a.user_id = u.id WHERE u.phone = ?1",
                rusqlite::params![receiver_phone],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
            .ok_or(AppError::RecipientNotFound)?;

        if receiver_id == sender_id {
            return Err(AppError::SelfTransferNotAllowed);
        }

        let sender_account_id: String = tx
            .query_row(
                "SELECT id FROM accounts WHERE user_id = ?1",
                rusqlite::params![sender_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| AppError::NotFound("Account not found".into()))?;

        apply_delta(&tx, &sender_account_id, amount.negate(), &now)?;
        apply_delta(&tx, &receiver_account_id, amount, &now)?;

        let transaction = insert_transaction(
            &tx,
            NewTransaction {
                sender_id: sender_id.to_string(),
                receiver_id: Some(receiver_id),
                amount,
                description: description.to_string(),
                transaction_type: TransactionType::Transfer,
            },
            &now,
        )?;
        let account = load_account(&tx, &sender_account_id)?;

        tx.commit()?;
        Ok((account, transaction))
    }

    fn list_transactions_for_user(
        &self,
        user_id: &str,
        page: Option<Page>,
    ) -> AppResult<Vec<TransactionRecord>> {
        let conn = self.pool.get()?;
        // LIMIT -1 is unbounded in SQLite
        let (limit, offset) = page.map_or((-1i64, 0i64), |p| {
            (
                i64::try_from(p.limit).unwrap_or(i64::MAX),
                i64::try_from(p.offset).unwrap_or(i64::MAX),
            )
        });

        let mut stmt = conn.prepare(&format!(
            "SELECT {TX_COLS}, s.full_name, r.full_name
             FROM transactions t
             JOIN users s ON s.id = t.sender_id
             LEFT JOIN users r ON r.id = t.receiver_id
             WHERE t.sender_id = ?1 OR t.receiver_id = ?1
             ORDER BY t.created_at DESC, t.rowid DESC
             LIMIT ?2 OFFSET ?3"
        ))?;

        let rows = stmt.query_map(rusqlite::params![user_id, limit, offset], |row| {
            Ok(TransactionRecord {
                transaction: row_to_transaction(row)?,
                sender_name: row.get(7)?,
                receiver_name: row.get(8)?,
            })
        })?;
        let records: Result<Vec<_>, _> = rows.collect();
        Ok(records?)
    }

    fn count_transactions_for_user(&self, user_id: &str) -> AppResult<usize> {
        let conn = self.pool.get()?;
        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM transactions WHERE sender_id = ?1 OR receiver_id = ?1",
            rusqlite::params![user_id],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(total).unwrap_or(0))
    }
}
