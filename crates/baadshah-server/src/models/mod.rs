mod money;

pub use money::Money;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub phone: String,
    pub username: String,
    pub full_name: String,
    pub age: u32,
    pub address: String,
    #[serde(skip_serializing)]
    pub pin_hash: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPublic {
    pub id: String,
    pub phone: String,
    pub username: String,
    pub full_name: String,
    pub age: u32,
    pub address: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<User> for UserPublic {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            phone: u.phone,
            username: u.username,
            full_name: u.full_name,
            age: u.age,
            address: u.address,
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}

/// Registration fields after validation; the PIN is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub phone: String,
    pub username: String,
    pub full_name: String,
    pub age: u32,
    pub address: String,
    pub pin_hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub user_id: String,
    pub balance: Money,
    pub account_number: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Credit,
    Debit,
    Transfer,
}

impl TransactionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Credit => "credit",
            Self::Debit => "debit",
            Self::Transfer => "transfer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "credit" => Some(Self::Credit),
            "debit" => Some(Self::Debit),
            "transfer" => Some(Self::Transfer),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: Option<String>,
    pub amount: Money,
    pub description: String,
    pub transaction_type: TransactionType,
    pub created_at: String,
}

/// Ledger row to append alongside a balance change.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub sender_id: String,
    pub receiver_id: Option<String>,
    pub amount: Money,
    pub description: String,
    pub transaction_type: TransactionType,
}

/// A ledger row with both parties' display names joined in.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRecord {
    pub transaction: Transaction,
    pub sender_name: String,
    pub receiver_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(skip)]
    pub token: String,
    pub user: UserPublic,
    pub account: Account,
    pub expires_at: String,
}
