//! Behaviour every `Persistence` backend must share. Each backend's test
//! module runs these against a fresh instance.

use crate::error::AppError;
use crate::models::{Account, Money, NewTransaction, NewUser, TransactionType, User};
use crate::store::{Page, Persistence};

pub fn new_user(phone: &str, full_name: &str) -> NewUser {
    NewUser {
        phone: phone.to_string(),
        username: full_name.split_whitespace().next().unwrap_or("user").to_lowercase(),
        full_name: full_name.to_string(),
        age: 30,
        address: "12 MG Road, Pune".to_string(),
        pin_hash: "not-a-real-hash".to_string(),
    }
}

pub fn seed(store: &dyn Persistence, phone: &str, full_name: &str, balance: Money) -> (User, Account) {
    let account_number = format!("1{:014}", phone.parse::<u64>().unwrap_or(0) % 100_000_000_000_000);
    store
        .create_user_with_account(new_user(phone, full_name), &account_number, balance)
        .unwrap()
}

pub fn credit(user_id: &str, amount: Money) -> NewTransaction {
    NewTransaction {
        sender_id: user_id.to_string(),
        receiver_id: Some(user_id.to_string()),
        amount,
        description: String::new(),
        transaction_type: TransactionType::Credit,
    }
}

pub fn debit(user_id: &str, amount: Money) -> NewTransaction {
    NewTransaction {
        sender_id: user_id.to_string(),
        receiver_id: None,
        amount,
        description: String::new(),
        transaction_type: TransactionType::Debit,
    }
}

pub fn registration_is_unique_per_phone(store: &dyn Persistence) {
    let (user, account) = seed(store, "9000000001", "Asha Rao", Money::ZERO);
    assert_eq!(account.user_id, user.id);
    assert!(store.phone_exists("9000000001").unwrap());

    let err = store
        .create_user_with_account(new_user("9000000001", "Someone Else"), "199999999999999", Money::ZERO)
        .unwrap_err();
    assert!(matches!(err, AppError::PhoneAlreadyRegistered));

    let found = store.find_user_by_phone("9000000001").unwrap().unwrap();
    assert_eq!(found.id, user.id);
    assert_eq!(found.full_name, "Asha Rao");
    assert_eq!(store.find_account_by_user(&user.id).unwrap().unwrap(), account);
    assert!(store.find_user_by_phone("9000000009").unwrap().is_none());
}

pub fn post_entry_moves_balance_and_appends_row(store: &dyn Persistence) {
    let (user, account) = seed(store, "9000000001", "Asha Rao", Money::from_rupees(100));

    let (after, tx) = store
        .post_entry(&account.id, Money::from_rupees(50), credit(&user.id, Money::from_rupees(50)))
        .unwrap();
    assert_eq!(after.balance, Money::from_rupees(150));
    assert_eq!(tx.transaction_type, TransactionType::Credit);
    assert_eq!(tx.amount, Money::from_rupees(50));

    let (after, tx) = store
        .post_entry(&account.id, Money::from_rupees(-120), debit(&user.id, Money::from_rupees(120)))
        .unwrap();
    assert_eq!(after.balance, Money::from_rupees(30));
    assert_eq!(tx.receiver_id, None);

    assert_eq!(store.list_transactions_for_user(&user.id, None).unwrap().len(), 2);
}

pub fn post_entry_never_overdraws(store: &dyn Persistence) {
    let (user, account) = seed(store, "9000000001", "Asha Rao", Money::from_rupees(10));

    let err = store
        .post_entry(&account.id, Money::from_rupees(-11), debit(&user.id, Money::from_rupees(11)))
        .unwrap_err();
    assert!(matches!(err, AppError::InsufficientBalance));

    let unchanged = store.find_account_by_user(&user.id).unwrap().unwrap();
    assert_eq!(unchanged.balance, Money::from_rupees(10));
    assert!(store.list_transactions_for_user(&user.id, None).unwrap().is_empty());
}

pub fn transfer_moves_funds_between_parties(store: &dyn Persistence) {
    let (a, _) = seed(store, "9000000001", "Asha Rao", Money::from_rupees(1000));
    let (b, _) = seed(store, "9000000002", "Bilal Khan", Money::from_rupees(500));

    let (a_account, tx) = store
        .transfer_atomic(&a.id, "9000000002", Money::from_rupees(250), "rent")
        .unwrap();

    assert_eq!(a_account.balance, Money::from_rupees(750));
    let b_account = store.find_account_by_user(&b.id).unwrap().unwrap();
    assert_eq!(b_account.balance, Money::from_rupees(750));

    assert_eq!(tx.transaction_type, TransactionType::Transfer);
    assert_eq!(tx.sender_id, a.id);
    assert_eq!(tx.receiver_id.as_deref(), Some(b.id.as_str()));
    assert_eq!(tx.description, "rent");

    assert_eq!(store.list_transactions_for_user(&a.id, None).unwrap().len(), 1);
    assert_eq!(store.list_transactions_for_user(&b.id, None).unwrap().len(), 1);
}

pub fn transfer_failures_leave_no_trace(store: &dyn Persistence) {
    let (a, _) = seed(store, "9000000001", "Asha Rao", Money::from_rupees(100));
    let (b, _) = seed(store, "9000000002", "Bilal Khan", Money::from_rupees(5));

    let err = store
        .transfer_atomic(&a.id, "9000000009", Money::from_rupees(10), "")
        .unwrap_err();
    assert!(matches!(err, AppError::RecipientNotFound));

    let err = store
        .transfer_atomic(&a.id, "9000000001", Money::from_rupees(10), "")
        .unwrap_err();
    assert!(matches!(err, AppError::SelfTransferNotAllowed));

    let err = store
        .transfer_atomic(&a.id, "9000000002", Money::from_rupees(101), "")
        .unwrap_err();
    assert!(matches!(err, AppError::InsufficientBalance));

    assert_eq!(
        store.find_account_by_user(&a.id).unwrap().unwrap().balance,
        Money::from_rupees(100)
    );
    assert_eq!(
        store.find_account_by_user(&b.id).unwrap().unwrap().balance,
        Money::from_rupees(5)
    );
    assert!(store.list_transactions_for_user(&a.id, None).unwrap().is_empty());
}

pub fn update_user_rejects_taken_phone(store: &dyn Persistence) {
    let (a, _) = seed(store, "9000000001", "Asha Rao", Money::ZERO);
    seed(store, "9000000002", "Bilal Khan", Money::ZERO);

    let err = store
        .update_user(&User {
            phone: "9000000002".into(),
            ..a.clone()
        })
        .unwrap_err();
    assert!(matches!(err, AppError::PhoneAlreadyRegistered));

    let renamed = store
        .update_user(&User {
            full_name: "Asha R. Rao".into(),
            ..a.clone()
        })
        .unwrap();
    assert_eq!(renamed.full_name, "Asha R. Rao");
    assert_eq!(
        store.find_user_by_id(&a.id).unwrap().unwrap().full_name,
        "Asha R. Rao"
    );
}

pub fn history_is_newest_first_with_names(store: &dyn Persistence) {
    let (a, a_account) = seed(store, "9000000001", "Asha Rao", Money::from_rupees(100));
    let (b, _) = seed(store, "9000000002", "Bilal Khan", Money::ZERO);

    store
        .post_entry(&a_account.id, Money::from_rupees(5), credit(&a.id, Money::from_rupees(5)))
        .unwrap();
    store
        .transfer_atomic(&a.id, "9000000002", Money::from_rupees(20), "dinner")
        .unwrap();

    let a_history = store.list_transactions_for_user(&a.id, None).unwrap();
    assert_eq!(a_history.len(), 2);
    assert_eq!(a_history[0].transaction.transaction_type, TransactionType::Transfer);
    assert_eq!(a_history[0].sender_name, "Asha Rao");
    assert_eq!(a_history[0].receiver_name.as_deref(), Some("Bilal Khan"));
    assert_eq!(a_history[1].transaction.transaction_type, TransactionType::Credit);

    let b_history = store.list_transactions_for_user(&b.id, None).unwrap();
    assert_eq!(b_history.len(), 1);
    assert_eq!(b_history[0].transaction.description, "dinner");
}

pub fn credits_past_the_balance_ceiling_are_refused(store: &dyn Persistence) {
    let ceiling = Money::from_paise(i64::MAX);
    let (a, _) = seed(store, "9000000001", "Asha Rao", Money::from_rupees(10));
    let (b, b_account) = seed(store, "9000000002", "Bilal Khan", Money::ZERO);
    store
        .post_entry(&b_account.id, ceiling, credit(&b.id, ceiling))
        .unwrap();

    let err = store
        .transfer_atomic(&a.id, "9000000002", Money::from_rupees(1), "")
        .unwrap_err();
    assert!(matches!(err, AppError::AmountOutOfRange));

    let err = store
        .post_entry(&b_account.id, Money::from_paise(1), credit(&b.id, Money::from_paise(1)))
        .unwrap_err();
    assert!(matches!(err, AppError::AmountOutOfRange));

    // both accounts still read back as exact integers
    assert_eq!(
        store.find_account_by_user(&a.id).unwrap().unwrap().balance,
        Money::from_rupees(10)
    );
    assert_eq!(store.find_account_by_user(&b.id).unwrap().unwrap().balance, ceiling);
    assert!(store.list_transactions_for_user(&a.id, None).unwrap().is_empty());
    assert_eq!(store.count_transactions_for_user(&b.id).unwrap(), 1);
}

pub fn history_pages_newest_first(store: &dyn Persistence) {
    let (a, a_account) = seed(store, "9000000001", "Asha Rao", Money::ZERO);
    for rupees in 1..=5 {
        let amount = Money::from_rupees(rupees);
        store
            .post_entry(&a_account.id, amount, credit(&a.id, amount))
            .unwrap();
    }

    assert_eq!(store.count_transactions_for_user(&a.id).unwrap(), 5);

    let page = store
        .list_transactions_for_user(&a.id, Some(Page { limit: 2, offset: 1 }))
        .unwrap();
    let amounts: Vec<Money> = page.iter().map(|r| r.transaction.amount).collect();
    assert_eq!(amounts, vec![Money::from_rupees(4), Money::from_rupees(3)]);

    let past_end = store
        .list_transactions_for_user(&a.id, Some(Page { limit: 10, offset: 5 }))
        .unwrap();
    assert!(past_end.is_empty());
}
