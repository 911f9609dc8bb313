use rand::Rng;
use serde::Deserialize;

use crate::auth::pin;
use crate::auth::session::SessionStore;
use crate::error::{AppError, AppResult};
use crate::models::{Money, NewUser, Session, User, UserPublic};
use crate::store::Persistence;

pub const MINIMUM_AGE: u32 = 18;
pub const ACCOUNT_NUMBER_LENGTH: usize = 15;

#[derive(Debug, Deserialize)]
pub struct Registration {
    pub phone: String,
    pub username: String,
    pub full_name: String,
    pub age: u32,
    #[serde(default)]
    pub address: String,
    pub pin: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub username: Option<String>,
    pub age: Option<u32>,
    pub address: Option<String>,
}

/// 15 digits, never starting with zero.
pub fn generate_account_number() -> String {
    let mut rng = rand::thread_rng();
    let mut number = String::with_capacity(ACCOUNT_NUMBER_LENGTH);
    number.push(char::from(b'0' + rng.gen_range(1..=9u8)));
    for _ in 1..ACCOUNT_NUMBER_LENGTH {
        number.push(char::from(b'0' + rng.gen_range(0..=9u8)));
    }
    number
}

fn normalize_phone(raw: &str) -> AppResult<String> {
    let phone = raw.trim();
    let digits = phone.strip_prefix('+').unwrap_or(phone);
    if !(7..=15).contains(&digits.len()) || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AppError::BadRequest("Invalid phone number".into()));
    }
    Ok(phone.to_string())
}

fn require_adult(age: u32) -> AppResult<()> {
    if age < MINIMUM_AGE {
        return Err(AppError::BadRequest(format!(
            "You must be at least {MINIMUM_AGE} years old"
        )));
    }
    Ok(())
}

fn require_pin_format(candidate: &str) -> AppResult<()> {
    if !pin::is_valid_pin(candidate) {
        return Err(AppError::BadRequest("PIN must be exactly 4 digits".into()));
    }
    Ok(())
}

fn load_user(store: &dyn Persistence, user_id: &str) -> AppResult<User> {
    store
        .find_user_by_id(user_id)?
        .ok_or_else(|| AppError::NotFound("User not found".into()))
}

/// Opens a user and account together, then signs the new customer in.
pub fn register(
    store: &dyn Persistence,
    sessions: &SessionStore,
    form: Registration,
    initial_balance: Money,
) -> AppResult<Session> {
    let phone = normalize_phone(&form.phone)?;
    let username = form.username.trim().to_string();
    let full_name = form.full_name.trim().to_string();
    if username.is_empty() {
        return Err(AppError::BadRequest("Username is required".into()));
    }
    if full_name.is_empty() {
        return Err(AppError::BadRequest("Full name is required".into()));
    }
    require_adult(form.age)?;
    require_pin_format(&form.pin)?;

    if store.phone_exists(&phone)? {
        return Err(AppError::PhoneAlreadyRegistered);
    }

    let new_user = NewUser {
        phone,
        username,
        full_name,
        age: form.age,
        address: form.address.trim().to_string(),
        pin_hash: pin::hash_pin(&form.pin)?,
    };
    let (user, account) =
        store.create_user_with_account(new_user, &generate_account_number(), initial_balance)?;

    tracing::info!("Registered user {} with account {}", user.id, account.account_number);
    sessions.create(user.into(), account)
}

/// Unknown phone and wrong PIN both yield `InvalidCredentials`.
pub fn login(
    store: &dyn Persistence,
    sessions: &SessionStore,
    phone: &str,
    candidate_pin: &str,
) -> AppResult<Session> {
    let Some(user) = store.find_user_by_phone(phone.trim())? else {
        // same argon2 cost as a wrong PIN
        pin::verify_pin(candidate_pin, pin::DECOY_PIN_HASH)?;
        return Err(AppError::InvalidCredentials);
    };

    if !pin::verify_pin(candidate_pin, &user.pin_hash)? {
        tracing::warn!("Failed login for user {}", user.id);
        return Err(AppError::InvalidCredentials);
    }

    let account = store
        .find_account_by_user(&user.id)?
        .ok_or_else(|| AppError::NotFound("Account not found".into()))?;

    tracing::info!("User {} logged in", user.id);
    sessions.create(user.into(), account)
}

pub fn logout(sessions: &SessionStore, token: &str) {
    sessions.destroy(token);
}

/// Re-reads user and account from the store into the session.
pub fn refresh(store: &dyn Persistence, sessions: &SessionStore, session: &Session) -> AppResult<Session> {
    let user = load_user(store, &session.user.id)?;
    let account = store
        .find_account_by_user(&user.id)?
        .ok_or_else(|| AppError::NotFound("Account not found".into()))?;

    sessions.update_user(&session.token, user.clone().into());
    sessions.update_account(&session.token, account.clone());

    Ok(Session {
        token: session.token.clone(),
        user: user.into(),
        account,
        expires_at: session.expires_at.clone(),
    })
}

/// Blank or missing fields keep their current value.
pub fn update_profile(
    store: &dyn Persistence,
    sessions: &SessionStore,
    session: &Session,
    update: ProfileUpdate,
) -> AppResult<UserPublic> {
    let mut user = load_user(store, &session.user.id)?;

    let non_blank = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    if let Some(full_name) = non_blank(update.full_name) {
        user.full_name = full_name;
    }
    if let Some(username) = non_blank(update.username) {
        user.username = username;
    }
    if let Some(address) = non_blank(update.address) {
        user.address = address;
    }
    if let Some(age) = update.age {
        require_adult(age)?;
        user.age = age;
    }

    let updated: UserPublic = store.update_user(&user)?.into();
    sessions.update_user(&session.token, updated.clone());
    Ok(updated)
}

pub fn change_pin(
    store: &dyn Persistence,
    sessions: &SessionStore,
    session: &Session,
    current_pin: &str,
    new_pin: &str,
) -> AppResult<UserPublic> {
    let mut user = load_user(store, &session.user.id)?;
    if !pin::verify_pin(current_pin, &user.pin_hash)? {
        return Err(AppError::InvalidCredentials);
    }
    require_pin_format(new_pin)?;

    user.pin_hash = pin::hash_pin(new_pin)?;
    let updated: UserPublic = store.update_user(&user)?.into();
    sessions.update_user(&session.token, updated.clone());

    tracing::info!("User {} changed PIN", updated.id);
    Ok(updated)
}

pub fn change_phone(
    store: &dyn Persistence,
    sessions: &SessionStore,
    session: &Session,
    new_phone: &str,
) -> AppResult<UserPublic> {
    let new_phone = normalize_phone(new_phone)?;
    let mut user = load_user(store, &session.user.id)?;
    if new_phone == user.phone {
        return Err(AppError::BadRequest(
            "New phone number is the same as current one".into(),
        ));
    }
    if store.phone_exists(&new_phone)? {
        return Err(AppError::PhoneAlreadyRegistered);
    }

    user.phone = new_phone;
    let updated: UserPublic = store.update_user(&user)?.into();
    sessions.update_user(&session.token, updated.clone());

    tracing::info!("User {} changed phone number", updated.id);
    Ok(updated)
}
