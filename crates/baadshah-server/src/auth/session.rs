use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::{Account, Session, UserPublic};

pub const DEFAULT_SESSION_TTL_HOURS: i64 = 24;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Raw storage for session snapshots, keyed by token. Expiry is not
/// interpreted here; `SessionStore` owns that rule.
pub trait SessionRecords: Send + Sync {
    /// Inserts a new record.
    fn put(&self, session: &Session) -> AppResult<()>;
    /// Rewrites an existing record's snapshot. Never inserts; returns false
    /// when the token has no record.
    fn update(&self, session: &Session) -> AppResult<bool>;
    fn get(&self, token: &str) -> AppResult<Option<Session>>;
    fn remove(&self, token: &str) -> AppResult<()>;
    /// Drops every record whose expiry is before `now`. Returns how many went.
    fn purge_expired(&self, now: DateTime<Utc>) -> AppResult<usize>;
}

/// The current-user context for each client token.
///
/// Reads never fail: a missing, expired or unreadable record is reported as
/// no session, and expired or unreadable records are evicted on the spot.
#[derive(Clone)]
pub struct SessionStore {
    records: Arc<dyn SessionRecords>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(records: Arc<dyn SessionRecords>, ttl: Duration) -> Self {
        Self { records, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Starts a session that lasts `ttl` from now. The only call here that
    /// reports a storage failure, so a login never hands out a dead token.
    pub fn create(&self, user: UserPublic, account: Account) -> AppResult<Session> {
        let now = Utc::now();
        let session = Session {
            token: generate_token(),
            user,
            account,
            expires_at: (now + self.ttl).format(TIMESTAMP_FORMAT).to_string(),
        };
        self.records.put(&session)?;

        match self.records.purge_expired(now) {
            Ok(0) => {}
            Ok(n) => tracing::debug!("Purged {n} expired sessions"),
            Err(e) => tracing::warn!("Failed to purge expired sessions: {e}"),
        }

        Ok(session)
    }

    pub fn current(&self, token: &str) -> Option<Session> {
        self.current_at(token, Utc::now())
    }

    pub fn current_at(&self, token: &str, now: DateTime<Utc>) -> Option<Session> {
        let session = match self.records.get(token) {
            Ok(Some(s)) => s,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Unreadable session record, evicting: {e}");
                self.destroy(token);
                return None;
            }
        };

        let live = DateTime::parse_from_rfc3339(&session.expires_at)
            .map(|exp| now < exp.with_timezone(&Utc))
            .unwrap_or(false);
        if !live {
            self.destroy(token);
            return None;
        }
        Some(session)
    }

    pub fn current_user(&self, token: &str) -> Option<UserPublic> {
        self.current(token).map(|s| s.user)
    }

    pub fn current_account(&self, token: &str) -> Option<Account> {
        self.current(token).map(|s| s.account)
    }

    /// Replaces the user snapshot. No-op once the session is gone.
    pub fn update_user(&self, token: &str, user: UserPublic) {
        if let Some(mut session) = self.current(token) {
            session.user = user;
            self.store(&session);
        }
    }

    /// Replaces the account snapshot. No-op once the session is gone.
    pub fn update_account(&self, token: &str, account: Account) {
        if let Some(mut session) = self.current(token) {
            session.account = account;
            self.store(&session);
        }
    }

    pub fn destroy(&self, token: &str) {
        if let Err(e) = self.records.remove(token) {
            tracing::warn!("Failed to remove session: {e}");
        }
    }

    fn store(&self, session: &Session) {
        match self.records.update(session) {
            Ok(true) => {}
            Ok(false) => tracing::debug!("Session ended before its snapshot refresh"),
            Err(e) => tracing::warn!("Failed to refresh session snapshot: {e}"),
        }
    }
}

/// Sessions table backend; the snapshot is stored as JSON.
pub struct SqliteSessions {
    pool: DbPool,
}

impl SqliteSessions {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl SessionRecords for SqliteSessions {
    fn put(&self, session: &Session) -> AppResult<()> {
        let conn = self.pool.get()?;
        let payload = serde_json::to_string(session)
            .map_err(|e| AppError::Internal(format!("Session encode failed: {e}")))?;
        let now = Utc::now().format(TIMESTAMP_FORMAT).to_string();

        conn.execute(
            "INSERT INTO sessions (token, user_id, payload, expires_at, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![session.token, session.user.id, payload, session.expires_at, now],
        )?;
        Ok(())
    }

    fn update(&self, session: &Session) -> AppResult<bool> {
        let conn = self.pool.get()?;
        let payload = serde_json::to_string(session)
            .map_err(|e| AppError::Internal(format!("Session encode failed: {e}")))?;

        let affected = conn.execute(
            "UPDATE sessions SET payload = ?1, user_id = ?2 WHERE token = ?3",
            rusqlite::params![payload, session.user.id, session.token],
        )?;
        Ok(affected > 0)
    }

    fn get(&self, token: &str) -> AppResult<Option<Session>> {
        let conn = self.pool.get()?;
        let payload: Option<String> = match conn.query_row(
            "SELECT payload FROM sessions WHERE token = ?1",
            rusqlite::params![token],
            |row| row.get(0),
        ) {
            Ok(p) => Some(p),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => return Err(AppError::Database(e)),
        };

        let Some(payload) = payload else {
            return Ok(None);
        };
        let mut session: Session = serde_json::from_str(&payload)
            .map_err(|e| AppError::Internal(format!("Session decode failed: {e}")))?;
        session.token = token.to_string();
        Ok(Some(session))
    }

    fn remove(&self, token: &str) -> AppResult<()> {
        let conn = self.pool.get()?;
        conn.execute("DELETE FROM sessions WHERE token = ?1", rusqlite::params![token])?;
        Ok(())
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> AppResult<usize> {
        let conn = self.pool.get()?;
        let now = now.format(TIMESTAMP_FORMAT).to_string();
        let purged = conn.execute(
            "DELETE FROM sessions WHERE expires_at < ?1",
            rusqlite::params![now],
        )?;
        Ok(purged)
    }
}

#[derive(Default)]
pub struct MemorySessions {
    sessions: Mutex<HashMap<String, Session>>,
}

impl MemorySessions {
    fn lock(&self) -> AppResult<std::sync::MutexGuard<'_, HashMap<String, Session>>> {
        self.sessions
            .lock()
            .map_err(|_| AppError::Persistence("session map lock poisoned".into()))
    }
}

impl SessionRecords for MemorySessions {
    fn put(&self, session: &Session) -> AppResult<()> {
        self.lock()?.insert(session.token.clone(), session.clone());
        Ok(())
    }

    fn update(&self, session: &Session) -> AppResult<bool> {
        match self.lock()?.get_mut(&session.token) {
            Some(existing) => {
                *existing = session.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn get(&self, token: &str) -> AppResult<Option<Session>> {
        Ok(self.lock()?.get(token).cloned())
    }

    fn remove(&self, token: &str) -> AppResult<()> {
        self.lock()?.remove(token);
        Ok(())
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> AppResult<usize> {
        let mut sessions = self.lock()?;
        let before = sessions.len();
        sessions.retain(|_, s| {
            DateTime::parse_from_rfc3339(&s.expires_at)
                .map(|exp| exp.with_timezone(&Utc) >= now)
                .unwrap_or(false)
        });
        Ok(before - sessions.len())
    }
}

fn generate_token() -> String {
    use base64::Engine;
    let mut bytes = [0u8; 32];
    use rand::RngCore;
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Money;

    fn user() -> UserPublic {
        UserPublic {
            id: "u1".into(),
            phone: "9000000001".into(),
            username: "asha".into(),
            full_name: "Asha Rao".into(),
            age: 30,
            address: "Pune".into(),
            created_at: "2024-01-01T00:00:00.000Z".into(),
            updated_at: "2024-01-01T00:00:00.000Z".into(),
        }
    }

    fn account(balance: Money) -> Account {
        Account {
            id: "a1".into(),
            user_id: "u1".into(),
            balance,
            account_number: "123456789012345".into(),
            created_at: "2024-01-01T00:00:00.000Z".into(),
            updated_at: "2024-01-01T00:00:00.000Z".into(),
        }
    }

    fn memory_store() -> SessionStore {
        SessionStore::new(
            Arc::new(MemorySessions::default()),
            Duration::hours(DEFAULT_SESSION_TTL_HOURS),
        )
    }

    fn sqlite_store() -> (tempfile::TempDir, SessionStore) {
        let dir = tempfile::tempdir().unwrap();
        let pool = crate::db::create_pool(dir.path().join("s.db").to_str().unwrap());
        let store = SessionStore::new(
            Arc::new(SqliteSessions::new(pool)),
            Duration::hours(DEFAULT_SESSION_TTL_HOURS),
        );
        (dir, store)
    }

    fn lifecycle(store: &SessionStore) {
        let session = store.create(user(), account(Money::from_rupees(10))).unwrap();
        assert!(!session.token.is_empty());

        let current = store.current(&session.token).unwrap();
        assert_eq!(current.user, user());
        assert_eq!(current.token, session.token);

        store.update_account(&session.token, account(Money::from_rupees(25)));
        assert_eq!(
            store.current_account(&session.token).unwrap().balance,
            Money::from_rupees(25)
        );

        let renamed = UserPublic {
            full_name: "Asha R. Rao".into(),
            ..user()
        };
        store.update_user(&session.token, renamed.clone());
        assert_eq!(store.current_user(&session.token).unwrap(), renamed);

        store.destroy(&session.token);
        assert!(store.current(&session.token).is_none());
        store.destroy(&session.token);
    }

    fn expiry(store: &SessionStore) {
        let session = store.create(user(), account(Money::ZERO)).unwrap();
        let now = Utc::now();

        assert!(store.current_at(&session.token, now + Duration::hours(23)).is_some());
        assert!(store
            .current_at(&session.token, now + Duration::hours(24) + Duration::seconds(1))
            .is_none());
        // evicted, so even an earlier clock no longer finds it
        assert!(store.current_at(&session.token, now).is_none());
    }

    #[test]
    fn memory_session_lifecycle() {
        lifecycle(&memory_store());
    }

    #[test]
    fn memory_session_expires_lazily() {
        expiry(&memory_store());
    }

    #[test]
    fn sqlite_session_lifecycle() {
        let (_dir, store) = sqlite_store();
        lifecycle(&store);
    }

    #[test]
    fn sqlite_session_expires_lazily() {
        let (_dir, store) = sqlite_store();
        expiry(&store);
    }

    #[test]
    fn unknown_token_is_no_session() {
        let store = memory_store();
        assert!(store.current("nope").is_none());
        assert!(store.current_user("nope").is_none());
        store.update_account("nope", account(Money::ZERO));
        assert!(store.current_account("nope").is_none());
    }

    #[test]
    fn persisted_shape_is_user_account_expiry() {
        let store = memory_store();
        let session = store.create(user(), account(Money::from_rupees(1))).unwrap();
        let json = serde_json::to_value(&session).unwrap();

        assert!(json.get("user").is_some());
        assert!(json.get("account").is_some());
        assert!(json.get("expiresAt").is_some());
        assert!(json.get("token").is_none());
    }

    /// Drops the record right after handing it out, as a logout racing a
    /// snapshot refresh would.
    struct LogoutAfterRead {
        inner: Arc<dyn SessionRecords>,
    }

    impl SessionRecords for LogoutAfterRead {
        fn put(&self, session: &Session) -> AppResult<()> {
            self.inner.put(session)
        }

        fn update(&self, session: &Session) -> AppResult<bool> {
            self.inner.update(session)
        }

        fn get(&self, token: &str) -> AppResult<Option<Session>> {
            let found = self.inner.get(token)?;
            self.inner.remove(token)?;
            Ok(found)
        }

        fn remove(&self, token: &str) -> AppResult<()> {
            self.inner.remove(token)
        }

        fn purge_expired(&self, now: DateTime<Utc>) -> AppResult<usize> {
            self.inner.purge_expired(now)
        }
    }

    fn refresh_never_revives(inner: Arc<dyn SessionRecords>) {
        let plain = SessionStore::new(inner.clone(), Duration::hours(1));
        let racing = SessionStore::new(
            Arc::new(LogoutAfterRead { inner: inner.clone() }),
            Duration::hours(1),
        );
        let session = plain.create(user(), account(Money::ZERO)).unwrap();

        racing.update_account(&session.token, account(Money::from_rupees(5)));
        racing.update_user(&session.token, user());

        assert!(inner.get(&session.token).unwrap().is_none());
        assert!(plain.current(&session.token).is_none());
    }

    #[test]
    fn memory_refresh_after_logout_stays_logged_out() {
        refresh_never_revives(Arc::new(MemorySessions::default()));
    }

    #[test]
    fn sqlite_refresh_after_logout_stays_logged_out() {
        let dir = tempfile::tempdir().unwrap();
        let pool = crate::db::create_pool(dir.path().join("s.db").to_str().unwrap());
        refresh_never_revives(Arc::new(SqliteSessions::new(pool)));
    }

    #[test]
    fn update_without_record_inserts_nothing() {
        let records = MemorySessions::default();
        let ghost = Session {
            token: "ghost".into(),
            user: user(),
            account: account(Money::ZERO),
            expires_at: "2999-01-01T00:00:00.000Z".into(),
        };
        assert!(!records.update(&ghost).unwrap());
        assert!(records.get("ghost").unwrap().is_none());
    }

    #[test]
    fn create_purges_expired_records() {
        let records = Arc::new(MemorySessions::default());
        let stale = Session {
            token: "stale".into(),
            user: user(),
            account: account(Money::ZERO),
            expires_at: "2020-01-01T00:00:00.000Z".into(),
        };
        records.put(&stale).unwrap();

        let store = SessionStore::new(records.clone(), Duration::hours(1));
        let fresh = store.create(user(), account(Money::ZERO)).unwrap();

        assert!(records.get("stale").unwrap().is_none());
        assert!(records.get(&fresh.token).unwrap().is_some());
    }
}
