use std::sync::Arc;

use chrono::Duration;

use crate::auth::session::{MemorySessions, SessionStore};
use crate::models::{Money, Session};
use crate::store::{conformance, MemoryStore, Persistence};

pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub sessions: SessionStore,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::default()),
            sessions: SessionStore::new(Arc::new(MemorySessions::default()), Duration::hours(24)),
        }
    }

    pub fn store(&self) -> &dyn Persistence {
        self.store.as_ref()
    }

    /// Registers a user with the given opening balance and logs them in.
    pub fn customer(&self, phone: &str, full_name: &str, balance: Money) -> Session {
        let (user, account) = conformance::seed(self.store(), phone, full_name, balance);
        self.sessions.create(user.into(), account).unwrap()
    }

    pub fn balance_of(&self, session: &Session) -> Money {
        self.store
            .find_account_by_user(&session.user.id)
            .unwrap()
            .unwrap()
            .balance
    }
}
