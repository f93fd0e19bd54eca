//! Wallet session context.
//!
//! Passed explicitly to whatever needs the connected account. Restored from
//! the database at startup and changed only by [`SessionContext::connect`]
//! and [`SessionContext::disconnect`].

use parking_lot::RwLock;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::account::AccountId;
use crate::db;
use crate::errors::Result;

pub struct SessionContext {
    /// `None` keeps the session in memory only.
    store: Option<SqlitePool>,
    account: RwLock<Option<AccountId>>,
}

impl SessionContext {
    /// Load the persisted session, if any. An unreadable stored account is
    /// discarded rather than failing startup.
    pub async fn restore(pool: SqlitePool) -> Result<Self> {
        let account = match db::load_session(&pool).await? {
            Some(raw) => match raw.parse::<AccountId>() {
                Ok(account) => {
                    info!("Restored wallet session for {account}");
                    Some(account)
                }
                Err(e) => {
                    warn!("Discarding stored wallet session: {e}");
                    db::clear_session(&pool).await?;
                    None
                }
            },
            None => None,
        };
        Ok(Self {
            store: Some(pool),
            account: RwLock::new(account),
        })
    }

    #[cfg(test)]
    pub fn ephemeral(account: Option<AccountId>) -> Self {
        Self {
            store: None,
            account: RwLock::new(account),
        }
    }

    pub fn account(&self) -> Option<AccountId> {
        *self.account.read()
    }

    pub async fn connect(&self, account: AccountId) -> Result<()> {
        if let Some(pool) = &self.store {
            db::save_session(pool, &account.to_string()).await?;
        }
        *self.account.write() = Some(account);
        info!("Wallet connected: {account}");
        Ok(())
    }

    pub async fn disconnect(&self) -> Result<()> {
        if let Some(pool) = &self.store {
            db::clear_session(pool).await?;
        }
        if let Some(account) = self.account.write().take() {
            info!("Wallet disconnected: {account}");
        }
        Ok(())
    }
}
