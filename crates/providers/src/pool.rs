//! Account pool.
//!
//! Named, credentialed sending identities shared read-mostly by every
//! controller and agent. Credential rotation swaps the account's sender in
//! place (rebuilt client, cooldown state reset) without disturbing the
//! pool order that round-robin selection depends on.

use std::sync::Arc;

use parking_lot::RwLock;
use sr_domain::config::{AccountConfig, Credentials};
use sr_domain::error::{Error, Result};

use crate::sender::DanmakuSender;
use crate::traits::BulletSender;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Account
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct Account {
    cfg: RwLock<AccountConfig>,
    sender: RwLock<Arc<dyn BulletSender>>,
}

impl Account {
    pub fn from_config(cfg: &AccountConfig) -> Result<Self> {
        let sender: Arc<dyn BulletSender> = Arc::new(DanmakuSender::from_config(cfg)?);
        Ok(Self {
            cfg: RwLock::new(cfg.clone()),
            sender: RwLock::new(sender),
        })
    }

    /// An account backed by an arbitrary sender. Test seam.
    pub fn with_sender(cfg: AccountConfig, sender: Arc<dyn BulletSender>) -> Self {
        Self {
            cfg: RwLock::new(cfg),
            sender: RwLock::new(sender),
        }
    }

    pub fn name(&self) -> String {
        self.cfg.read().name.clone()
    }

    pub fn platform(&self) -> String {
        self.cfg.read().platform.clone()
    }

    /// Platform character cap in code points, not bytes.
    pub fn max_message_len(&self) -> usize {
        self.cfg.read().max_message_len
    }

    /// The current sender. Cloned out so sends never hold the lock.
    pub fn sender(&self) -> Arc<dyn BulletSender> {
        self.sender.read().clone()
    }

    /// Replace the credentials and rebuild the sender. The fresh sender
    /// starts with a clean cooldown.
    pub fn update_credentials(&self, credentials: Credentials) -> Result<()> {
        let rebuilt: Arc<dyn BulletSender> = {
            let mut cfg = self.cfg.write();
            cfg.credentials = credentials;
            Arc::new(DanmakuSender::from_config(&cfg)?)
        };
        *self.sender.write() = rebuilt;
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// AccountPool
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub struct AccountPool {
    /// Ordered; order is what output pools and round-robin indices refer to.
    accounts: RwLock<Vec<Arc<Account>>>,
}

impl AccountPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(accounts: &[AccountConfig]) -> Result<Self> {
        let pool = Self::new();
        for cfg in accounts {
            pool.add(Arc::new(Account::from_config(cfg)?));
        }
        Ok(pool)
    }

    /// Insert an account, replacing any existing account of the same name
    /// in place (pool order preserved).
    pub fn add(&self, account: Arc<Account>) {
        let name = account.name();
        let mut accounts = self.accounts.write();
        if let Some(slot) = accounts.iter_mut().find(|a| a.name() == name) {
            *slot = account;
        } else {
            accounts.push(account);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<Account>> {
        self.accounts.read().iter().find(|a| a.name() == name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.accounts.read().iter().map(|a| a.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.accounts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.read().is_empty()
    }

    pub fn update_credentials(&self, name: &str, credentials: Credentials) -> Result<()> {
        let account = self
            .get(name)
            .ok_or_else(|| Error::AccountNotFound(name.to_string()))?;
        account.update_credentials(credentials)
    }

    /// The smallest message-length cap across the named accounts — chunks
    /// cut to this length fit through any account in the set. Names not in
    /// the pool are ignored; an empty or fully-unknown set yields 0
    /// (callers treat 0 as "no cap").
    pub fn min_max_len(&self, names: &[String]) -> usize {
        names
            .iter()
            .filter_map(|n| self.get(n))
            .map(|a| a.max_message_len())
            .min()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sr_domain::error::Result;

    struct NullSender;

    #[async_trait::async_trait]
    impl BulletSender for NullSender {
        async fn send(&self, _room_id: u64, _text: &str) -> Result<()> {
            Ok(())
        }
    }

    fn account(name: &str, max_len: usize) -> Arc<Account> {
        Arc::new(Account::with_sender(
            AccountConfig {
                name: name.into(),
                platform: "bilibili".into(),
                credentials: Credentials::default(),
                max_message_len: max_len,
                cooldown_ms: 0,
                api_base: None,
            },
            Arc::new(NullSender),
        ))
    }

    #[test]
    fn add_get_names_roundtrip() {
        let pool = AccountPool::new();
        pool.add(account("a", 20));
        pool.add(account("b", 30));

        assert_eq!(pool.names(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(pool.get("a").unwrap().max_message_len(), 20);
        assert!(pool.get("ghost").is_none());
    }

    #[test]
    fn add_replaces_in_place() {
        let pool = AccountPool::new();
        pool.add(account("a", 20));
        pool.add(account("b", 30));
        pool.add(account("a", 25));

        // Replacement keeps position — round-robin order is stable.
        assert_eq!(pool.names(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(pool.get("a").unwrap().max_message_len(), 25);
    }

    #[test]
    fn min_max_len_across_named_accounts() {
        let pool = AccountPool::new();
        pool.add(account("a", 20));
        pool.add(account("b", 30));
        pool.add(account("c", 10));

        assert_eq!(pool.min_max_len(&["a".into(), "b".into()]), 20);
        assert_eq!(pool.min_max_len(&["a".into(), "c".into()]), 10);
        // Unknown names are skipped; all-unknown means no cap.
        assert_eq!(pool.min_max_len(&["a".into(), "ghost".into()]), 20);
        assert_eq!(pool.min_max_len(&["ghost".into()]), 0);
        assert_eq!(pool.min_max_len(&[]), 0);
    }

    #[test]
    fn update_credentials_swaps_sender() {
        let pool = AccountPool::new();
        pool.add(account("a", 20));

        let before = Arc::as_ptr(&pool.get("a").unwrap().sender());
        pool.update_credentials(
            "a",
            Credentials {
                cookie: "SESSDATA=new".into(),
                csrf: "new".into(),
            },
        )
        .unwrap();
        let after = Arc::as_ptr(&pool.get("a").unwrap().sender());
        assert_ne!(before, after, "sender must be rebuilt");

        assert!(matches!(
            pool.update_credentials("ghost", Credentials::default()),
            Err(Error::AccountNotFound(_))
        ));
    }
}
