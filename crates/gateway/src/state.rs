//! Shared application state and hot configuration.

use std::sync::Arc;

use parking_lot::RwLock;
use sr_domain::config::Config;
use sr_domain::message::LiveEvent;

use crate::runtime::Controller;

type ConfigCallback = Arc<dyn Fn(&Config) + Send + Sync>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SharedConfig
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Thread-safe handle to the current configuration.
///
/// `replace` swaps the whole config atomically and notifies the
/// subscribers whose section actually changed. Readers take a cheap
/// `Arc<Config>` snapshot and never observe a half-applied edit.
pub struct SharedConfig {
    current: RwLock<Arc<Config>>,
    on_outputs: RwLock<Vec<ConfigCallback>>,
    on_accounts: RwLock<Vec<ConfigCallback>>,
}

impl SharedConfig {
    pub fn new(config: Config) -> Self {
        Self {
            current: RwLock::new(Arc::new(config)),
            on_outputs: RwLock::new(Vec::new()),
            on_accounts: RwLock::new(Vec::new()),
        }
    }

    pub fn current(&self) -> Arc<Config> {
        self.current.read().clone()
    }

    /// Swap in a new config and notify the affected subscribers.
    pub fn replace(&self, config: Config) {
        let config = Arc::new(config);
        let previous = {
            let mut current = self.current.write();
            std::mem::replace(&mut *current, config.clone())
        };

        if previous.outputs != config.outputs {
            for callback in self.on_outputs.read().iter() {
                callback(&config);
            }
        }
        let accounts_changed = previous.accounts.len() != config.accounts.len()
            || previous
                .accounts
                .iter()
                .zip(config.accounts.iter())
                .any(|(a, b)| {
                    a.name != b.name
                        || a.credentials.cookie != b.credentials.cookie
                        || a.credentials.csrf != b.credentials.csrf
                        || a.max_message_len != b.max_message_len
                });
        if accounts_changed {
            for callback in self.on_accounts.read().iter() {
                callback(&config);
            }
        }
    }

    pub fn subscribe_outputs(&self, callback: ConfigCallback) {
        self.on_outputs.write().push(callback);
    }

    pub fn subscribe_accounts(&self, callback: ConfigCallback) {
        self.on_accounts.write().push(callback);
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// AppState
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Shared application state passed to API handlers and the supervisor.
///
/// The controller slot is populated only while a live session runs;
/// control operations against an empty slot are silent no-ops.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<SharedConfig>,
    controller: Arc<RwLock<Option<Arc<Controller>>>>,
    live: Arc<RwLock<Option<LiveEvent>>>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(SharedConfig::new(config)),
            controller: Arc::new(RwLock::new(None)),
            live: Arc::new(RwLock::new(None)),
        }
    }

    pub fn controller(&self) -> Option<Arc<Controller>> {
        self.controller.read().clone()
    }

    pub fn set_controller(&self, controller: Option<Arc<Controller>>) {
        *self.controller.write() = controller;
    }

    pub fn live(&self) -> Option<LiveEvent> {
        self.live.read().clone()
    }

    pub fn set_live(&self, event: LiveEvent) {
        *self.live.write() = Some(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sr_domain::config::{AccountConfig, OutputConfig};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_callback(counter: &Arc<AtomicUsize>) -> ConfigCallback {
        let counter = counter.clone();
        Arc::new(move |_config: &Config| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn replace_notifies_only_changed_sections() {
        let shared = SharedConfig::new(Config::default());
        let outputs_fired = Arc::new(AtomicUsize::new(0));
        let accounts_fired = Arc::new(AtomicUsize::new(0));
        shared.subscribe_outputs(counting_callback(&outputs_fired));
        shared.subscribe_accounts(counting_callback(&accounts_fired));

        // Same config: nobody fires.
        shared.replace(Config::default());
        assert_eq!(outputs_fired.load(Ordering::SeqCst), 0);
        assert_eq!(accounts_fired.load(Ordering::SeqCst), 0);

        // New output: outputs subscribers only.
        let mut with_output = Config::default();
        with_output.outputs.push(OutputConfig {
            name: "A".into(),
            ..Default::default()
        });
        shared.replace(with_output.clone());
        assert_eq!(outputs_fired.load(Ordering::SeqCst), 1);
        assert_eq!(accounts_fired.load(Ordering::SeqCst), 0);

        // New account on top: accounts subscribers only.
        let mut with_account = with_output;
        with_account.accounts.push(AccountConfig {
            name: "bot1".into(),
            platform: "bilibili".into(),
            credentials: Default::default(),
            max_message_len: 20,
            cooldown_ms: 2000,
            api_base: None,
        });
        shared.replace(with_account);
        assert_eq!(outputs_fired.load(Ordering::SeqCst), 1);
        assert_eq!(accounts_fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn current_returns_latest_snapshot() {
        let shared = SharedConfig::new(Config::default());
        let old = shared.current();
        let mut updated = Config::default();
        updated.streamer.name = "streamer".into();
        shared.replace(updated);

        assert_eq!(old.streamer.name, "");
        assert_eq!(shared.current().streamer.name, "streamer");
    }
}
