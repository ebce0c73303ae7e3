//! Runtime wiring extracted from `main.rs`: config validation, provider
//! construction, hot-config subscriptions, and background-task spawning.

use std::sync::Arc;

use anyhow::Context;
use sr_domain::config::{Config, ConfigSeverity};
use sr_providers::{
    Account, AccountPool, GeminiTranslator, SpeechProvider, Translator, WsSpeechProvider,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::runtime::monitor::LiveMonitor;
use crate::runtime::transcript::TranscriptWriter;
use crate::runtime::Supervisor;
use crate::state::AppState;

/// Everything the server needs, fully wired.
pub struct Bootstrapped {
    pub state: AppState,
    pub pool: Arc<AccountPool>,
    pub stt: Arc<dyn SpeechProvider>,
    pub translator: Arc<dyn Translator>,
    pub transcript: Option<Arc<TranscriptWriter>>,
}

/// Validate the config, construct every subsystem, and wire the hot-config
/// subscribers.
pub fn build(config: Config) -> anyhow::Result<Bootstrapped> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Account pool ─────────────────────────────────────────────────
    let pool = Arc::new(
        AccountPool::from_config(&config.accounts).context("building account pool")?,
    );
    tracing::info!(accounts = pool.len(), "account pool ready");

    // ── Providers ────────────────────────────────────────────────────
    let translator: Arc<dyn Translator> = Arc::new(
        GeminiTranslator::from_config(&config.translation).context("building translator")?,
    );
    let stt: Arc<dyn SpeechProvider> =
        Arc::new(WsSpeechProvider::from_config(&config.stt, &config.streamer));
    tracing::info!(
        model = %config.translation.model,
        stt = %config.stt.endpoint,
        "providers ready"
    );

    // ── Transcript sink ──────────────────────────────────────────────
    let transcript = match (&config.transcript.enabled, &config.transcript.path) {
        (true, Some(path)) => {
            tracing::info!(path = %path.display(), "transcript sink ready");
            Some(Arc::new(TranscriptWriter::new(path)))
        }
        _ => None,
    };

    let state = AppState::new(config);

    // ── Hot-config subscribers ───────────────────────────────────────
    // Output edits flow into the running controller; retained outputs
    // keep their runtime state, new ones come up paused.
    {
        let for_outputs = state.clone();
        state.config.subscribe_outputs(Arc::new(move |config: &Config| {
            if let Some(controller) = for_outputs.controller() {
                controller.sync_outputs(config.outputs.clone());
                tracing::info!(outputs = config.outputs.len(), "output list synced to live session");
            }
        }));
    }
    // Account edits rotate pool entries in place; unknown names are
    // added so a hot-added output can reference them.
    {
        let for_accounts = pool.clone();
        state.config.subscribe_accounts(Arc::new(move |config: &Config| {
            for account_cfg in &config.accounts {
                let result = match for_accounts.get(&account_cfg.name) {
                    Some(account) => account.update_credentials(account_cfg.credentials.clone()),
                    None => Account::from_config(account_cfg).map(|a| for_accounts.add(Arc::new(a))),
                };
                if let Err(e) = result {
                    tracing::warn!(account = %account_cfg.name, error = %e, "account update failed");
                }
            }
            tracing::info!("account credentials synced");
        }));
    }

    Ok(Bootstrapped {
        state,
        pool,
        stt,
        translator,
        transcript,
    })
}

/// Spawn the long-running tasks: the live-status monitor and the
/// supervisor consuming its transitions. Returns the supervisor handle so
/// shutdown can wait for the session teardown.
pub fn spawn_runtime(boot: &Bootstrapped, cancel: CancellationToken) -> anyhow::Result<JoinHandle<()>> {
    let config = boot.state.config.current();

    let monitor = LiveMonitor::from_config(&config.monitor, config.streamer.room_id)
        .context("building live monitor")?;
    let events = monitor.spawn(cancel.clone());
    tracing::info!(
        room = config.streamer.room_id,
        interval_sec = config.monitor.poll_interval_sec,
        "live monitor started"
    );

    let supervisor = Supervisor::new(
        boot.state.clone(),
        boot.pool.clone(),
        boot.stt.clone(),
        boot.translator.clone(),
        boot.transcript.clone(),
    );
    let handle = tokio::spawn(async move {
        supervisor.run(events, cancel).await;
    });
    tracing::info!("supervisor started");
    Ok(handle)
}
