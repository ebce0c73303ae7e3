//! Lifecycle supervisor — one live session at a time.
//!
//! Consumes live-status transitions and brings the agent + controller pair
//! up on `live`, down on `off`. Duplicate-state events are idempotent, and
//! two sessions never overlap for the same room: mid-session hiccups are
//! the agent's reconnect problem, not ours — the supervisor only restarts
//! across explicit off/on cycles.

use std::sync::Arc;
use std::time::Duration;

use sr_domain::config::Config;
use sr_domain::message::LiveEvent;
use sr_providers::{AccountPool, SpeechProvider, Translator};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::agent::Agent;
use super::controller::{Controller, ControllerSettings};
use super::transcript::TranscriptWriter;
use crate::state::AppState;

struct ActiveSession {
    id: uuid::Uuid,
    cancel: CancellationToken,
    agent_task: JoinHandle<()>,
    controller: Arc<Controller>,
}

pub struct Supervisor {
    state: AppState,
    pool: Arc<AccountPool>,
    stt: Arc<dyn SpeechProvider>,
    translator: Arc<dyn Translator>,
    transcript: Option<Arc<TranscriptWriter>>,
}

impl Supervisor {
    pub fn new(
        state: AppState,
        pool: Arc<AccountPool>,
        stt: Arc<dyn SpeechProvider>,
        translator: Arc<dyn Translator>,
        transcript: Option<Arc<TranscriptWriter>>,
    ) -> Self {
        Self {
            state,
            pool,
            stt,
            translator,
            transcript,
        }
    }

    /// Consume live-status events until `cancel` fires. Any session still
    /// running at cancellation is wound down before returning.
    pub async fn run(&self, mut events: mpsc::Receiver<LiveEvent>, cancel: CancellationToken) {
        let mut active: Option<ActiveSession> = None;

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            self.state.set_live(event.clone());

            match (event.live, active.is_some()) {
                (true, false) => active = Some(self.start_session(&event).await),
                (false, true) => {
                    if let Some(session) = active.take() {
                        self.stop_session(session).await;
                    }
                }
                // Duplicate-state transitions are idempotent.
                _ => {}
            }
        }

        if let Some(session) = active.take() {
            self.stop_session(session).await;
        }
    }

    async fn start_session(&self, event: &LiveEvent) -> ActiveSession {
        let id = uuid::Uuid::new_v4();
        let config: Arc<Config> = self.state.config.current();
        tracing::info!(
            session = %id,
            room = event.room_id,
            title = %event.title,
            "live — starting session"
        );

        let controller = Controller::new(ControllerSettings {
            outputs: config.outputs.clone(),
            pool: self.pool.clone(),
            streamer_room: config.streamer.room_id,
            send_delay: Duration::from_millis(config.controller.send_delay_ms),
            transcript: self.transcript.clone(),
        });
        controller.start().await;
        self.state.set_controller(Some(controller.clone()));

        let agent = Agent::new(
            config.streamer.clone(),
            config.capture.clone(),
            self.stt.clone(),
            self.translator.clone(),
            controller.clone(),
        );
        let session_cancel = CancellationToken::new();
        let agent_cancel = session_cancel.clone();
        let agent_task = tokio::spawn(async move {
            agent.run(agent_cancel).await;
        });

        ActiveSession {
            id,
            cancel: session_cancel,
            agent_task,
            controller,
        }
    }

    async fn stop_session(&self, session: ActiveSession) {
        tracing::info!(session = %session.id, "off — stopping session");
        session.cancel.cancel();
        let _ = session.agent_task.await;
        session.controller.stop().await;
        self.state.set_controller(None);
        tracing::info!(session = %session.id, "session stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sr_domain::config::{AccountConfig, Credentials, OutputConfig, StreamerConfig};
    use sr_domain::error::Result;
    use sr_domain::message::RecognitionEvent;
    use sr_providers::{Account, BulletSender, PcmRead};

    struct IdleSpeech;

    #[async_trait::async_trait]
    impl SpeechProvider for IdleSpeech {
        async fn stream(
            &self,
            _pcm: &mut dyn PcmRead,
            _sink: mpsc::Sender<RecognitionEvent>,
        ) -> Result<()> {
            // Pretend the capture stream ended immediately.
            Ok(())
        }
    }

    struct IdleTranslator;

    #[async_trait::async_trait]
    impl Translator for IdleTranslator {
        async fn translate(&self, text: &str, _s: &str, _t: &str) -> Result<String> {
            Ok(text.to_string())
        }
    }

    struct NullSender;

    #[async_trait::async_trait]
    impl BulletSender for NullSender {
        async fn send(&self, _room: u64, _text: &str) -> Result<()> {
            Ok(())
        }
    }

    fn supervisor() -> Supervisor {
        let mut config = Config::default();
        config.streamer = StreamerConfig {
            room_id: 42,
            ..Default::default()
        };
        config.outputs = vec![OutputConfig {
            name: "A".into(),
            account: Some("bot1".into()),
            ..Default::default()
        }];
        let state = AppState::new(config);
        let pool = AccountPool::new();
        pool.add(Arc::new(Account::with_sender(
            AccountConfig {
                name: "bot1".into(),
                platform: "bilibili".into(),
                credentials: Credentials::default(),
                max_message_len: 20,
                cooldown_ms: 0,
                api_base: None,
            },
            Arc::new(NullSender),
        )));
        Supervisor::new(
            state,
            Arc::new(pool),
            Arc::new(IdleSpeech),
            Arc::new(IdleTranslator),
            None,
        )
    }

    fn live(live: bool) -> LiveEvent {
        LiveEvent {
            room_id: 42,
            live,
            title: "test".into(),
        }
    }

    #[tokio::test]
    async fn session_starts_on_live_and_stops_on_off() {
        let sup = supervisor();
        let state = sup.state.clone();
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let run_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            sup.run(rx, run_cancel).await;
        });

        assert!(state.controller().is_none());
        tx.send(live(true)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(state.controller().is_some(), "live event must start a session");

        // Duplicate live event: still exactly one session.
        let before = Arc::as_ptr(&state.controller().unwrap());
        tx.send(live(true)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(before, Arc::as_ptr(&state.controller().unwrap()));

        tx.send(live(false)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(state.controller().is_none(), "off event must stop the session");

        cancel.cancel();
        let _ = handle.await;
    }

    #[tokio::test]
    async fn cancellation_winds_down_active_session() {
        let sup = supervisor();
        let state = sup.state.clone();
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let run_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            sup.run(rx, run_cancel).await;
        });

        tx.send(live(true)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(state.controller().is_some());

        cancel.cancel();
        let _ = handle.await;
        assert!(state.controller().is_none(), "cancel must stop the session");
    }
}
