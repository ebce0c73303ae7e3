//! Per-live-session pipeline: capture → recognition → translation
//! fan-out → controller submission.
//!
//! Two reconnect layers with separate blast radii: a recognition-session
//! error rebuilds only the STT stream (capture keeps running, backoff
//! 1 s doubling to 30 s, reset after a session that actually worked),
//! while capture EOF tears the whole pipeline down and restarts it on the
//! same ladder. Sequence numbers are assigned here, by the single consumer
//! of recognition finals, *before* translation work fans out — workers
//! finish in any order and the controller reassembles by sequence.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use sr_domain::config::{CaptureConfig, StreamerConfig};
use sr_domain::error::Result;
use sr_domain::lang::is_lang_match;
use sr_domain::message::{RecognitionEvent, Translation};
use sr_providers::{PcmRead, SpeechProvider, Translator};
use tokio::sync::{mpsc, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::capture::{self, Capture};
use super::controller::Controller;
use super::pausable::PausableReader;

const BACKOFF_FLOOR: Duration = Duration::from_secs(1);
const BACKOFF_CEIL: Duration = Duration::from_secs(30);
/// A capture or recognition session that lived this long counts as a
/// success and resets its reconnect ladder.
const SUCCESS_RESET_AFTER: Duration = Duration::from_secs(60);

pub struct Agent {
    streamer: StreamerConfig,
    capture: CaptureConfig,
    stt: Arc<dyn SpeechProvider>,
    translator: Arc<dyn Translator>,
    controller: Arc<Controller>,
}

impl Agent {
    pub fn new(
        streamer: StreamerConfig,
        capture: CaptureConfig,
        stt: Arc<dyn SpeechProvider>,
        translator: Arc<dyn Translator>,
        controller: Arc<Controller>,
    ) -> Self {
        Self {
            streamer,
            capture,
            stt,
            translator,
            controller,
        }
    }

    /// Run until cancelled. The pipeline is restarted with exponential
    /// backoff whenever capture ends or fails; only cancellation exits.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut backoff = BACKOFF_FLOOR;
        loop {
            let started = Instant::now();
            // Dropping the pipeline future mid-await is safe: the capture
            // child is killed on drop and the recognition task watches the
            // same token.
            let result = tokio::select! {
                _ = cancel.cancelled() => return,
                result = self.run_pipeline(&cancel) => result,
            };
            match result {
                Ok(()) => tracing::info!(room = self.streamer.room_id, "capture ended"),
                Err(e) => tracing::warn!(room = self.streamer.room_id, error = %e, "pipeline failed"),
            }
            if cancel.is_cancelled() {
                return;
            }
            if started.elapsed() >= SUCCESS_RESET_AFTER {
                backoff = BACKOFF_FLOOR;
            }
            tracing::info!(delay_sec = backoff.as_secs(), "restarting pipeline");
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(backoff) => {}
            }
            backoff = (backoff * 2).min(BACKOFF_CEIL);
        }
    }

    /// One full capture lifetime. Returns `Ok(())` on capture EOF or
    /// cancellation; the caller decides whether to restart.
    async fn run_pipeline(&self, cancel: &CancellationToken) -> Result<()> {
        let url = capture::resolve_stream_url(&self.capture, self.streamer.room_id).await?;
        let (capture, stdout) = Capture::spawn(&self.capture, &url)?;

        // While every output is paused there is nothing to transcribe;
        // the reader drains capture and keeps the recognizer warm.
        let controller = self.controller.clone();
        let reader = PausableReader::new(stdout, Arc::new(move || controller.is_any_paused()));

        let (events_tx, events_rx) = mpsc::channel::<RecognitionEvent>(32);
        let stt_task = tokio::spawn(stt_reader_loop(
            self.stt.clone(),
            reader,
            events_tx,
            cancel.clone(),
        ));

        self.consume_events(events_rx).await;

        let _ = stt_task.await;
        capture.shutdown().await;
        Ok(())
    }

    /// Single consumer of recognition finals: assigns sequence numbers and
    /// fans each final out to a bounded pool of translation workers.
    async fn consume_events(&self, mut events: mpsc::Receiver<RecognitionEvent>) {
        let worker_cap = {
            let outputs = self.controller.output_configs().len();
            3usize.max(3 * outputs)
        };
        let workers = Arc::new(Semaphore::new(worker_cap));
        let tracker = TaskTracker::new();
        let mut seq: u64 = 0;

        while let Some(event) = events.recv().await {
            if !event.is_final || event.text.trim().is_empty() {
                continue;
            }
            if self.controller.is_any_paused() {
                tracing::debug!(text = %event.text, "all outputs paused — final dropped");
                continue;
            }

            let assigned = seq;
            seq += 1;

            // Back-pressure: block here, not inside the controller.
            let permit = match workers.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let translator = self.translator.clone();
            let controller = self.controller.clone();
            let source_default = self.streamer.source_lang.clone();
            tracker.spawn(async move {
                let _permit = permit;
                let translation =
                    translate_final(&*translator, &controller, assigned, event, &source_default)
                        .await;
                controller.submit(translation).await;
            });
        }

        tracker.close();
        tracker.wait().await;
    }
}

/// Keep a recognition session running over the PCM source.
///
/// A session ending in `Ok` means the source hit EOF: the event sender
/// drops, the results channel closes, and the pipeline winds down. An
/// error reconnects just the recognition layer — capture keeps flowing —
/// on the 1 s → 30 s ladder, reset once a session has actually worked.
async fn stt_reader_loop<R: PcmRead + 'static>(
    stt: Arc<dyn SpeechProvider>,
    mut reader: R,
    events: mpsc::Sender<RecognitionEvent>,
    cancel: CancellationToken,
) {
    let mut backoff = BACKOFF_FLOOR;
    loop {
        let session_start = Instant::now();
        let result = tokio::select! {
            _ = cancel.cancelled() => return,
            result = stt.stream(&mut reader, events.clone()) => result,
        };
        match result {
            Ok(()) => return,
            Err(e) => {
                if session_start.elapsed() >= SUCCESS_RESET_AFTER {
                    backoff = BACKOFF_FLOOR;
                }
                tracing::warn!(
                    error = %e,
                    retry_sec = backoff.as_secs(),
                    "recognition session failed — reconnecting"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = (backoff * 2).min(BACKOFF_CEIL);
            }
        }
    }
}

/// Translate one final into every language the current outputs need and
/// assemble the sequenced fan-out. A failed target language yields an
/// empty string so the sequence slot is still consumed downstream.
async fn translate_final(
    translator: &dyn Translator,
    controller: &Controller,
    seq: u64,
    event: RecognitionEvent,
    source_default: &str,
) -> Translation {
    let source_lang = if event.language.is_empty() {
        source_default.to_string()
    } else {
        event.language.clone()
    };

    let needed: HashSet<String> = controller
        .output_configs()
        .iter()
        .filter(|o| !o.target_lang.is_empty() && !is_lang_match(&source_lang, &o.target_lang))
        .map(|o| o.target_lang.clone())
        .collect();

    let jobs = needed.into_iter().map(|target| {
        let text = event.text.clone();
        let source = source_lang.clone();
        async move {
            let result = translator.translate(&text, &source, &target).await;
            let translated = match result {
                Ok(translated) => translated,
                Err(e) => {
                    tracing::warn!(target_lang = %target, error = %e, "translation failed");
                    String::new()
                }
            };
            (target, translated)
        }
    });
    let texts = futures_util::future::join_all(jobs).await.into_iter().collect();

    Translation {
        seq,
        source_text: event.text,
        source_lang,
        texts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::controller::ControllerSettings;
    use parking_lot::Mutex;
    use sr_domain::config::{AccountConfig, Credentials, OutputConfig};
    use sr_providers::{Account, AccountPool, BulletSender};
    use std::collections::HashMap;

    struct ScriptedTranslator {
        calls: Mutex<Vec<(String, String, String)>>,
        replies: HashMap<(String, String), String>,
    }

    #[async_trait::async_trait]
    impl Translator for ScriptedTranslator {
        async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String> {
            self.calls
                .lock()
                .push((text.into(), source.into(), target.into()));
            Ok(self
                .replies
                .get(&(text.to_string(), target.to_string()))
                .cloned()
                .unwrap_or_default())
        }
    }

    struct NullSender;

    #[async_trait::async_trait]
    impl BulletSender for NullSender {
        async fn send(&self, _room: u64, _text: &str) -> Result<()> {
            Ok(())
        }
    }

    fn controller_with(outputs: Vec<OutputConfig>) -> Arc<Controller> {
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
        Controller::new(ControllerSettings {
            outputs,
            pool: Arc::new(pool),
            streamer_room: 1,
            send_delay: Duration::from_secs(3),
            transcript: None,
        })
    }

    fn final_event(text: &str, language: &str) -> RecognitionEvent {
        RecognitionEvent {
            text: text.into(),
            is_final: true,
            language: language.into(),
            confidence: Some(0.9),
        }
    }

    fn out(name: &str, target: &str) -> OutputConfig {
        OutputConfig {
            name: name.into(),
            target_lang: target.into(),
            account: Some("bot1".into()),
            ..Default::default()
        }
    }

    struct FlakySpeech {
        calls: Arc<std::sync::atomic::AtomicUsize>,
        fail_first: usize,
    }

    #[async_trait::async_trait]
    impl sr_providers::SpeechProvider for FlakySpeech {
        async fn stream(
            &self,
            _pcm: &mut dyn PcmRead,
            _sink: mpsc::Sender<RecognitionEvent>,
        ) -> Result<()> {
            use std::sync::atomic::Ordering;
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                Err(sr_domain::error::Error::Stt("session timed out".into()))
            } else {
                Ok(())
            }
        }
    }

    struct SilentPcm;

    #[async_trait::async_trait]
    impl PcmRead for SilentPcm {
        async fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Ok(0)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stt_reconnect_backs_off_exponentially() {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let stt = Arc::new(FlakySpeech {
            calls: calls.clone(),
            fail_first: 3,
        });
        let (tx, _rx) = mpsc::channel(8);

        let started = tokio::time::Instant::now();
        stt_reader_loop(stt, SilentPcm, tx, CancellationToken::new()).await;

        // Three failures sleep 1 s + 2 s + 4 s before the fourth call
        // returns clean EOF.
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 4);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(7), "slept {elapsed:?}");
        assert!(elapsed < Duration::from_secs(8), "ladder overshot: {elapsed:?}");
    }

    #[tokio::test]
    async fn stt_reader_loop_stops_on_cancel() {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let stt = Arc::new(FlakySpeech {
            calls: calls.clone(),
            fail_first: usize::MAX,
        });
        let (tx, _rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        cancel.cancel();

        // Already-cancelled token: the loop exits during its first backoff
        // without spinning.
        stt_reader_loop(stt, SilentPcm, tx, cancel).await;
        assert!(calls.load(std::sync::atomic::Ordering::SeqCst) <= 1);
    }

    #[tokio::test]
    async fn fans_out_once_per_needed_language() {
        let translator = ScriptedTranslator {
            calls: Mutex::new(Vec::new()),
            replies: HashMap::from([
                (("こんにちは".to_string(), "zh-CN".to_string()), "你好".to_string()),
                (("こんにちは".to_string(), "en-US".to_string()), "Hello".to_string()),
            ]),
        };
        let controller = controller_with(vec![out("zh", "zh-CN"), out("en", "en-US")]);

        let translation = translate_final(
            &translator,
            &controller,
            0,
            final_event("こんにちは", "ja-JP"),
            "ja-JP",
        )
        .await;

        assert_eq!(translation.seq, 0);
        assert_eq!(translation.texts["zh-CN"], "你好");
        assert_eq!(translation.texts["en-US"], "Hello");

        let calls = translator.calls.lock();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|(text, source, _)| text == "こんにちは" && source == "ja-JP"));
    }

    #[tokio::test]
    async fn skips_targets_matching_the_source_language() {
        let translator = ScriptedTranslator {
            calls: Mutex::new(Vec::new()),
            replies: HashMap::new(),
        };
        let controller = controller_with(vec![out("ja", "ja-JP"), out("raw", "")]);

        let translation = translate_final(
            &translator,
            &controller,
            3,
            final_event("おはよう", "ja-JP"),
            "ja-JP",
        )
        .await;

        assert!(translation.texts.is_empty(), "nothing needed translating");
        assert!(translator.calls.lock().is_empty());
        assert_eq!(translation.source_text, "おはよう");
    }

    #[tokio::test]
    async fn empty_detected_language_falls_back_to_configured_source() {
        let translator = ScriptedTranslator {
            calls: Mutex::new(Vec::new()),
            replies: HashMap::new(),
        };
        let controller = controller_with(vec![out("ja", "ja-JP")]);

        let translation =
            translate_final(&translator, &controller, 0, final_event("テスト", ""), "ja-JP").await;

        // With the fallback source ja-JP, the ja-JP output needs no call.
        assert!(translator.calls.lock().is_empty());
        assert_eq!(translation.source_lang, "ja-JP");
    }

    #[tokio::test]
    async fn duplicate_target_languages_translate_once() {
        let translator = ScriptedTranslator {
            calls: Mutex::new(Vec::new()),
            replies: HashMap::from([(
                ("こんにちは".to_string(), "zh-CN".to_string()),
                "你好".to_string(),
            )]),
        };
        // Two outputs, same target language, different rooms.
        let mut second = out("zh-alt", "zh-CN");
        second.room_id = 7;
        let controller = controller_with(vec![out("zh", "zh-CN"), second]);

        let translation = translate_final(
            &translator,
            &controller,
            0,
            final_event("こんにちは", "ja-JP"),
            "ja-JP",
        )
        .await;

        assert_eq!(translator.calls.lock().len(), 1, "shared language translates once");
        assert_eq!(translation.texts["zh-CN"], "你好");
    }
}
