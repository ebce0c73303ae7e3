//! Delivery controller — the ordered, reviewed path from a finished
//! translation to a posted message.
//!
//! One controller runs per live session. It owns, per output: a sequence
//! reassembly buffer (translations finish out of order; sends must not), a
//! share of the global review queue (the configured delay between enqueue
//! and send, during which an operator can skip or pause), and a
//! round-robin cursor over the output's account pool. Messages longer than
//! the pool's smallest platform cap are chunked on punctuation.
//!
//! Locking discipline: `Shared` sits behind one RwLock with short critical
//! sections and is never held across I/O. The reassembly buffers and the
//! review queue itself live on the controller task and need no lock at
//! all. Change callbacks are dispatched from a spawned task so a slow
//! subscriber cannot stall a send.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use sr_domain::config::OutputConfig;
use sr_domain::lang::is_lang_match;
use sr_domain::message::{OutputStateView, PendingView, Translation};
use sr_providers::AccountPool;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, MissedTickBehavior};

use super::transcript::TranscriptWriter;

/// Submissions beyond this stall the submitter, never drop.
const INPUT_CAPACITY: usize = 100;
/// Review-queue scan cadence.
const SCAN_TICK: Duration = Duration::from_millis(200);
/// Sent-message ring kept per output for the control plane.
const RECENT_CAP: usize = 5;
/// Sequence indicator appended to the prefix when `show_seq` is set.
const SEQ_EMOJI: [&str; 11] = [
    "0️⃣", "1️⃣", "2️⃣", "3️⃣", "4️⃣", "5️⃣", "6️⃣", "7️⃣", "8️⃣", "9️⃣", "🔟",
];

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// State
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ControllerSettings {
    pub outputs: Vec<OutputConfig>,
    pub pool: Arc<AccountPool>,
    pub streamer_room: u64,
    pub send_delay: Duration,
    pub transcript: Option<Arc<TranscriptWriter>>,
}

#[derive(Debug)]
struct PendingMsg {
    id: u64,
    text: String,
    send_at: Instant,
}

#[derive(Default)]
struct OutputState {
    paused: bool,
    last_text: String,
    pending: VecDeque<PendingMsg>,
    recent: VecDeque<String>,
}

/// Control-plane-visible state, one lock for all of it.
struct Shared {
    outputs: Vec<OutputConfig>,
    states: HashMap<String, OutputState>,
    skip: HashSet<u64>,
    rr: HashMap<String, usize>,
}

/// Per-output sequence reassembly. `waiting` holds resolved texts keyed by
/// sequence number until the gap below them closes; `None` marks a slot
/// that consumes its sequence number without enqueueing (failed or
/// unneeded translation), so later items can still flush.
struct Reorder {
    next_seq: u64,
    waiting: HashMap<u64, Option<String>>,
}

struct QueuedItem {
    id: u64,
    output: String,
    text: String,
    seq: u64,
    send_at: Instant,
}

/// Owned by the controller task; no locking.
struct LoopState {
    reorder: HashMap<String, Reorder>,
    queue: VecDeque<QueuedItem>,
}

type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

pub struct Controller {
    shared: RwLock<Shared>,
    callbacks: RwLock<Vec<ChangeCallback>>,
    next_msg_id: AtomicU64,
    input_tx: RwLock<Option<mpsc::Sender<Translation>>>,
    input_rx: Mutex<Option<mpsc::Receiver<Translation>>>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
    pool: Arc<AccountPool>,
    streamer_room: u64,
    send_delay: Duration,
    transcript: Option<Arc<TranscriptWriter>>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Construction & lifecycle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

impl Controller {
    pub fn new(settings: ControllerSettings) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(INPUT_CAPACITY);
        let mut states = HashMap::new();
        let mut rr = HashMap::new();
        for output in &settings.outputs {
            states.insert(output.name.clone(), OutputState::default());
            rr.insert(output.name.clone(), 0);
        }
        Arc::new(Self {
            shared: RwLock::new(Shared {
                outputs: settings.outputs,
                states,
                skip: HashSet::new(),
                rr,
            }),
            callbacks: RwLock::new(Vec::new()),
            next_msg_id: AtomicU64::new(0),
            input_tx: RwLock::new(Some(tx)),
            input_rx: Mutex::new(Some(rx)),
            loop_handle: Mutex::new(None),
            pool: settings.pool,
            streamer_room: settings.streamer_room,
            send_delay: settings.send_delay,
            transcript: settings.transcript,
        })
    }

    /// Spawn the controller task. Idempotent: the second call is a no-op.
    pub async fn start(self: &Arc<Self>) {
        let Some(rx) = self.input_rx.lock().await.take() else {
            return;
        };
        let this = self.clone();
        *self.loop_handle.lock().await = Some(tokio::spawn(this.run_loop(rx)));
    }

    /// Submit one fanned-out translation. Stalls when the input channel is
    /// full; silently drops after [`Controller::stop`].
    pub async fn submit(&self, translation: Translation) {
        let tx = self.input_tx.read().clone();
        if let Some(tx) = tx {
            let _ = tx.send(translation).await;
        }
    }

    /// Close the input, drain buffered translations, then flush the review
    /// queue — every non-skipped in-flight item gets a send attempt.
    /// Returns once the controller task has exited.
    pub async fn stop(&self) {
        self.input_tx.write().take();
        let handle = self.loop_handle.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Controller task
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    async fn run_loop(self: Arc<Self>, mut rx: mpsc::Receiver<Translation>) {
        let initial: Vec<String> = self.shared.read().states.keys().cloned().collect();
        let mut local = LoopState {
            reorder: initial
                .into_iter()
                .map(|name| {
                    (
                        name,
                        Reorder {
                            next_seq: 0,
                            waiting: HashMap::new(),
                        },
                    )
                })
                .collect(),
            queue: VecDeque::new(),
        };

        let mut ticker = tokio::time::interval(SCAN_TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                maybe = rx.recv() => match maybe {
                    Some(translation) => self.on_translation(&mut local, translation),
                    None => break,
                },
                _ = ticker.tick() => self.fire_due(&mut local).await,
            }
        }

        // Input closed and drained. Flush what is still waiting out its
        // review window, honoring skips but not pauses, so nothing sits
        // invisibly in a dead queue.
        if !local.queue.is_empty() {
            tracing::info!(remaining = local.queue.len(), "flushing review queue on stop");
        }
        while let Some(item) = local.queue.pop_front() {
            self.fire(item, true).await;
        }
    }

    fn on_translation(&self, local: &mut LoopState, translation: Translation) {
        let outputs: Vec<OutputConfig> = self.shared.read().outputs.clone();
        local
            .reorder
            .retain(|name, _| outputs.iter().any(|o| &o.name == name));

        for output in &outputs {
            let resolved = resolve_text(output, &translation);

            if let (Some(text), Some(transcript)) = (&resolved, &self.transcript) {
                if !text.is_empty() {
                    transcript.append(
                        translation.seq,
                        &translation.source_lang,
                        &translation.source_text,
                        &output.target_lang,
                        text,
                    );
                }
            }

            // Outputs added mid-session start their sequence space at the
            // first translation they observe.
            let mut flushed: Vec<(u64, String)> = Vec::new();
            {
                let buf = local.reorder.entry(output.name.clone()).or_insert(Reorder {
                    next_seq: translation.seq,
                    waiting: HashMap::new(),
                });
                if translation.seq < buf.next_seq {
                    tracing::debug!(
                        output = %output.name,
                        seq = translation.seq,
                        "sequence below reassembly window — dropped"
                    );
                    continue;
                }
                buf.waiting
                    .insert(translation.seq, resolved.filter(|t| !t.is_empty()));

                // Flush every consecutive slot. Empty slots consume their
                // sequence number and enqueue nothing.
                while let Some(slot) = buf.waiting.remove(&buf.next_seq) {
                    let seq = buf.next_seq;
                    buf.next_seq += 1;
                    if let Some(text) = slot {
                        flushed.push((seq, text));
                    }
                }
            }
            for (seq, text) in flushed {
                self.enqueue(local, output, seq, text);
            }
        }
    }

    fn enqueue(&self, local: &mut LoopState, output: &OutputConfig, seq: u64, text: String) {
        {
            let mut shared = self.shared.write();
            let Some(state) = shared.states.get_mut(&output.name) else {
                return;
            };
            if state.paused {
                tracing::info!(output = %output.name, seq, "dropped at enqueue — output paused");
                drop(shared);
                self.notify_change();
                return;
            }
            let id = self.next_msg_id.fetch_add(1, Ordering::Relaxed);
            let send_at = Instant::now() + self.send_delay;
            state.pending.push_back(PendingMsg {
                id,
                text: text.clone(),
                send_at,
            });
            local.queue.push_back(QueuedItem {
                id,
                output: output.name.clone(),
                text,
                seq,
                send_at,
            });
        }
        self.notify_change();
    }

    async fn fire_due(&self, local: &mut LoopState) {
        let now = Instant::now();
        while local.queue.front().is_some_and(|item| item.send_at <= now) {
            if let Some(item) = local.queue.pop_front() {
                self.fire(item, false).await;
            }
        }
    }

    /// Resolve one due item: skipped, dropped-paused, or sent. The skip
    /// check lives inside the same critical section that commits to
    /// sending, so a skip that races the timer still wins.
    async fn fire(&self, item: QueuedItem, flushing: bool) {
        enum Decision {
            Skipped,
            PausedDrop,
            Gone,
            Send(OutputConfig),
        }

        let decision = {
            let mut shared = self.shared.write();
            if shared.skip.remove(&item.id) {
                remove_pending(&mut shared, &item.output, item.id);
                Decision::Skipped
            } else {
                match shared.states.get(&item.output) {
                    None => Decision::Gone,
                    Some(state) if state.paused && !flushing => {
                        remove_pending(&mut shared, &item.output, item.id);
                        Decision::PausedDrop
                    }
                    Some(_) => match shared.outputs.iter().find(|o| o.name == item.output) {
                        Some(cfg) => Decision::Send(cfg.clone()),
                        None => Decision::Gone,
                    },
                }
            }
        };

        match decision {
            Decision::Skipped => self.notify_change(),
            Decision::Gone => {}
            Decision::PausedDrop => {
                tracing::info!(output = %item.output, seq = item.seq, "dropped at send — output paused");
                self.notify_change();
            }
            Decision::Send(cfg) => {
                let sent = self.send_message(&cfg, &item).await;
                {
                    let mut shared = self.shared.write();
                    remove_pending(&mut shared, &item.output, item.id);
                    // A skip that arrived while the send was in flight lost
                    // the race; drop its mark instead of leaking it.
                    shared.skip.remove(&item.id);
                    if sent {
                        if let Some(state) = shared.states.get_mut(&item.output) {
                            state.last_text = item.text.clone();
                            state.recent.push_back(item.text.clone());
                            while state.recent.len() > RECENT_CAP {
                                state.recent.pop_front();
                            }
                        }
                    }
                }
                self.notify_change();
            }
        }
    }

    /// Chunk and send one message. Returns `false` when nothing or only a
    /// part went out; a failed chunk aborts the rest of the message.
    async fn send_message(&self, cfg: &OutputConfig, item: &QueuedItem) -> bool {
        let pool_names = cfg.account_names();
        if pool_names.is_empty() {
            tracing::debug!(output = %cfg.name, "no accounts configured — message not sent");
            return false;
        }

        let room = cfg.effective_room(self.streamer_room);
        let mut prefix = cfg.prefix.clone();
        if cfg.show_seq {
            prefix.push_str(SEQ_EMOJI[(item.seq % SEQ_EMOJI.len() as u64) as usize]);
        }
        // The smallest cap in the pool: any chunk fits any account.
        let max_len = self.pool.min_max_len(&pool_names);
        let chunks = split_with_wrap(&item.text, &prefix, &cfg.suffix, max_len);

        for chunk in &chunks {
            let idx = {
                let mut shared = self.shared.write();
                let cursor = shared.rr.entry(cfg.name.clone()).or_insert(0);
                let idx = *cursor % pool_names.len();
                *cursor += 1;
                idx
            };
            let Some(account) = self.pool.get(&pool_names[idx]) else {
                tracing::warn!(
                    output = %cfg.name,
                    account = %pool_names[idx],
                    "account missing from pool — aborting message"
                );
                return false;
            };
            if let Err(e) = account.sender().send(room, chunk).await {
                tracing::warn!(
                    output = %cfg.name,
                    seq = item.seq,
                    error = %e,
                    "send failed — aborting remaining chunks"
                );
                return false;
            }
        }
        true
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Control operations
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// True iff every output is paused and at least one output exists.
    /// The agent gates the pause-aware PCM reader on this.
    pub fn is_any_paused(&self) -> bool {
        let shared = self.shared.read();
        !shared.states.is_empty() && shared.states.values().all(|s| s.paused)
    }

    /// Returns the new paused state, or `None` for an unknown output.
    pub fn toggle_pause(&self, name: &str) -> Option<bool> {
        let paused = {
            let mut shared = self.shared.write();
            let state = shared.states.get_mut(name)?;
            state.paused = !state.paused;
            state.paused
        };
        self.notify_change();
        Some(paused)
    }

    pub fn set_paused(&self, name: &str, paused: bool) -> bool {
        let found = {
            let mut shared = self.shared.write();
            match shared.states.get_mut(name) {
                Some(state) => {
                    state.paused = paused;
                    true
                }
                None => false,
            }
        };
        if found {
            self.notify_change();
        }
        found
    }

    pub fn set_show_seq(&self, name: &str, show_seq: bool) -> bool {
        let found = {
            let mut shared = self.shared.write();
            match shared.outputs.iter_mut().find(|o| o.name == name) {
                Some(output) => {
                    output.show_seq = show_seq;
                    true
                }
                None => false,
            }
        };
        if found {
            self.notify_change();
        }
        found
    }

    /// Remove a message from its review window. Safe against the firing
    /// race: the id goes into the skip set, which the firing path checks
    /// before committing to a send.
    pub fn skip_pending(&self, id: u64) -> bool {
        let found = {
            let mut shared = self.shared.write();
            let mut found = false;
            for state in shared.states.values_mut() {
                if let Some(pos) = state.pending.iter().position(|m| m.id == id) {
                    state.pending.remove(pos);
                    found = true;
                    break;
                }
            }
            if found {
                shared.skip.insert(id);
            }
            found
        };
        if found {
            self.notify_change();
        }
        found
    }

    /// Replace the output list. Outputs retained by name keep their pause
    /// flag, review queue, and recent ring; new outputs come up paused so
    /// a hot config edit never surprises a live room.
    pub fn sync_outputs(&self, outputs: Vec<OutputConfig>) {
        {
            let mut shared = self.shared.write();
            let mut states = std::mem::take(&mut shared.states);
            let mut rr = std::mem::take(&mut shared.rr);
            for output in &outputs {
                let state = states.remove(&output.name).unwrap_or(OutputState {
                    paused: true,
                    ..Default::default()
                });
                shared.states.insert(output.name.clone(), state);
                let cursor = rr.remove(&output.name).unwrap_or(0);
                shared.rr.insert(output.name.clone(), cursor);
            }
            shared.outputs = outputs;
        }
        self.notify_change();
    }

    /// In-place metadata update; runtime state untouched. Unknown names
    /// are a no-op.
    pub fn update_output(&self, cfg: OutputConfig) -> bool {
        let found = {
            let mut shared = self.shared.write();
            match shared.outputs.iter_mut().find(|o| o.name == cfg.name) {
                Some(slot) => {
                    *slot = cfg;
                    true
                }
                None => false,
            }
        };
        if found {
            self.notify_change();
        }
        found
    }

    /// Current output configs, in routing order.
    pub fn output_configs(&self) -> Vec<OutputConfig> {
        self.shared.read().outputs.clone()
    }

    /// Deep snapshot for the control plane.
    pub fn output_states(&self) -> Vec<OutputStateView> {
        let shared = self.shared.read();
        let now = Instant::now();
        shared
            .outputs
            .iter()
            .filter_map(|output| {
                let state = shared.states.get(&output.name)?;
                Some(OutputStateView {
                    name: output.name.clone(),
                    paused: state.paused,
                    last_text: state.last_text.clone(),
                    pending: state
                        .pending
                        .iter()
                        .map(|m| PendingView {
                            id: m.id,
                            text: m.text.clone(),
                            remain_sec: remain_sec(m.send_at, now),
                        })
                        .collect(),
                    recent: state.recent.iter().cloned().collect(),
                })
            })
            .collect()
    }

    /// Register a change callback, fired after enqueue, skip, pause-drop,
    /// send, and control mutations. Dispatch is asynchronous.
    pub fn on_change(&self, callback: ChangeCallback) {
        self.callbacks.write().push(callback);
    }

    fn notify_change(&self) {
        let callbacks: Vec<ChangeCallback> = self.callbacks.read().clone();
        if callbacks.is_empty() {
            return;
        }
        tokio::spawn(async move {
            for callback in callbacks {
                callback();
            }
        });
    }
}

fn remove_pending(shared: &mut Shared, output: &str, id: u64) {
    if let Some(state) = shared.states.get_mut(output) {
        if let Some(pos) = state.pending.iter().position(|m| m.id == id) {
            state.pending.remove(pos);
        }
    }
}

fn remain_sec(send_at: Instant, now: Instant) -> u64 {
    let ms = send_at.saturating_duration_since(now).as_millis() as u64;
    ms.div_ceil(1000)
}

/// Resolve the text this output should post for a translation: direct
/// pass-through, the translated text for its target language, or the
/// source when it already is the target language. `None` means the output
/// has nothing to post for this sequence number.
fn resolve_text(output: &OutputConfig, translation: &Translation) -> Option<String> {
    if output.target_lang.is_empty() {
        return Some(translation.source_text.clone());
    }
    if let Some(text) = translation.texts.get(&output.target_lang) {
        return Some(text.clone());
    }
    if is_lang_match(&translation.source_lang, &output.target_lang) {
        return Some(translation.source_text.clone());
    }
    None
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Chunking
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const BREAK_CHARS: [char; 4] = [' ', '、', '，', '。'];

/// Split `text` into prefix/suffix-wrapped chunks of at most `max_len`
/// code points. When a chunk has to break mid-text, a break character in
/// the back half of the chunk is preferred over a hard cut. `max_len == 0`
/// means no cap. When the wrappers alone exceed the cap, the single
/// oversize chunk is returned as-is rather than sending nothing.
pub(crate) fn split_with_wrap(text: &str, prefix: &str, suffix: &str, max_len: usize) -> Vec<String> {
    let wrapped = format!("{prefix}{text}{suffix}");
    if max_len == 0 || wrapped.chars().count() <= max_len {
        return vec![wrapped];
    }
    let wrap_len = prefix.chars().count() + suffix.chars().count();
    let content_max = max_len.saturating_sub(wrap_len);
    if content_max == 0 {
        return vec![wrapped];
    }

    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let hard_end = (start + content_max).min(chars.len());
        let mut end = hard_end;
        if hard_end < chars.len() {
            let floor = start + content_max / 2;
            let mut cursor = hard_end;
            while cursor > floor {
                if BREAK_CHARS.contains(&chars[cursor - 1]) {
                    end = cursor;
                    break;
                }
                cursor -= 1;
            }
        }
        let body: String = chars[start..end].iter().collect();
        chunks.push(format!("{prefix}{body}{suffix}"));
        start = end;
    }
    chunks
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
