use sr_domain::error::Result;
use sr_domain::message::RecognitionEvent;
use tokio::sync::mpsc;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Translation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Single-text machine translation.
///
/// Implementations must tolerate any number of concurrent calls. An empty
/// or whitespace-only input yields an empty result without a provider
/// round-trip; an empty *result* for a non-empty input means "could not
/// produce the target language — skip this text".
#[async_trait::async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, source_lang: &str, target_lang: &str)
        -> Result<String>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PCM sources
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A byte source yielding 16 kHz mono s16le PCM.
///
/// `Ok(0)` signals end of stream (the capture process exited).
#[async_trait::async_trait]
pub trait PcmRead: Send {
    async fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Speech recognition
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Streaming speech recognition.
///
/// `stream` runs one single-use recognition session over the PCM source,
/// forwarding every recognition update (partials and finals) to `sink` as
/// soon as it arrives. It returns `Ok(())` when the PCM source hits EOF and
/// the session drains cleanly; any other termination (provider timeout,
/// transport failure) is an error, and the caller reconnects by calling
/// `stream` again.
#[async_trait::async_trait]
pub trait SpeechProvider: Send + Sync {
    async fn stream(
        &self,
        pcm: &mut dyn PcmRead,
        sink: mpsc::Sender<RecognitionEvent>,
    ) -> Result<()>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Bullet-chat sending
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A credentialed sending identity.
///
/// Implementations serialize their own sends and enforce their own
/// cooldown; callers may invoke `send` concurrently. A send error is final
/// for that message — the caller never retries through the same account.
#[async_trait::async_trait]
pub trait BulletSender: Send + Sync {
    async fn send(&self, room_id: u64, text: &str) -> Result<()>;
}
