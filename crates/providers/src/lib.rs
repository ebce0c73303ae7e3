pub mod pool;
pub mod sender;
pub mod stt;
pub mod traits;
pub mod translate;
pub(crate) mod util;

// Re-exports for convenience.
pub use pool::{Account, AccountPool};
pub use sender::DanmakuSender;
pub use stt::WsSpeechProvider;
pub use traits::{BulletSender, PcmRead, SpeechProvider, Translator};
pub use translate::GeminiTranslator;
