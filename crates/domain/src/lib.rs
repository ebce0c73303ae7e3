pub mod config;
pub mod error;
pub mod lang;
pub mod message;

// Re-exports for convenience.
pub use error::{Error, Result};
pub use message::{LiveEvent, PendingView, RecognitionEvent, Translation};
