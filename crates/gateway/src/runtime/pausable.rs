//! Pause-aware PCM reader.
//!
//! When the pipeline is paused there is nothing to transcribe, but the
//! capture process keeps producing audio and the recognizer times out on
//! prolonged silence. So "paused" cannot mean "stop reading": this wrapper
//! keeps draining the upstream reader in 100 ms blocks and throws the
//! bytes away, yielding nothing downstream until unpaused. Capture never
//! backs up and the recognition session stays warm.

use std::sync::Arc;
use std::time::Duration;

use sr_providers::PcmRead;
use tokio::io::{AsyncRead, AsyncReadExt};

/// 100 ms of 16 kHz mono s16le audio.
const DISCARD_BLOCK: usize = 3200;
const PAUSE_POLL: Duration = Duration::from_millis(50);

pub struct PausableReader<R> {
    inner: R,
    is_paused: Arc<dyn Fn() -> bool + Send + Sync>,
}

impl<R> PausableReader<R> {
    pub fn new(inner: R, is_paused: Arc<dyn Fn() -> bool + Send + Sync>) -> Self {
        Self { inner, is_paused }
    }
}

#[async_trait::async_trait]
impl<R: AsyncRead + Unpin + Send> PcmRead for PausableReader<R> {
    async fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut discard = [0u8; DISCARD_BLOCK];
        while (self.is_paused)() {
            let n = self.inner.read(&mut discard).await?;
            if n == 0 {
                return Ok(0);
            }
            tokio::time::sleep(PAUSE_POLL).await;
        }
        self.inner.read(buf).await
    }
}
