//! Streaming speech recognition over WebSocket.
//!
//! Wire protocol: after connecting, the client sends one JSON start frame
//! describing the audio, then streams raw PCM as binary frames (100 ms
//! each). The server answers with JSON recognition events. When the PCM
//! source ends, the client sends `{"event":"stop"}` and waits for the
//! server to close; a close after stop is a clean EOF, anything else is an
//! error. Providers cap a single streaming session (typically ~5 minutes),
//! so callers must expect errors and reconnect with a fresh session.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use sr_domain::config::{SttConfig, StreamerConfig};
use sr_domain::error::{Error, Result};
use sr_domain::message::RecognitionEvent;

use crate::traits::{PcmRead, SpeechProvider};

/// 100 ms of 16 kHz mono s16le audio.
const PCM_CHUNK_BYTES: usize = 3200;

pub struct WsSpeechProvider {
    endpoint: String,
    language: String,
    alt_languages: Vec<String>,
}

impl WsSpeechProvider {
    pub fn from_config(stt: &SttConfig, streamer: &StreamerConfig) -> Self {
        Self {
            endpoint: stt.endpoint.clone(),
            language: streamer.source_lang.clone(),
            alt_languages: streamer.alt_langs.clone(),
        }
    }

    fn start_frame(&self) -> String {
        serde_json::json!({
            "config": {
                "sample_rate": 16_000,
                "encoding": "s16le",
                "language": self.language,
                "alt_languages": self.alt_languages,
                "interim_results": true,
            }
        })
        .to_string()
    }
}

#[async_trait::async_trait]
impl SpeechProvider for WsSpeechProvider {
    async fn stream(
        &self,
        pcm: &mut dyn PcmRead,
        sink: mpsc::Sender<RecognitionEvent>,
    ) -> Result<()> {
        let (ws, _resp) = connect_async(self.endpoint.as_str())
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))?;
        let (mut tx, mut rx) = ws.split();

        tx.send(Message::Text(self.start_frame()))
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))?;
        tracing::debug!(endpoint = %self.endpoint, "recognition session open");

        let mut buf = vec![0u8; PCM_CHUNK_BYTES];
        let mut eof = false;
        loop {
            tokio::select! {
                // Pump audio upstream until the source ends.
                read = pcm.read(&mut buf), if !eof => {
                    match read? {
                        0 => {
                            eof = true;
                            tx.send(Message::Text(r#"{"event":"stop"}"#.into()))
                                .await
                                .map_err(|e| Error::WebSocket(e.to_string()))?;
                        }
                        n => {
                            tx.send(Message::Binary(buf[..n].to_vec()))
                                .await
                                .map_err(|e| Error::WebSocket(e.to_string()))?;
                        }
                    }
                }

                // Forward recognition events downstream.
                msg = rx.next() => {
                    match msg {
                        Some(Ok(Message::Text(payload))) => {
                            match serde_json::from_str::<RecognitionEvent>(&payload) {
                                Ok(event) => {
                                    if sink.send(event).await.is_err() {
                                        // Receiver is gone — the session is
                                        // being torn down.
                                        return Err(Error::Cancelled);
                                    }
                                }
                                Err(e) => {
                                    tracing::debug!(error = %e, %payload, "ignoring non-event frame");
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            return if eof {
                                Ok(())
                            } else {
                                Err(Error::Stt("server closed mid-stream".into()))
                            };
                        }
                        Some(Ok(_)) => {} // ping/pong/binary — nothing to do
                        Some(Err(e)) => return Err(Error::WebSocket(e.to_string())),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_frame_carries_audio_config() {
        let provider = WsSpeechProvider::from_config(
            &SttConfig {
                endpoint: "wss://stt.example/v1".into(),
            },
            &StreamerConfig {
                source_lang: "ja-JP".into(),
                alt_langs: vec!["en-US".into()],
                ..Default::default()
            },
        );
        let frame: serde_json::Value =
            serde_json::from_str(&provider.start_frame()).unwrap();
        assert_eq!(frame["config"]["sample_rate"], 16_000);
        assert_eq!(frame["config"]["language"], "ja-JP");
        assert_eq!(frame["config"]["alt_languages"][0], "en-US");
    }

    #[test]
    fn chunk_is_100ms_of_audio() {
        // 16 000 samples/s × 2 bytes × 0.1 s
        assert_eq!(PCM_CHUNK_BYTES, 3200);
    }
}
