//! Bullet-chat sender.
//!
//! One instance per credentialed account. Sends are a cookie-authenticated
//! form POST; the platform rejects messages sent too close together, so the
//! sender serializes its own sends behind an async mutex and sleeps out the
//! remainder of the cooldown before each one. Callers treat a send error as
//! final for that message.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Deserialize;
use sr_domain::config::AccountConfig;
use sr_domain::error::{Error, Result};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::traits::BulletSender;
use crate::util::from_reqwest;

pub struct DanmakuSender {
    account: String,
    api_base: String,
    cookie: String,
    csrf: String,
    cooldown: Duration,
    client: reqwest::Client,
    /// Completion instant of the last successful send.
    last_sent: Mutex<Option<Instant>>,
}

#[derive(Deserialize)]
struct SendReply {
    code: i64,
    #[serde(default)]
    message: String,
}

impl DanmakuSender {
    pub fn from_config(cfg: &AccountConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            account: cfg.name.clone(),
            api_base: cfg
                .api_base
                .clone()
                .unwrap_or_else(|| "https://api.live.bilibili.com".into()),
            cookie: cfg.credentials.cookie.clone(),
            csrf: cfg.credentials.csrf.clone(),
            cooldown: Duration::from_millis(cfg.cooldown_ms),
            client,
            last_sent: Mutex::new(None),
        })
    }

    fn err(&self, message: impl Into<String>) -> Error {
        Error::Send {
            account: self.account.clone(),
            message: message.into(),
        }
    }
}

#[async_trait::async_trait]
impl BulletSender for DanmakuSender {
    async fn send(&self, room_id: u64, text: &str) -> Result<()> {
        // Holding the guard across the whole send serializes this account.
        let mut last_sent = self.last_sent.lock().await;
        if let Some(prev) = *last_sent {
            let elapsed = prev.elapsed();
            if elapsed < self.cooldown {
                tokio::time::sleep(self.cooldown - elapsed).await;
            }
        }

        let rnd = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
            .to_string();
        let form = [
            ("roomid", room_id.to_string()),
            ("msg", text.to_string()),
            ("rnd", rnd),
            ("csrf", self.csrf.clone()),
            ("csrf_token", self.csrf.clone()),
        ];

        let resp = self
            .client
            .post(format!("{}/msg/send", self.api_base))
            .header(reqwest::header::COOKIE, &self.cookie)
            .form(&form)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(self.err(format!("HTTP {status}")));
        }
        let reply: SendReply = resp.json().await.map_err(from_reqwest)?;
        if reply.code != 0 {
            return Err(self.err(format!("code {}: {}", reply.code, reply.message)));
        }

        *last_sent = Some(Instant::now());
        tracing::debug!(account = %self.account, room_id, chars = text.chars().count(), "sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sr_domain::config::Credentials;

    fn sender(cooldown_ms: u64) -> DanmakuSender {
        DanmakuSender::from_config(&AccountConfig {
            name: "bot1".into(),
            platform: "bilibili".into(),
            credentials: Credentials {
                cookie: "SESSDATA=x".into(),
                csrf: "token".into(),
            },
            max_message_len: 20,
            cooldown_ms,
            api_base: Some("http://127.0.0.1:1".into()), // nothing listening
        })
        .unwrap()
    }

    #[tokio::test]
    async fn failed_send_does_not_start_cooldown() {
        let s = sender(60_000);
        // Connection refused — the send fails fast.
        assert!(s.send(1, "hello").await.is_err());
        // A failed send must not arm the cooldown timer, or the next
        // attempt would stall a full minute.
        assert!(s.last_sent.lock().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_spaces_out_sends() {
        let s = sender(2_000);
        *s.last_sent.lock().await = Some(Instant::now());

        // With the clock paused, the failing send still has to sleep the
        // cooldown out first; auto-advance makes this instant in test time.
        let before = Instant::now();
        let _ = s.send(1, "hello").await;
        assert!(before.elapsed() >= Duration::from_secs(2));
    }
}
