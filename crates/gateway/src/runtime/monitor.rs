//! Live-status monitor.
//!
//! Polls the platform's room-info endpoint and pushes a [`LiveEvent`] into
//! the supervisor's channel on every observed transition. The first poll
//! always emits, so a stream that is already live when the process starts
//! gets a session immediately.

use std::time::Duration;

use serde_json::Value;
use sr_domain::config::MonitorConfig;
use sr_domain::error::{Error, Result};
use sr_domain::message::LiveEvent;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub struct LiveMonitor {
    api_base: String,
    room_id: u64,
    interval: Duration,
    client: reqwest::Client,
}

impl LiveMonitor {
    pub fn from_config(cfg: &MonitorConfig, room_id: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            room_id,
            interval: Duration::from_secs(cfg.poll_interval_sec.max(1)),
            client,
        })
    }

    /// Spawn the polling loop; the returned receiver yields transitions
    /// until `cancel` fires.
    pub fn spawn(self, cancel: CancellationToken) -> mpsc::Receiver<LiveEvent> {
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            let mut last_live: Option<bool> = None;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => {}
                }

                let (live, title) = match self.poll().await {
                    Ok(status) => status,
                    Err(e) => {
                        tracing::warn!(room_id = self.room_id, error = %e, "room poll failed");
                        continue;
                    }
                };
                if last_live == Some(live) {
                    continue;
                }
                last_live = Some(live);
                tracing::info!(room_id = self.room_id, live, %title, "live status changed");
                let event = LiveEvent {
                    room_id: self.room_id,
                    live,
                    title,
                };
                if tx.send(event).await.is_err() {
                    return;
                }
            }
        });
        rx
    }

    async fn poll(&self) -> Result<(bool, String)> {
        let url = format!(
            "{}/room/v1/Room/get_info?room_id={}",
            self.api_base, self.room_id
        );
        let json: Value = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?
            .json()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        parse_room_info(&json)
    }
}

fn parse_room_info(json: &Value) -> Result<(bool, String)> {
    if json["code"].as_i64().unwrap_or(-1) != 0 {
        return Err(Error::Http(format!(
            "room info refused: {}",
            json["message"].as_str().unwrap_or("unknown")
        )));
    }
    let data = &json["data"];
    // live_status: 0 idle, 1 live, 2 looping a recording.
    let live = data["live_status"].as_i64() == Some(1);
    let title = data["title"].as_str().unwrap_or_default().to_string();
    Ok((live, title))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_status_one_means_live() {
        let json: Value = serde_json::from_str(
            r#"{"code":0,"data":{"live_status":1,"title":"morning stream"}}"#,
        )
        .unwrap();
        assert_eq!(parse_room_info(&json).unwrap(), (true, "morning stream".into()));
    }

    #[test]
    fn round_loop_is_not_live() {
        let json: Value =
            serde_json::from_str(r#"{"code":0,"data":{"live_status":2,"title":"rerun"}}"#).unwrap();
        assert_eq!(parse_room_info(&json).unwrap(), (false, "rerun".into()));
    }

    #[test]
    fn api_error_propagates() {
        let json: Value = serde_json::from_str(r#"{"code":-400,"message":"bad room"}"#).unwrap();
        assert!(parse_room_info(&json).is_err());
    }
}
