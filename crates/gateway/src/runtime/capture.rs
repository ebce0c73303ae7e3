//! Audio capture — stream-URL resolution plus an ffmpeg child process
//! that remuxes the broadcast into raw 16 kHz mono s16le PCM on stdout.

use std::process::Stdio;
use std::time::Duration;

use serde_json::Value;
use sr_domain::config::CaptureConfig;
use sr_domain::error::{Error, Result};
use tokio::process::{Child, ChildStdout, Command};

/// Ask the platform for a playable URL for the room.
pub async fn resolve_stream_url(cfg: &CaptureConfig, room_id: u64) -> Result<String> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| Error::Http(e.to_string()))?;

    let url = format!(
        "{}/room/v1/Room/playUrl?cid={}&platform=web&quality=4",
        cfg.stream_api_base.trim_end_matches('/'),
        room_id
    );
    let json: Value = client
        .get(&url)
        .send()
        .await
        .map_err(|e| Error::Http(e.to_string()))?
        .json()
        .await
        .map_err(|e| Error::Http(e.to_string()))?;

    parse_play_url(&json)
}

fn parse_play_url(json: &Value) -> Result<String> {
    if json["code"].as_i64().unwrap_or(-1) != 0 {
        return Err(Error::Capture(format!(
            "playUrl refused: {}",
            json["message"].as_str().unwrap_or("unknown")
        )));
    }
    json["data"]["durl"][0]["url"]
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| Error::Capture("playUrl response carries no stream url".into()))
}

/// A running capture process. Killing the child on drop means an aborted
/// pipeline never leaks an ffmpeg.
pub struct Capture {
    child: Child,
}

impl Capture {
    /// Spawn ffmpeg against the stream URL. Returns the capture handle and
    /// the PCM stdout reader.
    pub fn spawn(cfg: &CaptureConfig, stream_url: &str) -> Result<(Self, ChildStdout)> {
        let mut child = Command::new(&cfg.ffmpeg_path)
            .args([
                "-hide_banner",
                "-loglevel",
                "error",
                "-i",
                stream_url,
                "-vn",
                "-f",
                "s16le",
                "-ar",
                "16000",
                "-ac",
                "1",
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Capture(format!("spawning {}: {e}", cfg.ffmpeg_path)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Capture("capture child has no stdout".into()))?;
        tracing::info!(ffmpeg = %cfg.ffmpeg_path, "capture started");
        Ok((Self { child }, stdout))
    }

    /// Reap the child if it already exited; kill it otherwise.
    pub async fn shutdown(mut self) {
        match self.child.try_wait() {
            Ok(Some(status)) => {
                tracing::debug!(%status, "capture process already exited");
            }
            _ => {
                let _ = self.child.kill().await;
            }
        }
    }
}
