use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub streamer: StreamerConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub stt: SttConfig,
    #[serde(default)]
    pub translation: TranslationConfig,
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub transcript: TranscriptConfig,
    /// Credentialed sender accounts, shared by all outputs.
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
    /// Routing rules: one entry per (language × account-pool × room) target.
    #[serde(default)]
    pub outputs: Vec<OutputConfig>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Streamer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamerConfig {
    #[serde(default)]
    pub name: String,
    /// The monitored room. Required.
    #[serde(default)]
    pub room_id: u64,
    /// Primary spoken language, passed to the recognizer.
    #[serde(default = "d_source_lang")]
    pub source_lang: String,
    /// Additional languages the recognizer may detect.
    #[serde(default = "d_alt_langs")]
    pub alt_langs: Vec<String>,
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            room_id: 0,
            source_lang: d_source_lang(),
            alt_langs: d_alt_langs(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Live-status monitor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "d_live_api")]
    pub api_base: String,
    #[serde(default = "d_10")]
    pub poll_interval_sec: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            api_base: d_live_api(),
            poll_interval_sec: 10,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Audio capture
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "d_ffmpeg")]
    pub ffmpeg_path: String,
    /// Endpoint that resolves a room id to a playable stream URL.
    #[serde(default = "d_live_api")]
    pub stream_api_base: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: d_ffmpeg(),
            stream_api_base: d_live_api(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Speech-to-text
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SttConfig {
    /// WebSocket endpoint of the streaming recognizer.
    #[serde(default)]
    pub endpoint: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Translation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationConfig {
    #[serde(default = "d_provider")]
    pub provider: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "d_model")]
    pub model: String,
    #[serde(default = "d_translate_api")]
    pub endpoint: String,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            provider: d_provider(),
            api_key: String::new(),
            model: d_model(),
            endpoint: d_translate_api(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Controller
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Review window: delay between enqueue and send.
    #[serde(default = "d_3000")]
    pub send_delay_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self { send_delay_ms: 3000 }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Control-plane server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_3210")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: d_host(),
            port: 3210,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transcript sink
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TranscriptConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub path: Option<PathBuf>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Accounts
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    pub name: String,
    #[serde(default = "d_platform")]
    pub platform: String,
    #[serde(default)]
    pub credentials: Credentials,
    /// Platform character cap, in code points, for this account.
    #[serde(default = "d_20")]
    pub max_message_len: usize,
    /// Minimum spacing between sends through this account.
    #[serde(default = "d_2000")]
    pub cooldown_ms: u64,
    /// Overrides the platform's default message endpoint.
    #[serde(default)]
    pub api_base: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Credentials {
    #[serde(default)]
    pub cookie: String,
    #[serde(default)]
    pub csrf: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outputs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct OutputConfig {
    /// Unique within the active config.
    pub name: String,
    #[serde(default = "d_platform")]
    pub platform: String,
    /// Empty ⇒ pass the source text through untranslated.
    #[serde(default)]
    pub target_lang: String,
    /// Singular form; `accounts` takes precedence when non-empty.
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub accounts: Vec<String>,
    /// 0 ⇒ post into the monitored room.
    #[serde(default)]
    pub room_id: u64,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub suffix: String,
    /// Append a sequence indicator to the prefix.
    #[serde(default)]
    pub show_seq: bool,
}

impl OutputConfig {
    /// The ordered account pool for this output. `accounts` wins over the
    /// singular `account`; both absent ⇒ empty pool (dead-drop output).
    pub fn account_names(&self) -> Vec<String> {
        if !self.accounts.is_empty() {
            return self.accounts.clone();
        }
        self.account.clone().into_iter().collect()
    }

    /// The room this output posts into.
    pub fn effective_room(&self, streamer_room: u64) -> u64 {
        if self.room_id != 0 {
            self.room_id
        } else {
            streamer_room
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub message: String,
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Config {
    /// Check the config for problems. Errors should refuse startup;
    /// warnings are logged and tolerated.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        let error = |msg: String| ConfigIssue {
            severity: ConfigSeverity::Error,
            message: msg,
        };
        let warning = |msg: String| ConfigIssue {
            severity: ConfigSeverity::Warning,
            message: msg,
        };

        if self.streamer.room_id == 0 {
            issues.push(error("streamer.room_id is required".into()));
        }
        if self.stt.endpoint.is_empty() {
            issues.push(error("stt.endpoint is required".into()));
        }

        let mut seen = std::collections::HashSet::new();
        for output in &self.outputs {
            if !seen.insert(output.name.as_str()) {
                issues.push(error(format!("duplicate output name: {}", output.name)));
            }
            let pool = output.account_names();
            if pool.is_empty() {
                issues.push(warning(format!(
                    "output {} has no accounts — its messages will never send",
                    output.name
                )));
            }
            for account in &pool {
                if !self.accounts.iter().any(|a| &a.name == account) {
                    issues.push(error(format!(
                        "output {} references unknown account: {}",
                        output.name, account
                    )));
                }
            }
        }

        for account in &self.accounts {
            if account.max_message_len == 0 {
                issues.push(error(format!(
                    "account {}: max_message_len must be at least 1",
                    account.name
                )));
            }
        }

        let needs_translation = self.outputs.iter().any(|o| !o.target_lang.is_empty());
        if needs_translation && self.translation.api_key.is_empty() {
            issues.push(error(
                "translation.api_key is required when any output sets target_lang".into(),
            ));
        }

        if self.transcript.enabled && self.transcript.path.is_none() {
            issues.push(warning(
                "transcript.enabled is set but transcript.path is missing — transcripts disabled"
                    .into(),
            ));
        }

        issues
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Serde default helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn d_source_lang() -> String {
    "ja-JP".into()
}
fn d_alt_langs() -> Vec<String> {
    vec!["en-US".into()]
}
fn d_live_api() -> String {
    "https://api.live.bilibili.com".into()
}
fn d_translate_api() -> String {
    "https://generativelanguage.googleapis.com".into()
}
fn d_provider() -> String {
    "gemini".into()
}
fn d_model() -> String {
    "gemini-2.0-flash".into()
}
fn d_ffmpeg() -> String {
    "ffmpeg".into()
}
fn d_platform() -> String {
    "bilibili".into()
}
fn d_host() -> String {
    "127.0.0.1".into()
}
fn d_3210() -> u16 {
    3210
}
fn d_10() -> u64 {
    10
}
fn d_20() -> usize {
    20
}
fn d_2000() -> u64 {
    2000
}
fn d_3000() -> u64 {
    3000
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(name: &str) -> AccountConfig {
        AccountConfig {
            name: name.into(),
            platform: d_platform(),
            credentials: Credentials::default(),
            max_message_len: 20,
            cooldown_ms: 2000,
            api_base: None,
        }
    }

    fn valid_config() -> Config {
        Config {
            streamer: StreamerConfig {
                room_id: 42,
                ..Default::default()
            },
            stt: SttConfig {
                endpoint: "wss://stt.example/v1".into(),
            },
            accounts: vec![account("bot1")],
            outputs: vec![OutputConfig {
                name: "jp".into(),
                account: Some("bot1".into()),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn valid_config_has_no_errors() {
        let issues = valid_config().validate();
        assert!(
            issues.iter().all(|i| i.severity != ConfigSeverity::Error),
            "{issues:?}"
        );
    }

    #[test]
    fn missing_room_is_an_error() {
        let mut config = valid_config();
        config.streamer.room_id = 0;
        let issues = config.validate();
        assert!(issues
            .iter()
            .any(|i| i.severity == ConfigSeverity::Error && i.message.contains("room_id")));
    }

    #[test]
    fn duplicate_output_names_rejected() {
        let mut config = valid_config();
        config.outputs.push(config.outputs[0].clone());
        let issues = config.validate();
        assert!(issues
            .iter()
            .any(|i| i.severity == ConfigSeverity::Error && i.message.contains("duplicate")));
    }

    #[test]
    fn unknown_account_reference_rejected() {
        let mut config = valid_config();
        config.outputs[0].account = Some("ghost".into());
        let issues = config.validate();
        assert!(issues
            .iter()
            .any(|i| i.severity == ConfigSeverity::Error && i.message.contains("ghost")));
    }

    #[test]
    fn empty_pool_is_only_a_warning() {
        let mut config = valid_config();
        config.outputs[0].account = None;
        let issues = config.validate();
        assert!(issues.iter().all(|i| i.severity != ConfigSeverity::Error));
        assert!(issues
            .iter()
            .any(|i| i.severity == ConfigSeverity::Warning && i.message.contains("no accounts")));
    }

    #[test]
    fn target_lang_requires_api_key() {
        let mut config = valid_config();
        config.outputs[0].target_lang = "zh-CN".into();
        let issues = config.validate();
        assert!(issues
            .iter()
            .any(|i| i.severity == ConfigSeverity::Error && i.message.contains("api_key")));

        config.translation.api_key = "key".into();
        let issues = config.validate();
        assert!(issues.iter().all(|i| i.severity != ConfigSeverity::Error));
    }

    #[test]
    fn accounts_list_takes_precedence_over_singular() {
        let output = OutputConfig {
            account: Some("solo".into()),
            accounts: vec!["a".into(), "b".into()],
            ..Default::default()
        };
        assert_eq!(output.account_names(), vec!["a".to_string(), "b".to_string()]);

        let solo = OutputConfig {
            account: Some("solo".into()),
            ..Default::default()
        };
        assert_eq!(solo.account_names(), vec!["solo".to_string()]);
    }

    #[test]
    fn room_zero_falls_back_to_streamer_room() {
        let output = OutputConfig::default();
        assert_eq!(output.effective_room(42), 42);
        let pinned = OutputConfig {
            room_id: 7,
            ..Default::default()
        };
        assert_eq!(pinned.effective_room(42), 7);
    }
}
