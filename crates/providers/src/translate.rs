//! Gemini translation client.
//!
//! Calls the `generateContent` API (model in the URL path, API key as a
//! query parameter). Two layers of self-defense wrap the raw call:
//!
//! - **Rate-limit degradation** — when the provider answers with a
//!   429/503-shaped error, the client switches to the fallback model for a
//!   30 s window and retries the failing call on it immediately. Recovery
//!   is automatic by wall clock.
//! - **Language verification** — when the returned text heuristically
//!   still looks like the *source* language, the call is retried once on
//!   the fallback model; if that result fails the heuristic too, the
//!   translation yields an empty string, which downstream treats as
//!   "skip".

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::Value;
use sr_domain::config::TranslationConfig;
use sr_domain::error::{Error, Result};

use crate::traits::Translator;
use crate::util::from_reqwest;

/// Model used while degraded and for language-verification retries.
/// Not configurable; deliberately a cheap, high-availability tier.
pub const FALLBACK_MODEL: &str = "gemini-1.5-flash";

const DEGRADED_WINDOW: Duration = Duration::from_secs(30);

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct GeminiTranslator {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
    /// Degradation flag + recovery deadline (epoch millis). Two plain
    /// atomics; no lock — any number of concurrent calls may race on
    /// these and every interleaving is acceptable.
    degraded: AtomicBool,
    degraded_until_ms: AtomicU64,
}

impl GeminiTranslator {
    pub fn from_config(cfg: &TranslationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            base_url: cfg.endpoint.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            client,
            degraded: AtomicBool::new(false),
            degraded_until_ms: AtomicU64::new(0),
        })
    }

    // ── Degradation window ─────────────────────────────────────────

    fn is_degraded(&self) -> bool {
        if !self.degraded.load(Ordering::Acquire) {
            return false;
        }
        if now_ms() >= self.degraded_until_ms.load(Ordering::Acquire) {
            self.degraded.store(false, Ordering::Release);
            return false;
        }
        true
    }

    fn mark_degraded(&self) {
        self.degraded_until_ms
            .store(now_ms() + DEGRADED_WINDOW.as_millis() as u64, Ordering::Release);
        self.degraded.store(true, Ordering::Release);
        tracing::warn!(
            window_sec = DEGRADED_WINDOW.as_secs(),
            fallback = FALLBACK_MODEL,
            "translator degraded — routing to fallback model"
        );
    }

    // ── Raw model call ─────────────────────────────────────────────

    fn generate_url(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        )
    }

    async fn call_model(
        &self,
        model: &str,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<String> {
        let instruction = if source_lang.is_empty() {
            format!("Translate the following text into {target_lang}.")
        } else {
            format!("Translate the following text from {source_lang} into {target_lang}.")
        };
        let body = serde_json::json!({
            "contents": [{
                "parts": [{ "text": format!(
                    "{instruction} It is a fragment of live speech; translate naturally and \
                     reply with the translation only, no explanations.\n\n{text}"
                )}]
            }]
        });

        let resp = self
            .client
            .post(self.generate_url(model))
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        let payload = resp.text().await.map_err(from_reqwest)?;
        if !status.is_success() {
            return Err(Error::Translate(format!("{status}: {payload}")));
        }

        let json: Value = serde_json::from_str(&payload)?;
        let parts = json["candidates"][0]["content"]["parts"]
            .as_array()
            .ok_or_else(|| Error::Translate(format!("malformed response: {payload}")))?;
        let out: String = parts
            .iter()
            .filter_map(|p| p["text"].as_str())
            .collect::<Vec<_>>()
            .join("");
        Ok(out.trim().to_string())
    }

    /// One call with rate-limit handling: degrade + immediate fallback
    /// retry on a rate-limit-shaped failure.
    async fn call_with_degradation(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<(String, bool)> {
        let on_fallback = self.is_degraded();
        let model = if on_fallback {
            FALLBACK_MODEL
        } else {
            self.model.as_str()
        };

        match self.call_model(model, text, source_lang, target_lang).await {
            Ok(out) => Ok((out, on_fallback)),
            Err(e) if !on_fallback && looks_rate_limited(&e.to_string()) => {
                self.mark_degraded();
                let out = self
                    .call_model(FALLBACK_MODEL, text, source_lang, target_lang)
                    .await?;
                Ok((out, true))
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait::async_trait]
impl Translator for GeminiTranslator {
    async fn translate(&self, text: &str, source_lang: &str, target_lang: &str)
        -> Result<String> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }

        let (out, on_fallback) = self
            .call_with_degradation(text, source_lang, target_lang)
            .await?;
        if !looks_like_source(&out, source_lang, target_lang) {
            return Ok(out);
        }

        // The "translation" still reads as the source language. One retry
        // on the fallback model, then give up and signal skip.
        tracing::debug!(source_lang, target_lang, "translation failed language check");
        if !on_fallback {
            let retry = self
                .call_model(FALLBACK_MODEL, text, source_lang, target_lang)
                .await?;
            if !looks_like_source(&retry, source_lang, target_lang) {
                return Ok(retry);
            }
        }
        Ok(String::new())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Heuristics
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Rate-limit-shaped provider failures, matched on the error's string form.
pub(crate) fn looks_rate_limited(msg: &str) -> bool {
    ["429", "503", "RESOURCE_EXHAUSTED", "UNAVAILABLE"]
        .iter()
        .any(|needle| msg.contains(needle))
}

/// Fraction of non-whitespace characters that are hiragana or katakana.
fn kana_density(text: &str) -> f64 {
    ratio(text, |c| {
        ('\u{3040}'..='\u{309F}').contains(&c) || ('\u{30A0}'..='\u{30FF}').contains(&c)
    })
}

/// Fraction of non-whitespace characters that are ASCII letters.
fn latin_density(text: &str) -> f64 {
    ratio(text, |c| c.is_ascii_alphabetic())
}

fn ratio(text: &str, pred: impl Fn(char) -> bool) -> f64 {
    let mut total = 0usize;
    let mut hits = 0usize;
    for c in text.chars().filter(|c| !c.is_whitespace()) {
        total += 1;
        if pred(c) {
            hits += 1;
        }
    }
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

fn is_cjk_lang(tag: &str) -> bool {
    let t = tag.to_ascii_lowercase();
    t.starts_with("zh") || t.starts_with("ja") || t.starts_with("ko") || t.starts_with("cmn")
}

/// `true` when `result` still reads as the source language rather than the
/// target. Cheap character-class checks, not language identification:
/// kana surviving a ja→zh translation, or a Latin-heavy result when the
/// target is CJK.
pub(crate) fn looks_like_source(result: &str, source_lang: &str, target_lang: &str) -> bool {
    if result.is_empty() {
        return false;
    }
    let source = source_lang.to_ascii_lowercase();
    let target = target_lang.to_ascii_lowercase();

    if source.starts_with("ja") && target.starts_with("zh") && kana_density(result) > 0.3 {
        return true;
    }
    // A Latin-heavy result for a CJK target covers both an untranslated
    // Latin source and the model apologizing in English.
    if is_cjk_lang(&target) && latin_density(result) > 0.5 {
        return true;
    }
    false
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn translator() -> GeminiTranslator {
        GeminiTranslator::from_config(&TranslationConfig {
            api_key: "test-key".into(),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn empty_input_short_circuits() {
        // No server behind the endpoint — an empty input must not reach it.
        let t = translator();
        assert_eq!(t.translate("", "ja-JP", "zh-CN").await.unwrap(), "");
        assert_eq!(t.translate("   \n", "ja-JP", "zh-CN").await.unwrap(), "");
    }

    #[test]
    fn rate_limit_detection() {
        assert!(looks_rate_limited("HTTP: 429 Too Many Requests"));
        assert!(looks_rate_limited("503 Service Unavailable"));
        assert!(looks_rate_limited("rpc error: RESOURCE_EXHAUSTED"));
        assert!(looks_rate_limited("status UNAVAILABLE"));
        assert!(!looks_rate_limited("400 bad request"));
        assert!(!looks_rate_limited("connection refused"));
    }

    #[test]
    fn kana_survives_ja_to_zh_check() {
        // Mostly kana → the ja→zh translation did not happen.
        assert!(looks_like_source("こんにちは、元気ですか", "ja-JP", "zh-CN"));
        // Proper Chinese result passes.
        assert!(!looks_like_source("你好，最近怎么样", "ja-JP", "zh-CN"));
        // Kanji-only text is shared between the scripts and passes.
        assert!(!looks_like_source("今日天气", "ja-JP", "zh-CN"));
    }

    #[test]
    fn latin_result_fails_cjk_target_check() {
        assert!(looks_like_source("Hello everyone", "en-US", "zh-CN"));
        assert!(looks_like_source("Sorry, I cannot translate that", "ja-JP", "zh-CN"));
        assert!(!looks_like_source("大家好", "en-US", "zh-CN"));
        // Latin target: latin result is expected.
        assert!(!looks_like_source("Hello everyone", "ja-JP", "en-US"));
    }

    #[test]
    fn empty_result_never_looks_like_source() {
        assert!(!looks_like_source("", "ja-JP", "zh-CN"));
    }

    #[test]
    fn degraded_window_expires_by_wall_clock() {
        let t = translator();
        assert!(!t.is_degraded());

        t.mark_degraded();
        assert!(t.is_degraded());

        // Force the deadline into the past; the next check self-heals.
        t.degraded_until_ms.store(now_ms() - 1, Ordering::Release);
        assert!(!t.is_degraded());
        assert!(!t.degraded.load(Ordering::Acquire));
    }

    #[test]
    fn generate_url_shape() {
        let t = translator();
        let url = t.generate_url("gemini-2.0-flash");
        assert!(url.ends_with(":generateContent?key=test-key"));
        assert!(url.contains("/v1beta/models/gemini-2.0-flash"));
    }
}
