//! System settings with cache-aside reads and write-through invalidation.
//!
//! All components read settings through this store; nothing reads the
//! settings repository directly, so staleness behavior lives in exactly
//! one place.

use std::sync::Arc;
use std::time::Duration;

use rota_core::{OwnerId, RotaResult, Setting};
use rota_storage::{KeyValueCache, SettingsRepository};

/// Default vision model when no setting overrides it.
const DEFAULT_VISION_MODEL: &str = "gemini-2.5-flash";
/// Default text model when no setting overrides it.
const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";

/// Built-in extraction prompt, used when no `VISION_PROMPT` setting exists.
const FALLBACK_VISION_PROMPT: &str = "\
SHIFT TABLE EXTRACTION (OCR MODE)

Extract the shifts for exactly one person from the schedule image.
Base the extraction on visible data only; no inference beyond what is
explicitly allowed below.

PERSON TO EXTRACT: {{ target_user }}

EXTERNAL PARAMETER (NOT TO BE INFERRED):
REFERENCE_YEAR = {{ reference_year }}

RULES:
- The reference year is exactly {{ reference_year }}. Do not compute,
  verify or correct it, and do not validate weekdays against a calendar.
- Dates must be formatted YYYY-MM-DD using the reference year.
- For each day, report up to two time slots as HH:MM-HH:MM strings.
- Copy non-time markers (rest days, annotations) verbatim into slot_1.

Respond with a single JSON object:
{\"turni\": [{\"data\": \"YYYY-MM-DD\", \"slot_1\": \"...\", \"slot_2\": \"...\", \"notes\": \"...\"}]}";

/// Cache-aside settings store.
#[derive(Clone)]
pub struct ConfigStore {
    repo: Arc<dyn SettingsRepository>,
    cache: KeyValueCache,
    ttl: Duration,
}

impl ConfigStore {
    pub fn new(repo: Arc<dyn SettingsRepository>, cache: KeyValueCache) -> Self {
        Self {
            repo,
            cache,
            ttl: Duration::from_secs(600),
        }
    }

    /// Keys are case-normalized so `vision_model` and `VISION_MODEL` are
    /// the same setting.
    fn normalize(key: &str) -> String {
        key.trim().to_uppercase()
    }

    /// Get a setting: cache, then durable store, then the caller default.
    pub async fn get(&self, key: &str, default: Option<&str>) -> RotaResult<Option<String>> {
        let key = Self::normalize(key);
        let cache_key = KeyValueCache::setting_key(&key);

        if let Some(cached) = self.cache.get(&cache_key).await {
            return Ok(Some(cached));
        }

        match self.repo.get(&key).await? {
            Some(setting) => {
                self.cache.set(&cache_key, &setting.value, self.ttl).await;
                Ok(Some(setting.value))
            }
            None => Ok(default.map(str::to_string)),
        }
    }

    /// Set a setting: upsert into the durable store, then invalidate the
    /// cache key, in that order, before reporting success.
    pub async fn set(
        &self,
        key: &str,
        value: &str,
        updated_by: Option<OwnerId>,
    ) -> RotaResult<Setting> {
        let key = Self::normalize(key);
        let setting = self.repo.upsert(&key, value, updated_by).await?;
        self.cache
            .invalidate(&KeyValueCache::setting_key(&key))
            .await;
        tracing::info!(key = %key, "setting updated");
        Ok(setting)
    }

    /// Delete a setting. Returns whether it existed.
    pub async fn delete(&self, key: &str) -> RotaResult<bool> {
        let key = Self::normalize(key);
        let deleted = self.repo.delete(&key).await?;
        if deleted {
            self.cache
                .invalidate(&KeyValueCache::setting_key(&key))
                .await;
            tracing::info!(key = %key, "setting deleted");
        }
        Ok(deleted)
    }

    /// All settings, straight from the durable store (bulk reads are not
    /// cached).
    pub async fn all(&self) -> RotaResult<Vec<Setting>> {
        self.repo.all().await
    }

    // ========================================================================
    // CONVENIENCE ACCESSORS
    // ========================================================================

    pub async fn vision_model(&self) -> RotaResult<String> {
        Ok(self
            .get("VISION_MODEL", Some(DEFAULT_VISION_MODEL))
            .await?
            .unwrap_or_else(|| DEFAULT_VISION_MODEL.to_string()))
    }

    pub async fn text_model(&self) -> RotaResult<String> {
        Ok(self
            .get("NLP_MODEL", Some(DEFAULT_TEXT_MODEL))
            .await?
            .unwrap_or_else(|| DEFAULT_TEXT_MODEL.to_string()))
    }

    /// The vision extraction prompt for a target user.
    ///
    /// Prefers the `VISION_PROMPT` setting, substituting the
    /// `{{ target_user }}` and `{{ reference_year }}` placeholders. A
    /// stored prompt that names neither placeholder nor the user gets a
    /// header prepended so the model still knows who to extract.
    pub async fn vision_prompt(&self, target_user: &str) -> RotaResult<String> {
        let reference_year = chrono::Utc::now().format("%Y").to_string();

        let template = self
            .get("VISION_PROMPT", None)
            .await?
            .unwrap_or_else(|| FALLBACK_VISION_PROMPT.to_string());

        let had_user_placeholder = template.contains("{{ target_user }}");
        let mut prompt = template
            .replace("{{ target_user }}", target_user)
            .replace("{{ reference_year }}", &reference_year);

        if !had_user_placeholder && !prompt.contains(target_user) {
            prompt = format!("User: {target_user}\nReference Year: {reference_year}\n{prompt}");
        }

        Ok(prompt)
    }
}
