//! The settings record, lenient form application, and JSON persistence.
//!
//! Settings are an explicitly passed value: the adapter keeps one under a
//! lock and hands out snapshots, and the composer receives a snapshot per
//! invocation. Nothing in this crate reads configuration through a global.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::DEFAULT_SYSTEM_PROMPT;
use crate::host::SettingsStore;

/// History window used when a form submits a non-numeric value.
pub const DEFAULT_MAX_HISTORY: u32 = 10;

// ── Settings ───────────────────────────────────────────────────────

/// Configuration for the impersonation flow.
///
/// `max_history_messages` is expected to be at least 1; a stored 0 is not
/// rejected, it just degrades to an empty history in the projector.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Master switch. When off, the commands answer with a notice instead
    /// of generating.
    pub enabled: bool,
    /// Template used when no custom system prompt is set.
    pub default_system_prompt: String,
    /// Whether the composed prompt carries the character card block.
    pub include_character_card: bool,
    /// How many recent chat turns the prompt includes.
    pub max_history_messages: u32,
    /// Overrides the default template when non-empty.
    pub custom_system_prompt: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            default_system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            include_character_card: true,
            max_history_messages: DEFAULT_MAX_HISTORY,
            custom_system_prompt: String::new(),
        }
    }
}

impl Settings {
    /// The template the composer should use: the custom system prompt when
    /// one is set, the default otherwise.
    pub fn effective_template(&self) -> &str {
        if self.custom_system_prompt.is_empty() {
            &self.default_system_prompt
        } else {
            &self.custom_system_prompt
        }
    }

    /// Apply a per-invocation template override (a command's `prompt=`
    /// argument). Blank overrides are ignored.
    pub fn with_template_override(mut self, template: Option<&str>) -> Self {
        if let Some(template) = template
            && !template.trim().is_empty()
        {
            self.custom_system_prompt = template.to_string();
        }
        self
    }

    /// Apply raw form input. The numeric field is parsed leniently:
    /// non-numeric input falls back to [`DEFAULT_MAX_HISTORY`] instead of
    /// failing the save.
    pub fn apply_form(&mut self, form: &SettingsForm) {
        self.enabled = form.enabled;
        self.include_character_card = form.include_character_card;
        self.max_history_messages = match form.max_history_messages.trim().parse::<u32>() {
            Ok(n) => n,
            Err(_) => {
                warn!(
                    "ignoring non-numeric max history value {:?}",
                    form.max_history_messages
                );
                DEFAULT_MAX_HISTORY
            }
        };
        self.default_system_prompt = form.default_system_prompt.clone();
        self.custom_system_prompt = form.custom_system_prompt.clone();
    }
}

/// Raw field values as a settings panel submits them.
#[derive(Clone, Debug, Default)]
pub struct SettingsForm {
    pub enabled: bool,
    pub include_character_card: bool,
    /// Free-text numeric field; parsed leniently by [`Settings::apply_form`].
    pub max_history_messages: String,
    pub default_system_prompt: String,
    pub custom_system_prompt: String,
}

impl From<&Settings> for SettingsForm {
    fn from(settings: &Settings) -> Self {
        Self {
            enabled: settings.enabled,
            include_character_card: settings.include_character_card,
            max_history_messages: settings.max_history_messages.to_string(),
            default_system_prompt: settings.default_system_prompt.clone(),
            custom_system_prompt: settings.custom_system_prompt.clone(),
        }
    }
}

// ── JsonSettingsStore ──────────────────────────────────────────────

/// File-backed [`SettingsStore`]: one JSON object holding every module's
/// settings under its key, mirroring the host-side settings shape.
///
/// Writes are atomic (temp file + rename). A missing file is the first-run
/// case; a malformed file is logged and treated as empty rather than
/// failing any operation.
pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_all(&self) -> serde_json::Map<String, serde_json::Value> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(_) => return serde_json::Map::new(),
        };
        match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(serde_json::Value::Object(map)) => map,
            Ok(_) => {
                warn!(
                    "settings file {} is not a JSON object; treating as empty",
                    self.path.display()
                );
                serde_json::Map::new()
            }
            Err(e) => {
                warn!(
                    "malformed settings file {}: {e}; treating as empty",
                    self.path.display()
                );
                serde_json::Map::new()
            }
        }
    }
}

impl SettingsStore for JsonSettingsStore {
    fn load(&self, key: &str) -> Option<Settings> {
        let map = self.read_all();
        let value = map.get(key)?;
        match serde_json::from_value(value.clone()) {
            Ok(settings) => Some(settings),
            Err(e) => {
                warn!("unreadable settings under {key:?}: {e}; using defaults");
                None
            }
        }
    }

    fn persist(&self, key: &str, settings: &Settings) -> Result<(), String> {
        let mut map = self.read_all();
        let value = serde_json::to_value(settings)
            .map_err(|e| format!("failed to serialize settings: {e}"))?;
        map.insert(key.to_string(), value);

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("failed to create settings dir: {e}"))?;
        }

        let json = serde_json::to_string_pretty(&serde_json::Value::Object(map))
            .map_err(|e| format!("failed to serialize settings file: {e}"))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| format!("failed to write settings: {e}"))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| format!("failed to replace settings file: {e}"))?;
        Ok(())
    }
}
