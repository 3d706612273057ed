//! Host-agnostic in-character reply generation for chat frontends.
//!
//! `understudy` is the reusable core of a chat-host extension: on a user's
//! request it composes a prompt from the currently selected character, a
//! bounded slice of recent chat history, and a configurable template, then
//! forwards that prompt to the host's own language-model invocation function.
//! After an explicit user confirmation, the reply is handed back to the host
//! for insertion into the chat. The host owns everything stateful (character
//! records, the chat log, the generation backend, popups, the settings store)
//! and this crate owns only the pipeline between them:
//!
//! ```text
//! ChatHost ──▶ history::project ──▶ prompt::compose ──▶ flow::dispatch ──▶ Generator
//! ```
//!
//! Control flows strictly downward; no stage calls back into an earlier one.
//! There is exactly one suspension point in the whole flow: the await on the
//! host's generation call.
//!
//! # Getting started
//!
//! Wire the host capabilities into an [`Understudy`](flow::Understudy) once,
//! at load time, and register its commands with the host's command facility:
//!
//! ```ignore
//! use std::sync::Arc;
//! use understudy::commands::default_commands;
//! use understudy::flow::Understudy;
//! use understudy::settings::JsonSettingsStore;
//!
//! let understudy = Arc::new(
//!     Understudy::new(host)                       // impl ChatHost
//!         .with_generator(generator)              // impl Generator
//!         .with_confirmer(confirmer)              // impl Confirmer
//!         .with_settings_store(Arc::new(JsonSettingsStore::new(path))),
//! );
//!
//! let commands = default_commands(understudy);
//! let reply = commands.dispatch("roleplay", &args, "What's up?").await;
//! ```
//!
//! A capability the host cannot provide is simply never wired; the flow
//! reports the gap through [`UnderstudyError`](error::UnderstudyError)
//! instead of probing for functions at every call site.
//!
//! # Where to find things
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`host`] | Collaborator contracts ([`ChatHost`](host::ChatHost), [`Generator`](host::Generator), [`Confirmer`](host::Confirmer), [`SettingsStore`](host::SettingsStore)) plus reference implementations |
//! | [`settings`] | The [`Settings`](settings::Settings) record, lenient form application, JSON-file store |
//! | [`history`] | Projection of the raw chat log into prompt-ready turns |
//! | [`prompt`] | Template substitution and prompt composition |
//! | [`flow`] | The dispatcher and the [`Understudy`](flow::Understudy) adapter |
//! | [`commands`] | Command registry and the `roleplay` / `setimprompt` commands |
//! | [`error`] | The recoverable error taxonomy |

pub mod commands;
pub mod error;
pub mod flow;
pub mod history;
pub mod host;
pub mod prompt;
pub mod settings;

use serde::{Deserialize, Serialize};

pub use error::UnderstudyError;
pub use flow::{Impersonation, Understudy, dispatch};
pub use history::{HistoryTurn, project};
pub use host::{ChatHost, Confirmer, Generator, SettingsStore};
pub use prompt::compose;
pub use settings::Settings;

// ── Constants ──────────────────────────────────────────────────────

/// Key under which the settings record lives in the host's settings store.
pub const SETTINGS_KEY: &str = "character_impersonation";

/// Template used when no custom system prompt is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are now roleplaying as {{char}}. \
    Respond to the following conversation as {{char}} would, maintaining their \
    personality, speech patterns, and behavior. Consider the chat history for context.";

/// Placeholder replaced with the character's name in templates.
pub const CHAR_PLACEHOLDER: &str = "{{char}}";

/// Placeholder replaced with the user's display name in templates.
pub const USER_PLACEHOLDER: &str = "{{user}}";

/// Speaker name used when the host knows no user display name.
pub const DEFAULT_USER_NAME: &str = "User";

/// Character name used when the host record carries none.
pub const UNKNOWN_CHARACTER_NAME: &str = "Unknown";

/// Speaker name for unnamed non-user turns in the projected history.
pub const FALLBACK_SPEAKER: &str = "Character";

// ── Character card ─────────────────────────────────────────────────

/// The persona fields of the currently selected character.
///
/// Projected read-only from a richer host record; never constructed or
/// mutated by the pipeline itself, and re-read fresh on every invocation.
/// A missing name falls back to [`UNKNOWN_CHARACTER_NAME`], every other
/// field to the empty string.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterCard {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub personality: String,
    #[serde(default)]
    pub scenario: String,
    /// The character's scripted opening message. Carried in the projection
    /// but not rendered into the prompt's card block.
    #[serde(default)]
    pub first_mes: String,
    /// Example dialogue demonstrating the character's voice.
    #[serde(default)]
    pub mes_example: String,
}

impl CharacterCard {
    /// Create a card with only a name set. An empty name falls back to
    /// [`UNKNOWN_CHARACTER_NAME`].
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            name: if name.is_empty() {
                UNKNOWN_CHARACTER_NAME.to_string()
            } else {
                name
            },
            description: String::new(),
            personality: String::new(),
            scenario: String::new(),
            first_mes: String::new(),
            mes_example: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_personality(mut self, personality: impl Into<String>) -> Self {
        self.personality = personality.into();
        self
    }

    pub fn with_scenario(mut self, scenario: impl Into<String>) -> Self {
        self.scenario = scenario.into();
        self
    }

    pub fn with_example_dialogue(mut self, mes_example: impl Into<String>) -> Self {
        self.mes_example = mes_example.into();
        self
    }
}

impl Default for CharacterCard {
    fn default() -> Self {
        Self::named(UNKNOWN_CHARACTER_NAME)
    }
}

// ── Chat log entries ───────────────────────────────────────────────

/// A raw turn as the host's chat log stores it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Speaker name, when the host recorded one.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub is_user: bool,
    /// System-authored entries are excluded from projected history.
    #[serde(default)]
    pub is_system: bool,
}

impl ChatMessage {
    /// A user-authored turn with no recorded speaker name.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            name: None,
            text: text.into(),
            is_user: true,
            is_system: false,
        }
    }

    /// A character-authored turn with no recorded speaker name.
    pub fn character(text: impl Into<String>) -> Self {
        Self {
            name: None,
            text: text.into(),
            is_user: false,
            is_system: false,
        }
    }

    /// A system-authored turn (narration, host notices).
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            name: None,
            text: text.into(),
            is_user: false,
            is_system: true,
        }
    }

    /// Attach a speaker name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

// ── Outgoing message ───────────────────────────────────────────────

/// The record appended back into host chat state after the user confirms
/// insertion of a generated reply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub name: String,
    pub text: String,
    pub is_user: bool,
    /// RFC 3339 send time.
    pub timestamp: String,
    /// Marks replies produced by this pipeline rather than the normal
    /// turn-taking flow.
    pub impersonated: bool,
}

impl OutgoingMessage {
    /// Build an impersonated character message stamped with the current time.
    pub fn impersonated(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            is_user: false,
            timestamp: chrono::Utc::now().to_rfc3339(),
            impersonated: true,
        }
    }
}
