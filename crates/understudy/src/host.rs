//! Collaborator contracts for the surrounding chat host.
//!
//! Everything the pipeline needs from its host enters through the traits in
//! this module, injected once at construction time. Host-version skew lives
//! entirely in whatever adapter implements them; the flow itself never probes
//! for capabilities: a capability the host lacks is simply not wired, and
//! the flow reports the gap through the error taxonomy.
//!
//! The async methods use boxed-future type aliases so every trait stays
//! dyn-compatible.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::info;

use crate::settings::Settings;
use crate::{CharacterCard, ChatMessage, OutgoingMessage};

/// Boxed future returned by [`Generator::generate`].
pub type GenerateFuture<'a> = Pin<Box<dyn Future<Output = Result<String, String>> + Send + 'a>>;

/// Boxed future returned by [`Confirmer::confirm`].
pub type ConfirmFuture<'a> = Pin<Box<dyn Future<Output = bool> + Send + 'a>>;

// ── ChatHost ───────────────────────────────────────────────────────

/// The host's character, chat-log, and chat-view surface.
///
/// All reads return fresh projections of host state; nothing is cached on
/// this side of the boundary, so there is no consistency to maintain.
pub trait ChatHost: Send + Sync {
    /// The currently selected character, if any.
    fn current_character(&self) -> Option<CharacterCard>;

    /// The full chat log, oldest first.
    fn chat_log(&self) -> Vec<ChatMessage>;

    /// The user's display name, when the host knows one.
    fn user_display_name(&self) -> Option<String>;

    /// Append a message to the chat and persist it.
    fn append_message(&self, message: OutgoingMessage) -> Result<(), String>;

    /// Ask the host to re-render the chat view.
    fn refresh_chat_view(&self);
}

// ── Generator ──────────────────────────────────────────────────────

/// The host's language-model invocation function, the sole LLM entry point
/// in the entire flow.
pub trait Generator: Send + Sync {
    /// Generate a completion for the composed prompt.
    fn generate(&self, prompt: &str) -> GenerateFuture<'_>;
}

/// Type-erased async handler for [`FnGenerator`].
type ErasedGenerate =
    Box<dyn Fn(String) -> Pin<Box<dyn Future<Output = Result<String, String>> + Send>> + Send + Sync>;

/// A closure-based [`Generator`].
///
/// Spares host adapters (and tests) the boilerplate of a struct + trait impl
/// when the generation call is a single async function.
///
/// # Example
///
/// ```
/// use understudy::host::FnGenerator;
///
/// let echo = FnGenerator::new(|prompt| async move { Ok(format!("echo: {prompt}")) });
/// # let _ = echo;
/// ```
pub struct FnGenerator {
    handler: ErasedGenerate,
}

impl FnGenerator {
    /// Wrap an async closure as a [`Generator`].
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, String>> + Send + 'static,
    {
        Self {
            handler: Box::new(move |prompt| Box::pin(handler(prompt))),
        }
    }
}

impl Generator for FnGenerator {
    fn generate(&self, prompt: &str) -> GenerateFuture<'_> {
        Box::pin((self.handler)(prompt.to_string()))
    }
}

// ── Confirmer ──────────────────────────────────────────────────────

/// The host's yes/no decision surface (popup, modal, native confirm).
pub trait Confirmer: Send + Sync {
    /// Ask the user to confirm; resolves to the user's decision.
    fn confirm(&self, message: &str) -> ConfirmFuture<'_>;

    /// Show a one-way notice. The default implementation logs it.
    fn notify(&self, message: &str) {
        info!("[notice] {message}");
    }
}

/// A [`Confirmer`] that always answers the same way. Useful for headless
/// embeddings and tests.
pub struct AutoConfirmer {
    answer: bool,
}

impl AutoConfirmer {
    /// Confirm everything.
    pub fn yes() -> Self {
        Self { answer: true }
    }

    /// Decline everything.
    pub fn no() -> Self {
        Self { answer: false }
    }
}

impl Confirmer for AutoConfirmer {
    fn confirm(&self, _message: &str) -> ConfirmFuture<'_> {
        let answer = self.answer;
        Box::pin(async move { answer })
    }
}

// ── SettingsStore ──────────────────────────────────────────────────

/// The host's opaque settings store, keyed by module.
pub trait SettingsStore: Send + Sync {
    /// Load the settings saved under `key`. `None` when nothing (readable)
    /// is stored there.
    fn load(&self, key: &str) -> Option<Settings>;

    /// Persist `settings` under `key`.
    fn persist(&self, key: &str, settings: &Settings) -> Result<(), String>;
}

// ── StaticHost ─────────────────────────────────────────────────────

/// An in-memory [`ChatHost`]: a fixed character and user name over a mutable
/// chat log. The reference implementation for embedders without a live host,
/// and the workhorse of this crate's tests.
#[derive(Default)]
pub struct StaticHost {
    character: Option<CharacterCard>,
    user_name: Option<String>,
    chat: Mutex<Vec<ChatMessage>>,
    refreshes: AtomicUsize,
}

impl StaticHost {
    /// An empty host: no character, no user name, no chat.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_character(mut self, character: CharacterCard) -> Self {
        self.character = Some(character);
        self
    }

    pub fn with_user_name(mut self, name: impl Into<String>) -> Self {
        self.user_name = Some(name.into());
        self
    }

    pub fn with_chat(self, messages: Vec<ChatMessage>) -> Self {
        if let Ok(mut chat) = self.chat.lock() {
            *chat = messages;
        }
        self
    }

    /// Append a turn to the log directly (host-side, no confirmation).
    pub fn push(&self, message: ChatMessage) {
        if let Ok(mut chat) = self.chat.lock() {
            chat.push(message);
        }
    }

    /// Snapshot of the current log.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.chat.lock().map(|chat| chat.clone()).unwrap_or_default()
    }

    /// How many times the chat view was asked to re-render.
    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::Relaxed)
    }
}

impl ChatHost for StaticHost {
    fn current_character(&self) -> Option<CharacterCard> {
        self.character.clone()
    }

    fn chat_log(&self) -> Vec<ChatMessage> {
        self.messages()
    }

    fn user_display_name(&self) -> Option<String> {
        self.user_name.clone()
    }

    fn append_message(&self, message: OutgoingMessage) -> Result<(), String> {
        let mut chat = self
            .chat
            .lock()
            .map_err(|_| "chat log lock poisoned".to_string())?;
        chat.push(ChatMessage {
            name: Some(message.name),
            text: message.text,
            is_user: message.is_user,
            is_system: false,
        });
        Ok(())
    }

    fn refresh_chat_view(&self) {
        self.refreshes.fetch_add(1, Ordering::Relaxed);
    }
}
