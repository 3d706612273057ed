//! The response dispatcher and the host-facing adapter.
//!
//! [`dispatch`] is the single suspension point of the pipeline: it hands the
//! composed prompt to the host's generation function exactly once and awaits
//! the result. [`Understudy`] wires the collaborator contracts together and
//! runs the full reader → composer → dispatcher chain for one user action at
//! a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::{debug, warn};

use crate::SETTINGS_KEY;
use crate::error::UnderstudyError;
use crate::history::project;
use crate::host::{ChatHost, Confirmer, Generator, SettingsStore};
use crate::prompt::compose;
use crate::settings::Settings;
use crate::OutgoingMessage;

// ── Dispatcher ─────────────────────────────────────────────────────

/// Submit a composed prompt to the generation backend.
///
/// Invokes the backend exactly once, awaits its result, and fails with
/// [`UnderstudyError::EmptyResponse`] when the result is blank after
/// trimming. On success the response text is returned unmodified;
/// presentation and insertion are the caller's concern.
pub async fn dispatch(prompt: &str, generator: &dyn Generator) -> Result<String, UnderstudyError> {
    debug!("dispatching prompt ({} chars)", prompt.chars().count());
    let start = Instant::now();

    let response = generator
        .generate(prompt)
        .await
        .map_err(UnderstudyError::Generation)?;

    debug!(
        "generation finished in {:.1}s ({} chars)",
        start.elapsed().as_secs_f64(),
        response.chars().count()
    );

    if response.trim().is_empty() {
        return Err(UnderstudyError::EmptyResponse);
    }
    Ok(response)
}

// ── Outcome ────────────────────────────────────────────────────────

/// A completed impersonation: what was asked and what came back.
#[derive(Clone, Debug)]
pub struct Impersonation {
    pub character_name: String,
    /// The full composed prompt that was dispatched.
    pub prompt: String,
    /// The raw response text, unmodified.
    pub response: String,
}

// ── Adapter ────────────────────────────────────────────────────────

/// The one adapter between the pipeline and its host.
///
/// Collaborators are injected once at construction; the required chat
/// surface is an `Arc<dyn ChatHost>`, and each optional capability is an
/// `Option`. When the host lacks one, the flow fails with the matching
/// taxonomy error instead of probing at call sites.
///
/// Settings live behind a lock and are snapshotted per invocation, so the
/// composer and dispatcher only ever see an explicit, immutable value.
/// A single atomic latch admits one generation at a time; an overlapping
/// request fails fast with [`UnderstudyError::GenerationInFlight`].
pub struct Understudy {
    host: Arc<dyn ChatHost>,
    generator: Option<Arc<dyn Generator>>,
    confirmer: Option<Arc<dyn Confirmer>>,
    store: Option<Arc<dyn SettingsStore>>,
    settings: Mutex<Settings>,
    in_flight: AtomicBool,
}

impl Understudy {
    /// Create an adapter over the host's chat surface with default settings
    /// and no optional capabilities.
    pub fn new(host: Arc<dyn ChatHost>) -> Self {
        Self {
            host,
            generator: None,
            confirmer: None,
            store: None,
            settings: Mutex::new(Settings::default()),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Wire the host's generation function.
    pub fn with_generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Wire the host's confirmation surface.
    pub fn with_confirmer(mut self, confirmer: Arc<dyn Confirmer>) -> Self {
        self.confirmer = Some(confirmer);
        self
    }

    /// Wire the host's settings store and load the saved settings.
    ///
    /// A store with nothing saved yet is seeded with the defaults, so the
    /// settings UI has a record to edit from the first session on.
    pub fn with_settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        match store.load(SETTINGS_KEY) {
            Some(loaded) => {
                if let Ok(mut settings) = self.settings.lock() {
                    *settings = loaded;
                }
            }
            None => {
                if let Err(e) = store.persist(SETTINGS_KEY, &self.settings()) {
                    warn!("could not seed settings store: {e}");
                }
            }
        }
        self.store = Some(store);
        self
    }

    /// Snapshot of the current settings.
    pub fn settings(&self) -> Settings {
        self.settings
            .lock()
            .map(|settings| settings.clone())
            .unwrap_or_default()
    }

    /// Mutate the settings under the lock, persist the result, and return
    /// the new snapshot. Store failures are logged, never fatal.
    pub fn update_settings(&self, mutate: impl FnOnce(&mut Settings)) -> Settings {
        let snapshot = match self.settings.lock() {
            Ok(mut settings) => {
                mutate(&mut settings);
                settings.clone()
            }
            Err(_) => return Settings::default(),
        };
        if let Some(store) = &self.store
            && let Err(e) = store.persist(SETTINGS_KEY, &snapshot)
        {
            warn!("failed to persist settings: {e}");
        }
        snapshot
    }

    /// Run the full reader → composer → dispatcher chain.
    ///
    /// `input` is the optional situation or message to respond to;
    /// `template_override` replaces the configured templates for this
    /// invocation only. The generated text is returned without being shown
    /// or inserted anywhere; see [`offer_to_chat`](Self::offer_to_chat).
    pub async fn impersonate(
        &self,
        input: Option<&str>,
        template_override: Option<&str>,
    ) -> Result<Impersonation, UnderstudyError> {
        let _latch = self.acquire_latch()?;

        let character = self
            .host
            .current_character()
            .ok_or(UnderstudyError::NoCharacterSelected)?;
        let settings = self.settings().with_template_override(template_override);
        let user_name = self.host.user_display_name();

        let history = project(
            &self.host.chat_log(),
            settings.max_history_messages,
            user_name.as_deref(),
        );
        let prompt = compose(&character, &settings, &history, input, user_name.as_deref());

        let generator = self
            .generator
            .as_ref()
            .ok_or(UnderstudyError::GenerationUnavailable)?;
        let response = dispatch(&prompt, generator.as_ref()).await?;

        Ok(Impersonation {
            character_name: character.name,
            prompt,
            response,
        })
    }

    /// Ask the user whether a generated reply should be inserted into the
    /// chat, and insert it on an affirmative answer.
    ///
    /// Returns whether the reply was inserted. With no confirmation surface
    /// wired this is [`UnderstudyError::DisplayUnavailable`]; the caller
    /// must then surface the text some other way rather than drop it.
    pub async fn offer_to_chat(
        &self,
        character_name: &str,
        response: &str,
    ) -> Result<bool, UnderstudyError> {
        let confirmer = self
            .confirmer
            .as_ref()
            .ok_or(UnderstudyError::DisplayUnavailable)?;

        let question = format!(
            "{character_name} (Impersonated) says:\n\n{response}\n\nInsert this response into the chat?"
        );
        if !confirmer.confirm(&question).await {
            return Ok(false);
        }

        let message = OutgoingMessage::impersonated(character_name, response);
        if let Err(e) = self.host.append_message(message) {
            warn!("could not append impersonated message to chat: {e}");
            confirmer.notify("The response could not be inserted into the chat.");
            return Ok(false);
        }
        self.host.refresh_chat_view();
        Ok(true)
    }

    fn acquire_latch(&self) -> Result<LatchGuard<'_>, UnderstudyError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(UnderstudyError::GenerationInFlight);
        }
        Ok(LatchGuard {
            latch: &self.in_flight,
        })
    }
}

/// Releases the one-in-flight latch on drop, whichever way the flow exits.
struct LatchGuard<'a> {
    latch: &'a AtomicBool,
}

impl Drop for LatchGuard<'_> {
    fn drop(&mut self) {
        self.latch.store(false, Ordering::Release);
    }
}
