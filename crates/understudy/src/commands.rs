//! Command registry and the two host-facing commands.
//!
//! The host's command facility is fed from a [`CommandSet`]: each command
//! declares `{name, aliases, help_text}` and an async handler over named
//! arguments plus a free-text value. Handlers catch every flow error at this
//! boundary and answer with a short text message; nothing a command does is
//! allowed to propagate an error into the host.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::error::UnderstudyError;
use crate::flow::Understudy;

/// Boxed future returned by [`Command::execute`].
pub type CommandFuture<'a> = Pin<Box<dyn Future<Output = String> + Send + 'a>>;

/// Named `key=value` arguments of a command invocation.
pub type NamedArgs = HashMap<String, String>;

/// Notice returned by commands while the extension is switched off.
pub const DISABLED_NOTICE: &str =
    "Character impersonation is disabled. Enable it in the extension settings.";

// ── Definitions ────────────────────────────────────────────────────

/// Registration shape of a command: primary name, aliases, help text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandDef {
    pub name: String,
    pub aliases: Vec<String>,
    pub help_text: String,
}

impl CommandDef {
    pub fn new(name: impl Into<String>, help_text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            help_text: help_text.into(),
        }
    }

    /// Add an alias (builder pattern).
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// Whether `invocation` names this command, by primary name or alias.
    pub fn matches(&self, invocation: &str) -> bool {
        self.name == invocation || self.aliases.iter().any(|a| a == invocation)
    }
}

/// A command the host can invoke.
///
/// `execute` receives the parsed named arguments and the free-text remainder
/// of the invocation, and resolves to the text shown to the user. Errors are
/// rendered into that text, never returned.
pub trait Command: Send + Sync {
    /// The command's registration shape.
    fn definition(&self) -> CommandDef;

    /// Handle one invocation.
    fn execute<'a>(&'a self, args: &'a NamedArgs, value: &'a str) -> CommandFuture<'a>;

    /// The command's primary name (convenience; delegates to definition).
    fn name(&self) -> String {
        self.definition().name
    }
}

// ── CommandSet ─────────────────────────────────────────────────────

/// A collection of commands dispatched by name or alias.
#[derive(Default)]
pub struct CommandSet {
    commands: Vec<Box<dyn Command>>,
}

impl CommandSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command (builder pattern).
    pub fn with(mut self, command: impl Command + 'static) -> Self {
        self.register(command);
        self
    }

    /// Register a command.
    pub fn register(&mut self, command: impl Command + 'static) {
        self.commands.push(Box::new(command));
    }

    /// All registration shapes, for handing to the host's command facility.
    pub fn definitions(&self) -> Vec<CommandDef> {
        self.commands.iter().map(|c| c.definition()).collect()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Execute the command `invocation` names. Unknown names answer with a
    /// short notice instead of failing.
    pub async fn dispatch(&self, invocation: &str, args: &NamedArgs, value: &str) -> String {
        let Some(command) = self
            .commands
            .iter()
            .find(|c| c.definition().matches(invocation))
        else {
            return format!("Unknown command: /{invocation}");
        };
        debug!(
            "[command] /{invocation} ({} named arg(s), {} chars of input)",
            args.len(),
            value.chars().count()
        );
        command.execute(args, value).await
    }
}

// ── roleplay ───────────────────────────────────────────────────────

/// `/roleplay` (alias `/rp`): run the full compose → dispatch → confirm →
/// insert flow for the current character.
///
/// Accepts an optional `prompt=` named argument overriding the configured
/// system-prompt templates for this invocation, and an optional free-text
/// situation or message to respond to.
pub struct RoleplayCommand {
    understudy: Arc<Understudy>,
}

impl RoleplayCommand {
    pub fn new(understudy: Arc<Understudy>) -> Self {
        Self { understudy }
    }
}

impl Command for RoleplayCommand {
    fn definition(&self) -> CommandDef {
        CommandDef::new(
            "roleplay",
            "prompt=(custom system prompt) (message) - generate a response as your current character",
        )
        .alias("rp")
    }

    fn execute<'a>(&'a self, args: &'a NamedArgs, value: &'a str) -> CommandFuture<'a> {
        Box::pin(async move {
            if !self.understudy.settings().enabled {
                return DISABLED_NOTICE.to_string();
            }

            let template_override = args.get("prompt").map(String::as_str);
            let input = (!value.trim().is_empty()).then_some(value);

            let impersonation = match self.understudy.impersonate(input, template_override).await {
                Ok(impersonation) => impersonation,
                Err(e) => {
                    error!("impersonation failed: {e}");
                    return format!("Error: {e}");
                }
            };

            match self
                .understudy
                .offer_to_chat(&impersonation.character_name, &impersonation.response)
                .await
            {
                Ok(_) => format!(
                    "Roleplay complete. Response generated as {}.",
                    impersonation.character_name
                ),
                Err(UnderstudyError::DisplayUnavailable) => {
                    // No confirmation surface; report the text inline so the
                    // generated response is never dropped.
                    warn!("no confirmation surface wired; reporting response inline");
                    format!(
                        "{} (Impersonated) says:\n\n{}",
                        impersonation.character_name, impersonation.response
                    )
                }
                Err(e) => {
                    error!("could not offer response for insertion: {e}");
                    format!("Error: {e}")
                }
            }
        })
    }
}

// ── setimprompt ────────────────────────────────────────────────────

/// `/setimprompt` (alias `/setprompt`): view or set the custom system
/// prompt. A blank value reports the current one; anything else becomes the
/// new custom prompt and is persisted.
pub struct SetPromptCommand {
    understudy: Arc<Understudy>,
}

impl SetPromptCommand {
    pub fn new(understudy: Arc<Understudy>) -> Self {
        Self { understudy }
    }
}

impl Command for SetPromptCommand {
    fn definition(&self) -> CommandDef {
        CommandDef::new(
            "setimprompt",
            "(new prompt) - set or view the custom system prompt for impersonation",
        )
        .alias("setprompt")
    }

    fn execute<'a>(&'a self, _args: &'a NamedArgs, value: &'a str) -> CommandFuture<'a> {
        Box::pin(async move {
            let new_prompt = value.trim();
            if new_prompt.is_empty() {
                let current = self.understudy.settings().custom_system_prompt;
                return if current.is_empty() {
                    "Current custom system prompt: (none - using default)".to_string()
                } else {
                    format!("Current custom system prompt: {current}")
                };
            }

            self.understudy
                .update_settings(|s| s.custom_system_prompt = new_prompt.to_string());
            format!("Custom system prompt updated: {new_prompt}")
        })
    }
}

/// The full command set of this extension, ready for registration.
pub fn default_commands(understudy: Arc<Understudy>) -> CommandSet {
    CommandSet::new()
        .with(RoleplayCommand::new(understudy.clone()))
        .with(SetPromptCommand::new(understudy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{AutoConfirmer, FnGenerator, StaticHost};
    use crate::{CharacterCard, ChatMessage};

    fn wired_understudy(host: Arc<StaticHost>) -> Arc<Understudy> {
        Arc::new(
            Understudy::new(host)
                .with_generator(Arc::new(FnGenerator::new(|_| async {
                    Ok("Well met, traveler.".to_string())
                })))
                .with_confirmer(Arc::new(AutoConfirmer::yes())),
        )
    }

    fn aria_host() -> Arc<StaticHost> {
        Arc::new(
            StaticHost::new()
                .with_character(CharacterCard::named("Aria"))
                .with_chat(vec![ChatMessage::user("hi").named("Sam")]),
        )
    }

    #[tokio::test]
    async fn dispatches_by_name_and_alias() {
        let commands = default_commands(wired_understudy(aria_host()));
        let args = NamedArgs::new();

        let by_name = commands.dispatch("roleplay", &args, "What's up?").await;
        assert_eq!(by_name, "Roleplay complete. Response generated as Aria.");

        let by_alias = commands.dispatch("rp", &args, "What's up?").await;
        assert_eq!(by_alias, "Roleplay complete. Response generated as Aria.");
    }

    #[tokio::test]
    async fn unknown_command_answers_with_a_notice() {
        let commands = default_commands(wired_understudy(aria_host()));
        let out = commands.dispatch("impersonate", &NamedArgs::new(), "").await;
        assert_eq!(out, "Unknown command: /impersonate");
    }

    #[tokio::test]
    async fn roleplay_inserts_the_confirmed_response() {
        let host = aria_host();
        let commands = default_commands(wired_understudy(host.clone()));
        commands.dispatch("roleplay", &NamedArgs::new(), "").await;

        let log = host.messages();
        assert_eq!(log.last().unwrap().text, "Well met, traveler.");
        assert_eq!(host.refresh_count(), 1);
    }

    #[tokio::test]
    async fn roleplay_reports_inline_without_a_confirmer() {
        let host = aria_host();
        let understudy = Arc::new(
            Understudy::new(host.clone()).with_generator(Arc::new(FnGenerator::new(|_| async {
                Ok("Well met, traveler.".to_string())
            }))),
        );
        let commands = default_commands(understudy);

        let out = commands.dispatch("roleplay", &NamedArgs::new(), "").await;
        assert_eq!(out, "Aria (Impersonated) says:\n\nWell met, traveler.");
        // Nothing was inserted.
        assert_eq!(host.messages().len(), 1);
    }

    #[tokio::test]
    async fn roleplay_honours_the_disabled_switch() {
        let host = aria_host();
        let understudy = wired_understudy(host.clone());
        understudy.update_settings(|s| s.enabled = false);

        let commands = default_commands(understudy);
        let out = commands.dispatch("roleplay", &NamedArgs::new(), "hello").await;
        assert_eq!(out, DISABLED_NOTICE);
        assert_eq!(host.messages().len(), 1);
    }

    #[tokio::test]
    async fn roleplay_renders_flow_errors_as_text() {
        let understudy = wired_understudy(Arc::new(StaticHost::new()));
        let commands = default_commands(understudy);

        let out = commands.dispatch("roleplay", &NamedArgs::new(), "").await;
        assert_eq!(out, "Error: no character selected; select a character first");
    }

    #[tokio::test]
    async fn roleplay_passes_the_prompt_override() {
        let captured = std::sync::Arc::new(std::sync::Mutex::new(String::new()));
        let sink = captured.clone();
        let generator = FnGenerator::new(move |prompt| {
            let sink = sink.clone();
            async move {
                if let Ok(mut seen) = sink.lock() {
                    *seen = prompt;
                }
                Ok("ok".to_string())
            }
        });
        let understudy = Arc::new(
            Understudy::new(aria_host())
                .with_generator(Arc::new(generator))
                .with_confirmer(Arc::new(AutoConfirmer::no())),
        );
        let commands = default_commands(understudy);

        let mut args = NamedArgs::new();
        args.insert("prompt".to_string(), "Answer as {{char}} in rhyme.".to_string());
        commands.dispatch("roleplay", &args, "").await;

        assert!(captured
            .lock()
            .unwrap()
            .starts_with("Answer as Aria in rhyme."));
    }

    #[tokio::test]
    async fn setimprompt_views_and_updates() {
        let understudy = wired_understudy(aria_host());
        let commands = default_commands(understudy.clone());
        let args = NamedArgs::new();

        let view = commands.dispatch("setimprompt", &args, "  ").await;
        assert_eq!(view, "Current custom system prompt: (none - using default)");

        let update = commands
            .dispatch("setprompt", &args, " Stay in rhyme. ")
            .await;
        assert_eq!(update, "Custom system prompt updated: Stay in rhyme.");
        assert_eq!(understudy.settings().custom_system_prompt, "Stay in rhyme.");

        let view = commands.dispatch("setimprompt", &args, "").await;
        assert_eq!(view, "Current custom system prompt: Stay in rhyme.");
    }

    #[test]
    fn definitions_expose_the_registration_shape() {
        let commands = default_commands(wired_understudy(aria_host()));
        let defs = commands.definitions();
        assert_eq!(defs.len(), 2);

        let roleplay = defs.iter().find(|d| d.name == "roleplay").unwrap();
        assert!(roleplay.matches("rp"));
        assert!(!roleplay.matches("setprompt"));
        assert!(roleplay.help_text.contains("current character"));
    }
}
