//! Prompt composition.
//!
//! [`compose`] assembles the full generation prompt from a template, the
//! character card, and projected history. Sections are joined with blank
//! lines in a fixed order: template (with the card block folded in), history,
//! optional latest message, closing instruction. The whole module is pure:
//! every function is a function of its arguments alone.

use tracing::debug;

use crate::history::HistoryTurn;
use crate::settings::Settings;
use crate::{CHAR_PLACEHOLDER, CharacterCard, DEFAULT_USER_NAME, USER_PLACEHOLDER};

/// Heading of the character card block.
pub const CARD_HEADER: &str = "Character Information:";

/// Heading of a non-empty history block.
pub const HISTORY_HEADER: &str = "Recent conversation history:";

/// Rendered in place of the history block when there is none.
pub const EMPTY_HISTORY: &str = "No previous messages in this conversation.";

/// Label prefixed to the user's free-text input.
pub const LATEST_MESSAGE_LABEL: &str = "Latest message to respond to:";

/// Replace every occurrence of `{{char}}` and `{{user}}` in `template`.
///
/// A template without placeholders passes through unchanged.
pub fn substitute_placeholders(template: &str, character_name: &str, user_name: &str) -> String {
    template
        .replace(CHAR_PLACEHOLDER, character_name)
        .replace(USER_PLACEHOLDER, user_name)
}

/// Render the character card block: the name always, then each non-empty
/// persona field on its own labeled line, in fixed order.
pub fn character_block(character: &CharacterCard) -> String {
    let mut lines = vec![
        CARD_HEADER.to_string(),
        format!("Name: {}", character.name),
    ];
    for (label, value) in [
        ("Description", &character.description),
        ("Personality", &character.personality),
        ("Scenario", &character.scenario),
        ("Example dialogue", &character.mes_example),
    ] {
        if !value.is_empty() {
            lines.push(format!("{label}: {value}"));
        }
    }
    lines.join("\n")
}

/// Render the history block: one `speaker: message` line per turn in
/// chronological order, or the literal empty-history sentence.
pub fn history_block(history: &[HistoryTurn]) -> String {
    if history.is_empty() {
        return EMPTY_HISTORY.to_string();
    }
    let mut lines = vec![HISTORY_HEADER.to_string()];
    lines.extend(history.iter().map(|t| format!("{}: {}", t.speaker, t.text)));
    lines.join("\n")
}

/// Compose the full generation prompt.
///
/// Callers must have resolved the character already; composing with a
/// defaulted character would silently corrupt the placeholder substitution
/// and the closing instruction, so an unresolvable character is an error
/// upstream, never a fallback here.
///
/// ```
/// use understudy::prompt::compose;
/// use understudy::settings::Settings;
/// use understudy::{CharacterCard, HistoryTurn};
///
/// let prompt = compose(
///     &CharacterCard::named("Aria"),
///     &Settings::default(),
///     &[HistoryTurn::new("Sam", "hi", true)],
///     Some("What's up?"),
///     Some("Sam"),
/// );
/// assert!(prompt.ends_with("Respond as Aria:"));
/// ```
pub fn compose(
    character: &CharacterCard,
    settings: &Settings,
    history: &[HistoryTurn],
    user_input: Option<&str>,
    user_display_name: Option<&str>,
) -> String {
    let user_name = user_display_name
        .filter(|n| !n.is_empty())
        .unwrap_or(DEFAULT_USER_NAME);

    let mut sections = vec![substitute_placeholders(
        settings.effective_template(),
        &character.name,
        user_name,
    )];
    if settings.include_character_card {
        sections.push(character_block(character));
    }
    sections.push(history_block(history));
    if let Some(input) = user_input
        && !input.trim().is_empty()
    {
        sections.push(format!("{LATEST_MESSAGE_LABEL} {input}"));
    }
    sections.push(format!("Respond as {}:", character.name));

    let prompt = sections.join("\n\n");
    debug!(
        "composed prompt: {} chars, {} history turn(s)",
        prompt.chars().count(),
        history.len()
    );
    prompt
}
