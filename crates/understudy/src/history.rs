//! Projection of the host chat log into prompt-ready turns.

use crate::{ChatMessage, DEFAULT_USER_NAME, FALLBACK_SPEAKER};

/// One turn of projected history, ready for the composer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryTurn {
    pub speaker: String,
    pub text: String,
    pub is_user: bool,
}

impl HistoryTurn {
    pub fn new(speaker: impl Into<String>, text: impl Into<String>, is_user: bool) -> Self {
        Self {
            speaker: speaker.into(),
            text: text.into(),
            is_user,
        }
    }
}

/// Project the raw chat log into at most `max_messages` prompt-ready turns.
///
/// System-authored entries are dropped before the window is taken, so the
/// result is the most recent `max_messages` conversational turns, oldest
/// first. Unnamed user turns speak as `user_name` (or
/// [`DEFAULT_USER_NAME`]); unnamed character turns as [`FALLBACK_SPEAKER`].
///
/// `max_messages == 0` yields no history at all, never an unbounded one.
pub fn project(log: &[ChatMessage], max_messages: u32, user_name: Option<&str>) -> Vec<HistoryTurn> {
    if max_messages == 0 {
        return Vec::new();
    }

    let spoken: Vec<&ChatMessage> = log.iter().filter(|m| !m.is_system).collect();
    let start = spoken.len().saturating_sub(max_messages as usize);

    spoken[start..]
        .iter()
        .map(|m| {
            let speaker = match &m.name {
                Some(name) if !name.is_empty() => name.clone(),
                _ if m.is_user => user_name
                    .filter(|n| !n.is_empty())
                    .unwrap_or(DEFAULT_USER_NAME)
                    .to_string(),
                _ => FALLBACK_SPEAKER.to_string(),
            };
            HistoryTurn {
                speaker,
                text: m.text.clone(),
                is_user: m.is_user,
            }
        })
        .collect()
}
