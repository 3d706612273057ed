//! Error taxonomy for the impersonation flow.

use thiserror::Error;

/// Failures the impersonation flow can surface.
///
/// Every variant is recoverable at the command or UI boundary: handlers
/// catch it, log it, and render a short message for the user. Nothing here
/// is allowed to propagate far enough to take the host page down with it.
#[derive(Debug, Error)]
pub enum UnderstudyError {
    /// No character is currently selected in the host. Checked before
    /// composing, because an empty character name would silently corrupt
    /// the placeholder substitution and the closing instruction.
    #[error("no character selected; select a character first")]
    NoCharacterSelected,

    /// The host provided no generation backend.
    #[error("text generation is not available in this host")]
    GenerationUnavailable,

    /// The generation backend rejected or failed the request.
    #[error("generation failed: {0}")]
    Generation(String),

    /// The generation backend returned nothing usable (absent or blank
    /// after trimming).
    #[error("the model returned an empty response")]
    EmptyResponse,

    /// No confirmation surface is wired. Callers must fall back to
    /// reporting the generated text directly, never drop it.
    #[error("no confirmation surface available")]
    DisplayUnavailable,

    /// A generation is already in flight; the flow admits one at a time.
    #[error("a generation is already in progress")]
    GenerationInFlight,
}
