//! Message eligibility and privileged-role detection.

use crate::InboundMessageEvent;
use crate::config::PersonaConfig;

/// Whether an inbound event should enter the pipeline at all.
///
/// Rejects bot authors (the bot itself included) and, when the persona has a
/// non-empty channel allow-list, anything outside it. Evaluated before any
/// side effect.
pub fn should_process(event: &InboundMessageEvent, config: &PersonaConfig) -> bool {
    if event.author_is_bot {
        return false;
    }

    if !config.active_channels.is_empty()
        && !config.active_channels.iter().any(|id| id == &event.channel_id)
    {
        return false;
    }

    true
}

/// True iff any fragment is a substring of any role name. Case sensitive.
///
/// "Fleet Commander" matches the "Commander" fragment; so does
/// "Sub-Commander Trainee", which is the deployed behavior.
pub fn role_name_contains_any<R, F>(role_names: &[R], fragments: &[F]) -> bool
where
    R: AsRef<str>,
    F: AsRef<str>,
{
    role_names.iter().any(|role| {
        fragments
            .iter()
            .any(|fragment| role.as_ref().contains(fragment.as_ref()))
    })
}
