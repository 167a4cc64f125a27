//! Voice catalog reconciliation

use std::sync::Arc;

use tracing::info;

use crate::persona::Persona;

use super::{Voice, VoiceSelection};

/// Style every voice supports
pub const DEFAULT_STYLE: &str = "default";

/// Pick the voice `selection` should move to, if any.
///
/// A selection whose voice is in the catalog but does not speak the
/// selection's language is moved to the first matching voice by display
/// name. Unknown voices are left alone.
pub fn reconcile(selection: &VoiceSelection, catalog: &[Voice]) -> Option<VoiceSelection> {
    if selection.language.is_empty() {
        return None;
    }
    let current = catalog.iter().find(|v| v.short_name == selection.voice)?;
    if current.locale_name.contains(&selection.language) {
        return None;
    }

    let replacement = catalog
        .iter()
        .filter(|v| v.locale_name.contains(&selection.language))
        .min_by(|a, b| a.display_name.cmp(&b.display_name))
        .map(|v| v.short_name.clone())
        .unwrap_or_default();

    Some(VoiceSelection {
        voice: replacement,
        style: DEFAULT_STYLE.to_string(),
        language: selection.language.clone(),
    })
}

/// Apply [`reconcile`] to every persona; returns how many changed
pub fn reconcile_personas(personas: &[Arc<Persona>], catalog: &[Voice]) -> usize {
    let mut changed = 0;
    for persona in personas {
        let current = persona.voice();
        if let Some(updated) = reconcile(&current, catalog) {
            info!(
                persona = %persona.name(),
                from = %current.voice,
                to = %updated.voice,
                language = %updated.language,
                "Voice does not match language, switching"
            );
            persona.set_voice(updated);
            changed += 1;
        }
    }
    changed
}
