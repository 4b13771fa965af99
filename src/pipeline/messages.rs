//! Localized reply texts.

use std::collections::HashMap;

use tracing::warn;

/// Invite an author to participate.
pub const INVITE_TEXT: &str = "invite_text";

/// Ask an author to enable location on their messages.
pub const ASK_FOR_GEO_TEXT: &str = "askforgeo_text";

/// Thank an author for a confirmed report. The report reference is appended.
pub const THANKS_TEXT: &str = "thanks_text";

/// Message code → language → text, with a default language fallback.
#[derive(Debug, Clone, Default)]
pub struct MessageTexts {
    texts: HashMap<String, HashMap<String, String>>,
    default_language: String,
}

impl MessageTexts {
    pub fn new(
        texts: HashMap<String, HashMap<String, String>>,
        default_language: impl Into<String>,
    ) -> Self {
        Self {
            texts,
            default_language: default_language.into(),
        }
    }

    /// Resolve `code` using each language in order, then the default language.
    ///
    /// Returns `None` (and logs a warning) when nothing matches; callers skip the reply.
    pub fn resolve<S: AsRef<str>>(&self, code: &str, languages: &[S]) -> Option<String> {
        if let Some(by_lang) = self.texts.get(code) {
            let found = languages
                .iter()
                .find_map(|lang| by_lang.get(lang.as_ref()))
                .or_else(|| by_lang.get(&self.default_language));
            if let Some(text) = found {
                return Some(text.clone());
            }
        }

        let langs: Vec<&str> = languages.iter().map(AsRef::as_ref).collect();
        warn!(code, langs = ?langs, "Message code could not be resolved");
        None
    }
}
