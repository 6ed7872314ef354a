//! Language requirement resolution
//!
//! Computes, from a roster snapshot, the set of languages a message must be
//! made available in, and the single language each participant should read
//! content in. Pure over the snapshot: membership changes mid-translation do
//! not affect an in-flight fan-out.

use std::collections::BTreeSet;
use std::sync::Arc;

use uuid::Uuid;

use crate::models::ParticipantLanguageProfile;
use crate::services::membership::{DirectoryError, ParticipantDirectory};

pub fn normalize_code(code: &str) -> String {
    code.trim().to_lowercase()
}

pub struct LanguageResolver {
    directory: Arc<dyn ParticipantDirectory>,
    default_language: String,
}

impl LanguageResolver {
    pub fn new(directory: Arc<dyn ParticipantDirectory>, default_language: &str) -> Self {
        Self {
            directory,
            default_language: normalize_code(default_language),
        }
    }

    /// Roster snapshot for one conversation, taken at dispatch time.
    pub async fn roster(
        &self,
        conversation_id: Uuid,
    ) -> Result<Vec<ParticipantLanguageProfile>, DirectoryError> {
        self.directory.get_active_participants(conversation_id).await
    }

    pub async fn required_languages(
        &self,
        conversation_id: Uuid,
        source_language: &str,
    ) -> Result<BTreeSet<String>, DirectoryError> {
        let roster = self.roster(conversation_id).await?;
        Ok(self.required_from_roster(&roster, source_language))
    }

    /// The required language set for one roster snapshot.
    ///
    /// Every participant's system language is included unconditionally; the
    /// regional and custom destinations only when auto-translate is on and
    /// the respective flag is set. The source language never appears.
    pub fn required_from_roster(
        &self,
        roster: &[ParticipantLanguageProfile],
        source_language: &str,
    ) -> BTreeSet<String> {
        let mut required = BTreeSet::new();

        for profile in roster {
            required.insert(self.system_language_of(profile));

            if profile.auto_translate_enabled {
                if profile.translate_to_regional_language {
                    if let Some(regional) = non_empty(&profile.regional_language) {
                        required.insert(normalize_code(regional));
                    }
                }
                if profile.use_custom_destination {
                    if let Some(custom) = non_empty(&profile.custom_destination_language) {
                        required.insert(normalize_code(custom));
                    }
                }
            }
        }

        required.remove(&normalize_code(source_language));
        required
    }

    /// The participant's base language, falling back to the configured
    /// default when the profile carries none.
    pub fn system_language_of(&self, profile: &ParticipantLanguageProfile) -> String {
        non_empty(&profile.system_language)
            .map(normalize_code)
            .unwrap_or_else(|| self.default_language.clone())
    }

    /// The single language this participant should see content in:
    /// custom destination, else system, else regional, else system.
    pub fn resolved_preference(&self, profile: &ParticipantLanguageProfile) -> String {
        if profile.use_custom_destination {
            if let Some(custom) = non_empty(&profile.custom_destination_language) {
                return normalize_code(custom);
            }
        }
        if profile.translate_to_system_language {
            return self.system_language_of(profile);
        }
        if profile.translate_to_regional_language {
            if let Some(regional) = non_empty(&profile.regional_language) {
                return normalize_code(regional);
            }
        }
        self.system_language_of(profile)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::membership::StaticParticipantDirectory;

    fn resolver() -> LanguageResolver {
        LanguageResolver::new(StaticParticipantDirectory::shared(), "en")
    }

    fn profile(system: &str) -> ParticipantLanguageProfile {
        ParticipantLanguageProfile::new(Uuid::new_v4(), system)
    }

    #[test]
    fn test_system_language_always_required() {
        let mut p = profile("de");
        p.auto_translate_enabled = false;

        let required = resolver().required_from_roster(&[p], "fr");
        assert!(required.contains("de"));
    }

    #[test]
    fn test_disabled_auto_translate_suppresses_extras() {
        let mut p = profile("de");
        p.auto_translate_enabled = false;
        p.translate_to_regional_language = true;
        p.regional_language = Some("bar".into());
        p.use_custom_destination = true;
        p.custom_destination_language = Some("pt".into());

        let required = resolver().required_from_roster(&[p], "fr");
        assert_eq!(required.into_iter().collect::<Vec<_>>(), vec!["de"]);
    }

    #[test]
    fn test_source_language_never_required() {
        let p = profile("fr");
        let required = resolver().required_from_roster(&[p], "FR");
        assert!(required.is_empty());
    }

    #[test]
    fn test_missing_system_language_falls_back_to_default() {
        let mut p = profile("de");
        p.system_language = None;
        let mut q = profile("de");
        q.system_language = Some("   ".into());

        let r = resolver();
        assert_eq!(r.system_language_of(&p), "en");
        assert_eq!(r.system_language_of(&q), "en");
    }

    #[test]
    fn test_fanout_scenario() {
        // fr participant, en participant with regional zh, es participant
        // with custom destination en
        let fr = profile("fr");

        let mut en = profile("en");
        en.regional_language = Some("zh".into());
        en.translate_to_regional_language = true;

        let mut es = profile("es");
        es.custom_destination_language = Some("en".into());
        es.use_custom_destination = true;

        let required = resolver().required_from_roster(&[fr, en, es], "fr");
        let expected: BTreeSet<String> =
            ["en", "zh", "es"].iter().map(|s| s.to_string()).collect();
        assert_eq!(required, expected);
    }

    #[test]
    fn test_resolved_preference_precedence() {
        let r = resolver();

        let mut p = profile("de");
        p.regional_language = Some("bar".into());
        p.custom_destination_language = Some("pt".into());

        // custom wins when enabled
        p.use_custom_destination = true;
        assert_eq!(r.resolved_preference(&p), "pt");

        // then system
        p.use_custom_destination = false;
        assert_eq!(r.resolved_preference(&p), "de");

        // then regional
        p.translate_to_system_language = false;
        p.translate_to_regional_language = true;
        assert_eq!(r.resolved_preference(&p), "bar");

        // system is the final fallback
        p.translate_to_regional_language = false;
        assert_eq!(r.resolved_preference(&p), "de");
    }

    #[tokio::test]
    async fn test_required_languages_uses_directory_snapshot() {
        let directory = StaticParticipantDirectory::shared();
        let conversation_id = Uuid::new_v4();
        directory
            .set_roster(conversation_id, vec![profile("ja"), profile("ko")])
            .await;

        let resolver = LanguageResolver::new(directory, "en");
        let required = resolver
            .required_languages(conversation_id, "en")
            .await
            .unwrap();
        let expected: BTreeSet<String> = ["ja", "ko"].iter().map(|s| s.to_string()).collect();
        assert_eq!(required, expected);
    }
}
