//! Cache key derivation
//!
//! Keys are content-addressed: the normalized source text is hashed together
//! with the language pair and model tier, so superficial differences in
//! casing, punctuation, accents, and spacing land in the same slot.
//! Key format: v{VERSION}:translation:{source}:{target}:{tier}:{digest}

use sha2::{Digest, Sha256};

use crate::models::ModelTier;

/// Cache schema version - increment when changing key or value formats
pub const CACHE_VERSION: u32 = 1;

/// Normalize text before hashing: lowercase, fold diacritics, strip
/// punctuation, collapse whitespace.
pub fn normalize_text(text: &str) -> String {
    let mut folded = String::with_capacity(text.len());
    for ch in text.to_lowercase().chars() {
        match ch {
            'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => folded.push('a'),
            'è' | 'é' | 'ê' | 'ë' => folded.push('e'),
            'ì' | 'í' | 'î' | 'ï' => folded.push('i'),
            'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' => folded.push('o'),
            'ù' | 'ú' | 'û' | 'ü' => folded.push('u'),
            'ý' | 'ÿ' => folded.push('y'),
            'ç' => folded.push('c'),
            'ñ' => folded.push('n'),
            'æ' => folded.push_str("ae"),
            'œ' => folded.push_str("oe"),
            'ß' => folded.push_str("ss"),
            _ => folded.push(ch),
        }
    }

    let stripped: String = folded
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();

    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Key prefix shared by every entry of one (source, target, tier) triple;
/// used for the similarity scan.
pub fn language_pair_prefix(source: &str, target: &str, tier: ModelTier) -> String {
    format!(
        "v{}:translation:{}:{}:{}",
        CACHE_VERSION,
        source.to_lowercase(),
        target.to_lowercase(),
        tier.as_str()
    )
}

/// Full cache key for one normalized input.
pub fn cache_key(normalized_text: &str, source: &str, target: &str, tier: ModelTier) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized_text.as_bytes());
    hasher.update(b"\n");
    hasher.update(source.to_lowercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(target.to_lowercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(tier.as_str().as_bytes());
    let digest = hex::encode(hasher.finalize());

    format!("{}:{}", language_pair_prefix(source, target, tier), digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_superficial_differences() {
        assert_eq!(normalize_text("Hello!!"), normalize_text("hello"));
        assert_eq!(normalize_text("Holá"), "hola");
        assert_eq!(normalize_text("  good   morning\t"), "good morning");
        assert_eq!(normalize_text("Café, s'il vous plaît!"), "cafe sil vous plait");
    }

    #[test]
    fn test_cache_key_is_deterministic() {
        let a = cache_key("hola", "es", "en", ModelTier::Basic);
        let b = cache_key("hola", "es", "en", ModelTier::Basic);
        assert_eq!(a, b);
    }

    #[test]
    fn test_cache_key_separates_tiers_and_pairs() {
        let base = cache_key("hola", "es", "en", ModelTier::Basic);
        assert_ne!(base, cache_key("hola", "es", "en", ModelTier::Premium));
        assert_ne!(base, cache_key("hola", "es", "de", ModelTier::Basic));
        assert_ne!(base, cache_key("adios", "es", "en", ModelTier::Basic));
    }

    #[test]
    fn test_key_carries_language_pair_prefix() {
        let key = cache_key("hola", "ES", "en", ModelTier::Medium);
        assert!(key.starts_with("v1:translation:es:en:medium:"));
    }
}
