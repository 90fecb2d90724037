//! Cache key derivation.

use super::normalize::normalize;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// How a backend addresses its entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyScheme {
    /// `"{normalized}:{language}"`, for stores private to one process or profile.
    Composite,
    /// SHA-256 hex of the composite string, for stores shared across tenants.
    Hashed,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub value: String,
    pub normalized_query: String,
    pub language: String,
}

impl CacheKey {
    /// Key from an already normalized query.
    pub fn derive(normalized_query: &str, language: &str, scheme: KeyScheme) -> Self {
        let language = normalize_language(language);
        let composite = composite_string(normalized_query, &language);
        let value = match scheme {
            KeyScheme::Composite => composite,
            KeyScheme::Hashed => {
                let mut hasher = Sha256::new();
                hasher.update(composite.as_bytes());
                hasher
                    .finalize()
                    .iter()
                    .map(|b| format!("{:02x}", b))
                    .collect()
            }
        };
        Self {
            value,
            normalized_query: normalized_query.to_string(),
            language,
        }
    }

    pub fn composite(normalized_query: &str, language: &str) -> Self {
        Self::derive(normalized_query, language, KeyScheme::Composite)
    }

    pub fn hashed(normalized_query: &str, language: &str) -> Self {
        Self::derive(normalized_query, language, KeyScheme::Hashed)
    }

    /// Normalize a raw query and derive its key in one step.
    pub fn for_query(query: &str, language: &str, scheme: KeyScheme) -> Self {
        Self::derive(&normalize(query), language, scheme)
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// Language tags are compared lowercase and trimmed.
pub fn normalize_language(language: &str) -> String {
    language.trim().to_lowercase()
}

pub fn composite_string(normalized_query: &str, language: &str) -> String {
    format!("{}:{}", normalized_query, language)
}
