// Identity key derivation
// Two records describe the same plant when their keys are equal.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PlantScopeError, Result};

/// Normalized scientific name: trimmed, lower-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityKey(String);

impl IdentityKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive the identity key for a scientific name.
/// Fails with `InvalidIdentity` on empty (or all-whitespace) input.
pub fn derive_key(scientific_name: &str) -> Result<IdentityKey> {
    let trimmed = scientific_name.trim();
    if trimmed.is_empty() {
        return Err(PlantScopeError::InvalidIdentity(
            "scientific name is empty".to_string(),
        ));
    }
    Ok(IdentityKey(trimmed.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_ignores_case_and_outer_whitespace() {
        assert_eq!(
            derive_key(" Rosa Canina ").unwrap(),
            derive_key("rosa canina").unwrap()
        );
        assert_eq!(derive_key("\tQuercus ROBUR\n").unwrap().as_str(), "quercus robur");
    }

    #[test]
    fn test_inner_whitespace_is_kept() {
        assert_ne!(
            derive_key("Rosa  canina").unwrap(),
            derive_key("Rosa canina").unwrap()
        );
    }

    #[test]
    fn test_empty_name_rejected() {
        assert!(matches!(derive_key(""), Err(PlantScopeError::InvalidIdentity(_))));
        assert!(matches!(derive_key("   "), Err(PlantScopeError::InvalidIdentity(_))));
    }
}
