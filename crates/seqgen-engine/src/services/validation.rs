//! # Sequence Validation Service
//!
//! Read-only checks on numbers and patterns. Nothing here locks or
//! writes.

use tracing::debug;

use seqgen_core::collision;
use seqgen_core::error::SequenceResult;
use seqgen_core::pattern::{self, Pattern};

use super::load_sequence;
use crate::store::Stores;

#[derive(Clone)]
pub struct SequenceValidationService {
    stores: Stores,
}

impl SequenceValidationService {
    pub fn new(stores: Stores) -> Self {
        SequenceValidationService { stores }
    }

    /// Returns true if `number` could have been issued by the sequence,
    /// under its own pattern or any recorded pattern version.
    pub async fn validate_number(
        &self,
        name: &str,
        number: &str,
        scope: Option<&str>,
    ) -> SequenceResult<bool> {
        let sequence = load_sequence(&self.stores, name, scope).await?;

        let mut patterns = vec![sequence.pattern.clone()];
        for version in self.stores.versions.versions(&sequence.id).await? {
            if !patterns.contains(&version.pattern) {
                patterns.push(version.pattern);
            }
        }

        for source in &patterns {
            if Pattern::compile(source)?.validation_regex()?.is_match(number) {
                debug!(sequence = %sequence.name, number, pattern = %source, "Number matches");
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn validate_syntax(&self, pattern: &str) -> SequenceResult<()> {
        pattern::validate_syntax(pattern)
    }

    /// Heuristic: same literal skeleton and same variable layout.
    pub fn detect_collisions(&self, first: &str, second: &str) -> SequenceResult<bool> {
        collision::detect_collisions(first, second)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PatternResolution;
    use crate::services::{testing, PatternVersionManager};
    use chrono::{Duration, Utc};
    use seqgen_core::types::SequenceDefinition;

    #[tokio::test]
    async fn test_validate_number_across_versions() {
        let (stores, _) = testing::stores();
        let seq = testing::insert(&stores, SequenceDefinition::new("invoice", "INV-{YEAR}-{COUNTER:5}")).await;
        let validation = SequenceValidationService::new(stores.clone());

        assert!(validation.validate_number("invoice", "INV-2024-00042", None).await.unwrap());
        assert!(!validation.validate_number("invoice", "INV-2024-A-00042", None).await.unwrap());
        assert!(!validation.validate_number("invoice", "PO-2024-00042", None).await.unwrap());

        PatternVersionManager::new(stores.clone(), PatternResolution::Versioned)
            .supersede(&seq, "INV-{YEAR}-A-{COUNTER:5}", Utc::now() - Duration::hours(1))
            .await
            .unwrap();
        assert!(validation.validate_number("invoice", "INV-2024-A-00042", None).await.unwrap());
        assert!(validation.validate_number("invoice", "INV-2024-00042", None).await.unwrap());
    }

    #[test]
    fn test_syntax_and_collisions() {
        let (stores, _) = testing::stores();
        let validation = SequenceValidationService::new(stores);

        assert!(validation.validate_syntax("PO-{COUNTER:4}").is_ok());
        assert!(validation.validate_syntax("PO-{COUNTER:4").is_err());

        assert!(validation
            .detect_collisions("INV-{YEAR}-{COUNTER:4}", "INV-{YEAR}-{COUNTER:6}")
            .unwrap());
        assert!(!validation
            .detect_collisions("INV-{YEAR}-{COUNTER}", "PO-{YEAR}-{COUNTER}")
            .unwrap());
    }
}
