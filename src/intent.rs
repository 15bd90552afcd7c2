//! Intent classification with the configured generator.

use std::sync::Arc;
use tracing::{debug, warn};

use kbroute_core::category::Category;
use kbroute_core::generation::Generator;

/// Build the classification prompt for `text`.
pub fn classification_prompt(text: &str) -> String {
    let slugs = Category::ALL
        .iter()
        .map(|c| c.slug())
        .collect::<Vec<_>>()
        .join(", ");
    let descriptions = Category::ALL
        .iter()
        .map(|c| format!("- {}: {}", c.slug(), c.description()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are an intent classifier. Decide which category best represents \
         the user's intent.\n\n\
         AVAILABLE CATEGORIES:\n{slugs}\n\n\
         CATEGORY DESCRIPTIONS:\n{descriptions}\n\n\
         USER TEXT: \"{text}\"\n\n\
         INSTRUCTIONS:\n\
         1. Reply with ONLY the name of the most appropriate category\n\
         2. When in doubt between categories, pick the more specific one\n\
         3. Use \"{general}\" only when nothing else clearly matches\n\n\
         CATEGORY:",
        general = Category::General.slug(),
    )
}

pub struct IntentClassifier {
    generator: Arc<dyn Generator>,
}

impl IntentClassifier {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    /// Classify `text`. Any generation failure yields [`Category::General`].
    pub async fn classify(&self, text: &str) -> Category {
        match self.generator.generate(&classification_prompt(text)).await {
            Ok(reply) => {
                let category = Category::parse_reply(&reply);
                debug!(reply = %reply.trim(), category = %category, "intent classified");
                category
            }
            Err(e) => {
                warn!(error = %e, "intent classification failed, using general");
                Category::General
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kbroute_core::error::GenerationError;

    struct Fixed(Result<String, GenerationError>);

    #[async_trait]
    impl Generator for Fixed {
        fn model_name(&self) -> &str {
            "fixed"
        }
        async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
            match &self.0 {
                Ok(s) => Ok(s.clone()),
                Err(_) => Err(GenerationError::Disabled),
            }
        }
    }

    fn classifier(reply: Result<String, GenerationError>) -> IntentClassifier {
        IntentClassifier::new(Arc::new(Fixed(reply)))
    }

    #[test]
    fn test_prompt_lists_every_category() {
        let prompt = classification_prompt("Como emitir uma nota fiscal?");
        for c in Category::ALL {
            assert!(prompt.contains(c.slug()));
        }
        assert!(prompt.contains("\"Como emitir uma nota fiscal?\""));
    }

    #[tokio::test]
    async fn test_classify_parses_reply() {
        let c = classifier(Ok("Category: management.".into()));
        assert_eq!(c.classify("relatório de vendas").await, Category::Management);
    }

    #[tokio::test]
    async fn test_classify_falls_back_to_general() {
        assert_eq!(
            classifier(Ok("I am not sure".into())).classify("oi").await,
            Category::General
        );
        assert_eq!(
            classifier(Err(GenerationError::Disabled)).classify("oi").await,
            Category::General
        );
    }
}
