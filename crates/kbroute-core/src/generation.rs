//! Text generation capability.
//!
//! The [`Generator`] trait is the seam between the pipeline and whatever
//! language model produces answers and intent labels. HTTP-backed
//! implementations live in the `kbroute` app crate.

use async_trait::async_trait;

use crate::error::GenerationError;

/// Produces a completion for a single prompt.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Returns the model identifier used for completions.
    fn model_name(&self) -> &str;

    /// Generate a completion for `prompt`, returning the text verbatim.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}
