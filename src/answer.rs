//! Retrieval-augmented answering for the knowledge-backed categories.
//!
//! The question is embedded and the nearest entries of the category's
//! index are pasted into the prompt as `[source]` blocks. An index holding
//! both web and store entries retrieves `k_hybrid` entries, otherwise
//! `k_single`. When no index is available, or the question cannot be
//! embedded, the answer is generated from the question alone.

use std::sync::Arc;
use tracing::{debug, warn};

use kbroute_core::category::Category;
use kbroute_core::embedding::Embedder;
use kbroute_core::generation::Generator;
use kbroute_core::index::VectorIndex;
use kbroute_core::models::IndexEntry;

use crate::knowledge::KnowledgeBases;

/// Returned whenever generation fails or produces nothing.
pub const GENERATION_FAILED_MESSAGE: &str =
    "Sorry, I couldn't process your request right now. Please try again in a moment.";

const LANGUAGE_RULE: &str = "Answer in the same language as the question.";

/// Expert role and focus for a knowledge-backed category.
fn expertise(category: Category) -> (&'static str, &'static str) {
    match category {
        Category::Accounting => (
            "an accounting and tax specialist with access to official guidance and ERP manuals",
            "- Explain fiscal obligations, deadlines and the documents involved\n\
             - Cite the relevant rule or authority when the context names it\n\
             - Describe the concrete steps in the ERP when the context covers them",
        ),
        Category::Management => (
            "a business management specialist with access to ERP manuals",
            "- Give practical answers about sales reports, inventory control, \
             performance indicators and ERP processes\n\
             - Include practical examples and relevant KPIs\n\
             - Suggest management best practices",
        ),
        _ => (
            "a helpful assistant",
            "- Answer clearly and completely",
        ),
    }
}

/// Prompt grounded on retrieved context.
pub fn grounded_prompt(category: Category, question: &str, context: &[&IndexEntry]) -> String {
    let (role, instructions) = expertise(category);
    let context = context
        .iter()
        .map(|e| format!("[{}]\n{}", e.metadata.source, e.text))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "You are {role}.\n\n\
         INSTRUCTIONS:\n{instructions}\n\
         - Prefer the knowledge base context below; say so when it does not cover the question\n\
         - {LANGUAGE_RULE}\n\n\
         KNOWLEDGE BASE CONTEXT:\n{context}\n\n\
         QUESTION: {question}\n\n\
         ANSWER:"
    )
}

/// Prompt used when no knowledge base context is available.
pub fn fallback_prompt(category: Category, question: &str) -> String {
    let (role, _) = expertise(category);
    format!(
        "As {role}, answer the question below. Give a practical, \
         results-oriented answer. {LANGUAGE_RULE}\n\n{question}"
    )
}

pub struct Answerer {
    knowledge: Arc<KnowledgeBases>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    k_single: usize,
    k_hybrid: usize,
}

impl Answerer {
    pub fn new(
        knowledge: Arc<KnowledgeBases>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        k_single: usize,
        k_hybrid: usize,
    ) -> Self {
        Self {
            knowledge,
            embedder,
            generator,
            k_single,
            k_hybrid,
        }
    }

    /// Number of entries retrieved from `index`.
    pub fn retrieval_k(&self, index: &VectorIndex) -> usize {
        if index.is_hybrid() {
            self.k_hybrid
        } else {
            self.k_single
        }
    }

    /// Answer `question` using the knowledge base of `category`.
    ///
    /// Never fails: every error path ends in ungrounded generation or
    /// [`GENERATION_FAILED_MESSAGE`].
    pub async fn answer(&self, question: &str, category: Category) -> String {
        let index = match self.knowledge.load_or_create(category).await {
            Ok(index) if !index.is_empty() => index,
            Ok(_) => {
                debug!(category = %category, "knowledge base is empty");
                return self.generate(&fallback_prompt(category, question)).await;
            }
            Err(e) => {
                warn!(category = %category, error = %e, "knowledge base unavailable, answering without context");
                return self.generate(&fallback_prompt(category, question)).await;
            }
        };

        let vector = match self.embedder.embed(question).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "question embedding failed, answering without context");
                return self.generate(&fallback_prompt(category, question)).await;
            }
        };

        let hits = index.query(&vector, self.retrieval_k(&index));
        if hits.is_empty() {
            return self.generate(&fallback_prompt(category, question)).await;
        }
        debug!(
            category = %category,
            retrieved = hits.len(),
            best_score = hits[0].1,
            "context retrieved"
        );

        let context: Vec<&IndexEntry> = hits.into_iter().map(|(e, _)| e).collect();
        self.generate(&grounded_prompt(category, question, &context))
            .await
    }

    /// Generate text for `prompt`, replacing failures with a friendly message.
    pub async fn generate(&self, prompt: &str) -> String {
        match self.generator.generate(prompt).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                warn!("generator returned an empty answer");
                GENERATION_FAILED_MESSAGE.to_string()
            }
            Err(e) => {
                warn!(error = %e, "generation failed");
                GENERATION_FAILED_MESSAGE.to_string()
            }
        }
    }
}
