//! Intent routing: classify a request and hand it to the matching handler.

use std::sync::Arc;
use tracing::{info, warn};

use kbroute_core::category::Category;
use kbroute_core::generation::Generator;
use kbroute_core::usage::UsageLog;

use crate::answer::Answerer;
use crate::intent::IntentClassifier;

/// Relational schema the database assistant answers about.
const DATABASE_SCHEMA: &str = "\
Table usuarios
- id (INT, PK)
- nome (VARCHAR)
- email (VARCHAR)
- created_at (TIMESTAMP)

Table produtos
- id (INT, PK)
- nome (VARCHAR)
- preco (DECIMAL)
- categoria_id (INT, FK)
- estoque (INT)

Table categorias
- id (INT, PK)
- nome (VARCHAR)
- descricao (TEXT)

Table vendas
- id (INT, PK)
- usuario_id (INT, FK)
- produto_id (INT, FK)
- quantidade (INT)
- valor_total (DECIMAL)
- data_venda (TIMESTAMP)

Relationships
- produtos.categoria_id -> categorias.id
- vendas.usuario_id -> usuarios.id
- vendas.produto_id -> produtos.id";

/// A routed answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub category: Category,
    pub text: String,
}

pub fn database_prompt(question: &str) -> String {
    format!(
        "You are a database and SQL specialist who knows the system's schema.\n\n\
         SCHEMA:\n{DATABASE_SCHEMA}\n\n\
         INSTRUCTIONS:\n\
         - Provide precise, efficient SQL queries\n\
         - Explain the logic behind each query\n\
         - Use JOINs that follow the relationships above\n\
         - Suggest indexes when appropriate\n\
         - Answer in the same language as the question\n\n\
         QUESTION: {question}\n\n\
         ANSWER:"
    )
}

pub fn general_prompt(question: &str) -> String {
    format!(
        "You are a helpful assistant. Answer the following question clearly \
         and completely, in the same language as the question.\n\n{question}"
    )
}

/// Fixed reply for media categories. Analysis asks for an uploaded file.
pub fn media_message(category: Category) -> Option<&'static str> {
    match category {
        Category::ImageGeneration => Some("Image generation is not available yet."),
        Category::AudioGeneration => Some("Audio generation is not available yet."),
        Category::VideoGeneration => Some("Video generation is not available yet."),
        Category::ImageAnalysis => Some("Please upload an image to analyze."),
        Category::AudioAnalysis => Some("Please upload an audio file to analyze."),
        Category::VideoAnalysis => Some("Please upload a video file to analyze."),
        Category::Accounting | Category::Database | Category::Management | Category::General => {
            None
        }
    }
}

pub struct Router {
    classifier: IntentClassifier,
    answerer: Answerer,
    model: String,
    usage: Option<Arc<dyn UsageLog>>,
}

impl Router {
    pub fn new(generator: Arc<dyn Generator>, answerer: Answerer) -> Self {
        Self {
            model: generator.model_name().to_string(),
            classifier: IntentClassifier::new(generator),
            answerer,
            usage: None,
        }
    }

    /// Record every answered request in `usage`.
    pub fn with_usage_log(mut self, usage: Arc<dyn UsageLog>) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Classify `input` and answer it.
    pub async fn handle(&self, input: &str) -> Reply {
        let category = self.classifier.classify(input).await;
        info!(category = %category, "request routed");
        self.dispatch(category, input).await
    }

    /// Answer `input` as a request of `category`.
    pub async fn dispatch(&self, category: Category, input: &str) -> Reply {
        let reply = self.reply(category, input).await;
        if let Some(usage) = &self.usage {
            let model = (!category.is_media()).then_some(self.model.as_str());
            if let Err(e) = usage.record_interaction(input, category, model).await {
                warn!(error = %e, "failed to record interaction");
            }
        }
        reply
    }

    async fn reply(&self, category: Category, input: &str) -> Reply {
        let text = match category {
            Category::Accounting | Category::Management => {
                self.answerer.answer(input, category).await
            }
            Category::Database => self.answerer.generate(&database_prompt(input)).await,
            Category::General => self.answerer.generate(&general_prompt(input)).await,
            Category::ImageGeneration
            | Category::ImageAnalysis
            | Category::AudioGeneration
            | Category::AudioAnalysis
            | Category::VideoGeneration
            | Category::VideoAnalysis => media_message(category)
                .unwrap_or_default()
                .to_string(),
        };
        Reply { category, text }
    }
}
