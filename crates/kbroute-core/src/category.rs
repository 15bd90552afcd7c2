//! The closed set of intents a user request can be routed to.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Intent category assigned to a user request.
///
/// [`Category::General`] is the typed default whenever classification is
/// inconclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Accounting,
    Database,
    Management,
    #[serde(rename = "generate_image")]
    ImageGeneration,
    #[serde(rename = "analyze_image")]
    ImageAnalysis,
    #[serde(rename = "generate_audio")]
    AudioGeneration,
    #[serde(rename = "analyze_audio")]
    AudioAnalysis,
    #[serde(rename = "generate_video")]
    VideoGeneration,
    #[serde(rename = "analyze_video")]
    VideoAnalysis,
    #[default]
    General,
}

impl Category {
    /// Every category, in the order presented to the classifier.
    pub const ALL: [Category; 10] = [
        Category::Accounting,
        Category::Database,
        Category::Management,
        Category::ImageGeneration,
        Category::ImageAnalysis,
        Category::AudioGeneration,
        Category::AudioAnalysis,
        Category::VideoGeneration,
        Category::VideoAnalysis,
        Category::General,
    ];

    /// Stable identifier used in prompts, config, and the CLI.
    pub fn slug(&self) -> &'static str {
        match self {
            Category::Accounting => "accounting",
            Category::Database => "database",
            Category::Management => "management",
            Category::ImageGeneration => "generate_image",
            Category::ImageAnalysis => "analyze_image",
            Category::AudioGeneration => "generate_audio",
            Category::AudioAnalysis => "analyze_audio",
            Category::VideoGeneration => "generate_video",
            Category::VideoAnalysis => "analyze_video",
            Category::General => "general",
        }
    }

    /// One-line description shown to the classifier.
    pub fn description(&self) -> &'static str {
        match self {
            Category::Accounting => {
                "questions about accounting, taxes, fiscal obligations, invoices and bookkeeping"
            }
            Category::Database => {
                "questions about the database: tables, records, queries, users, products and sales"
            }
            Category::Management => {
                "questions about business management, inventory, sales processes, planning and reports"
            }
            Category::ImageGeneration => "requests to create or draw an image",
            Category::ImageAnalysis => "requests to describe or analyze an image",
            Category::AudioGeneration => "requests to produce speech, music or other audio",
            Category::AudioAnalysis => "requests to transcribe or analyze an audio file",
            Category::VideoGeneration => "requests to create a video",
            Category::VideoAnalysis => "requests to describe or analyze a video",
            Category::General => "any other question or conversation",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Category> {
        let slug = slug.trim();
        Category::ALL
            .into_iter()
            .find(|c| c.slug().eq_ignore_ascii_case(slug))
    }

    /// Interpret a classifier reply.
    ///
    /// The reply is trimmed and lower-cased, then matched as an exact slug,
    /// then as the first slug (in [`Category::ALL`] order) it contains.
    /// Anything else is [`Category::General`].
    pub fn parse_reply(reply: &str) -> Category {
        let reply = reply.trim().to_lowercase();
        if let Some(exact) = Category::from_slug(&reply) {
            return exact;
        }
        Category::ALL
            .into_iter()
            .find(|c| reply.contains(c.slug()))
            .unwrap_or_default()
    }

    /// Whether requests in this category ask for media work.
    pub fn is_media(&self) -> bool {
        !matches!(
            self,
            Category::Accounting | Category::Database | Category::Management | Category::General
        )
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugs_round_trip() {
        for c in Category::ALL {
            assert_eq!(Category::from_slug(c.slug()), Some(c));
        }
        assert_eq!(Category::from_slug("nope"), None);
    }

    #[test]
    fn test_parse_exact_reply() {
        assert_eq!(Category::parse_reply("  Accounting\n"), Category::Accounting);
        assert_eq!(
            Category::parse_reply("generate_image"),
            Category::ImageGeneration
        );
    }

    #[test]
    fn test_parse_reply_containing_slug() {
        assert_eq!(
            Category::parse_reply("The category is: management."),
            Category::Management
        );
    }

    #[test]
    fn test_parse_unknown_reply_defaults_to_general() {
        assert_eq!(Category::parse_reply("I am not sure"), Category::General);
        assert_eq!(Category::parse_reply(""), Category::General);
    }

    #[test]
    fn test_serde_uses_slugs() {
        let json = serde_json::to_string(&Category::VideoAnalysis).unwrap();
        assert_eq!(json, "\"analyze_video\"");
        let back: Category = serde_json::from_str("\"accounting\"").unwrap();
        assert_eq!(back, Category::Accounting);
    }

    #[test]
    fn test_media_categories() {
        assert!(Category::AudioAnalysis.is_media());
        assert!(!Category::General.is_media());
    }
}
