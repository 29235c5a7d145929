pub mod gemini;

use crate::history::HistoryRecord;
use async_trait::async_trait;

pub const UNAVAILABLE_REPLY: &str =
    "Sorry, I'm having trouble connecting to my brain right now (API key issue).";
pub const EMPTY_REPLY: &str =
    "I received an empty or unexpected response from Gemini. Please try again.";
pub const UNUSUAL_REPLY: &str =
    "I received an unusual response structure from Gemini. Please try again.";
pub const ERROR_REPLY: &str =
    "I'm having trouble processing that request with my AI brain. Please try again later.";

/// Produces reply text for an incoming message. Failures degrade to a
/// fallback apology string instead of an error.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate(&self, message: &str, history: &[HistoryRecord]) -> String;

    /// Whether a backing model client is configured.
    fn is_available(&self) -> bool {
        true
    }

    fn model_name(&self) -> &str;
}

/// Stand-in used when no API key is configured.
pub struct UnavailableGenerator {
    model: String,
}

impl UnavailableGenerator {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl ResponseGenerator for UnavailableGenerator {
    async fn generate(&self, _message: &str, _history: &[HistoryRecord]) -> String {
        tracing::error!("Gemini client is not initialized.");
        UNAVAILABLE_REPLY.to_string()
    }

    fn is_available(&self) -> bool {
        false
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unavailable_generator_apologises() {
        let generator = UnavailableGenerator::new("gemini-2.0-flash");
        assert!(!generator.is_available());
        assert_eq!(generator.model_name(), "gemini-2.0-flash");
        assert_eq!(generator.generate("hi", &[]).await, UNAVAILABLE_REPLY);
    }
}
