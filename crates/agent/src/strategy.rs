//! Execution strategy: maps a task's complexity to loop settings.

use kestrel_core::model::GenerateOptions;

use crate::classifier::Complexity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    Fast,
    Balanced,
    Best,
}

impl ModelTier {
    /// Model name for this tier, if the provider has a tier table.
    /// Other providers keep their configured model.
    pub fn model_for(&self, provider: &str) -> Option<&'static str> {
        let (fast, balanced, best) = match provider.to_lowercase().as_str() {
            "openai" => ("gpt-3.5-turbo", "gpt-4", "gpt-4"),
            "anthropic" => (
                "claude-haiku-4-5-20251001",
                "claude-sonnet-4-5-20250929",
                "claude-opus-4-1-20250805",
            ),
            _ => return None,
        };
        Some(match self {
            Self::Fast => fast,
            Self::Balanced => balanced,
            Self::Best => best,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionStrategy {
    pub complexity: Complexity,
    pub max_iterations: usize,
    pub temperature: f32,
    pub max_tokens: u32,
    pub use_planning: bool,
    pub model_tier: ModelTier,
}

impl ExecutionStrategy {
    /// Settings for `complexity`, with iterations capped at `max_iterations`.
    pub fn for_complexity(complexity: Complexity, max_iterations: usize) -> Self {
        let (iterations, temperature, max_tokens, use_planning, model_tier) = match complexity {
            Complexity::Conversational => (1, 0.7, 1000, false, ModelTier::Fast),
            Complexity::Simple => (5, 0.4, 2000, false, ModelTier::Balanced),
            Complexity::Complex => (15, 0.3, 4000, true, ModelTier::Best),
        };
        Self {
            complexity,
            max_iterations: iterations.min(max_iterations),
            temperature,
            max_tokens,
            use_planning,
            model_tier,
        }
    }

    pub fn generate_options(&self) -> GenerateOptions {
        GenerateOptions::default()
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens)
    }
}
