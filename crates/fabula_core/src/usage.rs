//! Token accounting and run budgets for generative calls.

use serde::{Deserialize, Serialize};

/// Token usage statistics, either for one call or cumulative across a run.
///
/// # Examples
///
/// ```
/// use fabula_core::TokenUsage;
///
/// let mut total = TokenUsage::default();
/// total.absorb(&TokenUsage::new(100, 50));
/// total.absorb(&TokenUsage::new(200, 80));
/// assert_eq!(total.total_tokens, 430);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens in the prompt/input.
    pub prompt_tokens: usize,
    /// Tokens in the response/output.
    pub completion_tokens: usize,
    /// Total tokens (prompt + completion).
    pub total_tokens: usize,
    /// Accumulated cost in USD.
    pub cost_usd: f64,
}

impl TokenUsage {
    /// Create a new token usage record for a single call.
    pub fn new(prompt_tokens: usize, completion_tokens: usize) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            cost_usd: 0.0,
        }
    }

    /// Calculate and attach cost based on pricing per million tokens.
    pub fn with_cost(
        mut self,
        prompt_price_per_million: f64,
        completion_price_per_million: f64,
    ) -> Self {
        let prompt_cost = (self.prompt_tokens as f64 / 1_000_000.0) * prompt_price_per_million;
        let completion_cost =
            (self.completion_tokens as f64 / 1_000_000.0) * completion_price_per_million;
        self.cost_usd = prompt_cost + completion_cost;
        self
    }

    /// Fold another usage record into this cumulative total.
    pub fn absorb(&mut self, other: &TokenUsage) {
        self.prompt_tokens = self.prompt_tokens.saturating_add(other.prompt_tokens);
        self.completion_tokens = self
            .completion_tokens
            .saturating_add(other.completion_tokens);
        self.total_tokens = self.total_tokens.saturating_add(other.total_tokens);
        self.cost_usd += other.cost_usd;
    }
}

/// Hard ceilings for a single pipeline run.
///
/// The token ceiling gates all regeneration: once reached, no further
/// generative calls of any kind are attempted regardless of remaining
/// per-category counters. Exhaustion is a terminal condition, not an error.
///
/// # Examples
///
/// ```
/// use fabula_core::{RunBudget, TokenUsage};
///
/// let budget = RunBudget::default();
/// assert!(!budget.tokens_exhausted(&TokenUsage::new(100, 100)));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_getters::Getters)]
pub struct RunBudget {
    /// Cumulative token ceiling across all calls in the run.
    max_total_tokens: usize,
    /// Maximum chapter-scoped targeted-edit calls.
    max_expand_calls: u32,
    /// Maximum whole-story rewrite passes.
    max_rewrite_passes: u32,
    /// Maximum warning-polish passes.
    max_polish_passes: u32,
}

impl Default for RunBudget {
    fn default() -> Self {
        Self {
            max_total_tokens: 120_000,
            max_expand_calls: 3,
            max_rewrite_passes: 1,
            max_polish_passes: 0,
        }
    }
}

impl RunBudget {
    /// Create a budget with explicit ceilings.
    pub fn new(
        max_total_tokens: usize,
        max_expand_calls: u32,
        max_rewrite_passes: u32,
        max_polish_passes: u32,
    ) -> Self {
        Self {
            max_total_tokens,
            max_expand_calls,
            max_rewrite_passes,
            max_polish_passes,
        }
    }

    /// Whether cumulative usage has reached the token ceiling.
    pub fn tokens_exhausted(&self, usage: &TokenUsage) -> bool {
        usage.total_tokens >= self.max_total_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_accumulation() {
        let mut total = TokenUsage::default();
        total.absorb(&TokenUsage::new(10, 5).with_cost(1.0, 2.0));
        total.absorb(&TokenUsage::new(20, 10));
        assert_eq!(total.prompt_tokens, 30);
        assert_eq!(total.completion_tokens, 15);
        assert_eq!(total.total_tokens, 45);
        assert!(total.cost_usd > 0.0);
    }

    #[test]
    fn test_cost_calculation() {
        let usage = TokenUsage::new(1_000_000, 500_000).with_cost(1.0, 2.0);
        assert!((usage.cost_usd - 2.0).abs() < 0.001);
    }

    #[test]
    fn test_token_ceiling() {
        let budget = RunBudget::new(100, 1, 1, 0);
        assert!(!budget.tokens_exhausted(&TokenUsage::new(40, 40)));
        assert!(budget.tokens_exhausted(&TokenUsage::new(60, 40)));
    }
}
