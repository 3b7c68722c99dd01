//! Pipeline configuration and the explicit-refresh config cache.

use crate::RunBudget;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Pipeline defaults, explicitly injected by callers.
///
/// This replaces a module-level mutable cache: callers construct (or fetch)
/// a config and pass it through, which keeps tests deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, derive_getters::Getters)]
pub struct PipelineConfig {
    /// Model identifier for text generation
    text_model: String,
    /// Model identifier for image generation
    image_model: String,
    /// Sampling temperature for story text
    temperature: f32,
    /// Hard ceilings for the revision controller
    budget: RunBudget,
    /// Global image-avoid tokens merged into every directive
    global_avoid: Vec<String>,
    /// Global negative prompts merged into every image spec
    global_negatives: Vec<String>,
    /// Prompt-token prices per million, (prompt, completion)
    token_prices: (f64, f64),
}

impl PipelineConfig {
    /// Replace the run budget, keeping the other defaults.
    pub fn with_budget(mut self, budget: RunBudget) -> Self {
        self.budget = budget;
        self
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            text_model: "story-text-large".to_string(),
            image_model: "story-image-v2".to_string(),
            temperature: 0.8,
            budget: RunBudget::default(),
            global_avoid: vec![
                "weapons".to_string(),
                "blood".to_string(),
                "text overlays".to_string(),
                "watermarks".to_string(),
                "frightening shadows".to_string(),
            ],
            global_negatives: vec![
                "extra fingers".to_string(),
                "distorted faces".to_string(),
                "photorealistic".to_string(),
            ],
            token_prices: (0.25, 1.25),
        }
    }
}

/// A fetched value with an explicit time-to-live and refresh policy.
///
/// # Examples
///
/// ```
/// use fabula_core::{ConfigCache, PipelineConfig};
/// use std::time::Duration;
///
/// let mut cache = ConfigCache::new(PipelineConfig::default(), Duration::from_secs(60));
/// let config = cache.get_or_refresh(|| PipelineConfig::default());
/// assert!(!config.text_model().is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct ConfigCache<T> {
    value: T,
    fetched_at: Instant,
    ttl: Duration,
}

impl<T> ConfigCache<T> {
    /// Wrap a freshly fetched value.
    pub fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            fetched_at: Instant::now(),
            ttl,
        }
    }

    /// Whether the cached value has outlived its TTL.
    pub fn is_stale(&self) -> bool {
        self.fetched_at.elapsed() >= self.ttl
    }

    /// The cached value, regardless of staleness.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// The cached value, refreshing it first when stale.
    pub fn get_or_refresh(&mut self, fetch: impl FnOnce() -> T) -> &T {
        if self.is_stale() {
            self.value = fetch();
            self.fetched_at = Instant::now();
        }
        &self.value
    }

    /// Unconditionally replace the cached value.
    pub fn refresh(&mut self, value: T) {
        self.value = value;
        self.fetched_at = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_cache_is_not_stale() {
        let cache = ConfigCache::new(1u32, Duration::from_secs(60));
        assert!(!cache.is_stale());
        assert_eq!(*cache.value(), 1);
    }

    #[test]
    fn test_zero_ttl_refreshes() {
        let mut cache = ConfigCache::new(1u32, Duration::ZERO);
        assert!(cache.is_stale());
        assert_eq!(*cache.get_or_refresh(|| 2), 2);
    }
}
