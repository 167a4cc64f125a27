//! Primary/secondary model alternation

use crate::config::ProviderSettings;

/// Per-persona call counter deciding which model serves the next request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModelRotation {
    counter: u32,
}

impl ModelRotation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Pick the model for the next call and advance the counter
    pub fn next_model(&mut self, provider: &ProviderSettings) -> String {
        if provider.model_id.is_empty() {
            return String::new();
        }
        if !provider.use_secondary_model || provider.secondary_model_id.is_empty() {
            return provider.model_id.clone();
        }

        self.counter += 1;
        if self.counter >= provider.model_switch_ratio {
            self.counter = 0;
            return provider.secondary_model_id.clone();
        }
        provider.model_id.clone()
    }

    /// Make the next call use the secondary model
    pub fn force_secondary(&mut self, provider: &ProviderSettings) {
        self.counter = provider.model_switch_ratio;
    }
}
