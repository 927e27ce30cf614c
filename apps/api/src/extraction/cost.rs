//! Cost model — fixed per-1K-token pricing for each model tier.

use crate::extraction::models::{ModelKind, TokenUsage};

/// Price in dollars per 1,000 tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rates {
    pub prompt_per_1k: f64,
    pub completion_per_1k: f64,
}

impl ModelKind {
    pub fn rates(self) -> Rates {
        match self {
            ModelKind::Fast => Rates {
                prompt_per_1k: 0.0015,
                completion_per_1k: 0.002,
            },
            ModelKind::Advanced => Rates {
                prompt_per_1k: 0.03,
                completion_per_1k: 0.06,
            },
        }
    }
}

/// Dollar cost of one completion call.
pub fn cost(model: ModelKind, usage: &TokenUsage) -> f64 {
    let rates = model.rates();
    f64::from(usage.prompt_tokens) / 1000.0 * rates.prompt_per_1k
        + f64::from(usage.completion_tokens) / 1000.0 * rates.completion_per_1k
}
