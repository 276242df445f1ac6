//! Adaptive limit reduction for suspicious actors.

use crate::application::scorer::SuspicionScorer;
use crate::domain::actor::Actor;
use crate::domain::policy::Policy;

/// Effective limit for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveLimit {
    pub max_requests: u32,
    /// Whether the limit was reduced because the actor is suspicious
    pub reduced: bool,
}

/// Reduce `base` by `multiplier`, rounding down, never below one request.
pub fn scale_limit(base: u32, multiplier: f64) -> u32 {
    let scaled = (f64::from(base) * multiplier).floor();
    if scaled < 1.0 {
        1
    } else {
        scaled as u32
    }
}

/// Tightens adaptive policies for actors the scorer flags.
///
/// Non-adaptive policies never consult the event log.
#[derive(Debug, Clone)]
pub struct AdaptiveModulator {
    scorer: SuspicionScorer,
}

impl AdaptiveModulator {
    pub fn new(scorer: SuspicionScorer) -> Self {
        Self { scorer }
    }

    pub async fn effective_limit(&self, policy: &Policy, actor: &Actor) -> EffectiveLimit {
        let base = policy.max_for(actor);

        let multiplier = match policy.suspicious_multiplier() {
            Some(multiplier) => multiplier,
            None => {
                return EffectiveLimit {
                    max_requests: base,
                    reduced: false,
                }
            }
        };

        if self.scorer.assess(&actor.canonical_key()).await.is_suspicious {
            EffectiveLimit {
                max_requests: scale_limit(base, multiplier),
                reduced: true,
            }
        } else {
            EffectiveLimit {
                max_requests: base,
                reduced: false,
            }
        }
    }

    pub fn scorer(&self) -> &SuspicionScorer {
        &self.scorer
    }
}
