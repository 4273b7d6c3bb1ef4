use crate::Error;

use rand::Rng;
use txflow_envelope::{Risk, TransactionInitiated};

/// Assigns a risk classification to a transaction.
pub trait RiskPolicy
where
    Self: Send + Sync + 'static,
{
    /// Classifies the transaction described by `command`.
    fn classify(&self, command: &TransactionInitiated) -> Risk;
}

impl<F> RiskPolicy for F
where
    F: Fn(&TransactionInitiated) -> Risk + Send + Sync + 'static,
{
    fn classify(&self, command: &TransactionInitiated) -> Risk {
        self(command)
    }
}

/// Always returns the same classification.
#[derive(Clone, Copy, Debug)]
pub struct FixedRisk(pub Risk);

impl RiskPolicy for FixedRisk {
    fn classify(&self, _command: &TransactionInitiated) -> Risk {
        self.0
    }
}

/// Ignores the transaction and draws `HIGH` with a fixed probability.
#[derive(Clone, Copy, Debug)]
pub struct WeightedRandomRisk {
    high_probability: f64,
}

impl WeightedRandomRisk {
    /// Probability of `HIGH` used by [`WeightedRandomRisk::default`].
    pub const DEFAULT_HIGH_PROBABILITY: f64 = 0.2;

    /// Creates a policy that classifies `HIGH` with `high_probability`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidProbability`] unless `0.0 <= high_probability <= 1.0`.
    pub fn new(high_probability: f64) -> Result<Self, Error> {
        if !(0.0..=1.0).contains(&high_probability) {
            return Err(Error::InvalidProbability(high_probability));
        }

        Ok(Self { high_probability })
    }

    /// The configured probability of `HIGH`.
    #[must_use]
    pub const fn high_probability(&self) -> f64 {
        self.high_probability
    }
}

impl Default for WeightedRandomRisk {
    fn default() -> Self {
        Self {
            high_probability: Self::DEFAULT_HIGH_PROBABILITY,
        }
    }
}

impl RiskPolicy for WeightedRandomRisk {
    fn classify(&self, _command: &TransactionInitiated) -> Risk {
        if rand::thread_rng().gen_bool(self.high_probability) {
            Risk::High
        } else {
            Risk::Low
        }
    }
}
