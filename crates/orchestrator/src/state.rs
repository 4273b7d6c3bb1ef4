use std::fmt;

use thiserror::Error;
use txflow_envelope::Risk;

/// Progress of a single transaction saga.
///
/// Each state records what the saga has already published, so a saga can be
/// resumed from any state without re-emitting earlier events.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SagaState {
    /// The command was accepted; nothing has been published yet.
    Received,

    /// `txn.FundsReserved` was published.
    FundsReserved {
        /// The hold placed on the source account.
        hold_id: String,
    },

    /// `txn.FraudChecked` was published.
    FraudChecked {
        /// The hold placed on the source account.
        hold_id: String,

        /// The classification that was published.
        risk: Risk,
    },

    /// `txn.Committed` was published.
    Committed {
        /// The ledger entry that was published.
        ledger_tx_id: String,
    },

    /// `txn.Notified` was published. Terminal.
    Notified,

    /// `txn.Reversed` was published. Terminal.
    Reversed,
}

/// Attempted to move a saga along an edge that does not exist.
#[derive(Debug, Error)]
#[error("invalid saga transition from {from} to {to}")]
pub struct InvalidTransition {
    /// The state the saga was in.
    pub from: &'static str,

    /// The state that was requested.
    pub to: &'static str,
}

impl SagaState {
    /// Short name of the state.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Received => "Received",
            Self::FundsReserved { .. } => "FundsReserved",
            Self::FraudChecked { .. } => "FraudChecked",
            Self::Committed { .. } => "Committed",
            Self::Notified => "Notified",
            Self::Reversed => "Reversed",
        }
    }

    /// Whether the saga has finished.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Notified | Self::Reversed)
    }

    /// Whether `next` is a legal successor of this state.
    #[must_use]
    pub const fn can_advance_to(&self, next: &Self) -> bool {
        matches!(
            (self, next),
            (Self::Received, Self::FundsReserved { .. })
                | (Self::FundsReserved { .. }, Self::FraudChecked { .. })
                | (
                    Self::FraudChecked {
                        risk: Risk::Low,
                        ..
                    },
                    Self::Committed { .. }
                )
                | (
                    Self::FraudChecked {
                        risk: Risk::High,
                        ..
                    },
                    Self::Reversed
                )
                | (Self::Committed { .. }, Self::Notified)
        )
    }

    /// Moves the saga to `next`.
    ///
    /// # Errors
    /// Returns [`InvalidTransition`] and leaves the state untouched when
    /// `next` does not follow this state.
    pub fn advance(&mut self, next: Self) -> Result<(), InvalidTransition> {
        if !self.can_advance_to(&next) {
            return Err(InvalidTransition {
                from: self.name(),
                to: next.name(),
            });
        }

        *self = next;
        Ok(())
    }
}

impl fmt::Display for SagaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fraud_checked(risk: Risk) -> SagaState {
        SagaState::FraudChecked {
            hold_id: "h".to_string(),
            risk,
        }
    }

    #[test]
    fn test_low_risk_path() {
        let mut state = SagaState::Received;
        state
            .advance(SagaState::FundsReserved {
                hold_id: "h".to_string(),
            })
            .unwrap();
        state.advance(fraud_checked(Risk::Low)).unwrap();
        state
            .advance(SagaState::Committed {
                ledger_tx_id: "l".to_string(),
            })
            .unwrap();
        state.advance(SagaState::Notified).unwrap();

        assert!(state.is_terminal());
    }

    #[test]
    fn test_high_risk_cannot_commit() {
        let mut state = fraud_checked(Risk::High);
        let err = state
            .advance(SagaState::Committed {
                ledger_tx_id: "l".to_string(),
            })
            .unwrap_err();

        assert_eq!(err.from, "FraudChecked");
        assert_eq!(err.to, "Committed");
        assert_eq!(state, fraud_checked(Risk::High));

        state.advance(SagaState::Reversed).unwrap();
        assert!(state.is_terminal());
    }

    #[test]
    fn test_steps_cannot_be_skipped() {
        assert!(!SagaState::Received.can_advance_to(&fraud_checked(Risk::Low)));
        assert!(!fraud_checked(Risk::Low).can_advance_to(&SagaState::Notified));
        assert!(!SagaState::Reversed.can_advance_to(&SagaState::Received));
    }
}
