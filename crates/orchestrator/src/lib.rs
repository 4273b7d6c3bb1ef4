//! Saga orchestration for transaction commands.
//!
//! The orchestrator consumes `txn.TransactionInitiated` commands and drives
//! each through fund hold, risk check, commit or reverse, and notification,
//! publishing one domain event per step. Commands that cannot be processed are
//! dead-lettered with their raw bytes.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod journal;
mod producer;
mod risk;
mod state;

pub use error::Error;
pub use journal::{DEFAULT_JOURNAL_RETENTION, SagaJournal};
pub use producer::{TransactionRequest, initiate_transaction};
pub use risk::{FixedRisk, RiskPolicy, WeightedRandomRisk};
pub use state::{InvalidTransition, SagaState};

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{Instrument, debug, error, info, info_span, warn};
use txflow_bus::{
    Bus, BusMessage, MessageHandler, ORCHESTRATOR_CONSUMER_GROUP, Topics,
};
use txflow_envelope::{
    Committed, DeadLetterRecord, EventEnvelope, EventType, FraudChecked, FundsReserved, Notified,
    Payload, Reversed, Risk, TransactionInitiated, new_id,
};

/// Reason published with `txn.Reversed` for high risk transactions.
pub const HIGH_RISK_REASON: &str = "High fraud risk detected";

/// Options for the orchestrator.
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Topic commands are consumed from.
    pub command_topic: String,

    /// Topic domain events are published to.
    pub event_topic: String,

    /// Topic failed commands are published to.
    pub dead_letter_topic: String,

    /// Consumer group used on the command topic.
    pub consumer_group: String,

    /// Channels reported in `txn.Notified`.
    pub notification_channels: Vec<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from_topics(&Topics::default())
    }
}

impl OrchestratorConfig {
    /// Default options on the given topics.
    #[must_use]
    pub fn from_topics(topics: &Topics) -> Self {
        Self {
            command_topic: topics.commands.clone(),
            event_topic: topics.events.clone(),
            dead_letter_topic: topics.dead_letter.clone(),
            consumer_group: ORCHESTRATOR_CONSUMER_GROUP.to_string(),
            notification_channels: vec!["email".to_string(), "sms".to_string()],
        }
    }
}

/// What happened to a single command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SagaOutcome {
    /// The saga ran to the given terminal state.
    Completed(SagaState),

    /// The message was not a transaction command and was dropped.
    Discarded,

    /// The saga had already finished in the given state; nothing was published.
    Skipped(SagaState),

    /// The command was published to the dead-letter topic.
    DeadLettered,

    /// The command failed and could not be dead-lettered either.
    DeadLetterFailed,
}

/// Drives transaction sagas.
#[derive(Debug)]
pub struct Orchestrator<B, R = WeightedRandomRisk>
where
    B: Bus,
    R: RiskPolicy,
{
    bus: B,
    config: Arc<OrchestratorConfig>,
    journal: Option<SagaJournal>,
    risk_policy: Arc<R>,
}

impl<B, R> Clone for Orchestrator<B, R>
where
    B: Bus,
    R: RiskPolicy,
{
    fn clone(&self) -> Self {
        Self {
            bus: self.bus.clone(),
            config: self.config.clone(),
            journal: self.journal.clone(),
            risk_policy: self.risk_policy.clone(),
        }
    }
}

impl<B, R> Orchestrator<B, R>
where
    B: Bus,
    R: RiskPolicy,
{
    /// Creates an orchestrator with an empty saga journal.
    pub fn new(bus: B, risk_policy: R, config: OrchestratorConfig) -> Self {
        Self {
            bus,
            config: Arc::new(config),
            journal: Some(SagaJournal::default()),
            risk_policy: Arc::new(risk_policy),
        }
    }

    /// Uses `journal` to track saga progress.
    #[must_use]
    pub fn with_journal(mut self, journal: SagaJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Disables redelivery tracking; every delivery runs a fresh saga.
    #[must_use]
    pub fn without_journal(mut self) -> Self {
        self.journal = None;
        self
    }

    /// The saga journal, if enabled.
    #[must_use]
    pub const fn journal(&self) -> Option<&SagaJournal> {
        self.journal.as_ref()
    }

    /// Subscribes to the command topic.
    ///
    /// # Errors
    /// Returns the bus error if the subscription cannot be created.
    pub async fn start(&self) -> Result<B::Subscription, B::Error> {
        let subscription = self
            .bus
            .subscribe(
                &self.config.command_topic,
                &self.config.consumer_group,
                self.clone(),
            )
            .await?;

        info!(
            "orchestrator consuming {} as {}",
            self.config.command_topic, self.config.consumer_group
        );

        Ok(subscription)
    }

    /// Processes one command message end to end.
    pub async fn handle_command(&self, message: &BusMessage) -> SagaOutcome {
        let envelope = match message.envelope() {
            Ok(envelope) => envelope,
            Err(e) => {
                let transaction_id = transaction_id_hint(&message.payload);
                return self
                    .dead_letter(message, transaction_id.as_deref(), &Error::from(e))
                    .await;
            }
        };

        if envelope.event_type != EventType::TransactionInitiated {
            warn!(
                "discarding {} for {}: not a transaction command",
                envelope.event_type, envelope.transaction_id
            );
            return SagaOutcome::Discarded;
        }

        let command = match envelope.payload_as::<TransactionInitiated>() {
            Ok(command) => command,
            Err(e) => {
                return self
                    .dead_letter(message, Some(&envelope.transaction_id), &Error::from(e))
                    .await;
            }
        };

        let span = info_span!("saga", transaction_id = %envelope.transaction_id);
        match self.run_saga(&envelope, &command).instrument(span).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.dead_letter(message, Some(&envelope.transaction_id), &e)
                    .await
            }
        }
    }

    async fn run_saga(
        &self,
        envelope: &EventEnvelope,
        command: &TransactionInitiated,
    ) -> Result<SagaOutcome, Error> {
        let transaction_id = envelope.transaction_id.as_str();
        let mut state = self
            .journal
            .as_ref()
            .and_then(|journal| journal.get(transaction_id))
            .unwrap_or(SagaState::Received);

        if state.is_terminal() {
            warn!("saga already finished as {state}, skipping redelivered command");
            return Ok(SagaOutcome::Skipped(state));
        }

        if state != SagaState::Received {
            info!("resuming saga after {state}");
        }

        while !state.is_terminal() {
            let next = self.step(envelope, command, &state).await?;
            state.advance(next)?;

            if let Some(journal) = &self.journal {
                journal.record(transaction_id, state.clone());
            }
        }

        info!(
            "saga for {} {} finished as {state}",
            command.amount, command.currency
        );

        Ok(SagaOutcome::Completed(state))
    }

    /// Publishes the event that follows `state` and returns the new state.
    async fn step(
        &self,
        envelope: &EventEnvelope,
        command: &TransactionInitiated,
        state: &SagaState,
    ) -> Result<SagaState, Error> {
        match state {
            SagaState::Received => {
                let hold_id = new_id();
                self.emit(
                    envelope,
                    Payload::FundsReserved(FundsReserved {
                        ok: true,
                        hold_id: hold_id.clone(),
                        amount: command.amount,
                    }),
                )
                .await?;
                Ok(SagaState::FundsReserved { hold_id })
            }
            SagaState::FundsReserved { hold_id } => {
                let risk = self.risk_policy.classify(command);
                self.emit(envelope, Payload::FraudChecked(FraudChecked { risk }))
                    .await?;
                Ok(SagaState::FraudChecked {
                    hold_id: hold_id.clone(),
                    risk,
                })
            }
            SagaState::FraudChecked {
                risk: Risk::Low, ..
            } => {
                let ledger_tx_id = new_id();
                self.emit(
                    envelope,
                    Payload::Committed(Committed {
                        ledger_tx_id: ledger_tx_id.clone(),
                    }),
                )
                .await?;
                Ok(SagaState::Committed { ledger_tx_id })
            }
            SagaState::FraudChecked {
                risk: Risk::High, ..
            } => {
                self.emit(
                    envelope,
                    Payload::Reversed(Reversed {
                        reason: HIGH_RISK_REASON.to_string(),
                    }),
                )
                .await?;
                Ok(SagaState::Reversed)
            }
            SagaState::Committed { .. } => {
                self.emit(
                    envelope,
                    Payload::Notified(Notified {
                        channels: self.config.notification_channels.clone(),
                    }),
                )
                .await?;
                Ok(SagaState::Notified)
            }
            SagaState::Notified | SagaState::Reversed => Ok(state.clone()),
        }
    }

    async fn emit(&self, command: &EventEnvelope, payload: Payload) -> Result<(), Error> {
        let event_type = payload.event_type();
        let publish_error = |source: Box<dyn std::error::Error + Send + Sync>| Error::Publish {
            event_type: event_type.clone(),
            source,
        };

        let event = EventEnvelope::new(&command.transaction_id, &command.user_id, &payload)
            .map_err(|e| publish_error(Box::new(e)))?
            .with_correlation_id(&command.transaction_id);

        self.bus
            .publish(&self.config.event_topic, &command.transaction_id, &event)
            .await
            .map_err(|e| publish_error(Box::new(e)))?;

        debug!("emitted {event_type}");

        Ok(())
    }

    async fn dead_letter(
        &self,
        message: &BusMessage,
        transaction_id: Option<&str>,
        cause: &Error,
    ) -> SagaOutcome {
        let key = transaction_id
            .filter(|id| !id.is_empty())
            .or(message.key.as_deref())
            .unwrap_or("unknown");

        error!("dead-lettering command {key}: {cause}");

        let record = DeadLetterRecord::new(&message.topic, &message.payload, cause);
        let payload = match record.encode() {
            Ok(payload) => payload,
            Err(e) => {
                error!("CRITICAL: could not encode dead-letter record for {key}: {e}");
                return SagaOutcome::DeadLetterFailed;
            }
        };

        match self
            .bus
            .publish_bytes(&self.config.dead_letter_topic, Some(key), payload)
            .await
        {
            Ok(()) => SagaOutcome::DeadLettered,
            Err(e) => {
                error!(
                    "CRITICAL: failed to publish {key} to {}: {e}",
                    self.config.dead_letter_topic
                );
                SagaOutcome::DeadLetterFailed
            }
        }
    }
}

/// Best effort extraction of the transaction id from an undecodable command.
fn transaction_id_hint(payload: &[u8]) -> Option<String> {
    serde_json::from_slice::<Value>(payload)
        .ok()?
        .get("transactionId")?
        .as_str()
        .map(ToString::to_string)
}

#[async_trait]
impl<B, R> MessageHandler for Orchestrator<B, R>
where
    B: Bus,
    R: RiskPolicy,
{
    type Error = Error;

    async fn handle(&self, message: BusMessage) -> Result<(), Self::Error> {
        let outcome = self.handle_command(&message).await;
        debug!(
            "command {}[{}]@{} finished: {outcome:?}",
            message.topic, message.partition, message.offset
        );
        Ok(())
    }
}
