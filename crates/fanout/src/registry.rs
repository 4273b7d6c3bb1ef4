use crate::{
    ClientCommand, ClientSink, Error, ServerMessage, SubscriptionKind, SubscriptionRequest,
    SubscriptionTarget,
};

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use txflow_envelope::EventEnvelope;

/// What a single connection is listening to.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Subscription {
    /// Followed transactions.
    pub transaction_ids: HashSet<String>,

    /// Followed users.
    pub user_ids: HashSet<String>,
}

impl Subscription {
    /// Whether an event for `transaction_id` owned by `user_id` is wanted.
    #[must_use]
    pub fn matches(&self, transaction_id: &str, user_id: &str) -> bool {
        self.transaction_ids.contains(transaction_id) || self.user_ids.contains(user_id)
    }

    /// Number of followed ids across both dimensions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.transaction_ids.len() + self.user_ids.len()
    }

    /// Whether nothing is followed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ids_mut(&mut self, kind: SubscriptionKind) -> &mut HashSet<String> {
        match kind {
            SubscriptionKind::TransactionId => &mut self.transaction_ids,
            SubscriptionKind::UserId => &mut self.user_ids,
        }
    }
}

/// Snapshot of the registry size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    /// Registered connections.
    pub total_clients: usize,

    /// Followed ids summed over all connections.
    pub total_subscriptions: usize,
}

/// Result of routing one event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RouteReport {
    /// Connections the event was handed to.
    pub delivered: usize,

    /// Dead connections removed during the pass.
    pub pruned: usize,
}

#[derive(Debug)]
struct Entry {
    connection: Weak<dyn ClientSink>,
    subscription: Subscription,
}

/// Owns every connection's subscription and routes events to them.
///
/// Connections are held weakly; a connection that has been dropped or that
/// refuses a delivery is removed by the routing pass that notices it.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: DashMap<String, Entry>,
}

impl SubscriptionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection with an empty subscription.
    pub fn on_connect<C>(&self, connection_id: &str, connection: &Arc<C>)
    where
        C: ClientSink + 'static,
    {
        let connection: Weak<C> = Arc::downgrade(connection);
        let connection: Weak<dyn ClientSink> = connection;
        self.entries.insert(
            connection_id.to_string(),
            Entry {
                connection,
                subscription: Subscription::default(),
            },
        );

        info!("client connected: {connection_id}");
    }

    /// Drops a connection and its subscription. Returns whether it was
    /// registered.
    pub fn on_disconnect(&self, connection_id: &str) -> bool {
        let removed = self.entries.remove(connection_id).is_some();
        if removed {
            info!("client disconnected: {connection_id}");
        }
        removed
    }

    /// Adds the requested ids to a connection's subscription.
    ///
    /// # Errors
    /// Returns [`Error::UnknownConnection`] for unregistered connections and
    /// [`Error::NothingToSubscribe`] when the request names no id.
    pub fn subscribe(
        &self,
        connection_id: &str,
        request: &SubscriptionRequest,
    ) -> Result<Vec<SubscriptionTarget>, Error> {
        let mut entry = self
            .entries
            .get_mut(connection_id)
            .ok_or_else(|| Error::UnknownConnection(connection_id.to_string()))?;

        let targets = request.targets();
        if targets.is_empty() {
            return Err(Error::NothingToSubscribe);
        }

        for target in &targets {
            entry
                .subscription
                .ids_mut(target.kind)
                .insert(target.value.clone());
            info!(
                "client {connection_id} subscribed to {:?}: {}",
                target.kind, target.value
            );
        }

        Ok(targets)
    }

    /// Removes the requested ids from a connection's subscription. Ids that
    /// were not subscribed are ignored.
    ///
    /// # Errors
    /// Returns [`Error::UnknownConnection`] for unregistered connections.
    pub fn unsubscribe(
        &self,
        connection_id: &str,
        request: &SubscriptionRequest,
    ) -> Result<Vec<SubscriptionTarget>, Error> {
        let mut entry = self
            .entries
            .get_mut(connection_id)
            .ok_or_else(|| Error::UnknownConnection(connection_id.to_string()))?;

        let targets = request.targets();
        for target in &targets {
            entry.subscription.ids_mut(target.kind).remove(&target.value);
            info!(
                "client {connection_id} unsubscribed from {:?}: {}",
                target.kind, target.value
            );
        }

        Ok(targets)
    }

    /// A copy of a connection's subscription.
    #[must_use]
    pub fn subscription(&self, connection_id: &str) -> Option<Subscription> {
        self.entries
            .get(connection_id)
            .map(|entry| entry.subscription.clone())
    }

    /// Current registry size.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        self.entries
            .iter()
            .fold(RegistryStats::default(), |stats, entry| RegistryStats {
                total_clients: stats.total_clients + 1,
                total_subscriptions: stats.total_subscriptions + entry.subscription.len(),
            })
    }

    /// Executes a client command and returns the replies for that client.
    #[must_use]
    pub fn dispatch(&self, connection_id: &str, command: ClientCommand) -> Vec<ServerMessage> {
        let result = match command {
            ClientCommand::SubscribeToTx(request) => self
                .subscribe(connection_id, &request)
                .map(|targets| targets.into_iter().map(ServerMessage::subscribed).collect()),
            ClientCommand::UnsubscribeFromTx(request) => self
                .unsubscribe(connection_id, &request)
                .map(|targets| targets.into_iter().map(ServerMessage::unsubscribed).collect()),
            ClientCommand::GetStats => Ok(vec![ServerMessage::Stats(self.stats())]),
        };

        result.unwrap_or_else(|e| {
            warn!("rejected command from {connection_id}: {e}");
            vec![ServerMessage::error(&e)]
        })
    }

    /// Delivers an event to every live connection following its transaction
    /// or user.
    ///
    /// Matches are collected before anything is delivered, so no registry lock
    /// is held while a connection is being written to.
    pub fn route(&self, event: &EventEnvelope) -> RouteReport {
        let mut targets = Vec::new();
        let mut dead = Vec::new();

        for entry in &self.entries {
            match entry.connection.upgrade() {
                None => dead.push(entry.key().clone()),
                Some(connection)
                    if entry
                        .subscription
                        .matches(&event.transaction_id, &event.user_id) =>
                {
                    targets.push((entry.key().clone(), connection));
                }
                Some(_) => {}
            }
        }

        let mut report = RouteReport::default();
        let message = ServerMessage::TransactionEvent(event.clone());

        for (connection_id, connection) in targets {
            match connection.deliver(message.clone()) {
                Ok(()) => {
                    report.delivered += 1;
                    debug!(
                        "{} for {} sent to {connection_id}",
                        event.event_type, event.transaction_id
                    );
                }
                Err(e) => {
                    warn!("dropping client {connection_id}: {e}");
                    dead.push(connection_id);
                }
            }
        }

        for connection_id in dead {
            if self.entries.remove(&connection_id).is_some() {
                report.pruned += 1;
            }
        }

        report
    }
}
