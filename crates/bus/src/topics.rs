/// Consumer group of the saga orchestrator.
pub const ORCHESTRATOR_CONSUMER_GROUP: &str = "orchestrator-consumer-group";

/// Consumer group of the real-time gateway.
pub const GATEWAY_CONSUMER_GROUP: &str = "gateway-consumer-group";

/// Names of the topics the pipeline uses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Topics {
    /// Commands asking for a transaction to be processed.
    pub commands: String,

    /// Domain events emitted by the saga.
    pub events: String,

    /// Messages that could not be processed.
    pub dead_letter: String,
}

impl Default for Topics {
    fn default() -> Self {
        Self {
            commands: "txn.commands".to_string(),
            events: "txn.events".to_string(),
            dead_letter: "txn.dlq".to_string(),
        }
    }
}
