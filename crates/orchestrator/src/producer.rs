use rust_decimal::Decimal;
use tracing::info;
use txflow_bus::Bus;
use txflow_envelope::{EventEnvelope, Payload, TransactionInitiated, new_id};

/// A request to move funds, as accepted from an outside caller.
#[derive(Clone, Debug)]
pub struct TransactionRequest {
    /// Source account.
    pub from_account: String,

    /// Destination account.
    pub to_account: String,

    /// Amount to move.
    pub amount: Decimal,

    /// Currency code, `USD` when not given.
    pub currency: Option<String>,

    /// Owner of the transaction.
    pub user_id: String,
}

/// Publishes a `txn.TransactionInitiated` command for `request` under a fresh
/// transaction id and returns the published envelope.
///
/// # Errors
/// Returns the bus error if the command cannot be published.
pub async fn initiate_transaction<B>(
    bus: &B,
    topic: &str,
    request: TransactionRequest,
) -> Result<EventEnvelope, B::Error>
where
    B: Bus,
{
    let transaction_id = new_id();
    let user_id = request.user_id.clone();

    let command = Payload::TransactionInitiated(TransactionInitiated {
        from_account: request.from_account,
        to_account: request.to_account,
        amount: request.amount,
        currency: request.currency.unwrap_or_else(|| "USD".to_string()),
        user_id: request.user_id,
    });

    let envelope = EventEnvelope::new(&transaction_id, user_id, &command)?;
    bus.publish(topic, &transaction_id, &envelope).await?;

    info!("initiated transaction {transaction_id}");

    Ok(envelope)
}
