use std::time::Duration;

use rand::Rng;
use rand::seq::SliceRandom;
use rust_decimal::Decimal;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use txflow_bus::Bus;
use txflow_orchestrator::{TransactionRequest, initiate_transaction};

const ACCOUNTS: [&str; 4] = ["ACC-1001", "ACC-1002", "ACC-2001", "ACC-3001"];
const USERS: [&str; 3] = ["alice", "bob", "carol"];

/// Publishes a synthetic transaction command every `every` until cancelled.
pub async fn run<B>(bus: B, command_topic: String, every: Duration, shutdown_token: CancellationToken)
where
    B: Bus,
{
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("simulating a transaction every {every:?}");

    loop {
        tokio::select! {
            biased;
            () = shutdown_token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if let Err(e) = initiate_transaction(&bus, &command_topic, random_request()).await {
            warn!("simulated transaction was not published: {e}");
        }
    }
}

fn random_request() -> TransactionRequest {
    let mut rng = rand::thread_rng();

    let mut accounts = ACCOUNTS;
    accounts.shuffle(&mut rng);
    let user_id = USERS[rng.gen_range(0..USERS.len())];

    TransactionRequest {
        from_account: accounts[0].to_string(),
        to_account: accounts[1].to_string(),
        amount: Decimal::new(rng.gen_range(100..500_000), 2),
        currency: None,
        user_id: user_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_request_moves_between_distinct_accounts() {
        for _ in 0..100 {
            let request = random_request();
            assert_ne!(request.from_account, request.to_account);
            assert!(request.amount > Decimal::ZERO);
            assert!(USERS.contains(&request.user_id.as_str()));
        }
    }
}
