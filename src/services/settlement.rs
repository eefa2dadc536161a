// services/settlement.rs
use async_trait::async_trait;
use chrono::Duration;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tracing::info;
use uuid::Uuid;

use crate::models::checkout::{
    CheckoutSession, SettlementContext, SettlementError, SettlementResult,
};
use crate::services::price_feed::PriceFeed;
use crate::services::wallet::{self, WalletConnector, WalletFault};

/// Card number that always declines in the simulated processor.
pub const DECLINE_TEST_NUMBER: &str = "4000000000000002";

/// A payment method drives one settlement attempt to a result. `settle`
/// never returns `Err`; every failure comes back inside the result so the
/// state machine sees it.
#[async_trait]
pub trait PaymentStrategy: Send + Sync {
    async fn settle(&self, session: &CheckoutSession, ctx: &SettlementContext) -> SettlementResult;
}

impl From<WalletFault> for SettlementError {
    fn from(fault: WalletFault) -> Self {
        match fault {
            WalletFault::Unavailable(m) => SettlementError::WalletUnavailable(m),
            WalletFault::UserRejected => SettlementError::UserRejected,
            WalletFault::InsufficientFunds => SettlementError::InsufficientFunds,
            WalletFault::Rejected(m) => SettlementError::TransactionRejected(m),
            WalletFault::Network(m) => SettlementError::Network(m),
        }
    }
}

/// Simulated card authorization. No processor is called: card fields are
/// checked for presence, a fixed processing interval elapses, and anything
/// except the designated decline number is approved with a synthetic
/// reference. Not a production payment path.
pub struct CardSimulation {
    processing_delay: StdDuration,
}

impl CardSimulation {
    pub fn new(processing_delay: StdDuration) -> Self {
        CardSimulation { processing_delay }
    }
}

#[async_trait]
impl PaymentStrategy for CardSimulation {
    async fn settle(&self, session: &CheckoutSession, ctx: &SettlementContext) -> SettlementResult {
        if session.price_snapshot <= 0.0 {
            return SettlementResult::failed(SettlementError::InvalidAmount);
        }

        let card = match ctx.card.as_ref() {
            Some(card) => card,
            None => return SettlementResult::failed(SettlementError::MissingCardFields),
        };

        let number: String = card.number.chars().filter(|c| !c.is_whitespace()).collect();
        if number.is_empty() || card.expiry.trim().is_empty() || card.cvv.trim().is_empty() {
            return SettlementResult::failed(SettlementError::MissingCardFields);
        }

        tokio::time::sleep(self.processing_delay).await;

        if number == DECLINE_TEST_NUMBER {
            return SettlementResult::failed(SettlementError::CardDeclined);
        }

        let reference = format!("card-sim-{}", Uuid::new_v4());
        info!("Card settlement approved for session {}: {}", session.id, reference);
        SettlementResult::settled(reference)
    }
}

/// On-chain transfer: converts the fiat snapshot to wei via the price
/// feed, pre-checks the payer balance, and submits a transfer to the
/// configured receiving address. Block-confirmation depth beyond what the
/// wallet reports is not tracked.
pub struct OnChainTransfer {
    wallet: Arc<dyn WalletConnector>,
    price_feed: Arc<dyn PriceFeed>,
    receiving_address: Option<String>,
    max_quote_age: Duration,
}

impl OnChainTransfer {
    pub fn new(
        wallet: Arc<dyn WalletConnector>,
        price_feed: Arc<dyn PriceFeed>,
        receiving_address: Option<String>,
        max_quote_age: Duration,
    ) -> Self {
        OnChainTransfer {
            wallet,
            price_feed,
            receiving_address,
            max_quote_age,
        }
    }
}

#[async_trait]
impl PaymentStrategy for OnChainTransfer {
    async fn settle(&self, session: &CheckoutSession, _ctx: &SettlementContext) -> SettlementResult {
        if session.price_snapshot <= 0.0 {
            return SettlementResult::failed(SettlementError::InvalidAmount);
        }

        let to = match self.receiving_address.as_deref() {
            Some(address) => address,
            None => return SettlementResult::failed(SettlementError::MissingReceiver),
        };
        if !wallet::is_valid_address(to) {
            return SettlementResult::failed(SettlementError::InvalidAddress(to.to_string()));
        }

        let quote = match self.price_feed.latest().await {
            Ok(quote) => quote,
            Err(e) => return SettlementResult::failed(SettlementError::PriceUnavailable(e.to_string())),
        };
        if quote.is_stale(self.max_quote_age) {
            return SettlementResult::failed(SettlementError::StaleQuote);
        }
        if quote.usd_per_eth <= 0.0 {
            return SettlementResult::failed(SettlementError::PriceUnavailable(
                "non-positive conversion rate".to_string(),
            ));
        }

        let amount_wei = wallet::eth_to_wei(session.price_snapshot / quote.usd_per_eth);
        if amount_wei == 0 {
            return SettlementResult::failed(SettlementError::InvalidAmount);
        }

        let account = match self.wallet.connect().await {
            Ok(account) => account,
            Err(fault) => return SettlementResult::failed(fault.into()),
        };

        // Underfunded attempts fail here, before any transaction is submitted.
        match self.wallet.get_balance(&account.address).await {
            Ok(balance) if balance < amount_wei => {
                info!(
                    "Insufficient balance for session {}: have {} ETH, need {} ETH",
                    session.id,
                    wallet::wei_to_eth(balance),
                    wallet::wei_to_eth(amount_wei)
                );
                return SettlementResult::failed(SettlementError::InsufficientFunds);
            }
            Ok(_) => {}
            Err(fault) => return SettlementResult::failed(fault.into()),
        }

        match self.wallet.send(to, amount_wei).await {
            Ok(hash) => {
                info!("On-chain settlement for session {}: {}", session.id, hash);
                SettlementResult::settled(hash)
            }
            Err(fault) => SettlementResult::failed(fault.into()),
        }
    }
}
