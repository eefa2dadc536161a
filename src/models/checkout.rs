use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::booking::PaymentMethod;

/// Reasons a settlement attempt did not produce a successful result.
/// These travel inside `SettlementResult` as data, not as `Err` values,
/// so every strategy outcome reaches the state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettlementError {
    #[error("Amount must be greater than zero")]
    InvalidAmount,

    #[error("Card details are missing or incomplete")]
    MissingCardFields,

    #[error("Card was declined")]
    CardDeclined,

    #[error("Invalid receiving address: {0}")]
    InvalidAddress(String),

    #[error("No receiving address is configured")]
    MissingReceiver,

    #[error("Price quote unavailable: {0}")]
    PriceUnavailable(String),

    #[error("Price quote is stale")]
    StaleQuote,

    #[error("Wallet unavailable: {0}")]
    WalletUnavailable(String),

    #[error("User rejected the request")]
    UserRejected,

    #[error("Insufficient funds")]
    InsufficientFunds,

    #[error("Transaction rejected: {0}")]
    TransactionRejected(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl SettlementError {
    /// Input problems caught before any external call. Everything else is
    /// an external-service failure that warrants a retry affordance.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SettlementError::InvalidAmount
                | SettlementError::MissingCardFields
                | SettlementError::InvalidAddress(_)
                | SettlementError::StaleQuote
        )
    }
}

/// Outcome of one settlement attempt. Immutable once returned.
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementResult {
    pub success: bool,
    pub external_reference: Option<String>,
    pub error: Option<SettlementError>,
}

impl SettlementResult {
    pub fn settled(reference: impl Into<String>) -> Self {
        SettlementResult {
            success: true,
            external_reference: Some(reference.into()),
            error: None,
        }
    }

    pub fn failed(error: SettlementError) -> Self {
        SettlementResult {
            success: false,
            external_reference: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutState {
    Idle,
    MethodSelected,
    Settling,
    Settled,
    Failed,
    BookingRecorded,
}

impl CheckoutState {
    pub fn can_transition_to(self, next: CheckoutState) -> bool {
        use CheckoutState::*;
        matches!(
            (self, next),
            (Idle, MethodSelected)
                | (MethodSelected, MethodSelected)
                | (MethodSelected, Settling)
                | (Settling, Settled)
                | (Settling, Failed)
                | (Settled, BookingRecorded)
                | (Failed, Settling)
                | (Failed, MethodSelected)
        )
    }
}

/// One checkout attempt. The idempotency key is minted once here and
/// survives retries, so a retried attempt can never double-book.
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub id: String,
    pub user_id: ObjectId,
    pub trip_id: ObjectId,
    pub price_snapshot: f64,
    pub currency: String,
    pub selected_method: Option<PaymentMethod>,
    pub idempotency_key: String,
    pub state: CheckoutState,
    pub last_error: Option<SettlementError>,
    /// Reference from a successful settlement, held until the booking
    /// write completes.
    pub settled_reference: Option<String>,
    pub booking_id: Option<ObjectId>,
    pub created_at: DateTime<Utc>,
}

impl CheckoutSession {
    pub fn new(user_id: ObjectId, trip_id: ObjectId, price_snapshot: f64, currency: String) -> Self {
        CheckoutSession {
            id: Uuid::new_v4().to_string(),
            user_id,
            trip_id,
            price_snapshot,
            currency,
            selected_method: None,
            idempotency_key: Uuid::new_v4().to_string(),
            state: CheckoutState::Idle,
            last_error: None,
            settled_reference: None,
            booking_id: None,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CardDetails {
    pub number: String,
    pub name: Option<String>,
    pub expiry: String,
    pub cvv: String,
}

/// Per-request inputs handed to a strategy alongside the session.
#[derive(Debug, Clone, Default)]
pub struct SettlementContext {
    pub card: Option<CardDetails>,
}

// Checkout API payloads
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartCheckoutRequest {
    pub trip_id: Option<String>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SelectMethodRequest {
    pub method: Option<PaymentMethod>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitCheckoutRequest {
    pub card: Option<CardDetails>,
}

// Single-call checkout: open, settle and record in one request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteCheckoutRequest {
    pub trip_id: Option<String>,
    pub method: Option<PaymentMethod>,
    pub idempotency_key: Option<String>,
    pub card: Option<CardDetails>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSessionResponse {
    pub id: String,
    pub trip_id: String,
    pub price_snapshot: f64,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_method: Option<PaymentMethod>,
    pub idempotency_key: String,
    pub state: CheckoutState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<String>,
}

impl From<&CheckoutSession> for CheckoutSessionResponse {
    fn from(session: &CheckoutSession) -> Self {
        CheckoutSessionResponse {
            id: session.id.clone(),
            trip_id: session.trip_id.to_hex(),
            price_snapshot: session.price_snapshot,
            currency: session.currency.clone(),
            selected_method: session.selected_method,
            idempotency_key: session.idempotency_key.clone(),
            state: session.state,
            last_error: session.last_error.as_ref().map(|e| e.to_string()),
            booking_id: session.booking_id.map(|id| id.to_hex()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table() {
        use CheckoutState::*;

        assert!(Idle.can_transition_to(MethodSelected));
        assert!(MethodSelected.can_transition_to(Settling));
        assert!(Settling.can_transition_to(Settled));
        assert!(Settling.can_transition_to(Failed));
        assert!(Settled.can_transition_to(BookingRecorded));
        assert!(Failed.can_transition_to(Settling));
        assert!(Failed.can_transition_to(MethodSelected));

        // No shortcuts into or out of terminal states
        assert!(!Idle.can_transition_to(Settling));
        assert!(!MethodSelected.can_transition_to(Settled));
        assert!(!BookingRecorded.can_transition_to(Settling));
        assert!(!Settled.can_transition_to(Failed));
    }

    #[test]
    fn test_settlement_result_constructors() {
        let ok = SettlementResult::settled("0xabc");
        assert!(ok.success);
        assert_eq!(ok.external_reference.as_deref(), Some("0xabc"));
        assert!(ok.error.is_none());

        let failed = SettlementResult::failed(SettlementError::InsufficientFunds);
        assert!(!failed.success);
        assert!(failed.external_reference.is_none());
        assert_eq!(failed.error, Some(SettlementError::InsufficientFunds));
    }
}
