use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Extension,
};
use mongodb::bson::oid::ObjectId;

use crate::errors::{AppError, Result};
use crate::models::booking::BookingResponse;
use crate::models::checkout::{
    CheckoutSessionResponse, CompleteCheckoutRequest, SelectMethodRequest, SettlementContext,
    SettlementError, StartCheckoutRequest, SubmitCheckoutRequest,
};
use crate::models::user::Claims;
use crate::services::checkout::SubmitOutcome;
use crate::state::AppState;

/// Runs a whole checkout in one request: open a session against the trip's
/// current price, settle with the chosen method and record the booking.
/// Replaying the same idempotency key answers 200 with the stored record
/// without settling again.
pub async fn complete_checkout(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CompleteCheckoutRequest>,
) -> Result<Response> {
    let user_id = ObjectId::parse_str(&claims.sub)?;
    let trip_id = payload
        .trip_id
        .ok_or_else(|| AppError::invalid_data("tripId is required"))?;
    let trip_id = ObjectId::parse_str(&trip_id)?;
    let method = payload
        .method
        .ok_or_else(|| AppError::invalid_data("method is required"))?;
    let key = payload
        .idempotency_key
        .ok_or_else(|| AppError::invalid_data("idempotencyKey is required"))?;

    if let Some(existing) = state.ledger.find_by_idempotency_key(&key).await? {
        if existing.user_id != user_id
            || existing.trip_id != trip_id
            || existing.payment_method != method
        {
            return Err(AppError::IdempotencyConflict(format!(
                "Key {} was already used for a different booking",
                key.trim()
            )));
        }
        return Ok((StatusCode::OK, Json(BookingResponse::from(&existing))).into_response());
    }

    let session = state.checkout.start(user_id, trip_id, Some(key)).await?;
    state
        .checkout
        .select_method(user_id, &session.id, method)
        .await?;

    let ctx = SettlementContext { card: payload.card };
    let outcome = state.checkout.submit(user_id, &session.id, ctx).await;

    // A session that failed to record stays resident so the settlement is
    // not lost; everything else is single-use and discarded here.
    if outcome.is_ok() {
        let _ = state.checkout.abort(user_id, &session.id).await;
    }

    match outcome? {
        SubmitOutcome::Recorded(booking) => {
            Ok((StatusCode::CREATED, Json(BookingResponse::from(&booking))).into_response())
        }
        SubmitOutcome::Declined(error) => Err(decline_to_app_error(error)),
        SubmitOutcome::InFlight => Err(AppError::service("Checkout session is busy")),
    }
}

pub async fn start_checkout(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<StartCheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutSessionResponse>)> {
    let user_id = ObjectId::parse_str(&claims.sub)?;
    let trip_id = payload
        .trip_id
        .ok_or_else(|| AppError::invalid_data("tripId is required"))?;
    let trip_id = ObjectId::parse_str(&trip_id)?;

    let session = state
        .checkout
        .start(user_id, trip_id, payload.idempotency_key)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(CheckoutSessionResponse::from(&session)),
    ))
}

pub async fn get_checkout(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<CheckoutSessionResponse>> {
    let user_id = ObjectId::parse_str(&claims.sub)?;
    let session = state.checkout.get(user_id, &id).await?;
    Ok(Json(CheckoutSessionResponse::from(&session)))
}

pub async fn select_method(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(payload): Json<SelectMethodRequest>,
) -> Result<Json<CheckoutSessionResponse>> {
    let user_id = ObjectId::parse_str(&claims.sub)?;
    let method = payload
        .method
        .ok_or_else(|| AppError::invalid_data("method is required"))?;

    let session = state.checkout.select_method(user_id, &id, method).await?;
    Ok(Json(CheckoutSessionResponse::from(&session)))
}

/// Runs one settlement attempt. A success answers 201 with the booking,
/// a decline answers 400, 402 or 502 depending on where it failed, and a
/// submit that lands while another is still running answers 202 with the
/// unchanged session.
pub async fn submit_checkout(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(payload): Json<SubmitCheckoutRequest>,
) -> Result<Response> {
    let user_id = ObjectId::parse_str(&claims.sub)?;
    let ctx = SettlementContext { card: payload.card };

    match state.checkout.submit(user_id, &id, ctx).await? {
        SubmitOutcome::Recorded(booking) => {
            Ok((StatusCode::CREATED, Json(BookingResponse::from(&booking))).into_response())
        }
        SubmitOutcome::Declined(error) => Err(decline_to_app_error(error)),
        SubmitOutcome::InFlight => {
            let session = state.checkout.get(user_id, &id).await?;
            Ok((
                StatusCode::ACCEPTED,
                Json(CheckoutSessionResponse::from(&session)),
            )
                .into_response())
        }
    }
}

pub async fn abort_checkout(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let user_id = ObjectId::parse_str(&claims.sub)?;
    state.checkout.abort(user_id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Request problems are 400s, provider faults 502s, a missing receiving
// address is our misconfiguration, and everything else is a genuine
// decline and answers 402.
fn decline_to_app_error(error: SettlementError) -> AppError {
    if error.is_validation() {
        return AppError::invalid_data(error.to_string());
    }
    match error {
        SettlementError::MissingReceiver => AppError::configuration(error.to_string()),
        SettlementError::PriceUnavailable(_) => AppError::price_feed(error.to_string()),
        SettlementError::WalletUnavailable(_) | SettlementError::Network(_) => {
            AppError::wallet(error.to_string())
        }
        other => AppError::PaymentDeclined(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decline_mapping() {
        assert!(matches!(
            decline_to_app_error(SettlementError::MissingCardFields),
            AppError::ValidationError(_)
        ));
        assert!(matches!(
            decline_to_app_error(SettlementError::StaleQuote),
            AppError::ValidationError(_)
        ));
        assert!(matches!(
            decline_to_app_error(SettlementError::CardDeclined),
            AppError::PaymentDeclined(_)
        ));
        assert!(matches!(
            decline_to_app_error(SettlementError::InsufficientFunds),
            AppError::PaymentDeclined(_)
        ));
        assert!(matches!(
            decline_to_app_error(SettlementError::Network("timeout".to_string())),
            AppError::WalletError(_)
        ));
        assert!(matches!(
            decline_to_app_error(SettlementError::PriceUnavailable("feed down".to_string())),
            AppError::PriceFeedError(_)
        ));
        assert!(matches!(
            decline_to_app_error(SettlementError::MissingReceiver),
            AppError::ConfigurationError(_)
        ));
    }
}
