use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use mongodb::bson::oid::ObjectId;

use crate::errors::{AppError, Result};
use crate::models::booking::{BookingResponse, CreateBookingRequest, PaymentStatus};
use crate::models::user::Claims;
use crate::services::ledger::BookingDraft;
use crate::state::AppState;

/// Records a confirmed booking. Replaying the same idempotency key returns
/// the original record with a 200 instead of creating another one.
pub async fn create_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<BookingResponse>)> {
    let user_id = ObjectId::parse_str(&claims.sub)?;

    let (trip_id, payment_method, amount, idempotency_key) = match (
        payload.trip_id,
        payload.payment_method,
        payload.amount,
        payload.idempotency_key,
    ) {
        (Some(trip_id), Some(method), Some(amount), Some(key)) => (trip_id, method, amount, key),
        _ => return Err(AppError::invalid_data("Missing required fields")),
    };
    let trip_id = ObjectId::parse_str(&trip_id)?;

    let draft = BookingDraft {
        user_id,
        trip_id,
        payment_method,
        external_reference: payload.transaction_id,
        payment_status: payload.payment_status.unwrap_or(PaymentStatus::Completed),
        amount,
        currency: payload.currency.unwrap_or_else(|| "INR".to_string()),
        idempotency_key,
    };

    let outcome = state.ledger.create_booking(draft).await?;
    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((status, Json(BookingResponse::from(&outcome.booking))))
}

pub async fn get_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<BookingResponse>> {
    let booking_id = ObjectId::parse_str(&id)?;
    let booking = state
        .ledger
        .get_booking(booking_id)
        .await?
        .ok_or(AppError::BookingNotFound)?;

    // Confirmations stay private; other users cannot probe for them
    let user_id = ObjectId::parse_str(&claims.sub)?;
    if booking.user_id != user_id && !claims.is_admin() {
        return Err(AppError::BookingNotFound);
    }

    Ok(Json(BookingResponse::from(&booking)))
}

pub async fn list_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<BookingResponse>>> {
    let user_id = ObjectId::parse_str(&claims.sub)?;
    let bookings = state.ledger.list_for_user(user_id).await?;
    Ok(Json(bookings.iter().map(BookingResponse::from).collect()))
}
