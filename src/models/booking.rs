use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use mongodb::bson::oid::ObjectId;
use mongodb::bson;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Card,
    Crypto,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::Crypto => "crypto",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub user_id: ObjectId,
    pub trip_id: ObjectId,
    pub payment_method: PaymentMethod,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_reference: Option<String>,

    pub payment_status: PaymentStatus,
    pub amount: f64,
    pub currency: String,
    pub status: BookingStatus,
    pub idempotency_key: String,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

// For creating bookings. Required fields stay optional here so missing
// ones surface as a 400 instead of a body-rejection error.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub trip_id: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    pub transaction_id: Option<String>,
    pub payment_status: Option<PaymentStatus>,
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingResponse {
    pub id: String,
    pub user_id: String,
    pub trip_id: String,
    pub payment_method: PaymentMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_reference: Option<String>,
    pub payment_status: PaymentStatus,
    pub amount: f64,
    pub currency: String,
    pub status: BookingStatus,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Booking> for BookingResponse {
    fn from(booking: &Booking) -> Self {
        BookingResponse {
            id: booking
                ._id
                .map(|id| id.to_hex())
                .unwrap_or_default(),
            user_id: booking.user_id.to_hex(),
            trip_id: booking.trip_id.to_hex(),
            payment_method: booking.payment_method,
            external_reference: booking.external_reference.clone(),
            payment_status: booking.payment_status,
            amount: booking.amount,
            currency: booking.currency.clone(),
            status: booking.status,
            idempotency_key: booking.idempotency_key.clone(),
            created_at: booking.created_at,
        }
    }
}
