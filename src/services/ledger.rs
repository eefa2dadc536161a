// services/ledger.rs
use async_trait::async_trait;
use chrono::Utc;
use futures_util::TryStreamExt;
use mongodb::bson::doc;
use mongodb::bson::oid::ObjectId;
use mongodb::{Collection, Database};
use std::sync::Arc;
use tracing::{info, warn};

use crate::database::repository::is_duplicate_key;
use crate::errors::{AppError, Result};
use crate::models::booking::{Booking, BookingStatus, PaymentMethod, PaymentStatus};

pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;

#[derive(Debug)]
pub enum InsertOutcome {
    Inserted(ObjectId),
    DuplicateKey,
}

/// Persistence seam for booking records. The production store backs onto
/// the `bookings` collection and relies on its unique idempotency-key
/// index to report duplicates.
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn insert(&self, booking: &Booking) -> Result<InsertOutcome>;
    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Booking>>;
    async fn find_by_id(&self, id: ObjectId) -> Result<Option<Booking>>;
    async fn find_for_user(&self, user_id: ObjectId) -> Result<Vec<Booking>>;
}

pub struct MongoBookingStore {
    collection: Collection<Booking>,
}

impl MongoBookingStore {
    pub fn new(db: &Database) -> Self {
        MongoBookingStore {
            collection: db.collection::<Booking>("bookings"),
        }
    }
}

#[async_trait]
impl BookingStore for MongoBookingStore {
    async fn insert(&self, booking: &Booking) -> Result<InsertOutcome> {
        match self.collection.insert_one(booking).await {
            Ok(result) => {
                let id = result
                    .inserted_id
                    .as_object_id()
                    .ok_or_else(|| AppError::service("Inserted booking has a non-ObjectId _id"))?;
                Ok(InsertOutcome::Inserted(id))
            }
            Err(err) if is_duplicate_key(&err) => Ok(InsertOutcome::DuplicateKey),
            Err(err) => Err(err.into()),
        }
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Booking>> {
        Ok(self
            .collection
            .find_one(doc! { "idempotency_key": key })
            .await?)
    }

    async fn find_by_id(&self, id: ObjectId) -> Result<Option<Booking>> {
        Ok(self.collection.find_one(doc! { "_id": id }).await?)
    }

    async fn find_for_user(&self, user_id: ObjectId) -> Result<Vec<Booking>> {
        let cursor = self
            .collection
            .find(doc! { "user_id": user_id })
            .sort(doc! { "created_at": -1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }
}

/// Everything the ledger needs to record one settled checkout attempt.
#[derive(Debug, Clone)]
pub struct BookingDraft {
    pub user_id: ObjectId,
    pub trip_id: ObjectId,
    pub payment_method: PaymentMethod,
    pub external_reference: Option<String>,
    pub payment_status: PaymentStatus,
    pub amount: f64,
    pub currency: String,
    pub idempotency_key: String,
}

#[derive(Debug)]
pub struct CreateOutcome {
    pub booking: Booking,
    pub created: bool,
}

#[derive(Clone)]
pub struct BookingLedger {
    store: Arc<dyn BookingStore>,
}

impl BookingLedger {
    pub fn new(store: Arc<dyn BookingStore>) -> Self {
        BookingLedger { store }
    }

    /// Idempotent create. First writer wins under concurrent duplicates;
    /// a repeat with matching fields returns the existing record, and a
    /// repeat with different fields is a conflict, never a second record.
    pub async fn create_booking(&self, draft: BookingDraft) -> Result<CreateOutcome> {
        let key = draft.idempotency_key.trim().to_string();
        if key.is_empty() {
            return Err(AppError::invalid_data("idempotencyKey is required"));
        }
        if key.len() > MAX_IDEMPOTENCY_KEY_LEN {
            return Err(AppError::invalid_data(format!(
                "idempotencyKey must be at most {} characters",
                MAX_IDEMPOTENCY_KEY_LEN
            )));
        }
        if !draft.amount.is_finite() || draft.amount <= 0.0 {
            return Err(AppError::invalid_data("amount must be greater than zero"));
        }

        let mut booking = Booking {
            _id: None,
            user_id: draft.user_id,
            trip_id: draft.trip_id,
            payment_method: draft.payment_method,
            external_reference: draft.external_reference,
            payment_status: draft.payment_status,
            amount: draft.amount,
            currency: draft.currency,
            status: BookingStatus::Confirmed,
            idempotency_key: key.clone(),
            created_at: Utc::now(),
        };

        match self.store.insert(&booking).await? {
            InsertOutcome::Inserted(id) => {
                booking._id = Some(id);
                info!("Booking recorded: {} (key {})", id.to_hex(), key);
                Ok(CreateOutcome {
                    booking,
                    created: true,
                })
            }
            InsertOutcome::DuplicateKey => {
                let existing = self
                    .store
                    .find_by_idempotency_key(&key)
                    .await?
                    .ok_or_else(|| {
                        AppError::service("Duplicate key reported but no booking found")
                    })?;

                if existing.trip_id != booking.trip_id
                    || existing.user_id != booking.user_id
                    || existing.amount != booking.amount
                    || existing.payment_method != booking.payment_method
                {
                    warn!("Idempotency key {} reused with different fields", key);
                    return Err(AppError::IdempotencyConflict(format!(
                        "Key {} was already used for a different booking",
                        key
                    )));
                }

                Ok(CreateOutcome {
                    booking: existing,
                    created: false,
                })
            }
        }
    }

    /// Confirmation read. No side effects.
    pub async fn get_booking(&self, id: ObjectId) -> Result<Option<Booking>> {
        self.store.find_by_id(id).await
    }

    pub async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Booking>> {
        self.store.find_by_idempotency_key(key.trim()).await
    }

    pub async fn list_for_user(&self, user_id: ObjectId) -> Result<Vec<Booking>> {
        self.store.find_for_user(user_id).await
    }
}

#[cfg(test)]
pub(crate) mod memory {
    use super::*;
    use std::sync::Mutex;

    /// Store with the same duplicate-key semantics as the Mongo-backed one,
    /// for exercising ledger and orchestrator behavior without a database.
    #[derive(Default)]
    pub struct InMemoryBookingStore {
        bookings: Mutex<Vec<Booking>>,
    }

    impl InMemoryBookingStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl BookingStore for InMemoryBookingStore {
        async fn insert(&self, booking: &Booking) -> Result<InsertOutcome> {
            let mut bookings = self.bookings.lock().unwrap();
            if bookings
                .iter()
                .any(|b| b.idempotency_key == booking.idempotency_key)
            {
                return Ok(InsertOutcome::DuplicateKey);
            }

            let id = ObjectId::new();
            let mut stored = booking.clone();
            stored._id = Some(id);
            bookings.push(stored);
            Ok(InsertOutcome::Inserted(id))
        }

        async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Booking>> {
            let bookings = self.bookings.lock().unwrap();
            Ok(bookings.iter().find(|b| b.idempotency_key == key).cloned())
        }

        async fn find_by_id(&self, id: ObjectId) -> Result<Option<Booking>> {
            let bookings = self.bookings.lock().unwrap();
            Ok(bookings.iter().find(|b| b._id == Some(id)).cloned())
        }

        async fn find_for_user(&self, user_id: ObjectId) -> Result<Vec<Booking>> {
            let bookings = self.bookings.lock().unwrap();
            let mut mine: Vec<Booking> = bookings
                .iter()
                .filter(|b| b.user_id == user_id)
                .cloned()
                .collect();
            mine.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(mine)
        }
    }
}
