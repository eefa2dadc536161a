// services/checkout.rs
use mongodb::bson::oid::ObjectId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::database::repository::Repository;
use crate::errors::{AppError, Result};
use crate::models::booking::{Booking, PaymentMethod, PaymentStatus};
use crate::models::checkout::{
    CheckoutSession, CheckoutState, SettlementContext, SettlementError,
};
use crate::models::trip::Trip;
use crate::services::ledger::{BookingDraft, BookingLedger, MAX_IDEMPOTENCY_KEY_LEN};
use crate::services::settlement::PaymentStrategy;

#[derive(Debug)]
pub enum SubmitOutcome {
    /// Settlement succeeded and the booking is persisted.
    Recorded(Booking),
    /// Settlement came back unsuccessful; the session can be retried.
    Declined(SettlementError),
    /// A settlement is already running for this session; nothing was started.
    InFlight,
}

enum SubmitAction {
    Settle(Box<CheckoutSession>, PaymentMethod),
    Record,
    Lookup(String),
}

/// Drives checkout attempts through
/// `Idle -> MethodSelected -> Settling -> Settled -> BookingRecorded`,
/// with `Failed` re-enterable via retry under the same idempotency key.
///
/// The session map lock is never held across a settlement or ledger call:
/// a submit claims the `Settling` slot, settles unlocked, then re-locks to
/// apply the outcome. Concurrent submits for one session therefore observe
/// `Settling` and become no-ops, and concurrent ledger writes are deduped
/// by the store's unique key index rather than by this lock.
pub struct CheckoutOrchestrator {
    sessions: Mutex<HashMap<String, CheckoutSession>>,
    trips: Arc<dyn Repository<Trip>>,
    card: Arc<dyn PaymentStrategy>,
    crypto: Arc<dyn PaymentStrategy>,
    ledger: BookingLedger,
}

impl CheckoutOrchestrator {
    pub fn new(
        trips: Arc<dyn Repository<Trip>>,
        card: Arc<dyn PaymentStrategy>,
        crypto: Arc<dyn PaymentStrategy>,
        ledger: BookingLedger,
    ) -> Self {
        CheckoutOrchestrator {
            sessions: Mutex::new(HashMap::new()),
            trips,
            card,
            crypto,
            ledger,
        }
    }

    /// Opens a session against the trip's current price. The snapshot taken
    /// here is what settles, regardless of later catalog changes. Clients
    /// may bring their own idempotency key; otherwise one is minted.
    pub async fn start(
        &self,
        user_id: ObjectId,
        trip_id: ObjectId,
        idempotency_key: Option<String>,
    ) -> Result<CheckoutSession> {
        let idempotency_key = idempotency_key.map(|raw| raw.trim().to_string());
        if let Some(ref key) = idempotency_key {
            if key.is_empty() {
                return Err(AppError::invalid_data("idempotencyKey must not be blank"));
            }
            if key.len() > MAX_IDEMPOTENCY_KEY_LEN {
                return Err(AppError::invalid_data(format!(
                    "idempotencyKey must be at most {} characters",
                    MAX_IDEMPOTENCY_KEY_LEN
                )));
            }
        }

        let trip = self
            .trips
            .find_by_id(trip_id)
            .await?
            .ok_or(AppError::TripNotFound)?;

        let mut session = CheckoutSession::new(
            user_id,
            trip_id,
            trip.price.amount,
            trip.price.currency.clone(),
        );
        if let Some(key) = idempotency_key {
            session.idempotency_key = key;
        }
        info!(
            "Checkout session {} opened for trip {} at {} {}",
            session.id,
            trip_id.to_hex(),
            session.price_snapshot,
            session.currency
        );

        self.sessions
            .lock()
            .await
            .insert(session.id.clone(), session.clone());
        Ok(session)
    }

    pub async fn get(&self, user_id: ObjectId, session_id: &str) -> Result<CheckoutSession> {
        let mut sessions = self.sessions.lock().await;
        let session = owned(&mut sessions, user_id, session_id)?;
        Ok(session.clone())
    }

    pub async fn select_method(
        &self,
        user_id: ObjectId,
        session_id: &str,
        method: PaymentMethod,
    ) -> Result<CheckoutSession> {
        let mut sessions = self.sessions.lock().await;
        let session = owned(&mut sessions, user_id, session_id)?;

        if !session.state.can_transition_to(CheckoutState::MethodSelected) {
            return Err(AppError::invalid_data(format!(
                "Invalid state transition from {:?} to MethodSelected",
                session.state
            )));
        }

        session.state = CheckoutState::MethodSelected;
        session.selected_method = Some(method);
        session.last_error = None;
        Ok(session.clone())
    }

    /// One settlement attempt. While a settlement is in flight this is a
    /// no-op, after a decline it retries under the same idempotency key,
    /// and after success it returns the recorded booking without settling
    /// again.
    pub async fn submit(
        &self,
        user_id: ObjectId,
        session_id: &str,
        ctx: SettlementContext,
    ) -> Result<SubmitOutcome> {
        let action = {
            let mut sessions = self.sessions.lock().await;
            let session = owned(&mut sessions, user_id, session_id)?;

            match session.state {
                CheckoutState::Settling => return Ok(SubmitOutcome::InFlight),
                CheckoutState::Idle => {
                    return Err(AppError::invalid_data("No payment method selected"))
                }
                CheckoutState::BookingRecorded => {
                    SubmitAction::Lookup(session.idempotency_key.clone())
                }
                CheckoutState::Settled => SubmitAction::Record,
                CheckoutState::MethodSelected | CheckoutState::Failed => {
                    let method = session
                        .selected_method
                        .ok_or_else(|| AppError::invalid_data("No payment method selected"))?;
                    session.state = CheckoutState::Settling;
                    SubmitAction::Settle(Box::new(session.clone()), method)
                }
            }
        };

        match action {
            SubmitAction::Lookup(key) => {
                let existing = self
                    .ledger
                    .find_by_idempotency_key(&key)
                    .await?
                    .ok_or_else(|| AppError::service("Recorded session has no booking"))?;
                Ok(SubmitOutcome::Recorded(existing))
            }
            SubmitAction::Record => self.record_booking(user_id, session_id).await,
            SubmitAction::Settle(snapshot, method) => {
                info!("Settling session {} via {}", snapshot.id, method.as_str());
                let result = self.strategy_for(method).settle(&snapshot, &ctx).await;

                {
                    let mut sessions = self.sessions.lock().await;
                    let session = match sessions.get_mut(session_id) {
                        Some(session) => session,
                        None => {
                            warn!(
                                "Session {} discarded during settlement; result dropped",
                                session_id
                            );
                            return Err(AppError::SessionNotFound);
                        }
                    };

                    if !result.success {
                        let error = result
                            .error
                            .unwrap_or_else(|| SettlementError::Network("settlement failed".to_string()));
                        session.state = CheckoutState::Failed;
                        session.last_error = Some(error.clone());
                        info!("Session {} settlement declined: {}", session_id, error);
                        return Ok(SubmitOutcome::Declined(error));
                    }

                    session.state = CheckoutState::Settled;
                    session.settled_reference = result.external_reference;
                    session.last_error = None;
                }

                self.record_booking(user_id, session_id).await
            }
        }
    }

    /// Removes the session. An in-flight settlement result for it is
    /// dropped when it resolves; nothing reconciles it afterwards.
    pub async fn abort(&self, user_id: ObjectId, session_id: &str) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        owned(&mut sessions, user_id, session_id)?;
        sessions.remove(session_id);
        info!("Checkout session {} aborted", session_id);
        Ok(())
    }

    fn strategy_for(&self, method: PaymentMethod) -> &Arc<dyn PaymentStrategy> {
        match method {
            PaymentMethod::Card => &self.card,
            PaymentMethod::Crypto => &self.crypto,
        }
    }

    // The ledger write for a settled session. Kept separate from settling
    // so a session stuck in Settled by a store outage can complete on the
    // next submit without a second settlement.
    async fn record_booking(&self, user_id: ObjectId, session_id: &str) -> Result<SubmitOutcome> {
        let draft = {
            let mut sessions = self.sessions.lock().await;
            let session = owned(&mut sessions, user_id, session_id)?;

            BookingDraft {
                user_id: session.user_id,
                trip_id: session.trip_id,
                payment_method: session
                    .selected_method
                    .ok_or_else(|| AppError::service("Settled session has no payment method"))?,
                external_reference: session.settled_reference.clone(),
                payment_status: PaymentStatus::Completed,
                amount: session.price_snapshot,
                currency: session.currency.clone(),
                idempotency_key: session.idempotency_key.clone(),
            }
        };

        let outcome = self.ledger.create_booking(draft).await?;

        {
            let mut sessions = self.sessions.lock().await;
            if let Some(session) = sessions.get_mut(session_id) {
                session.state = CheckoutState::BookingRecorded;
                session.booking_id = outcome.booking._id;
            }
        }

        Ok(SubmitOutcome::Recorded(outcome.booking))
    }
}

fn owned<'a>(
    sessions: &'a mut HashMap<String, CheckoutSession>,
    user_id: ObjectId,
    session_id: &str,
) -> Result<&'a mut CheckoutSession> {
    let session = sessions
        .get_mut(session_id)
        .ok_or(AppError::SessionNotFound)?;
    if session.user_id != user_id {
        return Err(AppError::Unauthorized);
    }
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::checkout::{CardDetails, SettlementResult};
    use crate::models::trip::{Price, Trip, TripDifficulty, TripDuration};
    use crate::services::ledger::memory::InMemoryBookingStore;
    use crate::services::ledger::{BookingStore, InsertOutcome};
    use crate::services::settlement::CardSimulation;
    use async_trait::async_trait;
    use chrono::Utc;
    use mongodb::bson::Document;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    fn make_trip(price: f64) -> Trip {
        Trip {
            _id: Some(ObjectId::new()),
            title: "Ladakh Explorer".to_string(),
            slug: "ladakh-explorer".to_string(),
            description: "High-altitude circuit with acclimatization days".to_string(),
            price: Price {
                amount: price,
                currency: "USD".to_string(),
            },
            duration: TripDuration { days: 5, nights: 4 },
            max_group_size: 12,
            difficulty: TripDifficulty::Moderate,
            locations: vec!["Leh".to_string()],
            cover_image: "/images/ladakh.jpg".to_string(),
            featured: false,
            trending: false,
            created_by: None,
            updated_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    struct StubTrips {
        trip: std::sync::Mutex<Option<Trip>>,
    }

    impl StubTrips {
        fn with(trip: Trip) -> Arc<Self> {
            Arc::new(StubTrips {
                trip: std::sync::Mutex::new(Some(trip)),
            })
        }

        fn none() -> Arc<Self> {
            Arc::new(StubTrips {
                trip: std::sync::Mutex::new(None),
            })
        }

        fn set_price(&self, amount: f64) {
            if let Some(trip) = self.trip.lock().unwrap().as_mut() {
                trip.price.amount = amount;
            }
        }
    }

    #[async_trait]
    impl Repository<Trip> for StubTrips {
        async fn find_by_id(&self, id: ObjectId) -> Result<Option<Trip>> {
            Ok(self
                .trip
                .lock()
                .unwrap()
                .clone()
                .filter(|t| t._id == Some(id)))
        }

        async fn find(&self, _filter: Document) -> Result<Vec<Trip>> {
            Ok(Vec::new())
        }

        async fn create(&self, _item: &Trip) -> Result<ObjectId> {
            Ok(ObjectId::new())
        }

        async fn update(&self, _id: ObjectId, _update: Document) -> Result<Option<Trip>> {
            Ok(None)
        }

        async fn delete(&self, _id: ObjectId) -> Result<bool> {
            Ok(false)
        }
    }

    /// Plays back a fixed list of results and panics on any extra call.
    struct ScriptedStrategy {
        results: std::sync::Mutex<VecDeque<SettlementResult>>,
        calls: AtomicUsize,
    }

    impl ScriptedStrategy {
        fn new(results: Vec<SettlementResult>) -> Arc<Self> {
            Arc::new(ScriptedStrategy {
                results: std::sync::Mutex::new(results.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn never() -> Arc<Self> {
            Self::new(Vec::new())
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PaymentStrategy for ScriptedStrategy {
        async fn settle(
            &self,
            _session: &CheckoutSession,
            _ctx: &SettlementContext,
        ) -> SettlementResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected settle call")
        }
    }

    /// Blocks inside settle until released, to hold a session in Settling.
    struct GatedStrategy {
        release: Arc<Notify>,
        calls: AtomicUsize,
        result: SettlementResult,
    }

    #[async_trait]
    impl PaymentStrategy for GatedStrategy {
        async fn settle(
            &self,
            _session: &CheckoutSession,
            _ctx: &SettlementContext,
        ) -> SettlementResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.release.notified().await;
            self.result.clone()
        }
    }

    struct FlakyStore {
        inner: InMemoryBookingStore,
        fail_next_insert: AtomicBool,
    }

    #[async_trait]
    impl BookingStore for FlakyStore {
        async fn insert(&self, booking: &Booking) -> Result<InsertOutcome> {
            if self.fail_next_insert.swap(false, Ordering::SeqCst) {
                return Err(AppError::service("simulated write failure"));
            }
            self.inner.insert(booking).await
        }

        async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Booking>> {
            self.inner.find_by_idempotency_key(key).await
        }

        async fn find_by_id(&self, id: ObjectId) -> Result<Option<Booking>> {
            self.inner.find_by_id(id).await
        }

        async fn find_for_user(&self, user_id: ObjectId) -> Result<Vec<Booking>> {
            self.inner.find_for_user(user_id).await
        }
    }

    fn orchestrator(
        trips: Arc<StubTrips>,
        card: Arc<dyn PaymentStrategy>,
        crypto: Arc<dyn PaymentStrategy>,
        store: Arc<dyn BookingStore>,
    ) -> (Arc<CheckoutOrchestrator>, BookingLedger) {
        let ledger = BookingLedger::new(store);
        let orch = CheckoutOrchestrator::new(trips, card, crypto, ledger.clone());
        (Arc::new(orch), ledger)
    }

    fn card_ctx() -> SettlementContext {
        SettlementContext {
            card: Some(CardDetails {
                number: "4242424242424242".to_string(),
                name: None,
                expiry: "12/27".to_string(),
                cvv: "123".to_string(),
            }),
        }
    }

    #[tokio::test]
    async fn test_card_checkout_happy_path() {
        let trip = make_trip(100.0);
        let trip_id = trip._id.unwrap();
        let user = ObjectId::new();
        let (orch, _ledger) = orchestrator(
            StubTrips::with(trip),
            Arc::new(CardSimulation::new(Duration::ZERO)),
            ScriptedStrategy::never(),
            Arc::new(InMemoryBookingStore::new()),
        );

        let session = orch.start(user, trip_id, None).await.unwrap();
        assert_eq!(session.state, CheckoutState::Idle);
        assert_eq!(session.price_snapshot, 100.0);
        assert!(!session.idempotency_key.is_empty());

        let session = orch
            .select_method(user, &session.id, PaymentMethod::Card)
            .await
            .unwrap();
        assert_eq!(session.state, CheckoutState::MethodSelected);

        let outcome = orch.submit(user, &session.id, card_ctx()).await.unwrap();
        let booking = match outcome {
            SubmitOutcome::Recorded(booking) => booking,
            other => panic!("expected a recorded booking, got {:?}", other),
        };

        assert_eq!(booking.amount, 100.0);
        assert_eq!(booking.currency, "USD");
        assert_eq!(booking.payment_method, PaymentMethod::Card);
        assert_eq!(booking.payment_status, PaymentStatus::Completed);
        assert_eq!(booking.status, crate::models::booking::BookingStatus::Confirmed);
        assert_eq!(booking.idempotency_key, session.idempotency_key);
        assert!(booking
            .external_reference
            .as_deref()
            .unwrap()
            .starts_with("card-sim-"));

        let session = orch.get(user, &session.id).await.unwrap();
        assert_eq!(session.state, CheckoutState::BookingRecorded);
        assert_eq!(session.booking_id, booking._id);
    }

    #[tokio::test]
    async fn test_crypto_decline_then_retry_records_once() {
        let trip = make_trip(150.0);
        let trip_id = trip._id.unwrap();
        let user = ObjectId::new();
        let crypto = ScriptedStrategy::new(vec![
            SettlementResult::failed(SettlementError::InsufficientFunds),
            SettlementResult::settled("0x9a55e7"),
        ]);
        let (orch, ledger) = orchestrator(
            StubTrips::with(trip),
            ScriptedStrategy::never(),
            crypto.clone(),
            Arc::new(InMemoryBookingStore::new()),
        );

        let session = orch.start(user, trip_id, None).await.unwrap();
        let key = session.idempotency_key.clone();
        orch.select_method(user, &session.id, PaymentMethod::Crypto)
            .await
            .unwrap();

        let declined = orch
            .submit(user, &session.id, SettlementContext::default())
            .await
            .unwrap();
        assert!(matches!(
            declined,
            SubmitOutcome::Declined(SettlementError::InsufficientFunds)
        ));

        // Failed attempt leaves no booking behind
        let after_decline = orch.get(user, &session.id).await.unwrap();
        assert_eq!(after_decline.state, CheckoutState::Failed);
        assert_eq!(
            after_decline.last_error,
            Some(SettlementError::InsufficientFunds)
        );
        assert!(ledger.list_for_user(user).await.unwrap().is_empty());

        // Retry keeps the same key and records exactly one booking
        let retried = orch
            .submit(user, &session.id, SettlementContext::default())
            .await
            .unwrap();
        let booking = match retried {
            SubmitOutcome::Recorded(booking) => booking,
            other => panic!("expected a recorded booking, got {:?}", other),
        };
        assert_eq!(booking.idempotency_key, key);
        assert_eq!(booking.external_reference.as_deref(), Some("0x9a55e7"));
        assert_eq!(ledger.list_for_user(user).await.unwrap().len(), 1);
        assert_eq!(crypto.call_count(), 2);
    }

    #[tokio::test]
    async fn test_second_submit_while_settling_is_noop() {
        let trip = make_trip(100.0);
        let trip_id = trip._id.unwrap();
        let user = ObjectId::new();
        let release = Arc::new(Notify::new());
        let gated = Arc::new(GatedStrategy {
            release: release.clone(),
            calls: AtomicUsize::new(0),
            result: SettlementResult::settled("gated-ref"),
        });
        let (orch, _ledger) = orchestrator(
            StubTrips::with(trip),
            gated.clone(),
            ScriptedStrategy::never(),
            Arc::new(InMemoryBookingStore::new()),
        );

        let session = orch.start(user, trip_id, None).await.unwrap();
        let session_id = session.id.clone();
        orch.select_method(user, &session_id, PaymentMethod::Card)
            .await
            .unwrap();

        let first = tokio::spawn({
            let orch = orch.clone();
            let session_id = session_id.clone();
            async move { orch.submit(user, &session_id, card_ctx()).await }
        });

        while gated.calls.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let second = orch.submit(user, &session_id, card_ctx()).await.unwrap();
        assert!(matches!(second, SubmitOutcome::InFlight));

        // Changing method mid-settlement is refused as well
        let reselect = orch
            .select_method(user, &session_id, PaymentMethod::Crypto)
            .await;
        assert!(matches!(reselect, Err(AppError::ValidationError(_))));

        release.notify_one();
        let first = first.await.unwrap().unwrap();
        assert!(matches!(first, SubmitOutcome::Recorded(_)));
        assert_eq!(gated.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_submit_without_method_selected() {
        let trip = make_trip(100.0);
        let trip_id = trip._id.unwrap();
        let user = ObjectId::new();
        let (orch, _ledger) = orchestrator(
            StubTrips::with(trip),
            ScriptedStrategy::never(),
            ScriptedStrategy::never(),
            Arc::new(InMemoryBookingStore::new()),
        );

        let session = orch.start(user, trip_id, None).await.unwrap();
        let err = orch.submit(user, &session.id, card_ctx()).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_submit_after_recorded_returns_existing() {
        let trip = make_trip(100.0);
        let trip_id = trip._id.unwrap();
        let user = ObjectId::new();
        let card = ScriptedStrategy::new(vec![SettlementResult::settled("once-ref")]);
        let (orch, ledger) = orchestrator(
            StubTrips::with(trip),
            card.clone(),
            ScriptedStrategy::never(),
            Arc::new(InMemoryBookingStore::new()),
        );

        let session = orch.start(user, trip_id, None).await.unwrap();
        orch.select_method(user, &session.id, PaymentMethod::Card)
            .await
            .unwrap();

        let first = orch.submit(user, &session.id, card_ctx()).await.unwrap();
        let first_id = match first {
            SubmitOutcome::Recorded(b) => b._id,
            other => panic!("expected a recorded booking, got {:?}", other),
        };

        let again = orch.submit(user, &session.id, card_ctx()).await.unwrap();
        match again {
            SubmitOutcome::Recorded(b) => assert_eq!(b._id, first_id),
            other => panic!("expected the existing booking, got {:?}", other),
        }

        assert_eq!(card.call_count(), 1);
        assert_eq!(ledger.list_for_user(user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_store_outage_leaves_session_recoverable() {
        let trip = make_trip(100.0);
        let trip_id = trip._id.unwrap();
        let user = ObjectId::new();
        let card = ScriptedStrategy::new(vec![SettlementResult::settled("flaky-ref")]);
        let (orch, ledger) = orchestrator(
            StubTrips::with(trip),
            card.clone(),
            ScriptedStrategy::never(),
            Arc::new(FlakyStore {
                inner: InMemoryBookingStore::new(),
                fail_next_insert: AtomicBool::new(true),
            }),
        );

        let session = orch.start(user, trip_id, None).await.unwrap();
        orch.select_method(user, &session.id, PaymentMethod::Card)
            .await
            .unwrap();

        let err = orch.submit(user, &session.id, card_ctx()).await.unwrap_err();
        assert!(matches!(err, AppError::ServiceError(_)));

        // Settled but unrecorded; the next submit only re-runs the write
        let stuck = orch.get(user, &session.id).await.unwrap();
        assert_eq!(stuck.state, CheckoutState::Settled);

        let outcome = orch.submit(user, &session.id, card_ctx()).await.unwrap();
        match outcome {
            SubmitOutcome::Recorded(b) => {
                assert_eq!(b.external_reference.as_deref(), Some("flaky-ref"))
            }
            other => panic!("expected a recorded booking, got {:?}", other),
        }
        assert_eq!(card.call_count(), 1);
        assert_eq!(ledger.list_for_user(user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_start_requires_existing_trip() {
        let user = ObjectId::new();
        let (orch, _ledger) = orchestrator(
            StubTrips::none(),
            ScriptedStrategy::never(),
            ScriptedStrategy::never(),
            Arc::new(InMemoryBookingStore::new()),
        );

        let err = orch.start(user, ObjectId::new(), None).await.unwrap_err();
        assert!(matches!(err, AppError::TripNotFound));
    }

    #[tokio::test]
    async fn test_price_snapshot_is_insulated() {
        let trip = make_trip(100.0);
        let trip_id = trip._id.unwrap();
        let user = ObjectId::new();
        let trips = StubTrips::with(trip);
        let (orch, _ledger) = orchestrator(
            trips.clone(),
            Arc::new(CardSimulation::new(Duration::ZERO)),
            ScriptedStrategy::never(),
            Arc::new(InMemoryBookingStore::new()),
        );

        let session = orch.start(user, trip_id, None).await.unwrap();
        trips.set_price(999.0);

        orch.select_method(user, &session.id, PaymentMethod::Card)
            .await
            .unwrap();
        let outcome = orch.submit(user, &session.id, card_ctx()).await.unwrap();

        match outcome {
            SubmitOutcome::Recorded(booking) => assert_eq!(booking.amount, 100.0),
            other => panic!("expected a recorded booking, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_session_ownership_enforced() {
        let trip = make_trip(100.0);
        let trip_id = trip._id.unwrap();
        let owner = ObjectId::new();
        let stranger = ObjectId::new();
        let (orch, _ledger) = orchestrator(
            StubTrips::with(trip),
            ScriptedStrategy::never(),
            ScriptedStrategy::never(),
            Arc::new(InMemoryBookingStore::new()),
        );

        let session = orch.start(owner, trip_id, None).await.unwrap();

        assert!(matches!(
            orch.get(stranger, &session.id).await,
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            orch.select_method(stranger, &session.id, PaymentMethod::Card)
                .await,
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            orch.submit(stranger, &session.id, card_ctx()).await,
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            orch.abort(stranger, &session.id).await,
            Err(AppError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_abort_discards_session() {
        let trip = make_trip(100.0);
        let trip_id = trip._id.unwrap();
        let user = ObjectId::new();
        let (orch, _ledger) = orchestrator(
            StubTrips::with(trip),
            ScriptedStrategy::never(),
            ScriptedStrategy::never(),
            Arc::new(InMemoryBookingStore::new()),
        );

        let session = orch.start(user, trip_id, None).await.unwrap();
        orch.abort(user, &session.id).await.unwrap();

        assert!(matches!(
            orch.get(user, &session.id).await,
            Err(AppError::SessionNotFound)
        ));
    }

    #[tokio::test]
    async fn test_client_supplied_key_is_used() {
        let trip = make_trip(100.0);
        let trip_id = trip._id.unwrap();
        let user = ObjectId::new();
        let (orch, _ledger) = orchestrator(
            StubTrips::with(trip),
            Arc::new(CardSimulation::new(Duration::ZERO)),
            ScriptedStrategy::never(),
            Arc::new(InMemoryBookingStore::new()),
        );

        let session = orch
            .start(user, trip_id, Some("  attempt-42  ".to_string()))
            .await
            .unwrap();
        assert_eq!(session.idempotency_key, "attempt-42");

        let blank = orch
            .start(user, trip_id, Some("   ".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(blank, AppError::ValidationError(_)));
    }
}
